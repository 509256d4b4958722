use std::borrow::Cow;
use std::mem;

use crate::emitter::Emitter;
use crate::tokenizer::{MAX_KEYWORD_HITS, Tokenizer};

impl<E: Emitter> Tokenizer<'_, E> {
    /// Emits the buffer, scoping the words found in the keyword table of the top mode
    pub(super) fn process_keywords(&mut self) {
        let top = self.top();
        let buffer = mem::take(&mut self.buffer);
        let (Some(table), Some(pattern)) = (&top.keywords, &top.keyword_pattern) else {
            self.emitter.add_text(&buffer);
            return;
        };

        let mut last = 0;
        let mut plain = String::new();
        for (start, end) in pattern.find_iter(&buffer) {
            if end == start {
                continue;
            }
            let lexeme = &buffer[start..end];
            plain.push_str(&buffer[last..start]);
            last = end;

            let word = if self.language.case_insensitive {
                Cow::Owned(lexeme.to_lowercase())
            } else {
                Cow::Borrowed(lexeme)
            };
            let Some(keyword) = table.get(&word) else {
                plain.push_str(lexeme);
                continue;
            };

            // Soft keywords are only there to not be matched by something else
            if keyword.is_soft() {
                plain.push_str(lexeme);
                continue;
            }

            let hits = self.keyword_hits.entry(word.into_owned()).or_default();
            *hits += 1;
            if *hits <= MAX_KEYWORD_HITS {
                self.relevance = self.relevance.saturating_add(keyword.relevance);
            }

            self.emitter.add_text(&plain);
            plain.clear();
            let scope = self.language.alias_scope(&keyword.scope);
            self.emit_keyword(lexeme, scope);
        }
        plain.push_str(&buffer[last..]);
        self.emitter.add_text(&plain);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::emitter::{Emitter, TokenTree};
    use crate::grammars::{KeywordList, Keywords, Mode};
    use crate::registry::Registry;
    use crate::test_utils::language_from_mode;
    use crate::tokenizer::Tokenizer;

    fn run(keywords: Keywords, case_insensitive: bool, text: &str) -> (String, u32) {
        let mut language = language_from_mode(Mode {
            keywords: Some(keywords),
            ..Default::default()
        });
        language.case_insensitive = case_insensitive;
        language.class_name_aliases =
            HashMap::from([("built_in".to_string(), "title.builtin".to_string())]);
        let mut registry = Registry::default();
        registry.register_language("kw", language).unwrap();
        let compiled = registry.compiled_language("kw").unwrap();
        let out = Tokenizer::<TokenTree>::new(&registry, &compiled, text, false, None)
            .run()
            .unwrap();
        (out.emitter.to_html(), out.relevance)
    }

    fn scoped(entries: &[(&str, &str)]) -> Keywords {
        Keywords::Scoped(
            entries
                .iter()
                .map(|(scope, words)| (scope.to_string(), KeywordList::Words(words.to_string())))
                .collect(),
        )
    }

    #[test]
    fn relevance_is_capped_per_keyword() {
        let keywords = Keywords::from("fn let");
        let (_, seven) = run(keywords.clone(), false, &"fn ".repeat(7));
        let (_, twenty) = run(keywords.clone(), false, &"fn ".repeat(20));
        assert_eq!(seven, 7);
        assert_eq!(twenty, 7);

        // more distinct keywords never lower the score
        let (_, more) = run(keywords, false, &format!("{} let", "fn ".repeat(20)));
        assert_eq!(more, 8);
    }

    #[test]
    fn huge_relevances_saturate() {
        let (_, relevance) = run(Keywords::from("big|4294967295"), false, "big big");
        assert_eq!(relevance, u32::MAX);
    }

    #[test]
    fn case_insensitive_lookup_keeps_the_original_text() {
        let (html, relevance) = run(Keywords::from("select from"), true, "SELECT a FROM b");
        insta::assert_snapshot!(
            html,
            @r#"<span class="hljs-keyword">SELECT</span> a <span class="hljs-keyword">FROM</span> b"#
        );
        assert_eq!(relevance, 2);
    }

    #[test]
    fn soft_keywords_are_plain_and_unscored() {
        let keywords = scoped(&[("keyword", "match"), ("_soft", "case")]);
        let (html, relevance) = run(keywords, false, "match x case y");
        insta::assert_snapshot!(html, @r#"<span class="hljs-keyword">match</span> x case y"#);
        assert_eq!(relevance, 1);
    }

    #[test]
    fn scopes_go_through_aliases_and_custom_pattern() {
        let keywords = scoped(&[("$pattern", r"[a-z.]+"), ("built_in", "std.print")]);
        let (html, _) = run(keywords, false, "std.print(1) print");
        insta::assert_snapshot!(
            html,
            @r#"<span class="hljs-title builtin_">std.print</span>(1) print"#
        );
    }
}
