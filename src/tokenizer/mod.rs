use std::collections::HashMap;
use std::mem;

use crate::autodetect::highlight_auto;
use crate::emitter::Emitter;
use crate::error::{Error, TintaResult};
use crate::grammars::{
    CompiledLanguage, CompiledMode, DataBag, EmitScope, GroupScopes, Hook, MatchData, ModeId,
    Response, RuleKind, ScanMatch, SubLanguage, next_char_boundary,
};
use crate::highlight::highlight_language;
use crate::registry::Registry;

mod keywords;
mod stack;

pub use stack::{Activation, ModeStack};

/// Past that many iterations, a scan doing three times more iterations than matches moving the
/// cursor forward is considered stuck
pub const LOOP_GUARD_ITERATIONS: usize = 100_000;

/// Only the first occurrences of a keyword count towards the relevance
pub const MAX_KEYWORD_HITS: u32 = 7;

/// What the tokenizer leaves behind once the whole input is consumed
#[derive(Debug)]
pub(crate) struct Tokenized<E> {
    pub(crate) emitter: E,
    pub(crate) relevance: u32,
    /// The modes still open at the end of the input, before they got force-closed
    pub(crate) stack: ModeStack,
}

/// Runs a compiled language over a text, one scan step at a time
pub(crate) struct Tokenizer<'r, E: Emitter> {
    registry: &'r Registry,
    language: &'r CompiledLanguage,
    text: &'r str,
    ignore_illegals: bool,
    safe_mode: bool,
    emitter: E,
    stack: ModeStack,
    /// Plain text waiting to go through keywords or a sublanguage
    buffer: String,
    relevance: u32,
    keyword_hits: HashMap<String, u32>,
    /// sublanguage name -> where it stopped last time in this call
    continuations: HashMap<String, ModeStack>,
    /// First rule of the top mode scanner to consider, see `ResumableScanner::exec`
    resume: usize,
    continue_at_same_position: bool,
    last_match: Option<(RuleKind, usize)>,
    iterations: usize,
    /// Matches that moved the cursor forward. Pushing or popping modes in place doesn't count
    accepted: usize,
}

impl<'r, E: Emitter> Tokenizer<'r, E> {
    pub(crate) fn new(
        registry: &'r Registry,
        language: &'r CompiledLanguage,
        text: &'r str,
        ignore_illegals: bool,
        continuation: Option<ModeStack>,
    ) -> Self {
        let stack = continuation
            .filter(|stack| {
                stack
                    .frames
                    .iter()
                    .all(|frame| frame.mode.as_index() < language.modes_len())
            })
            .unwrap_or_default();
        Self {
            registry,
            language,
            text,
            ignore_illegals,
            safe_mode: registry.options().safe_mode,
            emitter: E::new(registry.options()),
            stack,
            buffer: String::new(),
            relevance: 0,
            keyword_hits: HashMap::new(),
            continuations: HashMap::new(),
            resume: 0,
            continue_at_same_position: false,
            last_match: None,
            iterations: 0,
            accepted: 0,
        }
    }

    fn top(&self) -> &'r CompiledMode {
        self.language.mode(self.stack.top().mode)
    }

    fn scope_name(&self, scope: &'r str) -> &'r str {
        self.language.alias_scope(scope)
    }

    /// Reopens the scopes of a continued stack so the output stays balanced
    fn process_continuations(&mut self) {
        for frame in &self.stack.frames[1..] {
            let mode = self.language.mode(frame.mode);
            if let Some(scope) = &mode.scope {
                self.emitter.open_node(self.language.alias_scope(scope));
            }
        }
    }

    pub(crate) fn run(mut self) -> TintaResult<Tokenized<E>> {
        self.process_continuations();

        let mut index = 0;
        loop {
            self.iterations += 1;
            if self.continue_at_same_position {
                self.continue_at_same_position = false;
            } else {
                self.resume = 0;
            }

            if self.iterations > LOOP_GUARD_ITERATIONS && self.iterations > self.accepted * 3 {
                return Err(Error::LoopGuard {
                    language: self.language.name.clone(),
                    iterations: self.iterations,
                    index,
                });
            }

            let top = self.top();
            let Some(m) = top
                .scanner
                .exec(self.text, index, &mut self.resume)
                .map_err(Error::TokenizeRegex)?
            else {
                break;
            };

            #[cfg(feature = "debug")]
            log::debug!(
                "[run] {:?} rule #{} at {}..{} in {}",
                m.kind,
                m.position,
                m.index,
                m.end,
                self.stack.describe(self.language)
            );

            self.buffer.push_str(&self.text[index..m.index]);
            let processed = self.process_lexeme(&m)?;
            let next = m.index + processed;
            if next > index {
                self.accepted += 1;
            }
            index = next;
        }

        self.buffer.push_str(self.text.get(index..).unwrap_or_default());
        self.process_buffer()?;
        let stack = self.stack.clone();
        if self.emitter.finalize() && cfg!(feature = "debug") {
            log::debug!("[run] force-closed {}", stack.describe(self.language));
        }

        Ok(Tokenized {
            emitter: self.emitter,
            relevance: self.relevance,
            stack,
        })
    }

    /// Handles one match, returning how many bytes were consumed from its start
    fn process_lexeme(&mut self, m: &ScanMatch) -> TintaResult<usize> {
        let lexeme = m.lexeme(self.text);

        // A zero-width end right after a zero-width begin at the same spot would loop forever
        if let Some((RuleKind::Begin(_), last_index)) = self.last_match
            && m.kind == RuleKind::End
            && last_index == m.index
            && lexeme.is_empty()
        {
            if !self.safe_mode {
                return Err(Error::ZeroWidthMatch {
                    language: self.language.name.clone(),
                    index: m.index,
                });
            }
            return Ok(self.consume_one_char(m.index));
        }
        self.last_match = Some((m.kind, m.index));

        match m.kind {
            RuleKind::Begin(id) => return self.do_begin_match(id, m),
            RuleKind::Illegal if !self.ignore_illegals => {
                return Err(Error::IllegalLexeme {
                    language: self.language.name.clone(),
                    lexeme: lexeme.to_owned(),
                    index: m.index,
                    mode: self.top().display_name().to_owned(),
                });
            }
            RuleKind::End => {
                if let Some(processed) = self.do_end_match(m)? {
                    return Ok(processed);
                }
            }
            RuleKind::Illegal => (),
        }

        // An ignored illegal or a vetoed end: the text stays plain
        if lexeme.is_empty() {
            return Ok(self.consume_one_char(m.index));
        }
        self.buffer.push_str(lexeme);
        Ok(lexeme.len())
    }

    /// Moves the character at `at` to the buffer
    fn consume_one_char(&mut self, at: usize) -> usize {
        match next_char_boundary(self.text, at) {
            Some(next) => {
                self.buffer.push_str(&self.text[at..next]);
                next - at
            }
            // Nothing left: the loop ends on its own since the scanner can't match anymore
            None => 1,
        }
    }

    fn run_hook(
        hook: Option<&Hook>,
        m: &ScanMatch,
        text: &str,
        data: &mut DataBag,
    ) -> bool {
        let Some(hook) = hook else {
            return false;
        };
        let match_data = MatchData {
            input: text,
            index: m.index,
            groups: &m.groups,
        };
        let mut response = Response::new(data);
        hook.call(&match_data, &mut response);
        response.is_match_ignored()
    }

    fn do_begin_match(&mut self, id: ModeId, m: &ScanMatch) -> TintaResult<usize> {
        let lexeme = m.lexeme(self.text);
        let mode = self.language.mode(id);

        let mut data = DataBag::new();
        let vetoed = Self::run_hook(mode.before_begin.as_ref(), m, self.text, &mut data)
            || Self::run_hook(mode.on_begin.as_ref(), m, self.text, &mut data);
        if vetoed {
            if cfg!(feature = "debug") {
                log::trace!("[do_begin_match] rule #{} vetoed at {}", m.position, m.index);
            }
            // Every rule was tried already
            if self.resume == 0 {
                return Ok(self.consume_one_char(m.index));
            }
            self.continue_at_same_position = true;
            return Ok(0);
        }

        if mode.skip {
            self.buffer.push_str(lexeme);
        } else {
            if mode.exclude_begin {
                self.buffer.push_str(lexeme);
            }
            self.process_buffer()?;
            if !mode.return_begin && !mode.exclude_begin {
                self.buffer = lexeme.to_owned();
            }
        }
        self.start_new_mode(id, m, data)?;
        Ok(if mode.return_begin { 0 } else { lexeme.len() })
    }

    fn start_new_mode(&mut self, id: ModeId, m: &ScanMatch, data: DataBag) -> TintaResult<()> {
        let mode = self.language.mode(id);
        if let Some(scope) = &mode.scope {
            self.emitter.open_node(self.scope_name(scope));
        }
        match &mode.begin_scope {
            Some(EmitScope::Wrap(scope)) => {
                let text = mem::take(&mut self.buffer);
                self.emit_keyword(&text, self.scope_name(scope));
            }
            Some(EmitScope::Multi(groups)) => {
                // Unscoped groups go through the keywords of the enclosing mode
                self.emit_multi_class(groups, m);
                self.buffer.clear();
            }
            None => (),
        }
        self.stack.push(id, data);
        Ok(())
    }

    /// Finds the activation the end match closes, starting at the one at `depth`
    fn end_of_mode(&mut self, depth: usize, m: &ScanMatch) -> Option<usize> {
        let mode = self.language.mode(self.stack.get(depth)?.mode);
        let matched = mode
            .end
            .as_ref()
            .is_some_and(|end| end.matches_at(self.text, m.index));

        if matched {
            let frame = &mut self.stack.frames[depth];
            let vetoed = Self::run_hook(mode.on_end.as_ref(), m, self.text, &mut frame.data);
            if !vetoed {
                let mut depth = depth;
                // The root can't be ended
                while self.language.mode(self.stack.frames[depth].mode).ends_parent && depth > 1 {
                    depth -= 1;
                }
                return Some(depth);
            }
        }

        if mode.ends_with_parent && depth > 1 {
            return self.end_of_mode(depth - 1, m);
        }
        None
    }

    /// Returns `None` if nothing ended after all
    fn do_end_match(&mut self, m: &ScanMatch) -> TintaResult<Option<usize>> {
        let lexeme = m.lexeme(self.text);
        let Some(end_depth) = self.end_of_mode(self.stack.len() - 1, m) else {
            return Ok(None);
        };
        let origin = self.top();

        match &origin.end_scope {
            Some(EmitScope::Wrap(scope)) => {
                self.process_buffer()?;
                self.emit_keyword(lexeme, self.scope_name(scope));
            }
            Some(EmitScope::Multi(groups)) => {
                self.process_buffer()?;
                self.emit_multi_class(groups, m);
            }
            None if origin.skip => self.buffer.push_str(lexeme),
            None => {
                if !(origin.return_end || origin.exclude_end) {
                    self.buffer.push_str(lexeme);
                }
                self.process_buffer()?;
                if origin.exclude_end {
                    self.buffer = lexeme.to_owned();
                }
            }
        }

        let mut ended = None;
        while self.stack.len() > end_depth {
            let Some(activation) = self.stack.pop() else {
                break;
            };
            let mode = self.language.mode(activation.mode);
            if mode.scope.is_some() {
                self.emitter.close_node();
            }
            if !mode.skip && mode.sub_language.is_none() {
                self.relevance = self.relevance.saturating_add(mode.relevance);
            }
            ended = Some(mode);
        }

        if let Some(starts) = ended.and_then(|mode| mode.starts) {
            self.start_new_mode(starts, m, DataBag::new())?;
        }
        Ok(Some(if origin.return_end { 0 } else { lexeme.len() }))
    }

    /// Wraps `text` in its own node, if there's any text
    fn emit_keyword(&mut self, text: &str, scope: &str) {
        if text.is_empty() {
            return;
        }
        self.emitter.open_node(scope);
        self.emitter.add_text(text);
        self.emitter.close_node();
    }

    fn emit_multi_class(&mut self, groups: &GroupScopes, m: &ScanMatch) {
        for (&idx, scope) in groups {
            let Some(Some((start, end))) = m.groups.get(idx) else {
                continue;
            };
            let text = &self.text[*start..*end];
            match scope {
                Some(scope) => self.emit_keyword(text, self.scope_name(scope)),
                None => {
                    self.buffer = text.to_owned();
                    self.process_keywords();
                    self.buffer.clear();
                }
            }
        }
    }

    /// Flushes the buffer through the sublanguage or the keywords of the top mode
    fn process_buffer(&mut self) -> TintaResult<()> {
        if self.top().sub_language.is_some() {
            self.process_sub_language()?;
        } else {
            self.process_keywords();
        }
        self.buffer.clear();
        Ok(())
    }

    fn process_sub_language(&mut self) -> TintaResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let top = self.top();
        let code = mem::take(&mut self.buffer);

        let result = match &top.sub_language {
            Some(SubLanguage::One(name)) => {
                if self.registry.get_language(name).is_none() {
                    self.emitter.add_text(&code);
                    return Ok(());
                }
                let continuation = self.continuations.remove(name);
                let result =
                    highlight_language::<E>(self.registry, name, &code, true, false, continuation)?;
                if let Some(stack) = &result.continuation {
                    self.continuations.insert(name.clone(), stack.clone());
                }
                result
            }
            Some(SubLanguage::Any(candidates)) => {
                let candidates = (!candidates.is_empty()).then_some(candidates.as_slice());
                highlight_auto::<E>(self.registry, &code, candidates)?
            }
            None => return Ok(()),
        };

        // Embedded code only counts if the host mode does
        if top.relevance > 0 {
            self.relevance = self.relevance.saturating_add(result.relevance);
        }
        self.emitter.add_sublanguage(result.emitter, &result.language);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::emitter::{Node, TokenTree};
    use crate::grammars::{Hook, Keywords, Language, Mode, ModeRef, SEARCHES, ScopeSpec};
    use crate::options::Options;
    use crate::test_utils::{get_registry, language_from_mode};

    fn tokenize(registry: &Registry, name: &str, text: &str) -> TintaResult<Tokenized<TokenTree>> {
        let language = registry.compiled_language(name)?;
        Tokenizer::<TokenTree>::new(registry, &language, text, false, None).run()
    }

    fn html(registry: &Registry, name: &str, text: &str) -> String {
        tokenize(registry, name, text).unwrap().emitter.to_html()
    }

    #[test]
    fn keywords_become_leaves() {
        let registry = get_registry();
        let out = tokenize(&registry, "mini", "if (x) else y").unwrap();
        let keywords: Vec<_> = out
            .emitter
            .root()
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Scope(s) => Some((s.scope.clone().unwrap(), s.children.clone())),
                Node::Text(_) => None,
            })
            .collect();
        assert_eq!(
            keywords,
            vec![
                ("keyword".to_string(), vec![Node::Text("if".into())]),
                ("keyword".to_string(), vec![Node::Text("else".into())]),
            ]
        );
        // `if` is too common to count
        assert_eq!(out.relevance, 1);
    }

    #[test]
    fn unterminated_mode_is_force_closed() {
        let registry = get_registry();
        let out = tokenize(&registry, "quoted", "\"abc").unwrap();
        assert_eq!(out.stack.len(), 2);
        assert_eq!(out.emitter.depth(), 0);
        insta::assert_snapshot!(out.emitter.to_html(), @r#"<span class="hljs-string">&quot;abc</span>"#);
    }

    #[test]
    fn illegal_lexeme_reports_the_mode() {
        let registry = get_registry();
        let err = tokenize(&registry, "quoted", "\"ab\ncd\"").unwrap_err();
        match err {
            Error::IllegalLexeme {
                lexeme,
                index,
                mode,
                ..
            } => {
                assert_eq!(lexeme, "\n");
                assert_eq!(index, 3);
                assert_eq!(mode, "string");
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn ignored_illegals_stay_plain() {
        let registry = get_registry();
        let language = registry.compiled_language("quoted").unwrap();
        let out = Tokenizer::<TokenTree>::new(&registry, &language, "\"ab\ncd\"", true, None)
            .run()
            .unwrap();
        assert_eq!(
            out.emitter.to_html(),
            "<span class=\"hljs-string\">&quot;ab\ncd&quot;</span>"
        );
    }

    fn scoped_language() -> Language {
        let function = Mode {
            begin: Some(crate::grammars::RegexSource::Sequence(vec![
                r"\bfn".into(),
                r"\s+".into(),
                r"\w+".into(),
            ])),
            begin_scope: Some(ScopeSpec::from([(1, "keyword"), (3, "title.function")])),
            end: Some(r"\{".into()),
            end_scope: Some("punctuation".into()),
            keywords: Some(Keywords::Words("where".into())),
            ..Default::default()
        };
        let comment = Mode {
            scope: Some("comment".into()),
            begin: Some("#".into()),
            end: Some("$".into()),
            exclude_begin: true,
            ..Default::default()
        };
        language_from_mode(Mode {
            contains: vec![function.into(), comment.into()],
            ..Default::default()
        })
    }

    #[test]
    fn begin_and_end_scopes() {
        let mut registry = Registry::default();
        registry.register_language("scoped", scoped_language()).unwrap();
        insta::assert_snapshot!(
            html(&registry, "scoped", "fn  main where {"),
            @r#"<span class="hljs-keyword">fn</span>  <span class="hljs-title function_">main</span> <span class="hljs-keyword">where</span> <span class="hljs-punctuation">{</span>"#
        );
    }

    #[test]
    fn exclude_begin_leaves_the_delimiter_outside() {
        let mut registry = Registry::default();
        registry.register_language("scoped", scoped_language()).unwrap();
        assert_eq!(
            html(&registry, "scoped", "x # note\ny"),
            "x #<span class=\"hljs-comment\"> note</span>\ny"
        );
    }

    #[test]
    fn vetoed_begin_resumes_with_the_next_rules() {
        let veto = Mode {
            scope: Some("vetoed".into()),
            match_: Some("x".into()),
            on_begin: Some(Hook::new(|_, response| response.ignore_match())),
            ..Default::default()
        };
        let fallback = Mode {
            scope: Some("letter".into()),
            match_: Some("[a-z]".into()),
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "veto",
                language_from_mode(Mode {
                    contains: vec![veto.into(), fallback.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        insta::assert_snapshot!(
            html(&registry, "veto", "xy"),
            @r#"<span class="hljs-letter">x</span><span class="hljs-letter">y</span>"#
        );
    }

    #[test]
    fn vetoed_last_rule_consumes_a_char() {
        let veto = Mode {
            scope: Some("vetoed".into()),
            match_: Some("é".into()),
            on_begin: Some(Hook::new(|_, response| response.ignore_match())),
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "veto",
                language_from_mode(Mode {
                    contains: vec![veto.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(html(&registry, "veto", "éé"), "éé");
    }

    #[test]
    fn hooks_share_data_within_an_activation() {
        // a heredoc-like block: ends with whatever word started it
        let heredoc = Mode {
            scope: Some("string".into()),
            begin: Some(r"<<(\w+)".into()),
            end: Some(r"\w+".into()),
            on_begin: Some(Hook::new(|m, response| {
                let word = m.group(1).unwrap_or_default().to_owned();
                response.data.insert("delimiter".into(), word);
            })),
            on_end: Some(Hook::new(|m, response| {
                if response.data.get("delimiter").map(String::as_str) != Some(m.text()) {
                    response.ignore_match();
                }
            })),
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "heredoc",
                language_from_mode(Mode {
                    contains: vec![heredoc.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        insta::assert_snapshot!(
            html(&registry, "heredoc", "<<EOF a EOF b"),
            @r#"<span class="hljs-string">&lt;&lt;EOF a EOF</span> b"#
        );
    }

    #[test]
    fn ends_parent_closes_both() {
        let inner = Mode {
            scope: Some("inner".into()),
            begin: Some("!".into()),
            ends_parent: true,
            ..Default::default()
        };
        let outer = Mode {
            scope: Some("outer".into()),
            begin: Some(r"\(".into()),
            end: Some(r"\)".into()),
            contains: vec![inner.into()],
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "nest",
                language_from_mode(Mode {
                    contains: vec![outer.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        insta::assert_snapshot!(
            html(&registry, "nest", "(a!b)"),
            @r#"<span class="hljs-outer">(a<span class="hljs-inner">!</span></span>b)"#
        );
    }

    #[test]
    fn starts_follows_the_ended_mode() {
        let attr = Mode {
            scope: Some("attr".into()),
            begin: Some(r"\w+".into()),
            end: Some("".into()),
            return_end: true,
            starts: Some(Arc::new(Mode {
                scope: Some("value".into()),
                begin: Some("=".into()),
                end: Some(r"\s".into()),
                exclude_begin: true,
                exclude_end: true,
                ..Default::default()
            })),
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "kv",
                language_from_mode(Mode {
                    contains: vec![attr.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        insta::assert_snapshot!(
            html(&registry, "kv", "a=1 "),
            @r#"<span class="hljs-attr">a</span><span class="hljs-value">=1</span> "#
        );
    }

    #[test]
    fn zero_width_loop_is_broken_in_safe_mode() {
        let empty = Mode {
            scope: Some("empty".into()),
            begin: Some("(?=a)".into()),
            end: Some("".into()),
            ..Default::default()
        };
        let language = language_from_mode(Mode {
            contains: vec![empty.into()],
            ..Default::default()
        });

        let mut registry = Registry::default();
        registry.register_language("zw", language.clone()).unwrap();
        let out = tokenize(&registry, "zw", "ab").unwrap();
        assert!(out.emitter.to_html().contains('b'));

        let mut strict = Registry::new(Options::default().strict());
        strict.register_language("zw", language).unwrap();
        assert!(matches!(
            tokenize(&strict, "zw", "ab"),
            Err(Error::ZeroWidthMatch { index: 0, .. })
        ));
    }

    #[test]
    fn mode_pushing_itself_in_place_hits_the_loop_guard() {
        let looping = Arc::new(Mode {
            begin: Some("(?=a)".into()),
            end: Some("b".into()),
            contains: vec![ModeRef::SelfRef],
            ..Default::default()
        });
        let mut registry = Registry::default();
        registry
            .register_language(
                "looping",
                language_from_mode(Mode {
                    contains: vec![looping.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        match tokenize(&registry, "looping", "a") {
            Err(Error::LoopGuard {
                iterations, index, ..
            }) => {
                assert_eq!(index, 0);
                assert!(iterations > LOOP_GUARD_ITERATIONS);
            }
            res => panic!("expected the loop guard, got {:?}", res.map(|out| out.stack.len())),
        }
    }

    #[test]
    fn mode_relevance_saturates() {
        let heavy = Mode {
            match_: Some("!".into()),
            relevance: Some(u32::MAX),
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "heavy",
                language_from_mode(Mode {
                    contains: vec![heavy.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(tokenize(&registry, "heavy", "!!").unwrap().relevance, u32::MAX);
    }

    #[test]
    fn one_search_per_token_and_retry() {
        let veto = Mode {
            match_: Some("x".into()),
            on_begin: Some(Hook::new(|_, response| response.ignore_match())),
            ..Default::default()
        };
        let letter = Mode {
            scope: Some("letter".into()),
            match_: Some("x".into()),
            ..Default::default()
        };
        let mut registry = Registry::default();
        registry
            .register_language(
                "veto",
                language_from_mode(Mode {
                    contains: vec![veto.into(), letter.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        let language = registry.compiled_language("veto").unwrap();

        SEARCHES.with(|searches| searches.set(0));
        let out = Tokenizer::<TokenTree>::new(&registry, &language, "x x", false, None)
            .run()
            .unwrap();
        let searches = SEARCHES.with(|searches| searches.get());

        assert_eq!(
            out.emitter.to_html(),
            r#"<span class="hljs-letter">x</span> <span class="hljs-letter">x</span>"#
        );
        // per `x`: the vetoed rule, the retry with the next rule and the zero-width end,
        // then one last search finding nothing
        assert_eq!(searches, 2 * 3 + 1);
    }

    #[test]
    fn sublanguage_gets_grafted() {
        let mut registry = get_registry();
        let embedded = Mode {
            scope: Some("embedded".into()),
            begin: Some("<q>".into()),
            end: Some("</q>".into()),
            exclude_begin: true,
            exclude_end: true,
            sub_language: Some(SubLanguage::One("quoted".into())),
            ..Default::default()
        };
        registry
            .register_language(
                "host",
                language_from_mode(Mode {
                    contains: vec![embedded.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        insta::assert_snapshot!(
            html(&registry, "host", "<q>\"s\"</q>"),
            @r#"&lt;q&gt;<span class="hljs-embedded"><span class="language-quoted"><span class="hljs-string">&quot;s&quot;</span></span></span>&lt;/q&gt;"#
        );
    }

    #[test]
    fn sublanguage_continues_where_it_stopped() {
        let mut registry = get_registry();
        let embedded = Mode {
            begin: Some(r"\[".into()),
            end: Some(r"\]".into()),
            exclude_begin: true,
            exclude_end: true,
            sub_language: Some(SubLanguage::One("quoted".into())),
            ..Default::default()
        };
        registry
            .register_language(
                "host",
                language_from_mode(Mode {
                    contains: vec![embedded.into()],
                    ..Default::default()
                }),
            )
            .unwrap();
        // the string opened in the first block is still open in the second one
        insta::assert_snapshot!(
            html(&registry, "host", "[\"a] [b\"]"),
            @r#"[<span class="language-quoted"><span class="hljs-string">&quot;a</span></span>] [<span class="language-quoted"><span class="hljs-string">b&quot;</span></span>]"#
        );
    }

    #[test]
    fn unknown_sublanguage_is_plain_text() {
        let mut registry = Registry::default();
        let embedded = Mode {
            begin: Some("<".into()),
            end: Some(">".into()),
            sub_language: Some(SubLanguage::One("nope".into())),
            ..Default::default()
        };
        registry
            .register_language(
                "host",
                language_from_mode(Mode {
                    contains: vec![ModeRef::from(embedded)],
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(html(&registry, "host", "<a>"), "&lt;a&gt;");
    }
}
