use std::collections::HashMap;

use crate::grammars::raw::{KeywordList, Keywords, split_words};

/// Scope given to keywords declared as a plain string or list
pub const DEFAULT_KEYWORD_SCOPE: &str = "keyword";

/// Key of a scoped keyword map that overrides the pattern used to find words
pub const KEYWORD_PATTERN_KEY: &str = "$pattern";

/// Pattern used to find words when a grammar doesn't provide its own
pub const DEFAULT_KEYWORD_PATTERN: &str = r"\w+";

/// Words too common across languages to say anything about which one we're looking at.
/// They default to a relevance of 0.
pub const COMMON_KEYWORDS: [&str; 11] = [
    "of", "and", "for", "in", "not", "or", "if", "then", "parent", "list", "value",
];

/// A keyword scope starting with this prefix is matched but neither scoped nor scored
pub const SOFT_KEYWORD_PREFIX: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub scope: String,
    pub relevance: u32,
}

impl Keyword {
    pub fn is_soft(&self) -> bool {
        self.scope.starts_with(SOFT_KEYWORD_PREFIX)
    }
}

/// word (lowercased for case insensitive grammars) -> (scope, relevance)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTable(HashMap<String, Keyword>);

impl KeywordTable {
    pub fn get(&self, word: &str) -> Option<&Keyword> {
        self.0.get(word)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn add_list(&mut self, scope: &str, words: Vec<&str>, case_insensitive: bool) {
        for entry in words {
            let (word, provided) = match entry.split_once('|') {
                Some((word, score)) => (word, Some(score)),
                None => (entry, None),
            };
            let word = if case_insensitive {
                word.to_lowercase()
            } else {
                word.to_owned()
            };
            let relevance = score_for_keyword(&word, provided);
            self.0.insert(
                word,
                Keyword {
                    scope: scope.to_owned(),
                    relevance,
                },
            );
        }
    }
}

fn score_for_keyword(word: &str, provided: Option<&str>) -> u32 {
    if let Some(score) = provided.and_then(|s| s.parse().ok()) {
        return score;
    }
    if COMMON_KEYWORDS.contains(&word.to_lowercase().as_str()) {
        0
    } else {
        1
    }
}

/// Splits the raw keywords into the `$pattern` override, if any, and the flat table
pub fn compile_keywords(raw: &Keywords, case_insensitive: bool) -> (Option<String>, KeywordTable) {
    let mut table = KeywordTable::default();
    let mut pattern = None;

    match raw {
        Keywords::Words(s) => {
            table.add_list(DEFAULT_KEYWORD_SCOPE, split_words(s), case_insensitive)
        }
        Keywords::List(l) => table.add_list(
            DEFAULT_KEYWORD_SCOPE,
            l.iter().map(String::as_str).collect(),
            case_insensitive,
        ),
        Keywords::Scoped(map) => {
            for (scope, list) in map {
                if scope == KEYWORD_PATTERN_KEY {
                    if let KeywordList::Words(p) = list {
                        pattern = Some(p.clone());
                    }
                    continue;
                }
                table.add_list(scope, list.words(), case_insensitive);
            }
        }
    }

    (pattern, table)
}
