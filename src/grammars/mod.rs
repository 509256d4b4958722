mod compiled;
mod keywords;
pub mod modes;
mod passes;
mod pattern_set;
mod raw;
pub mod regex;

pub use compiled::*;
pub use keywords::{
    COMMON_KEYWORDS, DEFAULT_KEYWORD_PATTERN, DEFAULT_KEYWORD_SCOPE, KEYWORD_PATTERN_KEY, Keyword,
    KeywordTable, SOFT_KEYWORD_PREFIX, compile_keywords,
};
pub use pattern_set::{MultiRegex, ResumableScanner, RuleKind, ScanMatch, ScanRule};
pub use raw::{
    DataBag, Derived, Extension, GroupScopes, Hook, KeywordList, Keywords, Language, MatchData,
    Mode, ModeRef, RegexSource, Response, SELF_MARKER, ScopeSpec, SubLanguage,
};
pub use regex::Regex;

pub(crate) use pattern_set::next_char_boundary;
#[cfg(test)]
pub(crate) use pattern_set::SEARCHES;
