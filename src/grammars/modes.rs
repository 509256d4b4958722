//! Building blocks shared by many grammars.
//!
//! They are plain templates: every language compiles its own copy.

use std::sync::{Arc, LazyLock};

use crate::grammars::raw::{Hook, Mode, ModeRef};

pub const IDENT_RE: &str = r"[a-zA-Z]\w*";
pub const UNDERSCORE_IDENT_RE: &str = r"[a-zA-Z_]\w*";
pub const NUMBER_RE: &str = r"\b\d+(\.\d+)?";
pub const C_NUMBER_RE: &str =
    r"(-?)(\b0[xX][a-fA-F0-9]+|(\b\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?)";
pub const BINARY_NUMBER_RE: &str = r"\b(0b[01]+)";

const DOCTAG_WORDS: &str = "(TODO|FIXME|NOTE|BUG|OPTIMIZE|HACK|XXX):";
const BEGIN_MATCH_KEY: &str = "_beginMatch";

pub static BACKSLASH_ESCAPE: LazyLock<Arc<Mode>> = LazyLock::new(|| {
    Arc::new(Mode {
        begin: Some(r"\\[\s\S]".into()),
        relevance: Some(0),
        ..Default::default()
    })
});

pub static APOS_STRING_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(string_mode("'")));

pub static QUOTE_STRING_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(string_mode("\"")));

pub static C_LINE_COMMENT_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(comment("//", "$", Mode::default())));

pub static C_BLOCK_COMMENT_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(comment(r"/\*", r"\*/", Mode::default())));

pub static HASH_COMMENT_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(comment("#", "$", Mode::default())));

pub static NUMBER_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(number_mode(NUMBER_RE)));

pub static C_NUMBER_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(number_mode(C_NUMBER_RE)));

pub static BINARY_NUMBER_MODE: LazyLock<Arc<Mode>> =
    LazyLock::new(|| Arc::new(number_mode(BINARY_NUMBER_RE)));

pub static TITLE_MODE: LazyLock<Arc<Mode>> = LazyLock::new(|| {
    Arc::new(Mode {
        scope: Some("title".into()),
        begin: Some(IDENT_RE.into()),
        relevance: Some(0),
        ..Default::default()
    })
});

fn string_mode(quote: &str) -> Mode {
    Mode {
        scope: Some("string".into()),
        begin: Some(quote.into()),
        end: Some(quote.into()),
        illegal: Some(r"\n".into()),
        contains: vec![ModeRef::from(BACKSLASH_ESCAPE.clone())],
        ..Default::default()
    }
}

fn number_mode(pattern: &str) -> Mode {
    Mode {
        scope: Some("number".into()),
        begin: Some(pattern.into()),
        relevance: Some(0),
        ..Default::default()
    }
}

/// A comment from `begin` to `end`, with `overrides` applied on top.
/// Doc tags like `TODO:` inside get their own scope.
pub fn comment(begin: &str, end: &str, overrides: Mode) -> Mode {
    let base = Mode {
        scope: Some("comment".into()),
        begin: Some(begin.into()),
        end: Some(end.into()),
        ..Default::default()
    };
    let mut mode = base.inherit(&overrides);
    mode.contains.push(ModeRef::from(Mode {
        scope: Some("doctag".into()),
        begin: Some(format!("[ ]*(?={DOCTAG_WORDS})").into()),
        end: Some(DOCTAG_WORDS.into()),
        exclude_begin: true,
        relevance: Some(0),
        ..Default::default()
    }));
    mode
}

/// Makes the mode end only on an end match whose first group is the same text as the first
/// group of its begin match, eg heredocs or raw strings with custom delimiters.
pub fn end_same_as_begin(mode: Mode) -> Mode {
    Mode {
        on_begin: Some(Hook::new(|m, response| {
            let begin = m.group(1).unwrap_or_default().to_owned();
            response.data.insert(BEGIN_MATCH_KEY.to_owned(), begin);
        })),
        on_end: Some(Hook::new(|m, response| {
            let end = m.group(1).unwrap_or_default();
            if response.data.get(BEGIN_MATCH_KEY).map(String::as_str) != Some(end) {
                response.ignore_match();
            }
        })),
        ..mode
    }
}
