use std::fmt;
use std::sync::{Arc, LazyLock};

use onig::{RegexOptions, Region, SearchOptions, Syntax};

use crate::error::CompileError;

/// Finds, in order: a character class, a group opening, a numbered backreference or any
/// other escape. Used to renumber backreferences when patterns get concatenated.
static BACKREF_RE: LazyLock<onig::Regex> = LazyLock::new(|| {
    onig::Regex::new(r"\[(?:[^\\\]]|\\.)*\]|\(\??|\\([1-9][0-9]*)|\\.")
        .expect("backreference scanner pattern is valid")
});

pub(crate) fn regex_options(case_insensitive: bool) -> RegexOptions {
    if case_insensitive {
        RegexOptions::REGEX_OPTION_CAPTURE_GROUP | RegexOptions::REGEX_OPTION_IGNORECASE
    } else {
        RegexOptions::REGEX_OPTION_CAPTURE_GROUP
    }
}

pub(crate) fn compile_onig(
    pattern: &str,
    case_insensitive: bool,
) -> Result<onig::Regex, CompileError> {
    onig::Regex::with_options(pattern, regex_options(case_insensitive), Syntax::default()).map_err(
        |error| CompileError::InvalidRegex {
            pattern: pattern.to_owned(),
            error,
        },
    )
}

/// A compiled regex that keeps its source around.
///
/// `^` and `$` are line anchors with the default (Ruby) syntax, which is the multiline
/// behaviour grammars expect.
pub struct Regex {
    pattern: String,
    compiled: Arc<onig::Regex>,
}

impl Clone for Regex {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            compiled: Arc::clone(&self.compiled),
        }
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

impl Regex {
    pub fn new(pattern: String, case_insensitive: bool) -> Result<Self, CompileError> {
        let compiled = compile_onig(&pattern, case_insensitive)?;
        Ok(Self {
            pattern,
            compiled: Arc::new(compiled),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether this regex matches `text` starting exactly at byte `at`.
    /// The text before `at` is still visible to lookbehinds.
    pub fn matches_at(&self, text: &str, at: usize) -> bool {
        self.compiled
            .match_with_options(text, at, SearchOptions::SEARCH_OPTION_NONE, None)
            .is_some()
    }

    /// All non-overlapping matches as byte ranges
    pub fn find_iter<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.compiled.find_iter(text)
    }
}

/// How many capture groups the pattern declares
pub fn count_match_groups(pattern: &str, case_insensitive: bool) -> Result<usize, CompileError> {
    Ok(compile_onig(pattern, case_insensitive)?.captures_len())
}

/// Wraps every pattern in its own capture group and joins them with `join_with`,
/// shifting numbered backreferences so that each still points at the group it meant
/// in its own pattern.
pub fn rewrite_backreferences<S: AsRef<str>>(patterns: &[S], join_with: &str) -> String {
    let mut num_captures = 0;
    let mut out = Vec::with_capacity(patterns.len());

    for pattern in patterns {
        num_captures += 1;
        let offset = num_captures;
        let mut re = pattern.as_ref();
        let mut rewritten = String::with_capacity(re.len() + 2);
        rewritten.push('(');

        while !re.is_empty() {
            let mut region = Region::new();
            let found = BACKREF_RE.search_with_options(
                re,
                0,
                re.len(),
                SearchOptions::SEARCH_OPTION_NONE,
                Some(&mut region),
            );
            let Some((start, end)) = found.and_then(|_| region.pos(0)) else {
                rewritten.push_str(re);
                break;
            };
            rewritten.push_str(&re[..start]);
            let token = &re[start..end];

            if let Some((ref_start, ref_end)) = region.pos(1) {
                let number: usize = re[ref_start..ref_end].parse().unwrap_or_default();
                rewritten.push('\\');
                rewritten.push_str(&(number + offset).to_string());
            } else {
                rewritten.push_str(token);
                if token == "(" {
                    num_captures += 1;
                }
            }
            re = &re[end..];
        }

        rewritten.push(')');
        out.push(rewritten);
    }

    out.join(join_with)
}

/// `(?:a|b|c)`
pub fn either<S: AsRef<str>>(patterns: &[S]) -> String {
    let joined: Vec<&str> = patterns.iter().map(|p| p.as_ref()).collect();
    format!("(?:{})", joined.join("|"))
}

/// Plain concatenation of the patterns
pub fn concat<S: AsRef<str>>(patterns: &[S]) -> String {
    patterns.iter().map(|p| p.as_ref()).collect()
}

/// `(?=pattern)`
pub fn lookahead(pattern: &str) -> String {
    format!("(?={pattern})")
}

/// `(?:pattern)?`
pub fn optional(pattern: &str) -> String {
    format!("(?:{pattern})?")
}

/// Escapes every regex metacharacter of `literal`
pub fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '-' | '[' | ']' | '/' | '{' | '}' | '(' | ')' | '*' | '+' | '?' | '.' | '\\' | '^'
                | '$' | '|'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
