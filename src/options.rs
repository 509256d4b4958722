use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TintaResult;

/// The prefix added to every scope class, eg `hljs-keyword`
pub const DEFAULT_CLASS_PREFIX: &str = "hljs-";

/// Registry-wide configuration.
///
/// Can be deserialized from the same camelCase keys other highlighters use:
/// ```json
/// { "classPrefix": "hl-", "languages": ["rust", "toml"], "ignoreUnescapedHTML": true }
/// ```
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub class_prefix: String,
    /// Don't warn about code blocks containing markup
    #[serde(rename = "ignoreUnescapedHTML")]
    pub ignore_unescaped_html: bool,
    /// Refuse to highlight code blocks containing markup
    #[serde(rename = "throwUnescapedHTML")]
    pub throw_unescaped_html: bool,
    /// Default candidates for autodetection, every registered language if not set
    pub languages: Option<Vec<String>>,
    /// Turn highlight errors into unhighlighted results instead of returning them.
    /// Errors that can only come from a broken grammar are always returned.
    pub safe_mode: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            class_prefix: DEFAULT_CLASS_PREFIX.to_owned(),
            ignore_unescaped_html: false,
            throw_unescaped_html: false,
            languages: None,
            safe_mode: true,
        }
    }
}

impl Options {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TintaResult<Self> {
        let file = File::open(&path)?;
        let options = serde_json::from_reader(&file)?;
        Ok(options)
    }

    /// Returns errors instead of unhighlighted results
    pub fn strict(mut self) -> Self {
        self.safe_mode = false;
        self
    }
}

/// Options for a single highlight call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HighlightOptions<'a> {
    pub(crate) language: &'a str,
    pub(crate) ignore_illegals: bool,
    pub(crate) fallback_to_plain: bool,
}

impl<'a> HighlightOptions<'a> {
    pub fn new(language: &'a str) -> Self {
        Self {
            language,
            ignore_illegals: false,
            fallback_to_plain: false,
        }
    }

    /// Treat text matching an `illegal` pattern as plain text instead of giving up
    pub fn ignore_illegals(mut self, value: bool) -> Self {
        self.ignore_illegals = value;
        self
    }

    /// Whether to return the code as plain text if the requested
    /// language is not found.
    pub fn fallback_to_plain(mut self, value: bool) -> Self {
        self.fallback_to_plain = value;
        self
    }
}
