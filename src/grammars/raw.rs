use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::error::{CompileError, TintaResult};
use crate::grammars::compiled::CompiledMode;

/// The marker used in `contains` to refer to the enclosing mode itself
pub const SELF_MARKER: &str = "self";

/// One pattern or an array of sub-patterns that get concatenated.
///
/// # Examples
/// ```json
/// { "begin": "\"" }
/// ```
///
/// ```json
/// { "begin": ["\\bfn", "\\s+", "[a-z_]+"], "beginScope": { "1": "keyword", "3": "title.function" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RegexSource {
    Single(String),
    Sequence(Vec<String>),
}

impl From<&str> for RegexSource {
    fn from(value: &str) -> Self {
        RegexSource::Single(value.to_owned())
    }
}

impl From<String> for RegexSource {
    fn from(value: String) -> Self {
        RegexSource::Single(value)
    }
}

/// Either a single scope name or a map from capture group index to scope name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScopeSpec {
    Name(String),
    Groups(BTreeMap<String, String>),
}

impl From<&str> for ScopeSpec {
    fn from(value: &str) -> Self {
        ScopeSpec::Name(value.to_owned())
    }
}

impl<const N: usize> From<[(usize, &str); N]> for ScopeSpec {
    fn from(value: [(usize, &str); N]) -> Self {
        ScopeSpec::Groups(
            value
                .into_iter()
                .map(|(idx, scope)| (idx.to_string(), scope.to_owned()))
                .collect(),
        )
    }
}

/// A list of keywords, either space separated or as an array.
/// Each word can carry an explicit relevance with a `|N` suffix, eg `"else|0"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum KeywordList {
    Words(String),
    List(Vec<String>),
}

impl KeywordList {
    pub fn words(&self) -> Vec<&str> {
        match self {
            KeywordList::Words(s) => split_words(s),
            KeywordList::List(l) => l.iter().map(String::as_str).collect(),
        }
    }
}

pub(crate) fn split_words(s: &str) -> Vec<&str> {
    s.split(' ').filter(|w| !w.is_empty()).collect()
}

/// The keywords of a mode.
///
/// # Examples
/// ```json
/// { "keywords": "if else while" }
/// ```
///
/// ```json
/// {
///   "keywords": {
///     "$pattern": "[a-z$]+",
///     "keyword": "if else",
///     "literal": ["true", "false"],
///     "_soft": "match"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    Words(String),
    List(Vec<String>),
    Scoped(BTreeMap<String, KeywordList>),
}

impl From<&str> for Keywords {
    fn from(value: &str) -> Self {
        Keywords::Words(value.to_owned())
    }
}

/// The sublanguage of a mode: one language, or a list of candidates to autodetect from.
/// An empty list autodetects among every registered language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SubLanguage {
    One(String),
    Any(Vec<String>),
}

/// Capture group -> scope of a concatenated `begin`/`end`. Every sub-pattern has an entry,
/// the unscoped ones go through keyword matching.
pub type GroupScopes = BTreeMap<usize, Option<String>>;

/// Per-activation storage hooks can use to pass data from `on_begin` to `on_end`
pub type DataBag = HashMap<String, String>;

/// What a hook sees of the match that triggered it
#[derive(Debug, Clone, Copy)]
pub struct MatchData<'t> {
    /// The whole text being highlighted
    pub input: &'t str,
    /// Byte offset of the match in `input`
    pub index: usize,
    pub(crate) groups: &'t [Option<(usize, usize)>],
}

impl<'t> MatchData<'t> {
    /// The whole matched text
    pub fn text(&self) -> &'t str {
        self.group(0).unwrap_or_default()
    }

    /// The text of the given capture group of the rule, if it participated in the match
    pub fn group(&self, idx: usize) -> Option<&'t str> {
        self.groups
            .get(idx)
            .copied()
            .flatten()
            .map(|(start, end)| &self.input[start..end])
    }
}

/// Lets a hook veto the match it was called for
#[derive(Debug)]
pub struct Response<'a> {
    pub data: &'a mut DataBag,
    ignored: bool,
}

impl<'a> Response<'a> {
    pub(crate) fn new(data: &'a mut DataBag) -> Self {
        Self {
            data,
            ignored: false,
        }
    }

    pub fn ignore_match(&mut self) {
        self.ignored = true;
    }

    pub fn is_match_ignored(&self) -> bool {
        self.ignored
    }
}

/// A callback run when a mode begins or ends
#[derive(Clone)]
pub struct Hook(Arc<dyn Fn(&MatchData<'_>, &mut Response<'_>) + Send + Sync>);

impl Hook {
    pub fn new(f: impl Fn(&MatchData<'_>, &mut Response<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, m: &MatchData<'_>, response: &mut Response<'_>) {
        (self.0)(m, response)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook")
    }
}

/// A grammar normalization step run on every mode of a language before it's compiled
#[derive(Clone)]
pub struct Extension(
    Arc<dyn Fn(Mode, Option<&CompiledMode>) -> Result<Mode, CompileError> + Send + Sync>,
);

impl Extension {
    pub fn new(
        f: impl Fn(Mode, Option<&CompiledMode>) -> Result<Mode, CompileError> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn apply(
        &self,
        mode: Mode,
        parent: Option<&CompiledMode>,
    ) -> Result<Mode, CompileError> {
        (self.0)(mode, parent)
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extension")
    }
}

/// An entry of `contains`: a child mode or the enclosing mode itself
#[derive(Debug, Clone)]
pub enum ModeRef {
    SelfRef,
    Mode(Arc<Mode>),
}

impl From<Mode> for ModeRef {
    fn from(value: Mode) -> Self {
        ModeRef::Mode(Arc::new(value))
    }
}

impl From<Arc<Mode>> for ModeRef {
    fn from(value: Arc<Mode>) -> Self {
        ModeRef::Mode(value)
    }
}

impl<'de> Deserialize<'de> for ModeRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Marker(String),
            Mode(Box<Mode>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Marker(s) if s == SELF_MARKER => Ok(ModeRef::SelfRef),
            Repr::Marker(s) => Err(D::Error::custom(format!(
                "unknown mode reference '{s}', only '{SELF_MARKER}' is allowed"
            ))),
            Repr::Mode(m) => Ok(ModeRef::Mode(Arc::new(*m))),
        }
    }
}

/// A grammar rule describing how to recognize and scope a lexical region.
///
/// Modes are templates: they are shared by reference between languages and never mutated,
/// the compiler always works on its own copy.
///
/// # Examples
/// ```json
/// {
///   "scope": "string",
///   "begin": "\"",
///   "end": "\"",
///   "illegal": "\\n",
///   "contains": [{ "begin": "\\\\[\\s\\S]", "relevance": 0 }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct Mode {
    pub scope: Option<ScopeSpec>,
    /// Legacy name of `scope`
    pub class_name: Option<String>,
    pub begin: Option<RegexSource>,
    pub end: Option<RegexSource>,
    /// Shorthand for a `begin` without `end`
    #[serde(rename(deserialize = "match"))]
    pub match_: Option<RegexSource>,
    pub begin_scope: Option<ScopeSpec>,
    pub end_scope: Option<ScopeSpec>,
    /// Only start this mode if this pattern matches right before `begin`
    pub before_match: Option<String>,
    /// Space separated words, shorthand for a `begin` matching any of them
    pub begin_keywords: Option<String>,
    pub keywords: Option<Keywords>,
    pub contains: Vec<ModeRef>,
    pub variants: Vec<Arc<Mode>>,
    /// Mode entered automatically once this one ends
    pub starts: Option<Arc<Mode>>,
    pub sub_language: Option<SubLanguage>,
    pub illegal: Option<RegexSource>,
    pub relevance: Option<u32>,
    pub ends_with_parent: bool,
    pub ends_parent: bool,
    pub skip: bool,
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    #[serde(skip)]
    pub on_begin: Option<Hook>,
    #[serde(skip)]
    pub on_end: Option<Hook>,
    /// Filled by the compiler, leave it to its default
    #[serde(skip)]
    #[doc(hidden)]
    pub derived: Derived,
}

/// What the compiler passes add to a mode
#[derive(Debug, Clone, Default)]
#[doc(hidden)]
pub struct Derived {
    pub(crate) begin_groups: Option<GroupScopes>,
    pub(crate) end_groups: Option<GroupScopes>,
    pub(crate) before_begin: Option<Hook>,
}

impl Mode {
    /// A copy of this mode with every field set in `overrides` replacing its own.
    /// Flags are combined: a variant can only turn them on.
    pub fn inherit(&self, overrides: &Mode) -> Mode {
        let o = overrides.clone();
        let base = self.clone();
        Mode {
            scope: o.scope.or(base.scope),
            class_name: o.class_name.or(base.class_name),
            begin: o.begin.or(base.begin),
            end: o.end.or(base.end),
            match_: o.match_.or(base.match_),
            begin_scope: o.begin_scope.or(base.begin_scope),
            end_scope: o.end_scope.or(base.end_scope),
            before_match: o.before_match.or(base.before_match),
            begin_keywords: o.begin_keywords.or(base.begin_keywords),
            keywords: o.keywords.or(base.keywords),
            contains: if o.contains.is_empty() {
                base.contains
            } else {
                o.contains
            },
            variants: Vec::new(),
            starts: o.starts.or(base.starts),
            sub_language: o.sub_language.or(base.sub_language),
            illegal: o.illegal.or(base.illegal),
            relevance: o.relevance.or(base.relevance),
            ends_with_parent: o.ends_with_parent || base.ends_with_parent,
            ends_parent: o.ends_parent || base.ends_parent,
            skip: o.skip || base.skip,
            exclude_begin: o.exclude_begin || base.exclude_begin,
            exclude_end: o.exclude_end || base.exclude_end,
            return_begin: o.return_begin || base.return_begin,
            return_end: o.return_end || base.return_end,
            on_begin: o.on_begin.or(base.on_begin),
            on_end: o.on_end.or(base.on_end),
            derived: Derived {
                begin_groups: o.derived.begin_groups.or(base.derived.begin_groups),
                end_groups: o.derived.end_groups.or(base.derived.end_groups),
                before_begin: o.derived.before_begin.or(base.derived.before_begin),
            },
        }
    }

    /// Whether compiling this mode depends on the mode it is nested in
    pub(crate) fn depends_on_parent(&self) -> bool {
        self.ends_with_parent
            || self
                .starts
                .as_ref()
                .is_some_and(|starts| starts.depends_on_parent())
    }
}

/// A complete grammar: language metadata plus its root mode.
///
/// # Examples
/// ```json
/// {
///   "name": "Mini",
///   "aliases": ["mini"],
///   "case_insensitive": true,
///   "keywords": "if else",
///   "contains": [{ "scope": "number", "match": "\\b\\d+\\b", "relevance": 0 }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct Language {
    /// Human-readable name of the language. Defaults to the name it was registered under
    pub name: String,
    pub aliases: Vec<String>,
    #[serde(alias = "case_insensitive")]
    pub case_insensitive: bool,
    /// Exclude this language from autodetection
    pub disable_autodetect: bool,
    /// The language this one extends, preferred on equal relevance
    pub superset_of: Option<String>,
    /// Renames scopes before they get emitted
    pub class_name_aliases: HashMap<String, String>,
    #[serde(flatten)]
    pub mode: Mode,
    #[serde(skip)]
    pub compiler_extensions: Vec<Extension>,
}

impl Language {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TintaResult<Self> {
        let file = File::open(&path)?;
        let language = serde_json::from_reader(&file)?;
        Ok(language)
    }
}
