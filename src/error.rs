use std::fmt;
use std::io;

pub(crate) type TintaResult<T> = Result<T, Error>;

/// Errors that can occur while compiling a grammar.
///
/// They are raised at registration time: a grammar that fails to compile is replaced by an
/// inert plaintext stub so it can't break the rest of the registry.
#[derive(Debug)]
#[non_exhaustive]
pub enum CompileError {
    /// A pattern of the grammar is not a valid regex
    InvalidRegex { pattern: String, error: onig::Error },
    /// The root mode of a language lists the `self` marker in its `contains`
    SelfAtRoot,
    /// `match` was used together with `begin` or `end`
    MatchWithBeginOrEnd,
    /// `beforeMatch` was used together with `starts`
    BeforeMatchWithStarts,
    /// An array-form `begin`/`end` was combined with a flag it can't work with
    MultiScopeIncompatible { key: &'static str },
    /// An array-form `begin`/`end` was given a scope that is not an index -> scope map
    MultiScopeNotMap { key: &'static str },
    /// A key of an index -> scope map is not a number
    InvalidScopeIndex { key: &'static str, index: String },
    /// Raised by a language compiler extension
    Extension(String),
    /// The language compiles to more modes than a `ModeId` can address
    TooManyModes,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidRegex { pattern, error } => {
                write!(f, "invalid regex pattern '{}': {}", pattern, error)
            }
            CompileError::SelfAtRoot => {
                write!(f, "contains `self` is not supported at the top-level of a language")
            }
            CompileError::MatchWithBeginOrEnd => {
                write!(f, "begin & end are not supported with match")
            }
            CompileError::BeforeMatchWithStarts => {
                write!(f, "beforeMatch cannot be used with starts")
            }
            CompileError::MultiScopeIncompatible { key } => {
                write!(f, "{key} is not compatible with skip, exclude or return flags")
            }
            CompileError::MultiScopeNotMap { key } => {
                write!(f, "{key} must be an index -> scope map")
            }
            CompileError::InvalidScopeIndex { key, index } => {
                write!(f, "{key} has a non-numeric group index '{index}'")
            }
            CompileError::Extension(message) => write!(f, "compiler extension: {message}"),
            CompileError::TooManyModes => {
                write!(f, "more than {} modes in a single language", u16::MAX as usize + 1)
            }
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::InvalidRegex { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Errors that can occur during tinta usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar or configuration file
    Io(io::Error),

    /// JSON parsing failed when loading a grammar or a configuration file.
    Json(serde_json::Error),

    /// A grammar failed to compile when it was registered.
    #[allow(missing_docs)]
    Compile {
        language: String,
        source: CompileError,
    },

    /// A language was not found in the registry.
    /// Only happens when asking to highlight something with a language we can't find
    LanguageNotFound(String),

    /// The input hit the `illegal` pattern of the active mode.
    /// Only returned in strict mode, safe mode turns it into an `illegal` result.
    #[allow(missing_docs)]
    IllegalLexeme {
        language: String,
        lexeme: String,
        index: usize,
        mode: String,
    },

    /// A zero-width end matched right after a zero-width begin at the same position.
    /// Only returned in strict mode, safe mode skips one character instead.
    #[allow(missing_docs)]
    ZeroWidthMatch { language: String, index: usize },

    /// The scan loop ran way more iterations than it accepted matches.
    /// This should never happen for a well-formed grammar.
    #[allow(missing_docs)]
    LoopGuard {
        language: String,
        iterations: usize,
        index: usize,
    },

    /// A combined regex failed to compile during tokenization.
    TokenizeRegex(String),

    /// A code block contains live markup and `throw_unescaped_html` is set.
    UnescapedHtml(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::Compile { language, source } => {
                write!(f, "language '{}' failed to compile: {}", language, source)
            }
            Error::LanguageNotFound(name) => write!(f, "unknown language: '{}'", name),
            Error::IllegalLexeme {
                language,
                lexeme,
                index,
                mode,
            } => write!(
                f,
                "illegal lexeme {:?} at {} for mode '{}' ({})",
                lexeme, index, mode, language
            ),
            Error::ZeroWidthMatch { language, index } => {
                write!(f, "0 width match regex at {} ({})", index, language)
            }
            Error::LoopGuard {
                language,
                iterations,
                index,
            } => write!(
                f,
                "potential infinite loop after {} iterations at {} ({})",
                iterations, index, language
            ),
            Error::TokenizeRegex(message) => write!(f, "regex compilation error: {}", message),
            Error::UnescapedHtml(html) => {
                write!(f, "code block includes unescaped HTML: {}", html)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Compile { source, .. } => Some(source),
            Error::LanguageNotFound(_)
            | Error::IllegalLexeme { .. }
            | Error::ZeroWidthMatch { .. }
            | Error::LoopGuard { .. }
            | Error::TokenizeRegex(_)
            | Error::UnescapedHtml(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
