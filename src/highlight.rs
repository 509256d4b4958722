use crate::emitter::{Emitter, TokenTree};
use crate::error::{Error, TintaResult};
use crate::registry::Registry;
use crate::renderers::html::escape_html;
use crate::tokenizer::{ModeStack, Tokenizer};

/// Name of the result given to text nothing could be made of
pub const PLAINTEXT_LANGUAGE: &str = "plaintext";

/// How much text to keep around an illegal lexeme, on each side
const ILLEGAL_CONTEXT_BYTES: usize = 100;

/// Where an illegal lexeme was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalBy {
    pub message: String,
    /// Byte offset of the lexeme
    pub index: usize,
    /// Some text around the lexeme
    pub context: String,
    /// The scope of the mode the lexeme was found in
    pub mode: String,
}

/// The runner-up of an autodetection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondBest {
    pub language: String,
    pub relevance: u32,
}

/// The outcome of highlighting a piece of code
#[derive(Debug)]
pub struct HighlightResult<E = TokenTree> {
    /// The name the language was registered under
    pub language: String,
    /// The rendered HTML
    pub value: String,
    pub relevance: u32,
    /// Whether highlighting stopped on an illegal lexeme, in which case `value` is the
    /// escaped code
    pub illegal: bool,
    pub illegal_by: Option<IllegalBy>,
    /// The error that stopped highlighting, only in safe mode
    pub error_raised: Option<Error>,
    /// Only set by autodetection
    pub second_best: Option<SecondBest>,
    pub emitter: E,
    pub(crate) continuation: Option<ModeStack>,
}

impl<E: Emitter> HighlightResult<E> {
    /// A result with the code as plain text
    pub(crate) fn plaintext(registry: &Registry, language: &str, code: &str) -> Self {
        let mut emitter = E::new(registry.options());
        emitter.add_text(code);
        Self {
            language: language.to_owned(),
            value: escape_html(code),
            relevance: 0,
            illegal: false,
            illegal_by: None,
            error_raised: None,
            second_best: None,
            emitter,
            continuation: None,
        }
    }
}

fn context_around(code: &str, index: usize) -> &str {
    let mut start = index.saturating_sub(ILLEGAL_CONTEXT_BYTES);
    while !code.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (index + ILLEGAL_CONTEXT_BYTES).min(code.len());
    while !code.is_char_boundary(end) {
        end += 1;
    }
    &code[start..end]
}

/// Highlights `code` with the language registered as `name`.
///
/// `contain_illegals` turns an illegal lexeme into an `illegal` result even in strict mode,
/// which autodetection needs to keep going.
pub(crate) fn highlight_language<E: Emitter>(
    registry: &Registry,
    name: &str,
    code: &str,
    ignore_illegals: bool,
    contain_illegals: bool,
    continuation: Option<ModeStack>,
) -> TintaResult<HighlightResult<E>> {
    let language = registry.compiled_language(name)?;
    let canonical = registry.canonical_name(name).unwrap_or(name).to_owned();
    let safe_mode = registry.options().safe_mode;

    let tokenizer = Tokenizer::<E>::new(registry, &language, code, ignore_illegals, continuation);
    match tokenizer.run() {
        Ok(tokenized) => Ok(HighlightResult {
            language: canonical,
            value: tokenized.emitter.to_html(),
            relevance: tokenized.relevance,
            illegal: false,
            illegal_by: None,
            error_raised: None,
            second_best: None,
            emitter: tokenized.emitter,
            continuation: Some(tokenized.stack),
        }),
        Err(err) => match &err {
            Error::IllegalLexeme { index, mode, .. } if safe_mode || contain_illegals => {
                if cfg!(feature = "debug") {
                    log::debug!("[highlight_language] {err}");
                }
                let mut result = HighlightResult::plaintext(registry, &canonical, code);
                result.illegal = true;
                result.illegal_by = Some(IllegalBy {
                    message: err.to_string(),
                    index: *index,
                    context: context_around(code, *index).to_owned(),
                    mode: mode.clone(),
                });
                Ok(result)
            }
            Error::LoopGuard { .. } => Err(err),
            _ if safe_mode => {
                log::warn!("highlighting {name} failed: {err}");
                let mut result = HighlightResult::plaintext(registry, &canonical, code);
                result.error_raised = Some(err);
                Ok(result)
            }
            _ => Err(err),
        },
    }
}
