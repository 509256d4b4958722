mod autodetect;
mod block;
mod emitter;
mod error;
pub mod grammars;
mod registry;

mod highlight;
mod options;
mod renderers;
mod tokenizer;

#[cfg(test)]
mod test_utils;

pub use block::{CodeBlock, HighlightedBlock};
pub use emitter::{Emitter, Node, ScopeNode, TokenTree, TreeVisitor};
pub use error::{CompileError, Error};
pub use grammars::{
    CompiledLanguage, DataBag, Extension, Hook, Keywords, Language, MatchData, Mode, ModeRef,
    Response, ScopeSpec, SubLanguage,
};
pub use highlight::{HighlightResult, IllegalBy, PLAINTEXT_LANGUAGE, SecondBest};
pub use options::{DEFAULT_CLASS_PREFIX, HighlightOptions, Options};
pub use registry::Registry;
pub use renderers::html::{HtmlEmitter, HtmlRenderer, escape_html, scope_to_css_class};
pub use tokenizer::{Activation, LOOP_GUARD_ITERATIONS, MAX_KEYWORD_HITS, ModeStack};
