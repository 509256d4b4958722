use std::sync::LazyLock;

use crate::error::{Error, TintaResult};
use crate::grammars::regex::compile_onig;
use crate::highlight::highlight_language;
use crate::registry::Registry;
use crate::renderers::html::HtmlEmitter;

static LANGUAGE_CLASS_RE: LazyLock<onig::Regex> = LazyLock::new(|| {
    compile_onig(r"\blang(?:uage)?-([\w-]+)\b", true).expect("language class pattern is valid")
});

static ELEMENT_RE: LazyLock<onig::Regex> =
    LazyLock::new(|| compile_onig(r"<[a-zA-Z][^>]*>", false).expect("element pattern is valid"));

static TAG_RE: LazyLock<onig::Regex> =
    LazyLock::new(|| compile_onig(r"<[^>]*>", false).expect("tag pattern is valid"));

/// A `<code>` element to highlight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlock<'a> {
    /// The class attribute of the block
    pub class_name: &'a str,
    /// Its inner markup
    pub inner_html: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedBlock {
    /// The class attribute with `hljs` and `language-<name>` added
    pub class_name: String,
    pub inner_html: String,
    pub language: String,
    pub relevance: u32,
    /// The runner-up language, only when the language was detected
    pub second_best: Option<String>,
}

fn is_no_highlight(class: &str) -> bool {
    class.eq_ignore_ascii_case("no-highlight") || class.eq_ignore_ascii_case("nohighlight")
}

/// What the classes of a block ask for
#[derive(Debug, PartialEq, Eq)]
enum BlockLanguage<'a> {
    Named(&'a str),
    Detect,
    Skip,
}

impl Registry {
    fn block_language<'a>(&self, class_name: &'a str) -> BlockLanguage<'a> {
        if let Some(captures) = LANGUAGE_CLASS_RE.captures(class_name) {
            let name = captures.at(1).unwrap_or_default();
            if self.canonical_name(name).is_some() {
                return BlockLanguage::Named(name);
            }
            log::warn!("could not find the language '{name}', did you forget to register it?");
            return BlockLanguage::Skip;
        }

        for class in class_name.split_whitespace() {
            if is_no_highlight(class) {
                return BlockLanguage::Skip;
            }
            if self.canonical_name(class).is_some() {
                return BlockLanguage::Named(class);
            }
        }
        BlockLanguage::Detect
    }

    /// Highlights the content of a code block, picking the language from its classes.
    ///
    /// Returns `None` when the block should be left as is: it is marked `no-highlight` or
    /// asks for a language that isn't registered.
    pub fn highlight_block(&self, block: &CodeBlock<'_>) -> TintaResult<Option<HighlightedBlock>> {
        let language = self.block_language(block.class_name);
        if language == BlockLanguage::Skip {
            return Ok(None);
        }

        if ELEMENT_RE.find(block.inner_html).is_some() {
            if !self.options().ignore_unescaped_html {
                log::warn!(
                    "a code block contains unescaped HTML, this is a potential XSS vector: {}",
                    block.inner_html
                );
            }
            if self.options().throw_unescaped_html {
                return Err(Error::UnescapedHtml(block.inner_html.to_owned()));
            }
        }

        let code = decode_entities(&TAG_RE.replace_all(block.inner_html, ""));
        let result = match language {
            BlockLanguage::Named(name) => {
                highlight_language::<HtmlEmitter>(self, name, &code, true, false, None)?
            }
            _ => self.highlight_auto_with::<HtmlEmitter>(&code, None)?,
        };

        let mut class_name = block.class_name.trim().to_owned();
        for class in ["hljs".to_owned(), format!("language-{}", result.language)] {
            if !class_name.split_whitespace().any(|c| c == class) {
                if !class_name.is_empty() {
                    class_name.push(' ');
                }
                class_name.push_str(&class);
            }
        }

        Ok(Some(HighlightedBlock {
            class_name,
            inner_html: result.value,
            language: result.language,
            relevance: result.relevance,
            second_best: result.second_best.map(|second| second.language),
        }))
    }
}

/// Reverses the escaping done by the renderers
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
