use std::fmt;
use std::fmt::Write;

use crate::emitter::{Emitter, ScopeNode, TreeVisitor};
use crate::options::Options;

const SPAN_CLOSE: &str = "</span>";

/// Turns a scope into the CSS classes of its span.
///
/// - `language:css` becomes `language-css`
/// - `title.class.inherited` becomes `<prefix>title class_ inherited__`
/// - anything else gets the prefix
pub fn scope_to_css_class(scope: &str, prefix: &str) -> String {
    if let Some(language) = scope.strip_prefix("language:") {
        return format!("language-{language}");
    }
    if scope.contains('.') {
        let mut pieces = scope.split('.');
        let mut out = format!("{prefix}{}", pieces.next().unwrap_or_default());
        for (i, piece) in pieces.enumerate() {
            out.push(' ');
            out.push_str(piece);
            out.push_str(&"_".repeat(i + 1));
        }
        return out;
    }
    format!("{prefix}{scope}")
}

/// Renders a walked [`TokenTree`](crate::TokenTree) to HTML
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    buffer: String,
    class_prefix: String,
}

impl HtmlRenderer {
    pub fn new(class_prefix: &str) -> Self {
        Self {
            buffer: String::new(),
            class_prefix: class_prefix.to_owned(),
        }
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

impl TreeVisitor for HtmlRenderer {
    fn text(&mut self, text: &str) {
        let _ = write!(self.buffer, "{}", HtmlEscaped(text));
    }

    fn open(&mut self, node: &ScopeNode) {
        if let Some(scope) = &node.scope {
            let class = scope_to_css_class(scope, &self.class_prefix);
            let _ = write!(self.buffer, r#"<span class="{class}">"#);
        }
    }

    fn close(&mut self, node: &ScopeNode) {
        if node.scope.is_some() {
            self.buffer.push_str(SPAN_CLOSE);
        }
    }
}

/// An emitter writing HTML as the events come, without building a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlEmitter {
    buffer: String,
    class_prefix: String,
    open: usize,
}

impl HtmlEmitter {
    /// The markup so far, with the nodes still open left unclosed
    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl Emitter for HtmlEmitter {
    fn new(options: &Options) -> Self {
        Self {
            buffer: String::new(),
            class_prefix: options.class_prefix.clone(),
            open: 0,
        }
    }

    fn add_text(&mut self, text: &str) {
        let _ = write!(self.buffer, "{}", HtmlEscaped(text));
    }

    fn open_node(&mut self, scope: &str) {
        let class = scope_to_css_class(scope, &self.class_prefix);
        let _ = write!(self.buffer, r#"<span class="{class}">"#);
        self.open += 1;
    }

    fn close_node(&mut self) {
        if self.open > 0 {
            self.buffer.push_str(SPAN_CLOSE);
            self.open -= 1;
        }
    }

    fn add_sublanguage(&mut self, mut other: Self, name: &str) {
        other.finalize();
        let class = scope_to_css_class(&format!("language:{name}"), &self.class_prefix);
        let _ = write!(
            self.buffer,
            r#"<span class="{class}">{}{SPAN_CLOSE}"#,
            other.buffer
        );
    }

    fn finalize(&mut self) -> bool {
        let had_open = self.open > 0;
        while self.open > 0 {
            self.close_node();
        }
        had_open
    }

    fn to_html(&self) -> String {
        let mut out = self.buffer.clone();
        for _ in 0..self.open {
            out.push_str(SPAN_CLOSE);
        }
        out
    }
}

/// Escapes `& < > " '`
pub fn escape_html(text: &str) -> String {
    HtmlEscaped(text).to_string()
}

/// Wrapper struct which will emit the HTML-escaped version of the contained
/// string when passed to a format string.
pub(crate) struct HtmlEscaped<'a>(pub &'a str);

impl fmt::Display for HtmlEscaped<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(s) = *self;
        let mut last = 0;
        for (i, ch) in s.bytes().enumerate() {
            let escaped = match ch {
                b'>' => "&gt;",
                b'<' => "&lt;",
                b'&' => "&amp;",
                b'\'' => "&#x27;",
                b'"' => "&quot;",
                _ => continue,
            };
            fmt.write_str(&s[last..i])?;
            fmt.write_str(escaped)?;
            last = i + 1;
        }

        if last < s.len() {
            fmt.write_str(&s[last..])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::TokenTree;

    #[test]
    fn scope_classes() {
        assert_eq!(scope_to_css_class("keyword", "hljs-"), "hljs-keyword");
        assert_eq!(scope_to_css_class("language:xml", "hljs-"), "language-xml");
        assert_eq!(
            scope_to_css_class("title.class.inherited", "hljs-"),
            "hljs-title class_ inherited__"
        );
        assert_eq!(scope_to_css_class("string", ""), "string");
    }

    #[test]
    fn escapes_exactly_five_characters() {
        insta::assert_snapshot!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a> é"#),
            @"&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt; é"
        );
    }

    fn feed<E: Emitter>(emitter: &mut E) {
        emitter.add_text("let ");
        emitter.open_node("title.function");
        emitter.add_text("f<T>");
        emitter.close_node();
        emitter.open_node("string");
        emitter.add_text("\"unterminated");
    }

    #[test]
    fn both_backends_render_the_same() {
        let options = Options::default();
        let mut tree = TokenTree::new(&options);
        let mut html = HtmlEmitter::new(&options);
        feed(&mut tree);
        feed(&mut html);

        // before finalizing, open nodes get closed in the output
        assert_eq!(tree.to_html(), html.to_html());
        tree.finalize();
        html.finalize();
        assert_eq!(tree.to_html(), html.as_str());
        insta::assert_snapshot!(
            html.to_html(),
            @r#"let <span class="hljs-title function_">f&lt;T&gt;</span><span class="hljs-string">&quot;unterminated</span>"#
        );
    }

    #[test]
    fn custom_prefix() {
        let options = Options {
            class_prefix: "tok-".into(),
            ..Default::default()
        };
        let mut html = HtmlEmitter::new(&options);
        html.open_node("number");
        html.add_text("1");
        html.close_node();
        html.close_node();
        assert_eq!(html.to_html(), r#"<span class="tok-number">1</span>"#);
    }
}
