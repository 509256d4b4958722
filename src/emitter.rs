use crate::options::Options;
use crate::renderers::html::HtmlRenderer;

/// Receives the events of the tokenizer.
///
/// Every `open_node` gets a matching `close_node`, unless the input ends or the tokenizer
/// stops early, in which case `finalize` closes what is still open.
pub trait Emitter: Sized {
    fn new(options: &Options) -> Self;

    fn add_text(&mut self, text: &str);

    fn open_node(&mut self, scope: &str);

    fn close_node(&mut self);

    /// Adds the finished output of another emitter, scoped as `language:<name>`
    fn add_sublanguage(&mut self, other: Self, name: &str);

    /// Closes every node still open. Calling it again does nothing.
    /// Returns whether there were any nodes left to close.
    fn finalize(&mut self) -> bool;

    fn to_html(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Scope(ScopeNode),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeNode {
    /// `None` only for the root
    pub scope: Option<String>,
    pub children: Vec<Node>,
}

impl ScopeNode {
    fn new(scope: &str) -> Self {
        Self {
            scope: Some(scope.to_owned()),
            children: Vec::new(),
        }
    }

    fn add_text(&mut self, text: &str) {
        // Consecutive text gets merged into one node
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_owned()));
        }
    }
}

/// Walks a [`TokenTree`] depth first
pub trait TreeVisitor {
    fn text(&mut self, text: &str);
    fn open(&mut self, node: &ScopeNode);
    fn close(&mut self, node: &ScopeNode);
}

/// Builds the tree of scopes from the tokenizer events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTree {
    /// The root followed by every node still open, innermost last.
    /// An open node becomes a child of the one before it once closed.
    stack: Vec<ScopeNode>,
    class_prefix: String,
}

impl TokenTree {
    /// The root of the tree, only complete after `finalize`
    pub fn root(&self) -> &ScopeNode {
        &self.stack[0]
    }

    /// How many nodes are open, not counting the root
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn top(&mut self) -> &mut ScopeNode {
        self.stack
            .last_mut()
            .expect("the root is never popped")
    }

    /// Visits the tree as if it was finalized, without closing anything
    pub fn walk<V: TreeVisitor>(&self, visitor: &mut V) {
        for (depth, node) in self.stack.iter().enumerate() {
            if depth > 0 {
                visitor.open(node);
            }
            walk_children(&node.children, visitor);
        }
        for node in self.stack[1..].iter().rev() {
            visitor.close(node);
        }
    }
}

fn walk_children<V: TreeVisitor>(children: &[Node], visitor: &mut V) {
    for child in children {
        match child {
            Node::Text(text) => visitor.text(text),
            Node::Scope(node) => {
                visitor.open(node);
                walk_children(&node.children, visitor);
                visitor.close(node);
            }
        }
    }
}

impl Emitter for TokenTree {
    fn new(options: &Options) -> Self {
        Self {
            stack: vec![ScopeNode::default()],
            class_prefix: options.class_prefix.clone(),
        }
    }

    fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.top().add_text(text);
    }

    fn open_node(&mut self, scope: &str) {
        self.stack.push(ScopeNode::new(scope));
    }

    fn close_node(&mut self) {
        if self.stack.len() > 1
            && let Some(node) = self.stack.pop()
        {
            self.top().children.push(Node::Scope(node));
        }
    }

    fn add_sublanguage(&mut self, mut other: Self, name: &str) {
        other.finalize();
        let Some(mut root) = other.stack.pop() else {
            return;
        };
        root.scope = Some(format!("language:{name}"));
        self.top().children.push(Node::Scope(root));
    }

    fn finalize(&mut self) -> bool {
        let had_open = self.stack.len() > 1;
        while self.stack.len() > 1 {
            self.close_node();
        }
        had_open
    }

    fn to_html(&self) -> String {
        let mut renderer = HtmlRenderer::new(&self.class_prefix);
        self.walk(&mut renderer);
        renderer.finish()
    }
}
