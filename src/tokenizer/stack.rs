use std::fmt;

use crate::grammars::{CompiledLanguage, DataBag, ModeId, ROOT_MODE_ID};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Activation {
    /// The compiled mode this activation runs
    pub mode: ModeId,
    /// Whatever the hooks of this activation stored, eg the delimiter of a heredoc
    pub data: DataBag,
}

/// The modes currently open, from the root to the innermost one.
/// The enclosing activation of a frame is always the one before it.
#[derive(Clone, PartialEq, Eq)]
pub struct ModeStack {
    pub frames: Vec<Activation>,
}

impl Default for ModeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Activation {
                mode: ROOT_MODE_ID,
                data: DataBag::new(),
            }],
        }
    }

    /// Called when a begin match is accepted, or when a mode `starts` another one
    pub fn push(&mut self, mode: ModeId, data: DataBag) {
        self.frames.push(Activation { mode, data });
    }

    /// Exits the current mode, getting back to the enclosing one.
    /// The root is never popped.
    pub fn pop(&mut self) -> Option<Activation> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Number of activations, the root included
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Access the top frame of the stack
    pub fn top(&self) -> &Activation {
        self.frames.last().expect("stack never empty")
    }

    /// Mutable access to the top frame of the stack
    pub fn top_mut(&mut self) -> &mut Activation {
        self.frames.last_mut().expect("stack never empty")
    }

    /// The activation at `depth`, 0 being the root
    pub fn get(&self, depth: usize) -> Option<&Activation> {
        self.frames.get(depth)
    }

    /// Human-readable version of the stack, using the scopes of the modes
    pub fn describe(&self, language: &CompiledLanguage) -> String {
        self.frames
            .iter()
            .map(|frame| language.mode(frame.mode).display_name())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl fmt::Debug for ModeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ModeStack:")?;

        for (depth, frame) in self.frames.iter().enumerate() {
            let indent = "  ".repeat(depth);
            write!(f, "{}mode={}", indent, *frame.mode)?;

            if !frame.data.is_empty() {
                let mut keys: Vec<_> = frame.data.keys().collect();
                keys.sort();
                write!(f, " data=[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={:?}", key, frame.data[*key])?;
                }
                write!(f, "]")?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}
