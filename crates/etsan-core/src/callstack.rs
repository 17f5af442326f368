//! Per-thread stacks of active instrumented functions.

use std::collections::HashMap;

use crate::symbol::Symbol;
use crate::thread_state::ThreadKey;

/// Result of a function-exit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Popped,
    /// Innermost frame is a different function; nothing was popped.
    Mismatch { top: Symbol },
    /// No frame to pop.
    Underflow,
}

/// Active function names per thread, innermost last.
#[derive(Debug, Default)]
pub struct CallStacks {
    stacks: HashMap<ThreadKey, Vec<Symbol>>,
}

impl CallStacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, thread: ThreadKey, name: Symbol) {
        self.stacks.entry(thread).or_default().push(name);
    }

    /// Pops the innermost frame only if it is `name`.
    pub fn exit(&mut self, thread: ThreadKey, name: &str) -> ExitOutcome {
        let Some(stack) = self.stacks.get_mut(&thread) else {
            return ExitOutcome::Underflow;
        };
        match stack.last() {
            None => ExitOutcome::Underflow,
            Some(top) if top.as_str() == name => {
                stack.pop();
                ExitOutcome::Popped
            }
            Some(top) => ExitOutcome::Mismatch { top: top.clone() },
        }
    }

    /// Copy of the current stack of `thread`.
    #[must_use]
    pub fn trace(&self, thread: ThreadKey) -> Vec<Symbol> {
        self.stacks.get(&thread).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn depth(&self, thread: ThreadKey) -> usize {
        self.stacks.get(&thread).map_or(0, Vec::len)
    }
}
