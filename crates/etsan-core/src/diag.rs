//! Non-fatal diagnostics about inconsistent instrumentation.

use std::fmt;

use crate::clock::ThreadId;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Function exit did not match the innermost entered function.
    CallStackMismatch {
        thread: ThreadId,
        exited: String,
        top: Symbol,
    },
    /// Function exit with no entered function.
    CallStackUnderflow { thread: ThreadId, exited: String },
    /// A hook the detector does not model was called.
    Unimplemented { hook: &'static str },
    /// A thread was reported as creating itself.
    SelfFork { thread: ThreadId },
    /// A thread was reported as joining itself.
    SelfJoin { thread: ThreadId },
    /// Join without a matching fork.
    GateUnderflow { thread: ThreadId },
    /// Writing race reports failed.
    ReportWrite { error: String },
}

impl Diagnostic {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CallStackMismatch { .. } => "callstack_mismatch",
            Self::CallStackUnderflow { .. } => "callstack_underflow",
            Self::Unimplemented { .. } => "unimplemented",
            Self::SelfFork { .. } => "self_fork",
            Self::SelfJoin { .. } => "self_join",
            Self::GateUnderflow { .. } => "gate_underflow",
            Self::ReportWrite { .. } => "report_write",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallStackMismatch {
                thread,
                exited,
                top,
            } => write!(
                f,
                "thread {thread}: exit from {exited}() while {top}() is innermost"
            ),
            Self::CallStackUnderflow { thread, exited } => {
                write!(f, "thread {thread}: exit from {exited}() with empty call stack")
            }
            Self::Unimplemented { hook } => write!(f, "{hook} not implemented"),
            Self::SelfFork { thread } => write!(f, "thread {thread} reported as creating itself"),
            Self::SelfJoin { thread } => write!(f, "thread {thread} reported as joining itself"),
            Self::GateUnderflow { thread } => {
                write!(f, "thread {thread}: join without a matching create")
            }
            Self::ReportWrite { error } => write!(f, "failed to write race reports: {error}"),
        }
    }
}
