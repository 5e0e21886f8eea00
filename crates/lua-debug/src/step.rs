//! Step predicates evaluated against interpreter line events.

use crate::runtime::EventKind;

/// Resume decision for one stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueMode {
    Continue,
    Step,
    StepIn,
    StepOut,
    /// Session ended; the target should run free of the debugger.
    Stopped,
}

/// Active stepping request, captured where the stop was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPredicate {
    Over { line: u32, depth: u32 },
    In { line: u32 },
    Out { depth: u32 },
}

impl StepPredicate {
    /// Predicate for `mode`, or `None` when the mode does not step. Step-out from
    /// the outermost frame has nothing to return to and yields `None`.
    #[must_use]
    pub fn for_mode(mode: ContinueMode, line: u32, depth: u32) -> Option<Self> {
        match mode {
            ContinueMode::Step => Some(Self::Over { line, depth }),
            ContinueMode::StepIn => Some(Self::In { line }),
            ContinueMode::StepOut if depth > 0 => Some(Self::Out { depth }),
            ContinueMode::StepOut | ContinueMode::Continue | ContinueMode::Stopped => None,
        }
    }

    /// Whether the step completes at this event.
    #[must_use]
    pub fn should_stop(&self, kind: EventKind, line: u32, depth: u32) -> bool {
        if kind != EventKind::Line {
            return false;
        }
        match *self {
            Self::Over {
                line: initial_line,
                depth: initial_depth,
            } => depth < initial_depth || (depth == initial_depth && line != initial_line),
            Self::In { line: initial_line } => line != initial_line,
            Self::Out {
                depth: initial_depth,
            } => depth < initial_depth,
        }
    }
}
