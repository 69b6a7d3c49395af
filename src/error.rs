//! Error types for machine construction and dispatch.

use crate::core::CurrentState;
use std::fmt;
use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate state name '{0}' in machine definition")]
    DuplicateState(String),

    #[error("dispatch requested by the initial state's enter hook failed")]
    InitialDispatch(#[source] DispatchError),
}

/// Errors surfaced by `send`.
///
/// An unmatched event or an unresolvable active state is *not* an error:
/// both are recovered locally, logged, and the current snapshot is returned
/// unchanged.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A transition produced a target state the machine does not know.
    /// Nothing was committed.
    #[error("transition for '{event}' in state '{from}' targets undefined state '{target}'")]
    UndefinedTarget {
        event: String,
        from: String,
        target: String,
    },

    /// A transition rule failed. When the fault carried a usable payload,
    /// `committed` holds the snapshot observers were notified with.
    #[error("transition for '{event}' in state '{from}' failed: {reason}")]
    TransitionFailed {
        event: String,
        from: String,
        reason: String,
        committed: Option<CurrentState>,
    },

    /// A lifecycle hook failed.
    #[error("{kind} hook for state '{state}' failed: {reason}")]
    HookFailed {
        kind: HookKind,
        state: String,
        reason: String,
        committed: Option<CurrentState>,
    },
}

/// Which lifecycle hook raised a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    Enter,
    Exit,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Exit => write!(f, "exit"),
        }
    }
}
