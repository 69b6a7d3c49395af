//! Context values and machine snapshots.
//!
//! The context is the mutable payload data carried alongside the current
//! state name. It is opaque to the engine: transitions and hooks read it and
//! return replacements, but only the dispatcher ever writes the machine's
//! own copy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The payload data carried alongside the current state name.
///
/// Represented as a JSON value so callers can thread arbitrary structured
/// data through transitions without the engine caring about its shape.
pub type Context = Value;

/// Snapshot of a machine: the active state name plus its context.
///
/// This is the only externally observable view of machine status. Every
/// dispatch returns one, and the change observer receives one per committed
/// state or context change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub state: String,
    pub context: Context,
}

impl CurrentState {
    pub fn new(state: impl Into<String>, context: Context) -> Self {
        Self {
            state: state.into(),
            context,
        }
    }
}

/// Candidate produced by a transition rule: the target state plus an
/// optional replacement context.
///
/// A `None` context means "retain the machine's current context verbatim" —
/// context is never silently dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NextState {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

impl NextState {
    /// Target a state, retaining the current context.
    pub fn to(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            context: None,
        }
    }

    /// Target a state with a replacement context.
    pub fn with(state: impl Into<String>, context: Context) -> Self {
        Self {
            state: state.into(),
            context: Some(context),
        }
    }
}

/// Overlay `detail`'s fields onto `context`, with `detail` winning on
/// conflicting keys.
///
/// Only an object-shaped detail contributes fields; any other detail value
/// leaves the context untouched. A non-object context contributes nothing of
/// its own when detail is an object.
pub fn merge(context: Context, detail: &Context) -> Context {
    let Value::Object(overlay) = detail else {
        return context;
    };
    let mut base = match context {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
    Value::Object(base)
}
