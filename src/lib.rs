//! Clockwork: an event-driven finite state machine engine.
//!
//! A machine is a set of named states, each with a table of
//! event-to-transition rules and optional enter/exit lifecycle hooks.
//! Dispatching an event resolves it against the active state's table,
//! computes the next state and context, and notifies an observer of every
//! committed change. Context is an opaque JSON payload threaded through
//! every transition.
//!
//! # Core Concepts
//!
//! - **States**: named records with ordered transition tables, built with
//!   the fluent [`State`] constructor
//! - **Transitions**: a bare target name (shorthand) or a computed rule
//! - **Hooks**: optional enter/exit callbacks around every commit
//! - **Dispatch**: `send(event, detail)` returns the new [`CurrentState`]
//!   snapshot; an empty event is a read-only peek
//!
//! Two engines share the data model: [`machine::Machine`] runs synchronous
//! rules and hooks, [`effects::Machine`] runs them as Stillwater effects
//! that may suspend mid-dispatch.
//!
//! # Example
//!
//! ```rust
//! use clockwork::{Machine, NextState, State};
//! use serde_json::json;
//!
//! let mut machine = Machine::builder()
//!     .state(State::new("on").on("powerOff", "off"))
//!     .state(State::new("off").on_rule("powerOn", |_detail, context| {
//!         let jigawatts = context["jigawatts"].as_i64().unwrap_or(0);
//!         if jigawatts <= 0 {
//!             return Ok(NextState::with("off", context));
//!         }
//!         Ok(NextState::with("on", json!({ "jigawatts": jigawatts - 1 })))
//!     }))
//!     .initial("off")
//!     .context(json!({ "jigawatts": 11 }))
//!     .build()
//!     .unwrap();
//!
//! let snapshot = machine.send("powerOn", json!({})).unwrap();
//! assert_eq!(snapshot.state, "on");
//! assert_eq!(snapshot.context["jigawatts"], 10);
//! ```

pub mod core;
pub mod diagram;
pub mod effects;
pub mod error;
pub mod machine;

// Re-export the types most callers touch.
pub use crate::core::{
    merge, Context, CurrentState, EnterOutcome, Fault, Followup, NextState, State, Transition,
};
pub use crate::error::{BuildError, DispatchError, HookKind};
pub use crate::machine::{Machine, MachineBuilder};
