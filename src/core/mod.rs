//! Core data model shared by both engines.
//!
//! This module contains the plain values the dispatchers move around:
//! - Context payloads and machine snapshots
//! - State records with their transition tables and lifecycle hooks
//! - The ordered state registry
//! - Failure values raised by rules and hooks
//!
//! Nothing in here performs dispatch; the engines in [`crate::machine`] and
//! [`crate::effects`] own all mutation.

mod context;
mod fault;
mod registry;
mod state;

pub use context::{merge, Context, CurrentState, NextState};
pub use fault::Fault;
pub use registry::{Named, Registry};
pub use state::{EnterHook, EnterOutcome, ExitHook, Followup, Rule, State, Transition};
