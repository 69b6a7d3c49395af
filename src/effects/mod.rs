//! Effectful dispatch using Stillwater.
//!
//! This is the asynchronous twin of [`crate::machine`]: the same record
//! shapes and the same lifecycle ordering, with rules and hooks expressed as
//! effect factories instead of plain closures. A single dispatch can suspend
//! at up to three points (transition evaluation, exit hook, enter hook) and
//! resumes without blocking other work.
//!
//! Following Stillwater conventions, stored rules and hooks are factories
//! producing `BoxedEffect`s (one allocation per invocation), built with the
//! free-standing constructors `pure()`, `fail()`, and `from_fn()`.

mod machine;
mod state;

pub use machine::{Machine, MachineBuilder};
pub use state::{EnterHook, ExitHook, Rule, State, Transition};
