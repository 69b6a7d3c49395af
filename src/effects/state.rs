//! State records for the effectful engine.
//!
//! Same shape as the synchronous records, except rules and hooks are
//! Stillwater effect factories: invoking one builds a fresh effect, and the
//! dispatcher runs it at the matching suspension point.

use crate::core::{Context, EnterOutcome, Fault, Named, NextState};
use std::sync::Arc;
use stillwater::effect::BoxedEffect;

/// Effectful transition rule: `(detail, context)` to an effect producing
/// the candidate next state.
pub type Rule = Arc<dyn Fn(Context, Context) -> BoxedEffect<NextState, Fault, ()> + Send + Sync>;

/// Effectful enter hook.
pub type EnterHook = Arc<dyn Fn(Context) -> BoxedEffect<EnterOutcome, Fault, ()> + Send + Sync>;

/// Effectful exit hook.
pub type ExitHook = Arc<dyn Fn(Context) -> BoxedEffect<(), Fault, ()> + Send + Sync>;

/// A single entry in a state's transition table.
pub enum Transition {
    /// A bare target state name; dispatch merges the event detail into the
    /// context without suspending.
    Shorthand(String),
    /// A computed, possibly suspending transition.
    Rule(Rule),
}

impl Clone for Transition {
    fn clone(&self) -> Self {
        match self {
            Self::Shorthand(target) => Self::Shorthand(target.clone()),
            Self::Rule(rule) => Self::Rule(Arc::clone(rule)),
        }
    }
}

/// A named state whose rules and hooks run as effects.
///
/// # Example
///
/// ```rust
/// use clockwork::core::NextState;
/// use clockwork::effects::State;
/// use stillwater::prelude::*;
///
/// let off = State::new("off")
///     .on("shortHand", "on")
///     .on_rule("powerOn", |_detail, context| {
///         pure(NextState::with("on", context)).boxed()
///     });
/// assert_eq!(off.name(), "off");
/// ```
pub struct State {
    pub(crate) name: String,
    pub(crate) transitions: Vec<(String, Transition)>,
    pub(crate) enter: Option<EnterHook>,
    pub(crate) exit: Option<ExitHook>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: Vec::new(),
            enter: None,
            exit: None,
        }
    }

    /// Add a shorthand transition: `event` moves straight to `target`.
    pub fn on(mut self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.transitions
            .push((event.into(), Transition::Shorthand(target.into())));
        self
    }

    /// Add a computed transition for `event`.
    pub fn on_rule<F>(mut self, event: impl Into<String>, rule: F) -> Self
    where
        F: Fn(Context, Context) -> BoxedEffect<NextState, Fault, ()> + Send + Sync + 'static,
    {
        self.transitions
            .push((event.into(), Transition::Rule(Arc::new(rule))));
        self
    }

    /// Set the enter hook, run after each commit into this state.
    pub fn enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> BoxedEffect<EnterOutcome, Fault, ()> + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(hook));
        self
    }

    /// Set the exit hook, run before each commit out of this state.
    pub fn exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> BoxedEffect<(), Fault, ()> + Send + Sync + 'static,
    {
        self.exit = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transition table, in declaration order.
    pub fn transitions(&self) -> &[(String, Transition)] {
        &self.transitions
    }

    /// Exact-name lookup, first match wins.
    pub(crate) fn transition(&self, event: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, transition)| transition)
    }
}

impl Named for State {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Clone for State {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            transitions: self.transitions.clone(),
            enter: self.enter.clone(),
            exit: self.exit.clone(),
        }
    }
}
