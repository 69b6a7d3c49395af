//! State records for the synchronous engine.
//!
//! A state is a name, an ordered table of event-to-transition entries, and
//! optional enter/exit hooks. Records are built once with the fluent
//! constructor and never mutated afterwards; the machine shares them for its
//! entire lifetime.

use crate::core::context::{Context, NextState};
use crate::core::fault::Fault;
use crate::core::registry::Named;
use std::sync::Arc;

/// Transition rule: `(detail, context)` to a candidate next state.
pub type Rule = Arc<dyn Fn(Context, Context) -> Result<NextState, Fault> + Send + Sync>;

/// Enter hook: receives the just-committed context and says what to do next.
pub type EnterHook = Arc<dyn Fn(Context) -> Result<EnterOutcome, Fault> + Send + Sync>;

/// Exit hook: receives the pre-commit context; any returned value would be
/// discarded, so there is none.
pub type ExitHook = Arc<dyn Fn(Context) -> Result<(), Fault> + Send + Sync>;

/// A single entry in a state's transition table.
pub enum Transition {
    /// A bare target state name. Dispatch merges the event detail into the
    /// context on the way through.
    Shorthand(String),
    /// A computed transition.
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

/// A dispatch deferred by an enter hook until the current one unwinds.
#[derive(Clone, Debug, PartialEq)]
pub struct Followup {
    pub event: String,
    pub detail: Context,
}

/// What an enter hook asks the machine to do after a commit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnterOutcome {
    /// Replacement context to adopt. Adoption fires a second change
    /// notification with the updated snapshot.
    pub context: Option<Context>,
    /// Events to dispatch once the current dispatch has fully unwound,
    /// in order.
    pub followups: Vec<Followup>,
}

impl EnterOutcome {
    /// Keep the committed context as-is.
    pub fn retain() -> Self {
        Self::default()
    }

    /// Adopt a replacement context.
    pub fn adopt(context: Context) -> Self {
        Self {
            context: Some(context),
            followups: Vec::new(),
        }
    }

    /// Queue an event for dispatch after the current one completes. Chain
    /// for transient states that advance themselves.
    pub fn followup(mut self, event: impl Into<String>, detail: Context) -> Self {
        self.followups.push(Followup {
            event: event.into(),
            detail,
        });
        self
    }
}

/// A named state: transition table plus optional lifecycle hooks.
///
/// # Example
///
/// ```rust
/// use clockwork::{NextState, State};
///
/// let off = State::new("off")
///     .on("shortHand", "on")
///     .on_rule("powerOn", |_detail, context| Ok(NextState::with("on", context)));
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
        F: Fn(Context, Context) -> Result<NextState, Fault> + Send + Sync + 'static,
    {
        self.transitions
            .push((event.into(), Transition::Rule(Arc::new(rule))));
        self
    }

    /// Set the enter hook, run after each commit into this state.
    pub fn enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Result<EnterOutcome, Fault> + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(hook));
        self
    }

    /// Set the exit hook, run before each commit out of this state.
    pub fn exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Result<(), Fault> + Send + Sync + 'static,
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
