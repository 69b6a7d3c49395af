//! The effectful dispatch engine.

use crate::core::{merge, Context, CurrentState, Fault, Followup, NextState, Registry};
use crate::effects::state::{State, Transition};
use crate::error::{BuildError, DispatchError, HookKind};
use std::collections::VecDeque;
use stillwater::effect::{BoxedEffect, Effect};
use stillwater::prelude::*;

type ChangeFn = Box<dyn Fn(&CurrentState) + Send + Sync>;
type LogFn = Box<dyn Fn(&str) + Send + Sync>;

/// How a matched transition resolved before the commit phase.
enum Resolution {
    Ready(NextState),
    Suspended(BoxedEffect<NextState, Fault, ()>),
}

/// A running state machine whose rules and hooks are effects.
///
/// Dispatch can suspend at up to three points: transition evaluation, the
/// exit hook, and the enter hook. The lifecycle ordering is identical to the
/// synchronous engine's, and so is the queued re-entrancy policy.
///
/// # Example
///
/// ```rust
/// use clockwork::core::NextState;
/// use clockwork::effects::{Machine, State};
/// use serde_json::json;
/// use stillwater::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut machine = Machine::builder()
///     .state(State::new("on").on("powerOff", "off"))
///     .state(State::new("off").on_rule("powerOn", |_detail, context| {
///         pure(NextState::with("on", context)).boxed()
///     }))
///     .initial("off")
///     .context(json!({}))
///     .build()
///     .await
///     .unwrap();
///
/// let snapshot = machine.send("powerOn", json!({})).await.unwrap();
/// assert_eq!(snapshot.state, "on");
/// # }
/// ```
pub struct Machine {
    registry: Registry<State>,
    current: CurrentState,
    on_change: Option<ChangeFn>,
    on_log: Option<LogFn>,
    pending: VecDeque<Followup>,
}

/// Builder for the effectful [`Machine`].
pub struct MachineBuilder {
    states: Vec<State>,
    initial: String,
    context: Context,
    on_change: Option<ChangeFn>,
    on_log: Option<LogFn>,
}

impl MachineBuilder {
    fn new() -> Self {
        Self {
            states: Vec::new(),
            initial: String::new(),
            context: Context::Null,
            on_change: None,
            on_log: None,
        }
    }

    pub fn state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    pub fn states(mut self, states: impl IntoIterator<Item = State>) -> Self {
        self.states.extend(states);
        self
    }

    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = name.into();
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CurrentState) + Send + Sync + 'static,
    {
        self.on_change = Some(Box::new(callback));
        self
    }

    pub fn on_log<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_log = Some(Box::new(callback));
        self
    }

    /// Build the machine, awaiting the initial state's enter effect if one
    /// exists. As in the synchronous engine, its replacement context is not
    /// adopted and a fault from it is logged rather than fatal.
    pub async fn build(self) -> Result<Machine, BuildError> {
        let registry = Registry::new(self.states)?;
        let mut machine = Machine {
            registry,
            current: CurrentState::new(self.initial, self.context),
            on_change: self.on_change,
            on_log: self.on_log,
            pending: VecDeque::new(),
        };

        if let Some(enter) = machine
            .registry
            .get(&machine.current.state)
            .and_then(|state| state.enter.clone())
        {
            match enter(machine.current.context.clone()).run(&()).await {
                Ok(outcome) => machine.pending.extend(outcome.followups),
                Err(fault) => machine.log(&format!(
                    "enter hook for initial state '{}' failed: {}",
                    machine.current.state, fault.reason
                )),
            }
        }
        machine.drain().await.map_err(BuildError::InitialDispatch)?;

        Ok(machine)
    }
}

impl Machine {
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    /// The current snapshot, with no side effects.
    pub fn peek(&self) -> CurrentState {
        self.current.clone()
    }

    /// The state records this machine resolves against, in registration
    /// order.
    pub fn states(&self) -> &[State] {
        self.registry.states()
    }

    /// Dispatch `event` with its detail payload, suspending wherever the
    /// matched rule or the lifecycle hooks do.
    pub async fn send(
        &mut self,
        event: &str,
        detail: Context,
    ) -> Result<CurrentState, DispatchError> {
        if event.is_empty() {
            return Ok(self.current.clone());
        }
        match self.dispatch(event, detail).await {
            Ok(()) => {
                self.drain().await?;
                Ok(self.current.clone())
            }
            Err(err) => {
                self.pending.clear();
                Err(err)
            }
        }
    }

    async fn dispatch(&mut self, event: &str, detail: Context) -> Result<(), DispatchError> {
        let from = self.current.state.clone();

        let (resolution, exit) = {
            let Some(active) = self.registry.get(&from) else {
                self.log(&format!("no active state '{from}', ignoring '{event}'"));
                return Ok(());
            };
            let Some(transition) = active.transition(event) else {
                self.log(&format!("event '{event}' not handled in state '{from}'"));
                return Ok(());
            };
            let resolution = match transition {
                Transition::Shorthand(target) => Resolution::Ready(NextState::with(
                    target.clone(),
                    merge(self.current.context.clone(), &detail),
                )),
                Transition::Rule(rule) => {
                    Resolution::Suspended(rule(detail, self.current.context.clone()))
                }
            };
            (resolution, active.exit.clone())
        };

        let next = match resolution {
            Resolution::Ready(next) => next,
            Resolution::Suspended(effect) => match effect.run(&()).await {
                Ok(next) => next,
                Err(fault) => {
                    let committed = self.commit_fault(&fault);
                    return Err(DispatchError::TransitionFailed {
                        event: event.to_string(),
                        from,
                        reason: fault.reason,
                        committed,
                    });
                }
            },
        };

        // The computed target must exist before anything is mutated.
        let Some(target) = self.registry.get(&next.state) else {
            return Err(DispatchError::UndefinedTarget {
                event: event.to_string(),
                from,
                target: next.state,
            });
        };
        let enter = target.enter.clone();

        if let Some(exit) = exit {
            if let Err(fault) = exit(self.current.context.clone()).run(&()).await {
                let committed = self.commit_fault(&fault);
                return Err(DispatchError::HookFailed {
                    kind: HookKind::Exit,
                    state: from,
                    reason: fault.reason,
                    committed,
                });
            }
        }

        self.current.state = next.state;
        if let Some(context) = next.context {
            self.current.context = context;
        }
        self.notify();

        if let Some(enter) = enter {
            match enter(self.current.context.clone()).run(&()).await {
                Ok(outcome) => {
                    if let Some(context) = outcome.context {
                        self.current.context = context;
                        self.notify();
                    }
                    self.pending.extend(outcome.followups);
                }
                Err(fault) => {
                    let state = self.current.state.clone();
                    let committed = self.commit_fault(&fault);
                    return Err(DispatchError::HookFailed {
                        kind: HookKind::Enter,
                        state,
                        reason: fault.reason,
                        committed,
                    });
                }
            }
        }

        Ok(())
    }

    /// Dispatch queued follow-ups in FIFO order. A failure abandons the
    /// rest of the queue.
    async fn drain(&mut self) -> Result<(), DispatchError> {
        while let Some(followup) = self.pending.pop_front() {
            if let Err(err) = self.dispatch(&followup.event, followup.detail).await {
                self.pending.clear();
                return Err(err);
            }
        }
        Ok(())
    }

    /// A fault payload that names a registered state is committed and
    /// notified so observers see the attempted state. Lifecycle hooks do not
    /// run while unwinding a fault.
    fn commit_fault(&mut self, fault: &Fault) -> Option<CurrentState> {
        let payload = fault.payload.as_ref()?;
        if !self.registry.contains(&payload.state) {
            return None;
        }
        self.current.state = payload.state.clone();
        if let Some(context) = &payload.context {
            self.current.context = context.clone();
        }
        self.notify();
        Some(self.current.clone())
    }

    fn notify(&self) {
        if let Some(on_change) = &self.on_change {
            on_change(&self.current);
        }
    }

    fn log(&self, line: &str) {
        tracing::debug!("{}", line);
        if let Some(on_log) = &self.on_log {
            on_log(line);
        }
    }
}
