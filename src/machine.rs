//! The synchronous dispatch engine.
//!
//! [`Machine`] owns the current-state pointer and the context cell; states,
//! rules, and hooks only ever *return* new values, which the dispatcher
//! commits. Within one dispatch the lifecycle runs strictly in order:
//! resolve, validate the target, exit the old state, commit, notify, enter
//! the new state, and notify again if the enter hook adopted a replacement
//! context.
//!
//! Re-entrancy is queued: an enter hook cannot call back into the machine,
//! it returns follow-up events in its [`crate::core::EnterOutcome`] and the
//! dispatcher runs them in order after the outer dispatch has fully unwound.
//! A failed dispatch abandons the follow-ups it would have run.

use crate::core::{
    merge, Context, CurrentState, Fault, Followup, NextState, Registry, State, Transition,
};
use crate::error::{BuildError, DispatchError, HookKind};
use std::collections::VecDeque;

type ChangeFn = Box<dyn Fn(&CurrentState) + Send + Sync>;
type LogFn = Box<dyn Fn(&str) + Send + Sync>;

/// A running state machine with synchronous rules and hooks.
///
/// # Example
///
/// ```rust
/// use clockwork::{Machine, State};
/// use serde_json::json;
///
/// let mut machine = Machine::builder()
///     .state(State::new("on").on("powerOff", "off"))
///     .state(State::new("off").on("powerOn", "on"))
///     .initial("off")
///     .context(json!({}))
///     .build()
///     .unwrap();
///
/// assert_eq!(machine.send("powerOn", json!({})).unwrap().state, "on");
/// ```
pub struct Machine {
    registry: Registry<State>,
    current: CurrentState,
    on_change: Option<ChangeFn>,
    on_log: Option<LogFn>,
    pending: VecDeque<Followup>,
}

/// Builder for [`Machine`]: collects the states, initial state, initial
/// context, and observers that make up the machine's immutable wiring.
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

    /// Name the starting state. It does not have to exist: a machine whose
    /// pointer resolves to no state treats every dispatch as a logged no-op.
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = name.into();
        self
    }

    /// The initial context. The machine keeps its own copy; the caller's
    /// value is never aliased or written back.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Observe every committed state/context change.
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CurrentState) + Send + Sync + 'static,
    {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Receive the engine's log lines (unhandled events, unresolvable
    /// states) in addition to the `tracing` output.
    pub fn on_log<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_log = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<Machine, BuildError> {
        let registry = Registry::new(self.states)?;
        let mut machine = Machine {
            registry,
            current: CurrentState::new(self.initial, self.context),
            on_change: self.on_change,
            on_log: self.on_log,
            pending: VecDeque::new(),
        };

        // The initial state's enter hook runs once, before any event is
        // dispatched. Its replacement context is not adopted and a fault
        // from it is not fatal, but follow-ups it requests do run.
        if let Some(enter) = machine
            .registry
            .get(&machine.current.state)
            .and_then(|state| state.enter.clone())
        {
            match enter(machine.current.context.clone()) {
                Ok(outcome) => machine.pending.extend(outcome.followups),
                Err(fault) => machine.log(&format!(
                    "enter hook for initial state '{}' failed: {}",
                    machine.current.state, fault.reason
                )),
            }
        }
        machine.drain().map_err(BuildError::InitialDispatch)?;

        Ok(machine)
    }
}

impl Machine {
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    /// Build a machine without observers.
    pub fn new(
        states: Vec<State>,
        initial: impl Into<String>,
        context: Context,
    ) -> Result<Self, BuildError> {
        Self::builder()
            .states(states)
            .initial(initial)
            .context(context)
            .build()
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

    /// Dispatch `event` with its detail payload.
    ///
    /// An empty event name is the read-only peek form. An event the active
    /// state does not handle, or a current-state pointer that resolves to no
    /// state, returns the snapshot unchanged; only an undefined target state
    /// or a failing rule/hook produces an error.
    pub fn send(&mut self, event: &str, detail: Context) -> Result<CurrentState, DispatchError> {
        if event.is_empty() {
            return Ok(self.current.clone());
        }
        match self.dispatch(event, detail) {
            Ok(()) => {
                self.drain()?;
                Ok(self.current.clone())
            }
            Err(err) => {
                self.pending.clear();
                Err(err)
            }
        }
    }

    /// Run one event through resolve -> validate -> exit -> commit ->
    /// notify -> enter.
    fn dispatch(&mut self, event: &str, detail: Context) -> Result<(), DispatchError> {
        let from = self.current.state.clone();

        let (resolved, exit) = {
            let Some(active) = self.registry.get(&from) else {
                self.log(&format!("no active state '{from}', ignoring '{event}'"));
                return Ok(());
            };
            let Some(transition) = active.transition(event) else {
                self.log(&format!("event '{event}' not handled in state '{from}'"));
                return Ok(());
            };
            let resolved = match transition {
                Transition::Shorthand(target) => Ok(NextState::with(
                    target.clone(),
                    merge(self.current.context.clone(), &detail),
                )),
                Transition::Rule(rule) => rule(detail, self.current.context.clone()),
            };
            (resolved, active.exit.clone())
        };

        let next = match resolved {
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
            if let Err(fault) = exit(self.current.context.clone()) {
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
            match enter(self.current.context.clone()) {
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
    fn drain(&mut self) -> Result<(), DispatchError> {
        while let Some(followup) = self.pending.pop_front() {
            if let Err(err) = self.dispatch(&followup.event, followup.detail) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EnterOutcome;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn power_states() -> Vec<State> {
        vec![
            State::new("on")
                .on_rule("powerOff", |_detail, _context| Ok(NextState::to("off")))
                .on_rule("increasePower", |detail, context| {
                    let jigawatts = context["jigawatts"].as_i64().unwrap_or(0)
                        + detail["increase"].as_i64().unwrap_or(0);
                    let mut next = context;
                    next["jigawatts"] = json!(jigawatts);
                    Ok(NextState::with("on", next))
                })
                .on_rule("badState", |_detail, _context| Ok(NextState::to("bad"))),
            State::new("off")
                .on_rule("powerOn", |_detail, context| {
                    let jigawatts = context["jigawatts"].as_i64().unwrap_or(0);
                    if jigawatts <= 0 {
                        return Ok(NextState::with("off", context));
                    }
                    let mut next = context;
                    next["jigawatts"] = json!(jigawatts - 1);
                    Ok(NextState::with("on", next))
                })
                .on_rule("increasePower", |detail, context| {
                    let jigawatts = context["jigawatts"].as_i64().unwrap_or(0)
                        + detail["increase"].as_i64().unwrap_or(0);
                    let mut next = context;
                    next["jigawatts"] = json!(jigawatts);
                    Ok(NextState::with("off", next))
                })
                .on("shortHand", "off"),
        ]
    }

    fn power_machine() -> Machine {
        Machine::new(power_states(), "off", json!({"jigawatts": 11})).unwrap()
    }

    #[test]
    fn transitions_when_the_active_state_supports_the_event() {
        let mut machine = power_machine();
        let snapshot = machine.send("powerOn", json!({})).unwrap();
        assert_eq!(snapshot.state, "on");
    }

    #[test]
    fn shorthand_merges_detail_into_context() {
        let mut machine = power_machine();
        let snapshot = machine.send("shortHand", json!({"foo": "bar"})).unwrap();
        assert_eq!(snapshot.state, "off");
        assert_eq!(snapshot.context["foo"], "bar");
        assert_eq!(snapshot.context["jigawatts"], 11);
    }

    #[test]
    fn shorthand_detail_wins_on_conflicting_keys() {
        let mut machine = power_machine();
        let snapshot = machine.send("shortHand", json!({"jigawatts": 99})).unwrap();
        assert_eq!(snapshot.context["jigawatts"], 99);
    }

    #[test]
    fn unmatched_event_returns_the_snapshot_unchanged() {
        let mut machine = power_machine();
        let before = machine.peek();
        let after = machine.send("noEvent", json!({})).unwrap();
        assert_eq!(before, after);
        assert_eq!(machine.peek(), before);
    }

    #[test]
    fn unmatched_event_does_not_change_context() {
        let mut machine = power_machine();
        let before = machine.peek();
        let after = machine.send("noEvent", json!({"increase": 11})).unwrap();
        assert_eq!(after.context["jigawatts"], before.context["jigawatts"]);
    }

    #[test]
    fn unmatched_event_fires_no_notification() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut machine = Machine::builder()
            .states(power_states())
            .initial("off")
            .context(json!({"jigawatts": 11}))
            .on_change(move |snapshot| sink.lock().unwrap().push(snapshot.clone()))
            .build()
            .unwrap();

        machine.send("noEvent", json!({})).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_event_is_a_side_effect_free_peek() {
        let mut machine = power_machine();
        let first = machine.send("", json!({"ignored": true})).unwrap();
        let second = machine.send("", json!({})).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.state, "off");
        assert_eq!(first.context["jigawatts"], 11);
    }

    #[test]
    fn rules_update_the_context() {
        let mut machine = power_machine();
        let before = machine.peek();
        let after = machine.send("powerOn", json!({})).unwrap();
        assert_ne!(
            after.context["jigawatts"],
            before.context["jigawatts"]
        );
        assert_eq!(after.context["jigawatts"], 10);
    }

    #[test]
    fn detail_feeds_the_rule() {
        let mut machine = power_machine();
        let snapshot = machine.send("increasePower", json!({"increase": 5})).unwrap();
        assert_eq!(snapshot.context["jigawatts"], 16);
    }

    #[test]
    fn observer_fires_on_commit() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut machine = Machine::builder()
            .states(power_states())
            .initial("off")
            .context(json!({"jigawatts": 11}))
            .on_change(move |snapshot| sink.lock().unwrap().push(snapshot.clone()))
            .build()
            .unwrap();

        machine.send("powerOn", json!({})).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state, "on");
        assert_eq!(seen[0].context["jigawatts"], 10);
    }

    #[test]
    fn undefined_target_fails_and_leaves_the_pointer_alone() {
        let mut machine = power_machine();
        machine.send("powerOn", json!({})).unwrap();

        let err = machine.send("badState", json!({})).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UndefinedTarget { ref target, .. } if target == "bad"
        ));
        assert_eq!(machine.peek().state, "on");
    }

    #[test]
    fn undefined_target_runs_no_hooks_and_no_notification() {
        let trail = Arc::new(Mutex::new(Vec::<String>::new()));
        let exit_trail = Arc::clone(&trail);
        let change_trail = Arc::clone(&trail);
        let mut machine = Machine::builder()
            .state(
                State::new("start")
                    .on("jump", "nowhere")
                    .exit(move |_context| {
                        exit_trail.lock().unwrap().push("exit".into());
                        Ok(())
                    }),
            )
            .initial("start")
            .context(json!({}))
            .on_change(move |_snapshot| change_trail.lock().unwrap().push("notify".into()))
            .build()
            .unwrap();

        machine.send("jump", json!({})).unwrap_err();
        assert!(trail.lock().unwrap().is_empty());
    }

    #[test]
    fn repeated_power_on_drains_the_jigawatts() {
        let mut machine = power_machine();
        for _ in 0..11 {
            let on = machine.send("powerOn", json!({})).unwrap();
            assert_eq!(on.state, "on");
            machine.send("powerOff", json!({})).unwrap();
        }
        let snapshot = machine.send("powerOn", json!({})).unwrap();
        assert_eq!(snapshot.state, "off");
        assert_eq!(snapshot.context["jigawatts"], 0);
    }

    #[test]
    fn duplicate_state_names_are_rejected() {
        let err = Machine::new(
            vec![State::new("on"), State::new("on")],
            "on",
            json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateState(name) if name == "on"));
    }

    #[test]
    fn unknown_initial_state_makes_dispatch_a_noop() {
        let logged = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&logged);
        let mut machine = Machine::builder()
            .states(power_states())
            .initial("standby")
            .context(json!({"jigawatts": 11}))
            .on_log(move |line| sink.lock().unwrap().push(line.to_string()))
            .build()
            .unwrap();

        let snapshot = machine.send("powerOn", json!({})).unwrap();
        assert_eq!(snapshot.state, "standby");
        assert_eq!(snapshot.context["jigawatts"], 11);
        assert!(logged.lock().unwrap()[0].contains("no active state"));
    }

    #[test]
    fn logger_reports_unhandled_events() {
        let logged = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&logged);
        let mut machine = Machine::builder()
            .states(power_states())
            .initial("off")
            .context(json!({}))
            .on_log(move |line| sink.lock().unwrap().push(line.to_string()))
            .build()
            .unwrap();

        machine.send("noEvent", json!({})).unwrap();
        let logged = logged.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert!(logged[0].contains("noEvent"));
        assert!(logged[0].contains("not handled"));
    }

    #[test]
    fn lifecycle_runs_exit_commit_notify_enter_in_order() {
        let trail = Arc::new(Mutex::new(Vec::<String>::new()));
        let exit_trail = Arc::clone(&trail);
        let enter_trail = Arc::clone(&trail);
        let change_trail = Arc::clone(&trail);

        let mut machine = Machine::builder()
            .state(State::new("off").on("powerOn", "on").exit(move |_context| {
                exit_trail.lock().unwrap().push("exit(off)".into());
                Ok(())
            }))
            .state(State::new("on").enter(move |context| {
                enter_trail.lock().unwrap().push("enter(on)".into());
                Ok(EnterOutcome::adopt(merge(context, &json!({"lit": true}))))
            }))
            .initial("off")
            .context(json!({}))
            .on_change(move |snapshot| {
                change_trail
                    .lock()
                    .unwrap()
                    .push(format!("notify({})", snapshot.state));
            })
            .build()
            .unwrap();

        let snapshot = machine.send("powerOn", json!({})).unwrap();
        assert_eq!(snapshot.context["lit"], true);
        assert_eq!(
            *trail.lock().unwrap(),
            vec![
                "exit(off)".to_string(),
                "notify(on)".to_string(),
                "enter(on)".to_string(),
                "notify(on)".to_string(),
            ]
        );
    }

    #[test]
    fn enter_without_adoption_notifies_once() {
        let count = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&count);
        let mut machine = Machine::builder()
            .state(State::new("off").on("powerOn", "on"))
            .state(State::new("on").enter(|_context| Ok(EnterOutcome::retain())))
            .initial("off")
            .context(json!({}))
            .on_change(move |_snapshot| *counter.lock().unwrap() += 1)
            .build()
            .unwrap();

        machine.send("powerOn", json!({})).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn construction_runs_the_initial_enter_hook_without_adopting() {
        let entered = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&entered);
        let machine = Machine::builder()
            .state(State::new("off").enter(move |_context| {
                *counter.lock().unwrap() += 1;
                Ok(EnterOutcome::adopt(json!({"hijacked": true})))
            }))
            .initial("off")
            .context(json!({"jigawatts": 11}))
            .build()
            .unwrap();

        assert_eq!(*entered.lock().unwrap(), 1);
        let snapshot = machine.peek();
        assert_eq!(snapshot.context, json!({"jigawatts": 11}));
    }

    #[test]
    fn enter_followups_auto_advance_after_the_outer_dispatch() {
        let order = Arc::new(Mutex::new(Vec::<String>::new()));
        let change_order = Arc::clone(&order);
        let mut machine = Machine::builder()
            .state(State::new("idle").on("begin", "staging"))
            .state(
                State::new("staging")
                    .on("promote", "live")
                    .enter(|_context| Ok(EnterOutcome::retain().followup("promote", json!({})))),
            )
            .state(State::new("live"))
            .initial("idle")
            .context(json!({}))
            .on_change(move |snapshot| change_order.lock().unwrap().push(snapshot.state.clone()))
            .build()
            .unwrap();

        let snapshot = machine.send("begin", json!({})).unwrap();
        assert_eq!(snapshot.state, "live");
        assert_eq!(
            *order.lock().unwrap(),
            vec!["staging".to_string(), "live".to_string()]
        );
    }

    #[test]
    fn failed_followup_abandons_the_rest_of_the_queue() {
        let mut machine = Machine::builder()
            .state(State::new("idle").on("begin", "staging"))
            .state(State::new("staging").on("promote", "missing").enter(|_context| {
                Ok(EnterOutcome::retain()
                    .followup("promote", json!({}))
                    .followup("promote", json!({})))
            }))
            .initial("idle")
            .context(json!({}))
            .build()
            .unwrap();

        let err = machine.send("begin", json!({})).unwrap_err();
        assert!(matches!(err, DispatchError::UndefinedTarget { .. }));
        // the commit into staging stands; the failing follow-up does not
        assert_eq!(machine.peek().state, "staging");
        // no leftover queue entries fire on the next send
        let snapshot = machine.send("", json!({})).unwrap();
        assert_eq!(snapshot.state, "staging");
    }

    #[test]
    fn rule_fault_with_payload_commits_and_notifies_before_raising() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut machine = Machine::builder()
            .state(State::new("on").on_rule("surge", |_detail, context| {
                Err(Fault::with_payload(
                    "breaker tripped",
                    NextState::with("off", merge(context, &json!({"blown": true}))),
                ))
            }))
            .state(State::new("off"))
            .initial("on")
            .context(json!({}))
            .on_change(move |snapshot| sink.lock().unwrap().push(snapshot.clone()))
            .build()
            .unwrap();

        let err = machine.send("surge", json!({})).unwrap_err();
        match err {
            DispatchError::TransitionFailed {
                reason, committed, ..
            } => {
                assert_eq!(reason, "breaker tripped");
                let committed = committed.unwrap();
                assert_eq!(committed.state, "off");
                assert_eq!(committed.context["blown"], true);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state, "off");
        assert_eq!(machine.peek().state, "off");
    }

    #[test]
    fn rule_fault_without_payload_raises_with_no_notification() {
        let seen = Arc::new(Mutex::new(Vec::<CurrentState>::new()));
        let sink = Arc::clone(&seen);
        let mut machine = Machine::builder()
            .state(State::new("on").on_rule("surge", |_detail, _context| {
                Err(Fault::new("breaker tripped"))
            }))
            .initial("on")
            .context(json!({}))
            .on_change(move |snapshot| sink.lock().unwrap().push(snapshot.clone()))
            .build()
            .unwrap();

        let err = machine.send("surge", json!({})).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::TransitionFailed { committed: None, .. }
        ));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(machine.peek().state, "on");
    }

    #[test]
    fn exit_hook_fault_surfaces_before_any_commit() {
        let mut machine = Machine::builder()
            .state(State::new("on").on("powerOff", "off").exit(|_context| {
                Err(Fault::new("stuck relay"))
            }))
            .state(State::new("off"))
            .initial("on")
            .context(json!({}))
            .build()
            .unwrap();

        let err = machine.send("powerOff", json!({})).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::HookFailed {
                kind: HookKind::Exit,
                ..
            }
        ));
        assert_eq!(machine.peek().state, "on");
    }

    #[test]
    fn enter_hook_fault_keeps_the_committed_transition() {
        let mut machine = Machine::builder()
            .state(State::new("off").on("powerOn", "on"))
            .state(State::new("on").enter(|_context| Err(Fault::new("bulb burnt out"))))
            .initial("off")
            .context(json!({}))
            .build()
            .unwrap();

        let err = machine.send("powerOn", json!({})).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::HookFailed {
                kind: HookKind::Enter,
                ..
            }
        ));
        // the commit preceding the enter hook stands
        assert_eq!(machine.peek().state, "on");
    }
}
