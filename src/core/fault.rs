//! Failure values raised by transition rules and lifecycle hooks.

use crate::core::context::NextState;

/// A failure raised by a transition rule or lifecycle hook.
///
/// The optional payload names the state the failing callee was headed for.
/// When the payload resolves against the machine's registry, the dispatcher
/// commits and notifies it before surfacing the error, so observers see the
/// attempted state and any enriched context. A fault without a usable
/// payload is surfaced as-is with no notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    pub reason: String,
    pub payload: Option<NextState>,
}

impl Fault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            payload: None,
        }
    }

    pub fn with_payload(reason: impl Into<String>, payload: NextState) -> Self {
        Self {
            reason: reason.into(),
            payload: Some(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fault_carries_payload() {
        let fault = Fault::with_payload(
            "power surge",
            NextState::with("off", json!({"blown": true})),
        );
        assert_eq!(fault.reason, "power surge");
        assert_eq!(fault.payload.unwrap().state, "off");
    }

    #[test]
    fn bare_fault_has_no_payload() {
        assert!(Fault::new("boom").payload.is_none());
    }
}
