//! Mermaid state diagram import and export.
//!
//! Export produces `stateDiagram-v2` text whose shape is stable byte for
//! byte: a leading blank line, the header, the `[*] --> initial` marker,
//! then one `source --> target: event` line per transition, with sources in
//! registration order and transitions in table order.
//!
//! Import goes through [`Chart`], a structured intermediate form, instead of
//! generated source text; `Chart::states` materializes shorthand-only state
//! records ready to drop into a machine builder.

use crate::core::{State, Transition};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Errors from diagram parsing and export probing.
#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("line {line} is not of the form 'source --> target: event': '{text}'")]
    Malformed { line: usize, text: String },

    #[error("probing transition '{event}' of state '{state}' failed: {reason}")]
    Probe {
        state: String,
        event: String,
        reason: String,
    },
}

/// A single `source --> target: event` edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub event: String,
    pub to: String,
}

/// Structured form of a state diagram: the initial state plus every edge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub initial: String,
    pub edges: Vec<Edge>,
}

/// Build a [`Chart`] from state records.
///
/// Computed transitions are probed with empty detail and context to learn
/// their target, so probe-visible rules should be pure; a fault during the
/// probe is an error.
pub fn chart(states: &[State], initial: &str) -> Result<Chart, DiagramError> {
    let mut edges = Vec::new();
    for state in states {
        for (event, transition) in state.transitions() {
            let to = match transition {
                Transition::Shorthand(target) => target.clone(),
                Transition::Rule(rule) => {
                    rule(json!({}), json!({}))
                        .map_err(|fault| DiagramError::Probe {
                            state: state.name().to_string(),
                            event: event.clone(),
                            reason: fault.reason,
                        })?
                        .state
                }
            };
            edges.push(Edge {
                from: state.name().to_string(),
                event: event.clone(),
                to,
            });
        }
    }
    Ok(Chart {
        initial: initial.to_string(),
        edges,
    })
}

/// Serialize state records straight to mermaid text.
pub fn to_mermaid(states: &[State], initial: &str) -> Result<String, DiagramError> {
    Ok(chart(states, initial)?.to_mermaid())
}

/// Parse mermaid text into a [`Chart`].
pub fn from_mermaid(text: &str) -> Result<Chart, DiagramError> {
    Chart::from_mermaid(text)
}

impl Chart {
    pub fn to_mermaid(&self) -> String {
        let head = format!("\nstateDiagram-v2\n[*] --> {}", self.initial);
        let lines: Vec<String> = self
            .edges
            .iter()
            .map(|edge| format!("{} --> {}: {}", edge.from, edge.to, edge.event))
            .collect();
        format!("{}\n{}", head, lines.join("\n"))
    }

    /// Parse mermaid text. The header line is skipped, the `[*]` line names
    /// the initial state, and every other non-empty line must be an edge.
    /// Both `target: event` and the spaced `target : event` form parse.
    pub fn from_mermaid(text: &str) -> Result<Self, DiagramError> {
        let mut chart = Chart::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.contains("stateDiagram-v2") {
                continue;
            }
            if line.contains("[*]") {
                if let Some(initial) = line.split_whitespace().nth(2) {
                    chart.initial = initial.to_string();
                }
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            let edge = match parts.as_slice() {
                [from, "-->", to, event] => Edge {
                    from: from.to_string(),
                    to: to.trim_end_matches(':').to_string(),
                    event: event.to_string(),
                },
                [from, "-->", to, ":", event] => Edge {
                    from: from.to_string(),
                    to: to.to_string(),
                    event: event.to_string(),
                },
                _ => {
                    return Err(DiagramError::Malformed {
                        line: index + 1,
                        text: raw.to_string(),
                    })
                }
            };
            chart.edges.push(edge);
        }
        Ok(chart)
    }

    /// Materialize shorthand-only state records, grouped by source state in
    /// first-appearance order with transitions in line order.
    pub fn states(&self) -> Vec<State> {
        let mut order: Vec<&str> = Vec::new();
        for edge in &self.edges {
            if !order.contains(&edge.from.as_str()) {
                order.push(&edge.from);
            }
        }
        order
            .into_iter()
            .map(|name| {
                let mut state = State::new(name);
                for edge in self.edges.iter().filter(|edge| edge.from == name) {
                    state = state.on(edge.event.as_str(), edge.to.as_str());
                }
                state
            })
            .collect()
    }
}
