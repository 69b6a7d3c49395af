//! The flux-capacitor power machine.
//!
//! A two-state machine whose `powerOn` rule spends one jigawatt per start
//! and refuses to start once the reserve is empty.
//!
//! Run with: cargo run --example jigawatts

use clockwork::{Machine, NextState, State};
use serde_json::json;

fn main() {
    let mut machine = Machine::builder()
        .state(State::new("on").on("powerOff", "off"))
        .state(State::new("off").on_rule("powerOn", |_detail, context| {
            let jigawatts = context["jigawatts"].as_i64().unwrap_or(0);
            if jigawatts <= 0 {
                return Ok(NextState::with("off", context));
            }
            let mut next = context;
            next["jigawatts"] = json!(jigawatts - 1);
            Ok(NextState::with("on", next))
        }))
        .initial("off")
        .context(json!({ "jigawatts": 3 }))
        .on_change(|snapshot| println!("  -> {} {}", snapshot.state, snapshot.context))
        .build()
        .expect("machine definition is valid");

    for round in 1..=4 {
        println!("round {round}: powerOn");
        machine.send("powerOn", json!({})).unwrap();
        println!("round {round}: powerOff");
        machine.send("powerOff", json!({})).unwrap();
    }

    let snapshot = machine.peek();
    println!("final: {} {}", snapshot.state, snapshot.context);
}
