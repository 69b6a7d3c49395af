//! Traffic light with a transient yellow phase.
//!
//! Yellow auto-advances: its enter hook queues the next `timer` event, which
//! the dispatcher runs after the outer dispatch has unwound. One `timer`
//! from green therefore lands on red, with both commits notified in order.
//!
//! Run with: cargo run --example traffic_light

use clockwork::{EnterOutcome, Machine, State};
use serde_json::json;

fn main() {
    let mut machine = Machine::builder()
        .state(State::new("green").on("timer", "yellow"))
        .state(
            State::new("yellow")
                .on("timer", "red")
                .enter(|_context| Ok(EnterOutcome::retain().followup("timer", json!({})))),
        )
        .state(State::new("red").on("timer", "green"))
        .initial("red")
        .context(json!({}))
        .on_change(|snapshot| println!("light is now {}", snapshot.state))
        .build()
        .expect("machine definition is valid");

    println!("tick");
    machine.send("timer", json!({})).unwrap(); // red -> green

    println!("tick");
    let snapshot = machine.send("timer", json!({})).unwrap(); // green -> yellow -> red
    assert_eq!(snapshot.state, "red");

    println!("settled on {}", snapshot.state);
}
