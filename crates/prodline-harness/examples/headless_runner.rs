//! Headless runner: runs the default line under a fixed policy, prints
//! per-step summaries, verifies determinism.
//!
//! Run with: `cargo run --package prodline-harness --example headless_runner`

use std::collections::BTreeMap;

use prodline_core::LineState;
use prodline_core::fixed::fixed64_to_f64;
use prodline_harness::{EpisodeSession, Scenario};

const STEPS: usize = 120;

fn fixed_policy(scenario: &Scenario) -> BTreeMap<String, f64> {
    scenario
        .machine_initial_speeds
        .iter()
        .enumerate()
        .map(|(i, speed)| (format!("m{i}"), *speed))
        .collect()
}

fn run_episode(scenario: &Scenario, commands: &BTreeMap<String, f64>) -> Vec<LineState> {
    let mut session = EpisodeSession::new();
    session
        .episode_start(scenario)
        .expect("failed to start episode");

    let mut trace = Vec::with_capacity(STEPS);
    for _ in 0..STEPS {
        let state = session.episode_step(commands).expect("step failed");
        trace.push(state);
    }
    trace
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut scenario = Scenario::default();
    scenario.interval_first_down_event = 15;
    let commands = fixed_policy(&scenario);

    println!("=== prodline headless runner ===");
    println!(
        "machines: {}, control type: {}, seed: {}\n",
        scenario.machine_count, scenario.control_type, scenario.seed
    );

    // Run 1
    let trace1 = run_episode(&scenario, &commands);
    for state in &trace1 {
        if state.iteration_count % 10 != 0 {
            continue;
        }
        let down = state.machine_states.iter().filter(|s| **s == -1).count();
        println!(
            "step {:>4}  t={:>7.1}  states={:?}  down={}  throughput={:.1}",
            state.iteration_count,
            fixed64_to_f64(state.env_time),
            state.machine_states,
            down,
            fixed64_to_f64(state.sink_throughput_absolute_sum),
        );
    }

    let last = trace1.last().expect("empty trace");
    println!(
        "\nAfter {STEPS} steps: t={:.1}, total throughput={:.1}",
        fixed64_to_f64(last.env_time),
        fixed64_to_f64(last.sink_throughput_absolute_sum),
    );

    // Run 2, same scenario and policy. Every observation must match.
    let trace2 = run_episode(&scenario, &commands);
    if trace1 == trace2 {
        println!("Determinism: PASS ({STEPS} identical observations)");
    } else {
        let first_diff = trace1
            .iter()
            .zip(trace2.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(trace1.len());
        println!("Determinism: FAIL! first divergence at step {first_diff}");
        std::process::exit(1);
    }
}
