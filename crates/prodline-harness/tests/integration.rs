//! End-to-end episodes through the session layer: forced outages, gate
//! policies, throughput accounting.

use std::collections::BTreeMap;

use prodline_core::LineState;
use prodline_harness::{EpisodeSession, Scenario};

fn fixed64(v: f64) -> prodline_core::Fixed64 {
    prodline_core::fixed::f64_to_fixed64(v)
}

fn as_f64(v: prodline_core::Fixed64) -> f64 {
    prodline_core::fixed::fixed64_to_f64(v)
}

/// Commanding every machine to the same speed puts the line in a steady
/// state: every conveyor's net flow is zero, so no interlock ever fires
/// until a downtime event perturbs it.
fn uniform_commands(scenario: &Scenario, speed: f64) -> BTreeMap<String, f64> {
    (0..scenario.machine_count)
        .map(|i| (format!("m{i}"), speed))
        .collect()
}

fn initial_commands(scenario: &Scenario) -> BTreeMap<String, f64> {
    scenario
        .machine_initial_speeds
        .iter()
        .enumerate()
        .map(|(i, speed)| (format!("m{i}"), *speed))
        .collect()
}

fn run_steps(
    session: &mut EpisodeSession,
    commands: &BTreeMap<String, f64>,
    steps: usize,
) -> Vec<LineState> {
    (0..steps)
        .map(|_| session.episode_step(commands).unwrap())
        .collect()
}

/// A single forced outage: machine 2 fails at the warm-up instant, stays
/// down for exactly the sampled duration, and resumes at its commanded
/// speed the moment the hold expires.
#[test]
fn forced_outage_runs_its_sampled_course() {
    let mut scenario = Scenario::default();
    scenario.down_machine_index = 2;
    scenario.number_parallel_downtime_events = 1;
    scenario.interval_first_down_event = 3;

    let mut session = EpisodeSession::new();
    session.episode_start(&scenario).unwrap();
    let commands = uniform_commands(&scenario, 100.0);
    let trace = run_steps(&mut session, &commands, 20);

    let history: Vec<_> = session
        .engine()
        .unwrap()
        .downtime_history()
        .events()
        .cloned()
        .collect();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].machine, 2);
    assert_eq!(history[0].at, fixed64(3.0));
    assert!((5..=7).contains(&history[0].duration));
    let duration = history[0].duration as usize;

    for (k, state) in trace.iter().enumerate() {
        let step = k + 1;
        assert_eq!(state.iteration_count, step as u64);
        assert_eq!(as_f64(state.env_time), step as f64);
        // Only the forced machine ever fails.
        for (i, code) in state.machine_states.iter().enumerate() {
            if i != 2 {
                assert_ne!(*code, -1, "machine {i} went down at step {step}");
            }
        }
        // The controller keeps asking for the same speed throughout.
        assert_eq!(state.machine_commanded_speeds[2], fixed64(100.0));

        let down = (3..3 + duration).contains(&step);
        if down {
            assert_eq!(state.machine_states[2], -1, "step {step}");
            assert_eq!(state.machine_actual_speeds[2], fixed64(0.0));
            assert!(state.illegal_machine_actions[2]);
        } else {
            assert_ne!(state.machine_states[2], -1, "step {step}");
        }
    }

    // Recovery restores the commanded speed directly, no startup hold.
    let after = &trace[3 + duration - 1];
    assert_eq!(after.machine_states[2], 1);
    assert_eq!(after.machine_actual_speeds[2], fixed64(100.0));
    assert!(!after.illegal_machine_actions[2]);
}

#[test]
fn sink_throughput_is_nondecreasing() {
    let mut scenario = Scenario::default();
    scenario.interval_first_down_event = 5;

    let mut session = EpisodeSession::new();
    session.episode_start(&scenario).unwrap();
    let commands = initial_commands(&scenario);
    let trace = run_steps(&mut session, &commands, 40);

    let mut previous = fixed64(0.0);
    for state in &trace {
        assert!(state.sink_throughput_absolute_sum >= previous);
        assert!(state.sink_throughput_delta_sum >= fixed64(0.0));
        previous = state.sink_throughput_absolute_sum;
    }
    // The line must have shipped something in 40 seconds.
    assert!(trace.last().unwrap().sink_throughput_absolute_sum > fixed64(0.0));
}

/// Event-driven gating: one step spans the whole warm-up and ends on the
/// failure, the next spans the whole outage and ends on the recovery.
#[test]
fn downtime_event_gate_spans_whole_transitions() {
    let mut scenario = Scenario::default();
    scenario.control_type = 1;
    scenario.down_machine_index = 2;
    scenario.number_parallel_downtime_events = 1;

    let mut session = EpisodeSession::new();
    session.episode_start(&scenario).unwrap();
    let commands = uniform_commands(&scenario, 100.0);
    let trace = run_steps(&mut session, &commands, 2);

    assert_eq!(as_f64(trace[0].env_time), 50.0);
    assert_eq!(trace[0].machine_states[2], -1);

    let last = session.engine().unwrap().downtime_history().last().unwrap();
    assert_eq!(last.machine, 2);
    let duration = last.duration as f64;
    assert_eq!(as_f64(trace[1].env_time), 50.0 + duration);
    assert_eq!(trace[1].machine_states[2], 1);
}

/// The either-event policy releases on both downtime transitions and
/// frequency ticks. A downtime transition coinciding with a frequency tick
/// yields two control instants at the same simulated time.
#[test]
fn either_gate_releases_on_both_event_kinds() {
    let mut scenario = Scenario::default();
    scenario.control_type = 2;
    scenario.down_machine_index = 2;
    scenario.number_parallel_downtime_events = 1;
    scenario.interval_first_down_event = 5;

    let mut session = EpisodeSession::new();
    session.episode_start(&scenario).unwrap();
    let commands = uniform_commands(&scenario, 100.0);
    let trace = run_steps(&mut session, &commands, 7);

    for (k, state) in trace.iter().take(4).enumerate() {
        assert_eq!(as_f64(state.env_time), (k + 1) as f64);
        assert_eq!(state.machine_states[2], 1);
    }
    // Step 5 is released by the failure itself, preempting the frequency
    // tick due at the same instant; step 6 is that frequency tick.
    assert_eq!(as_f64(trace[4].env_time), 5.0);
    assert_eq!(trace[4].machine_states[2], -1);
    assert_eq!(as_f64(trace[5].env_time), 5.0);
    assert_eq!(as_f64(trace[6].env_time), 6.0);
}

/// Scenario JSON overrides flow all the way into a running engine.
#[test]
fn scenario_json_round_trip_drives_an_episode() {
    let scenario: Scenario = serde_json::from_str(
        r#"{
            "seed": 123,
            "control_type": 0,
            "down_machine_index": 4,
            "number_parallel_downtime_events": 1,
            "interval_first_down_event": 2
        }"#,
    )
    .unwrap();

    let mut session = EpisodeSession::new();
    session.episode_start(&scenario).unwrap();
    let commands = uniform_commands(&scenario, 100.0);
    let trace = run_steps(&mut session, &commands, 10);

    // Machine 4's outage lasts at least 6 seconds, so step 3 is inside it.
    assert_eq!(trace[2].machine_states[4], -1);
    assert_eq!(trace[2].machine_commanded_speeds[4], fixed64(100.0));
    let last = session.engine().unwrap().downtime_history().last().unwrap();
    assert_eq!(last.machine, 4);
}
