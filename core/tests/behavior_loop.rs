mod support;

use evobot_core::behavior::Maneuver;
use evobot_core::constants::STORE_SIZE;
use evobot_core::{
    Activity, BotBrain, EngineConfig, LearnOutcome, ManeuverSample, MemStore, Motion, Reading,
    TurnDirection,
};
use support::ScriptedBody;

fn brain(config: EngineConfig) -> BotBrain<MemStore> {
    let (brain, _) = BotBrain::boot(config, MemStore::erased(STORE_SIZE), 7).unwrap();
    brain
}

fn obstacle(activity: Activity) -> evobot_core::behavior::ObstacleReport {
    match activity {
        Activity::Obstacle { report } => report,
        other => panic!("expected an obstacle, got {other:?}"),
    }
}

#[test]
fn open_floor_cruises_and_counts_distance() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Distance(900));
    brain.greet(&mut body);

    for _ in 0..10 {
        let tick = brain.tick(&mut body).unwrap();
        assert_eq!(
            tick.activity,
            Activity::Cruising {
                distance_mm: Some(900)
            }
        );
    }
    // 200 speed units for 50 ms per tick.
    assert_eq!(brain.metrics().total_distance_mm, 100);
    assert_eq!(brain.metrics().obstacles_encountered, 0);
    assert!(body.drives.iter().all(|(motion, _, _)| *motion == Motion::Forward));
}

#[test]
fn scan_finds_a_gap_and_learns_it() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Distance(900));
    body.script(100, 3) // obstacle inside the 200 mm threshold
        .script(600, 3) // first step left is open
        .script(150, 6) // remaining left steps blocked
        .script(800, 3); // final check after turning into the gap

    let report = obstacle(brain.tick(&mut body).unwrap().activity);
    assert_eq!(report.distance_mm, 100);
    assert_eq!(report.maneuver, Maneuver::Scanned);
    assert!(report.cleared);
    assert!(report.completion_ms.is_some());
    assert_eq!(report.learned, Some(LearnOutcome::Inserted(0)));
    assert_eq!(report.trapped_attempts, 0);

    let metrics = brain.metrics();
    assert_eq!(metrics.obstacles_encountered, 1);
    assert_eq!(metrics.obstacles_cleared, 1);
    let learned = brain.strategies().get(0).unwrap();
    assert_eq!(learned.direction, TurnDirection::Left);
    assert_eq!(learned.context_distance_mm, 100);
    assert_eq!(learned.turn_ms, 700);
    assert!(body.readings.is_empty());
}

#[test]
fn repeated_blocks_escalate_to_an_escape() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Distance(100));

    for attempt in 1..=2 {
        let report = obstacle(brain.tick(&mut body).unwrap().activity);
        assert_eq!(report.maneuver, Maneuver::Blocked);
        assert_eq!(report.trapped_attempts, attempt);
        assert!(report.escape.is_none());
    }
    assert_eq!(brain.metrics().times_trapped, 0);

    let report = obstacle(brain.tick(&mut body).unwrap().activity);
    let escape = report.escape.unwrap();
    assert!(!escape.escaped);
    assert!(escape.duration_ms > 0);
    assert_eq!(brain.metrics().times_trapped, 1);
    assert_eq!(brain.metrics().trap_escapes, 0);
    assert_eq!(brain.metrics().escape_samples, 1);
    assert!(brain.strategies().is_empty());
}

#[test]
fn escape_into_open_space_resets_the_trap_counter() {
    let mut config = EngineConfig::default();
    config.behavior.max_trapped_attempts = 1;
    let mut brain = brain(config);
    let mut body = ScriptedBody::new(Reading::Distance(100));
    // Initial reading plus two blocked sweeps of three steps.
    body.script(100, 3 + 18).script(1_000, 3);

    let report = obstacle(brain.tick(&mut body).unwrap().activity);
    assert!(report.escape.unwrap().escaped);
    assert!(report.cleared);
    assert_eq!(brain.trapped_attempts(), 0);
    assert_eq!(brain.metrics().trap_escapes, 1);
}

#[test]
fn learned_maneuver_is_reused() {
    let mut config = EngineConfig::default();
    config.strategy.exploit_probability = 1.0;
    config.strategy.save_probability = 0.0;
    let mut brain = brain(config);
    let sample = ManeuverSample {
        distance_mm: 110,
        direction: TurnDirection::Right,
        backup_ms: 500,
        turn_ms: 400,
        succeeded: true,
        completion_ms: 2_000,
    };
    brain.learn_strategy(sample).unwrap();
    brain.learn_strategy(sample).unwrap();

    let mut body = ScriptedBody::new(Reading::Distance(900));
    body.script(100, 3).script(800, 3);
    let report = obstacle(brain.tick(&mut body).unwrap().activity);
    assert_eq!(report.maneuver, Maneuver::Learned);
    assert!(report.cleared);
    assert_eq!(report.learned, Some(LearnOutcome::Updated(0)));
    assert_eq!(brain.strategies().get(0).unwrap().times_used, 3);
    assert!(body.drives.contains(&(Motion::Backward, 200, 500)));
    assert!(body.drives.contains(&(Motion::TurnRight, 150, 400)));
}

#[test]
fn failing_sensor_triggers_recovery_and_blind_cruise() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Error);

    let first = brain.tick(&mut body).unwrap();
    assert_eq!(first.activity, Activity::Cruising { distance_mm: None });
    assert_eq!(brain.sensor_recoveries(), 0);

    brain.tick(&mut body).unwrap();
    assert!(brain.sensor_recoveries() >= 1);
    assert!(body.stops >= 1);
}

#[test]
fn recovery_rearms_after_each_run_of_errors() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Error);

    // Three reads per tick, five consecutive errors per recovery.
    for _ in 0..5 {
        brain.tick(&mut body).unwrap();
    }
    assert_eq!(brain.sensor_recoveries(), 3);
    assert_eq!(body.stops, 3);
}

#[test]
fn extreme_cruise_step_saturates_distance() {
    let mut config = EngineConfig::default();
    config.behavior.cruise_step_ms = u32::MAX;
    config.scheduler.enabled = false;
    let mut brain = brain(config);
    let mut body = ScriptedBody::new(Reading::Distance(900));

    let tick = brain.tick(&mut body).unwrap();
    assert_eq!(
        tick.activity,
        Activity::Cruising {
            distance_mm: Some(900)
        }
    );
    assert_eq!(brain.metrics().total_distance_mm, u32::MAX / 1_000);
}

#[test]
fn idles_to_sleep_and_wakes_on_motion() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Distance(900));
    brain.tick(&mut body).unwrap();
    let commits = brain.store().commit_count();

    body.now_ms += 31_000;
    assert_eq!(brain.tick(&mut body).unwrap().activity, Activity::FellAsleep);
    assert!(!brain.is_awake());
    assert_eq!(brain.store().commit_count(), commits + 3);

    assert_eq!(brain.tick(&mut body).unwrap().activity, Activity::Asleep);
    assert_eq!(brain.tick(&mut body).unwrap().activity, Activity::Asleep);

    body.motion = true;
    assert_eq!(brain.tick(&mut body).unwrap().activity, Activity::Woke);
    assert!(brain.is_awake());
}

#[test]
fn speedie_wakes_without_a_motion_sensor() {
    let mut brain = brain(EngineConfig::preset("speedie").unwrap());
    let mut body = ScriptedBody::new(Reading::Distance(900));
    brain.tick(&mut body).unwrap();
    body.now_ms += 31_000;
    assert_eq!(brain.tick(&mut body).unwrap().activity, Activity::FellAsleep);
    assert_eq!(brain.tick(&mut body).unwrap().activity, Activity::Woke);
}

#[test]
fn same_seed_and_script_replay_identically() {
    fn run() -> (evobot_core::Telemetry, Vec<(Motion, u8, u32)>) {
        let mut brain = brain(EngineConfig::default());
        let mut body = ScriptedBody::new(Reading::Distance(900));
        for round in 0..40u16 {
            body.script(120 + round, 3).script(150, 18);
            for _ in 0..5 {
                brain.tick(&mut body).unwrap();
            }
        }
        (brain.telemetry(), body.drives)
    }

    let (first, first_drives) = run();
    let (second, second_drives) = run();
    assert_eq!(first, second);
    assert_eq!(first_drives, second_drives);
    assert!(first.metrics.obstacles_encountered > 0);
}

#[test]
fn long_session_eventually_runs_evolution() {
    let mut brain = brain(EngineConfig::default());
    let mut body = ScriptedBody::new(Reading::Distance(900));
    let mut cycles = 0;
    // 50 ms per cruising tick; the first interval is 30 s.
    for _ in 0..1_000 {
        if brain.tick(&mut body).unwrap().cycle.is_some() {
            cycles += 1;
        }
    }
    assert!(cycles >= 1);
    assert!(brain.genome().generation >= 1);
}
