//! The per-tick control routine: wake, cruise, avoid, escape, sleep.
//!
//! Every motor command counts as activity, so the sleep timeout only fires when
//! the loop has not driven for a whole timeout (robot held, clock jumped, ...).

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::body::{Body, Motion, Reading};
use crate::brain::{BotBrain, CycleReport, Expression};
use crate::error::BrainError;
use crate::genome::Param;
use crate::store::NvStore;
use crate::strategy::{LearnOutcome, LearnedStrategy, ManeuverSample, TurnDirection};
use crate::vocabulary::ContextKind;

const MAX_SENSOR_SAMPLES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Without a motion sensor the robot wakes itself on the next tick.
    pub wake_on_motion: bool,
    pub sleep_timeout_ms: u64,
    pub idle_poll_ms: u32,
    pub sensor_samples: usize,
    pub sample_spacing_ms: u32,
    pub max_sensor_errors: u32,
    pub sensor_recovery_pause_ms: u32,
    pub max_trapped_attempts: u32,
    pub cruise_step_ms: u32,
    /// Cruise speed is divided by this while the range sensor is failing.
    pub blind_speed_divisor: u8,
    pub settle_ms: u32,
    pub maneuver_pause_ms: u32,
    pub clear_run_ms: u32,
    pub escape_charge_ms: u32,
    pub fallback_backup_ms: u32,
    pub scan_steps: u32,
    pub post_obstacle_evolution_probability: f32,
    pub chatter_probability: f32,
    pub chatter_valence: i32,
    pub boot_valence: i32,
    pub wake_valence: i32,
    pub learned_success_valence: i32,
    pub learned_failure_valence: i32,
}

impl BehaviorConfig {
    pub fn wheelie() -> Self {
        Self {
            wake_on_motion: true,
            sleep_timeout_ms: 30_000,
            idle_poll_ms: 100,
            sensor_samples: 3,
            sample_spacing_ms: 10,
            max_sensor_errors: 5,
            sensor_recovery_pause_ms: 100,
            max_trapped_attempts: 3,
            cruise_step_ms: 50,
            blind_speed_divisor: 1,
            settle_ms: 200,
            maneuver_pause_ms: 300,
            clear_run_ms: 800,
            escape_charge_ms: 1_200,
            fallback_backup_ms: 1_000,
            scan_steps: 3,
            post_obstacle_evolution_probability: 0.10,
            chatter_probability: 0.005,
            chatter_valence: 30,
            boot_valence: 40,
            wake_valence: 20,
            learned_success_valence: 60,
            learned_failure_valence: -50,
        }
    }

    pub fn speedie() -> Self {
        Self {
            wake_on_motion: false,
            idle_poll_ms: 50,
            max_sensor_errors: 3,
            max_trapped_attempts: 2,
            blind_speed_divisor: 2,
            settle_ms: 100,
            maneuver_pause_ms: 150,
            clear_run_ms: 600,
            escape_charge_ms: 1_000,
            post_obstacle_evolution_probability: 0.15,
            chatter_probability: 0.0025,
            chatter_valence: 40,
            wake_valence: 30,
            learned_success_valence: 70,
            learned_failure_valence: -40,
            ..Self::wheelie()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ControlState {
    pub awake: bool,
    pub last_activity_ms: u64,
    pub trapped_attempts: u32,
    pub sensor_errors: u32,
    pub sensor_recoveries: u32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            awake: true,
            last_activity_ms: 0,
            trapped_attempts: 0,
            sensor_errors: 0,
            sensor_recoveries: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    Learned,
    Scanned,
    /// Scan found nothing; backed off or escalated.
    Blocked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapeReport {
    pub escaped: bool,
    pub duration_ms: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleReport {
    pub distance_mm: u16,
    pub maneuver: Maneuver,
    pub cleared: bool,
    pub completion_ms: Option<u32>,
    pub trapped_attempts: u32,
    pub learned: Option<LearnOutcome>,
    pub escape: Option<EscapeReport>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Activity {
    Asleep,
    Woke,
    FellAsleep,
    Cruising { distance_mm: Option<u16> },
    Obstacle { report: ObstacleReport },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub now_ms: u64,
    pub activity: Activity,
    pub cycle: Option<CycleReport>,
}

fn is_clear(reading: Reading, clear_threshold_mm: u16) -> bool {
    // An out-of-range echo usually means open space.
    match reading {
        Reading::Distance(mm) => mm > clear_threshold_mm,
        Reading::Error => true,
    }
}

fn turn_motion(direction: TurnDirection) -> Motion {
    match direction {
        TurnDirection::Left => Motion::TurnLeft,
        TurnDirection::Right => Motion::TurnRight,
    }
}

fn elapsed_ms(from: u64, to: u64) -> u32 {
    to.saturating_sub(from).min(u32::MAX as u64) as u32
}

fn clamp_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

impl<S: NvStore> BotBrain<S> {
    pub fn is_awake(&self) -> bool {
        self.control.awake
    }

    pub fn sensor_recoveries(&self) -> u32 {
        self.control.sensor_recoveries
    }

    /// Power-on greeting.
    pub fn greet<B: Body + ?Sized>(&mut self, body: &mut B) -> Expression {
        let now = body.now_ms();
        self.control.last_activity_ms = now;
        self.express_state(ContextKind::Evolving, self.config.behavior.boot_valence, now, body)
    }

    pub fn tick<B: Body + ?Sized>(&mut self, body: &mut B) -> Result<TickReport, BrainError> {
        let cfg = self.config.behavior;
        let now = body.now_ms();

        if self.control.awake
            && now.saturating_sub(self.control.last_activity_ms) > cfg.sleep_timeout_ms
        {
            self.sleep(body)?;
            return Ok(TickReport {
                now_ms: now,
                activity: Activity::FellAsleep,
                cycle: None,
            });
        }

        let motion = cfg.wake_on_motion && body.motion_detected();
        if motion {
            self.control.last_activity_ms = now;
        }
        if !self.control.awake {
            if motion || !cfg.wake_on_motion {
                self.wake(body);
                return Ok(TickReport {
                    now_ms: body.now_ms(),
                    activity: Activity::Woke,
                    cycle: None,
                });
            }
            body.stop();
            body.pause(cfg.idle_poll_ms);
            return Ok(TickReport {
                now_ms: body.now_ms(),
                activity: Activity::Asleep,
                cycle: None,
            });
        }

        let genome = self.evolution.genome;
        let reading = self.sample_distance(body);
        let mut cycle = None;
        let activity = match reading {
            Reading::Error => {
                let speed = genome.motor_speed() / cfg.blind_speed_divisor.max(1);
                self.forward(body, speed, cfg.cruise_step_ms);
                Activity::Cruising { distance_mm: None }
            }
            Reading::Distance(mm) if mm < genome.obstacle_threshold_mm() => {
                let (report, obstacle_cycle) = self.handle_obstacle(body, mm)?;
                cycle = obstacle_cycle;
                Activity::Obstacle { report }
            }
            Reading::Distance(mm) => {
                self.forward(body, genome.motor_speed(), cfg.cruise_step_ms);
                if self.rng.chance(cfg.chatter_probability) {
                    let now = body.now_ms();
                    self.express_state(ContextKind::Clear, cfg.chatter_valence, now, body);
                }
                Activity::Cruising {
                    distance_mm: Some(mm),
                }
            }
        };

        let now = body.now_ms();
        if cycle.is_none() {
            cycle = self.evolution_cycle(now, body)?;
        }
        Ok(TickReport {
            now_ms: now,
            activity,
            cycle,
        })
    }

    /// Back off an obstacle at `distance_mm`, by a learned maneuver or a fresh scan.
    pub fn handle_obstacle<B: Body + ?Sized>(
        &mut self,
        body: &mut B,
        distance_mm: u16,
    ) -> Result<(ObstacleReport, Option<CycleReport>), BrainError> {
        let cfg = self.config.behavior;
        let start = body.now_ms();
        self.control.last_activity_ms = start;
        self.metrics.record_obstacle();
        self.express_state(ContextKind::Obstacle, -30, start, body);

        let mut report = match self.choose_strategy(distance_mm) {
            Some(strategy) => self.apply_learned(body, distance_mm, strategy, start)?,
            None => self.explore(body, distance_mm, start)?,
        };
        report.trapped_attempts = self.control.trapped_attempts;

        let now = body.now_ms();
        self.control.last_activity_ms = now;
        debug!(
            distance_mm,
            maneuver = ?report.maneuver,
            cleared = report.cleared,
            trapped_attempts = report.trapped_attempts,
            "obstacle handled"
        );

        let cycle = if self.rng.chance(cfg.post_obstacle_evolution_probability) {
            self.evolution_cycle(now, body)?
        } else {
            None
        };
        Ok((report, cycle))
    }

    fn apply_learned<B: Body + ?Sized>(
        &mut self,
        body: &mut B,
        distance_mm: u16,
        strategy: LearnedStrategy,
        start: u64,
    ) -> Result<ObstacleReport, BrainError> {
        let cfg = self.config.behavior;
        let genome = self.evolution.genome;
        let now = body.now_ms();
        self.express_state(ContextKind::Success, 20, now, body);

        body.stop();
        body.pause(cfg.settle_ms);
        self.drive(body, Motion::Backward, genome.motor_speed(), strategy.backup_ms as u32);
        body.stop();
        body.pause(cfg.maneuver_pause_ms);
        self.drive(
            body,
            turn_motion(strategy.direction),
            genome.turn_speed(),
            strategy.turn_ms as u32,
        );
        body.stop();
        body.pause(genome.scan_delay_ms());

        let check = self.sample_distance(body);
        let cleared = is_clear(check, genome.clear_threshold_mm());
        let completion_ms = if cleared {
            self.forward(body, genome.motor_speed(), cfg.clear_run_ms);
            let completion = elapsed_ms(start, body.now_ms());
            self.metrics.record_cleared(completion);
            let now = body.now_ms();
            self.express_state(ContextKind::Success, cfg.learned_success_valence, now, body);
            Some(completion)
        } else {
            self.control.trapped_attempts = self.control.trapped_attempts.saturating_add(1);
            let now = body.now_ms();
            self.express_state(ContextKind::Obstacle, cfg.learned_failure_valence, now, body);
            None
        };

        let learned = self.learn_strategy(ManeuverSample {
            distance_mm,
            direction: strategy.direction,
            backup_ms: strategy.backup_ms,
            turn_ms: strategy.turn_ms,
            succeeded: cleared,
            completion_ms: elapsed_ms(start, body.now_ms()),
        })?;

        Ok(ObstacleReport {
            distance_mm,
            maneuver: Maneuver::Learned,
            cleared,
            completion_ms,
            trapped_attempts: 0,
            learned: Some(learned),
            escape: None,
        })
    }

    fn explore<B: Body + ?Sized>(
        &mut self,
        body: &mut B,
        distance_mm: u16,
        start: u64,
    ) -> Result<ObstacleReport, BrainError> {
        let cfg = self.config.behavior;
        let genome = self.evolution.genome;
        let clear_mm = genome.clear_threshold_mm();
        let now = body.now_ms();
        self.express_state(ContextKind::Clear, 0, now, body);

        body.stop();
        body.pause(cfg.settle_ms);
        let backup_ms = genome.backup_ms();
        self.drive(body, Motion::Backward, genome.motor_speed(), backup_ms);
        body.stop();
        body.pause(cfg.maneuver_pause_ms);

        let mut best: Option<(TurnDirection, u16)> = None;
        for direction in [TurnDirection::Left, TurnDirection::Right] {
            if best.is_some() {
                break;
            }
            for _ in 0..cfg.scan_steps {
                self.drive(body, turn_motion(direction), genome.turn_speed(), genome.turn_ms());
                body.stop();
                body.pause(genome.scan_delay_ms());
                let mm = self.sample_distance(body).distance().unwrap_or(0);
                if mm > clear_mm && best.map_or(true, |(_, top)| mm > top) {
                    best = Some((direction, mm));
                }
            }
            // Swing back to where the scan started.
            self.drive(
                body,
                turn_motion(direction.opposite()),
                genome.turn_speed(),
                genome.turn_ms().saturating_mul(cfg.scan_steps),
            );
            body.stop();
            body.pause(genome.scan_delay_ms());
        }

        let Some((direction, _)) = best else {
            return self.blocked(body, distance_mm);
        };

        let now = body.now_ms();
        self.express_state(ContextKind::Clear, 50, now, body);
        let turn_ms = genome.turn_ms().saturating_mul(2);
        self.drive(body, turn_motion(direction), genome.turn_speed(), turn_ms);
        body.stop();
        body.pause(cfg.settle_ms);

        let check = self.sample_distance(body);
        let cleared = is_clear(check, clear_mm);
        let completion_ms = if cleared {
            self.forward(body, genome.motor_speed(), cfg.clear_run_ms);
            let completion = elapsed_ms(start, body.now_ms());
            self.metrics.record_cleared(completion);
            self.control.trapped_attempts = 0;
            let now = body.now_ms();
            self.express_state(ContextKind::Success, 70, now, body);
            Some(completion)
        } else {
            self.control.trapped_attempts = self.control.trapped_attempts.saturating_add(1);
            let now = body.now_ms();
            self.express_state(ContextKind::Obstacle, -40, now, body);
            None
        };

        let learned = self.learn_strategy(ManeuverSample {
            distance_mm,
            direction,
            backup_ms: clamp_u16(backup_ms),
            turn_ms: clamp_u16(turn_ms),
            succeeded: cleared,
            completion_ms: elapsed_ms(start, body.now_ms()),
        })?;

        Ok(ObstacleReport {
            distance_mm,
            maneuver: Maneuver::Scanned,
            cleared,
            completion_ms,
            trapped_attempts: 0,
            learned: Some(learned),
            escape: None,
        })
    }

    fn blocked<B: Body + ?Sized>(
        &mut self,
        body: &mut B,
        distance_mm: u16,
    ) -> Result<ObstacleReport, BrainError> {
        let cfg = self.config.behavior;
        self.control.trapped_attempts = self.control.trapped_attempts.saturating_add(1);
        let now = body.now_ms();
        self.express_state(ContextKind::Trapped, -60, now, body);

        let escape = if self.control.trapped_attempts >= cfg.max_trapped_attempts {
            Some(self.aggressive_escape(body)?)
        } else {
            let speed = self.evolution.genome.motor_speed();
            self.drive(body, Motion::Backward, speed, cfg.fallback_backup_ms);
            body.stop();
            None
        };

        Ok(ObstacleReport {
            distance_mm,
            maneuver: Maneuver::Blocked,
            cleared: escape.map_or(false, |e| e.escaped),
            completion_ms: None,
            trapped_attempts: 0,
            learned: None,
            escape,
        })
    }

    /// Long reverse, evolved spin, forward charge. Counts as one trap.
    pub fn aggressive_escape<B: Body + ?Sized>(
        &mut self,
        body: &mut B,
    ) -> Result<EscapeReport, BrainError> {
        let cfg = self.config.behavior;
        let genome = self.evolution.genome;
        self.metrics.record_trapped();
        let start = body.now_ms();
        self.express_state(ContextKind::Trapped, -90, start, body);

        let multiplier = genome.get(Param::AggressiveBackupMultiplier).max(1) as u32;
        let spin_degrees = genome.get(Param::SpinDegreesWhenTrapped).max(0) as u32;
        let backup_ms = genome.backup_ms().saturating_mul(multiplier);
        let spin_ms = spin_degrees.saturating_mul(genome.turn_ms()) / 180;

        self.drive(body, Motion::Backward, genome.motor_speed(), backup_ms);
        body.stop();
        body.pause(cfg.maneuver_pause_ms);
        self.drive(body, Motion::TurnRight, genome.turn_speed(), spin_ms);
        body.stop();
        body.pause(cfg.maneuver_pause_ms);
        self.forward(body, genome.motor_speed(), cfg.escape_charge_ms);
        body.stop();
        body.pause(cfg.maneuver_pause_ms);

        let duration_ms = elapsed_ms(start, body.now_ms());
        let escaped = is_clear(self.sample_distance(body), genome.clear_threshold_mm());
        self.metrics.record_escape_attempt(duration_ms, escaped);

        let now = body.now_ms();
        if escaped {
            self.control.trapped_attempts = 0;
            self.express_state(ContextKind::Success, 70, now, body);
        } else {
            self.express_state(ContextKind::Trapped, -80, now, body);
        }
        info!(escaped, duration_ms, "aggressive escape finished");
        Ok(EscapeReport {
            escaped,
            duration_ms,
        })
    }

    fn wake<B: Body + ?Sized>(&mut self, body: &mut B) {
        let now = body.now_ms();
        info!(now_ms = now, "waking up");
        self.control.awake = true;
        self.control.last_activity_ms = now;
        self.control.trapped_attempts = 0;
        self.express_state(ContextKind::Evolving, self.config.behavior.wake_valence, now, body);
    }

    fn sleep<B: Body + ?Sized>(&mut self, body: &mut B) -> Result<(), BrainError> {
        self.control.awake = false;
        self.control.trapped_attempts = 0;
        self.prepare_for_sleep()?;
        body.stop();
        Ok(())
    }

    fn drive<B: Body + ?Sized>(&mut self, body: &mut B, motion: Motion, speed: u8, duration_ms: u32) {
        body.drive(motion, speed, duration_ms);
        self.control.last_activity_ms = body.now_ms();
    }

    fn forward<B: Body + ?Sized>(&mut self, body: &mut B, speed: u8, duration_ms: u32) {
        self.drive(body, Motion::Forward, speed, duration_ms);
        self.metrics
            .add_distance((speed as u32).saturating_mul(duration_ms) / 1_000);
    }

    /// Median of several readings; errors sort last so a majority of errors reads as an error.
    fn sample_distance<B: Body + ?Sized>(&mut self, body: &mut B) -> Reading {
        let cfg = self.config.behavior;
        let samples = cfg.sensor_samples.clamp(1, MAX_SENSOR_SAMPLES);
        let mut readings = [u16::MAX; MAX_SENSOR_SAMPLES];
        for slot in readings.iter_mut().take(samples) {
            *slot = match self.read_once(body) {
                Reading::Distance(mm) => mm.min(u16::MAX - 1),
                Reading::Error => u16::MAX,
            };
            body.pause(cfg.sample_spacing_ms);
        }

        let window = &mut readings[..samples];
        window.sort_unstable();
        match window[samples / 2] {
            u16::MAX => Reading::Error,
            mm => Reading::Distance(mm),
        }
    }

    fn read_once<B: Body + ?Sized>(&mut self, body: &mut B) -> Reading {
        let reading = body.read_distance();
        match reading {
            Reading::Distance(_) => self.control.sensor_errors = 0,
            Reading::Error => {
                let cfg = self.config.behavior;
                self.control.sensor_errors = self.control.sensor_errors.saturating_add(1);
                if self.control.sensor_errors >= cfg.max_sensor_errors {
                    warn!(
                        consecutive_errors = self.control.sensor_errors,
                        "range sensor failing, stopping to recover"
                    );
                    body.stop();
                    body.pause(cfg.sensor_recovery_pause_ms);
                    self.control.sensor_recoveries = self.control.sensor_recoveries.saturating_add(1);
                    self.control.sensor_errors = 0;
                }
            }
        }
        reading
    }
}
