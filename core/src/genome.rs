//! The behavior-parameter genome and the constraint pass that keeps it legal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::PARAM_COUNT;
use crate::error::ConfigError;
use crate::rng::SeededRng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    MotorSpeed,
    TurnSpeed,
    BackupDuration,
    TurnDuration,
    ObstacleThreshold,
    ClearThreshold,
    ScanDelay,
    AggressiveBackupMultiplier,
    SpinDegreesWhenTrapped,
    MaxAcceleration,
    CorneringSpeed,
    GyroSensitivity,
}

impl Param {
    pub const ALL: [Param; PARAM_COUNT] = [
        Param::MotorSpeed,
        Param::TurnSpeed,
        Param::BackupDuration,
        Param::TurnDuration,
        Param::ObstacleThreshold,
        Param::ClearThreshold,
        Param::ScanDelay,
        Param::AggressiveBackupMultiplier,
        Param::SpinDegreesWhenTrapped,
        Param::MaxAcceleration,
        Param::CorneringSpeed,
        Param::GyroSensitivity,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MotorSpeed => "motor_speed",
            Self::TurnSpeed => "turn_speed",
            Self::BackupDuration => "backup_duration",
            Self::TurnDuration => "turn_duration",
            Self::ObstacleThreshold => "obstacle_threshold",
            Self::ClearThreshold => "clear_threshold",
            Self::ScanDelay => "scan_delay",
            Self::AggressiveBackupMultiplier => "aggressive_backup_multiplier",
            Self::SpinDegreesWhenTrapped => "spin_degrees_when_trapped",
            Self::MaxAcceleration => "max_acceleration",
            Self::CorneringSpeed => "cornering_speed",
            Self::GyroSensitivity => "gyro_sensitivity",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    /// Add a uniform draw from `-d..=d`.
    Delta(i32),
    /// Draw a fresh value uniformly from the whole range. Used for small discrete ranges.
    Resample,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub default: i32,
    pub min: i32,
    pub max: i32,
    pub mutation: Mutation,
    pub enabled: bool,
}

impl ParamSpec {
    pub const fn new(default: i32, min: i32, max: i32, mutation: Mutation) -> Self {
        Self {
            default,
            min,
            max,
            mutation,
            enabled: true,
        }
    }

    /// Pinned at `default`, never selected for mutation.
    pub const fn disabled(default: i32) -> Self {
        Self {
            default,
            min: default,
            max: default,
            mutation: Mutation::Delta(0),
            enabled: false,
        }
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenomeSchema {
    pub params: [ParamSpec; PARAM_COUNT],
    /// Minimum amount `clear_threshold` must exceed `obstacle_threshold` by.
    pub clear_margin: i32,
}

impl GenomeSchema {
    pub fn wheelie() -> Self {
        use Mutation::{Delta, Resample};
        Self {
            params: [
                ParamSpec::new(200, 120, 255, Delta(30)),
                ParamSpec::new(150, 100, 200, Delta(20)),
                ParamSpec::new(600, 300, 1200, Delta(100)),
                ParamSpec::new(350, 200, 600, Delta(50)),
                ParamSpec::new(200, 150, 350, Delta(30)),
                ParamSpec::new(300, 200, 500, Delta(40)),
                ParamSpec::new(300, 100, 500, Delta(50)),
                ParamSpec::new(2, 2, 4, Resample),
                ParamSpec::new(180, 90, 270, Resample),
                ParamSpec::disabled(50),
                ParamSpec::disabled(160),
                ParamSpec::disabled(200),
            ],
            clear_margin: 50,
        }
    }

    pub fn speedie() -> Self {
        use Mutation::{Delta, Resample};
        Self {
            params: [
                ParamSpec::new(240, 180, 255, Delta(20)),
                ParamSpec::new(180, 120, 220, Delta(15)),
                ParamSpec::new(400, 200, 800, Delta(50)),
                ParamSpec::new(250, 150, 400, Delta(30)),
                ParamSpec::new(150, 80, 300, Delta(20)),
                ParamSpec::new(250, 150, 400, Delta(30)),
                ParamSpec::new(150, 50, 300, Delta(30)),
                ParamSpec::new(3, 2, 5, Resample),
                ParamSpec::new(270, 180, 359, Resample),
                ParamSpec::new(50, 20, 100, Delta(10)),
                ParamSpec::new(160, 100, 200, Delta(20)),
                ParamSpec::new(200, 50, 500, Delta(50)),
            ],
            clear_margin: 40,
        }
    }

    pub fn spec(&self, param: Param) -> &ParamSpec {
        &self.params[param.index()]
    }

    pub fn enabled(&self) -> impl Iterator<Item = Param> + '_ {
        Param::ALL
            .into_iter()
            .filter(move |param| self.spec(*param).enabled)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for param in Param::ALL {
            let spec = self.spec(param);
            // `max + 1` is the exclusive bound of a resample draw.
            if spec.min > spec.max
                || spec.max == i32::MAX
                || spec.default < spec.min
                || spec.default > spec.max
            {
                return Err(ConfigError::ParameterRange {
                    param,
                    min: spec.min,
                    max: spec.max,
                    default: spec.default,
                });
            }
            if let Mutation::Delta(delta) = spec.mutation {
                if !(0..i32::MAX).contains(&delta) {
                    return Err(ConfigError::MutationDelta { param, delta });
                }
            }
        }

        let obstacle = self.spec(Param::ObstacleThreshold);
        let clear = self.spec(Param::ClearThreshold);
        if self.clear_margin < 0 || obstacle.min + self.clear_margin > clear.max {
            return Err(ConfigError::ClearMarginUnreachable {
                obstacle_min: obstacle.min,
                clear_max: clear.max,
                margin: self.clear_margin,
            });
        }
        Ok(())
    }

    /// Clamp every parameter, then repair `clear >= obstacle + margin`.
    ///
    /// Idempotent: a genome that already satisfies the schema is left untouched.
    pub fn constrain(&self, genome: &mut Genome) {
        for param in Param::ALL {
            let idx = param.index();
            genome.values[idx] = self.params[idx].clamp(genome.values[idx]);
        }

        let margin = self.clear_margin;
        let clear_max = self.spec(Param::ClearThreshold).max;
        let obstacle = genome.get(Param::ObstacleThreshold);
        if genome.get(Param::ClearThreshold) < obstacle + margin {
            if obstacle + margin <= clear_max {
                genome.set(Param::ClearThreshold, obstacle + margin);
            } else {
                genome.set(Param::ClearThreshold, clear_max);
                genome.set(Param::ObstacleThreshold, clear_max - margin);
            }
        }
    }

    /// Apply a fixed delta to one parameter and re-run the constraint pass.
    pub fn nudge(&self, genome: &mut Genome, param: Param, delta: i32) {
        let current = genome.get(param);
        genome.set(param, current.saturating_add(delta));
        self.constrain(genome);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub values: [i32; PARAM_COUNT],
    pub generation: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub fitness_score: f32,
}

impl Genome {
    pub fn from_schema(schema: &GenomeSchema) -> Self {
        let mut values = [0; PARAM_COUNT];
        for (value, spec) in values.iter_mut().zip(schema.params.iter()) {
            *value = spec.default;
        }
        Self {
            values,
            generation: 0,
            success_count: 0,
            failure_count: 0,
            fitness_score: 0.0,
        }
    }

    pub fn get(&self, param: Param) -> i32 {
        self.values[param.index()]
    }

    pub fn set(&mut self, param: Param, value: i32) {
        self.values[param.index()] = value;
    }

    pub fn motor_speed(&self) -> u8 {
        to_pwm(self.get(Param::MotorSpeed))
    }

    pub fn turn_speed(&self) -> u8 {
        to_pwm(self.get(Param::TurnSpeed))
    }

    pub fn backup_ms(&self) -> u32 {
        self.get(Param::BackupDuration).max(0) as u32
    }

    pub fn turn_ms(&self) -> u32 {
        self.get(Param::TurnDuration).max(0) as u32
    }

    pub fn scan_delay_ms(&self) -> u32 {
        self.get(Param::ScanDelay).max(0) as u32
    }

    pub fn obstacle_threshold_mm(&self) -> u16 {
        to_mm(self.get(Param::ObstacleThreshold))
    }

    pub fn clear_threshold_mm(&self) -> u16 {
        to_mm(self.get(Param::ClearThreshold))
    }

    pub fn within(&self, schema: &GenomeSchema) -> bool {
        Param::ALL.into_iter().all(|param| {
            let spec = schema.spec(param);
            (spec.min..=spec.max).contains(&self.get(param))
        }) && self.get(Param::ClearThreshold)
            >= self.get(Param::ObstacleThreshold) + schema.clear_margin
    }
}

fn to_pwm(value: i32) -> u8 {
    value.clamp(0, u8::MAX as i32) as u8
}

fn to_mm(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    pub param: Param,
    pub before: i32,
    pub after: i32,
}

/// The (at most three) parameters touched by one mutation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReport {
    pub generation: u32,
    pub changes: [Option<ParamChange>; 3],
}

impl MutationReport {
    pub fn changes(&self) -> impl Iterator<Item = &ParamChange> {
        self.changes.iter().flatten()
    }
}

/// Mutate 1-3 distinct enabled parameters, re-apply constraints and advance the generation.
pub fn mutate(genome: &mut Genome, schema: &GenomeSchema, rng: &mut SeededRng) -> MutationReport {
    let mut pool = [Param::MotorSpeed; PARAM_COUNT];
    let mut available = 0;
    for param in schema.enabled() {
        pool[available] = param;
        available += 1;
    }

    let mut report = MutationReport::default();
    let wanted = (rng.next_range(1, 4) as usize).min(available);

    for slot in 0..wanted {
        // Partial Fisher-Yates over the enabled pool keeps picks distinct.
        let pick = slot + rng.next_int((available - slot) as u32) as usize;
        pool.swap(slot, pick);
        let param = pool[slot];
        let spec = schema.spec(param);
        let before = genome.get(param);
        let proposed = match spec.mutation {
            Mutation::Delta(d) => before.saturating_add(rng.next_range(-d, d.saturating_add(1))),
            Mutation::Resample => rng.next_range(spec.min, spec.max.saturating_add(1)),
        };
        genome.set(param, proposed);
        report.changes[slot] = Some(ParamChange {
            param,
            before,
            after: proposed,
        });
    }

    schema.constrain(genome);
    for change in report.changes.iter_mut().flatten() {
        change.after = genome.get(change.param);
    }

    genome.generation = genome.generation.saturating_add(1);
    report.generation = genome.generation;

    debug!(
        generation = genome.generation,
        changed = wanted,
        "genome mutated"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        GenomeSchema::wheelie().validate().unwrap();
        GenomeSchema::speedie().validate().unwrap();
    }

    #[test]
    fn defaults_satisfy_schema() {
        for schema in [GenomeSchema::wheelie(), GenomeSchema::speedie()] {
            let genome = Genome::from_schema(&schema);
            assert!(genome.within(&schema));
            assert_eq!(genome.generation, 0);
        }
    }

    #[test]
    fn motor_speed_saturates_at_upper_bound() {
        let schema = GenomeSchema::wheelie();
        let mut genome = Genome::from_schema(&schema);
        genome.set(Param::MotorSpeed, 255);
        schema.nudge(&mut genome, Param::MotorSpeed, 21);
        assert_eq!(genome.get(Param::MotorSpeed), 255);
    }

    #[test]
    fn repair_raises_clear_above_obstacle() {
        let schema = GenomeSchema::wheelie();
        let mut genome = Genome::from_schema(&schema);
        genome.set(Param::ObstacleThreshold, 300);
        genome.set(Param::ClearThreshold, 310);
        schema.constrain(&mut genome);
        assert_eq!(genome.get(Param::ClearThreshold), 350);
        assert!(genome.within(&schema));
    }

    #[test]
    fn repair_lowers_obstacle_when_clear_cannot_rise() {
        let mut schema = GenomeSchema::wheelie();
        schema.params[Param::ObstacleThreshold.index()].max = 480;
        let mut genome = Genome::from_schema(&schema);
        genome.set(Param::ObstacleThreshold, 480);
        genome.set(Param::ClearThreshold, 490);
        schema.constrain(&mut genome);
        assert_eq!(genome.get(Param::ClearThreshold), 500);
        assert_eq!(genome.get(Param::ObstacleThreshold), 450);
    }

    #[test]
    fn mutation_keeps_every_parameter_in_range() {
        for schema in [GenomeSchema::wheelie(), GenomeSchema::speedie()] {
            let mut rng = SeededRng::new(0xC0FFEE);
            let mut genome = Genome::from_schema(&schema);
            for round in 1..=2_000u32 {
                let report = mutate(&mut genome, &schema, &mut rng);
                assert!(genome.within(&schema), "round {round}: {genome:?}");
                assert_eq!(genome.generation, round);
                let touched = report.changes().count();
                assert!((1..=3).contains(&touched));
            }
        }
    }

    #[test]
    fn disabled_parameters_never_move() {
        let schema = GenomeSchema::wheelie();
        let mut rng = SeededRng::new(42);
        let mut genome = Genome::from_schema(&schema);
        for _ in 0..500 {
            let report = mutate(&mut genome, &schema, &mut rng);
            assert!(report.changes().all(|c| schema.spec(c.param).enabled));
        }
        assert_eq!(genome.get(Param::MaxAcceleration), 50);
        assert_eq!(genome.get(Param::CorneringSpeed), 160);
        assert_eq!(genome.get(Param::GyroSensitivity), 200);
    }

    #[test]
    fn mutation_picks_distinct_parameters() {
        let schema = GenomeSchema::speedie();
        let mut rng = SeededRng::new(9);
        let mut genome = Genome::from_schema(&schema);
        for _ in 0..500 {
            let report = mutate(&mut genome, &schema, &mut rng);
            let picked: alloc::vec::Vec<Param> = report.changes().map(|c| c.param).collect();
            for (i, a) in picked.iter().enumerate() {
                assert!(picked[i + 1..].iter().all(|b| b != a));
            }
        }
    }

    #[test]
    fn rejects_negative_delta_and_unbounded_max() {
        let mut schema = GenomeSchema::wheelie();
        schema.params[Param::TurnDuration.index()].mutation = Mutation::Delta(-5);
        assert_eq!(
            schema.validate(),
            Err(ConfigError::MutationDelta {
                param: Param::TurnDuration,
                delta: -5
            })
        );

        schema.params[Param::TurnDuration.index()].mutation = Mutation::Delta(i32::MAX);
        assert!(matches!(
            schema.validate(),
            Err(ConfigError::MutationDelta { delta: i32::MAX, .. })
        ));

        let mut schema = GenomeSchema::wheelie();
        schema.params[Param::BackupDuration.index()].max = i32::MAX;
        assert!(matches!(
            schema.validate(),
            Err(ConfigError::ParameterRange {
                param: Param::BackupDuration,
                ..
            })
        ));
    }

    #[test]
    fn rejects_unreachable_margin() {
        let mut schema = GenomeSchema::wheelie();
        schema.clear_margin = 400;
        assert!(matches!(
            schema.validate(),
            Err(ConfigError::ClearMarginUnreachable { .. })
        ));
    }
}
