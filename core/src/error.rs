use core::fmt;

use crate::genome::Param;
use crate::layout::Region;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    Backend {
        reason: &'static str,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "store access out of bounds: {len} bytes at offset {offset} (capacity {capacity})"
            ),
            Self::Backend { reason } => write!(f, "store backend failure: {reason}"),
        }
    }
}

/// Why a region that carries its own tag could not be trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionFault {
    UnknownTag { expected: u8, found: u8 },
    UnsupportedVersion { found: u8 },
    LengthMismatch { expected: usize, actual: usize },
    CrcMismatch { stored: u32, computed: u32 },
    InvalidRecord { field: &'static str, slot: usize },
}

impl fmt::Display for RegionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag { expected, found } => write!(
                f,
                "unexpected region tag: expected 0x{expected:02x}, found 0x{found:02x}"
            ),
            Self::UnsupportedVersion { found } => write!(f, "unsupported region version: {found}"),
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "payload length mismatch: expected {expected} bytes, got {actual}"
            ),
            Self::CrcMismatch { stored, computed } => write!(
                f,
                "crc mismatch: stored=0x{stored:08x}, computed=0x{computed:08x}"
            ),
            Self::InvalidRecord { field, slot } => {
                write!(f, "invalid record at slot {slot}: bad {field}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    ParameterRange {
        param: Param,
        min: i32,
        max: i32,
        default: i32,
    },
    MutationDelta {
        param: Param,
        delta: i32,
    },
    ClearMarginUnreachable {
        obstacle_min: i32,
        clear_max: i32,
        margin: i32,
    },
    StrategyCapacity {
        requested: usize,
        max: usize,
    },
    VocabularyCapacity {
        requested: usize,
        max: usize,
    },
    Probability {
        field: &'static str,
        value: f32,
    },
    SchedulerMultipliers {
        min: f32,
        max: f32,
    },
    StoreTooSmall {
        capacity: usize,
        required: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterRange {
                param,
                min,
                max,
                default,
            } => write!(
                f,
                "parameter {} has inconsistent range: default {default} not in [{min}, {max}]",
                param.name()
            ),
            Self::MutationDelta { param, delta } => write!(
                f,
                "parameter {} has invalid mutation delta {delta}",
                param.name()
            ),
            Self::ClearMarginUnreachable {
                obstacle_min,
                clear_max,
                margin,
            } => write!(
                f,
                "clear threshold max {clear_max} cannot exceed obstacle min {obstacle_min} by margin {margin}"
            ),
            Self::StrategyCapacity { requested, max } => {
                write!(f, "strategy capacity {requested} outside 1..={max}")
            }
            Self::VocabularyCapacity { requested, max } => {
                write!(f, "vocabulary capacity {requested} outside 1..={max}")
            }
            Self::Probability { field, value } => {
                write!(f, "{field} must be a probability in [0, 1], got {value}")
            }
            Self::SchedulerMultipliers { min, max } => write!(
                f,
                "scheduler multiplier bounds invalid: min={min}, max={max}"
            ),
            Self::StoreTooSmall { capacity, required } => write!(
                f,
                "store too small: {capacity} bytes, layout needs {required}"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BrainError {
    Config(ConfigError),
    Store(StoreError),
    CorruptRegion { region: Region, fault: RegionFault },
}

impl fmt::Display for BrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::CorruptRegion { region, fault } => {
                write!(f, "{region} region is corrupt: {fault}")
            }
        }
    }
}

impl From<ConfigError> for BrainError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<StoreError> for BrainError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StoreError {}

#[cfg(feature = "std")]
impl std::error::Error for RegionFault {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for BrainError {}
