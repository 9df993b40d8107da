//! Hard limits and the persisted image layout.
//!
//! Offsets are fixed so an image written by one firmware build stays readable by
//! the next. Every region is framed as
//! `tag u8 | version u8 | payload_len u16 | payload | crc32 u32`.

/// Nonvolatile budget of the reference controller (emulated EEPROM page).
pub const STORE_SIZE: usize = 4096;

pub const PARAM_COUNT: usize = 12;
pub const MAX_STRATEGY_SLOTS: usize = 25;
pub const MAX_VOCABULARY_SLOTS: usize = 50;
pub const MAX_PATTERN_LEN: usize = 6;

pub const VALENCE_MIN: i8 = -100;
pub const VALENCE_MAX: i8 = 100;

// Signal rendering
pub const TONE_MIN_HZ: u16 = 200;
pub const TONE_MAX_HZ: u16 = 4000;
pub const SIGNAL_GAP_MS: u16 = 50;

// Region framing
pub const REGION_VERSION: u8 = 1;
pub const REGION_HEADER_SIZE: usize = 4;
pub const REGION_FOOTER_SIZE: usize = 4;
pub const GENOME_TAG: u8 = 0x47; // 'G'
pub const STRATEGY_TAG: u8 = 0x53; // 'S'
pub const METRICS_TAG: u8 = 0x4D; // 'M'
pub const VOCABULARY_TAG: u8 = 0x56; // 'V'

// Record sizes
pub const GENOME_RECORD_SIZE: usize = PARAM_COUNT * 4 + 16;
pub const GENOME_PAYLOAD_SIZE: usize = 4 + GENOME_RECORD_SIZE * 2;
pub const STRATEGY_SLOT_SIZE: usize = 28;
pub const STRATEGY_PAYLOAD_SIZE: usize = 4 + MAX_STRATEGY_SLOTS * STRATEGY_SLOT_SIZE;
pub const METRICS_PAYLOAD_SIZE: usize = 32;
pub const VOCABULARY_SLOT_SIZE: usize = 44;
pub const VOCABULARY_PAYLOAD_SIZE: usize = 4 + MAX_VOCABULARY_SLOTS * VOCABULARY_SLOT_SIZE;

// Region placement
pub const GENOME_REGION_OFFSET: usize = 0;
pub const GENOME_REGION_SIZE: usize = 160;
pub const STRATEGY_REGION_OFFSET: usize = GENOME_REGION_OFFSET + GENOME_REGION_SIZE;
pub const STRATEGY_REGION_SIZE: usize = 720;
pub const METRICS_REGION_OFFSET: usize = STRATEGY_REGION_OFFSET + STRATEGY_REGION_SIZE;
pub const METRICS_REGION_SIZE: usize = 64;
pub const VOCABULARY_REGION_OFFSET: usize = METRICS_REGION_OFFSET + METRICS_REGION_SIZE;
pub const VOCABULARY_REGION_SIZE: usize = 2216;
pub const LAYOUT_END: usize = VOCABULARY_REGION_OFFSET + VOCABULARY_REGION_SIZE;

const FRAME_OVERHEAD: usize = REGION_HEADER_SIZE + REGION_FOOTER_SIZE;

const _: () = assert!(GENOME_PAYLOAD_SIZE + FRAME_OVERHEAD <= GENOME_REGION_SIZE);
const _: () = assert!(STRATEGY_PAYLOAD_SIZE + FRAME_OVERHEAD <= STRATEGY_REGION_SIZE);
const _: () = assert!(METRICS_PAYLOAD_SIZE + FRAME_OVERHEAD <= METRICS_REGION_SIZE);
const _: () = assert!(VOCABULARY_PAYLOAD_SIZE + FRAME_OVERHEAD <= VOCABULARY_REGION_SIZE);
const _: () = assert!(LAYOUT_END <= STORE_SIZE);
