//! Fixed-offset binary regions of the persisted image.
//!
//! All integers are little-endian and every `f32` is stored through `to_bits`, so
//! a save followed by a load is bit-identical.

use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    GENOME_PAYLOAD_SIZE, GENOME_RECORD_SIZE, GENOME_REGION_OFFSET, GENOME_REGION_SIZE, GENOME_TAG, MAX_PATTERN_LEN,
    MAX_STRATEGY_SLOTS, MAX_VOCABULARY_SLOTS, METRICS_PAYLOAD_SIZE, METRICS_REGION_OFFSET,
    METRICS_REGION_SIZE, METRICS_TAG, PARAM_COUNT, REGION_FOOTER_SIZE, REGION_HEADER_SIZE,
    REGION_VERSION, STRATEGY_PAYLOAD_SIZE, STRATEGY_REGION_OFFSET, STRATEGY_REGION_SIZE,
    STRATEGY_SLOT_SIZE, STRATEGY_TAG, VALENCE_MAX, VALENCE_MIN, VOCABULARY_PAYLOAD_SIZE,
    VOCABULARY_REGION_OFFSET, VOCABULARY_REGION_SIZE, VOCABULARY_SLOT_SIZE, VOCABULARY_TAG,
};
use crate::error::{RegionFault, StoreError};
use crate::evolution::GenomeEvolution;
use crate::genome::Genome;
use crate::metrics::PerformanceMetrics;
use crate::store::{crc32, NvStore, ERASED_BYTE};
use crate::strategy::{LearnedStrategy, StrategyMemory, TurnDirection};
use crate::vocabulary::{ContextKind, Cue, SignalPattern, SignalWord, Tone, Vocabulary};

const NO_FASTEST: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Genome,
    Strategies,
    Metrics,
    Vocabulary,
}

impl Region {
    pub const ALL: [Region; 4] = [
        Region::Genome,
        Region::Strategies,
        Region::Metrics,
        Region::Vocabulary,
    ];

    pub fn offset(self) -> usize {
        match self {
            Self::Genome => GENOME_REGION_OFFSET,
            Self::Strategies => STRATEGY_REGION_OFFSET,
            Self::Metrics => METRICS_REGION_OFFSET,
            Self::Vocabulary => VOCABULARY_REGION_OFFSET,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::Genome => GENOME_REGION_SIZE,
            Self::Strategies => STRATEGY_REGION_SIZE,
            Self::Metrics => METRICS_REGION_SIZE,
            Self::Vocabulary => VOCABULARY_REGION_SIZE,
        }
    }

    pub fn payload_size(self) -> usize {
        match self {
            Self::Genome => GENOME_PAYLOAD_SIZE,
            Self::Strategies => STRATEGY_PAYLOAD_SIZE,
            Self::Metrics => METRICS_PAYLOAD_SIZE,
            Self::Vocabulary => VOCABULARY_PAYLOAD_SIZE,
        }
    }

    pub fn frame_size(self) -> usize {
        REGION_HEADER_SIZE + self.payload_size() + REGION_FOOTER_SIZE
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Genome => GENOME_TAG,
            Self::Strategies => STRATEGY_TAG,
            Self::Metrics => METRICS_TAG,
            Self::Vocabulary => VOCABULARY_TAG,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Genome => "genome",
            Self::Strategies => "strategies",
            Self::Metrics => "metrics",
            Self::Vocabulary => "vocabulary",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Log a warning, use defaults and overwrite the bad region.
    #[default]
    FallbackToDefaults,
    /// Fail the boot with `BrainError::CorruptRegion`.
    Refuse,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub corruption_policy: CorruptionPolicy,
}

/// Result of reading one region back from the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Loaded<T> {
    /// Tag absent: the region was never written.
    Unwritten,
    Valid(T),
    Corrupt(RegionFault),
}

pub fn frame(region: Region, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(REGION_HEADER_SIZE + payload.len() + REGION_FOOTER_SIZE);
    out.push(region.tag());
    out.push(REGION_VERSION);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    let checksum = crc32(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

/// Returns the payload of a framed region, `None` when the region was never written.
///
/// Only a header that is uniformly erased (all 0xFF or all 0x00) counts as unwritten;
/// any other foreign tag is a fault.
pub fn unframe(region: Region, bytes: &[u8]) -> Result<Option<&[u8]>, RegionFault> {
    if bytes.len() < REGION_HEADER_SIZE {
        return Ok(None);
    }
    let header = &bytes[..REGION_HEADER_SIZE];
    if header.iter().all(|&b| b == ERASED_BYTE) || header.iter().all(|&b| b == 0) {
        return Ok(None);
    }
    if bytes[0] != region.tag() {
        return Err(RegionFault::UnknownTag {
            expected: region.tag(),
            found: bytes[0],
        });
    }
    if bytes[1] != REGION_VERSION {
        return Err(RegionFault::UnsupportedVersion { found: bytes[1] });
    }

    let declared = read_u16_le(bytes, 2) as usize;
    let expected = region.payload_size();
    if declared != expected || bytes.len() < region.frame_size() {
        return Err(RegionFault::LengthMismatch {
            expected,
            actual: declared,
        });
    }

    let body_end = REGION_HEADER_SIZE + expected;
    let stored = read_u32_le(bytes, body_end);
    let computed = crc32(&bytes[..body_end]);
    if stored != computed {
        return Err(RegionFault::CrcMismatch { stored, computed });
    }
    Ok(Some(&bytes[REGION_HEADER_SIZE..body_end]))
}

pub fn write_region<S: NvStore + ?Sized>(
    store: &mut S,
    region: Region,
    payload: &[u8],
) -> Result<(), StoreError> {
    store.put(region.offset(), &frame(region, payload))?;
    store.commit()
}

pub fn load<S, T>(
    store: &S,
    region: Region,
    decode: fn(&[u8]) -> Result<T, RegionFault>,
) -> Result<Loaded<T>, StoreError>
where
    S: NvStore + ?Sized,
{
    let mut bytes = alloc::vec![0u8; region.frame_size()];
    store.get(region.offset(), &mut bytes)?;
    Ok(match unframe(region, &bytes) {
        Ok(None) => Loaded::Unwritten,
        Ok(Some(payload)) => match decode(payload) {
            Ok(value) => Loaded::Valid(value),
            Err(fault) => Loaded::Corrupt(fault),
        },
        Err(fault) => Loaded::Corrupt(fault),
    })
}

// Genome region: current record, pending-trial flag, parent record.

fn put_genome(out: &mut Vec<u8>, genome: &Genome) {
    for value in genome.values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&genome.generation.to_le_bytes());
    out.extend_from_slice(&genome.success_count.to_le_bytes());
    out.extend_from_slice(&genome.failure_count.to_le_bytes());
    out.extend_from_slice(&genome.fitness_score.to_bits().to_le_bytes());
}

fn get_genome(bytes: &[u8], offset: usize) -> Genome {
    let mut values = [0i32; PARAM_COUNT];
    for (i, value) in values.iter_mut().enumerate() {
        *value = read_u32_le(bytes, offset + i * 4) as i32;
    }
    let tail = offset + PARAM_COUNT * 4;
    Genome {
        values,
        generation: read_u32_le(bytes, tail),
        success_count: read_u32_le(bytes, tail + 4),
        failure_count: read_u32_le(bytes, tail + 8),
        fitness_score: f32::from_bits(read_u32_le(bytes, tail + 12)),
    }
}

pub fn encode_genome(evolution: &GenomeEvolution) -> Vec<u8> {
    let mut out = Vec::with_capacity(GENOME_PAYLOAD_SIZE);
    put_genome(&mut out, &evolution.genome);
    out.push(u8::from(evolution.parent.is_some()));
    out.extend_from_slice(&[0; 3]);
    match &evolution.parent {
        Some(parent) => put_genome(&mut out, parent),
        None => out.resize(GENOME_PAYLOAD_SIZE, 0),
    }
    out
}

pub fn decode_genome(payload: &[u8]) -> Result<GenomeEvolution, RegionFault> {
    check_len(payload, GENOME_PAYLOAD_SIZE)?;
    let genome = get_genome(payload, 0);
    let parent = match payload[GENOME_RECORD_SIZE] {
        0 => None,
        1 => Some(get_genome(payload, GENOME_RECORD_SIZE + 4)),
        _ => {
            return Err(RegionFault::InvalidRecord {
                field: "pending_trial",
                slot: 0,
            })
        }
    };
    Ok(GenomeEvolution { genome, parent })
}

// Strategy region: count, reserved, fixed slot array.

pub fn encode_strategies(memory: &StrategyMemory) -> Vec<u8> {
    let entries = &memory.entries()[..memory.len().min(MAX_STRATEGY_SLOTS)];
    let mut out = Vec::with_capacity(STRATEGY_PAYLOAD_SIZE);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&[0; 2]);
    for entry in entries {
        out.extend_from_slice(&entry.context_distance_mm.to_le_bytes());
        out.push(entry.direction as u8);
        out.push(0);
        out.extend_from_slice(&entry.backup_ms.to_le_bytes());
        out.extend_from_slice(&entry.turn_ms.to_le_bytes());
        out.extend_from_slice(&entry.success_rate.to_bits().to_le_bytes());
        out.extend_from_slice(&entry.times_used.to_le_bytes());
        out.extend_from_slice(&entry.times_succeeded.to_le_bytes());
        out.extend_from_slice(&entry.avg_completion_ms.to_bits().to_le_bytes());
        out.extend_from_slice(&entry.last_used_generation.to_le_bytes());
    }
    out.resize(STRATEGY_PAYLOAD_SIZE, 0);
    out
}

pub fn decode_strategies(payload: &[u8]) -> Result<StrategyMemory, RegionFault> {
    check_len(payload, STRATEGY_PAYLOAD_SIZE)?;
    let count = read_u16_le(payload, 0) as usize;
    if count > MAX_STRATEGY_SLOTS {
        return Err(RegionFault::InvalidRecord {
            field: "count",
            slot: count,
        });
    }

    let mut entries = Vec::with_capacity(count);
    for slot in 0..count {
        let base = 4 + slot * STRATEGY_SLOT_SIZE;
        let direction = TurnDirection::from_u8(payload[base + 2]).ok_or(
            RegionFault::InvalidRecord {
                field: "direction",
                slot,
            },
        )?;
        let times_used = read_u32_le(payload, base + 12);
        let times_succeeded = read_u32_le(payload, base + 16);
        if times_succeeded > times_used {
            return Err(RegionFault::InvalidRecord {
                field: "times_succeeded",
                slot,
            });
        }
        entries.push(LearnedStrategy {
            context_distance_mm: read_u16_le(payload, base),
            direction,
            backup_ms: read_u16_le(payload, base + 4),
            turn_ms: read_u16_le(payload, base + 6),
            success_rate: f32::from_bits(read_u32_le(payload, base + 8)),
            times_used,
            times_succeeded,
            avg_completion_ms: f32::from_bits(read_u32_le(payload, base + 20)),
            last_used_generation: read_u32_le(payload, base + 24),
        });
    }
    Ok(StrategyMemory::from_entries(entries))
}

// Metrics region: eight 4-byte fields.

pub fn encode_metrics(metrics: &PerformanceMetrics) -> Vec<u8> {
    let fields = [
        metrics.obstacles_encountered,
        metrics.obstacles_cleared,
        metrics.times_trapped,
        metrics.trap_escapes,
        metrics.total_distance_mm,
        metrics.fastest_completion_ms.unwrap_or(NO_FASTEST),
        metrics.average_escape_ms.to_bits(),
        metrics.escape_samples,
    ];
    let mut out = Vec::with_capacity(METRICS_PAYLOAD_SIZE);
    for field in fields {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out
}

pub fn decode_metrics(payload: &[u8]) -> Result<PerformanceMetrics, RegionFault> {
    check_len(payload, METRICS_PAYLOAD_SIZE)?;
    let field = |i: usize| read_u32_le(payload, i * 4);
    let fastest = field(5);
    Ok(PerformanceMetrics {
        obstacles_encountered: field(0),
        obstacles_cleared: field(1),
        times_trapped: field(2),
        trap_escapes: field(3),
        total_distance_mm: field(4),
        fastest_completion_ms: (fastest != NO_FASTEST).then_some(fastest),
        average_escape_ms: f32::from_bits(field(6)),
        escape_samples: field(7),
    })
}

// Vocabulary region: count, reserved, fixed slot array.

pub fn encode_vocabulary(vocabulary: &Vocabulary) -> Vec<u8> {
    let words = &vocabulary.words()[..vocabulary.len().min(MAX_VOCABULARY_SLOTS)];
    let mut out = Vec::with_capacity(VOCABULARY_PAYLOAD_SIZE);
    out.extend_from_slice(&(words.len() as u16).to_le_bytes());
    out.extend_from_slice(&[0; 2]);
    for word in words {
        out.push(word.context as u8);
        out.push(word.valence as u8);
        out.push(word.pattern.len() as u8);
        out.extend_from_slice(&[word.cue.r, word.cue.g, word.cue.b]);
        out.extend_from_slice(&word.uses_since_evolve.to_le_bytes());
        out.extend_from_slice(&word.generation.to_le_bytes());
        out.extend_from_slice(&word.utility.to_bits().to_le_bytes());
        out.extend_from_slice(&word.times_used.to_le_bytes());
        let mut freqs = [0u16; MAX_PATTERN_LEN];
        let mut durations = [0u16; MAX_PATTERN_LEN];
        for (i, tone) in word.pattern.tones().iter().enumerate() {
            freqs[i] = tone.freq_hz;
            durations[i] = tone.duration_ms;
        }
        for freq in freqs {
            out.extend_from_slice(&freq.to_le_bytes());
        }
        for duration in durations {
            out.extend_from_slice(&duration.to_le_bytes());
        }
    }
    out.resize(VOCABULARY_PAYLOAD_SIZE, 0);
    out
}

pub fn decode_vocabulary(payload: &[u8]) -> Result<Vocabulary, RegionFault> {
    check_len(payload, VOCABULARY_PAYLOAD_SIZE)?;
    let count = read_u16_le(payload, 0) as usize;
    if count > MAX_VOCABULARY_SLOTS {
        return Err(RegionFault::InvalidRecord {
            field: "count",
            slot: count,
        });
    }

    let mut words = Vec::with_capacity(count);
    for slot in 0..count {
        let base = 4 + slot * VOCABULARY_SLOT_SIZE;
        let context = ContextKind::from_u8(payload[base])
            .ok_or(RegionFault::InvalidRecord { field: "context", slot })?;
        let valence = payload[base + 1] as i8;
        if !(VALENCE_MIN..=VALENCE_MAX).contains(&valence) {
            return Err(RegionFault::InvalidRecord {
                field: "valence",
                slot,
            });
        }
        let len = payload[base + 2] as usize;
        if len > MAX_PATTERN_LEN {
            return Err(RegionFault::InvalidRecord {
                field: "pattern_len",
                slot,
            });
        }

        let mut tones = [Tone::default(); MAX_PATTERN_LEN];
        for (i, tone) in tones.iter_mut().enumerate().take(len) {
            tone.freq_hz = read_u16_le(payload, base + 20 + i * 2);
            tone.duration_ms = read_u16_le(payload, base + 32 + i * 2);
        }

        words.push(SignalWord {
            context,
            valence,
            cue: Cue {
                r: payload[base + 3],
                g: payload[base + 4],
                b: payload[base + 5],
            },
            uses_since_evolve: read_u16_le(payload, base + 6),
            generation: read_u32_le(payload, base + 8),
            utility: f32::from_bits(read_u32_le(payload, base + 12)),
            times_used: read_u32_le(payload, base + 16),
            pattern: SignalPattern::from_tones(&tones[..len]),
        });
    }
    Ok(Vocabulary::from_words(words))
}

fn check_len(payload: &[u8], expected: usize) -> Result<(), RegionFault> {
    if payload.len() != expected {
        return Err(RegionFault::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// What each region of an image currently holds, without touching the image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageSummary {
    pub genome: Loaded<GenomeEvolution>,
    pub strategies: Loaded<StrategyMemory>,
    pub metrics: Loaded<PerformanceMetrics>,
    pub vocabulary: Loaded<Vocabulary>,
}

pub fn inspect<S: NvStore + ?Sized>(store: &S) -> Result<ImageSummary, StoreError> {
    Ok(ImageSummary {
        genome: load(store, Region::Genome, decode_genome)?,
        strategies: load(store, Region::Strategies, decode_strategies)?,
        metrics: load(store, Region::Metrics, decode_metrics)?,
        vocabulary: load(store, Region::Vocabulary, decode_vocabulary)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STORE_SIZE;
    use crate::genome::GenomeSchema;
    use crate::rng::SeededRng;
    use crate::store::MemStore;
    use crate::strategy::{ManeuverSample, StrategyConfig};
    use crate::vocabulary::VocabularyConfig;

    #[test]
    fn regions_do_not_overlap() {
        for pair in Region::ALL.windows(2) {
            assert_eq!(pair[0].offset() + pair[0].size(), pair[1].offset());
        }
        for region in Region::ALL {
            assert!(region.frame_size() <= region.size());
        }
    }

    #[test]
    fn erased_store_reads_as_unwritten() {
        let store = MemStore::erased(STORE_SIZE);
        let summary = inspect(&store).unwrap();
        assert_eq!(summary.genome, Loaded::Unwritten);
        assert_eq!(summary.vocabulary, Loaded::Unwritten);

        let zeroed = MemStore::from_bytes(alloc::vec![0; STORE_SIZE]);
        assert_eq!(
            load(&zeroed, Region::Metrics, decode_metrics).unwrap(),
            Loaded::Unwritten
        );
    }

    #[test]
    fn genome_roundtrip_keeps_pending_trial() {
        let schema = GenomeSchema::speedie();
        let mut evolution = GenomeEvolution::new(&schema);
        evolution.genome.fitness_score = 0.123_456_79;
        evolution.mutate(&schema, &mut SeededRng::new(3));

        let mut store = MemStore::erased(STORE_SIZE);
        write_region(&mut store, Region::Genome, &encode_genome(&evolution)).unwrap();
        let loaded = load(&store, Region::Genome, decode_genome).unwrap();
        assert_eq!(loaded, Loaded::Valid(evolution));
    }

    #[test]
    fn strategies_and_vocabulary_roundtrip() {
        let config = StrategyConfig::wheelie();
        let mut memory = StrategyMemory::new();
        for (i, distance) in [120u16, 240, 360].into_iter().enumerate() {
            memory.learn(
                ManeuverSample {
                    distance_mm: distance,
                    direction: if i % 2 == 0 {
                        TurnDirection::Left
                    } else {
                        TurnDirection::Right
                    },
                    backup_ms: 500,
                    turn_ms: 300,
                    succeeded: i != 1,
                    completion_ms: 1_234 + i as u32,
                },
                7,
                &config,
            );
        }
        let decoded = decode_strategies(&encode_strategies(&memory)).unwrap();
        assert_eq!(decoded, memory);

        let mut vocabulary = Vocabulary::new();
        let mut rng = SeededRng::new(10);
        vocabulary.seed_defaults(4, &VocabularyConfig::wheelie(), &mut rng);
        vocabulary.mark_used(3);
        let decoded = decode_vocabulary(&encode_vocabulary(&vocabulary)).unwrap();
        assert_eq!(decoded, vocabulary);
    }

    #[test]
    fn metrics_roundtrip_preserves_missing_fastest() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_obstacle();
        metrics.record_escape_attempt(1_337, true);
        let decoded = decode_metrics(&encode_metrics(&metrics)).unwrap();
        assert_eq!(decoded, metrics);
        assert_eq!(decoded.fastest_completion_ms, None);
    }

    #[test]
    fn rejects_flipped_payload_byte() {
        let mut store = MemStore::erased(STORE_SIZE);
        let metrics = PerformanceMetrics {
            obstacles_encountered: 4,
            ..PerformanceMetrics::default()
        };
        write_region(&mut store, Region::Metrics, &encode_metrics(&metrics)).unwrap();
        store.as_bytes_mut()[Region::Metrics.offset() + REGION_HEADER_SIZE] ^= 0x01;

        let loaded = load(&store, Region::Metrics, decode_metrics).unwrap();
        assert!(matches!(loaded, Loaded::Corrupt(RegionFault::CrcMismatch { .. })));
    }

    #[test]
    fn damaged_tag_is_a_fault_not_an_empty_region() {
        let payload = encode_metrics(&PerformanceMetrics::default());
        let mut framed = frame(Region::Metrics, &payload);
        framed[0] ^= 0x10;
        assert_eq!(
            unframe(Region::Metrics, &framed),
            Err(RegionFault::UnknownTag {
                expected: METRICS_TAG,
                found: METRICS_TAG ^ 0x10
            })
        );

        let mut store = MemStore::erased(STORE_SIZE);
        let evolution = GenomeEvolution::new(&GenomeSchema::wheelie());
        write_region(&mut store, Region::Genome, &encode_genome(&evolution)).unwrap();
        store.as_bytes_mut()[Region::Genome.offset()] = 0x00;
        assert!(matches!(
            load(&store, Region::Genome, decode_genome).unwrap(),
            Loaded::Corrupt(RegionFault::UnknownTag { found: 0x00, .. })
        ));
    }

    #[test]
    fn rejects_unsupported_version_and_length() {
        let payload = encode_metrics(&PerformanceMetrics::default());
        let mut framed = frame(Region::Metrics, &payload);
        framed[1] = 9;
        assert!(matches!(
            unframe(Region::Metrics, &framed),
            Err(RegionFault::UnsupportedVersion { found: 9 })
        ));

        let mut framed = frame(Region::Metrics, &payload);
        framed[2] = 31;
        assert!(matches!(
            unframe(Region::Metrics, &framed),
            Err(RegionFault::LengthMismatch {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn rejects_out_of_range_vocabulary_fields() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.seed_defaults(0, &VocabularyConfig::wheelie(), &mut SeededRng::new(1));
        let mut payload = encode_vocabulary(&vocabulary);
        payload[4] = 9;
        assert!(matches!(
            decode_vocabulary(&payload),
            Err(RegionFault::InvalidRecord {
                field: "context",
                slot: 0
            })
        ));
    }
}
