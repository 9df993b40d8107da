//! Self-organising vocabulary of multi-modal signals.
//!
//! Words are looked up by `(context, valence)`. When nothing scores well
//! enough a new word is synthesised from the valence regime, and at capacity the
//! lowest-utility word is overwritten in place so indices stay stable.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{MAX_PATTERN_LEN, TONE_MAX_HZ, TONE_MIN_HZ, VALENCE_MAX, VALENCE_MIN};
use crate::rng::SeededRng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ContextKind {
    Obstacle = 0,
    Success = 1,
    Trapped = 2,
    Clear = 3,
    Evolving = 4,
}

impl ContextKind {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Obstacle),
            1 => Some(Self::Success),
            2 => Some(Self::Trapped),
            3 => Some(Self::Clear),
            4 => Some(Self::Evolving),
            _ => None,
        }
    }
}

pub fn clamp_valence(valence: i32) -> i8 {
    valence.clamp(VALENCE_MIN as i32, VALENCE_MAX as i32) as i8
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tone {
    pub freq_hz: u16,
    pub duration_ms: u16,
}

/// Non-acoustic part of a signal (LED colour).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPattern {
    len: u8,
    tones: [Tone; MAX_PATTERN_LEN],
}

impl SignalPattern {
    /// Builds a pattern from up to `MAX_PATTERN_LEN` tones; extra tones are ignored.
    pub fn from_tones(tones: &[Tone]) -> Self {
        let mut pattern = Self::default();
        for tone in tones.iter().take(MAX_PATTERN_LEN) {
            pattern.tones[pattern.len as usize] = *tone;
            pattern.len += 1;
        }
        pattern
    }

    pub fn tones(&self) -> &[Tone] {
        &self.tones[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wall time to render the pattern with `gap_ms` between pulses.
    pub fn duration_ms(&self, gap_ms: u16) -> u32 {
        self.tones()
            .iter()
            .map(|tone| tone.duration_ms as u32 + gap_ms as u32)
            .sum()
    }

    fn tone_mut(&mut self, index: usize) -> Option<&mut Tone> {
        self.tones[..self.len as usize].get_mut(index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalWord {
    pub context: ContextKind,
    pub valence: i8,
    pub generation: u32,
    pub utility: f32,
    pub times_used: u32,
    pub uses_since_evolve: u16,
    pub pattern: SignalPattern,
    pub cue: Cue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Negative,
    Neutral,
    Positive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub capacity: usize,
    pub context_weight: f32,
    pub emotion_weight: f32,
    pub utility_weight: f32,
    pub partial_context_credit: f32,
    pub valence_range: f32,
    pub acceptance_threshold: f32,
    pub negative_below: i8,
    pub positive_above: i8,
    pub initial_utility: f32,
    pub usage_saturation: u32,
    pub aligned_bonus: f32,
    pub misaligned_penalty: f32,
    pub doing_well_fitness: f32,
    pub mutation_probability: f32,
    pub tone_mutation_hz: i32,
}

impl VocabularyConfig {
    pub fn wheelie() -> Self {
        Self {
            capacity: 50,
            context_weight: 0.5,
            emotion_weight: 0.3,
            utility_weight: 0.5,
            partial_context_credit: 0.3,
            valence_range: 200.0,
            acceptance_threshold: 0.5,
            negative_below: -30,
            positive_above: 30,
            initial_utility: 0.5,
            usage_saturation: 10,
            aligned_bonus: 0.2,
            misaligned_penalty: 0.1,
            doing_well_fitness: 0.5,
            mutation_probability: 0.30,
            tone_mutation_hz: 200,
        }
    }

    pub fn speedie() -> Self {
        Self {
            mutation_probability: 0.40,
            ..Self::wheelie()
        }
    }

    pub fn regime(&self, valence: i8) -> Regime {
        if valence < self.negative_below {
            Regime::Negative
        } else if valence > self.positive_above {
            Regime::Positive
        } else {
            Regime::Neutral
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SignalLookup {
    Reused { index: usize, score: f32 },
    Created { index: usize },
    Replaced { index: usize, evicted_utility: f32 },
}

impl SignalLookup {
    pub fn index(&self) -> usize {
        match *self {
            Self::Reused { index, .. } | Self::Created { index } | Self::Replaced { index, .. } => {
                index
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolveReport {
    pub rescored: usize,
    pub mutated: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    words: Vec<SignalWord>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_words(words: Vec<SignalWord>) -> Self {
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[SignalWord] {
        &self.words
    }

    pub fn get(&self, index: usize) -> Option<&SignalWord> {
        self.words.get(index)
    }

    pub(crate) fn truncate(&mut self, capacity: usize) {
        self.words.truncate(capacity);
    }

    pub fn score(
        word: &SignalWord,
        context: ContextKind,
        valence: i8,
        config: &VocabularyConfig,
    ) -> f32 {
        let context_match = if word.context == context {
            1.0
        } else {
            config.partial_context_credit
        };
        let distance = (word.valence as i32 - valence as i32).unsigned_abs() as f32;
        let emotional = 1.0 - distance / config.valence_range;
        config.context_weight * context_match
            + config.emotion_weight * emotional
            + config.utility_weight * word.utility
    }

    /// Arg-max over all words; ties keep the lowest index.
    pub fn best_match(
        &self,
        context: ContextKind,
        valence: i8,
        config: &VocabularyConfig,
    ) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, word) in self.words.iter().enumerate() {
            let score = Self::score(word, context, valence, config);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((index, score));
            }
        }
        best
    }

    /// Index of the word with the lowest utility (first one on ties).
    pub fn lowest_utility(&self) -> Option<usize> {
        let mut lowest: Option<(usize, f32)> = None;
        for (index, word) in self.words.iter().enumerate() {
            if lowest.map_or(true, |(_, min)| word.utility < min) {
                lowest = Some((index, word.utility));
            }
        }
        lowest.map(|(index, _)| index)
    }

    pub fn find_or_create(
        &mut self,
        context: ContextKind,
        valence: i8,
        generation: u32,
        config: &VocabularyConfig,
        rng: &mut SeededRng,
    ) -> SignalLookup {
        if let Some((index, score)) = self.best_match(context, valence, config) {
            if score >= config.acceptance_threshold {
                return SignalLookup::Reused { index, score };
            }
        }

        let word = synthesize(context, valence, generation, config, rng);
        self.insert(word, config)
    }

    /// Append `word`, or overwrite the lowest-utility word when full.
    pub fn insert(&mut self, word: SignalWord, config: &VocabularyConfig) -> SignalLookup {
        if self.words.len() < config.capacity {
            self.words.push(word);
            let index = self.words.len() - 1;
            debug!(index, context = ?word.context, valence = word.valence, "signal created");
            return SignalLookup::Created { index };
        }

        match self.lowest_utility() {
            Some(index) => {
                let evicted_utility = self.words[index].utility;
                self.words[index] = word;
                debug!(index, evicted_utility, context = ?word.context, "signal replaced");
                SignalLookup::Replaced {
                    index,
                    evicted_utility,
                }
            }
            None => {
                // capacity 0 is rejected by config validation; keep the word anyway.
                self.words.push(word);
                SignalLookup::Created { index: 0 }
            }
        }
    }

    pub fn mark_used(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index) {
            word.times_used = word.times_used.saturating_add(1);
            word.uses_since_evolve = word.uses_since_evolve.saturating_add(1);
        }
    }

    /// Rescore words used since the last call, then maybe perturb one pattern.
    pub fn evolve(
        &mut self,
        fitness: f32,
        config: &VocabularyConfig,
        rng: &mut SeededRng,
    ) -> EvolveReport {
        let doing_well = fitness > config.doing_well_fitness;
        let mut report = EvolveReport::default();

        for word in self.words.iter_mut().filter(|w| w.uses_since_evolve > 0) {
            let usage = (word.times_used as f32 / config.usage_saturation.max(1) as f32).min(1.0);
            let aligned = (doing_well && word.valence > 0) || (!doing_well && word.valence < 0);
            let alignment = if aligned {
                config.aligned_bonus
            } else {
                -config.misaligned_penalty
            };
            word.utility = (usage + alignment).clamp(0.0, 1.0);
            word.uses_since_evolve = 0;
            report.rescored += 1;
        }

        if !self.words.is_empty() && rng.chance(config.mutation_probability) {
            let index = rng.next_int(self.words.len() as u32) as usize;
            let word = &mut self.words[index];
            let tone_index = rng.next_int(word.pattern.len() as u32) as usize;
            let delta = rng.next_range(-config.tone_mutation_hz, config.tone_mutation_hz + 1);
            if let Some(tone) = word.pattern.tone_mut(tone_index) {
                tone.freq_hz = clamp_tone(tone.freq_hz as i32 + delta);
                report.mutated = Some(index);
                debug!(index, tone_index, freq_hz = tone.freq_hz, "signal pattern mutated");
            }
        }

        report
    }

    /// First-boot lexicon: one word per context.
    pub fn seed_defaults(&mut self, generation: u32, config: &VocabularyConfig, rng: &mut SeededRng) {
        const SEEDS: [(ContextKind, i8); 5] = [
            (ContextKind::Obstacle, -40),
            (ContextKind::Success, 60),
            (ContextKind::Trapped, -80),
            (ContextKind::Clear, 30),
            (ContextKind::Evolving, 20),
        ];
        for (context, valence) in SEEDS {
            if self.words.len() >= config.capacity {
                break;
            }
            self.words
                .push(synthesize(context, valence, generation, config, rng));
        }
    }
}

fn clamp_tone(freq_hz: i32) -> u16 {
    freq_hz.clamp(TONE_MIN_HZ as i32, TONE_MAX_HZ as i32) as u16
}

fn draw_u8(rng: &mut SeededRng, min: i32, max_exclusive: i32) -> u8 {
    rng.next_range(min, max_exclusive).clamp(0, u8::MAX as i32) as u8
}

fn draw_u16(rng: &mut SeededRng, min: i32, max_exclusive: i32) -> u16 {
    rng.next_range(min, max_exclusive).clamp(0, u16::MAX as i32) as u16
}

/// Build a fresh word whose sound and colour follow the valence regime.
pub fn synthesize(
    context: ContextKind,
    valence: i8,
    generation: u32,
    config: &VocabularyConfig,
    rng: &mut SeededRng,
) -> SignalWord {
    let valence = clamp_valence(valence as i32);
    let len = rng.next_range(2, MAX_PATTERN_LEN as i32 + 1) as usize;
    let regime = config.regime(valence);

    let mut tones = [Tone::default(); MAX_PATTERN_LEN];
    let cue = match regime {
        Regime::Negative => {
            for tone in tones.iter_mut().take(len) {
                tone.freq_hz = clamp_tone(rng.next_range(1500, 3000));
                tone.duration_ms = draw_u16(rng, 50, 150);
            }
            Cue {
                r: draw_u8(rng, 20, 50),
                g: draw_u8(rng, 0, 10),
                b: draw_u8(rng, 0, 5),
            }
        }
        Regime::Positive => {
            let base = rng.next_range(500, 1200);
            for (step, tone) in tones.iter_mut().take(len).enumerate() {
                tone.freq_hz = clamp_tone(base + step as i32 * 100);
                tone.duration_ms = draw_u16(rng, 100, 300);
            }
            Cue {
                r: draw_u8(rng, 0, 5),
                g: draw_u8(rng, 20, 50),
                b: draw_u8(rng, 15, 40),
            }
        }
        Regime::Neutral => {
            for tone in tones.iter_mut().take(len) {
                tone.freq_hz = clamp_tone(rng.next_range(800, 1800));
                tone.duration_ms = draw_u16(rng, 100, 250);
            }
            Cue {
                r: draw_u8(rng, 10, 30),
                g: draw_u8(rng, 10, 30),
                b: draw_u8(rng, 10, 30),
            }
        }
    };

    debug!(?context, valence, ?regime, len, "signal synthesised");
    SignalWord {
        context,
        valence,
        generation,
        utility: config.initial_utility,
        times_used: 0,
        uses_since_evolve: 0,
        pattern: SignalPattern::from_tones(&tones[..len]),
        cue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(context: ContextKind, valence: i8, utility: f32) -> SignalWord {
        SignalWord {
            context,
            valence,
            generation: 0,
            utility,
            times_used: 0,
            uses_since_evolve: 0,
            pattern: SignalPattern::from_tones(&[Tone {
                freq_hz: 1000,
                duration_ms: 100,
            }]),
            cue: Cue::default(),
        }
    }

    #[test]
    fn empty_vocabulary_creates_a_word() {
        let config = VocabularyConfig::wheelie();
        let mut vocab = Vocabulary::new();
        let mut rng = SeededRng::new(11);
        let lookup = vocab.find_or_create(ContextKind::Clear, 10, 0, &config, &mut rng);
        assert_eq!(lookup, SignalLookup::Created { index: 0 });
        assert_eq!(vocab.len(), 1);
    }

    #[test]
    fn exact_context_match_is_reused() {
        let config = VocabularyConfig::wheelie();
        let mut vocab = Vocabulary::from_words(alloc::vec![word(ContextKind::Success, 60, 0.5)]);
        let mut rng = SeededRng::new(1);
        let lookup = vocab.find_or_create(ContextKind::Success, 70, 3, &config, &mut rng);
        assert!(matches!(lookup, SignalLookup::Reused { index: 0, .. }));
        assert_eq!(vocab.len(), 1);
    }

    #[test]
    fn poor_match_creates_exactly_one_word() {
        let config = VocabularyConfig::wheelie();
        let mut vocab = Vocabulary::from_words(alloc::vec![word(ContextKind::Success, 90, 0.5)]);
        let mut rng = SeededRng::new(1);
        let lookup = vocab.find_or_create(ContextKind::Trapped, -90, 3, &config, &mut rng);
        assert_eq!(lookup, SignalLookup::Created { index: 1 });
        assert_eq!(vocab.len(), 2);
        let created = vocab.get(1).unwrap();
        assert_eq!(created.context, ContextKind::Trapped);
        assert_eq!(created.generation, 3);
        assert_eq!(created.utility, 0.5);
    }

    #[test]
    fn full_vocabulary_overwrites_lowest_utility_in_place() {
        let config = VocabularyConfig::wheelie();
        let mut words: Vec<SignalWord> = (0..50)
            .map(|_| word(ContextKind::Success, 90, 0.5))
            .collect();
        words[17].utility = 0.08;
        let mut vocab = Vocabulary::from_words(words);
        let mut rng = SeededRng::new(2);

        let lookup = vocab.find_or_create(ContextKind::Trapped, -90, 9, &config, &mut rng);
        assert!(matches!(
            lookup,
            SignalLookup::Replaced { index: 17, evicted_utility } if (evicted_utility - 0.08).abs() < 1e-6
        ));
        assert_eq!(vocab.len(), 50);
        assert_eq!(vocab.get(17).unwrap().context, ContextKind::Trapped);
    }

    #[test]
    fn synthesis_follows_valence_regime() {
        let config = VocabularyConfig::wheelie();
        let mut rng = SeededRng::new(77);
        for _ in 0..200 {
            let alarm = synthesize(ContextKind::Trapped, -80, 0, &config, &mut rng);
            assert!((2..=6).contains(&alarm.pattern.len()));
            assert!(alarm.pattern.tones().iter().all(|t| t.freq_hz >= 1500 && t.freq_hz < 3000));
            assert!(alarm.cue.r >= 20 && alarm.cue.g < 10);

            let joy = synthesize(ContextKind::Success, 80, 0, &config, &mut rng);
            let tones = joy.pattern.tones();
            assert!(tones.windows(2).all(|pair| pair[1].freq_hz == pair[0].freq_hz + 100));
            assert!(joy.cue.g >= 20 && joy.cue.r < 5);

            let calm = synthesize(ContextKind::Clear, 0, 0, &config, &mut rng);
            assert!(calm.pattern.tones().iter().all(|t| (800..1800).contains(&t.freq_hz)));
        }
    }

    #[test]
    fn evolve_rescores_only_used_words() {
        let mut config = VocabularyConfig::wheelie();
        config.mutation_probability = 0.0;
        let mut vocab = Vocabulary::from_words(alloc::vec![
            word(ContextKind::Success, 60, 0.5),
            word(ContextKind::Obstacle, -40, 0.5),
            word(ContextKind::Clear, 30, 0.5),
        ]);
        for _ in 0..5 {
            vocab.mark_used(0);
            vocab.mark_used(1);
        }
        let mut rng = SeededRng::new(4);
        let report = vocab.evolve(0.9, &config, &mut rng);

        assert_eq!(report.rescored, 2);
        assert!((vocab.get(0).unwrap().utility - 0.7).abs() < 1e-6);
        assert!((vocab.get(1).unwrap().utility - 0.4).abs() < 1e-6);
        assert_eq!(vocab.get(2).unwrap().utility, 0.5);
        assert!(vocab.words().iter().all(|w| w.uses_since_evolve == 0));
    }

    #[test]
    fn evolve_mutation_keeps_tones_in_band() {
        let mut config = VocabularyConfig::speedie();
        config.mutation_probability = 1.0;
        let mut vocab = Vocabulary::new();
        let mut rng = SeededRng::new(8);
        vocab.seed_defaults(0, &config, &mut rng);
        for _ in 0..500 {
            let report = vocab.evolve(0.2, &config, &mut rng);
            assert!(report.mutated.is_some());
        }
        for word in vocab.words() {
            for tone in word.pattern.tones() {
                assert!((TONE_MIN_HZ..=TONE_MAX_HZ).contains(&tone.freq_hz));
            }
        }
    }

    #[test]
    fn seeds_one_word_per_context() {
        let config = VocabularyConfig::wheelie();
        let mut vocab = Vocabulary::new();
        let mut rng = SeededRng::new(12);
        vocab.seed_defaults(0, &config, &mut rng);
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.get(2).unwrap().context, ContextKind::Trapped);
        assert_eq!(vocab.get(2).unwrap().valence, -80);
    }
}
