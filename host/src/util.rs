use anyhow::{anyhow, Context, Result};
use evobot_core::config::PRESET_NAMES;
use evobot_core::EngineConfig;
use std::env;
use std::fs;
use std::path::Path;

pub const DEFAULT_SEED: u32 = 0xB07_5EED;
pub const DEFAULT_TICKS: u32 = 5_000;

pub fn parse_seed(seed: &str) -> Result<u32> {
    let s = seed.trim();
    if s.is_empty() {
        return Err(anyhow!("empty seed"));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).with_context(|| format!("invalid hex seed: {s}"))
    } else {
        s.parse::<u32>()
            .with_context(|| format!("invalid decimal seed: {s}"))
    }
}

pub fn seed_to_hex(seed: u32) -> String {
    format!("0x{seed:08x}")
}

pub fn parse_seed_csv(input: &str) -> Result<Vec<u32>> {
    let mut seeds = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        seeds.push(parse_seed(token)?);
    }
    if seeds.is_empty() {
        return Err(anyhow!("no seeds parsed from --seeds"));
    }
    Ok(seeds)
}

/// `count` seeds starting at `start`, stepped with an LCG so neighbouring runs decorrelate.
pub fn seed_sequence(start: u32, count: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(count as usize);
    let mut cur = start;
    for _ in 0..count {
        out.push(cur);
        cur = cur.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    }
    out
}

pub fn read_env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| parse_seed(&value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub fn read_env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Tick count from `EVOBOT_TICKS`, falling back to [`DEFAULT_TICKS`].
pub fn default_ticks() -> u32 {
    read_env_u32("EVOBOT_TICKS", DEFAULT_TICKS)
}

/// Seed from `EVOBOT_SEED` (hex or decimal), falling back to [`DEFAULT_SEED`].
pub fn default_seed() -> u32 {
    read_env_u32("EVOBOT_SEED", DEFAULT_SEED)
}

/// A full JSON config when `config_path` is given, otherwise the named preset.
pub fn load_engine_config(profile: &str, config_path: Option<&Path>) -> Result<EngineConfig> {
    let config = match config_path {
        Some(path) => {
            let data = fs::read(path)
                .with_context(|| format!("failed reading config {}", path.display()))?;
            serde_json::from_slice::<EngineConfig>(&data)
                .with_context(|| format!("failed parsing config {}", path.display()))?
        }
        None => EngineConfig::preset(profile).ok_or_else(|| {
            anyhow!(
                "unknown profile '{profile}'. available: {}",
                PRESET_NAMES.join(", ")
            )
        })?,
    };
    config.validate().context("invalid engine config")?;
    Ok(config)
}
