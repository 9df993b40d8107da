//! Signal rendering off the control loop.
//!
//! The brain hands patterns to [`EmitterHandle::send`], which never blocks; a
//! tokio task plays them back at (scaled) wall-clock pace. A full queue drops
//! the signal rather than stalling the sensing loop.

use evobot_core::{Cue, SignalPattern};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmitterConfig {
    pub queue_capacity: usize,
    /// Wall-clock seconds per simulated second of tone. Zero renders instantly.
    pub time_scale: f32,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            time_scale: 0.01,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pulse {
    pub at_ms: u64,
    pub pattern: SignalPattern,
    pub cue: Cue,
    pub gap_ms: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterStats {
    pub rendered: u64,
    pub tones: u64,
    pub dropped: u64,
}

#[derive(Clone, Debug)]
pub struct EmitterHandle {
    tx: mpsc::Sender<Pulse>,
    dropped: Arc<AtomicU64>,
}

impl EmitterHandle {
    /// Queue `pulse` without waiting. Returns false when it had to be dropped.
    pub fn send(&self, pulse: Pulse) -> bool {
        match self.tx.try_send(pulse) {
            Ok(()) => true,
            Err(err) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    at_ms = pulse.at_ms,
                    dropped,
                    reason = %err,
                    "emitter queue unavailable, dropping signal"
                );
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawn the rendering task on the current tokio runtime. The task finishes
/// once every handle has been dropped and the queue is drained.
pub fn spawn_emitter(config: EmitterConfig) -> (EmitterHandle, JoinHandle<EmitterStats>) {
    let (tx, mut rx) = mpsc::channel::<Pulse>(config.queue_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = EmitterHandle {
        tx,
        dropped: Arc::clone(&dropped),
    };

    let task = tokio::spawn(async move {
        let mut stats = EmitterStats::default();
        while let Some(pulse) = rx.recv().await {
            let Cue { r, g, b } = pulse.cue;
            for tone in pulse.pattern.tones() {
                debug!(
                    at_ms = pulse.at_ms,
                    freq_hz = tone.freq_hz,
                    duration_ms = tone.duration_ms,
                    r,
                    g,
                    b,
                    "tone"
                );
                stats.tones += 1;
                let sim_ms = tone.duration_ms as f32 + pulse.gap_ms as f32;
                let wall_ms = (sim_ms * config.time_scale.max(0.0)) as u64;
                if wall_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(wall_ms)).await;
                }
            }
            stats.rendered += 1;
        }
        stats.dropped = dropped.load(Ordering::Relaxed);
        info!(
            rendered = stats.rendered,
            tones = stats.tones,
            dropped = stats.dropped,
            "emitter stopped"
        );
        stats
    });

    (handle, task)
}
