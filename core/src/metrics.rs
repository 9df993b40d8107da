use serde::{Deserialize, Serialize};

/// Lifetime performance counters. Only an explicit operator reset clears them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub obstacles_encountered: u32,
    pub obstacles_cleared: u32,
    pub times_trapped: u32,
    pub trap_escapes: u32,
    pub total_distance_mm: u32,
    pub fastest_completion_ms: Option<u32>,
    pub average_escape_ms: f32,
    pub escape_samples: u32,
}

impl PerformanceMetrics {
    pub fn record_obstacle(&mut self) {
        self.obstacles_encountered = self.obstacles_encountered.saturating_add(1);
    }

    pub fn record_cleared(&mut self, completion_ms: u32) {
        self.obstacles_cleared = self.obstacles_cleared.saturating_add(1);
        // u32::MAX is the persisted "no value" sentinel.
        let completion_ms = completion_ms.min(u32::MAX - 1);
        self.fastest_completion_ms = Some(match self.fastest_completion_ms {
            Some(best) => best.min(completion_ms),
            None => completion_ms,
        });
    }

    pub fn record_trapped(&mut self) {
        self.times_trapped = self.times_trapped.saturating_add(1);
    }

    /// Folds one escape attempt into the running mean; counts it as an escape when it worked.
    pub fn record_escape_attempt(&mut self, duration_ms: u32, escaped: bool) {
        if escaped {
            self.trap_escapes = self.trap_escapes.saturating_add(1);
        }
        self.escape_samples = self.escape_samples.saturating_add(1);
        let n = self.escape_samples as f32;
        self.average_escape_ms += (duration_ms as f32 - self.average_escape_ms) / n;
    }

    pub fn add_distance(&mut self, mm: u32) {
        self.total_distance_mm = self.total_distance_mm.saturating_add(mm);
    }

    pub fn success_rate(&self) -> f32 {
        ratio(self.obstacles_cleared, self.obstacles_encountered)
    }

    pub fn escape_rate(&self) -> f32 {
        ratio(self.trap_escapes, self.times_trapped)
    }

    /// Counter deltas accumulated since `baseline`. Fastest time and mean stay lifetime values.
    pub fn since(&self, baseline: &PerformanceMetrics) -> PerformanceMetrics {
        PerformanceMetrics {
            obstacles_encountered: self
                .obstacles_encountered
                .saturating_sub(baseline.obstacles_encountered),
            obstacles_cleared: self
                .obstacles_cleared
                .saturating_sub(baseline.obstacles_cleared),
            times_trapped: self.times_trapped.saturating_sub(baseline.times_trapped),
            trap_escapes: self.trap_escapes.saturating_sub(baseline.trap_escapes),
            total_distance_mm: self
                .total_distance_mm
                .saturating_sub(baseline.total_distance_mm),
            fastest_completion_ms: self.fastest_completion_ms,
            average_escape_ms: self.average_escape_ms,
            escape_samples: self.escape_samples.saturating_sub(baseline.escape_samples),
        }
    }
}

/// `num / den`, or 0 when nothing has been observed yet.
pub fn ratio(num: u32, den: u32) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_without_samples() {
        let metrics = PerformanceMetrics::default();
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.escape_rate(), 0.0);
        assert_eq!(metrics.fastest_completion_ms, None);
    }

    #[test]
    fn fastest_completion_only_improves() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_cleared(2_400);
        metrics.record_cleared(3_100);
        metrics.record_cleared(1_900);
        assert_eq!(metrics.fastest_completion_ms, Some(1_900));
        assert_eq!(metrics.obstacles_cleared, 3);
    }

    #[test]
    fn escape_mean_is_running_average() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_escape_attempt(1_000, true);
        metrics.record_escape_attempt(2_000, false);
        metrics.record_escape_attempt(3_000, true);
        assert!((metrics.average_escape_ms - 2_000.0).abs() < 1e-3);
        assert_eq!(metrics.trap_escapes, 2);
        assert_eq!(metrics.escape_samples, 3);
    }

    #[test]
    fn since_reports_counter_deltas() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_obstacle();
        metrics.record_cleared(500);
        let baseline = metrics;
        metrics.record_obstacle();
        metrics.record_obstacle();
        metrics.record_cleared(700);
        let window = metrics.since(&baseline);
        assert_eq!(window.obstacles_encountered, 2);
        assert_eq!(window.obstacles_cleared, 1);
        assert_eq!(window.fastest_completion_ms, Some(500));
    }
}
