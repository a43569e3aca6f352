//! Adaptive buffer sizing for file transfers.
//!
//! The chunk size the engine reads from disk and frames onto the wire is
//! controlled here. Sizing tracks the bandwidth-delay product of the link,
//! with trend classification over a bounded sample history, a cooldown
//! between adjustments and damped movement toward the target, so the size
//! neither starves a fat pipe nor oscillates on noisy measurements.
//!
//! Sizes are always powers of two within the configured clamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::config::TransferConfig;
use crate::constants::{BDP_RTT_FLOOR, DEFAULT_BUFFER_SIZE, DEFAULT_RTT};
use crate::error::{Error, Result};

/// How eagerly the initial chunk size is picked from measured latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptationStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

/// Direction the measured throughput is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Improving,
    Degrading,
    Stable,
}

const IMPROVING_RATIO: f64 = 1.05;
const DEGRADING_RATIO: f64 = 0.95;
const FACTOR_IMPROVING: f64 = 1.4;
const FACTOR_DEGRADING: f64 = 0.7;
const FACTOR_STABLE: f64 = 1.1;
const DAMPING_ALPHA: f64 = 0.25;
const MIN_SAMPLES_FOR_ADJUST: usize = 3;

#[derive(Debug, Clone)]
struct Sample {
    at: Instant,
    bytes: u64,
    duration: Duration,
    rate: f64,
}

/// Derived statistics over the sample history.
#[derive(Debug, Clone, Serialize)]
pub struct BufferMetrics {
    /// Current chunk size in bytes.
    pub current_size: usize,
    /// Mean throughput over the history, bytes/second.
    pub mean_rate: f64,
    /// Peak throughput over the history, bytes/second.
    pub peak_rate: f64,
    /// `1 − coefficient_of_variation`, clamped to `[0, 1]`.
    pub stability: f64,
    /// Adjustment passes per minute since construction.
    pub adjustments_per_minute: f64,
}

/// Adaptive chunk-size controller.
#[derive(Debug)]
pub struct BufferManager {
    current: usize,
    min: usize,
    max: usize,
    history: VecDeque<Sample>,
    capacity: usize,
    cooldown: Duration,
    rtt: Duration,
    last_adjust: Instant,
    adjustments: u64,
    created_at: Instant,
}

impl BufferManager {
    /// Build a manager from the transfer configuration.
    ///
    /// The only fallible constructor in the controller; all later operations
    /// are infallible.
    pub fn new(config: &TransferConfig) -> Result<Self> {
        if config.min_buffer_size == 0 {
            return Err(Error::config("min_buffer_size must be non-zero"));
        }
        let min = nearest_power_of_two(config.min_buffer_size);
        let max = nearest_power_of_two(config.max_buffer_size);
        if min > max {
            return Err(Error::config(format!(
                "buffer bounds are inverted: min {min} > max {max}"
            )));
        }
        if config.history_size < MIN_SAMPLES_FOR_ADJUST {
            return Err(Error::config(format!(
                "history_size must be at least {MIN_SAMPLES_FOR_ADJUST}"
            )));
        }

        let initial = config.initial_buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let now = Instant::now();
        Ok(Self {
            current: nearest_power_of_two(initial).clamp(min, max),
            min,
            max,
            history: VecDeque::with_capacity(config.history_size),
            capacity: config.history_size,
            cooldown: config.adjust_cooldown,
            rtt: DEFAULT_RTT,
            last_adjust: now,
            adjustments: 0,
            created_at: now,
        })
    }

    /// Current chunk size: a power of two in `[min, max]`.
    pub fn current_size(&self) -> usize {
        self.current
    }

    /// RTT currently driving the bandwidth-delay product.
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    /// Supply an externally measured RTT.
    pub fn set_rtt(&mut self, rtt: Duration) {
        self.rtt = rtt;
    }

    /// Number of completed adjustment passes, no-ops included.
    pub fn adjustment_count(&self) -> u64 {
        self.adjustments
    }

    /// Number of retained samples.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Seed the chunk size from a measured RTT and the chosen strategy.
    pub fn seed_from_rtt(&mut self, rtt: Duration, strategy: AdaptationStrategy) {
        self.rtt = rtt;
        self.current = Self::suggest_initial(rtt, strategy).clamp(self.min, self.max);
        debug!(
            rtt_ms = rtt.as_millis() as u64,
            ?strategy,
            size = self.current,
            "buffer seeded from RTT"
        );
    }

    /// Append a throughput sample, evicting the oldest beyond capacity.
    ///
    /// Zero-duration samples carry no rate information and are dropped.
    pub fn record(&mut self, bytes: u64, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let rate = bytes as f64 / duration.as_secs_f64();
        let at = Instant::now();
        debug_assert!(self.history.back().is_none_or(|prev| prev.at <= at));
        self.history.push_back(Sample {
            at,
            bytes,
            duration,
            rate,
        });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// Record a sample and, when the gates allow, move the chunk size toward
    /// the bandwidth-delay product target. Returns the (possibly unchanged)
    /// current size.
    pub fn adaptive_adjust(&mut self, bytes: u64, duration: Duration) -> usize {
        self.record(bytes, duration);

        let now = Instant::now();
        if now.duration_since(self.last_adjust) < self.cooldown {
            return self.current;
        }
        if self.history.len() < MIN_SAMPLES_FOR_ADJUST {
            return self.current;
        }

        let trend = self.trend();
        let factor = match trend {
            Trend::Improving => FACTOR_IMPROVING,
            Trend::Degrading => FACTOR_DEGRADING,
            Trend::Stable => FACTOR_STABLE,
        };

        let latest_rate = self.history.back().map(|s| s.rate).unwrap_or(0.0);
        let rtt = self.rtt.max(BDP_RTT_FLOOR);
        let bdp = latest_rate * rtt.as_secs_f64();
        let target = (bdp * factor).clamp(self.min as f64, self.max as f64);

        // The blend runs on the size exponent, where power-of-two steps are
        // evenly spaced. Rounding ties break toward the target.
        let current_exp = (self.current as f64).log2();
        let target_exp = target.log2();
        let next_exp = current_exp + (target_exp - current_exp) * DAMPING_ALPHA;
        let rounded_exp = if target_exp >= current_exp {
            (next_exp + 0.5).floor()
        } else {
            (next_exp - 0.5).ceil()
        };
        let next = size_from_exponent(rounded_exp, self.min, self.max);

        if next != self.current {
            debug!(
                from = self.current,
                to = next,
                ?trend,
                rate = latest_rate as u64,
                "chunk size adjusted"
            );
            self.current = next;
        }
        self.last_adjust = now;
        self.adjustments += 1;
        self.current
    }

    /// Round a size to the nearest power of two within the clamps.
    pub fn validate(&self, size: usize) -> usize {
        nearest_power_of_two(size).clamp(self.min, self.max)
    }

    /// Derived statistics over the sample history.
    pub fn metrics(&self) -> BufferMetrics {
        let rates: Vec<f64> = self.history.iter().map(|s| s.rate).collect();
        let (mean_rate, peak_rate, stability) = if rates.is_empty() {
            (0.0, 0.0, 1.0)
        } else {
            let total_bytes: u64 = self.history.iter().map(|s| s.bytes).sum();
            let total_time: f64 = self.history.iter().map(|s| s.duration.as_secs_f64()).sum();
            let mean = total_bytes as f64 / total_time;
            let peak = rates.iter().cloned().fold(0.0, f64::max);
            let sample_mean = rates.iter().sum::<f64>() / rates.len() as f64;
            let variance = rates.iter().map(|r| (r - sample_mean).powi(2)).sum::<f64>()
                / rates.len() as f64;
            let cv = if sample_mean > 0.0 {
                variance.sqrt() / sample_mean
            } else {
                0.0
            };
            (mean, peak, (1.0 - cv).clamp(0.0, 1.0))
        };

        let minutes = self.created_at.elapsed().as_secs_f64() / 60.0;
        let adjustments_per_minute = if minutes > 0.0 {
            self.adjustments as f64 / minutes
        } else {
            0.0
        };

        BufferMetrics {
            current_size: self.current,
            mean_rate,
            peak_rate,
            stability,
            adjustments_per_minute,
        }
    }

    /// Initial chunk size for a measured RTT and strategy.
    ///
    /// Buckets: excellent < 20 ms, good < 50 ms, fair < 150 ms, poor
    /// otherwise. Every entry is a power of two.
    pub fn suggest_initial(rtt: Duration, strategy: AdaptationStrategy) -> usize {
        const KIB: usize = 1024;
        let ms = rtt.as_secs_f64() * 1000.0;
        let ladder = if ms < 20.0 {
            [128 * KIB, 256 * KIB, 512 * KIB]
        } else if ms < 50.0 {
            [64 * KIB, 128 * KIB, 256 * KIB]
        } else if ms < 150.0 {
            [32 * KIB, 64 * KIB, 128 * KIB]
        } else {
            [16 * KIB, 32 * KIB, 64 * KIB]
        };
        match strategy {
            AdaptationStrategy::Conservative => ladder[0],
            AdaptationStrategy::Balanced => ladder[1],
            AdaptationStrategy::Aggressive => ladder[2],
        }
    }

    /// Compare the mean rate of the most recent third of the history with
    /// the earliest third.
    fn trend(&self) -> Trend {
        let n = self.history.len();
        let third = (n / 3).max(1);

        let older: f64 =
            self.history.iter().take(third).map(|s| s.rate).sum::<f64>() / third as f64;
        let recent: f64 = self
            .history
            .iter()
            .skip(n - third)
            .map(|s| s.rate)
            .sum::<f64>()
            / third as f64;

        if older <= 0.0 {
            return Trend::Stable;
        }
        if recent > older * IMPROVING_RATIO {
            Trend::Improving
        } else if recent < older * DEGRADING_RATIO {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }
}

/// Nearest power of two, measured on the exponent.
fn nearest_power_of_two(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let exp = (n as f64).log2().round().clamp(0.0, 62.0) as u32;
    1usize << exp
}

/// Clamp a whole exponent into the bounds and materialize the size.
fn size_from_exponent(exp: f64, min: usize, max: usize) -> usize {
    let min_exp = min.trailing_zeros() as f64;
    let max_exp = max.trailing_zeros() as f64;
    let exp = exp.clamp(min_exp, max_exp) as u32;
    1usize << exp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;

    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;

    fn fast_config() -> TransferConfig {
        TransferConfig::default().with_adjust_cooldown(Duration::ZERO)
    }

    #[test]
    fn construction_rejects_bad_bounds() {
        let config = TransferConfig::default().with_buffer_bounds(MIB, 4 * KIB);
        assert!(matches!(
            BufferManager::new(&config),
            Err(Error::Config { .. })
        ));

        let config = TransferConfig::default().with_buffer_bounds(0, MIB);
        assert!(BufferManager::new(&config).is_err());

        let config = TransferConfig::default().with_history_size(3);
        assert!(BufferManager::new(&config).is_ok());
    }

    #[test]
    fn default_initial_size_is_64k() {
        let manager = BufferManager::new(&TransferConfig::default()).unwrap();
        assert_eq!(manager.current_size(), 64 * KIB);
    }

    #[test]
    fn initial_override_is_snapped_and_clamped() {
        let config = TransferConfig::default().with_initial_buffer_size(48_000);
        let manager = BufferManager::new(&config).unwrap();
        assert_eq!(manager.current_size(), 64 * KIB);

        let config = TransferConfig::default()
            .with_buffer_bounds(4 * KIB, 32 * KIB)
            .with_initial_buffer_size(MIB);
        let manager = BufferManager::new(&config).unwrap();
        assert_eq!(manager.current_size(), 32 * KIB);
    }

    #[test]
    fn validate_rounds_and_clamps() {
        let manager = BufferManager::new(&TransferConfig::default()).unwrap();
        assert_eq!(manager.validate(48_000), 64 * KIB);
        assert_eq!(manager.validate(1), 4 * KIB);
        assert_eq!(manager.validate(usize::MAX / 2), 16 * MIB);
        assert_eq!(manager.validate(8 * KIB), 8 * KIB);
    }

    #[test]
    fn record_is_bounded_and_skips_zero_durations() {
        let config = fast_config().with_history_size(4);
        let mut manager = BufferManager::new(&config).unwrap();

        manager.record(100, Duration::ZERO);
        assert_eq!(manager.history_len(), 0);

        for _ in 0..10 {
            manager.record(1000, Duration::from_millis(10));
        }
        assert_eq!(manager.history_len(), 4);
    }

    #[test]
    fn no_adjust_before_cooldown() {
        // Default 1 s cooldown; samples arrive immediately after creation.
        let mut manager = BufferManager::new(&TransferConfig::default()).unwrap();
        let before = manager.current_size();

        for _ in 0..5 {
            manager.adaptive_adjust(64 * KIB as u64, Duration::from_millis(10));
        }
        assert_eq!(manager.current_size(), before);
        assert_eq!(manager.adjustment_count(), 0);
    }

    #[test]
    fn no_adjust_below_three_samples() {
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        manager.adaptive_adjust(1000, Duration::from_millis(10));
        manager.adaptive_adjust(1000, Duration::from_millis(10));
        assert_eq!(manager.adjustment_count(), 0);

        manager.adaptive_adjust(1000, Duration::from_millis(10));
        assert_eq!(manager.adjustment_count(), 1);
    }

    #[test]
    fn adjustments_respect_the_cooldown_interval() {
        let config = TransferConfig::default().with_adjust_cooldown(Duration::from_millis(50));
        let mut manager = BufferManager::new(&config).unwrap();

        for _ in 0..3 {
            manager.adaptive_adjust(64 * KIB as u64, Duration::from_millis(10));
        }
        assert_eq!(manager.adjustment_count(), 0);

        std::thread::sleep(Duration::from_millis(60));
        manager.adaptive_adjust(64 * KIB as u64, Duration::from_millis(10));
        assert_eq!(manager.adjustment_count(), 1);

        // Immediately after an adjustment the gate closes again.
        manager.adaptive_adjust(64 * KIB as u64, Duration::from_millis(10));
        assert_eq!(manager.adjustment_count(), 1);
    }

    #[test]
    fn stable_throughput_keeps_size_near_start() {
        // 50 ms RTT, ~1.2 MB/s: the BDP target sits at the starting size.
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        manager.set_rtt(Duration::from_millis(50));

        for _ in 0..6 {
            // 12 KiB per 10 ms ≈ 1.2 MB/s.
            manager.adaptive_adjust(12 * KIB as u64, Duration::from_millis(10));
        }
        assert!(manager.adjustment_count() >= 1);
        let size = manager.current_size();
        assert!(
            [32 * KIB, 64 * KIB, 128 * KIB].contains(&size),
            "unexpected size {size}"
        );
    }

    #[test]
    fn degrading_rates_shrink_within_five_adjustments() {
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        manager.set_rtt(Duration::from_millis(50));
        let start = manager.current_size();

        // Rates fall 20% per sample starting from 1 MB/s.
        let mut rate = 1_000_000.0_f64;
        let mut adjustments = 0;
        while adjustments < 5 {
            let before = manager.adjustment_count();
            let bytes = (rate * 0.01) as u64; // 10 ms worth of data
            manager.adaptive_adjust(bytes, Duration::from_millis(10));
            if manager.adjustment_count() > before {
                adjustments += 1;
            }
            rate *= 0.8;
        }

        assert!(
            manager.current_size() < start,
            "size did not shrink: {} vs {}",
            manager.current_size(),
            start
        );
    }

    #[test]
    fn degrading_rates_stay_bounded_below_by_min() {
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        manager.set_rtt(Duration::from_millis(50));

        let mut rate = 1_000_000.0_f64;
        for _ in 0..60 {
            let bytes = (rate * 0.01).max(1.0) as u64;
            manager.adaptive_adjust(bytes, Duration::from_millis(10));
            rate *= 0.8;
        }
        // Damping converges to within one step of the floor, never below it.
        assert!(manager.current_size() >= 4 * KIB);
        assert!(manager.current_size() <= 8 * KIB);
        assert!(manager.current_size().is_power_of_two());
    }

    #[test]
    fn improving_rates_grow_the_size() {
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        manager.set_rtt(Duration::from_millis(50));
        let start = manager.current_size();

        let mut rate = 2_000_000.0_f64;
        for _ in 0..20 {
            let bytes = (rate * 0.01) as u64;
            manager.adaptive_adjust(bytes, Duration::from_millis(10));
            rate *= 1.5;
        }
        assert!(manager.current_size() > start);
        assert!(manager.current_size() <= 16 * MIB);
    }

    #[test]
    fn size_is_always_a_power_of_two_in_range() {
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        manager.set_rtt(Duration::from_millis(30));

        let rates: [f64; 10] = [
            1e3, 5e8, 2e4, 1e9, 7.0, 3e6, 1e2, 8e7, 4e5, 6e6,
        ];
        for (i, rate) in rates.iter().cycle().take(50).enumerate() {
            let bytes = (rate * 0.01).max(1.0) as u64;
            manager.adaptive_adjust(bytes, Duration::from_millis(10 + (i % 7) as u64));

            let size = manager.current_size();
            assert!(size.is_power_of_two(), "not a power of two: {size}");
            assert!((4 * KIB..=16 * MIB).contains(&size));
        }
    }

    #[test]
    fn suggest_initial_buckets() {
        use AdaptationStrategy::*;
        let cases = [
            (10, Balanced, 256 * KIB),
            (10, Aggressive, 512 * KIB),
            (30, Conservative, 64 * KIB),
            (30, Balanced, 128 * KIB),
            (50, Balanced, 64 * KIB), // 50 ms is already the fair bucket
            (100, Aggressive, 128 * KIB),
            (300, Conservative, 16 * KIB),
            (300, Balanced, 32 * KIB),
        ];
        for (ms, strategy, expected) in cases {
            let got = BufferManager::suggest_initial(Duration::from_millis(ms), strategy);
            assert_eq!(got, expected, "rtt={ms}ms strategy={strategy:?}");
            assert!(got.is_power_of_two());
        }
    }

    #[test]
    fn seed_from_rtt_respects_clamps() {
        let config = fast_config().with_buffer_bounds(4 * KIB, 64 * KIB);
        let mut manager = BufferManager::new(&config).unwrap();
        manager.seed_from_rtt(Duration::from_millis(10), AdaptationStrategy::Aggressive);
        assert_eq!(manager.current_size(), 64 * KIB);
        assert_eq!(manager.rtt(), Duration::from_millis(10));
    }

    #[test]
    fn metrics_on_empty_history() {
        let manager = BufferManager::new(&TransferConfig::default()).unwrap();
        let metrics = manager.metrics();
        assert_eq!(metrics.current_size, 64 * KIB);
        assert_eq!(metrics.mean_rate, 0.0);
        assert_eq!(metrics.peak_rate, 0.0);
        assert_eq!(metrics.stability, 1.0);
    }

    #[test]
    fn metrics_reflect_history() {
        let mut manager = BufferManager::new(&fast_config()).unwrap();
        for _ in 0..5 {
            manager.record(10_000, Duration::from_millis(100)); // 100 kB/s each
        }
        let metrics = manager.metrics();
        assert!((metrics.mean_rate - 100_000.0).abs() < 1.0);
        assert!((metrics.peak_rate - 100_000.0).abs() < 1.0);
        assert!((metrics.stability - 1.0).abs() < 1e-9);

        manager.record(10_000, Duration::from_millis(10)); // 1 MB/s outlier
        let metrics = manager.metrics();
        assert!(metrics.stability < 1.0);
        assert!(metrics.stability >= 0.0);
        assert!(metrics.peak_rate > metrics.mean_rate);
    }

    #[test]
    fn nearest_power_of_two_rounds_on_the_exponent() {
        assert_eq!(nearest_power_of_two(1), 1);
        assert_eq!(nearest_power_of_two(3), 4); // log2(3) ≈ 1.58
        assert_eq!(nearest_power_of_two(4), 4);
        assert_eq!(nearest_power_of_two(5), 4); // log2(5) ≈ 2.32
        assert_eq!(nearest_power_of_two(6), 8); // log2(6) ≈ 2.58
        assert_eq!(nearest_power_of_two(48_000), 64 * KIB);
    }
}
