//! Bounded latency window and percentile math.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Value at `floor(pct / 100 * len)` of the sorted input.
///
/// This is not nearest-rank: for ten samples the 25th percentile is the third
/// smallest. The index is clamped to the last element and an empty input
/// yields zero. The caller's slice is never reordered.
pub fn percentile(values: &[Duration], pct: f64) -> Duration {
    if values.is_empty() {
        return Duration::ZERO;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let index = ((pct / 100.0) * sorted.len() as f64).floor();
    let index = if index.is_nan() || index < 0.0 {
        0
    } else {
        (index as usize).min(sorted.len() - 1)
    };
    sorted[index]
}

/// Recent response latencies of one route, oldest first.
///
/// The window is not timestamped. Recency is approximated by halving it
/// (keeping the newest half) whenever it grows past `max_items`.
#[derive(Debug)]
pub struct LatencyQueue {
    samples: Mutex<Vec<Duration>>,
    max_items: usize,
}

impl LatencyQueue {
    pub fn new(max_items: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::with_capacity(max_items)),
            max_items,
        }
    }

    pub fn add(&self, latency: Duration) {
        self.lock().push(latency);
    }

    /// Drop the oldest half if over capacity. Returns how many were dropped.
    pub fn resize(&self) -> usize {
        let mut samples = self.lock();
        if samples.len() <= self.max_items {
            return 0;
        }
        let dropped = samples.len() / 2;
        samples.drain(..dropped);
        dropped
    }

    /// p99 of the window, or zero when fewer than `min_sample_size` samples exist.
    pub fn p99(&self, min_sample_size: usize) -> Duration {
        let samples = self.lock();
        if samples.len() < min_sample_size {
            return Duration::ZERO;
        }
        percentile(&samples, 99.0)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the window, oldest first.
    pub fn samples(&self) -> Vec<Duration> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Duration>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_percentile_index_law() {
        let values: Vec<_> = [7, 3, 9, 0, 5, 1, 8, 2, 6, 4].into_iter().map(ms).collect();

        assert_eq!(percentile(&values, 25.0), ms(2));
        assert_eq!(percentile(&values, 50.0), ms(5));
        assert_eq!(percentile(&values, 99.0), ms(9));
        assert_eq!(percentile(&values, 0.0), ms(0));
        // Input order is untouched.
        assert_eq!(values[0], ms(7));
    }

    #[test]
    fn test_percentile_scaled_values() {
        let values: Vec<_> = (1..=10).map(|n| Duration::from_micros(n * 750)).collect();
        assert_eq!(percentile(&values, 25.0), Duration::from_micros(2250));
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[], 99.0), Duration::ZERO);
        assert_eq!(percentile(&[ms(4)], 99.0), ms(4));
        assert_eq!(percentile(&[ms(1), ms(2)], 100.0), ms(2));
        assert_eq!(percentile(&[ms(1), ms(2)], -5.0), ms(1));
    }

    #[test]
    fn test_p99_of_hundred_samples() {
        let queue = LatencyQueue::new(1000);
        for n in (1..=100).rev() {
            queue.add(ms(n));
        }
        // floor(0.99 * 100) = 99 → the largest sample.
        assert_eq!(queue.p99(50), ms(100));
    }

    #[test]
    fn test_insufficient_samples_reads_zero() {
        let queue = LatencyQueue::new(1000);
        for _ in 0..49 {
            queue.add(Duration::from_secs(5));
        }
        assert_eq!(queue.p99(50), Duration::ZERO);

        queue.add(Duration::from_secs(5));
        assert_eq!(queue.p99(50), Duration::from_secs(5));
    }

    #[test]
    fn test_resize_keeps_newest_half_in_order() {
        let max = 1000;
        let queue = LatencyQueue::new(max);
        for n in 0..(2 * max as u64) {
            queue.add(ms(n));
        }

        assert_eq!(queue.resize(), max);

        let samples = queue.samples();
        assert_eq!(samples.len(), max);
        assert_eq!(samples[0], ms(max as u64));
        assert!(samples.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_resize_within_bound_is_noop() {
        let queue = LatencyQueue::new(4);
        for n in 0..4 {
            queue.add(ms(n));
        }
        assert_eq!(queue.resize(), 0);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_resize_odd_length() {
        let queue = LatencyQueue::new(4);
        for n in 0..5 {
            queue.add(ms(n));
        }
        assert_eq!(queue.resize(), 2);
        assert_eq!(queue.samples(), vec![ms(2), ms(3), ms(4)]);
    }
}
