use std::time::Duration;

use modkit_primitives::OperationKind;
use serde::Serialize;

/// Aggregates for one operation kind over the retained samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
	pub kind: OperationKind,
	pub count: usize,
	pub success_rate: f64,
	pub mean_ms: f64,
	pub min_ms: f64,
	pub max_ms: f64,
	pub p95_ms: f64,
	pub p99_ms: f64,
	/// Operations per second over the rolling window.
	pub throughput_per_sec: f64,
}

impl OperationStats {
	pub(crate) fn empty(kind: OperationKind) -> Self {
		Self {
			kind,
			count: 0,
			success_rate: 0.0,
			mean_ms: 0.0,
			min_ms: 0.0,
			max_ms: 0.0,
			p95_ms: 0.0,
			p99_ms: 0.0,
			throughput_per_sec: 0.0,
		}
	}

	/// `durations` is sorted in place.
	pub(crate) fn compute(kind: OperationKind, durations: &mut [Duration], successes: usize, in_window: usize, window: Duration) -> Self {
		if durations.is_empty() {
			return Self::empty(kind);
		}
		durations.sort_unstable();
		let count = durations.len();
		let total: Duration = durations.iter().sum();
		let window_secs = window.as_secs_f64();
		Self {
			kind,
			count,
			success_rate: successes as f64 / count as f64,
			mean_ms: ms(total) / count as f64,
			min_ms: ms(durations[0]),
			max_ms: ms(durations[count - 1]),
			p95_ms: ms(percentile(durations, 95.0)),
			p99_ms: ms(percentile(durations, 99.0)),
			throughput_per_sec: if window_secs > 0.0 { in_window as f64 / window_secs } else { 0.0 },
		}
	}
}

/// Nearest-rank percentile of an ascending slice. Empty input yields zero.
pub fn percentile(sorted: &[Duration], pct: f64) -> Duration {
	if sorted.is_empty() {
		return Duration::ZERO;
	}
	let rank = ((pct.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
	sorted[rank.clamp(1, sorted.len()) - 1]
}

pub(crate) fn ms(duration: Duration) -> f64 {
	duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
	use super::*;

	fn millis(values: &[u64]) -> Vec<Duration> {
		values.iter().map(|v| Duration::from_millis(*v)).collect()
	}

	#[test]
	fn nearest_rank_percentiles() {
		let sorted = millis(&(1..=100).collect::<Vec<_>>());
		assert_eq!(percentile(&sorted, 95.0), Duration::from_millis(95));
		assert_eq!(percentile(&sorted, 99.0), Duration::from_millis(99));
		assert_eq!(percentile(&sorted, 100.0), Duration::from_millis(100));
		assert_eq!(percentile(&sorted, 0.0), Duration::from_millis(1));
		assert_eq!(percentile(&[], 50.0), Duration::ZERO);
	}

	#[test]
	fn small_sets_use_the_top_sample() {
		let sorted = millis(&[3, 7]);
		assert_eq!(percentile(&sorted, 95.0), Duration::from_millis(7));
	}

	#[test]
	fn compute_aggregates() {
		let mut durations = millis(&[30, 10, 20, 40]);
		let stats = OperationStats::compute(OperationKind::Resolve, &mut durations, 3, 4, Duration::from_secs(2));
		assert_eq!(stats.count, 4);
		assert_eq!(stats.success_rate, 0.75);
		assert_eq!(stats.min_ms, 10.0);
		assert_eq!(stats.max_ms, 40.0);
		assert!((stats.mean_ms - 25.0).abs() < 1e-9);
		assert_eq!(stats.p95_ms, 40.0);
		assert_eq!(stats.throughput_per_sec, 2.0);
	}
}
