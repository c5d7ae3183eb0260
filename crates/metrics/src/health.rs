use std::time::Duration;

use serde::Serialize;

/// Deduction at a 100% failure rate.
const FAILURE_PENALTY: f64 = 60.0;
/// Largest deduction for slow modules.
const LATENCY_PENALTY_MAX: f64 = 40.0;

/// Health summary for one module, derived from its retained samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleHealth {
	pub module: String,
	/// 0 (unusable) to 100 (healthy).
	pub score: u8,
	pub samples: usize,
	pub failure_rate: f64,
	pub mean_latency_ms: f64,
}

/// Scores a module from its mean latency against `threshold` and its failure rate.
///
/// Latency at or under the threshold costs nothing; each further multiple of the threshold
/// costs 10 points up to [`LATENCY_PENALTY_MAX`]. Failures cost up to 60 points linearly.
pub fn health_score(mean_latency: Duration, threshold: Duration, failure_rate: f64) -> u8 {
	let latency_penalty = if threshold.is_zero() || mean_latency <= threshold {
		0.0
	} else {
		let ratio = mean_latency.as_secs_f64() / threshold.as_secs_f64();
		((ratio - 1.0) * 10.0).min(LATENCY_PENALTY_MAX)
	};
	let failure_penalty = failure_rate.clamp(0.0, 1.0) * FAILURE_PENALTY;
	(100.0 - latency_penalty - failure_penalty).clamp(0.0, 100.0).round() as u8
}

/// Mean in seconds, computed in floating point so any sample count is valid.
fn mean_secs(total: Duration, samples: usize) -> f64 {
	if samples == 0 {
		return 0.0;
	}
	total.as_secs_f64() / samples as f64
}

impl ModuleHealth {
	pub(crate) fn compute(module: String, durations: &[Duration], failures: usize, threshold: Duration) -> Self {
		let samples = durations.len();
		if samples == 0 {
			return Self {
				module,
				score: 100,
				samples: 0,
				failure_rate: 0.0,
				mean_latency_ms: 0.0,
			};
		}
		let mean = mean_secs(durations.iter().sum(), samples);
		let failure_rate = failures as f64 / samples as f64;
		Self {
			score: health_score(Duration::from_secs_f64(mean), threshold, failure_rate),
			module,
			samples,
			failure_rate,
			mean_latency_ms: mean * 1000.0,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const THRESHOLD: Duration = Duration::from_millis(10);

	#[test]
	fn fast_and_reliable_is_perfect() {
		assert_eq!(health_score(Duration::from_millis(2), THRESHOLD, 0.0), 100);
		assert_eq!(health_score(THRESHOLD, THRESHOLD, 0.0), 100);
	}

	#[test]
	fn slow_modules_lose_points_up_to_the_cap() {
		assert_eq!(health_score(Duration::from_millis(30), THRESHOLD, 0.0), 80);
		assert_eq!(health_score(Duration::from_secs(10), THRESHOLD, 0.0), 60);
	}

	#[test]
	fn failures_dominate() {
		assert_eq!(health_score(Duration::from_millis(1), THRESHOLD, 0.5), 70);
		assert_eq!(health_score(Duration::from_secs(10), THRESHOLD, 1.0), 0);
	}

	#[test]
	fn zero_threshold_ignores_latency() {
		assert_eq!(health_score(Duration::from_secs(1), Duration::ZERO, 0.0), 100);
	}

	#[test]
	fn compute_from_samples() {
		let durations = [Duration::from_millis(10), Duration::from_millis(50)];
		let health = ModuleHealth::compute("m".into(), &durations, 1, THRESHOLD);
		assert_eq!(health.samples, 2);
		assert_eq!(health.failure_rate, 0.5);
		assert!((health.mean_latency_ms - 30.0).abs() < 1e-9);
		assert_eq!(health.score, 50);
	}

	#[test]
	fn mean_survives_counts_past_u32() {
		let samples = (u32::MAX as usize) + 1;
		assert_eq!(mean_secs(Duration::from_secs(samples as u64), samples), 1.0);
		assert_eq!(mean_secs(Duration::from_secs(5), 0), 0.0);
	}
}
