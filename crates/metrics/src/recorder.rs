use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use modkit_primitives::{OperationEvent, OperationKind, OperationObserver};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::health::ModuleHealth;
use crate::stats::OperationStats;

/// Retention and scoring knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
	/// Samples kept before the oldest are evicted.
	pub retention: usize,
	/// Rolling window for throughput.
	#[serde(with = "millis")]
	pub window: Duration,
	/// Mean latency a module may reach before its health score drops.
	#[serde(with = "millis")]
	pub latency_threshold: Duration,
}

impl Default for RecorderConfig {
	fn default() -> Self {
		Self {
			retention: 10_000,
			window: Duration::from_secs(60),
			latency_threshold: Duration::from_millis(50),
		}
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis().try_into().unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
	pub kind: OperationKind,
	/// Resource type or module id the operation was about.
	pub identifier: String,
	pub module: Option<String>,
	pub duration: Duration,
	pub success: bool,
	pub at: Instant,
}

/// Serializable snapshot of everything the recorder knows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
	pub operations: Vec<OperationStats>,
	pub modules: Vec<ModuleHealth>,
	pub retained: usize,
	pub evicted: u64,
}

/// Bounded in-memory recorder of operation timings.
///
/// Samples live in a ring buffer capped at [`RecorderConfig::retention`]; statistics are computed
/// on demand from whatever is retained.
#[derive(Debug)]
pub struct PerformanceRecorder {
	config: RecorderConfig,
	samples: Mutex<VecDeque<Sample>>,
	evicted: AtomicU64,
}

impl Default for PerformanceRecorder {
	fn default() -> Self {
		Self::new(RecorderConfig::default())
	}
}

impl PerformanceRecorder {
	pub fn new(config: RecorderConfig) -> Self {
		let config = RecorderConfig {
			retention: config.retention.max(1),
			..config
		};
		Self {
			samples: Mutex::new(VecDeque::with_capacity(config.retention.min(1024))),
			config,
			evicted: AtomicU64::new(0),
		}
	}

	pub fn config(&self) -> &RecorderConfig {
		&self.config
	}

	pub fn record(&self, sample: Sample) {
		let mut samples = self.samples.lock();
		if samples.len() >= self.config.retention {
			samples.pop_front();
			self.evicted.fetch_add(1, Ordering::Relaxed);
		}
		samples.push_back(sample);
	}

	pub fn len(&self) -> usize {
		self.samples.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Samples dropped to honor the retention limit.
	pub fn evicted(&self) -> u64 {
		self.evicted.load(Ordering::Relaxed)
	}

	/// Retained samples, oldest first.
	pub fn samples(&self) -> Vec<Sample> {
		self.samples.lock().iter().cloned().collect()
	}

	pub fn clear(&self) {
		self.samples.lock().clear();
	}

	pub fn stats(&self, kind: OperationKind) -> OperationStats {
		self.stats_at(kind, Instant::now())
	}

	fn stats_at(&self, kind: OperationKind, now: Instant) -> OperationStats {
		let samples = self.samples.lock();
		let mut durations = Vec::new();
		let mut successes = 0;
		let mut in_window = 0;
		for sample in samples.iter().filter(|s| s.kind == kind) {
			durations.push(sample.duration);
			successes += usize::from(sample.success);
			if now.saturating_duration_since(sample.at) <= self.config.window {
				in_window += 1;
			}
		}
		drop(samples);
		OperationStats::compute(kind, &mut durations, successes, in_window, self.config.window)
	}

	/// Stats for every operation kind, including ones with no samples.
	pub fn all_stats(&self) -> Vec<OperationStats> {
		let now = Instant::now();
		OperationKind::ALL.iter().map(|kind| self.stats_at(*kind, now)).collect()
	}

	/// Health of one module, or `None` if it has no samples.
	pub fn module_health(&self, module: &str) -> Option<ModuleHealth> {
		let samples = self.samples.lock();
		let mut durations = Vec::new();
		let mut failures = 0;
		for sample in samples.iter().filter(|s| s.module.as_deref() == Some(module)) {
			durations.push(sample.duration);
			failures += usize::from(!sample.success);
		}
		drop(samples);
		(!durations.is_empty()).then(|| ModuleHealth::compute(module.to_string(), &durations, failures, self.config.latency_threshold))
	}

	/// Health of every module with samples, sorted by module id.
	pub fn health(&self) -> Vec<ModuleHealth> {
		let mut per_module: FxHashMap<String, (Vec<Duration>, usize)> = FxHashMap::default();
		for sample in self.samples.lock().iter() {
			let Some(module) = &sample.module else { continue };
			let entry = per_module.entry(module.clone()).or_default();
			entry.0.push(sample.duration);
			entry.1 += usize::from(!sample.success);
		}
		let mut health: Vec<_> = per_module
			.into_iter()
			.map(|(module, (durations, failures))| ModuleHealth::compute(module, &durations, failures, self.config.latency_threshold))
			.collect();
		health.sort_by(|a, b| a.module.cmp(&b.module));
		health
	}

	pub fn report(&self) -> MetricsReport {
		MetricsReport {
			operations: self.all_stats(),
			modules: self.health(),
			retained: self.len(),
			evicted: self.evicted(),
		}
	}
}

impl OperationObserver for PerformanceRecorder {
	fn observe(&self, event: OperationEvent<'_>) {
		self.record(Sample {
			kind: event.kind,
			identifier: event.subject.to_string(),
			module: event.module.map(str::to_string),
			duration: event.duration,
			success: event.success,
			at: Instant::now(),
		});
	}
}

#[cfg(test)]
mod tests {
	use modkit_primitives::{ResourceType, Subject};
	use pretty_assertions::assert_eq;

	use super::*;

	fn event(kind: OperationKind, module: Option<&str>, millis: u64, success: bool) -> OperationEvent<'_> {
		OperationEvent {
			kind,
			subject: Subject::Type(ResourceType(0x0333_406C)),
			module,
			duration: Duration::from_millis(millis),
			success,
		}
	}

	#[test]
	fn observes_into_samples() {
		let recorder = PerformanceRecorder::default();
		recorder.observe(event(OperationKind::Resolve, Some("tex"), 4, true));
		let samples = recorder.samples();
		assert_eq!(samples.len(), 1);
		assert_eq!(samples[0].identifier, "0x0333406C");
		assert_eq!(samples[0].module.as_deref(), Some("tex"));
	}

	#[test]
	fn retention_evicts_oldest() {
		let recorder = PerformanceRecorder::new(RecorderConfig {
			retention: 3,
			..RecorderConfig::default()
		});
		for millis in 1..=5 {
			recorder.observe(event(OperationKind::Lookup, None, millis, true));
		}
		let kept: Vec<_> = recorder.samples().iter().map(|s| s.duration.as_millis()).collect();
		assert_eq!(kept, vec![3, 4, 5]);
		assert_eq!(recorder.evicted(), 2);
	}

	#[test]
	fn zero_retention_keeps_one() {
		let recorder = PerformanceRecorder::new(RecorderConfig {
			retention: 0,
			..RecorderConfig::default()
		});
		recorder.observe(event(OperationKind::Lookup, None, 1, true));
		recorder.observe(event(OperationKind::Lookup, None, 2, true));
		assert_eq!(recorder.len(), 1);
	}

	#[test]
	fn stats_are_per_kind() {
		let recorder = PerformanceRecorder::default();
		for millis in [10, 20, 30] {
			recorder.observe(event(OperationKind::Resolve, Some("a"), millis, true));
		}
		recorder.observe(event(OperationKind::Resolve, Some("a"), 40, false));
		recorder.observe(event(OperationKind::Lookup, None, 1, true));

		let resolve = recorder.stats(OperationKind::Resolve);
		assert_eq!(resolve.count, 4);
		assert_eq!(resolve.success_rate, 0.75);
		assert_eq!(resolve.p99_ms, 40.0);
		assert_eq!(resolve.throughput_per_sec, 4.0 / 60.0);

		let load = recorder.stats(OperationKind::ModuleLoad);
		assert_eq!(load.count, 0);
		assert_eq!(recorder.all_stats().len(), OperationKind::ALL.len());
	}

	#[test]
	fn throughput_ignores_samples_outside_window() {
		let recorder = PerformanceRecorder::new(RecorderConfig {
			window: Duration::from_secs(10),
			..RecorderConfig::default()
		});
		let now = Instant::now();
		let sample = |at| Sample {
			kind: OperationKind::Resolve,
			identifier: "t".into(),
			module: None,
			duration: Duration::from_millis(1),
			success: true,
			at,
		};
		if let Some(old) = now.checked_sub(Duration::from_secs(30)) {
			recorder.record(sample(old));
		}
		recorder.record(sample(now));
		let stats = recorder.stats_at(OperationKind::Resolve, now);
		assert_eq!(stats.throughput_per_sec, 0.1);
	}

	#[test]
	fn health_groups_by_module() {
		let recorder = PerformanceRecorder::new(RecorderConfig {
			latency_threshold: Duration::from_millis(10),
			..RecorderConfig::default()
		});
		recorder.observe(event(OperationKind::Resolve, Some("slow"), 30, true));
		recorder.observe(event(OperationKind::Resolve, Some("fast"), 1, true));
		recorder.observe(event(OperationKind::Resolve, Some("fast"), 1, false));
		recorder.observe(event(OperationKind::Lookup, None, 1, true));

		let health = recorder.health();
		let scores: Vec<_> = health.iter().map(|h| (h.module.as_str(), h.score)).collect();
		assert_eq!(scores, vec![("fast", 70), ("slow", 80)]);
		assert_eq!(recorder.module_health("slow").map(|h| h.samples), Some(1));
		assert!(recorder.module_health("missing").is_none());
	}

	#[test]
	fn report_serializes() {
		let recorder = PerformanceRecorder::default();
		recorder.observe(event(OperationKind::ModuleLoad, Some("tex"), 2, true));
		let json = serde_json::to_value(recorder.report()).unwrap();
		assert_eq!(json["retained"], 1);
		assert_eq!(json["modules"][0]["module"], "tex");
		assert_eq!(json["operations"][2]["kind"], "module_load");
	}

	#[test]
	fn config_reads_millis() {
		let config: RecorderConfig = serde_json::from_str(r#"{"retention": 5, "latency_threshold": 20}"#).unwrap();
		assert_eq!(config.retention, 5);
		assert_eq!(config.latency_threshold, Duration::from_millis(20));
		assert_eq!(config.window, Duration::from_secs(60));
	}
}
