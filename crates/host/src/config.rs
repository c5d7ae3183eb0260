//! `modkit.toml` host configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use modkit_metrics::RecorderConfig;
use modkit_modules::DiscoveryOptions;
use modkit_primitives::ApiVersion;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "modkit.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

/// Host settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
	/// Module directories or manifests to discover, relative to the config file.
	pub module_paths: Vec<PathBuf>,
	/// Directory of `<key>.bin` resource records.
	pub data_dir: Option<PathBuf>,
	pub api_version: ApiVersion,
	/// Tracing filter used when `MODKIT_LOG` is unset.
	pub log_filter: Option<String>,
	/// Modules skipped by dispatch from startup on.
	pub disabled_modules: Vec<String>,
	pub discovery: DiscoverySection,
	pub metrics: RecorderConfig,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			module_paths: vec![PathBuf::from("modules")],
			data_dir: None,
			api_version: ApiVersion::V1,
			log_filter: None,
			disabled_modules: Vec::new(),
			discovery: DiscoverySection::default(),
			metrics: RecorderConfig::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySection {
	pub load_timeout_ms: u64,
	pub baseline_priority: i32,
}

impl Default for DiscoverySection {
	fn default() -> Self {
		let options = DiscoveryOptions::default();
		Self {
			load_timeout_ms: options.load_timeout.as_millis().try_into().unwrap_or(u64::MAX),
			baseline_priority: options.baseline_priority,
		}
	}
}

impl DiscoverySection {
	pub fn options(&self) -> DiscoveryOptions {
		DiscoveryOptions {
			load_timeout: Duration::from_millis(self.load_timeout_ms),
			baseline_priority: self.baseline_priority,
		}
	}
}

impl HostConfig {
	pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
		toml::from_str(content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Reads `path`. A missing file yields the defaults; relative paths inside the file are
	/// resolved against its directory.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "no config file, using defaults");
				return Ok(Self::default());
			}
			Err(source) => {
				return Err(ConfigError::Io {
					path: path.to_path_buf(),
					source,
				});
			}
		};
		let mut config = Self::parse(&content, path)?;
		if let Some(base) = path.parent() {
			config.rebase(base);
		}
		Ok(config)
	}

	fn rebase(&mut self, base: &Path) {
		for module_path in &mut self.module_paths {
			if module_path.is_relative() {
				*module_path = base.join(&*module_path);
			}
		}
		if let Some(data_dir) = &mut self.data_dir
			&& data_dir.is_relative()
		{
			*data_dir = base.join(&*data_dir);
		}
	}
}
