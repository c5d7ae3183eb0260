//! Container boundary: where record bytes come from.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use modkit_primitives::ResourceKey;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::SourceError;

/// Supplies raw record bytes. The dispatcher never parses container framing itself.
#[async_trait]
pub trait ResourceSource: Send + Sync {
	/// Bytes of the record for `key`, or `None` if the container has no such record.
	async fn raw_bytes(&self, key: &ResourceKey) -> Result<Option<Bytes>, SourceError>;

	/// Every key the container holds, sorted.
	async fn keys(&self) -> Result<Vec<ResourceKey>, SourceError>;
}

/// In-memory container.
#[derive(Debug, Default)]
pub struct MemorySource {
	records: RwLock<FxHashMap<ResourceKey, Bytes>>,
	fetches: AtomicUsize,
}

impl MemorySource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_record(self, key: ResourceKey, data: impl Into<Bytes>) -> Self {
		self.insert(key, data);
		self
	}

	pub fn insert(&self, key: ResourceKey, data: impl Into<Bytes>) -> Option<Bytes> {
		self.records.write().insert(key, data.into())
	}

	pub fn remove(&self, key: &ResourceKey) -> Option<Bytes> {
		self.records.write().remove(key)
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}

	/// Number of `raw_bytes` calls served so far.
	pub fn fetch_count(&self) -> usize {
		self.fetches.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl ResourceSource for MemorySource {
	async fn raw_bytes(&self, key: &ResourceKey) -> Result<Option<Bytes>, SourceError> {
		self.fetches.fetch_add(1, Ordering::Relaxed);
		Ok(self.records.read().get(key).cloned())
	}

	async fn keys(&self) -> Result<Vec<ResourceKey>, SourceError> {
		let mut keys: Vec<ResourceKey> = self.records.read().keys().copied().collect();
		keys.sort_unstable();
		Ok(keys)
	}
}

/// Loose-file container: one `<canonical key>.bin` file per record.
#[derive(Debug, Clone)]
pub struct DirectorySource {
	root: PathBuf,
}

impl DirectorySource {
	pub const EXTENSION: &'static str = "bin";

	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// File that holds the record for `key`.
	pub fn path_for(&self, key: &ResourceKey) -> PathBuf {
		self.root.join(format!("{key}.{}", Self::EXTENSION))
	}
}

#[async_trait]
impl ResourceSource for DirectorySource {
	async fn raw_bytes(&self, key: &ResourceKey) -> Result<Option<Bytes>, SourceError> {
		let path = self.path_for(key);
		match tokio::fs::read(&path).await {
			Ok(data) => Ok(Some(Bytes::from(data))),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(source) => Err(SourceError::Io { path, source }),
		}
	}

	async fn keys(&self) -> Result<Vec<ResourceKey>, SourceError> {
		let io_err = |source| SourceError::Io {
			path: self.root.clone(),
			source,
		};
		let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_err)?;
		let mut keys = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
			let path = entry.path();
			if path.extension().is_none_or(|ext| ext != Self::EXTENSION) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
				continue;
			};
			match stem.parse::<ResourceKey>() {
				Ok(key) => keys.push(key),
				Err(err) => tracing::debug!(path = %path.display(), error = %err, "source.skip_file"),
			}
		}
		keys.sort_unstable();
		Ok(keys)
	}
}
