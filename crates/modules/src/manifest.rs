//! `module.toml` parsing.
//!
//! ```toml
//! id = "textures"
//! name = "Texture handlers"
//! version = "1.2.0"
//! priority = 10
//!
//! [loader]
//! kind = "catalog"        # or "dylib"
//! entry = "textures"      # catalog name, or library path relative to the manifest
//!
//! [[handlers]]
//! types = ["0x00B2D882", "0x2F7D0004"]
//!
//! [[handlers]]
//! types = ["*"]
//! priority = -10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ManifestError;

/// Declarative description of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
	pub id: String,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub version: Option<String>,
	/// Priority applied to handler groups that do not set their own.
	#[serde(default)]
	pub priority: Option<i32>,
	pub loader: LoaderSpec,
	#[serde(default)]
	pub handlers: Vec<HandlerDecl>,
}

/// Which loader materializes the module's handler code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderSpec {
	pub kind: String,
	pub entry: String,
}

/// A group of resource types served at one priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerDecl {
	/// Hex type ids, or `*` for the default handler.
	pub types: Vec<String>,
	#[serde(default)]
	pub priority: Option<i32>,
}

impl ModuleManifest {
	pub const FILE_NAME: &'static str = "module.toml";

	/// Parses and validates manifest text.
	pub fn parse(text: &str) -> Result<Self, ManifestError> {
		let manifest: Self = toml::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;
		manifest.validate()?;
		Ok(manifest)
	}

	/// Reads and parses the manifest at `path`.
	pub fn read(path: &Path) -> Result<Self, ManifestError> {
		let text = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;
		Self::parse(&text)
	}

	fn validate(&self) -> Result<(), ManifestError> {
		if self.id.trim().is_empty() {
			return Err(ManifestError::Invalid("module id must not be empty".into()));
		}
		if self.id.chars().any(char::is_whitespace) {
			return Err(ManifestError::Invalid(format!("module id '{}' contains whitespace", self.id)));
		}
		if self.loader.entry.trim().is_empty() {
			return Err(ManifestError::Invalid("loader entry must not be empty".into()));
		}
		Ok(())
	}

	/// Effective priority for a handler group.
	pub fn priority_for(&self, decl: &HandlerDecl, baseline: i32) -> i32 {
		decl.priority.or(self.priority).unwrap_or(baseline)
	}

	/// Number of type strings declared across all handler groups.
	pub fn declared_count(&self) -> usize {
		self.handlers.iter().map(|h| h.types.len()).sum()
	}
}
