use std::path::{Path, PathBuf};

use modkit_registry::{ModuleId, ModuleLease, TypeBinding};
use serde::Serialize;

use crate::ModuleError;

/// Lifecycle state of a module context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
	Unloaded,
	Loading,
	Loaded,
	Unloading,
}

impl ModuleState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unloaded => "unloaded",
			Self::Loading => "loading",
			Self::Loaded => "loaded",
			Self::Unloading => "unloading",
		}
	}

	fn can_become(self, next: ModuleState) -> bool {
		matches!(
			(self, next),
			(Self::Unloaded, Self::Loading)
				| (Self::Loading, Self::Loaded)
				| (Self::Loading, Self::Unloaded)
				| (Self::Loaded, Self::Unloading)
				| (Self::Unloading, Self::Unloaded)
		)
	}
}

impl std::fmt::Display for ModuleState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Registration state a context gives up when a reload finishes.
#[derive(Debug)]
pub(crate) struct RetiredGeneration {
	pub id: ModuleId,
	pub lease: ModuleLease,
	pub bindings: Vec<TypeBinding>,
}

/// One isolated module: its manifest location, lifecycle state and live lease.
///
/// Handler types are only reported while the context is `Loaded`; a context in transition
/// refuses the query. A reload of a loaded context happens beside the live generation: the
/// context stays `Loaded` and keeps its lease and bindings until the new one is installed.
#[derive(Debug)]
pub struct ModuleContext {
	id: ModuleId,
	path: PathBuf,
	state: ModuleState,
	generation: u64,
	lease: Option<ModuleLease>,
	bindings: Vec<TypeBinding>,
	name: Option<String>,
	version: Option<String>,
	failure: Option<ModuleError>,
	disabled: bool,
	/// Generation being loaded to replace the live one.
	reloading: Option<u64>,
}

impl ModuleContext {
	pub(crate) fn new(path: &Path) -> Self {
		Self {
			id: provisional_id(path),
			path: path.to_path_buf(),
			state: ModuleState::Unloaded,
			generation: 0,
			lease: None,
			bindings: Vec::new(),
			name: None,
			version: None,
			failure: None,
			disabled: false,
			reloading: None,
		}
	}

	pub fn id(&self) -> &ModuleId {
		&self.id
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn state(&self) -> ModuleState {
		self.state
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// The last load failure, cleared on a successful load.
	pub fn failure(&self) -> Option<&ModuleError> {
		self.failure.as_ref()
	}

	/// True when a failed load keeps this module out of discovery until explicitly retried.
	pub fn is_disabled(&self) -> bool {
		self.disabled
	}

	/// True while a reload of this loaded module is in progress.
	pub fn is_reloading(&self) -> bool {
		self.reloading.is_some()
	}

	/// Registered handler bindings of a loaded module.
	pub fn bindings(&self) -> Result<&[TypeBinding], ModuleError> {
		match self.state {
			ModuleState::Loaded | ModuleState::Unloaded => Ok(&self.bindings),
			_ => Err(self.busy()),
		}
	}

	pub(crate) fn lease(&self) -> Option<&ModuleLease> {
		self.lease.as_ref()
	}

	pub(crate) fn transition(&mut self, next: ModuleState) -> Result<(), ModuleError> {
		if !self.state.can_become(next) {
			return Err(ModuleError::InvalidTransition { from: self.state, to: next });
		}
		tracing::trace!(module = %self.id, from = self.state.as_str(), to = next.as_str(), "module.transition");
		self.state = next;
		Ok(())
	}

	pub(crate) fn begin_load(&mut self, generation: u64) -> Result<(), ModuleError> {
		self.transition(ModuleState::Loading)?;
		self.generation = generation;
		Ok(())
	}

	/// Starts loading `generation` next to the live one of a loaded module.
	pub(crate) fn begin_reload(&mut self, generation: u64) -> Result<(), ModuleError> {
		if self.state != ModuleState::Loaded {
			return Err(ModuleError::InvalidTransition {
				from: self.state,
				to: ModuleState::Loading,
			});
		}
		if self.reloading.is_some() {
			return Err(self.busy());
		}
		tracing::trace!(module = %self.id, generation, "module.reload_started");
		self.reloading = Some(generation);
		Ok(())
	}

	/// Installs the new generation. Returns the generation it replaces, if this was a reload.
	pub(crate) fn finish_load(
		&mut self, id: ModuleId, lease: ModuleLease, bindings: Vec<TypeBinding>, name: Option<String>, version: Option<String>,
	) -> Result<Option<RetiredGeneration>, ModuleError> {
		match self.reloading.take() {
			Some(generation) => self.generation = generation,
			None => self.transition(ModuleState::Loaded)?,
		}
		let retired = self.retire();
		self.id = id;
		self.lease = Some(lease);
		self.bindings = bindings;
		self.name = name;
		self.version = version;
		self.failure = None;
		self.disabled = false;
		Ok(retired)
	}

	/// Records a failed load. Disabling failures keep the module out of later discovery runs.
	///
	/// A failed reload also gives up the previous generation, which is returned for teardown.
	pub(crate) fn fail_load(&mut self, id: Option<ModuleId>, error: ModuleError) -> Result<Option<RetiredGeneration>, ModuleError> {
		if self.reloading.take().is_some() {
			self.transition(ModuleState::Unloading)?;
		}
		self.transition(ModuleState::Unloaded)?;
		let retired = self.retire();
		if let Some(id) = id {
			self.id = id;
		}
		self.disabled = error.disables_module();
		self.failure = Some(error);
		Ok(retired)
	}

	fn retire(&mut self) -> Option<RetiredGeneration> {
		let lease = self.lease.take()?;
		Some(RetiredGeneration {
			id: self.id.clone(),
			lease,
			bindings: std::mem::take(&mut self.bindings),
		})
	}

	/// Moves a loaded context to `Unloading` and hands back its lease.
	pub(crate) fn begin_unload(&mut self) -> Result<Option<ModuleLease>, ModuleError> {
		if self.reloading.is_some() {
			return Err(self.busy());
		}
		self.transition(ModuleState::Unloading)?;
		Ok(self.lease.take())
	}

	pub(crate) fn finish_unload(&mut self) -> Result<(), ModuleError> {
		self.transition(ModuleState::Unloaded)?;
		self.bindings.clear();
		Ok(())
	}

	fn busy(&self) -> ModuleError {
		ModuleError::Busy {
			id: self.id.to_string(),
			state: self.state,
		}
	}

	/// Clears the disabled flag. Returns false if the module was not disabled.
	pub(crate) fn clear_disabled(&mut self) -> bool {
		std::mem::replace(&mut self.disabled, false)
	}

	/// Point-in-time view for reporting.
	pub fn info(&self) -> ModuleInfo {
		ModuleInfo {
			id: self.id.to_string(),
			path: self.path.clone(),
			state: self.state,
			generation: self.generation,
			name: self.name.clone(),
			version: self.version.clone(),
			bindings: self.bindings.iter().map(ToString::to_string).collect(),
			failure: self.failure.as_ref().map(ToString::to_string),
			disabled: self.disabled,
			in_flight: self.lease.as_ref().map_or(0, ModuleLease::in_flight),
		}
	}
}

/// Serializable snapshot of a [`ModuleContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
	pub id: String,
	pub path: PathBuf,
	pub state: ModuleState,
	pub generation: u64,
	pub name: Option<String>,
	pub version: Option<String>,
	pub bindings: Vec<String>,
	pub failure: Option<String>,
	pub disabled: bool,
	pub in_flight: usize,
}

/// Identifier used before the manifest has been read: the module directory name.
fn provisional_id(path: &Path) -> ModuleId {
	let dir = if path.file_name().is_some_and(|n| n == crate::ModuleManifest::FILE_NAME) {
		path.parent().unwrap_or(path)
	} else {
		path
	};
	dir.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.display().to_string())
		.into()
}
