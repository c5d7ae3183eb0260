//! One-way observation hook for timing and health reporting.
//!
//! Dispatch, registry and module code call [`OperationObserver::observe`] after each operation.
//! Observers never return anything to the caller, so removing one cannot change an outcome.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ResourceType;

/// Operations reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
	/// Full key-to-resource resolution.
	Resolve,
	/// Registry lookup of the winning wrapper for a type.
	Lookup,
	ModuleLoad,
	ModuleUnload,
	/// Publication of one or more descriptors into the registry.
	Registration,
}

impl OperationKind {
	pub const ALL: [Self; 5] = [Self::Resolve, Self::Lookup, Self::ModuleLoad, Self::ModuleUnload, Self::Registration];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Resolve => "resolve",
			Self::Lookup => "lookup",
			Self::ModuleLoad => "module_load",
			Self::ModuleUnload => "module_unload",
			Self::Registration => "registration",
		}
	}
}

impl fmt::Display for OperationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What an operation was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
	Type(ResourceType),
	Module(&'a str),
}

impl fmt::Display for Subject<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Subject::Type(ty) => ty.fmt(f),
			Subject::Module(id) => f.write_str(id),
		}
	}
}

/// One completed operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationEvent<'a> {
	pub kind: OperationKind,
	pub subject: Subject<'a>,
	/// Module that served the operation, when known.
	pub module: Option<&'a str>,
	pub duration: Duration,
	pub success: bool,
}

/// Receives [`OperationEvent`]s.
pub trait OperationObserver: Send + Sync {
	fn observe(&self, event: OperationEvent<'_>);
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl OperationObserver for NoopObserver {
	#[inline]
	fn observe(&self, _event: OperationEvent<'_>) {}
}
