//! Native handler libraries loaded with `libloading`.
//!
//! A library exports [`ENTRY_SYMBOL`] with the signature of [`ModuleEntryV1`]. The entry
//! fills a [`ModuleVTableV1`]; every buffer the library hands back is released through the
//! vtable's `free_buffer`, never by the host allocator.
//!
//! ```ignore
//! #[unsafe(no_mangle)]
//! pub unsafe extern "C" fn modkit_module_entry_v1(out: *mut ModuleVTableV1) -> AbiStatus {
//!     unsafe { out.write(VTABLE) };
//!     AbiStatus::OK
//! }
//! ```

use std::any::Any;
use std::mem::MaybeUninit;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use libloading::{Library, Symbol};
use modkit_primitives::{ApiVersion, Resource, ResourceType};
use modkit_registry::{FactoryContext, FactoryError, TypeBinding, WrapperFactory};

use super::{HandlerLibrary, LoadedLibrary, ModuleLoader};
use crate::{ModuleError, ModuleManifest};

pub const ABI_VERSION: u32 = 1;
pub const ENTRY_SYMBOL: &[u8] = b"modkit_module_entry_v1\0";

/// Status code crossing the library boundary.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiStatus(pub u32);

impl AbiStatus {
	pub const OK: Self = Self(0);
	pub const MALFORMED: Self = Self(1);
	pub const UNSUPPORTED_API_VERSION: Self = Self(2);
	pub const UNSUPPORTED_TYPE: Self = Self(3);
	pub const FAILED: Self = Self(4);
}

/// Library-owned byte buffer.
#[repr(C)]
#[derive(Debug)]
pub struct AbiBuffer {
	pub ptr: *mut u8,
	pub len: usize,
	pub cap: usize,
}

impl AbiBuffer {
	pub const fn empty() -> Self {
		Self {
			ptr: std::ptr::null_mut(),
			len: 0,
			cap: 0,
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ModuleVTableV1 {
	pub abi_version: u32,
	pub min_api_version: u32,
	pub max_api_version: u32,
	pub handles_default: bool,
	pub handles: extern "C" fn(resource_type: u32) -> bool,
	pub decode: extern "C" fn(resource_type: u32, api_version: u32, data: *const u8, len: usize, out: *mut AbiBuffer) -> AbiStatus,
	pub create_empty: extern "C" fn(resource_type: u32, api_version: u32, out: *mut AbiBuffer) -> AbiStatus,
	pub free_buffer: extern "C" fn(buffer: AbiBuffer),
}

pub type ModuleEntryV1 = unsafe extern "C" fn(out: *mut ModuleVTableV1) -> AbiStatus;

struct DylibShared {
	entry: String,
	vtable: ModuleVTableV1,
	// Declared last: the vtable's function pointers live in this library.
	_lib: Library,
}

impl DylibShared {
	/// Copies a library-owned buffer into host memory and releases it.
	fn take_buffer(&self, buffer: AbiBuffer) -> Bytes {
		if buffer.ptr.is_null() {
			return Bytes::new();
		}
		// SAFETY: the vtable contract guarantees `ptr` points at `len` initialized bytes until
		// `free_buffer` is called.
		let bytes = Bytes::copy_from_slice(unsafe { std::slice::from_raw_parts(buffer.ptr, buffer.len) });
		(self.vtable.free_buffer)(buffer);
		bytes
	}

	fn supports(&self, version: ApiVersion) -> bool {
		(self.vtable.min_api_version..=self.vtable.max_api_version).contains(&version.0)
	}
}

/// [`HandlerLibrary`] backed by a loaded native library.
struct DylibLibrary {
	shared: Arc<DylibShared>,
}

impl HandlerLibrary for DylibLibrary {
	fn factory(&self, binding: TypeBinding) -> Result<Arc<dyn WrapperFactory>, String> {
		let vtable = &self.shared.vtable;
		let served = match binding {
			TypeBinding::Default => vtable.handles_default,
			TypeBinding::Type(ty) => (vtable.handles)(ty.0),
		};
		if !served {
			return Err(format!("{} does not handle {binding}", self.shared.entry));
		}
		Ok(Arc::new(DylibFactory {
			name: format!("{}:{binding}", self.shared.entry),
			shared: Arc::clone(&self.shared),
		}))
	}
}

struct DylibFactory {
	name: String,
	shared: Arc<DylibShared>,
}

impl DylibFactory {
	fn finish(&self, ctx: FactoryContext, status: AbiStatus, out: AbiBuffer) -> Result<Box<dyn Resource>, FactoryError> {
		let data = self.shared.take_buffer(out);
		match status {
			AbiStatus::OK => Ok(Box::new(DylibResource {
				resource_type: ctx.resource_type,
				api_version: ctx.api_version,
				recommended: ApiVersion(self.shared.vtable.max_api_version),
				handler: self.name.clone(),
				data,
			})),
			AbiStatus::UNSUPPORTED_API_VERSION => Err(FactoryError::UnsupportedApiVersion { requested: ctx.api_version }),
			AbiStatus::MALFORMED => Err(FactoryError::Malformed(String::from_utf8_lossy(&data).into_owned())),
			other => Err(FactoryError::Other(format!("{} returned status {}", self.name, other.0).into())),
		}
	}
}

impl WrapperFactory for DylibFactory {
	fn name(&self) -> &str {
		&self.name
	}

	fn supports_api_version(&self, version: ApiVersion) -> bool {
		self.shared.supports(version)
	}

	fn decode(&self, ctx: FactoryContext, data: Bytes) -> Result<Box<dyn Resource>, FactoryError> {
		let mut out = AbiBuffer::empty();
		let status = (self.shared.vtable.decode)(ctx.resource_type.0, ctx.api_version.0, data.as_ptr(), data.len(), &mut out);
		self.finish(ctx, status, out)
	}

	fn create_empty(&self, ctx: FactoryContext) -> Result<Box<dyn Resource>, FactoryError> {
		let mut out = AbiBuffer::empty();
		let status = (self.shared.vtable.create_empty)(ctx.resource_type.0, ctx.api_version.0, &mut out);
		self.finish(ctx, status, out)
	}
}

/// Resource produced by a native handler: the canonical bytes it returned.
#[derive(Debug, Clone)]
pub struct DylibResource {
	resource_type: ResourceType,
	api_version: ApiVersion,
	recommended: ApiVersion,
	handler: String,
	data: Bytes,
}

impl DylibResource {
	pub fn handler(&self) -> &str {
		&self.handler
	}
}

impl Resource for DylibResource {
	fn resource_type(&self) -> ResourceType {
		self.resource_type
	}

	fn requested_api_version(&self) -> ApiVersion {
		self.api_version
	}

	fn recommended_api_version(&self) -> ApiVersion {
		self.recommended
	}

	fn to_bytes(&self) -> Bytes {
		self.data.clone()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// Loader for `kind = "dylib"`: `entry` is a library path relative to the manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

impl DylibLoader {
	pub const KIND: &'static str = "dylib";
}

impl ModuleLoader for DylibLoader {
	fn kind(&self) -> &'static str {
		Self::KIND
	}

	fn load(&self, manifest: &ModuleManifest, base_dir: &Path) -> Result<LoadedLibrary, ModuleError> {
		let entry = manifest.loader.entry.clone();
		let path = base_dir.join(&entry);
		let fail = |reason: String| ModuleError::Library {
			entry: entry.clone(),
			reason,
		};

		// SAFETY: loading runs the library's initializers; modules are trusted host extensions.
		let lib = unsafe { Library::new(&path) }.map_err(|e| fail(format!("failed to open {}: {e}", path.display())))?;

		let vtable = {
			// SAFETY: the symbol type matches the documented entry signature.
			let entry_fn: Symbol<ModuleEntryV1> = unsafe { lib.get(ENTRY_SYMBOL) }.map_err(|e| fail(format!("missing entry symbol: {e}")))?;
			let mut vtable = MaybeUninit::<ModuleVTableV1>::uninit();
			// SAFETY: the entry writes a complete vtable when it reports OK.
			let status = unsafe { entry_fn(vtable.as_mut_ptr()) };
			if status != AbiStatus::OK {
				return Err(fail(format!("entry failed with status {}", status.0)));
			}
			// SAFETY: initialized by the entry above.
			unsafe { vtable.assume_init() }
		};

		if vtable.abi_version != ABI_VERSION {
			return Err(fail(format!(
				"incompatible ABI version: host={ABI_VERSION}, module={}",
				vtable.abi_version
			)));
		}
		if vtable.min_api_version > vtable.max_api_version {
			return Err(fail("empty api version range".into()));
		}

		tracing::debug!(module = %manifest.id, path = %path.display(), "module.dylib.loaded");
		let shared = Arc::new(DylibShared { entry, vtable, _lib: lib });
		Ok(LoadedLibrary {
			library: Arc::new(DylibLibrary {
				shared: Arc::clone(&shared),
			}),
			retained: Some(shared as Arc<dyn Any + Send + Sync>),
		})
	}
}
