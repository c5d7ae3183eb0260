use std::any::Any;
use std::fmt;

use bytes::Bytes;

use crate::{ApiVersion, ResourceType};

/// A decoded resource produced by a wrapper.
///
/// Concrete wrappers expose their typed API through [`Resource::as_any`]; callers downcast
/// with [`downcast_ref`](trait.Resource.html#method.downcast_ref) once they know which wrapper
/// served the key.
pub trait Resource: Any + Send + Sync + fmt::Debug {
	/// Type tag this resource was built for.
	fn resource_type(&self) -> ResourceType;

	/// API version the caller asked for.
	fn requested_api_version(&self) -> ApiVersion;

	/// Newest API version the wrapper understands.
	fn recommended_api_version(&self) -> ApiVersion;

	/// Serializes the resource back to its on-disk representation.
	fn to_bytes(&self) -> Bytes;

	fn as_any(&self) -> &dyn Any;

	/// Short name of the concrete wrapper type, for diagnostics.
	fn wrapper_name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

impl dyn Resource {
	/// Downcasts to a concrete wrapper type.
	pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
		self.as_any().downcast_ref::<T>()
	}

	/// Returns true if the concrete wrapper type is `T`.
	pub fn is<T: Resource>(&self) -> bool {
		self.as_any().is::<T>()
	}
}

/// Pass-through resource over undecoded bytes.
///
/// Used by the default wrapper when no type-specific handler exists (or when the caller forces
/// the fallback path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResource {
	resource_type: ResourceType,
	api_version: ApiVersion,
	data: Bytes,
}

impl RawResource {
	pub fn new(resource_type: ResourceType, api_version: ApiVersion, data: Bytes) -> Self {
		Self {
			resource_type,
			api_version,
			data,
		}
	}

	/// Creates an empty resource with no backing bytes.
	pub fn empty(resource_type: ResourceType, api_version: ApiVersion) -> Self {
		Self::new(resource_type, api_version, Bytes::new())
	}

	pub fn data(&self) -> &Bytes {
		&self.data
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

impl Resource for RawResource {
	fn resource_type(&self) -> ResourceType {
		self.resource_type
	}

	fn requested_api_version(&self) -> ApiVersion {
		self.api_version
	}

	fn recommended_api_version(&self) -> ApiVersion {
		ApiVersion::V1
	}

	fn to_bytes(&self) -> Bytes {
		self.data.clone()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn raw_resource_downcasts() {
		let res: Box<dyn Resource> = Box::new(RawResource::new(ResourceType(7), ApiVersion::V1, Bytes::from_static(b"abc")));
		assert!(res.is::<RawResource>());
		let raw = res.downcast_ref::<RawResource>().unwrap();
		assert_eq!(raw.len(), 3);
		assert_eq!(res.to_bytes(), Bytes::from_static(b"abc"));
		assert!(res.wrapper_name().ends_with("RawResource"));
	}

	#[test]
	fn empty_resource_has_no_bytes() {
		let raw = RawResource::empty(ResourceType(7), ApiVersion(3));
		assert!(raw.is_empty());
		assert_eq!(raw.requested_api_version(), ApiVersion(3));
	}
}
