//! Resource identity.
//!
//! A [`ResourceKey`] is the (type, group, instance) triple naming one record inside a package.
//! Keys are immutable values: the composite hash is computed once in [`ResourceKey::new`] and
//! every "modification" builds a new key.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rustc_hash::FxHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Numeric resource type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceType(pub u32);

impl ResourceType {
	/// Returns the raw tag.
	#[inline]
	pub const fn get(self) -> u32 {
		self.0
	}
}

impl From<u32> for ResourceType {
	fn from(value: u32) -> Self {
		Self(value)
	}
}

impl fmt::Display for ResourceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:08X}", self.0)
	}
}

impl FromStr for ResourceType {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_hex_u32(s, "type").map(Self)
	}
}

impl Serialize for ResourceType {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for ResourceType {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Version of the resource API a caller asks a wrapper to honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiVersion(pub u32);

impl ApiVersion {
	/// The first published API version.
	pub const V1: Self = Self(1);
}

impl Default for ApiVersion {
	fn default() -> Self {
		Self::V1
	}
}

impl fmt::Display for ApiVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

/// Immutable (type, group, instance) identity of one resource record.
///
/// Equality compares the three numeric fields. [`Hash`] feeds only the precomputed composite
/// hash, so hashing is O(1) and never allocates.
#[derive(Clone, Copy)]
pub struct ResourceKey {
	resource_type: ResourceType,
	group: u32,
	instance: u64,
	composite: i32,
}

impl ResourceKey {
	/// Builds a key and computes its composite hash.
	pub fn new(resource_type: impl Into<ResourceType>, group: u32, instance: u64) -> Self {
		let resource_type = resource_type.into();
		let mut hasher = FxHasher::default();
		hasher.write_u32(resource_type.0);
		hasher.write_u32(group);
		hasher.write_u64(instance);
		let full = hasher.finish();
		Self {
			resource_type,
			group,
			instance,
			composite: ((full >> 32) ^ full) as u32 as i32,
		}
	}

	#[inline]
	pub fn resource_type(&self) -> ResourceType {
		self.resource_type
	}

	#[inline]
	pub fn group(&self) -> u32 {
		self.group
	}

	#[inline]
	pub fn instance(&self) -> u64 {
		self.instance
	}

	/// Hash computed at construction.
	#[inline]
	pub fn composite_hash(&self) -> i32 {
		self.composite
	}

	/// Returns a new key with a different type.
	pub fn with_type(&self, resource_type: impl Into<ResourceType>) -> Self {
		Self::new(resource_type, self.group, self.instance)
	}

	/// Returns a new key with a different group.
	pub fn with_group(&self, group: u32) -> Self {
		Self::new(self.resource_type, group, self.instance)
	}

	/// Returns a new key with a different instance.
	pub fn with_instance(&self, instance: u64) -> Self {
		Self::new(self.resource_type, self.group, instance)
	}
}

impl PartialEq for ResourceKey {
	#[inline]
	fn eq(&self, other: &Self) -> bool {
		self.composite == other.composite
			&& self.resource_type == other.resource_type
			&& self.group == other.group
			&& self.instance == other.instance
	}
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
	#[inline]
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_i32(self.composite);
	}
}

impl PartialOrd for ResourceKey {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ResourceKey {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		(self.resource_type, self.group, self.instance).cmp(&(other.resource_type, other.group, other.instance))
	}
}

impl fmt::Debug for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ResourceKey({self})")
	}
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:08X}-0x{:08X}-0x{:016X}", self.resource_type.0, self.group, self.instance)
	}
}

/// Failure to parse a [`ResourceKey`] or [`ResourceType`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
	#[error("expected three '-' separated fields, got {0}")]
	FieldCount(usize),
	#[error("invalid {field} field {value:?}")]
	InvalidField { field: &'static str, value: String },
}

impl FromStr for ResourceKey {
	type Err = KeyParseError;

	/// Parses the canonical `0xTTTTTTTT-0xGGGGGGGG-0xIIIIIIIIIIIIIIII` form.
	///
	/// The `0x` prefixes are optional and hex digits are case-insensitive.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let fields: Vec<&str> = s.trim().split('-').collect();
		let [ty, group, instance] = fields.as_slice() else {
			return Err(KeyParseError::FieldCount(fields.len()));
		};
		let ty = parse_hex_u32(ty, "type")?;
		let group = parse_hex_u32(group, "group")?;
		let instance = u64::from_str_radix(strip_hex_prefix(instance), 16).map_err(|_| KeyParseError::InvalidField {
			field: "instance",
			value: (*instance).to_string(),
		})?;
		Ok(Self::new(ty, group, instance))
	}
}

fn strip_hex_prefix(s: &str) -> &str {
	let s = s.trim();
	s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn parse_hex_u32(s: &str, field: &'static str) -> Result<u32, KeyParseError> {
	u32::from_str_radix(strip_hex_prefix(s), 16).map_err(|_| KeyParseError::InvalidField {
		field,
		value: s.to_string(),
	})
}
