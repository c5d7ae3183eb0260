//! Core value types shared by every modkit crate.
//!
//! * [`ResourceKey`] identifies one record inside a package (type, group, instance).
//! * [`Resource`] is the decoded, strongly-typed value a wrapper produces.
//! * [`OperationObserver`] is the one-way hook used for timing and health reporting.

mod key;
mod observe;
mod resource;

pub use key::{ApiVersion, KeyParseError, ResourceKey, ResourceType};
pub use observe::{NoopObserver, OperationEvent, OperationKind, OperationObserver, Subject};
pub use resource::{RawResource, Resource};
