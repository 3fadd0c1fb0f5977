//! Python interpreter/ABI/platform compatibility tags, and the target
//! [`Platform`] description that wheel installation is performed against.

mod platform;
mod tags;

pub use platform::{Platform, PlatformError, PycCompiler, Scheme};
pub use tags::{CompatibilityTag, IncompatibleTag, TagCompatibility, TagPriority, Tags};
