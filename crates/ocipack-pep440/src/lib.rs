mod specifier;
mod version;

pub use specifier::{
    select_best, ExclusionBehavior, Operator, SpecifierParseError, VersionSpecifier,
    VersionSpecifiers,
};
pub use version::{LocalSegment, Prerelease, PrereleaseKind, Version, VersionParseError};
