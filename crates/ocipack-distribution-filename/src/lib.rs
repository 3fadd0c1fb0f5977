mod build_tag;
mod package_name;
mod wheel;

pub use build_tag::{BuildTag, BuildTagError};
pub use package_name::{InvalidNameError, PackageName};
pub use wheel::{WheelFilename, WheelFilenameError};
