//! A minimal read-only filesystem view over a squashed layer tree:
//! open/stat/read/readdir/close, nothing more.

mod error;
mod path;
mod vfs;

pub use error::VfsError;
pub use path::validate_path;
pub use vfs::{Handle, Stat, Vfs};
