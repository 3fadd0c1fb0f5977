//! Tar streaming and the filesystem model a single layer is represented as:
//! an ordered sequence of typed file references plus whiteout markers.

mod error;
mod file_reference;
mod layer_fs;
mod path;
mod writer;

pub use error::LayerError;
pub use file_reference::{FileReference, InMemoryFile, Owner};
pub use layer_fs::{LayerFs, Whiteout, WhiteoutTarget, OPAQUE_WHITEOUT_NAME, WHITEOUT_PREFIX};
pub use path::{clean_relative_path, split_parent};
pub use writer::{append_entry, append_whiteout};
