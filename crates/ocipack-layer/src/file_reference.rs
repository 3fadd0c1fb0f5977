use std::io::{Cursor, Read};
use std::sync::Arc;

use ocipack_stat_mode::StatMode;

/// Ownership of a filesystem entry: numeric ids plus the symbolic names tar
/// and the squash engine carry alongside them.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Owner {
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
}

/// A capability representing one filesystem entry: enough to stat it, open
/// its content, and re-emit it into a tar stream. Created by readers
/// (tar/directory walkers), consumed by writers (squash/layer builders).
pub trait FileReference: std::fmt::Debug {
    /// Forward-slash, root-relative path with no leading slash.
    fn fullname(&self) -> &str;
    fn size(&self) -> u64;
    fn mode(&self) -> StatMode;
    /// Unix seconds.
    fn modtime(&self) -> i64;
    fn is_dir(&self) -> bool {
        self.mode().is_dir()
    }
    fn link_target(&self) -> Option<&str>;
    /// `Some` for an entry that re-emits as a tar hardlink (`EntryType::Link`)
    /// rather than a symlink — only the directory-to-layer builder produces
    /// these, by detecting repeated `(dev, ino)` identity during a host walk.
    fn hardlink_target(&self) -> Option<&str> {
        None
    }
    fn owner(&self) -> &Owner;
    fn open(&self) -> std::io::Result<Box<dyn Read + Send + '_>>;
}

/// A [`FileReference`] whose content is already fully buffered in memory —
/// the shape every layer ends up in once read off a tar stream, since the
/// squash engine needs random access across an entire stack of layers.
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    pub fullname: String,
    pub size: u64,
    pub mode: StatMode,
    pub modtime: i64,
    pub link_target: Option<String>,
    pub hardlink_target: Option<String>,
    pub owner: Owner,
    pub body: Arc<[u8]>,
}

impl FileReference for InMemoryFile {
    fn fullname(&self) -> &str {
        &self.fullname
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mode(&self) -> StatMode {
        self.mode
    }

    fn modtime(&self) -> i64 {
        self.modtime
    }

    fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    fn hardlink_target(&self) -> Option<&str> {
        self.hardlink_target.as_deref()
    }

    fn owner(&self) -> &Owner {
        &self.owner
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(self.body.as_ref())))
    }
}
