use std::cell::Cell;

use ocipack_squash::{EntryKind, NodeId, Tree, ROOT};
use ocipack_stat_mode::StatMode;

use crate::error::VfsError;
use crate::path::validate_path;

/// Metadata about an open entry, independent of whether it is a file or a
/// directory.
#[derive(Debug, Clone)]
pub struct Stat {
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub mode: StatMode,
    pub modtime: i64,
    pub link_target: Option<String>,
}

/// A read-only view over a squashed tree, exposing a minimal
/// open/stat/read/readdir/close filesystem API.
pub struct Vfs {
    tree: Tree,
}

impl Vfs {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Opens `path`, following a symlink at the final path component (the
    /// usual `open(2)` behavior); fails with `NotExist` if that symlink is
    /// dangling or points outside the tree.
    pub fn open(&self, path: &str) -> Result<Handle<'_>, VfsError> {
        validate_path(path)?;
        let id = if path.is_empty() {
            ROOT
        } else {
            self.tree.lookup(path, true)?
        };
        Ok(Handle { vfs: self, id, closed: Cell::new(false) })
    }
}

/// A handle to one resolved entry. Every operation after [`Handle::close`]
/// fails with [`VfsError::Closed`].
pub struct Handle<'a> {
    vfs: &'a Vfs,
    id: NodeId,
    closed: Cell<bool>,
}

impl Handle<'_> {
    fn check_open(&self) -> Result<(), VfsError> {
        if self.closed.get() {
            Err(VfsError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn stat(&self) -> Result<Stat, VfsError> {
        self.check_open()?;
        let tree = &self.vfs.tree;
        let header = tree.header(self.id);
        let is_dir = header.as_ref().is_none_or(|h| h.kind == EntryKind::Directory);
        let is_symlink = header.as_ref().is_some_and(|h| h.kind == EntryKind::Symlink);
        let size = header.as_ref().and_then(|h| h.body.as_ref()).map_or(0, |b| b.len() as u64);
        let mode = header.as_ref().map_or_else(|| StatMode::directory(0o755), |h| h.mode);
        let modtime = header.as_ref().map_or(0, |h| h.modtime);
        let link_target = header.as_ref().and_then(|h| h.link_target.clone());
        Ok(Stat { is_dir, is_symlink, size, mode, modtime, link_target })
    }

    /// Reads the full content of a regular file.
    pub fn read(&self) -> Result<Vec<u8>, VfsError> {
        self.check_open()?;
        let tree = &self.vfs.tree;
        match tree.header(self.id) {
            Some(h) if h.kind == EntryKind::Regular => {
                Ok(h.body.as_deref().map(<[u8]>::to_vec).unwrap_or_default())
            }
            Some(_) => Err(VfsError::NotDir(String::new())),
            None => Ok(Vec::new()),
        }
    }

    /// Lists a directory's entries, excluding whiteout markers — a
    /// squashed tree's `Tree` never materializes those as real children,
    /// but this filter stays as a defensive backstop against any name
    /// that happens to start with `.wh.`.
    pub fn readdir(&self) -> Result<Vec<String>, VfsError> {
        self.check_open()?;
        let tree = &self.vfs.tree;
        let (_, children) = tree.ordered_children(self.id);
        Ok(children
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| !name.starts_with(ocipack_layer::WHITEOUT_PREFIX))
            .collect())
    }

    pub fn close(&self) {
        self.closed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocipack_layer::LayerFs;
    use std::io::Cursor;

    fn make_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, Cursor::new(body)).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn vfs_from(entries: &[(&str, &[u8])]) -> Vfs {
        let tar = make_tar(entries);
        let layer = LayerFs::from_tar(Cursor::new(tar)).unwrap();
        let tree = ocipack_squash::squash(&[layer]).unwrap();
        Vfs::new(tree)
    }

    #[test]
    fn reads_file_content() {
        let vfs = vfs_from(&[("a/b.txt", b"hello")]);
        let handle = vfs.open("a/b.txt").unwrap();
        assert_eq!(handle.read().unwrap(), b"hello");
        assert!(!handle.stat().unwrap().is_dir);
    }

    #[test]
    fn lists_directory_entries() {
        let vfs = vfs_from(&[("a/x", b"x"), ("a/y", b"y")]);
        let handle = vfs.open("a").unwrap();
        assert!(handle.stat().unwrap().is_dir);
        let mut names = handle.readdir().unwrap();
        names.sort();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn closed_handle_rejects_further_operations() {
        let vfs = vfs_from(&[("a", b"hi")]);
        let handle = vfs.open("a").unwrap();
        handle.close();
        assert!(matches!(handle.read(), Err(VfsError::Closed)));
        assert!(matches!(handle.stat(), Err(VfsError::Closed)));
    }

    #[test]
    fn missing_path_is_not_exist() {
        let vfs = vfs_from(&[("a", b"hi")]);
        assert!(matches!(vfs.open("nope"), Err(VfsError::NotExist(_))));
    }

    #[test]
    fn rejects_invalid_path_before_lookup() {
        let vfs = vfs_from(&[("a", b"hi")]);
        assert!(matches!(vfs.open("/a"), Err(VfsError::InvalidPath(_))));
        assert!(matches!(vfs.open("a/../a"), Err(VfsError::InvalidPath(_))));
    }
}
