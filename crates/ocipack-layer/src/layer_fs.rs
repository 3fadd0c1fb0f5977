use std::io::Read;
use std::sync::Arc;

use ocipack_stat_mode::StatMode;

use crate::error::LayerError;
use crate::file_reference::{InMemoryFile, Owner};
use crate::path::{clean_relative_path, split_parent};

/// A whiteout marker: either deletes one named sibling, or (`.wh..wh..opq`)
/// every sibling of its containing directory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Whiteout {
    /// Root-relative path of the directory the whiteout lives in; `None`
    /// for a whiteout at the layer root.
    pub dir: Option<String>,
    pub target: WhiteoutTarget,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WhiteoutTarget {
    /// Deletes every sibling of `dir` (`.wh..wh..opq`).
    Opaque,
    /// Deletes the sibling named `name` (`.wh.{name}`).
    Named(String),
}

pub const WHITEOUT_PREFIX: &str = ".wh.";
pub const OPAQUE_WHITEOUT_NAME: &str = ".wh..wh..opq";

/// A single layer, parsed from a tar stream into its regular files and its
/// whiteout markers, in on-disk order.
#[derive(Debug, Default)]
pub struct LayerFs {
    pub files: Vec<InMemoryFile>,
    pub whiteouts: Vec<Whiteout>,
}

impl LayerFs {
    pub fn from_tar<R: Read>(reader: R) -> Result<Self, LayerError> {
        let mut archive = tar::Archive::new(reader);
        let mut layer = Self::default();

        for entry in archive.entries().map_err(LayerError::Tar)? {
            let mut entry = entry.map_err(LayerError::Tar)?;
            let raw_path = entry.path().map_err(LayerError::Tar)?.to_string_lossy().into_owned();

            let Some(cleaned) = clean_relative_path(&raw_path)? else {
                continue;
            };

            let (parent, basename) = split_parent(&cleaned);

            if let Some(name) = basename.strip_prefix(WHITEOUT_PREFIX) {
                let target = if basename == OPAQUE_WHITEOUT_NAME {
                    WhiteoutTarget::Opaque
                } else {
                    WhiteoutTarget::Named(name.to_string())
                };
                layer.whiteouts.push(Whiteout { dir: parent.map(String::from), target });
                continue;
            }

            let header = entry.header();
            let mode = StatMode::from_tar_header(header);
            let modtime = header.mtime().unwrap_or(0) as i64;
            let is_hardlink = header.entry_type().is_hard_link();
            let raw_link = entry
                .link_name()
                .ok()
                .flatten()
                .map(|p| p.to_string_lossy().into_owned());
            let (link_target, hardlink_target) = if is_hardlink {
                (None, raw_link)
            } else {
                (raw_link, None)
            };
            let owner = Owner {
                uid: header.uid().unwrap_or(0),
                gid: header.gid().unwrap_or(0),
                uname: header.username().ok().flatten().unwrap_or_default().to_string(),
                gname: header.groupname().ok().flatten().unwrap_or_default().to_string(),
            };

            let mut body = Vec::new();
            if header.entry_type().is_file() {
                entry.read_to_end(&mut body).map_err(LayerError::Io)?;
            }

            layer.files.push(InMemoryFile {
                fullname: cleaned,
                size: body.len() as u64,
                mode,
                modtime,
                link_target,
                hardlink_target,
                owner,
                body: Arc::from(body.into_boxed_slice()),
            });
        }

        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn parses_regular_files() {
        let tar = make_tar(&[("a/b.txt", b"hello")]);
        let layer = LayerFs::from_tar(Cursor::new(tar)).unwrap();
        assert_eq!(layer.files.len(), 1);
        assert_eq!(layer.files[0].fullname, "a/b.txt");
        assert_eq!(layer.files[0].body.as_ref(), b"hello");
    }

    #[test]
    fn separates_whiteouts_from_files() {
        let tar = make_tar(&[("a/.wh.x", b""), ("a/.wh..wh..opq", b""), ("a/z", b"z")]);
        let layer = LayerFs::from_tar(Cursor::new(tar)).unwrap();
        assert_eq!(layer.files.len(), 1);
        assert_eq!(layer.whiteouts.len(), 2);
        assert!(layer
            .whiteouts
            .iter()
            .any(|w| w.dir.as_deref() == Some("a") && w.target == WhiteoutTarget::Opaque));
        assert!(layer.whiteouts.iter().any(
            |w| w.dir.as_deref() == Some("a") && w.target == WhiteoutTarget::Named("x".to_string())
        ));
    }

    #[test]
    fn rejects_path_escaping_root() {
        let tar = make_tar(&[("../escape", b"x")]);
        assert!(matches!(
            LayerFs::from_tar(Cursor::new(tar)),
            Err(LayerError::PathEscapesRoot(_))
        ));
    }
}
