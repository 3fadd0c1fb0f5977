use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use ocipack_layer::{InMemoryFile, LayerFs, Owner};
use ocipack_stat_mode::StatMode;
use rustc_hash::FxHashMap;

use crate::error::DirLayerError;

/// Ownership fields to substitute for the host-observed uid/gid/names, each
/// independently optional — an unset field keeps the host-observed value.
#[derive(Debug, Clone, Default)]
pub struct OwnerOverride {
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub uname: Option<String>,
    pub gname: Option<String>,
}

/// Options controlling a single [`build_dir_layer`] walk.
#[derive(Debug, Clone)]
pub struct DirLayerOptions {
    /// Every emitted timestamp is clamped to at most this value.
    pub max_time: i64,
    pub owner: OwnerOverride,
    /// When set, every emitted path (including a synthesized chain of
    /// directory entries for the prefix itself) is rooted under this path.
    pub prefix: Option<String>,
    pub prefix_owner: Owner,
}

impl Default for DirLayerOptions {
    fn default() -> Self {
        Self {
            max_time: i64::MAX,
            owner: OwnerOverride::default(),
            prefix: None,
            prefix_owner: Owner::default(),
        }
    }
}

/// Walks `root`, emitting one [`LayerFs`] whose entries mirror the host
/// directory: hard links between walked files collapse to a single stored
/// body plus `EntryType::Link` references to the first-seen name, symlinks
/// carry their host-read target, and every timestamp is clamped to
/// `opts.max_time`.
pub fn build_dir_layer(root: &Path, opts: &DirLayerOptions) -> Result<LayerFs, DirLayerError> {
    let mut layer = LayerFs::default();
    let mut seen: FxHashMap<(u64, u64), String> = FxHashMap::default();

    let prefix_path = opts.prefix.as_deref().unwrap_or("").trim_matches('/');
    if !prefix_path.is_empty() {
        let mut acc = String::new();
        for segment in prefix_path.split('/') {
            if !acc.is_empty() {
                acc.push('/');
            }
            acc.push_str(segment);
            layer.files.push(InMemoryFile {
                fullname: acc.clone(),
                size: 0,
                mode: StatMode::directory(0o755),
                modtime: opts.max_time,
                link_target: None,
                hardlink_target: None,
                owner: opts.prefix_owner.clone(),
                body: empty_body(),
            });
        }
    }

    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| DirLayerError::Walk(root.display().to_string(), err))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields descendants of root");
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let fullname = if prefix_path.is_empty() {
            rel_str.clone()
        } else {
            format!("{prefix_path}/{rel_str}")
        };

        let metadata = entry
            .path()
            .symlink_metadata()
            .map_err(|err| DirLayerError::Metadata(rel_str.clone(), err))?;
        let modtime = metadata.mtime().min(opts.max_time);
        let owner = apply_owner_override(&opts.owner, metadata.uid().into(), metadata.gid().into());

        if metadata.is_dir() {
            layer.files.push(InMemoryFile {
                fullname,
                size: 0,
                mode: StatMode::directory(metadata.mode()),
                modtime,
                link_target: None,
                hardlink_target: None,
                owner,
                body: empty_body(),
            });
            continue;
        }

        if metadata.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .map_err(|err| DirLayerError::ReadLink(rel_str.clone(), err))?;
            layer.files.push(InMemoryFile {
                fullname,
                size: 0,
                mode: StatMode::symlink(),
                modtime,
                link_target: Some(target.to_string_lossy().into_owned()),
                hardlink_target: None,
                owner,
                body: empty_body(),
            });
            continue;
        }

        let identity = (metadata.dev(), metadata.ino());
        if let Some(first_name) = seen.get(&identity) {
            layer.files.push(InMemoryFile {
                fullname,
                size: 0,
                mode: StatMode::regular_file(metadata.mode()),
                modtime,
                link_target: None,
                hardlink_target: Some(first_name.clone()),
                owner,
                body: empty_body(),
            });
            continue;
        }
        seen.insert(identity, fullname.clone());

        let body = fs::read(entry.path()).map_err(|err| DirLayerError::ReadFile(rel_str.clone(), err))?;
        layer.files.push(InMemoryFile {
            size: body.len() as u64,
            fullname,
            mode: StatMode::regular_file(metadata.mode()),
            modtime,
            link_target: None,
            hardlink_target: None,
            owner,
            body: Arc::from(body.into_boxed_slice()),
        });
    }

    Ok(layer)
}

fn empty_body() -> Arc<[u8]> {
    Arc::from(Vec::new().into_boxed_slice())
}

fn apply_owner_override(overrides: &OwnerOverride, uid: u64, gid: u64) -> Owner {
    Owner {
        uid: overrides.uid.unwrap_or(uid),
        gid: overrides.gid.unwrap_or(gid),
        uname: overrides.uname.clone().unwrap_or_default(),
        gname: overrides.gname.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn walks_regular_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/file.txt"), b"hello").unwrap();

        let layer = build_dir_layer(dir.path(), &DirLayerOptions::default()).unwrap();
        let names: Vec<&str> = layer.files.iter().map(|f| f.fullname.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"a/file.txt"));
    }

    #[test]
    fn captures_symlink_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), b"x").unwrap();
        symlink("target.txt", dir.path().join("link")).unwrap();

        let layer = build_dir_layer(dir.path(), &DirLayerOptions::default()).unwrap();
        let link = layer.files.iter().find(|f| f.fullname == "link").unwrap();
        assert_eq!(link.link_target.as_deref(), Some("target.txt"));
        assert!(link.mode.is_symlink());
    }

    #[test]
    fn detects_hard_links() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"shared").unwrap();
        fs::hard_link(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();

        let layer = build_dir_layer(dir.path(), &DirLayerOptions::default()).unwrap();
        let b = layer.files.iter().find(|f| f.fullname == "b.txt").unwrap();
        assert_eq!(b.hardlink_target.as_deref(), Some("a.txt"));
    }

    #[test]
    fn clamps_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let opts = DirLayerOptions { max_time: 0, ..DirLayerOptions::default() };
        let layer = build_dir_layer(dir.path(), &opts).unwrap();
        assert!(layer.files.iter().all(|f| f.modtime <= 0));
    }

    #[test]
    fn prefix_synthesizes_leading_directory_chain() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let opts = DirLayerOptions {
            prefix: Some("app/bin".to_string()),
            ..DirLayerOptions::default()
        };
        let layer = build_dir_layer(dir.path(), &opts).unwrap();
        let names: Vec<&str> = layer.files.iter().map(|f| f.fullname.as_str()).collect();
        assert_eq!(names, vec!["app", "app/bin", "app/bin/a.txt"]);
    }
}
