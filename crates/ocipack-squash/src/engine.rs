use std::sync::Arc;

use ocipack_layer::{InMemoryFile, LayerFs, Whiteout, WhiteoutTarget};

use crate::error::SquashError;
use crate::tree::{EntryKind, Header, Tree};

/// Applies an ordered stack of layers (oldest first) to a fresh [`Tree`],
/// per the whiteouts-before-files rule within each layer: a layer's
/// deletions take effect before its own new entries are written, so a
/// directory rewritten inside a single layer (delete-then-recreate) ends up
/// with exactly the entries that layer wrote.
pub fn squash(layers: &[LayerFs]) -> Result<Tree, SquashError> {
    let mut tree = Tree::new();
    for layer in layers {
        apply_layer(&mut tree, layer)?;
    }
    Ok(tree)
}

fn apply_layer(tree: &mut Tree, layer: &LayerFs) -> Result<(), SquashError> {
    for whiteout in &layer.whiteouts {
        apply_whiteout(tree, whiteout)?;
    }
    for file in &layer.files {
        tree.insert(&file.fullname, header_from_file(file))?;
    }
    Ok(())
}

fn apply_whiteout(tree: &mut Tree, whiteout: &Whiteout) -> Result<(), SquashError> {
    let dir = whiteout.dir.as_deref().unwrap_or("");
    match &whiteout.target {
        WhiteoutTarget::Opaque => tree.apply_opaque(dir),
        WhiteoutTarget::Named(name) => tree.apply_named_whiteout(dir, name),
    }
}

fn header_from_file(file: &InMemoryFile) -> Header {
    let kind = if file.mode.is_dir() {
        EntryKind::Directory
    } else if file.mode.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::Regular
    };
    Header {
        kind,
        mode: file.mode,
        owner: file.owner.clone(),
        modtime: file.modtime,
        link_target: file.link_target.clone(),
        body: if kind == EntryKind::Regular { Some(Arc::clone(&file.body)) } else { None },
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

    fn make_symlink_tar(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, target) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(0);
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_cksum();
            builder.append_link(&mut header, name, target).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn layer_from(tar: Vec<u8>) -> LayerFs {
        LayerFs::from_tar(Cursor::new(tar)).unwrap()
    }

    #[test]
    fn later_layer_overwrites_file_content() {
        let base = layer_from(make_tar(&[("a", b"one")]));
        let top = layer_from(make_tar(&[("a", b"two")]));
        let tree = squash(&[base, top]).unwrap();
        let id = tree.lookup("a", false).unwrap();
        let header = tree.header(id).unwrap();
        assert_eq!(header.body.as_deref(), Some(b"two".as_slice()));
    }

    #[test]
    fn symlink_then_target_directory_resolves_through_link() {
        let link_layer = layer_from(make_symlink_tar(&[("lnk", "tgt")]));
        let target_layer = layer_from(make_tar(&[("tgt/file", b"hi")]));
        let tree = squash(&[link_layer, target_layer]).unwrap();

        let lnk = tree.lookup("lnk", false).unwrap();
        assert!(tree.is_symlink(lnk));

        let tgt = tree.lookup("tgt", false).unwrap();
        assert!(tree.header(tgt).is_some());

        let file = tree.lookup("lnk/file", true).unwrap();
        assert_eq!(tree.header(file).unwrap().body.as_deref(), Some(b"hi".as_slice()));
    }

    #[test]
    fn opaque_whiteout_then_new_file_keeps_only_the_new_file() {
        let base = layer_from(make_tar(&[("a/x", b"x"), ("a/y", b"y")]));
        let top = layer_from(make_tar(&[("a/.wh..wh..opq", b""), ("a/z", b"z")]));
        let tree = squash(&[base, top]).unwrap();

        let a = tree.lookup("a", false).unwrap();
        let (whiteouts, children) = tree.ordered_children(a);
        assert_eq!(whiteouts, vec![ocipack_layer::OPAQUE_WHITEOUT_NAME.to_string()]);
        assert_eq!(children.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["z"]);

        assert!(matches!(tree.lookup("a/x", false), Err(SquashError::NotExist(_))));
    }

    #[test]
    fn named_whiteout_recreated_clears_tombstone() {
        let base = layer_from(make_tar(&[("a/x", b"x")]));
        let del = layer_from(make_tar(&[("a/.wh.x", b"")]));
        let recreate = layer_from(make_tar(&[("a/x", b"new")]));
        let tree = squash(&[base, del, recreate]).unwrap();

        let a = tree.lookup("a", false).unwrap();
        let (whiteouts, _) = tree.ordered_children(a);
        assert!(whiteouts.is_empty());
        let x = tree.lookup("a/x", false).unwrap();
        assert_eq!(tree.header(x).unwrap().body.as_deref(), Some(b"new".as_slice()));
    }

    #[test]
    fn file_overwritten_by_directory_discards_old_children() {
        let base = layer_from(make_tar(&[("a", b"regular")]));
        let top = layer_from(make_tar(&[("a/b", b"now a dir")]));
        let tree = squash(&[base, top]).unwrap();

        let a = tree.lookup("a", false).unwrap();
        assert!(tree.header(a).is_none() || matches!(tree.header(a), Some(h) if h.kind == EntryKind::Directory));
        let b = tree.lookup("a/b", false).unwrap();
        assert_eq!(tree.header(b).unwrap().body.as_deref(), Some(b"now a dir".as_slice()));
    }
}
