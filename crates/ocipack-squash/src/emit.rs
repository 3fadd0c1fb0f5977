use std::io::Write;

use ocipack_layer::{append_entry, append_whiteout, InMemoryFile};

use crate::error::SquashError;
use crate::tree::{NodeId, Tree, ROOT};

/// Writes the squashed tree to `writer` as a tar stream in canonical order:
/// depth-first pre-order, whiteout markers before a directory's non-deleted
/// children, siblings otherwise in lexicographic order. Implicit
/// directories synthesized only to allow traversal are never emitted.
pub fn emit<W: Write>(tree: &Tree, mut writer: W) -> Result<(), SquashError> {
    let mut builder = tar::Builder::new(&mut writer);
    emit_node(tree, ROOT, &mut builder)?;
    builder.finish().map_err(SquashError::Io)?;
    Ok(())
}

fn emit_node<W: Write>(tree: &Tree, id: NodeId, builder: &mut tar::Builder<W>) -> Result<(), SquashError> {
    if id != ROOT && tree.has_explicit_header(id) {
        let file = to_file_reference(tree, id);
        append_entry(builder, &file).map_err(|e| SquashError::Io(to_io(e)))?;
    }

    let (whiteouts, children) = tree.ordered_children(id);
    let dir_path = path_of(tree, id);
    let dir_ref = if dir_path.is_empty() { None } else { Some(dir_path.as_str()) };
    let mtime = tree.header(id).map_or(0, |h| h.modtime);

    for name in &whiteouts {
        append_whiteout(builder, dir_ref, name, mtime).map_err(|e| SquashError::Io(to_io(e)))?;
    }

    for (_, child) in children {
        emit_node(tree, child, builder)?;
    }

    Ok(())
}

fn to_io(err: ocipack_layer::LayerError) -> std::io::Error {
    match err {
        ocipack_layer::LayerError::Io(e) => e,
        other => std::io::Error::other(other.to_string()),
    }
}

fn path_of(tree: &Tree, mut id: NodeId) -> String {
    let mut parts = Vec::new();
    while id != ROOT {
        parts.push(tree.name(id).to_string());
        id = tree.parent(id);
    }
    parts.reverse();
    parts.join("/")
}

fn to_file_reference(tree: &Tree, id: NodeId) -> InMemoryFile {
    let header = tree.header(id).expect("caller checked has_explicit_header");
    InMemoryFile {
        fullname: path_of(tree, id),
        size: header.body.as_ref().map_or(0, |b| b.len() as u64),
        mode: header.mode,
        modtime: header.modtime,
        link_target: header.link_target.clone(),
        hardlink_target: None,
        owner: header.owner.clone(),
        body: header.body.clone().unwrap_or_else(|| std::sync::Arc::from(Vec::new().into_boxed_slice())),
    }
}
