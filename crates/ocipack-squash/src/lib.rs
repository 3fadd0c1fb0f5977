//! Squashes an ordered stack of OCI layers into a single canonical layer,
//! resolving whiteouts and overwrites while still re-emitting the
//! whiteout markers needed for the result to be composed onto further base
//! layers later.

mod emit;
mod engine;
mod error;
mod tree;

pub use emit::emit;
pub use engine::squash;
pub use error::SquashError;
pub use tree::{EntryKind, Header, NodeId, Tree, ROOT};

use std::io::{Read, Write};

use ocipack_layer::LayerFs;

/// Reads each layer tar in order (oldest first), squashes them, and writes
/// the canonical squashed layer as a tar stream.
pub fn squash_tars<R: Read, W: Write>(layers: Vec<R>, writer: W) -> Result<(), SquashError> {
    let parsed: Vec<LayerFs> = layers
        .into_iter()
        .map(LayerFs::from_tar)
        .collect::<Result<_, _>>()?;
    let tree = squash(&parsed)?;
    emit(&tree, writer)
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
    fn squash_tars_round_trips_through_tar_bytes() {
        let base = make_tar(&[("a", b"one")]);
        let top = make_tar(&[("a", b"two")]);

        let mut out = Vec::new();
        squash_tars(vec![Cursor::new(base), Cursor::new(top)], &mut out).unwrap();

        let mut archive = tar::Archive::new(out.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str().unwrap(), "a");
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"two");
        assert!(entries.next().is_none());
    }
}
