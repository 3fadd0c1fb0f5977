use std::io::Write;

use crate::error::LayerError;
use crate::file_reference::FileReference;

/// Appends one entry to `builder`, deriving its tar header from a
/// [`FileReference`]. Directory entries get the trailing `/` on their
/// recorded name that tar readers expect.
pub fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    file: &dyn FileReference,
) -> Result<(), LayerError> {
    let mut header = tar::Header::new_ustar();
    file.mode().apply_to_tar_header(&mut header);
    header.set_size(if file.is_dir() { 0 } else { file.size() });
    header.set_mtime(file.modtime().max(0) as u64);
    header.set_uid(file.owner().uid);
    header.set_gid(file.owner().gid);
    let _ = header.set_username(&file.owner().uname);
    let _ = header.set_groupname(&file.owner().gname);

    let name = if file.is_dir() {
        format!("{}/", file.fullname())
    } else {
        file.fullname().to_string()
    };
    header.set_path(&name).map_err(LayerError::Io)?;

    if let Some(target) = file.hardlink_target() {
        header.set_entry_type(tar::EntryType::Link);
        header.set_size(0);
        header.set_link_name(target).map_err(LayerError::Io)?;
        header.set_cksum();
        builder
            .append(&header, std::io::empty())
            .map_err(LayerError::Io)?;
        return Ok(());
    }

    if let Some(target) = file.link_target() {
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_link_name(target).map_err(LayerError::Io)?;
        header.set_cksum();
        builder
            .append(&header, std::io::empty())
            .map_err(LayerError::Io)?;
        return Ok(());
    }

    header.set_cksum();
    if file.is_dir() {
        builder
            .append(&header, std::io::empty())
            .map_err(LayerError::Io)?;
    } else {
        let mut content = file.open().map_err(LayerError::Io)?;
        builder.append(&header, &mut content).map_err(LayerError::Io)?;
    }
    Ok(())
}

/// Appends a zero-content whiteout marker entry named `name` inside `dir`
/// (root when `dir` is `None`).
pub fn append_whiteout<W: Write>(
    builder: &mut tar::Builder<W>,
    dir: Option<&str>,
    name: &str,
    mtime: i64,
) -> Result<(), LayerError> {
    let path = match dir {
        Some(dir) => format!("{dir}/{name}"),
        None => name.to_string(),
    };
    let mut header = tar::Header::new_ustar();
    header.set_mode(0o000);
    header.set_size(0);
    header.set_mtime(mtime.max(0) as u64);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_path(&path).map_err(LayerError::Io)?;
    header.set_cksum();
    builder
        .append(&header, std::io::empty())
        .map_err(LayerError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reference::{InMemoryFile, Owner};
    use ocipack_stat_mode::StatMode;
    use std::sync::Arc;

    #[test]
    fn writes_regular_file_entry() {
        let file = InMemoryFile {
            fullname: "a/b.txt".to_string(),
            size: 5,
            mode: StatMode::regular_file(0o644),
            modtime: 100,
            link_target: None,
            hardlink_target: None,
            owner: Owner::default(),
            body: Arc::from(b"hello".as_slice()),
        };
        let mut builder = tar::Builder::new(Vec::new());
        append_entry(&mut builder, &file).unwrap();
        let out = builder.into_inner().unwrap();
        let mut archive = tar::Archive::new(out.as_slice());
        let entries: Vec<_> = archive.entries().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path().unwrap().to_str().unwrap(), "a/b.txt");
    }

    #[test]
    fn directory_entries_get_trailing_slash() {
        let dir = InMemoryFile {
            fullname: "a".to_string(),
            size: 0,
            mode: StatMode::directory(0o755),
            modtime: 0,
            link_target: None,
            hardlink_target: None,
            owner: Owner::default(),
            body: Arc::from(Vec::new().into_boxed_slice()),
        };
        let mut builder = tar::Builder::new(Vec::new());
        append_entry(&mut builder, &dir).unwrap();
        let out = builder.into_inner().unwrap();
        let mut archive = tar::Archive::new(out.as_slice());
        let entries: Vec<_> = archive.entries().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries[0].path().unwrap().to_str().unwrap(), "a/");
    }

    #[test]
    fn hardlink_entries_use_link_entry_type() {
        let file = InMemoryFile {
            fullname: "a/second-name".to_string(),
            size: 0,
            mode: StatMode::regular_file(0o644),
            modtime: 0,
            link_target: None,
            hardlink_target: Some("a/first-name".to_string()),
            owner: Owner::default(),
            body: Arc::from(Vec::new().into_boxed_slice()),
        };
        let mut builder = tar::Builder::new(Vec::new());
        append_entry(&mut builder, &file).unwrap();
        let out = builder.into_inner().unwrap();
        let mut archive = tar::Archive::new(out.as_slice());
        let entries: Vec<_> = archive.entries().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries[0].header().entry_type(), tar::EntryType::Link);
        assert_eq!(entries[0].link_name().unwrap().unwrap().to_str().unwrap(), "a/first-name");
    }
}
