use crate::error::VfsError;

/// Validates a path the way the VFS reader requires it, distinct from
/// (and stricter than) the squash engine's tar-entry cleaning: no leading
/// slash, no empty segments (so no leading/trailing/doubled `/`), and no
/// `.`/`..` segments at all — callers are expected to hand over an
/// already-canonical path, not one that needs normalizing.
pub fn validate_path(path: &str) -> Result<(), VfsError> {
    if path.starts_with('/') {
        return Err(VfsError::InvalidPath(path.to_string()));
    }
    if path.is_empty() {
        return Ok(());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(VfsError::InvalidPath(path.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_relative_paths() {
        assert!(validate_path("a/b/c").is_ok());
        assert!(validate_path("").is_ok());
    }

    #[test]
    fn rejects_leading_slash() {
        assert!(validate_path("/a").is_err());
    }

    #[test]
    fn rejects_dot_and_dotdot_segments() {
        assert!(validate_path("a/./b").is_err());
        assert!(validate_path("a/../b").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_path("a//b").is_err());
        assert!(validate_path("a/").is_err());
    }
}
