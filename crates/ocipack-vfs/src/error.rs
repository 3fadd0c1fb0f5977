#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    #[error("path does not exist: {0}")]
    NotExist(String),
    #[error("not a directory: {0}")]
    NotDir(String),
    #[error("symlink loop resolving: {0}")]
    Loop(String),
    #[error("handle is closed")]
    Closed,
}

impl From<ocipack_squash::SquashError> for VfsError {
    fn from(err: ocipack_squash::SquashError) -> Self {
        match err {
            ocipack_squash::SquashError::NotExist(p) => Self::NotExist(p),
            ocipack_squash::SquashError::NotDir(p) => Self::NotDir(p),
            ocipack_squash::SquashError::Loop(p) => Self::Loop(p),
            other => Self::NotExist(other.to_string()),
        }
    }
}
