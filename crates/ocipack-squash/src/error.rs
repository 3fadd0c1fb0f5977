#[derive(Debug, thiserror::Error)]
pub enum SquashError {
    #[error(transparent)]
    Layer(#[from] ocipack_layer::LayerError),
    #[error("path does not exist: {0}")]
    NotExist(String),
    #[error("not a directory: {0}")]
    NotDir(String),
    #[error("symlink loop resolving: {0}")]
    Loop(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
