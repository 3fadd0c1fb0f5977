#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("tar entry error: {0}")]
    Tar(#[source] std::io::Error),
    #[error("path `{0}` escapes the layer root")]
    PathEscapesRoot(String),
    #[error("i/o error: {0}")]
    Io(#[source] std::io::Error),
}
