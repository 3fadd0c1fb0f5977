#[derive(Debug, thiserror::Error)]
pub enum DirLayerError {
    #[error("walking `{0}`: {1}")]
    Walk(String, #[source] walkdir::Error),
    #[error("reading symlink target of `{0}`: {1}")]
    ReadLink(String, #[source] std::io::Error),
    #[error("reading file `{0}`: {1}")]
    ReadFile(String, #[source] std::io::Error),
    #[error("reading metadata for `{0}`: {1}")]
    Metadata(String, #[source] std::io::Error),
}
