#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("layer error: {0}")]
    Layer(#[from] ocipack_layer::LayerError),
    #[error("base image is missing `{0}`")]
    MissingEntry(String),
    #[error("base image index has no manifests")]
    EmptyIndex,
    #[error("unsupported base image media type `{0}`")]
    UnsupportedMediaType(String),
}
