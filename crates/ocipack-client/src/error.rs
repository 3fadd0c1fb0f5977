use ocipack_distribution_filename::{InvalidNameError, WheelFilenameError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("GET {0} returned status {1}")]
    BadStatus(String, u16),
    #[error("request to {0} failed: {1}")]
    Transport(String, Box<ureq::Error>),
    #[error("reading response body from {0} failed: {1}")]
    Io(String, std::io::Error),
    #[error("checksum mismatch for {0}: expected {1}, got {2}")]
    ChecksumMismatch(String, String, String),
    #[error("unsupported hash algorithm `{0}` in URL fragment")]
    UnsupportedHashAlgorithm(String),
    #[error("malformed hash fragment `{0}`")]
    MalformedFragment(String),
    #[error(transparent)]
    InvalidPackageName(#[from] InvalidNameError),
    #[error("failed to parse package index HTML: {0}")]
    HtmlParse(String),
    #[error("missing href attribute on anchor link")]
    MissingHref,
    #[error("repository declares major version {0}, only {1} is supported")]
    UnsupportedRepositoryVersion(u64, u64),
    #[error(transparent)]
    InvalidWheelFilename(#[from] WheelFilenameError),
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}
