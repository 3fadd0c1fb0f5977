#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("invalid wheel: {0}")]
    InvalidWheel(String),
    #[error("wheel integrity check failed:\n{}", .0.join("\n"))]
    Integrity(Vec<String>),
    #[error("record file error: {0}")]
    Record(String),
    #[error("bytecode compiler subprocess error: {0}")]
    Bytecode(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("bytecode compilation failed: {0}")]
    Compile(#[from] ocipack_platform_tags::PlatformError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Wraps any step-local failure with the name of the install step it
    /// occurred in.
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<WheelError>,
    },
}

impl WheelError {
    pub fn step(step: &'static str, source: WheelError) -> Self {
        Self::Step { step, source: Box::new(source) }
    }
}
