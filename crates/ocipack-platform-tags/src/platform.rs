use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::tags::Tags;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("installation scheme path `{0}` for `{1}` is not absolute")]
    SchemeNotAbsolute(PathBuf, &'static str),
    #[error("platform must declare at least one of console_shebang or graphical_shebang")]
    MissingShebang,
    #[error("bytecode compilation failed: {0}")]
    CompileFailed(String),
}

/// The installation-scheme directories a wheel's files are routed into.
/// Every path is absolute.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Scheme {
    pub purelib: PathBuf,
    pub platlib: PathBuf,
    pub headers: PathBuf,
    pub scripts: PathBuf,
    pub data: PathBuf,
}

impl Scheme {
    fn validate(&self) -> Result<(), PlatformError> {
        for (path, key) in [
            (&self.purelib, "purelib"),
            (&self.platlib, "platlib"),
            (&self.headers, "headers"),
            (&self.scripts, "scripts"),
            (&self.data, "data"),
        ] {
            if !path.is_absolute() {
                return Err(PlatformError::SchemeNotAbsolute(path.clone(), key));
            }
        }
        Ok(())
    }

    /// Look up a `.data/{key}` destination by its wheel-recorded key.
    pub fn by_key(&self, key: &str) -> Option<&Path> {
        match key {
            "purelib" => Some(&self.purelib),
            "platlib" => Some(&self.platlib),
            "headers" => Some(&self.headers),
            "scripts" => Some(&self.scripts),
            "data" => Some(&self.data),
            _ => None,
        }
    }
}

/// The bytecode-compilation capability a [`Platform`] exposes: drives an
/// external interpreter to turn `.py` sources rooted at `workdir` into
/// `.pyc` files in place, per PEP 552 deterministic-hash invalidation.
pub trait PycCompiler: fmt::Debug + Send + Sync {
    /// Compiles every `.py` file found under `workdir`, writing each
    /// `.pyc` alongside its source. `python_path` becomes `PYTHONPATH`;
    /// `source_date_epoch` becomes `SOURCE_DATE_EPOCH`.
    fn compile(
        &self,
        workdir: &Path,
        python_path: &[PathBuf],
        source_date_epoch: i64,
    ) -> Result<(), PlatformError>;
}

/// A target description that wheel installation is performed against: where
/// scripts live, who owns installed files, which interpreter they run
/// under, and how to produce bytecode for it.
#[derive(Clone)]
pub struct Platform {
    pub console_shebang: String,
    pub graphical_shebang: String,
    pub scheme: Scheme,
    pub uid: u32,
    pub gid: u32,
    pub uname: String,
    pub gname: String,
    pub python_version: (u8, u8),
    pub interpreter_magic_number: u32,
    pub tags: Tags,
    pub compiler: Arc<dyn PycCompiler>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("console_shebang", &self.console_shebang)
            .field("graphical_shebang", &self.graphical_shebang)
            .field("scheme", &self.scheme)
            .field("python_version", &self.python_version)
            .finish_non_exhaustive()
    }
}

impl Platform {
    /// Constructs a platform, filling in a missing shebang from the other
    /// and validating that every scheme path is absolute.
    ///
    /// At least one of `console_shebang`/`graphical_shebang` must be
    /// non-empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        console_shebang: impl Into<String>,
        graphical_shebang: impl Into<String>,
        scheme: Scheme,
        uid: u32,
        gid: u32,
        uname: impl Into<String>,
        gname: impl Into<String>,
        python_version: (u8, u8),
        interpreter_magic_number: u32,
        tags: Tags,
        compiler: Arc<dyn PycCompiler>,
    ) -> Result<Self, PlatformError> {
        scheme.validate()?;

        let mut console_shebang = console_shebang.into();
        let mut graphical_shebang = graphical_shebang.into();
        if console_shebang.is_empty() && graphical_shebang.is_empty() {
            return Err(PlatformError::MissingShebang);
        }
        if console_shebang.is_empty() {
            console_shebang = graphical_shebang.clone();
        }
        if graphical_shebang.is_empty() {
            graphical_shebang = console_shebang.clone();
        }

        Ok(Self {
            console_shebang,
            graphical_shebang,
            scheme,
            uid,
            gid,
            uname: uname.into(),
            gname: gname.into(),
            python_version,
            interpreter_magic_number,
            tags,
        compiler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(root: &str) -> Scheme {
        Scheme {
            purelib: PathBuf::from(format!("{root}/lib/python3/site-packages")),
            platlib: PathBuf::from(format!("{root}/lib/python3/site-packages")),
            headers: PathBuf::from(format!("{root}/include")),
            scripts: PathBuf::from(format!("{root}/bin")),
            data: PathBuf::from(root),
        }
    }

    #[derive(Debug)]
    struct NoopCompiler;
    impl PycCompiler for NoopCompiler {
        fn compile(&self, _: &Path, _: &[PathBuf], _: i64) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[test]
    fn fills_missing_shebang_from_the_other() {
        let platform = Platform::new(
            "/usr/bin/python3",
            "",
            scheme("/usr"),
            0,
            0,
            "root",
            "root",
            (3, 11),
            3495,
            Tags::from_env((3, 11), &["any".to_string()]),
            Arc::new(NoopCompiler),
        )
        .unwrap();
        assert_eq!(platform.graphical_shebang, "/usr/bin/python3");
    }

    #[test]
    fn rejects_relative_scheme_path() {
        let mut bad_scheme = scheme("/usr");
        bad_scheme.scripts = PathBuf::from("bin");
        let err = Platform::new(
            "/usr/bin/python3",
            "",
            bad_scheme,
            0,
            0,
            "root",
            "root",
            (3, 11),
            3495,
            Tags::from_env((3, 11), &["any".to_string()]),
            Arc::new(NoopCompiler),
        )
        .unwrap_err();
        assert!(matches!(err, PlatformError::SchemeNotAbsolute(_, "scripts")));
    }

    #[test]
    fn rejects_both_shebangs_empty() {
        let err = Platform::new(
            "",
            "",
            scheme("/usr"),
            0,
            0,
            "root",
            "root",
            (3, 11),
            3495,
            Tags::from_env((3, 11), &["any".to_string()]),
            Arc::new(NoopCompiler),
        )
        .unwrap_err();
        assert!(matches!(err, PlatformError::MissingShebang));
    }
}
