use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::WheelError;

/// The deterministic environment an external interpreter compiles under:
/// a fixed hash seed (set unconditionally, not carried here), the import
/// path it needs to see the package it is compiling, and the reproducible
/// build clock.
#[derive(Debug, Clone)]
pub struct BytecodeEnv {
    pub python_path: Vec<PathBuf>,
    pub source_date_epoch: i64,
}

const MAX_ATTEMPTS: u32 = 3;

/// Invokes `interpreter -m compileall` against every `.py` file already
/// staged under `workdir`, writing each `.pyc` back into `workdir` in
/// place. `workdir` is passed as both strip-dir and prepend-dir, so a
/// `.pyc`'s embedded source path is relative to `workdir` itself — the
/// caller is expected to have staged files at the relative layout they
/// will occupy in the final layer.
///
/// Retries on a non-zero exit, matching the reference installer's retry
/// count (`bytecode_compile` in `install-wheel-rs`): bytecode compilation
/// has been observed to fail non-deterministically on a freshly-unpacked
/// extension module's first import.
pub fn compile_bytecode(interpreter: &Path, workdir: &Path, env: &BytecodeEnv) -> Result<(), WheelError> {
    let python_path = std::env::join_paths(&env.python_path)
        .map_err(|err| WheelError::Bytecode(format!("invalid PYTHONPATH entry: {err}")))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let status = Command::new(interpreter)
            .arg("-m")
            .arg("compileall")
            .arg("-q")
            .arg("-f")
            .arg("-s")
            .arg(workdir)
            .arg("-p")
            .arg(workdir)
            .arg(workdir)
            .env("PYTHONHASHSEED", "0")
            .env("PYTHONPATH", &python_path)
            .env("SOURCE_DATE_EPOCH", env.source_date_epoch.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| WheelError::Bytecode(format!("failed to spawn {}: {err}", interpreter.display())))?;

        if status.success() {
            return Ok(());
        }
        if attempt >= MAX_ATTEMPTS {
            return Err(WheelError::Bytecode(format!(
                "{} -m compileall exited with {status} after {attempt} attempts",
                interpreter.display()
            )));
        }
        tracing::warn!(attempt, %status, "compileall failed, retrying");
    }
}

/// A [`ocipack_platform_tags::PycCompiler`] that shells out to a real
/// Python interpreter, the concrete strategy `ocipack-cli` wires up by
/// default (as opposed to a test double).
#[derive(Debug, Clone)]
pub struct ExternalInterpreterCompiler {
    pub interpreter: PathBuf,
}

impl ExternalInterpreterCompiler {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self { interpreter: interpreter.into() }
    }
}

impl ocipack_platform_tags::PycCompiler for ExternalInterpreterCompiler {
    fn compile(
        &self,
        workdir: &Path,
        python_path: &[PathBuf],
        source_date_epoch: i64,
    ) -> Result<(), ocipack_platform_tags::PlatformError> {
        let env = BytecodeEnv { python_path: python_path.to_vec(), source_date_epoch };
        compile_bytecode(&self.interpreter, workdir, &env)
            .map_err(|err| ocipack_platform_tags::PlatformError::CompileFailed(err.to_string()))
    }
}
