//! Low level CLI over the three core subsystems, mainly used for testing
//! and for composing image-build pipelines out of plain shell commands:
//! `ocipack install-wheel`, `ocipack build-dir-layer`, `ocipack squash`,
//! and `ocipack assemble-image` each read/write ordinary tar files on
//! stdin/stdout or named paths, so they can be piped together without a
//! container runtime or daemon.

mod commands;
mod logging;

use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "ocipack", version, about = "Compose OCI images from wheels, directories, and layers")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    match commands::run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
