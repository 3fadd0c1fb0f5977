use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use fs_err::File;

use ocipack_dir_layer::{build_dir_layer, DirLayerOptions, OwnerOverride};
use ocipack_distribution_filename::WheelFilename;
use ocipack_image::ImageBuilder;
use ocipack_install_wheel::{
    install_wheel, DirectUrlHook, DirectUrlSource, EntryPointScriptHook, ExternalInterpreterCompiler,
    InstalledPackagesHook, PostInstallHook,
};
use ocipack_layer::LayerFs;
use ocipack_platform_tags::{Platform, Scheme, Tags};

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Installs a single wheel into a fresh layer.
    InstallWheel(InstallWheelArgs),
    /// Walks a host directory into a single layer.
    BuildDirLayer(BuildDirLayerArgs),
    /// Squashes an ordered stack of layers into one.
    Squash(SquashArgs),
    /// Appends layers onto a base image and writes an OCI layout.
    AssembleImage(AssembleImageArgs),
}

pub(crate) fn run(command: Command) -> Result<()> {
    match command {
        Command::InstallWheel(args) => install_wheel_command(args),
        Command::BuildDirLayer(args) => build_dir_layer_command(args),
        Command::Squash(args) => squash_command(args),
        Command::AssembleImage(args) => assemble_image_command(args),
    }
}

fn write_layer<W: Write>(layer: &LayerFs, writer: W) -> Result<()> {
    let mut builder = tar::Builder::new(writer);
    for file in &layer.files {
        ocipack_layer::append_entry(&mut builder, file).context("write layer entry")?;
    }
    for whiteout in &layer.whiteouts {
        let name = match &whiteout.target {
            ocipack_layer::WhiteoutTarget::Opaque => ocipack_layer::OPAQUE_WHITEOUT_NAME.to_string(),
            ocipack_layer::WhiteoutTarget::Named(name) => format!("{}{name}", ocipack_layer::WHITEOUT_PREFIX),
        };
        ocipack_layer::append_whiteout(&mut builder, whiteout.dir.as_deref(), &name, 0).context("write whiteout")?;
    }
    builder.into_inner().context("finish layer tar")?;
    Ok(())
}

fn output_writer(path: &Option<PathBuf>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(File::create(path)?)),
        None => Ok(Box::new(io::stdout())),
    }
}

#[derive(Args)]
pub(crate) struct InstallWheelArgs {
    /// Path to the `.whl` archive to install.
    wheel: PathBuf,
    /// Write the resulting layer here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "/usr/lib/python3/site-packages")]
    purelib: PathBuf,
    #[arg(long, default_value = "/usr/lib/python3/site-packages")]
    platlib: PathBuf,
    #[arg(long, default_value = "/usr/include")]
    headers: PathBuf,
    #[arg(long, default_value = "/usr/bin")]
    scripts: PathBuf,
    #[arg(long, default_value = "/")]
    data: PathBuf,

    #[arg(long, default_value = "/usr/bin/python3")]
    console_shebang: String,
    #[arg(long, default_value = "")]
    graphical_shebang: String,

    #[arg(long, default_value_t = 0)]
    uid: u32,
    #[arg(long, default_value_t = 0)]
    gid: u32,
    #[arg(long, default_value = "root")]
    uname: String,
    #[arg(long, default_value = "root")]
    gname: String,

    /// `major.minor`, e.g. `3.12`.
    #[arg(long, default_value = "3.12")]
    python_version: String,
    #[arg(long, default_value_t = 0)]
    interpreter_magic_number: u32,
    /// Repeatable `python-abi-platform` compatibility tag, e.g. `cp312-cp312-manylinux_2_28_x86_64`.
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Interpreter to shell out to for `.pyc` precompilation.
    #[arg(long)]
    interpreter: Option<PathBuf>,
    /// Skip the `RECORD` hash/size integrity check.
    #[arg(long)]
    skip_hashes: bool,
    /// Clamp every emitted timestamp to at least this Unix time.
    #[arg(long)]
    min_time: Option<i64>,
    /// Clamp every emitted timestamp to at most this Unix time.
    #[arg(long)]
    max_time: Option<i64>,

    #[arg(long, default_value = "ocipack")]
    installer: String,
    /// Records `direct_url.json` pointing at this URL instead of a local-archive origin.
    #[arg(long)]
    direct_url: Option<String>,
}

fn install_wheel_command(args: InstallWheelArgs) -> Result<()> {
    let filename_text = args
        .wheel
        .file_name()
        .context("wheel path has no filename")?
        .to_string_lossy()
        .into_owned();
    let filename = WheelFilename::from_str(&filename_text)
        .with_context(|| format!("parse wheel filename `{filename_text}`"))?;

    let (major, minor) = args
        .python_version
        .split_once('.')
        .context("--python-version must be `major.minor`")?;
    let python_version = (major.parse()?, minor.parse()?);

    let tags: Vec<(String, String, String)> = args
        .tags
        .iter()
        .map(|raw| {
            let mut parts = raw.splitn(3, '-');
            let python = parts.next().unwrap_or_default().to_string();
            let abi = parts.next().unwrap_or_default().to_string();
            let platform = parts.next().unwrap_or_default().to_string();
            (python, abi, platform)
        })
        .collect();

    let compiler = Arc::new(ExternalInterpreterCompiler::new(
        args.interpreter.unwrap_or_else(|| PathBuf::from("python3")),
    ));

    let platform = Platform::new(
        args.console_shebang,
        args.graphical_shebang,
        Scheme {
            purelib: args.purelib,
            platlib: args.platlib,
            headers: args.headers,
            scripts: args.scripts,
            data: args.data,
        },
        args.uid,
        args.gid,
        args.uname,
        args.gname,
        python_version,
        args.interpreter_magic_number,
        Tags::new(tags),
        compiler,
    )
    .context("build target platform")?;

    let mut hooks: Vec<Box<dyn PostInstallHook>> = vec![Box::new(EntryPointScriptHook)];
    hooks.push(Box::new(DirectUrlHook {
        source: match args.direct_url {
            Some(url) => DirectUrlSource::Url { url },
            None => DirectUrlSource::LocalArchive { path: args.wheel.to_string_lossy().into_owned() },
        },
    }));
    hooks.push(Box::new(InstalledPackagesHook { installer: args.installer }));

    let reader = File::open(&args.wheel).with_context(|| format!("open wheel `{}`", args.wheel.display()))?;
    let layer = install_wheel(reader, &filename, &platform, args.min_time, args.max_time, !args.skip_hashes, &hooks)
        .context("install wheel")?;

    write_layer(&layer, output_writer(&args.output)?).context("write installed layer")
}

#[derive(Args)]
pub(crate) struct BuildDirLayerArgs {
    /// Host directory to walk.
    root: PathBuf,
    /// Write the resulting layer here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Clamp every emitted timestamp (mtime) to at most this Unix time.
    #[arg(long, default_value_t = i64::MAX)]
    max_time: i64,
    /// Root every emitted path, including synthesized parent directories, under this path.
    #[arg(long)]
    prefix: Option<String>,
    #[arg(long)]
    owner_uid: Option<u64>,
    #[arg(long)]
    owner_gid: Option<u64>,
    #[arg(long)]
    owner_uname: Option<String>,
    #[arg(long)]
    owner_gname: Option<String>,
}

fn build_dir_layer_command(args: BuildDirLayerArgs) -> Result<()> {
    let opts = DirLayerOptions {
        max_time: args.max_time,
        owner: OwnerOverride {
            uid: args.owner_uid,
            gid: args.owner_gid,
            uname: args.owner_uname,
            gname: args.owner_gname,
        },
        prefix: args.prefix,
        ..Default::default()
    };
    let layer = build_dir_layer(&args.root, &opts).with_context(|| format!("walk `{}`", args.root.display()))?;
    write_layer(&layer, output_writer(&args.output)?).context("write directory layer")
}

#[derive(Args)]
pub(crate) struct SquashArgs {
    /// Layer tars, oldest first.
    #[arg(required = true)]
    layers: Vec<PathBuf>,
    /// Write the squashed layer here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn squash_command(args: SquashArgs) -> Result<()> {
    let readers = args
        .layers
        .iter()
        .map(File::open)
        .collect::<Result<Vec<_>, _>>()
        .context("open layer tar")?;
    ocipack_squash::squash_tars(readers, output_writer(&args.output)?).context("squash layers")
}

#[derive(Args)]
pub(crate) struct AssembleImageArgs {
    /// Layer tars to append, oldest first.
    #[arg(long = "layer", required = true)]
    layers: Vec<PathBuf>,
    /// An existing OCI image layout tarball to append onto.
    #[arg(long)]
    base: Option<PathBuf>,
    /// Write the resulting OCI image layout tarball here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    entrypoint: Vec<String>,
    #[arg(long)]
    cmd: Vec<String>,
    #[arg(long = "env")]
    env: Vec<String>,
    #[arg(long)]
    working_dir: Option<String>,
    #[arg(long)]
    user: Option<String>,
}

fn assemble_image_command(args: AssembleImageArgs) -> Result<()> {
    let mut builder = match &args.base {
        Some(path) => {
            let reader = File::open(path).with_context(|| format!("open base image `{}`", path.display()))?;
            ImageBuilder::new(Some(reader)).context("load base image")?
        }
        None => ImageBuilder::new::<fs_err::File>(None).context("start fresh image")?,
    };

    for layer_path in &args.layers {
        let mut reader = File::open(layer_path).with_context(|| format!("open layer `{}`", layer_path.display()))?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let layer = LayerFs::from_tar(io::Cursor::new(bytes)).with_context(|| format!("parse layer `{}`", layer_path.display()))?;
        builder.append_layer(&layer).context("append layer")?;
    }

    if !args.entrypoint.is_empty() || !args.cmd.is_empty() || !args.env.is_empty() || args.working_dir.is_some() || args.user.is_some() {
        builder.apply_config_mutation(|config| {
            if !args.entrypoint.is_empty() {
                config.config.entrypoint = args.entrypoint;
            }
            if !args.cmd.is_empty() {
                config.config.cmd = args.cmd;
            }
            if !args.env.is_empty() {
                config.config.env = args.env;
            }
            if let Some(working_dir) = args.working_dir {
                config.config.working_dir = working_dir;
            }
            if let Some(user) = args.user {
                config.config.user = user;
            }
        });
    }

    builder.write(output_writer(&args.output)?).context("write image layout")
}
