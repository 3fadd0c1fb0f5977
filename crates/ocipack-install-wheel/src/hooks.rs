use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize as _;
use serde_json::ser::{CompactFormatter, Formatter};
use serde_json::{Map, Value};

use crate::error::WheelError;
use crate::record::{encoded_sha256, write_record, RecordEntry};
use crate::script::{scripts_from_entry_points, script_launcher};
use crate::staged::StagedFile;

/// Shared context every [`PostInstallHook`] sees: the clamp time to stamp
/// synthesized files with, where the installed `.dist-info` directory
/// lives, where console/GUI scripts are written, and the shebangs to use
/// for freshly generated launchers.
pub struct InstallContext {
    pub clamp_time: i64,
    pub dist_info_path: String,
    pub scripts_dir: String,
    pub console_shebang: String,
    pub graphical_shebang: String,
}

/// A step that runs after the archive's own files are staged but before
/// parent directories are synthesized: generates entry-point launcher
/// scripts, records provenance, or writes the final `RECORD`.
pub trait PostInstallHook: fmt::Debug + Send + Sync {
    fn run(&self, ctx: &InstallContext, files: &mut BTreeMap<String, StagedFile>) -> Result<(), WheelError>;
}

/// Generates a launcher script under `scripts_dir` for every
/// `console_scripts`/`gui_scripts` entry point declared in
/// `entry_points.txt`.
#[derive(Debug, Clone, Default)]
pub struct EntryPointScriptHook;

impl PostInstallHook for EntryPointScriptHook {
    fn run(&self, ctx: &InstallContext, files: &mut BTreeMap<String, StagedFile>) -> Result<(), WheelError> {
        let entry_points_path = format!("{}/entry_points.txt", ctx.dist_info_path);
        let Some(staged) = files.get(&entry_points_path) else {
            return Ok(());
        };
        let text = String::from_utf8_lossy(&staged.body).into_owned();
        let (console_scripts, gui_scripts) = scripts_from_entry_points(&text, None)?;

        for (scripts, shebang) in [(console_scripts, &ctx.console_shebang), (gui_scripts, &ctx.graphical_shebang)] {
            for script in scripts {
                let launcher = script_launcher(&script.module, script.import_name(), shebang);
                let path = format!("{}/{}", ctx.scripts_dir, script.script_name);
                files.insert(
                    path,
                    StagedFile { body: launcher.into_bytes(), mode: 0o755, mtime: ctx.clamp_time, link_target: None, is_dir: false },
                );
            }
        }
        Ok(())
    }
}

/// Where a wheel's provenance was recorded from, for `direct_url.json`.
#[derive(Debug, Clone)]
pub enum DirectUrlSource {
    /// Installed straight from a `file://` or registry URL.
    Url { url: String },
    /// Installed from a local archive path, with no remote origin.
    LocalArchive { path: String },
}

/// Writes `{dist-info}/direct_url.json`, matching CPython's
/// `json.dumps(obj, sort_keys=True)` byte-for-byte: sorted keys and
/// `", "`/`": "` separators.
#[derive(Debug, Clone)]
pub struct DirectUrlHook {
    pub source: DirectUrlSource,
}

impl PostInstallHook for DirectUrlHook {
    fn run(&self, ctx: &InstallContext, files: &mut BTreeMap<String, StagedFile>) -> Result<(), WheelError> {
        let mut obj = Map::new();
        match &self.source {
            DirectUrlSource::Url { url } => {
                obj.insert("url".to_string(), Value::String(url.clone()));
            }
            DirectUrlSource::LocalArchive { path } => {
                obj.insert("url".to_string(), Value::String(format!("file://{path}")));
                let mut info = Map::new();
                info.insert("editable".to_string(), Value::Bool(false));
                obj.insert("archive_info".to_string(), Value::Object(info));
            }
        }

        let json = to_python_json(&Value::Object(obj))?;
        files.insert(
            format!("{}/direct_url.json", ctx.dist_info_path),
            StagedFile { body: json.into_bytes(), mode: 0o644, mtime: ctx.clamp_time, link_target: None, is_dir: false },
        );
        Ok(())
    }
}

/// Serializes like CPython's `json.dumps(value, sort_keys=True)`:
/// `serde_json::Map` is already `BTreeMap`-backed (no `preserve_order`
/// feature enabled), so keys sort themselves — only the separators need
/// overriding from the compact formatter's bare `,`/`:`.
fn to_python_json(value: &Value) -> Result<String, WheelError> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PySeparatorFormatter::default());
    value.serialize(&mut serializer).map_err(|err| WheelError::Record(err.to_string()))?;
    String::from_utf8(buf).map_err(|err| WheelError::Record(err.to_string()))
}

#[derive(Default)]
struct PySeparatorFormatter(CompactFormatter);

impl Formatter for PySeparatorFormatter {
    fn begin_object_key<W: ?Sized + std::io::Write>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()> {
        if !first {
            writer.write_all(b", ")?;
        }
        self.0.begin_object_key(writer, true)
    }

    fn begin_object_value<W: ?Sized + std::io::Write>(&mut self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(b": ")
    }

    fn begin_array_value<W: ?Sized + std::io::Write>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()> {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }
}

/// Writes `{dist-info}/INSTALLER` and the final `{dist-info}/RECORD`:
/// every non-directory entry in `files`, as
/// `(relative path from dist-info's parent, hash, size)`, sorted by path.
/// Must run last among the post-install hooks so it sees every file the
/// others produced.
#[derive(Debug, Clone)]
pub struct InstalledPackagesHook {
    pub installer: String,
}

impl PostInstallHook for InstalledPackagesHook {
    fn run(&self, ctx: &InstallContext, files: &mut BTreeMap<String, StagedFile>) -> Result<(), WheelError> {
        files.insert(
            format!("{}/INSTALLER", ctx.dist_info_path),
            StagedFile {
                body: format!("{}\n", self.installer).into_bytes(),
                mode: 0o644,
                mtime: ctx.clamp_time,
                link_target: None,
                is_dir: false,
            },
        );

        let base_dir = ctx.dist_info_path.rsplit_once('/').map_or("", |(parent, _)| parent);
        let record_path = format!("{}/RECORD", ctx.dist_info_path);

        let mut entries: Vec<RecordEntry> = files
            .iter()
            .filter(|(path, staged)| !staged.is_dir && path.as_str() != record_path)
            .map(|(path, staged)| {
                let relative = relative_from(base_dir, path);
                if staged.link_target.is_some() {
                    RecordEntry { path: relative, hash: None, size: None }
                } else {
                    RecordEntry {
                        path: relative,
                        hash: Some(encoded_sha256(&staged.body)),
                        size: Some(staged.body.len() as u64),
                    }
                }
            })
            .collect();
        entries.push(RecordEntry { path: relative_from(base_dir, &record_path), hash: None, size: None });
        entries.sort();

        let mut buf = Vec::new();
        write_record(&mut buf, &entries)?;
        files.insert(
            record_path,
            StagedFile { body: buf, mode: 0o644, mtime: ctx.clamp_time, link_target: None, is_dir: false },
        );
        Ok(())
    }
}

/// Diffs `path` against `base_dir`, both forward-slash root-relative
/// strings with no leading slash, producing the `../`-prefixed form RECORD
/// uses for files installed outside the `.dist-info`'s parent tree.
fn relative_from(base_dir: &str, path: &str) -> String {
    let base_components: Vec<&str> = if base_dir.is_empty() { Vec::new() } else { base_dir.split('/').collect() };
    let path_components: Vec<&str> = path.split('/').collect();

    let common = base_components
        .iter()
        .zip(path_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = base_components.len() - common;
    let mut out: Vec<&str> = std::iter::repeat("..").take(ups).collect();
    out.extend_from_slice(&path_components[common..]);
    out.join("/")
}
