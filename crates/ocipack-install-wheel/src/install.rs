use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use data_encoding::BASE64URL_NOPAD;
use ocipack_distribution_filename::WheelFilename;
use ocipack_layer::{InMemoryFile, LayerFs, Owner};
use ocipack_platform_tags::Platform;
use ocipack_stat_mode::StatMode;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::WheelError;
use crate::hooks::{InstallContext, PostInstallHook};
use crate::record::{read_record, RecordEntry};
use crate::staged::StagedFile;
use crate::wheel_file::{RootIsPurelib, WheelMetadata};

/// Runs the full wheel install pipeline — verify, route, rewrite, compile,
/// record — and returns the resulting single-layer filesystem.
/// `min_time`/`max_time` of
/// `None` or `0` fall back to the archive's own timestamps (or the
/// reproducibility clock if those are unavailable — see
/// `compute_max_time`).
pub fn install_wheel<R: Read + Seek>(
    reader: R,
    filename: &WheelFilename,
    platform: &Platform,
    min_time: Option<i64>,
    max_time: Option<i64>,
    verify_hashes: bool,
    hooks: &[Box<dyn PostInstallHook>],
) -> Result<LayerFs, WheelError> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|err| WheelError::step("open archive", WheelError::from(err)))?;

    // Step 4: locate .dist-info.
    let dist_info_name =
        find_dist_info(&mut archive).map_err(|err| WheelError::step("locate .dist-info directory", err))?;

    // Step 2: integrity check.
    let record_path = format!("{dist_info_name}/RECORD");
    let record_entries = read_zip_record(&mut archive, &record_path)
        .map_err(|err| WheelError::step("read RECORD", err))?;
    if verify_hashes {
        verify_integrity(&mut archive, &record_path, &record_entries)
            .map_err(|err| WheelError::step("integrity check", err))?;
    }

    // Step 3: compute maxTime.
    let max_time = compute_max_time(max_time, &mut archive);
    let min_time = min_time.unwrap_or(0);

    // Step 5: parse WHEEL.
    let wheel_text = read_zip_text(&mut archive, &format!("{dist_info_name}/WHEEL"))
        .map_err(|err| WheelError::step("parse WHEEL", err))?;
    let wheel_meta = WheelMetadata::parse(&wheel_text).map_err(|err| WheelError::step("parse WHEEL", err))?;
    let dest_root_key = match wheel_meta.root_is_purelib {
        RootIsPurelib::Purelib => "purelib",
        RootIsPurelib::Platlib => "platlib",
    };
    let dest_root = sanitize_scheme_path(
        platform
            .scheme
            .by_key(dest_root_key)
            .expect("purelib/platlib are always present in Scheme"),
    );

    // Step 6: stage unpack.
    let mut files = stage_unpack(&mut archive, &dest_root, min_time)
        .map_err(|err| WheelError::step("stage unpack", err))?;

    // Step 7: spread .data/ subtrees.
    let data_dir_name = format!("{}-{}.data", filename.name.as_dist_info_name(), filename.version);
    spread_data_subtrees(&mut files, &dest_root, &data_dir_name, platform)
        .map_err(|err| WheelError::step("spread .data subtrees", err))?;

    // Step 8: rewrite shebangs.
    let scripts_dir = sanitize_scheme_path(&platform.scheme.scripts);
    rewrite_shebangs(&mut files, &scripts_dir, platform);

    // Step 9: discard incoming RECORD(.jws/.p7s).
    let dist_info_path = format!("{dest_root}/{dist_info_name}");
    discard_incoming_record(&mut files, &dist_info_path);

    // Step 10: discard empty .data root — a no-op here since step 6 never
    // materializes directory entries in the first place (see DESIGN.md).

    // Step 11: compile .py to .pyc.
    compile_py_files(&mut files, platform, max_time).map_err(|err| WheelError::step("compile bytecode", err))?;

    // Step 12: post-install hooks.
    let ctx = InstallContext {
        clamp_time: max_time,
        dist_info_path: dist_info_path.clone(),
        scripts_dir,
        console_shebang: platform.console_shebang.clone(),
        graphical_shebang: platform.graphical_shebang.clone(),
    };
    for hook in hooks {
        hook.run(&ctx, &mut files).map_err(|err| WheelError::step("post-install hooks", err))?;
    }

    // Step 13: synthesize parent directories.
    synthesize_parent_dirs(&mut files, max_time);

    // Steps 14-15: apply ownership and emit.
    Ok(build_layer_fs(files, platform))
}

fn sanitize_scheme_path(path: &Path) -> String {
    path.to_string_lossy().trim_start_matches('/').to_string()
}

fn find_dist_info<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String, WheelError> {
    let mut found: Option<String> = None;
    for name in archive.file_names() {
        let Some(top) = name.split('/').next() else { continue };
        if !top.ends_with(".dist-info") {
            continue;
        }
        match &found {
            None => found = Some(top.to_string()),
            Some(existing) if existing == top => {}
            Some(existing) => {
                return Err(WheelError::InvalidWheel(format!(
                    "multiple .dist-info directories: `{existing}` and `{top}`"
                )));
            }
        }
    }
    found.ok_or_else(|| WheelError::InvalidWheel("missing .dist-info directory".to_string()))
}

fn read_zip_text<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, path: &str) -> Result<String, WheelError> {
    let mut file = archive.by_name(path)?;
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(WheelError::Io)?;
    Ok(text)
}

fn read_zip_record<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    record_path: &str,
) -> Result<Vec<RecordEntry>, WheelError> {
    let file = archive.by_name(record_path)?;
    read_record(file)
}

/// Step 2: every archive member not named `RECORD`/`RECORD.jws`/`RECORD.p7s`
/// must match its recorded hash and size; every such member must be listed
/// in `RECORD`, and every `RECORD` entry must exist in the archive. Errors
/// accumulate rather than failing on the first mismatch.
fn verify_integrity<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    record_path: &str,
    record: &[RecordEntry],
) -> Result<(), WheelError> {
    let is_signature = |name: &str| {
        name == record_path || name == format!("{record_path}.jws") || name == format!("{record_path}.p7s")
    };
    let recorded: BTreeMap<&str, &RecordEntry> = record.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut errors = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        if is_signature(&name) {
            continue;
        }
        seen.insert(name.clone());

        let Some(entry) = recorded.get(name.as_str()) else {
            errors.push(format!("{name}: present in archive but not listed in RECORD"));
            continue;
        };

        let mut content = Vec::new();
        file.read_to_end(&mut content).map_err(WheelError::Io)?;

        if let Some(expected_size) = entry.size {
            if expected_size != content.len() as u64 {
                errors.push(format!(
                    "{name}: size mismatch (RECORD says {expected_size}, archive has {})",
                    content.len()
                ));
            }
        }
        if let Some(hash) = &entry.hash {
            match verify_hash(hash, &content) {
                Ok(true) => {}
                Ok(false) => errors.push(format!("{name}: hash mismatch")),
                Err(err) => errors.push(format!("{name}: {err}")),
            }
        }
    }

    for entry in record {
        if is_signature(&entry.path) || seen.contains(&entry.path) {
            continue;
        }
        errors.push(format!("{}: listed in RECORD but missing from archive", entry.path));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(WheelError::Integrity(errors))
    }
}

fn verify_hash(recorded: &str, content: &[u8]) -> Result<bool, String> {
    let (algorithm, expected) =
        recorded.split_once('=').ok_or_else(|| format!("malformed hash field `{recorded}`"))?;
    let digest: Vec<u8> = match algorithm {
        "sha256" => Sha256::digest(content).to_vec(),
        "sha384" => Sha384::digest(content).to_vec(),
        "sha512" => Sha512::digest(content).to_vec(),
        other => return Err(format!("unsupported hash algorithm `{other}`")),
    };
    Ok(BASE64URL_NOPAD.encode(&digest) == expected)
}

/// Step 3. `requested` of `None`/`0` means "derive from the archive": one
/// second beyond the newest entry's timestamp, falling back to the
/// reproducibility clock if no entry carries a usable timestamp.
fn compute_max_time<R: Read + Seek>(requested: Option<i64>, archive: &mut zip::ZipArchive<R>) -> i64 {
    if let Some(time) = requested.filter(|&t| t != 0) {
        return time;
    }
    match newest_entry_unix_time(archive) {
        Some(newest) => ocipack_clock::one_second_after(newest),
        None => ocipack_clock::Clock.now_unix(),
    }
}

fn newest_entry_unix_time<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Option<i64> {
    let mut newest: Option<i64> = None;
    for i in 0..archive.len() {
        let Ok(file) = archive.by_index(i) else { continue };
        if let Some(seconds) = entry_unix_time(file.last_modified()) {
            newest = Some(newest.map_or(seconds, |n: i64| n.max(seconds)));
        }
    }
    newest
}

fn entry_unix_time(mtime: Option<zip::DateTime>) -> Option<i64> {
    let dt = mtime?;
    let datetime = jiff::civil::DateTime::new(
        dt.year() as i16,
        dt.month() as i8,
        dt.day() as i8,
        dt.hour() as i8,
        dt.minute() as i8,
        dt.second() as i8,
        0,
    )
    .ok()?;
    datetime.to_zoned(jiff::tz::TimeZone::UTC).ok().map(|zoned| zoned.timestamp().as_second())
}

/// Step 6: place every non-directory archive entry at `{dest_root}/{name}`,
/// clamping its mtime to `min_time` when that floor is non-zero.
fn stage_unpack<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    dest_root: &str,
    min_time: i64,
) -> Result<BTreeMap<String, StagedFile>, WheelError> {
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(WheelError::InvalidWheel(format!("unsafe archive member path `{}`", entry.name())));
        };
        let name = enclosed.to_string_lossy().replace('\\', "/");
        let mode = StatMode::from_bits(entry.unix_mode().unwrap_or(0o100644));
        let raw_mtime = entry_unix_time(entry.last_modified()).unwrap_or(0);
        let mtime = if min_time != 0 { raw_mtime.max(min_time) } else { raw_mtime };

        let mut body = Vec::new();
        entry.read_to_end(&mut body).map_err(WheelError::Io)?;

        let link_target = if mode.is_symlink() {
            let target = String::from_utf8_lossy(&body).into_owned();
            body.clear();
            Some(target)
        } else {
            None
        };

        files.insert(
            format!("{dest_root}/{name}"),
            StagedFile { body, mode: mode.permissions(), mtime, link_target, is_dir: false },
        );
    }
    Ok(files)
}

/// Step 7: move every file under `{dest_root}/{data_dir_name}/{key}/...` to
/// `{scheme[key]}/...`.
fn spread_data_subtrees(
    files: &mut BTreeMap<String, StagedFile>,
    dest_root: &str,
    data_dir_name: &str,
    platform: &Platform,
) -> Result<(), WheelError> {
    let prefix = format!("{dest_root}/{data_dir_name}/");
    let mut moves = Vec::new();

    for key in files.keys() {
        let Some(rest) = key.strip_prefix(&prefix) else { continue };
        let Some((data_key, path_in_key)) = rest.split_once('/') else {
            return Err(WheelError::InvalidWheel(format!(
                "`{key}` sits directly under `.data` with no scheme subdirectory"
            )));
        };
        let scheme_path = platform
            .scheme
            .by_key(data_key)
            .ok_or_else(|| WheelError::InvalidWheel(format!("unknown `.data` scheme key `{data_key}`")))?;
        moves.push((key.clone(), format!("{}/{path_in_key}", sanitize_scheme_path(scheme_path))));
    }

    for (old, new) in moves {
        if let Some(staged) = files.remove(&old) {
            files.insert(new, staged);
        }
    }
    Ok(())
}

/// Step 8: a `scripts`-typed file whose first line is exactly `#!python`
/// or `#!pythonw` gets its shebang replaced and execute bits added.
fn rewrite_shebangs(files: &mut BTreeMap<String, StagedFile>, scripts_dir: &str, platform: &Platform) {
    let prefix = format!("{scripts_dir}/");
    for (path, staged) in files.iter_mut() {
        if !path.starts_with(&prefix) {
            continue;
        }
        let first_line_end = staged.body.iter().position(|&b| b == b'\n').unwrap_or(staged.body.len());
        let first_line = &staged.body[..first_line_end];

        let shebang = if first_line == b"#!pythonw" {
            Some(&platform.graphical_shebang)
        } else if first_line == b"#!python" {
            Some(&platform.console_shebang)
        } else {
            None
        };

        if let Some(shebang) = shebang {
            let mut rewritten = shebang.clone().into_bytes();
            rewritten.push(b'\n');
            rewritten.extend_from_slice(&staged.body[first_line_end.min(staged.body.len())..].strip_prefix_newline());
            staged.body = rewritten;
            staged.mode |= 0o111;
        }
    }
}

trait StripLeadingNewline {
    fn strip_prefix_newline(&self) -> &[u8];
}

impl StripLeadingNewline for [u8] {
    fn strip_prefix_newline(&self) -> &[u8] {
        self.strip_prefix(b"\n").unwrap_or(self)
    }
}

fn discard_incoming_record(files: &mut BTreeMap<String, StagedFile>, dist_info_path: &str) {
    for suffix in ["RECORD", "RECORD.jws", "RECORD.p7s"] {
        files.remove(&format!("{dist_info_path}/{suffix}"));
    }
}

/// Step 11: compile every staged `.py` file to `.pyc` via the platform's
/// compiler, staging into a scratch directory that mirrors the final
/// in-layer relative layout so the emitted `.pyc`'s embedded source path
/// matches it exactly.
fn compile_py_files(files: &mut BTreeMap<String, StagedFile>, platform: &Platform, source_date_epoch: i64) -> Result<(), WheelError> {
    let py_paths: Vec<String> = files.keys().filter(|path| path.ends_with(".py")).cloned().collect();
    if py_paths.is_empty() {
        return Ok(());
    }

    let workdir = tempfile::tempdir().map_err(WheelError::Io)?;
    for path in &py_paths {
        let staged = &files[path];
        let dest = workdir.path().join(path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(WheelError::Io)?;
        }
        std::fs::write(&dest, &staged.body).map_err(WheelError::Io)?;
        if let Ok(file) = std::fs::File::open(&dest) {
            let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_secs(staged.mtime.max(0) as u64);
            let _ = file.set_modified(mtime);
        }
    }

    let python_path = vec![platform.scheme.purelib.clone(), platform.scheme.platlib.clone()];
    platform.compiler.compile(workdir.path(), &python_path, source_date_epoch)?;

    for entry in walkdir::WalkDir::new(workdir.path()) {
        let entry = entry.map_err(|err| WheelError::Bytecode(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_none_or(|ext| ext != "pyc") {
            continue;
        }
        let rel = entry.path().strip_prefix(workdir.path()).expect("walkdir yields descendants of workdir");
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let body = std::fs::read(entry.path()).map_err(WheelError::Io)?;
        files.insert(rel_str, StagedFile { body, mode: 0o644, mtime: source_date_epoch, link_target: None, is_dir: false });
    }
    Ok(())
}

/// Step 13: every ancestor directory of every file becomes a `0755`
/// directory entry stamped with `max_time`.
fn synthesize_parent_dirs(files: &mut BTreeMap<String, StagedFile>, max_time: i64) {
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    for path in files.keys() {
        let mut current = path.as_str();
        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            if current.is_empty() {
                break;
            }
            dirs.insert(current.to_string());
        }
    }
    for dir in dirs {
        files.entry(dir).or_insert_with(|| StagedFile {
            body: Vec::new(),
            mode: 0o755,
            mtime: max_time,
            link_target: None,
            is_dir: true,
        });
    }
}

fn build_layer_fs(files: BTreeMap<String, StagedFile>, platform: &Platform) -> LayerFs {
    let owner = Owner {
        uid: u64::from(platform.uid),
        gid: u64::from(platform.gid),
        uname: platform.uname.clone(),
        gname: platform.gname.clone(),
    };

    let mut layer = LayerFs::default();
    for (path, staged) in files {
        let mode = if staged.is_dir {
            StatMode::directory(staged.mode)
        } else if staged.link_target.is_some() {
            StatMode::symlink()
        } else {
            StatMode::regular_file(staged.mode)
        };

        layer.files.push(InMemoryFile {
            fullname: path,
            size: staged.body.len() as u64,
            mode,
            modtime: staged.mtime,
            link_target: staged.link_target,
            hardlink_target: None,
            owner: owner.clone(),
            body: Arc::from(staged.body.into_boxed_slice()),
        });
    }
    layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_absolute_scheme_path() {
        assert_eq!(sanitize_scheme_path(Path::new("/usr/lib/site-packages")), "usr/lib/site-packages");
    }

    #[test]
    fn spreads_data_subtree_into_scheme_path() {
        let mut files = BTreeMap::new();
        files.insert(
            "usr/lib/site-packages/foo-1.0.data/scripts/foo".to_string(),
            StagedFile { body: b"x".to_vec(), mode: 0o644, mtime: 0, link_target: None, is_dir: false },
        );
        let platform = test_platform();
        spread_data_subtrees(&mut files, "usr/lib/site-packages", "foo-1.0.data", &platform).unwrap();
        assert!(files.contains_key("usr/bin/foo"));
        assert!(!files.keys().any(|k| k.contains(".data")));
    }

    #[test]
    fn rejects_unknown_data_scheme_key() {
        let mut files = BTreeMap::new();
        files.insert(
            "usr/lib/site-packages/foo-1.0.data/bogus/x".to_string(),
            StagedFile { body: Vec::new(), mode: 0o644, mtime: 0, link_target: None, is_dir: false },
        );
        let platform = test_platform();
        let err = spread_data_subtrees(&mut files, "usr/lib/site-packages", "foo-1.0.data", &platform).unwrap_err();
        assert!(matches!(err, WheelError::InvalidWheel(_)));
    }

    #[test]
    fn rewrites_placeholder_shebang_and_sets_execute_bits() {
        let mut files = BTreeMap::new();
        files.insert(
            "usr/bin/foo".to_string(),
            StagedFile { body: b"#!python\nprint(1)\n".to_vec(), mode: 0o644, mtime: 0, link_target: None, is_dir: false },
        );
        let platform = test_platform();
        rewrite_shebangs(&mut files, "usr/bin", &platform);
        let script = &files["usr/bin/foo"];
        assert!(script.body.starts_with(b"#!/usr/bin/env python3\n"));
        assert_eq!(script.mode & 0o111, 0o111);
    }

    #[test]
    fn leaves_non_placeholder_shebang_untouched() {
        let mut files = BTreeMap::new();
        files.insert(
            "usr/bin/foo".to_string(),
            StagedFile { body: b"#!/bin/sh\necho hi\n".to_vec(), mode: 0o644, mtime: 0, link_target: None, is_dir: false },
        );
        let platform = test_platform();
        rewrite_shebangs(&mut files, "usr/bin", &platform);
        assert_eq!(files["usr/bin/foo"].body, b"#!/bin/sh\necho hi\n");
    }

    #[test]
    fn synthesizes_every_ancestor_directory() {
        let mut files = BTreeMap::new();
        files.insert(
            "a/b/c.txt".to_string(),
            StagedFile { body: Vec::new(), mode: 0o644, mtime: 5, link_target: None, is_dir: false },
        );
        synthesize_parent_dirs(&mut files, 5);
        assert!(files["a"].is_dir);
        assert!(files["a/b"].is_dir);
        assert!(!files.contains_key("a/b/c.txt".to_string().trim_end_matches(".txt")));
    }

    fn test_platform() -> Platform {
        use ocipack_platform_tags::{PycCompiler, Scheme, Tags};
        use std::path::PathBuf;

        #[derive(Debug)]
        struct NoopCompiler;
        impl PycCompiler for NoopCompiler {
            fn compile(&self, _: &Path, _: &[PathBuf], _: i64) -> Result<(), ocipack_platform_tags::PlatformError> {
                Ok(())
            }
        }

        Platform::new(
            "#!/usr/bin/env python3",
            "#!/usr/bin/env pythonw3",
            Scheme {
                purelib: PathBuf::from("/usr/lib/site-packages"),
                platlib: PathBuf::from("/usr/lib/site-packages"),
                headers: PathBuf::from("/usr/include"),
                scripts: PathBuf::from("/usr/bin"),
                data: PathBuf::from("/usr"),
            },
            0,
            0,
            "root",
            "root",
            (3, 11),
            3495,
            Tags::from_env((3, 11), &["any".to_string()]),
            Arc::new(NoopCompiler),
        )
        .unwrap()
    }
}
