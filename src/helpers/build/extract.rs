//! Archive extraction into a library workspace
//!
//! Archives are unpacked into a staging directory next to the workspace and
//! then renamed into place, so an interrupted extraction never leaves a
//! half-populated workspace behind. An archive with a single top-level
//! directory has that directory stripped; anything else is treated as flat.
//!
//! Extraction is native (tar/flate2/bzip2/xz2/zstd/zip) unless the external
//! `tar` or `unzip` tools are requested.

use crate::config::{Config, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::error::{BootstrapError, Result};
use crate::helpers::cmd::ToolCmd;
use crate::helpers::internal::fs_utils::{self, io_context};
use crate::helpers::internal::progress::{self, ProgressGuard};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Archive formats, detected from the last file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
}

impl ArchiveFormat {
    /// Detect the format of `archive` from its filename.
    ///
    /// No extension means zip. `.xz` and `.zst` must wrap a `.tar`.
    pub fn detect(archive: &Path) -> Result<Self> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let path = Path::new(&name);
        let ext = path.extension().and_then(|e| e.to_str());
        let has_tar_stem = path
            .file_stem()
            .and_then(|s| Path::new(s).extension())
            .is_some_and(|e| e == "tar");

        match ext {
            None | Some("zip") => Ok(Self::Zip),
            Some("tar") => Ok(Self::Tar),
            Some("gz") | Some("tgz") => Ok(Self::TarGz),
            Some("bz2") => Ok(Self::TarBz2),
            Some("xz") if has_tar_stem => Ok(Self::TarXz),
            Some("zst") if has_tar_stem => Ok(Self::TarZst),
            Some("xz") | Some("zst") => Err(BootstrapError::extract(format!(
                "{} is not a tar archive; only .tar.{} is supported",
                name,
                ext.unwrap_or_default()
            ))),
            Some(other) => Err(BootstrapError::extract(format!(
                "unsupported archive format .{} ({})",
                other, name
            ))),
        }
    }

    fn is_zip(self) -> bool {
        self == Self::Zip
    }
}

/// Archive extraction strategy.
#[derive(Debug, Clone)]
pub struct Extractor {
    use_tar: bool,
    use_unzip: bool,
    tar: PathBuf,
    unzip: PathBuf,
    timeout: Option<Duration>,
}

impl Default for Extractor {
    /// Native extraction only.
    fn default() -> Self {
        Self {
            use_tar: false,
            use_unzip: false,
            tar: PathBuf::from("tar"),
            unzip: PathBuf::from("unzip"),
            timeout: Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)),
        }
    }
}

impl Extractor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            use_tar: config.use_tar,
            use_unzip: config.use_unzip,
            tar: config.tools.tar.clone(),
            unzip: config.tools.unzip.clone(),
            timeout: config.command_timeout,
        }
    }

    /// Extract `archive` so that its content ends up directly in `target`.
    ///
    /// Any existing `target` directory is removed first.
    pub fn extract(&self, archive: &Path, target: &Path) -> Result<()> {
        let format = ArchiveFormat::detect(archive)?;
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs_utils::ensure_dir(parent)?;

        let filename = archive
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let _spinner = ProgressGuard::new(progress::create_spinner(&format!(
            "extracting {}",
            filename
        )));

        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(parent)
            .map_err(|e| io_context(e, format!("cannot create staging dir in {}", parent.display())))?;

        self.unpack(archive, format, staging.path())?;

        let root = content_root(staging.path())?;
        tracing::debug!(
            "extracted {} into {} (content root {})",
            archive.display(),
            staging.path().display(),
            root.display()
        );
        move_into_place(&root, target)?;
        // A flat archive moved the staging dir itself; dropping the TempDir
        // then finds nothing to clean up.
        drop(staging);
        Ok(())
    }

    fn unpack(&self, archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<()> {
        if format.is_zip() {
            return if self.use_unzip {
                self.run_external(
                    ToolCmd::new(&self.unzip)
                        .arg("-q")
                        .arg(archive)
                        .arg("-d")
                        .arg(dest),
                )
            } else {
                extract_zip(archive, dest)
            };
        }

        match format {
            ArchiveFormat::TarXz | ArchiveFormat::TarZst => {
                // Decompress to a plain .tar next to the staging dir first
                let tar_file = tempfile::Builder::new()
                    .prefix(".decompressed-")
                    .suffix(".tar")
                    .tempfile_in(dest.parent().unwrap_or(dest))
                    .map_err(|e| io_context(e, "cannot create temporary tar file"))?;
                decompress_to(archive, format, tar_file.path())?;
                self.unpack_tar(tar_file.path(), ArchiveFormat::Tar, dest)
            }
            _ => self.unpack_tar(archive, format, dest),
        }
    }

    fn unpack_tar(&self, archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<()> {
        if self.use_tar {
            return self.run_external(
                ToolCmd::new(&self.tar)
                    .arg("-x")
                    .arg("-f")
                    .arg(archive)
                    .arg("-C")
                    .arg(dest),
            );
        }

        let reader = BufReader::new(open(archive)?);
        match format {
            ArchiveFormat::Tar => extract_tar(reader, dest),
            ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(reader), dest),
            ArchiveFormat::TarBz2 => extract_tar(bzip2::read::BzDecoder::new(reader), dest),
            ArchiveFormat::TarXz => extract_tar(xz2::read::XzDecoder::new(reader), dest),
            ArchiveFormat::TarZst => {
                let decoder = zstd::stream::read::Decoder::new(reader)
                    .map_err(|e| BootstrapError::extract(format!("zstd init error: {}", e)))?;
                extract_tar(decoder, dest)
            }
            ArchiveFormat::Zip => extract_zip(archive, dest),
        }
    }

    fn run_external(&self, cmd: ToolCmd) -> Result<()> {
        cmd.timeout(self.timeout).run().map_err(|e| match e {
            BootstrapError::CommandFailed { cmd, code } => BootstrapError::extract(format!(
                "{} exited with {}",
                cmd,
                code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            )),
            other => other,
        })
    }
}

fn open(archive: &Path) -> Result<File> {
    File::open(archive).map_err(|e| io_context(e, format!("cannot open {}", archive.display())))
}

/// Decompress a `.tar.xz` / `.tar.zst` into a plain tar file.
fn decompress_to(archive: &Path, format: ArchiveFormat, out: &Path) -> Result<()> {
    let reader = BufReader::new(open(archive)?);
    let mut decoder: Box<dyn Read> = match format {
        ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(reader)),
        ArchiveFormat::TarZst => Box::new(
            zstd::stream::read::Decoder::new(reader)
                .map_err(|e| BootstrapError::extract(format!("zstd init error: {}", e)))?,
        ),
        _ => return Err(BootstrapError::extract("not a compressed tar archive")),
    };
    let mut file = File::create(out)
        .map_err(|e| io_context(e, format!("cannot create {}", out.display())))?;
    std::io::copy(&mut decoder, &mut file).map_err(|e| {
        BootstrapError::extract(format!("cannot decompress {}: {}", archive.display(), e))
    })?;
    Ok(())
}

/// The directory holding the archive's content: its single top-level
/// directory if there is exactly one, the staging dir otherwise.
fn content_root(staging: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(staging)
        .map_err(|e| io_context(e, format!("cannot read {}", staging.display())))?
        .collect::<std::io::Result<Vec<_>>>()?;

    if entries.len() == 1 {
        let entry = entries.remove(0);
        if entry.file_type()?.is_dir() {
            return Ok(entry.path());
        }
    }
    Ok(staging.to_path_buf())
}

/// Replace `target` with `root`. `root` always lives in the staging dir, so
/// the two never name the same directory.
fn move_into_place(root: &Path, target: &Path) -> Result<()> {
    fs_utils::remove_dir_if_exists(target)?;
    std::fs::rename(root, target).map_err(|e| {
        io_context(
            e,
            format!("cannot move {} to {}", root.display(), target.display()),
        )
    })
}

// ============================================================================
// Native extraction
// ============================================================================

/// Lexically normalize a path (no filesystem access).
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut has_root = false;

    for c in path.components() {
        match c {
            Component::Prefix(p) => {
                out.clear();
                out.push(p.as_os_str());
                has_root = true;
            }
            Component::RootDir => {
                out.push(Component::RootDir.as_os_str());
                has_root = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out
                    .components()
                    .next_back()
                    .is_some_and(|last| matches!(last, Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !has_root {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }

    out
}

/// Reject writes through a symlink that already exists under `dest`.
fn ensure_no_symlink_components(dest: &Path, full_path: &Path) -> Result<()> {
    let rel = full_path.strip_prefix(dest).map_err(|_| {
        BootstrapError::extract(format!(
            "archive contains path outside destination: {}",
            full_path.display()
        ))
    })?;

    let mut cur = dest.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        if let Ok(md) = std::fs::symlink_metadata(&cur)
            && md.file_type().is_symlink()
        {
            return Err(BootstrapError::extract(format!(
                "extraction blocked: symlink in path component: {}",
                cur.display()
            )));
        }
    }

    Ok(())
}

fn ensure_link_target_within_dest(dest: &Path, link_parent: &Path, link_name: &Path) -> Result<()> {
    if link_name.is_absolute()
        || link_name
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(BootstrapError::extract(format!(
            "archive contains unsafe link target (absolute): {}",
            link_name.display()
        )));
    }

    let candidate = normalize_lexical(&link_parent.join(link_name));
    if candidate.strip_prefix(normalize_lexical(dest)).is_err() {
        return Err(BootstrapError::extract(format!(
            "archive contains unsafe link target (escapes destination): {} -> {}",
            link_parent.display(),
            link_name.display()
        )));
    }

    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| BootstrapError::extract(format!("tar read error: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| BootstrapError::extract(format!("tar entry error: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| BootstrapError::extract(format!("tar path error: {}", e)))?
            .into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return Err(BootstrapError::extract(format!(
                "archive contains unsafe path: {}",
                path.display()
            )));
        }
        if path.as_os_str().is_empty() || path == Path::new(".") {
            continue;
        }

        let full_path = dest.join(&path);
        ensure_no_symlink_components(dest, &full_path)?;

        let entry_type = entry.header().entry_type();
        let is_hard_link = entry_type == tar::EntryType::Link;
        let link_name = if entry_type == tar::EntryType::Symlink || is_hard_link {
            let link_name = entry
                .link_name()
                .map_err(|e| BootstrapError::extract(format!("tar link error: {}", e)))?
                .ok_or_else(|| {
                    BootstrapError::extract(format!(
                        "archive contains link without target: {}",
                        path.display()
                    ))
                })?
                .into_owned();
            // Hard link targets are archive paths, symlink targets are relative to the link
            let link_parent = if is_hard_link {
                dest
            } else {
                full_path.parent().unwrap_or(dest)
            };
            ensure_link_target_within_dest(dest, link_parent, &link_name)?;
            Some(link_name)
        } else {
            None
        };

        if let Some(parent) = full_path.parent() {
            fs_utils::ensure_dir(parent)?;
        }
        if let (true, Some(link_name)) = (is_hard_link, &link_name) {
            std::fs::hard_link(dest.join(link_name), &full_path).map_err(|e| {
                BootstrapError::extract(format!("cannot link {}: {}", path.display(), e))
            })?;
            continue;
        }
        entry.unpack(&full_path).map_err(|e| {
            BootstrapError::extract(format!("unpack error for {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(open(archive_path)?)
        .map_err(|e| BootstrapError::extract(format!("zip read error: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| BootstrapError::extract(format!("zip entry error: {}", e)))?;

        let Some(outpath) = file.enclosed_name().map(|p| dest.join(p)) else {
            tracing::debug!("skipping unsafe zip entry {}", file.name());
            continue;
        };

        if file.is_dir() {
            fs_utils::ensure_dir(&outpath)?;
            continue;
        }

        fs_utils::ensure_parent_dir(&outpath)?;
        let mut outfile = File::create(&outpath)
            .map_err(|e| io_context(e, format!("cannot create {}", outpath.display())))?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| {
            BootstrapError::extract(format!("write error for {}: {}", outpath.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(())
}
