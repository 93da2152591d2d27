//! Best-effort upload of a local file or directory tree to the remote host.

use crate::context::CallContext;
use crate::error::{AppError, AppResult};
use crate::ssh::Transport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Tally of one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub success: bool,
    pub transferred_count: usize,
    pub failed_count: usize,
    pub total_bytes: u64,
    pub failed_paths: Vec<String>,
    pub message: String,
}

impl TransferOutcome {
    /// Nothing was attempted.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    fn record_success(&mut self, bytes: u64) {
        self.transferred_count += 1;
        self.total_bytes += bytes;
    }

    fn record_failure(&mut self, local_path: &Path) {
        self.failed_count += 1;
        self.failed_paths.push(local_path.display().to_string());
    }

    fn finish(mut self) -> Self {
        self.success = self.failed_count == 0;
        let megabytes = self.total_bytes as f64 / BYTES_PER_MB;
        self.message = if self.success {
            format!(
                "Successfully transferred {} files ({:.2} MB)",
                self.transferred_count, megabytes
            )
        } else {
            format!(
                "Transferred {} files ({:.2} MB), {} failed",
                self.transferred_count, megabytes, self.failed_count
            )
        };
        self
    }
}

/// What an upload will do, decided from the local filesystem alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPlan {
    File {
        local: PathBuf,
        remote: String,
        /// Remote directory that must exist first, if any.
        remote_dir: Option<String>,
    },
    Tree {
        root: PathBuf,
        destination: String,
    },
}

/// Validate the source and resolve the remote target without touching the remote host.
pub fn plan_upload(source: &Path, destination: &str, recursive: bool) -> AppResult<UploadPlan> {
    if destination.trim().is_empty() {
        return Err(AppError::InvalidArgument("destination path must not be empty".to_string()));
    }

    let metadata = std::fs::metadata(source).map_err(|_| {
        AppError::LocalPath(format!("source path does not exist: {}", source.display()))
    })?;

    if metadata.is_dir() {
        if !recursive {
            return Err(AppError::LocalPath(
                "source is a directory but recursive copy not enabled".to_string(),
            ));
        }
        return Ok(UploadPlan::Tree {
            root: source.to_path_buf(),
            destination: destination.to_string(),
        });
    }

    if !metadata.is_file() {
        return Err(AppError::LocalPath(format!(
            "source is not a regular file or directory: {}",
            source.display()
        )));
    }

    if destination.ends_with('/') {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::LocalPath(format!("source has no file name: {}", source.display())))?;
        return Ok(UploadPlan::File {
            local: source.to_path_buf(),
            remote: format!("{}{}", destination, file_name),
            remote_dir: Some(destination.to_string()),
        });
    }

    let remote_dir = match destination.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
        None => None,
    };
    Ok(UploadPlan::File {
        local: source.to_path_buf(),
        remote: destination.to_string(),
        remote_dir,
    })
}

/// Run a plan over an open session.
pub fn execute_plan(
    transport: &mut dyn Transport,
    plan: &UploadPlan,
    ctx: &CallContext,
) -> AppResult<TransferOutcome> {
    match plan {
        UploadPlan::File {
            local,
            remote,
            remote_dir,
        } => upload_single(transport, local, remote, remote_dir.as_deref(), ctx),
        UploadPlan::Tree { root, destination } => upload_tree(transport, root, destination, ctx),
    }
}

fn upload_single(
    transport: &mut dyn Transport,
    local: &Path,
    remote: &str,
    remote_dir: Option<&str>,
    ctx: &CallContext,
) -> AppResult<TransferOutcome> {
    let mut outcome = TransferOutcome::default();

    let dir_ready = match remote_dir {
        Some(dir) => soften(ensure_remote_dir(transport, dir, ctx), dir)?,
        None => true,
    };

    ctx.checkpoint()?;
    if dir_ready {
        match soften_upload(transport.upload_file(local, remote), local)? {
            Some(bytes) => outcome.record_success(bytes),
            None => outcome.record_failure(local),
        }
    } else {
        outcome.record_failure(local);
    }

    Ok(outcome.finish())
}

fn upload_tree(
    transport: &mut dyn Transport,
    root: &Path,
    destination: &str,
    ctx: &CallContext,
) -> AppResult<TransferOutcome> {
    let mut outcome = TransferOutcome::default();

    // Relative directory ("" is the root) -> whether it exists remotely.
    let mut remote_dirs: HashMap<String, bool> = HashMap::new();
    let root_ready = soften(ensure_remote_dir(transport, destination, ctx), destination)?;
    remote_dirs.insert(String::new(), root_ready);

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        ctx.checkpoint()?;

        let entry = match entry {
            Ok(entry) => entry,
            // Whatever lies beneath an unreadable entry cannot be counted,
            // so the entry itself is reported as failed.
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tracing::warn!("Cannot read {}: {}", path.display(), e);
                outcome.record_failure(&path);
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(rel) => to_remote_relative(rel),
            Err(_) => continue,
        };
        let parent = parent_of(&relative);
        let parent_ready = remote_dirs.get(parent).copied().unwrap_or(false);

        if entry.file_type().is_dir() {
            let ready = if parent_ready {
                let remote = remote_join(destination, &relative);
                soften(create_dir_if_missing(transport, &remote), &remote)?
            } else {
                false
            };
            remote_dirs.insert(relative, ready);
        } else if entry.file_type().is_file() {
            if !parent_ready {
                outcome.record_failure(entry.path());
                continue;
            }
            let remote = remote_join(destination, &relative);
            match soften_upload(transport.upload_file(entry.path(), &remote), entry.path())? {
                Some(bytes) => outcome.record_success(bytes),
                None => outcome.record_failure(entry.path()),
            }
        } else {
            tracing::debug!("Skipping non-regular file {}", entry.path().display());
        }
    }

    let outcome = outcome.finish();
    tracing::info!("{}", outcome.message);
    Ok(outcome)
}

/// Create every missing segment of `remote_path`, root to leaf.
pub fn ensure_remote_dir(
    transport: &mut dyn Transport,
    remote_path: &str,
    ctx: &CallContext,
) -> AppResult<()> {
    let mut current = if remote_path.starts_with('/') {
        String::from("/")
    } else {
        String::new()
    };

    for segment in remote_path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        ctx.checkpoint()?;
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(segment);
        create_dir_if_missing(transport, &current)?;
    }
    Ok(())
}

fn create_dir_if_missing(transport: &mut dyn Transport, remote_path: &str) -> AppResult<()> {
    if transport.path_exists(remote_path)? {
        return Ok(());
    }
    match transport.make_dir(remote_path) {
        Ok(()) => Ok(()),
        Err(e) if is_fatal(&e) => Err(e),
        // Lost a race with another writer: already there is good enough.
        Err(e) => {
            if transport.path_exists(remote_path)? {
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

/// Timeouts and cancellation abort the upload; anything else is per-path.
fn is_fatal(err: &AppError) -> bool {
    matches!(err, AppError::Timeout(_) | AppError::Cancelled)
}

fn soften(result: AppResult<()>, remote_path: &str) -> AppResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if is_fatal(&e) => Err(e),
        Err(e) => {
            tracing::warn!("Could not create remote directory {}: {}", remote_path, e);
            Ok(false)
        }
    }
}

fn soften_upload(result: AppResult<u64>, local: &Path) -> AppResult<Option<u64>> {
    match result {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if is_fatal(&e) => Err(e),
        Err(e) => {
            tracing::warn!("Failed to upload {}: {}", local.display(), e);
            Ok(None)
        }
    }
}

fn to_remote_relative(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_of(relative: &str) -> &str {
    relative.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn remote_join(base: &str, relative: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, relative)
    } else {
        format!("{}/{}", base, relative)
    }
}
