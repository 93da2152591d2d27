//! Disk usage for local storage paths (`df`/`du` plus statvfs via fs2).

use crate::error::AppResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const LARGEST_DIRS: usize = 5;

/// Usage summary for one configured path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageUsage {
    pub path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<String>,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StorageUsage {
    fn missing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: false,
            error: Some("Path does not exist".to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DirSize {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub size_gb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageDetails {
    pub path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub largest_dirs: Vec<DirSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Usage for every path; per-path problems are reported inline.
pub fn storage_info(paths: &[PathBuf]) -> Vec<StorageUsage> {
    paths.iter().map(|path| path_usage(path)).collect()
}

fn path_usage(path: &Path) -> StorageUsage {
    if !path.exists() {
        tracing::warn!("Storage path does not exist: {}", path.display());
        return StorageUsage::missing(path);
    }

    match disk_usage(path) {
        Ok((total, used, free)) => {
            let (filesystem, mount_point) = df_filesystem(path).unwrap_or_else(|| {
                ("Unknown".to_string(), path.display().to_string())
            });
            let percent_used = if total == 0 {
                0.0
            } else {
                round_to(used as f64 / total as f64 * 100.0, 1)
            };
            StorageUsage {
                path: path.to_path_buf(),
                exists: true,
                mount_point: Some(mount_point),
                filesystem: Some(filesystem),
                total,
                used,
                free,
                total_gb: round_to(total as f64 / GIB, 2),
                used_gb: round_to(used as f64 / GIB, 2),
                free_gb: round_to(free as f64 / GIB, 2),
                percent_used,
                error: None,
            }
        }
        Err(e) => {
            tracing::error!("Error getting disk usage for {}: {}", path.display(), e);
            StorageUsage {
                path: path.to_path_buf(),
                exists: true,
                error: Some(e.to_string()),
                ..StorageUsage::default()
            }
        }
    }
}

/// (total, used, available) in bytes.
fn disk_usage(path: &Path) -> AppResult<(u64, u64, u64)> {
    let total = fs2::total_space(path)?;
    let free = fs2::free_space(path)?;
    let available = fs2::available_space(path)?;
    Ok((total, total.saturating_sub(free), available))
}

fn df_filesystem(path: &Path) -> Option<(String, String)> {
    let output = Command::new("df").arg("-T").arg(path).output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df_output(&String::from_utf8_lossy(&output.stdout))
}

/// Filesystem type and mount point from `df -T` output.
fn parse_df_output(stdout: &str) -> Option<(String, String)> {
    let line = stdout.lines().nth(1)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 7 {
        return None;
    }
    Some((parts[1].to_string(), parts[6..].join(" ")))
}

/// Permissions, size, mtime and the largest immediate subdirectories.
pub fn storage_details(path: &Path) -> StorageDetails {
    let mut details = StorageDetails {
        path: path.to_path_buf(),
        exists: path.exists(),
        permissions: None,
        size: None,
        last_modified: None,
        largest_dirs: Vec::new(),
        error: None,
    };
    if !details.exists {
        details.error = Some("Path does not exist".to_string());
        return details;
    }

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            details.error = Some(e.to_string());
            return details;
        }
    };

    details.permissions = Some(permission_string(&metadata));
    details.size = Some(metadata.len());
    details.last_modified = metadata
        .modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

    if metadata.is_dir() {
        details.largest_dirs = largest_subdirs(path);
    }
    details
}

fn largest_subdirs(path: &Path) -> Vec<DirSize> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Error listing {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut sizes: Vec<DirSize> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let dir = entry.path();
            let kib = du_kib(&dir)?;
            Some(DirSize {
                name: entry.file_name().to_string_lossy().to_string(),
                size: kib * 1024,
                size_gb: round_to(kib as f64 / (1024.0 * 1024.0), 2),
                path: dir,
            })
        })
        .collect();

    sizes.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    sizes.truncate(LARGEST_DIRS);
    sizes
}

fn du_kib(dir: &Path) -> Option<u64> {
    let output = Command::new("du").arg("-s").arg(dir).output().ok()?;
    if !output.status.success() {
        tracing::warn!("du failed for {}", dir.display());
        return None;
    }
    parse_du_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_du_output(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

#[cfg(unix)]
fn permission_string(metadata: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:03o}", metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_string(metadata: &std::fs::Metadata) -> String {
    let mode = if metadata.permissions().readonly() { "444" } else { "666" };
    mode.to_string()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
