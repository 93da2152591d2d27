//! Handler layer: read settings, invoke the façade on a blocking task.
//!
//! These are what a web route or CLI subcommand calls. Connection parameters
//! always come from the persisted settings, never from the environment.

use crate::config::AppSettings;
use crate::context::CallContext;
use crate::error::{AppError, AppResult};
use crate::ops::{OperationResult, RemoteOps, TransferOutcome};
use crate::ssh::RemoteConnectionParams;
use crate::storage::{self, StorageDetails, StorageUsage};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Run a façade call off the async runtime with the configured deadline.
async fn run_remote<T, F>(settings: &AppSettings, cancel: CancellationToken, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(RemoteOps, RemoteConnectionParams, CallContext) -> AppResult<T> + Send + 'static,
{
    let params = settings.connection_params()?;
    let ctx = CallContext::new(settings.ops.call_timeout(), cancel);

    tokio::task::spawn_blocking(move || f(RemoteOps::ssh(), params, ctx))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("worker task failed: {}", e))))?
}

pub async fn list_pools(
    settings: &AppSettings,
    cancel: CancellationToken,
) -> AppResult<OperationResult> {
    tracing::info!("Listing ZFS pools on {}", settings.remote.host);
    run_remote(settings, cancel, |ops, params, ctx| ops.list_pools(&params, &ctx)).await
}

pub async fn destroy_pool(
    settings: &AppSettings,
    pool_name: String,
    cancel: CancellationToken,
) -> AppResult<OperationResult> {
    tracing::info!("Destroy requested for ZFS pool '{}' on {}", pool_name, settings.remote.host);
    run_remote(settings, cancel, move |ops, params, ctx| {
        ops.destroy_pool(&params, &pool_name, &ctx)
    })
    .await
}

pub async fn probe_zfs(
    settings: &AppSettings,
    cancel: CancellationToken,
) -> AppResult<OperationResult> {
    run_remote(settings, cancel, |ops, params, ctx| ops.probe_zfs(&params, &ctx)).await
}

pub async fn upload(
    settings: &AppSettings,
    source: PathBuf,
    destination: String,
    recursive: bool,
    cancel: CancellationToken,
) -> AppResult<TransferOutcome> {
    tracing::info!(
        "Upload: source={}, destination={}, recursive={}",
        source.display(),
        destination,
        recursive
    );
    run_remote(settings, cancel, move |ops, params, ctx| {
        ops.upload_tree(&params, &source, &destination, recursive, &ctx)
    })
    .await
}

pub async fn storage_info(settings: &AppSettings) -> AppResult<Vec<StorageUsage>> {
    if settings.storage.paths.is_empty() {
        return Err(AppError::Configuration("No storage paths configured".to_string()));
    }
    let paths = settings.storage.paths.clone();
    tokio::task::spawn_blocking(move || storage::storage_info(&paths))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("worker task failed: {}", e))))
}

pub async fn storage_details(path: PathBuf) -> AppResult<StorageDetails> {
    tokio::task::spawn_blocking(move || storage::storage_details(&path))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("worker task failed: {}", e))))
}
