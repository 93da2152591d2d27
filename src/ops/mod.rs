//! Remote operations façade.
//!
//! Every public operation opens its own session, runs one or more remote
//! actions, releases the session and returns a result value. Nothing is
//! shared or cached between calls. Argument and local-path problems are
//! reported as failed results before any connection is attempted;
//! connection failures (including timeouts and cancellation) are returned
//! as `Err` and abort the operation.
//!
//! Host keys are accepted without verification (see [`crate::ssh::session`]).

pub mod pools;
pub mod probe;
pub mod transfer;

#[cfg(test)]
pub(crate) mod fake;

pub use pools::{OperationResult, PoolDescriptor};
pub use transfer::{TransferOutcome, UploadPlan};

use crate::context::CallContext;
use crate::error::{AppError, AppResult};
use crate::ssh::{Connector, RemoteConnectionParams, SshConnector, Transport};
use std::path::Path;
use uuid::Uuid;

/// Stateless entry point for pool management and uploads.
pub struct RemoteOps<C: Connector = SshConnector> {
    connector: C,
}

impl RemoteOps<SshConnector> {
    pub fn ssh() -> Self {
        Self::new(SshConnector)
    }
}

impl Default for RemoteOps<SshConnector> {
    fn default() -> Self {
        Self::ssh()
    }
}

impl<C: Connector> RemoteOps<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// List every pool on the remote host.
    pub fn list_pools(
        &self,
        params: &RemoteConnectionParams,
        ctx: &CallContext,
    ) -> AppResult<OperationResult> {
        self.with_session("list_pools", params, ctx, pools::list_pools)
    }

    /// Force-destroy a pool after confirming it exists. Irreversible.
    pub fn destroy_pool(
        &self,
        params: &RemoteConnectionParams,
        pool_name: &str,
        ctx: &CallContext,
    ) -> AppResult<OperationResult> {
        if let Err(e) = pools::validate_pool_name(pool_name) {
            return Ok(OperationResult::failed(rejection_message(e)));
        }
        self.with_session("destroy_pool", params, ctx, |transport| {
            pools::destroy_pool(transport, pool_name)
        })
    }

    /// Check login and ZFS availability on the remote host.
    pub fn probe_zfs(
        &self,
        params: &RemoteConnectionParams,
        ctx: &CallContext,
    ) -> AppResult<OperationResult> {
        self.with_session("probe_zfs", params, ctx, probe::probe_zfs)
    }

    /// Upload `source` to `destination`, attempting every file even if some fail.
    pub fn upload_tree(
        &self,
        params: &RemoteConnectionParams,
        source: &Path,
        destination: &str,
        recursive: bool,
        ctx: &CallContext,
    ) -> AppResult<TransferOutcome> {
        let plan = match transfer::plan_upload(source, destination, recursive) {
            Ok(plan) => plan,
            Err(e) if e.is_rejection() => {
                return Ok(TransferOutcome::rejected(rejection_message(e)))
            }
            Err(e) => return Err(e),
        };
        self.with_session("upload_tree", params, ctx, |transport| {
            transfer::execute_plan(transport, &plan, ctx)
        })
    }

    /// Open a session, run `op`, and release the session on every path.
    fn with_session<T>(
        &self,
        op: &'static str,
        params: &RemoteConnectionParams,
        ctx: &CallContext,
        f: impl FnOnce(&mut dyn Transport) -> AppResult<T>,
    ) -> AppResult<T> {
        let call_id = Uuid::new_v4();
        let span = tracing::info_span!("remote_op", op, %call_id, host = %params.host);
        let _guard = span.enter();

        ctx.checkpoint()?;
        let mut transport = self.connector.connect(params, ctx).map_err(|e| {
            tracing::error!("Could not open session to {}: {}", params.target(), e);
            e
        })?;

        let result = f(transport.as_mut());
        drop(transport);

        if let Err(e) = &result {
            tracing::error!("{} aborted: {}", op, e);
        }
        result
    }
}

fn rejection_message(err: AppError) -> String {
    match err {
        AppError::LocalPath(msg) | AppError::InvalidArgument(msg) | AppError::Configuration(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeRemote;
    use super::*;
    use std::time::Duration;

    fn params() -> RemoteConnectionParams {
        RemoteConnectionParams::new("nas", "root").with_password("pw")
    }

    #[test]
    fn test_list_scenario() {
        let remote = FakeRemote::new().respond(&["zpool", "list"], "tank\t10G\t2G\t8G\tONLINE\n", "", 0);
        let ops = RemoteOps::new(remote.clone());

        let result = ops.list_pools(&params(), &CallContext::default()).unwrap();
        assert!(result.success);
        assert_eq!(
            result.pools,
            Some(vec![PoolDescriptor {
                name: "tank".into(),
                size: "10G".into(),
                allocated: "2G".into(),
                free: "8G".into(),
                health: "ONLINE".into(),
            }])
        );
        remote.with_log(|log| {
            assert_eq!(log.connects, 1);
            assert_eq!(log.releases, 1);
        });
    }

    #[test]
    fn test_destroy_ghost_never_destroys() {
        let remote = FakeRemote::new().respond(&["zpool", "list", "ghost"], "", "no such pool", 1);
        let ops = RemoteOps::new(remote.clone());

        let result = ops.destroy_pool(&params(), "ghost", &CallContext::default()).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "ZFS pool 'ghost' does not exist or is not accessible");
        assert!(result.pools.is_none());
        assert_eq!(remote.ran(&["zpool", "destroy"]), 0);
        assert_eq!(remote.with_log(|log| log.releases), 1);
    }

    #[test]
    fn test_destroy_empty_name_does_not_connect() {
        let remote = FakeRemote::new();
        let ops = RemoteOps::new(remote.clone());
        let result = ops.destroy_pool(&params(), "", &CallContext::default()).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "pool name must not be empty");
        assert_eq!(remote.with_log(|log| log.connects), 0);
    }

    #[test]
    fn test_single_file_upload_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.txt");
        std::fs::write(&file, b"twenty bytes of text").unwrap();

        let remote = FakeRemote::new();
        let ops = RemoteOps::new(remote.clone());
        let outcome = ops
            .upload_tree(&params(), &file, "/backups/", false, &CallContext::default())
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.transferred_count, 1);
        assert_eq!(outcome.failed_count, 0);
        assert_eq!(outcome.total_bytes, 20);
        assert!(remote.has_dir("/backups"));
        remote.with_log(|log| {
            assert_eq!(log.uploads[0].1, "/backups/report.txt");
            assert_eq!(log.releases, 1);
        });
    }

    #[test]
    fn test_directory_without_recursive_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let remote = FakeRemote::new();
        let ops = RemoteOps::new(remote.clone());
        let outcome = ops
            .upload_tree(&params(), dir.path(), "/dst", false, &CallContext::default())
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.transferred_count, 0);
        assert_eq!(outcome.message, "source is a directory but recursive copy not enabled");
        remote.with_log(|log| {
            assert_eq!(log.connects, 0);
            assert!(log.mkdirs.is_empty());
        });
    }

    #[test]
    fn test_connection_failure_is_error() {
        let remote = FakeRemote::new().refuse_connections("Password authentication failed");
        let ops = RemoteOps::new(remote.clone());
        let err = ops.list_pools(&params(), &CallContext::default()).unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_expired_deadline_never_connects() {
        let remote = FakeRemote::new();
        let ops = RemoteOps::new(remote.clone());
        let ctx = CallContext::with_timeout(Duration::ZERO);
        let err = ops.probe_zfs(&params(), &ctx).unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert_eq!(remote.with_log(|log| log.connects), 0);
    }

    #[test]
    fn test_session_released_when_upload_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let remote = FakeRemote::new();
        let ops = RemoteOps::new(remote.clone());
        let ctx = CallContext::default();

        // Cancel after connecting: the first checkpoint inside the upload trips.
        struct CancelOnConnect(FakeRemote);
        impl Connector for CancelOnConnect {
            fn connect(
                &self,
                params: &RemoteConnectionParams,
                ctx: &CallContext,
            ) -> AppResult<Box<dyn Transport>> {
                let transport = self.0.connect(params, ctx)?;
                ctx.token().cancel();
                Ok(transport)
            }
        }
        let ops_cancel = RemoteOps::new(CancelOnConnect(remote.clone()));
        let err = ops_cancel
            .upload_tree(&params(), dir.path(), "/dst", true, &ctx)
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        remote.with_log(|log| {
            assert_eq!(log.connects, 1);
            assert_eq!(log.releases, 1);
            assert!(log.uploads.is_empty());
        });

        // The façade itself holds no state: a fresh call works.
        let outcome = ops
            .upload_tree(&params(), dir.path(), "/dst", true, &CallContext::default())
            .unwrap();
        assert!(outcome.success);
    }
}
