//! ZFS pool listing and destruction on the remote host.

use crate::error::{AppError, AppResult};
use crate::ssh::Transport;
use serde::{Deserialize, Serialize};

/// Header-free, tab-separated listing with a fixed column order.
const LIST_POOLS: [&str; 5] = ["zpool", "list", "-H", "-o", "name,size,allocated,free,health"];

/// One row of `zpool list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub name: String,
    pub size: String,
    pub allocated: String,
    pub free: String,
    pub health: String,
}

/// Result envelope shared by the pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pools: Option<Vec<PoolDescriptor>>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            pools: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            pools: None,
        }
    }

    pub fn listing(pools: Vec<PoolDescriptor>) -> Self {
        Self {
            success: true,
            message: format!("Found {} ZFS pools", pools.len()),
            pools: Some(pools),
        }
    }
}

/// Parse `zpool list -H` rows; lines with fewer than five fields are dropped.
pub fn parse_pool_listing(stdout: &str) -> Vec<PoolDescriptor> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                tracing::debug!("Skipping malformed pool row: {:?}", line);
                return None;
            }
            Some(PoolDescriptor {
                name: fields[0].to_string(),
                size: fields[1].to_string(),
                allocated: fields[2].to_string(),
                free: fields[3].to_string(),
                health: fields[4].to_string(),
            })
        })
        .collect()
}

pub fn list_pools(transport: &mut dyn Transport) -> AppResult<OperationResult> {
    let output = transport.exec(&LIST_POOLS)?;
    if !output.success() {
        return Ok(OperationResult::failed(format!(
            "Failed to list ZFS pools: {}",
            output.stderr.trim()
        )));
    }

    let pools = parse_pool_listing(&output.stdout);
    tracing::info!("Listed {} ZFS pools", pools.len());
    Ok(OperationResult::listing(pools))
}

/// Force-destroy `pool_name`, but only after confirming it exists.
pub fn destroy_pool(transport: &mut dyn Transport, pool_name: &str) -> AppResult<OperationResult> {
    validate_pool_name(pool_name)?;

    let probe = transport.exec(&["zpool", "list", pool_name])?;
    if !probe.success() {
        tracing::warn!("Refusing to destroy '{}': pool not found", pool_name);
        return Ok(OperationResult::failed(format!(
            "ZFS pool '{}' does not exist or is not accessible",
            pool_name
        )));
    }

    tracing::warn!("Destroying ZFS pool '{}'", pool_name);
    let output = transport.exec(&["zpool", "destroy", "-f", pool_name])?;
    if output.success() {
        Ok(OperationResult::ok(format!(
            "ZFS pool '{}' has been successfully deleted",
            pool_name
        )))
    } else {
        Ok(OperationResult::failed(format!(
            "Failed to delete ZFS pool: {}",
            output.stderr.trim()
        )))
    }
}

pub(crate) fn validate_pool_name(pool_name: &str) -> AppResult<()> {
    if pool_name.trim().is_empty() {
        return Err(AppError::InvalidArgument("pool name must not be empty".to_string()));
    }
    // A leading dash would be parsed by zpool as an option.
    if pool_name.starts_with('-') {
        return Err(AppError::InvalidArgument(format!("invalid pool name '{}'", pool_name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::ops::fake::FakeRemote;
    use crate::ssh::{Connector, RemoteConnectionParams};

    fn session(remote: &FakeRemote) -> Box<dyn Transport> {
        remote
            .connect(&RemoteConnectionParams::new("nas", "root"), &CallContext::default())
            .unwrap()
    }

    #[test]
    fn test_parse_single_row() {
        let pools = parse_pool_listing("tank\t10G\t2G\t8G\tONLINE\n");
        assert_eq!(
            pools,
            vec![PoolDescriptor {
                name: "tank".into(),
                size: "10G".into(),
                allocated: "2G".into(),
                free: "8G".into(),
                health: "ONLINE".into(),
            }]
        );
    }

    #[test]
    fn test_parse_drops_short_rows() {
        let stdout = "tank\t10G\t2G\t8G\tONLINE\nbroken\t1G\n\n   \nbackup\t4T\t1T\t3T\tDEGRADED\textra\r\n";
        let pools = parse_pool_listing(stdout);
        let names: Vec<_> = pools.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["tank", "backup"]);
        assert_eq!(pools[1].health, "DEGRADED");
    }

    #[test]
    fn test_list_only_malformed_rows_is_empty_success() {
        let remote = FakeRemote::new().respond(&["zpool", "list"], "garbage\nno tabs here\n", "", 0);
        let result = list_pools(session(&remote).as_mut()).unwrap();
        assert!(result.success);
        assert_eq!(result.pools, Some(vec![]));
    }

    #[test]
    fn test_list_failure_surfaces_trimmed_stderr() {
        let remote = FakeRemote::new().respond(
            &["zpool", "list"],
            "",
            "\n  internal error: failed to initialize ZFS library\nmodule not loaded  \n",
            1,
        );
        let result = list_pools(session(&remote).as_mut()).unwrap();
        assert!(!result.success);
        assert!(result.pools.is_none());
        assert_eq!(
            result.message,
            "Failed to list ZFS pools: internal error: failed to initialize ZFS library\nmodule not loaded"
        );
    }

    #[test]
    fn test_destroy_skipped_when_probe_fails() {
        let remote = FakeRemote::new().respond(&["zpool", "list", "ghost"], "", "cannot open 'ghost': no such pool", 1);
        let result = destroy_pool(session(&remote).as_mut(), "ghost").unwrap();
        assert_eq!(
            result,
            OperationResult::failed("ZFS pool 'ghost' does not exist or is not accessible")
        );
        assert_eq!(remote.ran(&["zpool", "destroy"]), 0);
    }

    #[test]
    fn test_destroy_success() {
        let remote = FakeRemote::new();
        let result = destroy_pool(session(&remote).as_mut(), "tank").unwrap();
        assert!(result.success);
        assert_eq!(result.message, "ZFS pool 'tank' has been successfully deleted");
        assert_eq!(remote.ran(&["zpool", "destroy", "-f", "tank"]), 1);
    }

    #[test]
    fn test_destroy_failure_reports_stderr() {
        let remote = FakeRemote::new().respond(&["zpool", "destroy"], "", "cannot destroy 'tank': pool is busy\n", 1);
        let result = destroy_pool(session(&remote).as_mut(), "tank").unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Failed to delete ZFS pool: cannot destroy 'tank': pool is busy");
    }

    #[test]
    fn test_failure_messages_end_with_exact_stderr() {
        let stderr = "cannot open 'tank': permission denied";
        let remote = FakeRemote::new()
            .respond(&["zpool", "list", "-H"], "", &format!("  {}\r\n", stderr), 1)
            .respond(&["zpool", "destroy"], "", &format!("\n{}\n", stderr), 1);

        let listed = list_pools(session(&remote).as_mut()).unwrap();
        assert!(listed.message.ends_with(&format!(": {}", stderr)));

        let destroyed = destroy_pool(session(&remote).as_mut(), "tank").unwrap();
        assert!(destroyed.message.ends_with(&format!(": {}", stderr)));
    }

    #[test]
    fn test_pool_name_validation() {
        assert!(validate_pool_name("tank").is_ok());
        assert!(matches!(validate_pool_name(""), Err(AppError::InvalidArgument(_))));
        assert!(matches!(validate_pool_name("-a"), Err(AppError::InvalidArgument(_))));
    }
}
