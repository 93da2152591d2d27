//! Connectivity check: can we log in, and is ZFS usable once we do?

use super::pools::OperationResult;
use crate::error::AppResult;
use crate::ssh::Transport;

pub fn probe_zfs(transport: &mut dyn Transport) -> AppResult<OperationResult> {
    let which = transport.exec(&["command", "-v", "zpool"])?;
    if !which.success() || which.stdout.trim().is_empty() {
        return Ok(OperationResult::failed(
            "Connected to SSH, but ZFS tools are not installed on the remote system.",
        ));
    }

    let listing = transport.exec(&["zpool", "list", "-H", "-o", "name"])?;
    if !listing.success() {
        return Ok(OperationResult::failed(format!(
            "ZFS tools are installed, but unable to list pools: {}",
            listing.stderr.trim()
        )));
    }

    let pool_count = listing
        .stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count();

    Ok(OperationResult::ok(format!(
        "SSH connection successful and ZFS is working! Found {} ZFS pools.",
        pool_count
    )))
}
