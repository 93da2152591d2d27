//! Remote transport used by the operations façade.
//!
//! A [`Connector`] opens one authenticated [`Transport`] per call. The real
//! implementation lives in [`session`]; tests substitute an in-memory fake.

pub mod session;

pub use session::*;

use crate::context::CallContext;
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything needed to reach and authenticate against the remote host.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub connect_timeout: Duration,
}

impl RemoteConnectionParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: None,
            key_path: None,
            key_passphrase: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// `user@host:port`, for logs.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl std::fmt::Debug for RemoteConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("key_path", &self.key_path)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One authenticated session. Dropping it releases the connection.
pub trait Transport: Send {
    /// Run `argv` on the remote host and capture its output.
    fn exec(&mut self, argv: &[&str]) -> AppResult<ExecOutput>;

    /// Stat probe: does `remote_path` exist?
    fn path_exists(&mut self, remote_path: &str) -> AppResult<bool>;

    /// Create a single remote directory (parent must exist).
    fn make_dir(&mut self, remote_path: &str) -> AppResult<()>;

    /// Copy one local regular file to `remote_path`, returning bytes sent.
    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> AppResult<u64>;
}

/// Opens transports; one call to `connect` per façade operation.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        params: &RemoteConnectionParams,
        ctx: &CallContext,
    ) -> AppResult<Box<dyn Transport>>;
}

/// Render an argument vector as a POSIX shell command line.
pub fn shell_join(argv: &[&str]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./,:=@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
