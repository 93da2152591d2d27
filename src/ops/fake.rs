//! In-memory stand-in for a remote host, used by the façade tests.

use crate::context::CallContext;
use crate::error::{AppError, AppResult};
use crate::ssh::{Connector, ExecOutput, RemoteConnectionParams, Transport};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct FakeLog {
    pub connects: usize,
    pub releases: usize,
    pub commands: Vec<Vec<String>>,
    pub mkdirs: Vec<String>,
    pub uploads: Vec<(PathBuf, String, u64)>,
}

#[derive(Default)]
struct Inner {
    log: FakeLog,
    responses: Vec<(Vec<String>, ExecOutput)>,
    dirs: BTreeSet<String>,
    failing_uploads: HashSet<String>,
    failing_mkdirs: HashSet<String>,
    refuse: Option<String>,
}

/// Scriptable fake host. Clones share state, so a test can keep one handle
/// while the façade owns another.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<Mutex<Inner>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.inner.lock().dirs.insert("/".to_string());
        remote
    }

    /// Reply to any command starting with `prefix`. Later rules win.
    pub fn respond(self, prefix: &[&str], stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.inner.lock().responses.push((
            prefix.iter().map(|s| s.to_string()).collect(),
            ExecOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        ));
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.inner.lock().dirs.insert(path.to_string());
        self
    }

    /// Uploads whose local file name equals `file_name` fail.
    pub fn fail_upload(self, file_name: &str) -> Self {
        self.inner.lock().failing_uploads.insert(file_name.to_string());
        self
    }

    pub fn fail_mkdir(self, path: &str) -> Self {
        self.inner.lock().failing_mkdirs.insert(path.to_string());
        self
    }

    pub fn refuse_connections(self, reason: &str) -> Self {
        self.inner.lock().refuse = Some(reason.to_string());
        self
    }

    pub fn with_log<T>(&self, f: impl FnOnce(&FakeLog) -> T) -> T {
        f(&self.inner.lock().log)
    }

    /// How many executed commands started with `prefix`.
    pub fn ran(&self, prefix: &[&str]) -> usize {
        self.with_log(|log| {
            log.commands
                .iter()
                .filter(|cmd| starts_with(cmd, prefix))
                .count()
        })
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.inner.lock().dirs.contains(path)
    }
}

fn starts_with(cmd: &[String], prefix: &[impl AsRef<str>]) -> bool {
    cmd.len() >= prefix.len() && cmd.iter().zip(prefix).all(|(a, b)| a == b.as_ref())
}

impl Connector for FakeRemote {
    fn connect(
        &self,
        params: &RemoteConnectionParams,
        ctx: &CallContext,
    ) -> AppResult<Box<dyn Transport>> {
        ctx.checkpoint()?;
        if params.host.is_empty() || params.username.is_empty() {
            return Err(AppError::Connection("host and username are required".into()));
        }
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.refuse {
            return Err(AppError::Connection(reason.clone()));
        }
        inner.log.connects += 1;
        Ok(Box::new(FakeTransport {
            remote: self.clone(),
        }))
    }
}

struct FakeTransport {
    remote: FakeRemote,
}

impl Transport for FakeTransport {
    fn exec(&mut self, argv: &[&str]) -> AppResult<ExecOutput> {
        let mut inner = self.remote.inner.lock();
        inner
            .log
            .commands
            .push(argv.iter().map(|s| s.to_string()).collect());
        let reply = inner
            .responses
            .iter()
            .rev()
            .find(|(prefix, _)| {
                argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, b)| *a == b.as_str())
            })
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(reply)
    }

    fn path_exists(&mut self, remote_path: &str) -> AppResult<bool> {
        Ok(self.remote.inner.lock().dirs.contains(remote_path))
    }

    fn make_dir(&mut self, remote_path: &str) -> AppResult<()> {
        let mut inner = self.remote.inner.lock();
        inner.log.mkdirs.push(remote_path.to_string());
        if inner.failing_mkdirs.contains(remote_path) {
            return Err(AppError::RemoteCommand {
                command: format!("mkdir {}", remote_path),
                stderr: "Permission denied".into(),
            });
        }
        if !inner.dirs.insert(remote_path.to_string()) {
            return Err(AppError::RemoteCommand {
                command: format!("mkdir {}", remote_path),
                stderr: "File exists".into(),
            });
        }
        Ok(())
    }

    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> AppResult<u64> {
        let size = std::fs::metadata(local_path)?.len();
        let mut inner = self.remote.inner.lock();
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if inner.failing_uploads.contains(&name) {
            return Err(AppError::RemoteCommand {
                command: format!("scp {}", remote_path),
                stderr: "No space left on device".into(),
            });
        }
        inner
            .log
            .uploads
            .push((local_path.to_path_buf(), remote_path.to_string(), size));
        Ok(size)
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.remote.inner.lock().log.releases += 1;
    }
}
