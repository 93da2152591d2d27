use super::{shell_join, Connector, ExecOutput, RemoteConnectionParams, Transport};
use crate::context::CallContext;
use crate::error::{AppError, AppResult};
use crate::logging::sanitize;
use sha2::{Digest, Sha256};
use ssh2::{HostKeyType, Session as Ssh2Session, Sftp};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

const COPY_CHUNK: usize = 64 * 1024;

/// Opens real SSH sessions with libssh2.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    fn connect(
        &self,
        params: &RemoteConnectionParams,
        ctx: &CallContext,
    ) -> AppResult<Box<dyn Transport>> {
        Ok(Box::new(SshSession::connect(params, ctx)?))
    }
}

/// One authenticated SSH connection, released on drop.
pub struct SshSession {
    target: String,
    session: Ssh2Session,
    // Opened on first stat/mkdir; uploads use SCP on the main session.
    sftp: Option<Sftp>,
    ctx: CallContext,
}

impl SshSession {
    /// Connect, handshake and authenticate.
    pub fn connect(params: &RemoteConnectionParams, ctx: &CallContext) -> AppResult<Self> {
        if params.host.is_empty() || params.username.is_empty() {
            return Err(AppError::Connection(
                "host and username are required".to_string(),
            ));
        }
        ctx.checkpoint()?;

        let target = params.target();
        tracing::info!("Connecting to {}", target);

        let tcp = connect_tcp(&params.host, params.port, ctx.bounded(params.connect_timeout))?;
        tcp.set_nodelay(true)?;

        let mut session = Ssh2Session::new()
            .map_err(|e| AppError::Connection(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_millis(ctx.bounded(params.connect_timeout)));

        session.handshake().map_err(|e| match AppError::from(e) {
            AppError::Timeout(msg) => AppError::Timeout(format!("SSH handshake timed out: {}", msg)),
            AppError::Connection(msg) => AppError::Connection(format!("SSH handshake failed: {}", msg)),
            other => other,
        })?;

        accept_host_key(&session, &target)?;
        authenticate(&session, params)?;

        tracing::info!("SSH session established with {}", target);

        let mut ssh = Self {
            target,
            session,
            sftp: None,
            ctx: ctx.clone(),
        };
        ssh.apply_deadline()?;
        Ok(ssh)
    }

    /// Re-check the call context and bound the next blocking libssh2 call.
    fn apply_deadline(&mut self) -> AppResult<()> {
        self.ctx.checkpoint()?;
        let millis = match self.ctx.remaining() {
            Some(left) => timeout_millis(left),
            // 0 means no timeout in libssh2
            None => 0,
        };
        self.session.set_timeout(millis);
        Ok(())
    }

    fn sftp(&mut self) -> AppResult<&Sftp> {
        if self.sftp.is_none() {
            let sftp = self
                .session
                .sftp()
                .map_err(|e| AppError::Connection(format!("Failed to open SFTP: {}", e)))?;
            self.sftp = Some(sftp);
        }
        self.sftp
            .as_ref()
            .ok_or_else(|| AppError::Connection("SFTP channel unavailable".to_string()))
    }
}

impl Transport for SshSession {
    fn exec(&mut self, argv: &[&str]) -> AppResult<ExecOutput> {
        self.apply_deadline()?;
        let command = shell_join(argv);
        tracing::debug!("[{}] exec: {}", self.target, command);

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| AppError::Connection(format!("Failed to open channel: {}", e)))?;
        channel.exec(&command)?;

        let mut stdout = Vec::new();
        copy_in_chunks(&mut channel, &mut stdout, &self.ctx, "read stdout")?;
        let mut stderr = Vec::new();
        copy_in_chunks(&mut channel.stderr(), &mut stderr, &self.ctx, "read stderr")?;
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;

        if exit_code != 0 {
            tracing::debug!(
                "[{}] `{}` exited with {}: {}",
                self.target,
                command,
                exit_code,
                sanitize(stderr.trim())
            );
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    fn path_exists(&mut self, remote_path: &str) -> AppResult<bool> {
        self.apply_deadline()?;
        let sftp = self.sftp()?;
        match sftp.stat(Path::new(remote_path)) {
            Ok(_) => Ok(true),
            // LIBSSH2_FX_NO_SUCH_FILE
            Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(false),
            Err(e) => Err(AppError::from(e)),
        }
    }

    fn make_dir(&mut self, remote_path: &str) -> AppResult<()> {
        self.apply_deadline()?;
        tracing::debug!("[{}] mkdir {}", self.target, remote_path);
        self.sftp()?
            .mkdir(Path::new(remote_path), 0o755)
            .map_err(|e| remote_failure(format!("mkdir {}", remote_path), e))
    }

    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> AppResult<u64> {
        self.apply_deadline()?;
        let mut file = File::open(local_path)?;
        let metadata = file.metadata()?;
        let size = metadata.len();

        let mut channel = self
            .session
            .scp_send(Path::new(remote_path), file_mode(&metadata), size, None)
            .map_err(|e| remote_failure(format!("scp {}", remote_path), e))?;

        let copied = copy_in_chunks(&mut file, &mut channel, &self.ctx, "upload")?;
        channel.flush().map_err(|e| io_to_connection("upload", e))?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;

        tracing::debug!("[{}] uploaded {} -> {} ({} bytes)", self.target, local_path.display(), remote_path, copied);
        Ok(copied)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        // The SFTP channel must go before the session it runs on.
        self.sftp.take();
        let _ = self
            .session
            .disconnect(None, "homelab-ops: operation complete", None);
        tracing::debug!("SSH session with {} released", self.target);
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> AppResult<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| AppError::Connection(format!("Could not resolve {}: {}", host, e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            AppError::Timeout(format!("TCP connect to {}:{} timed out", host, port))
        }
        Some(e) => AppError::Connection(format!("TCP connect failed: {}", e)),
        None => AppError::Connection(format!("No addresses found for {}", host)),
    })
}

/// Any host key is accepted; the fingerprint is logged so it can be audited.
fn accept_host_key(session: &Ssh2Session, target: &str) -> AppResult<()> {
    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| AppError::Connection("No host key received".to_string()))?;

    let key_type_str = match key_type {
        HostKeyType::Rsa => "ssh-rsa",
        HostKeyType::Dss => "ssh-dss",
        HostKeyType::Ecdsa256 => "ecdsa-sha2-nistp256",
        HostKeyType::Ecdsa384 => "ecdsa-sha2-nistp384",
        HostKeyType::Ecdsa521 => "ecdsa-sha2-nistp521",
        HostKeyType::Ed25519 => "ssh-ed25519",
        _ => "unknown",
    };

    tracing::info!(
        "Accepting {} host key for {} without verification ({})",
        key_type_str,
        target,
        compute_sha256_fingerprint(key)
    );
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum AuthMethod<'a> {
    Key(&'a Path),
    Password(&'a str),
}

/// A key that can be opened wins; otherwise the password, empty if unset.
fn auth_method(params: &RemoteConnectionParams) -> AuthMethod<'_> {
    match params.key_path.as_deref() {
        Some(path) if File::open(path).is_ok() => AuthMethod::Key(path),
        _ => AuthMethod::Password(params.password.as_deref().unwrap_or_default()),
    }
}

fn authenticate(session: &Ssh2Session, params: &RemoteConnectionParams) -> AppResult<()> {
    match auth_method(params) {
        AuthMethod::Key(key_path) => {
            session
                .userauth_pubkey_file(
                    &params.username,
                    None,
                    key_path,
                    params.key_passphrase.as_deref(),
                )
                .map_err(|e| {
                    let msg = e.message().to_lowercase();
                    if msg.contains("passphrase") || msg.contains("decrypt") || msg.contains("parse") {
                        AppError::Auth("Invalid passphrase or key format. Ensure the key is in PEM or OpenSSH format.".to_string())
                    } else {
                        AppError::Auth("Private key not accepted by server".to_string())
                    }
                })?;
        }
        AuthMethod::Password(password) => {
            if params.key_path.is_some() {
                tracing::warn!("Private key for {} is not readable, falling back to password", params.target());
            }
            session
                .userauth_password(&params.username, password)
                .map_err(|_| AppError::Auth("Password authentication failed".to_string()))?;
        }
    }

    if !session.authenticated() {
        return Err(AppError::Auth("Authentication failed".to_string()));
    }
    Ok(())
}

/// Compute SHA256 fingerprint of a key
fn compute_sha256_fingerprint(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    let result = hasher.finalize();

    // Format as SHA256:base64
    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &result);
    format!("SHA256:{}", b64.trim_end_matches('='))
}

fn timeout_millis(timeout: Duration) -> u32 {
    timeout.as_millis().clamp(1, u32::MAX as u128) as u32
}

/// Copy `reader` into `writer`, re-checking the call context before every chunk.
fn copy_in_chunks<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    ctx: &CallContext,
    stage: &str,
) -> AppResult<u64> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        ctx.checkpoint()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_to_connection(stage, e)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| io_to_connection(stage, e))?;
        total += n as u64;
    }
}

/// A remote action was refused; a libssh2 timeout stays a timeout.
fn remote_failure(command: String, err: ssh2::Error) -> AppError {
    match AppError::from(err) {
        AppError::Connection(stderr) => AppError::RemoteCommand { command, stderr },
        other => other,
    }
}

fn io_to_connection(stage: &str, err: std::io::Error) -> AppError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        AppError::Timeout(format!("{} timed out", stage))
    } else {
        AppError::Connection(format!("{} failed: {}", stage, err))
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    (metadata.permissions().mode() & 0o777) as i32
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> i32 {
    0o644
}
