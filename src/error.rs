use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or unusable settings, detected before any network attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Remote command `{command}` failed: {stderr}")]
    RemoteCommand { command: String, stderr: String },

    #[error("Local path error: {0}")]
    LocalPath(String),

    /// A caller-supplied argument was rejected before any remote action.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file could not be located or parsed.
    #[error("Config file error: {0}")]
    ConfigFile(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// True for errors raised before any remote interaction.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_) | AppError::LocalPath(_) | AppError::InvalidArgument(_)
        )
    }

    /// True for failures establishing or using a session, including timeouts.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Connection(_) | AppError::Auth(_) | AppError::Timeout(_) | AppError::Cancelled
        )
    }
}

/// Serializable error for the handler layer
#[derive(Debug, Serialize)]
pub struct SerializableError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for SerializableError {
    fn from(err: &AppError) -> Self {
        let (code, message, details) = match err {
            AppError::Configuration(msg) => ("CONFIGURATION_ERROR", msg.clone(), None),
            AppError::Connection(msg) => ("CONNECTION_ERROR", msg.clone(), None),
            AppError::Auth(msg) => ("AUTH_ERROR", "Authentication failed".to_string(), Some(msg.clone())),
            AppError::Timeout(msg) => ("TIMEOUT", msg.clone(), None),
            AppError::Cancelled => ("CANCELLED", "Operation cancelled".to_string(), None),
            AppError::RemoteCommand { command, stderr } => (
                "REMOTE_COMMAND_ERROR",
                stderr.clone(),
                Some(command.clone()),
            ),
            AppError::LocalPath(msg) => ("LOCAL_PATH_ERROR", msg.clone(), None),
            AppError::InvalidArgument(msg) => ("INVALID_ARGUMENT", msg.clone(), None),
            AppError::Io(e) => ("IO_ERROR", e.to_string(), None),
            AppError::ConfigFile(msg) => ("CONFIG_FILE_ERROR", msg.clone(), None),
            AppError::Serialization(msg) => ("SERIALIZATION_ERROR", msg.clone(), None),
        };

        SerializableError {
            code: code.to_string(),
            message,
            details,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        SerializableError::from(self).serialize(serializer)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::ConfigFile(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<ssh2::Error> for AppError {
    fn from(err: ssh2::Error) -> Self {
        match err.code() {
            // LIBSSH2_ERROR_TIMEOUT
            ssh2::ErrorCode::Session(-9) => AppError::Timeout(err.message().to_string()),
            _ => AppError::Connection(err.message().to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
