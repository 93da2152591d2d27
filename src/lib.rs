pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod ops;
pub mod ssh;
pub mod storage;

pub use context::CallContext;
pub use error::{AppError, AppResult};
pub use ops::{OperationResult, PoolDescriptor, RemoteOps, TransferOutcome};
pub use ssh::{Connector, RemoteConnectionParams, Transport};
