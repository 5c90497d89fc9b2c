//! IPC error types

use thiserror::Error;

/// Failure reported by a kernel backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("Invalid capability")]
    InvalidCapability,

    #[error("Invalid destination capability")]
    InvalidDestination,

    #[error("Out of capability handles")]
    OutOfHandles,

    #[error("Peer went away before the exchange completed")]
    Disconnected,

    #[error("Blocking operation canceled")]
    Canceled,

    #[error("Execution context torn down")]
    TornDown,

    #[error("Kernel error code {0}")]
    Code(i64),
}

/// Capability space failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapSpaceError {
    #[error("Capability space full (capacity: {capacity})")]
    Full { capacity: usize },

    #[error("Invalid capability")]
    InvalidCapability,
}

/// Errors surfaced to the RPC layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IpcError {
    /// The kernel failed to carry the call; never retried
    #[error("Transport error: {0}")]
    Transport(KernelError),

    /// The blocked call was externally unblocked
    #[error("Blocking canceled")]
    BlockingCanceled,

    #[error("Receive window exhausted ({reserved} of {needed} slots reserved)")]
    WindowExhausted { reserved: usize, needed: usize },

    #[error(transparent)]
    CapSpace(#[from] CapSpaceError),
}

impl From<KernelError> for IpcError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::Canceled => IpcError::BlockingCanceled,
            other => IpcError::Transport(other),
        }
    }
}

pub type Result<T> = core::result::Result<T, IpcError>;
