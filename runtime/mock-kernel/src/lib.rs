//! Mock Kernel - in-process IPC kernel for KaaL IPC testing
//!
//! # WARNING: This is NOT a real kernel!
//!
//! Protection domains, handles and endpoints are plain data structures inside
//! one host process; threads are `std::thread`s and the blocking IPC
//! rendezvous is a `crossbeam` channel. It exists so the transport, codec and
//! server loop can be exercised end to end on a development machine.
//!
//! ## What is simulated
//!
//! - Protection domains with a handle quota
//! - Objects owned by a server domain, labelled with their object key
//! - Handles (CSpace slots / selectors), granted between domains
//! - Blocking call, reply and wait on endpoints, in FIFO order
//! - Capability transfer: *unwrapped/translated* if the receiver owns the
//!   object, otherwise *delegated* into the receiver's window slots
//! - Cancellation of a blocked thread and teardown of a server
//!
//! ## Syscall personalities
//!
//! [`MockThread`] implements both `Sel4Syscalls` (`ReplyRecv` in one step)
//! and `NovaSyscalls` (separate `reply` and `wait`), so one suite can run
//! against both transports.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let kernel = MockKernel::new();
//! let server_pd = kernel.create_domain("server", 32);
//! let client_pd = kernel.create_domain("client", 32);
//!
//! let server = kernel.server(server_pd);
//! let obj = server.create_object(0x10)?;
//! let granted = kernel.grant(server_pd, obj, client_pd)?;
//! ```

mod kernel;
mod nova;
mod sel4;
mod thread;

use kaal_ipc::{Handle, KernelError};
use thiserror::Error;

pub use kernel::{DomainId, MockKernel};
pub use thread::{MockThread, ThreadControl};

/// Errors of mock-kernel setup operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MockError {
    #[error("Thread has no endpoint (not created with MockKernel::server)")]
    NotAServer,

    #[error("Unknown handle {0:?}")]
    UnknownHandle(Handle),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}
