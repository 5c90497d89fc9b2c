//! KaaL IPC - Synchronous capability-based inter-process communication
//!
//! # Purpose
//! Moves one request and one reply between isolated protection domains. Every
//! request targets a capability (an unforgeable reference to a server-side
//! object), and capabilities themselves can travel as arguments.
//!
//! # Integration Points
//! - Depends on: the kernel IPC primitive (blocking call / reply-and-wait)
//!   behind the [`Transport`] trait
//! - Provides to: RPC stubs and server entrypoints of all components
//! - IPC endpoints: one endpoint per server entrypoint, one capability per
//!   served object (the capability label is the object key)
//! - Capabilities required: a handle quota large enough for the receive
//!   window of every execution context
//!
//! # Architecture
//! ```text
//!  client                                          server
//!  MsgBuf --encode--> Registers --kernel--> Registers --decode--> MsgBuf
//!                                                       |
//!                                          badge == label ? dispatch : drop
//!  MsgBuf <--decode-- Registers <--kernel-- Registers <--encode-- MsgBuf
//! ```
//! The wire layout is identical for every backend: protocol word, capability
//! count, one object key per capability, then the word-aligned payload. Only
//! the transfer descriptors and the register budget differ per kernel.
//!
//! # Testing Strategy
//! - Unit tests: buffers, size calculus, wire codec, capability space
//! - Integration tests: the `kaal-mock-kernel` conformance suite runs the
//!   same properties against every backend

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

// Lets `rpc_interface!` expansions inside this crate refer to `::kaal_ipc`.
extern crate self as kaal_ipc;

pub mod backend;
pub mod cap_space;
pub mod capability;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod interface;
pub mod msgbuf;
pub mod receive_window;
pub mod server;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use cap_space::{Binding, CapSpace};
pub use capability::{Capability, Handle, ObjectKey};
pub use client::call;
pub use config::{Word, MAX_CAPS_PER_MSG, WORD_SIZE};
pub use context::IpcContext;
pub use error::{CapSpaceError, IpcError, KernelError, Result};
pub use interface::{InterfaceLayout, RpcExceptionCode, RpcFunction};
pub use msgbuf::{MsgBuf, MsgReader, Plain};
pub use receive_window::ReceiveWindow;
pub use server::{Dispatcher, IpcServer, ServerConfig, ServerState, ServerStats};
pub use transport::{HandleSpace, Incoming, Registers, Transport};

#[cfg(feature = "macros")]
pub use kaal_ipc_macros::rpc_interface;
