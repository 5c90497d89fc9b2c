//! Kernel backends
//!
//! Each backend wraps a syscall trait for its kernel and implements
//! [`Transport`](crate::Transport) on top of it. Backends are selected with
//! the `sel4` and `nova` Cargo features; both are on by default.

#[cfg(feature = "nova")]
pub mod nova;
#[cfg(feature = "sel4")]
pub mod sel4;

#[cfg(feature = "nova")]
pub use nova::{NovaSyscalls, NovaTransport, Utcb};
#[cfg(feature = "sel4")]
pub use sel4::{Sel4Ipc, Sel4Syscalls, Sel4Transport};

/// Names of the backends compiled into this build
pub const fn available() -> &'static [&'static str] {
    match (cfg!(feature = "sel4"), cfg!(feature = "nova")) {
        (true, true) => &["sel4", "nova"],
        (true, false) => &["sel4"],
        (false, true) => &["nova"],
        (false, false) => &[],
    }
}
