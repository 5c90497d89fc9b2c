//! Compile-time IPC configuration
//!
//! Message layout constants shared by every backend. Backend register budgets
//! live next to their register images in [`crate::backend`].

use static_assertions::const_assert;

/// Machine word carried in message registers
pub type Word = u64;

/// Size of a [`Word`] in bytes
pub const WORD_SIZE: usize = core::mem::size_of::<Word>();

/// Maximum capabilities carried by one message (in either direction)
pub const MAX_CAPS_PER_MSG: usize = 4;

/// Upper bound of any backend register image (one 4 KiB IPC buffer page)
pub const MAX_MSG_WORDS: usize = 4096 / WORD_SIZE;

/// Protocol word + capability count
pub const HEADER_WORDS: usize = 2;

/// Object key marking an absent or invalid capability on the wire
pub const INVALID_OBJECT_KEY: Word = Word::MAX;

/// Default number of entries in a process capability space
pub const CAP_SPACE_ENTRIES: usize = 256;

/// Default request/reply buffer size of a server entrypoint, in words
pub const ENTRYPOINT_BUFFER_WORDS: usize = 1024 / WORD_SIZE;

const_assert!(MAX_CAPS_PER_MSG <= 8);
const_assert!(HEADER_WORDS + MAX_CAPS_PER_MSG + 1 < MAX_MSG_WORDS);
const_assert!(ENTRYPOINT_BUFFER_WORDS <= MAX_MSG_WORDS);
