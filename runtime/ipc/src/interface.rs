//! Interface size calculus
//!
//! Message buffers are sized at build time from a declarative description of
//! an RPC interface. For every function:
//!
//! - call size = input arguments + 1 word (opcode)
//! - reply size = output arguments + return value + 1 word (exception code)
//!
//! The buffer capacity of an interface is the maximum over its functions, per
//! direction. Data arguments are rounded up to whole words; capability
//! arguments count against the capability budget instead.
//!
//! Everything here is `const`, so layouts can feed const generics:
//!
//! ```rust,ignore
//! const LAYOUT: InterfaceLayout = InterfaceLayout::of(FUNCTIONS);
//! let buf: MsgBuf<{ LAYOUT.call_words }> = MsgBuf::new();
//! ```
//!
//! The [`rpc_interface!`](crate::rpc_interface) macro generates these tables.

use crate::config::{Word, MAX_CAPS_PER_MSG, WORD_SIZE};

/// RPC exception code carried as the reply protocol word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcExceptionCode(i64);

impl RpcExceptionCode {
    pub const SUCCESS: Self = Self(0);
    pub const INVALID_OBJECT: Self = Self(-1);
    pub const INVALID_OPCODE: Self = Self(-2);
    pub const EXCEPTION_BASE: Self = Self(-1000);

    /// Code of the `index`-th exception a function declares
    pub const fn exception(index: usize) -> Self {
        Self(Self::EXCEPTION_BASE.0 - index as i64)
    }

    pub const fn to_word(self) -> Word {
        self.0 as Word
    }

    pub const fn from_word(word: Word) -> Self {
        Self(word as i64)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Index of a declared exception, if this is one
    pub const fn exception_index(self) -> Option<usize> {
        if self.0 <= Self::EXCEPTION_BASE.0 {
            Some((Self::EXCEPTION_BASE.0 - self.0) as usize)
        } else {
            None
        }
    }
}

/// Argument direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub const fn is_input(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub const fn is_output(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// What an argument or return value occupies in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Data { bytes: usize },
    Capability,
}

impl ArgKind {
    /// Plain data of type `T`
    pub const fn data<T>() -> Self {
        ArgKind::Data {
            bytes: core::mem::size_of::<T>(),
        }
    }

    pub const NONE: ArgKind = ArgKind::Data { bytes: 0 };

    pub const fn words(self) -> usize {
        match self {
            ArgKind::Data { bytes } => bytes.div_ceil(WORD_SIZE),
            ArgKind::Capability => 0,
        }
    }

    pub const fn caps(self) -> usize {
        match self {
            ArgKind::Data { .. } => 0,
            ArgKind::Capability => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RpcArg {
    pub name: &'static str,
    pub direction: Direction,
    pub kind: ArgKind,
}

/// One RPC function of an interface
#[derive(Debug, Clone, Copy)]
pub struct RpcFunction {
    pub name: &'static str,
    pub args: &'static [RpcArg],
    pub ret: ArgKind,
    pub exceptions: &'static [&'static str],
}

impl RpcFunction {
    /// Request words: inputs plus the opcode
    pub const fn call_words(&self) -> usize {
        let mut words = 1;
        let mut i = 0;
        while i < self.args.len() {
            if self.args[i].direction.is_input() {
                words += self.args[i].kind.words();
            }
            i += 1;
        }
        words
    }

    /// Reply words: outputs, return value and the exception code
    pub const fn reply_words(&self) -> usize {
        let mut words = 1 + self.ret.words();
        let mut i = 0;
        while i < self.args.len() {
            if self.args[i].direction.is_output() {
                words += self.args[i].kind.words();
            }
            i += 1;
        }
        words
    }

    pub const fn call_caps(&self) -> usize {
        let mut caps = 0;
        let mut i = 0;
        while i < self.args.len() {
            if self.args[i].direction.is_input() {
                caps += self.args[i].kind.caps();
            }
            i += 1;
        }
        caps
    }

    pub const fn reply_caps(&self) -> usize {
        let mut caps = self.ret.caps();
        let mut i = 0;
        while i < self.args.len() {
            if self.args[i].direction.is_output() {
                caps += self.args[i].kind.caps();
            }
            i += 1;
        }
        caps
    }

    /// Reply protocol word for the exception named `name`
    pub fn exception_code(&self, name: &str) -> Option<RpcExceptionCode> {
        self.exceptions
            .iter()
            .position(|exc| *exc == name)
            .map(RpcExceptionCode::exception)
    }
}

/// Buffer capacities of a whole interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceLayout {
    pub call_words: usize,
    pub reply_words: usize,
    pub call_caps: usize,
    pub reply_caps: usize,
}

impl InterfaceLayout {
    /// Maximum over `functions`, per direction
    ///
    /// # Panics
    /// At compile time (when const-evaluated) if a function moves more
    /// capabilities than one message can carry.
    pub const fn of(functions: &[RpcFunction]) -> Self {
        let mut layout = InterfaceLayout {
            call_words: 1,
            reply_words: 1,
            call_caps: 0,
            reply_caps: 0,
        };

        let mut i = 0;
        while i < functions.len() {
            let f = &functions[i];
            layout.call_words = max(layout.call_words, f.call_words());
            layout.reply_words = max(layout.reply_words, f.reply_words());
            layout.call_caps = max(layout.call_caps, f.call_caps());
            layout.reply_caps = max(layout.reply_caps, f.reply_caps());
            i += 1;
        }

        assert!(
            layout.call_caps <= MAX_CAPS_PER_MSG && layout.reply_caps <= MAX_CAPS_PER_MSG,
            "RPC function carries more capabilities than one message allows"
        );
        layout
    }

    pub const fn call_bytes(&self) -> usize {
        self.call_words * WORD_SIZE
    }

    pub const fn reply_bytes(&self) -> usize {
        self.reply_words * WORD_SIZE
    }
}

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO: RpcFunction = RpcFunction {
        name: "echo",
        args: &[RpcArg {
            name: "value",
            direction: Direction::In,
            kind: ArgKind::data::<u64>(),
        }],
        ret: ArgKind::NONE,
        exceptions: &[],
    };

    const LOOKUP: RpcFunction = RpcFunction {
        name: "lookup",
        args: &[
            RpcArg {
                name: "path",
                direction: Direction::In,
                kind: ArgKind::data::<[u8; 20]>(),
            },
            RpcArg {
                name: "session",
                direction: Direction::In,
                kind: ArgKind::Capability,
            },
            RpcArg {
                name: "cursor",
                direction: Direction::InOut,
                kind: ArgKind::data::<u32>(),
            },
        ],
        ret: ArgKind::Capability,
        exceptions: &["NotFound", "Denied"],
    };

    const STAT: RpcFunction = RpcFunction {
        name: "stat",
        args: &[RpcArg {
            name: "info",
            direction: Direction::Out,
            kind: ArgKind::data::<[u64; 4]>(),
        }],
        ret: ArgKind::data::<u64>(),
        exceptions: &["Io"],
    };

    #[test]
    fn test_single_input_word() {
        assert_eq!(ECHO.call_words(), 2);
        assert_eq!(ECHO.reply_words(), 1);
    }

    #[test]
    fn test_exception_and_return_word() {
        // One exception and a one-word return value
        assert_eq!(STAT.reply_words(), 1 + 4 + 1);
        let only_ret = RpcFunction {
            name: "get",
            args: &[],
            ret: ArgKind::data::<u64>(),
            exceptions: &["Io"],
        };
        assert!(only_ret.reply_words() >= 2);
    }

    #[test]
    fn test_mixed_arguments() {
        // opcode + ceil(20/8) + cursor
        assert_eq!(LOOKUP.call_words(), 1 + 3 + 1);
        // exception code + cursor
        assert_eq!(LOOKUP.reply_words(), 2);
        assert_eq!(LOOKUP.call_caps(), 1);
        assert_eq!(LOOKUP.reply_caps(), 1);
    }

    #[test]
    fn test_layout_takes_maximum() {
        const LAYOUT: InterfaceLayout = InterfaceLayout::of(&[ECHO, LOOKUP, STAT]);
        assert_eq!(LAYOUT.call_words, 5);
        assert_eq!(LAYOUT.reply_words, 6);
        assert_eq!(LAYOUT.call_caps, 1);
        assert_eq!(LAYOUT.reply_caps, 1);
        assert_eq!(LAYOUT.call_bytes(), 40);
    }

    #[test]
    fn test_empty_interface_still_carries_protocol_word() {
        const LAYOUT: InterfaceLayout = InterfaceLayout::of(&[]);
        assert_eq!(LAYOUT.call_words, 1);
        assert_eq!(LAYOUT.reply_words, 1);
    }

    #[test]
    fn test_exception_codes() {
        assert_eq!(RpcExceptionCode::exception(0), RpcExceptionCode::EXCEPTION_BASE);
        assert_eq!(LOOKUP.exception_code("Denied"), Some(RpcExceptionCode(-1001)));
        assert_eq!(LOOKUP.exception_code("Io"), None);

        let word = RpcExceptionCode::exception(3).to_word();
        assert_eq!(RpcExceptionCode::from_word(word).exception_index(), Some(3));
        assert_eq!(RpcExceptionCode::INVALID_OPCODE.exception_index(), None);
    }
}
