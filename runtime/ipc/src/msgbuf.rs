//! Message buffers
//!
//! A [`MsgBuf`] stages the data payload and capability arguments of exactly
//! one call or reply. Storage is word-aligned and its capacity is fixed at
//! compile time (usually from an interface layout, see [`crate::interface`]).
//!
//! ## Marshalling
//!
//! Values are appended at word-aligned offsets:
//!
//! ```text
//!  word 0      word 1      word 2 .. 2+ceil(n/8)
//! +-----------+-----------+----------------------+
//! | u32 value | byte len n| bytes (zero padded)  |
//! +-----------+-----------+----------------------+
//! ```
//!
//! [`MsgReader`] walks the same layout on the receiving side.
//!
//! Writing past the capacity is a precondition violation and panics; the
//! capacity is sized from the interface, so an overflow is a stub bug.

use core::mem::size_of;

use crate::capability::Capability;
use crate::config::{Word, MAX_CAPS_PER_MSG, WORD_SIZE};

/// Types that can be copied to and from message words verbatim
///
/// # Safety
/// Every bit pattern of `size_of::<Self>()` bytes must be a valid value.
pub unsafe trait Plain: Copy {}

macro_rules! impl_plain {
    ($($ty:ty),* $(,)?) => {
        $(unsafe impl Plain for $ty {})*
    };
}

impl_plain!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

#[inline]
const fn words_for(bytes: usize) -> usize {
    bytes.div_ceil(WORD_SIZE)
}

/// Fixed-capacity message buffer
pub struct MsgBuf<const WORDS: usize> {
    words: [Word; WORDS],
    used_words: usize,
    caps: [Capability; MAX_CAPS_PER_MSG],
    used_caps: usize,
}

impl<const WORDS: usize> MsgBuf<WORDS> {
    pub const fn new() -> Self {
        Self {
            words: [0; WORDS],
            used_words: 0,
            caps: [Capability::invalid(); MAX_CAPS_PER_MSG],
            used_caps: 0,
        }
    }

    /// Forget payload and capabilities (storage is left as is)
    pub fn reset(&mut self) {
        self.used_words = 0;
        self.used_caps = 0;
    }

    /// Payload capacity in bytes
    pub const fn capacity(&self) -> usize {
        WORDS * WORD_SIZE
    }

    /// Payload capacity in words
    pub const fn capacity_words(&self) -> usize {
        WORDS
    }

    pub fn data_size(&self) -> usize {
        self.used_words * WORD_SIZE
    }

    /// Written payload as bytes
    pub fn data(&self) -> &[u8] {
        let words = self.words();
        // SAFETY: reinterpreting initialized words as bytes; u8 has no alignment
        // requirement and the length covers exactly the written words.
        unsafe { core::slice::from_raw_parts(words.as_ptr().cast::<u8>(), words.len() * WORD_SIZE) }
    }

    /// Written payload as words
    pub fn words(&self) -> &[Word] {
        &self.words[..self.used_words]
    }

    pub fn used_caps(&self) -> usize {
        self.used_caps
    }

    /// Append a capability argument
    ///
    /// Capabilities beyond [`MAX_CAPS_PER_MSG`] are dropped.
    pub fn insert_capability(&mut self, cap: Capability) {
        if self.used_caps >= MAX_CAPS_PER_MSG {
            log::warn!("msgbuf: dropping capability {:?}, message already carries {} capabilities",
                cap.key(), MAX_CAPS_PER_MSG);
            return;
        }
        self.caps[self.used_caps] = cap;
        self.used_caps += 1;
    }

    /// Capability argument `index`, or the invalid capability
    pub fn capability_at(&self, index: usize) -> Capability {
        if index < self.used_caps {
            self.caps[index]
        } else {
            Capability::invalid()
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.caps[..self.used_caps]
    }

    /// Append one word
    pub fn insert_word(&mut self, word: Word) {
        self.reserve(1)[0] = word;
    }

    /// Append a value at the next word boundary
    pub fn insert<T: Plain>(&mut self, value: &T) {
        let size = size_of::<T>();
        let dst = self.reserve(words_for(size));
        dst.fill(0);
        // SAFETY: `dst` spans at least `size` bytes and `T: Plain` has no
        // padding-sensitive invariants; the source is a valid `T`.
        unsafe {
            core::ptr::copy_nonoverlapping(
                (value as *const T).cast::<u8>(),
                dst.as_mut_ptr().cast::<u8>(),
                size,
            );
        }
    }

    /// Append a length-prefixed byte string, padded to a word boundary
    pub fn insert_bytes(&mut self, bytes: &[u8]) {
        let needed = 1 + words_for(bytes.len());
        let dst = self.reserve(needed);
        dst.fill(0);
        dst[0] = bytes.len() as Word;
        for (word, chunk) in dst[1..].iter_mut().zip(bytes.chunks(WORD_SIZE)) {
            let mut raw = [0u8; WORD_SIZE];
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = Word::from_ne_bytes(raw);
        }
    }

    /// Replace the payload with `words`, truncating to the capacity
    ///
    /// Returns the number of words that did not fit.
    pub fn set_data_words(&mut self, words: &[Word]) -> usize {
        let fit = words.len().min(WORDS);
        self.words[..fit].copy_from_slice(&words[..fit]);
        self.used_words = fit;
        words.len() - fit
    }

    /// Start reading the payload from the beginning
    pub fn reader(&self) -> MsgReader<'_> {
        MsgReader::new(self.words())
    }

    fn reserve(&mut self, count: usize) -> &mut [Word] {
        let start = self.used_words;
        let end = start + count;
        assert!(
            end <= WORDS,
            "message buffer overflow: {} words needed, capacity is {}",
            end,
            WORDS
        );
        self.used_words = end;
        &mut self.words[start..end]
    }
}

impl<const WORDS: usize> Default for MsgBuf<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> core::fmt::Debug for MsgBuf<WORDS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MsgBuf")
            .field("capacity_words", &WORDS)
            .field("words", &self.words())
            .field("caps", &self.capabilities())
            .finish()
    }
}

/// Sequential reader over a received payload
pub struct MsgReader<'a> {
    words: &'a [Word],
    offset: usize,
}

impl<'a> MsgReader<'a> {
    pub fn new(words: &'a [Word]) -> Self {
        Self { words, offset: 0 }
    }

    /// Words not consumed yet
    pub fn remaining(&self) -> usize {
        self.words.len() - self.offset
    }

    pub fn extract_word(&mut self) -> Option<Word> {
        self.take(1).map(|w| w[0])
    }

    /// Read the next value written by [`MsgBuf::insert`]
    pub fn extract<T: Plain>(&mut self) -> Option<T> {
        let src = self.take(words_for(size_of::<T>()))?;
        // SAFETY: `src` covers at least `size_of::<T>()` initialized bytes and
        // any bit pattern is a valid `T`.
        Some(unsafe { core::ptr::read_unaligned(src.as_ptr().cast::<T>()) })
    }

    /// Read the next byte string written by [`MsgBuf::insert_bytes`]
    pub fn extract_bytes(&mut self) -> Option<&'a [u8]> {
        let start = self.offset;
        let len = self.extract_word()? as usize;
        match self.take(words_for(len)) {
            Some(src) => {
                // SAFETY: `src` holds at least `len` initialized bytes.
                Some(unsafe { core::slice::from_raw_parts(src.as_ptr().cast::<u8>(), len) })
            }
            None => {
                self.offset = start;
                None
            }
        }
    }

    fn take(&mut self, count: usize) -> Option<&'a [Word]> {
        if count > self.remaining() {
            log::warn!(
                "msgbuf: read of {} words past end of payload ({} left)",
                count,
                self.remaining()
            );
            return None;
        }
        let words = self.words;
        let out = &words[self.offset..self.offset + count];
        self.offset += count;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Handle, ObjectKey};

    #[test]
    fn test_insert_and_extract_values() {
        let mut buf: MsgBuf<8> = MsgBuf::new();
        buf.insert(&0x2Au32);
        buf.insert(&-5i64);
        buf.insert(&[1u8, 2, 3]);

        assert_eq!(buf.data_size(), 3 * WORD_SIZE);

        let mut reader = buf.reader();
        assert_eq!(reader.extract::<u32>(), Some(0x2A));
        assert_eq!(reader.extract::<i64>(), Some(-5));
        assert_eq!(reader.extract::<[u8; 3]>(), Some([1, 2, 3]));
        assert_eq!(reader.extract::<u64>(), None);
    }

    #[test]
    fn test_bytes_are_length_prefixed_and_padded() {
        let mut buf: MsgBuf<8> = MsgBuf::new();
        buf.insert_bytes(b"hello, kaal");
        buf.insert_word(7);

        // length word + two data words + trailing word
        assert_eq!(buf.words().len(), 4);
        assert_eq!(buf.words()[0], 11);

        let mut reader = buf.reader();
        assert_eq!(reader.extract_bytes(), Some(&b"hello, kaal"[..]));
        assert_eq!(reader.extract_word(), Some(7));
    }

    #[test]
    fn test_truncated_bytes_do_not_consume() {
        let mut reader = MsgReader::new(&[100, 1]);
        assert_eq!(reader.extract_bytes(), None);
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut buf: MsgBuf<4> = MsgBuf::new();
        buf.insert_word(1);
        buf.insert_capability(Capability::new(ObjectKey::new(3), Handle::new(3)));

        buf.reset();
        buf.reset();

        assert_eq!(buf.data_size(), 0);
        assert_eq!(buf.used_caps(), 0);
        assert!(!buf.capability_at(0).is_valid());
        assert_eq!(buf.capacity(), 4 * WORD_SIZE);
    }

    #[test]
    fn test_capabilities_capped_at_max() {
        let mut buf: MsgBuf<1> = MsgBuf::new();
        for i in 0..(MAX_CAPS_PER_MSG as u64 + 2) {
            buf.insert_capability(Capability::new(ObjectKey::new(i), Handle::new(i + 1)));
        }

        assert_eq!(buf.used_caps(), MAX_CAPS_PER_MSG);
        assert_eq!(buf.capability_at(0).key(), ObjectKey::new(0));
        assert!(!buf.capability_at(MAX_CAPS_PER_MSG).is_valid());
    }

    #[test]
    fn test_set_data_words_truncates() {
        let mut buf: MsgBuf<2> = MsgBuf::new();
        assert_eq!(buf.set_data_words(&[1, 2, 3, 4]), 2);
        assert_eq!(buf.words(), &[1, 2]);
        assert_eq!(buf.set_data_words(&[9]), 0);
        assert_eq!(buf.words(), &[9]);
    }

    #[test]
    #[should_panic(expected = "message buffer overflow")]
    fn test_overflow_panics() {
        let mut buf: MsgBuf<1> = MsgBuf::new();
        buf.insert_word(1);
        buf.insert_word(2);
    }
}
