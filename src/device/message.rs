/*!
 * Message Store
 *
 * Capacity-bounded reply buffer shared between the caller context and the
 * timer completion path. The buffer always holds a terminated C-style
 * string: at most `CAP - 1` payload bytes followed by a terminator, so the
 * payload ends at the first terminator byte.
 *
 * Snapshots are handed out as [`Message`] values backed by `bytes::Bytes`;
 * later writes never change a snapshot already returned.
 */

use crate::core::limits::{DEFAULT_MESSAGE, MESSAGE_CAPACITY, MESSAGE_TERMINATOR};
use bytes::Bytes;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fmt;

/// Immutable snapshot of the reply message (terminator excluded)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    bytes: Bytes,
}

impl Message {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether this is the message every session starts with
    pub fn is_default(&self) -> bool {
        self.as_bytes() == DEFAULT_MESSAGE
    }

    /// Payload followed by the terminator, as stored in the buffer
    pub fn to_bytes_with_terminator(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() + 1);
        out.extend_from_slice(&self.bytes);
        out.push(MESSAGE_TERMINATOR);
        out
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq<[u8]> for Message {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for Message {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

struct MessageBuffer<const CAP: usize> {
    bytes: [u8; CAP],
    /// Payload length; `bytes[len]` is always the terminator
    len: usize,
}

impl<const CAP: usize> MessageBuffer<CAP> {
    fn store(&mut self, input: &[u8]) -> usize {
        let accepted = input.len().min(CAP - 1);
        self.bytes[..accepted].copy_from_slice(&input[..accepted]);
        self.bytes[accepted] = MESSAGE_TERMINATOR;
        self.len = self.bytes[..accepted]
            .iter()
            .position(|&b| b == MESSAGE_TERMINATOR)
            .unwrap_or(accepted);
        accepted
    }
}

/// Reply buffer of `CAP` bytes, terminator included
pub struct MessageStore<const CAP: usize = MESSAGE_CAPACITY> {
    buffer: Mutex<MessageBuffer<CAP>>,
}

impl<const CAP: usize> MessageStore<CAP> {
    /// Largest payload the store keeps
    pub const MAX_PAYLOAD: usize = CAP - 1;

    /// The terminator needs at least one byte
    const HAS_ROOM: () = assert!(CAP > 0, "MessageStore capacity must be at least 1");

    /// Create a store holding the default message
    pub fn new() -> Self {
        let () = Self::HAS_ROOM;
        let mut buffer = MessageBuffer {
            bytes: [MESSAGE_TERMINATOR; CAP],
            len: 0,
        };
        buffer.store(DEFAULT_MESSAGE);
        Self {
            buffer: Mutex::new(buffer),
        }
    }

    /// Replace the message, keeping at most `CAP - 1` bytes of `input`
    ///
    /// Returns the number of input bytes accepted. Longer input is
    /// truncated silently.
    pub fn set(&self, input: &[u8]) -> usize {
        self.buffer.lock().store(input)
    }

    /// Restore the default message
    pub fn reset(&self) {
        self.buffer.lock().store(DEFAULT_MESSAGE);
    }

    /// Snapshot of the current message
    pub fn get(&self) -> Message {
        let buffer = self.buffer.lock();
        Message {
            bytes: Bytes::copy_from_slice(&buffer.bytes[..buffer.len]),
        }
    }

    /// Current payload length without copying
    pub fn len(&self) -> usize {
        self.buffer.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        CAP
    }
}

impl<const CAP: usize> Default for MessageStore<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> fmt::Debug for MessageStore<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStore")
            .field("capacity", &CAP)
            .field("message", &self.get().to_string_lossy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_starts_with_default() {
        let store: MessageStore = MessageStore::new();
        assert!(store.get().is_default());
        assert_eq!(store.capacity(), MESSAGE_CAPACITY);
    }

    #[test]
    fn test_set_and_reset() {
        let store: MessageStore = MessageStore::new();
        assert_eq!(store.set(b"Done!"), 5);
        assert_eq!(store.get().as_bytes(), b"Done!");

        store.reset();
        assert_eq!(store.get().as_bytes(), DEFAULT_MESSAGE);
    }

    #[test]
    fn test_truncates_to_capacity() {
        let store: MessageStore = MessageStore::new();
        let long = vec![b'x'; 400];

        assert_eq!(store.set(&long), 255);
        let message = store.get();
        assert_eq!(message.len(), 255);

        let stored = message.to_bytes_with_terminator();
        assert_eq!(stored.len(), 256);
        assert_eq!(stored[255], MESSAGE_TERMINATOR);
    }

    #[test]
    fn test_small_capacity_truncates_default() {
        let store = MessageStore::<6>::new();
        assert_eq!(store.get().as_bytes(), b"Timer");
        assert_eq!(MessageStore::<6>::MAX_PAYLOAD, 5);
    }

    #[test]
    fn test_single_byte_store_holds_only_terminator() {
        // Smallest capacity the const guard admits; zero fails to compile
        let store = MessageStore::<1>::new();
        assert!(store.is_empty());
        assert_eq!(store.set(b"abc"), 0);
        assert_eq!(store.get().to_bytes_with_terminator(), vec![0u8]);
    }

    #[test]
    fn test_payload_ends_at_terminator() {
        let store: MessageStore = MessageStore::new();
        assert_eq!(store.set(b"ab\0cd"), 5);
        assert_eq!(store.get().as_bytes(), b"ab");
    }

    #[test]
    fn test_empty_message() {
        let store: MessageStore = MessageStore::new();
        assert_eq!(store.set(b""), 0);
        assert!(store.get().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let store: MessageStore = MessageStore::new();
        store.set(b"first");
        let snapshot = store.get();
        store.set(b"second");
        assert_eq!(snapshot.as_bytes(), b"first");
    }

    proptest! {
        #[test]
        fn test_store_keeps_prefix(input in proptest::collection::vec(1u8..=255, 0..600)) {
            let store: MessageStore = MessageStore::new();
            let accepted = store.set(&input);

            let message = store.get();
            prop_assert_eq!(accepted, input.len().min(255));
            prop_assert_eq!(message.as_bytes(), &input[..accepted]);
        }
    }
}
