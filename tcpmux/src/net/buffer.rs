/// Default receive buffer capacity in bytes.
pub(crate) const DEFAULT_CAPACITY: usize = 512;

/// A connection's receive buffer.
///
/// The first `pending` bytes are the unconsumed prefix: bytes already
/// taken off the network but not yet handed to the caller. They must come
/// first in the next read's result. The storage beyond the prefix is the
/// scratch area that receives land in.
///
/// Capacity only ever grows, doubling each time.
#[derive(Debug)]
pub(crate) struct ReceiveBuffer {
    storage: Vec<u8>,
    pending: usize,
}

impl ReceiveBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity.max(1)],
            pending: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending > 0
    }

    /// Grows the capacity to at least `capacity`. Never shrinks.
    pub(crate) fn reserve(&mut self, capacity: usize) {
        if capacity <= self.storage.len() {
            return;
        }

        let mut new_len = self.storage.len().max(1);
        while new_len < capacity {
            new_len *= 2;
        }
        self.storage.resize(new_len, 0);
    }

    /// Whole storage as a receive target. The prefix must have been
    /// taken first.
    pub(crate) fn scratch(&mut self) -> &mut [u8] {
        debug_assert_eq!(self.pending, 0, "scratch would overwrite pending bytes");
        &mut self.storage
    }

    /// Moves the unconsumed prefix out of the buffer.
    pub(crate) fn take_pending(&mut self) -> Vec<u8> {
        let prefix = self.storage[..self.pending].to_vec();
        self.pending = 0;
        prefix
    }

    /// Stores `bytes` as the new unconsumed prefix.
    pub(crate) fn stash(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.storage[..bytes.len()].copy_from_slice(bytes);
        self.pending = bytes.len();
    }

    /// Splits the prefix right after the first `delimiter`, if it holds one.
    ///
    /// The returned message includes the delimiter; what follows it stays
    /// pending.
    pub(crate) fn split_pending(&mut self, delimiter: &[u8]) -> Option<Vec<u8>> {
        let at = find(&self.storage[..self.pending], delimiter)?;
        let end = at + delimiter.len();

        let message = self.storage[..end].to_vec();
        self.storage.copy_within(end..self.pending, 0);
        self.pending -= end;

        Some(message)
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Appends `bytes`, at least doubling the allocation when it runs out.
pub(crate) fn append(out: &mut Vec<u8>, bytes: &[u8]) {
    let free = out.capacity() - out.len();
    if free < bytes.len() {
        out.reserve(out.capacity().max(bytes.len()));
    }
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_locates_first_occurrence() {
        assert_eq!(find(b"hello\nworld\n", b"\n"), Some(5));
        assert_eq!(find(b"a\r\nb\r\n", b"\r\n"), Some(1));
        assert_eq!(find(b"abc", b"abcd"), None);
        assert_eq!(find(b"abc", b""), None);
    }

    #[test]
    fn split_keeps_the_tail_pending() {
        let mut buffer = ReceiveBuffer::new(8);
        buffer.stash(b"one\ntwo\nthr");

        assert_eq!(buffer.split_pending(b"\n").as_deref(), Some(&b"one\n"[..]));
        assert_eq!(buffer.split_pending(b"\n").as_deref(), Some(&b"two\n"[..]));
        assert_eq!(buffer.split_pending(b"\n"), None);

        assert_eq!(buffer.pending_len(), 3);
        assert_eq!(buffer.take_pending(), b"thr");
        assert!(!buffer.has_pending());
    }

    #[test]
    fn capacity_doubles_and_never_shrinks() {
        let mut buffer = ReceiveBuffer::new(4);
        buffer.stash(b"0123456789");
        assert_eq!(buffer.capacity(), 16);

        buffer.reserve(2);
        assert_eq!(buffer.capacity(), 16);

        buffer.reserve(17);
        assert_eq!(buffer.capacity(), 32);
        assert_eq!(buffer.take_pending(), b"0123456789");
    }

    #[test]
    fn append_grows_geometrically() {
        let mut out = Vec::with_capacity(4);
        append(&mut out, b"abcd");
        append(&mut out, b"e");

        assert!(out.capacity() >= 8);
        assert_eq!(out, b"abcde");
    }
}
