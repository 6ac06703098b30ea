//! Lossless byte ring holding whole length-prefixed messages back to back
//!
//! Every stored message starts with its own little-endian u16 length (the
//! explicit-length wire format), so the ring needs no side table. Writes
//! that would not fit are rejected whole.

/// Bounded circular buffer of complete messages
#[derive(Debug)]
pub struct MessageRing {
    buf: Box<[u8]>,
    read: usize,
    write: usize,
    len: usize,
}

impl MessageRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently stored
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Store one message given as two contiguous pieces
    ///
    /// Returns false without writing anything if the message does not fit.
    pub fn push_parts(&mut self, head: &[u8], tail: &[u8]) -> bool {
        if head.len() + tail.len() > self.free() {
            return false;
        }
        self.write_bytes(head);
        self.write_bytes(tail);
        true
    }

    /// Store one contiguous message
    pub fn push(&mut self, message: &[u8]) -> bool {
        self.push_parts(message, &[])
    }

    /// Length of the next message, read from its prefix
    pub fn peek_len(&self) -> Option<usize> {
        if self.len < 2 {
            return None;
        }
        let lo = self.buf[self.read];
        let hi = self.buf[(self.read + 1) % self.capacity()];
        Some(u16::from_le_bytes([lo, hi]) as usize)
    }

    /// Remove the next message, copying it into `out`
    ///
    /// Returns the message length. Returns `None` if the ring is empty, the
    /// stored prefix claims more bytes than are present, or `out` is too
    /// short; in those cases nothing is consumed.
    pub fn pop(&mut self, out: &mut [u8]) -> Option<usize> {
        let len = self.peek_len()?;
        if len == 0 || len > self.len || len > out.len() {
            return None;
        }

        let first = len.min(self.capacity() - self.read);
        out[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        out[first..len].copy_from_slice(&self.buf[..len - first]);

        self.read = (self.read + len) % self.capacity();
        self.len -= len;
        Some(len)
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let first = bytes.len().min(self.capacity() - self.write);
        self.buf[self.write..self.write + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        self.buf[..rest].copy_from_slice(&bytes[first..]);
        self.write = (self.write + bytes.len()) % self.capacity();
        self.len += bytes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(len: u16, fill: u8) -> Vec<u8> {
        let mut m = vec![fill; len as usize];
        m[..2].copy_from_slice(&len.to_le_bytes());
        m
    }

    #[test]
    fn test_push_pop() {
        let mut ring = MessageRing::new(32);
        assert!(ring.push(&message(5, 0xAA)));
        assert!(ring.push(&message(4, 0xBB)));
        assert_eq!(ring.len(), 9);

        let mut out = [0u8; 16];
        assert_eq!(ring.pop(&mut out), Some(5));
        assert_eq!(&out[..5], message(5, 0xAA).as_slice());
        assert_eq!(ring.pop(&mut out), Some(4));
        assert_eq!(&out[..4], message(4, 0xBB).as_slice());
        assert_eq!(ring.pop(&mut out), None);
    }

    #[test]
    fn test_wraps_around() {
        let mut ring = MessageRing::new(10);
        let mut out = [0u8; 10];
        assert!(ring.push(&message(6, 1)));
        assert_eq!(ring.pop(&mut out), Some(6));

        // Straddles the end of the buffer, including the length prefix
        let m = message(8, 2);
        assert!(ring.push_parts(&m[..3], &m[3..]));
        assert_eq!(ring.peek_len(), Some(8));
        assert_eq!(ring.pop(&mut out), Some(8));
        assert_eq!(&out[..8], m.as_slice());
    }

    #[test]
    fn test_rejects_when_full() {
        let mut ring = MessageRing::new(8);
        assert!(ring.push(&message(6, 1)));
        assert!(!ring.push(&message(3, 2)));
        assert_eq!(ring.len(), 6);
        assert!(ring.push(&message(2, 3)));
        assert_eq!(ring.free(), 0);
    }

    #[test]
    fn test_pop_needs_room() {
        let mut ring = MessageRing::new(16);
        ring.push(&message(6, 1));
        let mut out = [0u8; 4];
        assert_eq!(ring.pop(&mut out), None);
        assert_eq!(ring.len(), 6);
    }
}
