//! Fixed-capacity queue of timestamped reports that overwrites the oldest
//! entry when full
//!
//! Backs the continuous sampling feed of the implicit-size framing, where
//! losing old data under pressure is preferable to blocking the transport.

/// Circular queue of `(timestamp, fixed-size slot)` entries
#[derive(Debug)]
pub struct RollingQueue {
    slot_len: usize,
    data: Box<[u8]>,
    lens: Box<[usize]>,
    timestamps: Box<[i64]>,
    read: usize,
    write: usize,
    entries: usize,
}

impl RollingQueue {
    /// Create a queue holding at most `capacity` entries of up to `slot_len`
    /// bytes each
    pub fn new(capacity: usize, slot_len: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slot_len,
            data: vec![0u8; capacity * slot_len].into_boxed_slice(),
            lens: vec![0usize; capacity].into_boxed_slice(),
            timestamps: vec![0i64; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            entries: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.lens.len()
    }

    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn is_full(&self) -> bool {
        self.entries == self.capacity()
    }

    /// Append an entry, overwriting the oldest one when the queue is full
    ///
    /// Returns false (and stores nothing) if `data` does not fit in a slot.
    pub fn enqueue(&mut self, timestamp: i64, data: &[u8]) -> bool {
        self.enqueue_parts(timestamp, data, &[])
    }

    /// Append an entry made of two contiguous pieces
    ///
    /// Reassembled messages may straddle the previously buffered bytes and a
    /// new chunk; this stores them as one entry without an intermediate copy.
    pub fn enqueue_parts(&mut self, timestamp: i64, head: &[u8], tail: &[u8]) -> bool {
        let len = head.len() + tail.len();
        if len > self.slot_len {
            return false;
        }

        let start = self.write * self.slot_len;
        let slot = &mut self.data[start..start + self.slot_len];
        slot[..head.len()].copy_from_slice(head);
        slot[head.len()..len].copy_from_slice(tail);
        slot[len..].fill(0);
        self.lens[self.write] = len;
        self.timestamps[self.write] = timestamp;

        self.write = (self.write + 1) % self.capacity();
        if self.entries == self.capacity() {
            // Oldest entry was just overwritten
            self.read = (self.read + 1) % self.capacity();
        } else {
            self.entries += 1;
        }
        true
    }

    /// Remove the oldest entry, copying its bytes into `out`
    ///
    /// `out` must be at least one slot long. Returns the entry's timestamp and
    /// stored length, or `None` when the queue is empty.
    pub fn dequeue(&mut self, out: &mut [u8]) -> Option<(i64, usize)> {
        if self.entries == 0 || out.len() < self.slot_len {
            return None;
        }

        let start = self.read * self.slot_len;
        let len = self.lens[self.read];
        out[..len].copy_from_slice(&self.data[start..start + len]);
        let timestamp = self.timestamps[self.read];

        self.read = (self.read + 1) % self.capacity();
        self.entries -= 1;
        Some((timestamp, len))
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.entries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = RollingQueue::new(4, 3);
        assert!(q.enqueue(1, &[1, 1, 1]));
        assert!(q.enqueue(2, &[2, 2]));
        assert_eq!(q.len(), 2);

        let mut out = [0u8; 3];
        assert_eq!(q.dequeue(&mut out), Some((1, 3)));
        assert_eq!(out, [1, 1, 1]);
        assert_eq!(q.dequeue(&mut out), Some((2, 2)));
        assert_eq!(&out[..2], &[2, 2]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let mut q = RollingQueue::new(3, 1);
        for i in 0..4u8 {
            assert!(q.enqueue(i as i64, &[i]));
        }
        assert!(q.is_full());
        assert_eq!(q.len(), 3);

        let mut out = [0u8; 1];
        let mut seen = Vec::new();
        while let Some((ts, _)) = q.dequeue(&mut out) {
            seen.push((ts, out[0]));
        }
        assert_eq!(seen, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_dequeue_empty_fails() {
        let mut q = RollingQueue::new(2, 4);
        let mut out = [0u8; 4];
        assert_eq!(q.dequeue(&mut out), None);
    }

    #[test]
    fn test_rejects_oversized_entry() {
        let mut q = RollingQueue::new(2, 2);
        assert!(!q.enqueue(0, &[1, 2, 3]));
        assert!(!q.enqueue_parts(0, &[1, 2], &[3]));
        assert!(q.is_empty());
    }

    #[test]
    fn test_dequeue_requires_full_slot_buffer() {
        let mut q = RollingQueue::new(2, 4);
        q.enqueue(7, &[1]);
        let mut short = [0u8; 2];
        assert_eq!(q.dequeue(&mut short), None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_enqueue_parts_joins_pieces() {
        let mut q = RollingQueue::new(1, 4);
        assert!(q.enqueue_parts(5, &[0xAA], &[0xBB, 0xCC]));
        let mut out = [0u8; 4];
        assert_eq!(q.dequeue(&mut out), Some((5, 3)));
        assert_eq!(&out[..3], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_clear() {
        let mut q = RollingQueue::new(2, 1);
        q.enqueue(0, &[0]);
        q.clear();
        assert!(q.is_empty());
        let mut out = [0u8; 1];
        assert_eq!(q.dequeue(&mut out), None);
    }
}
