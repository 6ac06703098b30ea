//! Message reassembly over arbitrarily split byte chunks
//!
//! Transports hand over raw chunks that can split or coalesce messages at
//! any byte. [`Reassembler`] walks a cursor over the logical concatenation
//! of the bytes it buffered last time and the new chunk, asking a
//! [`Framing`] strategy where each message ends. Complete messages go to a
//! [`MessageSink`] as (at most) two slices, so a message straddling the old
//! and new bytes is never copied into a scratch buffer. Whatever is left
//! over is compacted to the front of the assembly buffer for the next call.

/// What a framing strategy can tell about the bytes ahead of the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Not enough bytes to know the message size yet
    NeedMore,
    /// The next message is this many bytes long
    Message(usize),
    /// The stream carries an impossible length; the value is what was read
    Corrupt(usize),
}

/// Strategy deciding where the next message ends
pub trait Framing: Send {
    /// Largest message this framing can produce; sizes the assembly buffer
    fn max_message_len(&self) -> usize;

    /// Inspect the unconsumed bytes and report the next message boundary
    fn boundary(&self, view: &StreamView<'_>) -> Boundary;
}

/// Unconsumed bytes ahead of the cursor, in up to two pieces
#[derive(Debug, Clone, Copy)]
pub struct StreamView<'a> {
    head: &'a [u8],
    tail: &'a [u8],
}

impl<'a> StreamView<'a> {
    fn at(pending: &'a [u8], chunk: &'a [u8], cursor: usize) -> Self {
        if cursor < pending.len() {
            Self {
                head: &pending[cursor..],
                tail: chunk,
            }
        } else {
            Self {
                head: &chunk[cursor - pending.len()..],
                tail: &[],
            }
        }
    }

    /// Bytes available ahead of the cursor
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte at offset `i` from the cursor
    pub fn byte(&self, i: usize) -> Option<u8> {
        if i < self.head.len() {
            Some(self.head[i])
        } else {
            self.tail.get(i - self.head.len()).copied()
        }
    }

    /// First `n` bytes as two slices (the second may be empty)
    fn split(&self, n: usize) -> (&'a [u8], &'a [u8]) {
        if n <= self.head.len() {
            (&self.head[..n], &[])
        } else {
            (self.head, &self.tail[..n - self.head.len()])
        }
    }
}

/// Destination for complete messages
pub trait MessageSink {
    /// Accept one message; return false if it had to be dropped
    fn deliver(&mut self, head: &[u8], tail: &[u8]) -> bool;
}

impl<F: FnMut(&[u8], &[u8]) -> bool> MessageSink for F {
    fn deliver(&mut self, head: &[u8], tail: &[u8]) -> bool {
        self(head, tail)
    }
}

/// Outcome of feeding one chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Messages the sink accepted
    pub delivered: usize,
    /// Messages the sink refused
    pub dropped: usize,
    /// Length field that made the stream corrupt, if any
    pub corrupt: Option<usize>,
    /// Bytes thrown away because they could never form a message
    pub discarded: usize,
}

/// Straddling-cursor reassembler parameterised by a framing strategy
#[derive(Debug)]
pub struct Reassembler<F> {
    framing: F,
    pending: Box<[u8]>,
    pending_len: usize,
}

impl<F: Framing> Reassembler<F> {
    pub fn new(framing: F) -> Self {
        let capacity = framing.max_message_len();
        Self {
            framing,
            pending: vec![0u8; capacity].into_boxed_slice(),
            pending_len: 0,
        }
    }

    pub fn framing(&self) -> &F {
        &self.framing
    }

    /// Bytes held over from previous chunks
    pub fn pending(&self) -> usize {
        self.pending_len
    }

    /// Forget any partial message
    pub fn reset(&mut self) {
        self.pending_len = 0;
    }

    /// Feed one chunk, delivering every message it completes
    ///
    /// On a corrupt length the rest of the chunk and the held-over bytes are
    /// abandoned; the next chunk starts from an empty assembly buffer.
    pub fn push<S: MessageSink>(&mut self, chunk: &[u8], sink: &mut S) -> PushReport {
        let mut report = PushReport::default();
        let total = self.pending_len + chunk.len();
        let mut cursor = 0;

        {
            let pending = &self.pending[..self.pending_len];
            loop {
                let view = StreamView::at(pending, chunk, cursor);
                match self.framing.boundary(&view) {
                    Boundary::Corrupt(len) => {
                        report.corrupt = Some(len);
                        break;
                    }
                    Boundary::Message(n) if n > 0 && n <= view.len() => {
                        let (head, tail) = view.split(n);
                        if sink.deliver(head, tail) {
                            report.delivered += 1;
                        } else {
                            report.dropped += 1;
                        }
                        cursor += n;
                    }
                    _ => break,
                }
            }
        }

        if report.corrupt.is_some() {
            self.pending_len = 0;
            return report;
        }

        let remaining = total - cursor;
        if remaining > self.pending.len() {
            // Only reachable when the framing never recognises the bytes
            // ahead, so they can't ever complete a message.
            report.discarded = remaining;
            self.pending_len = 0;
            return report;
        }

        if cursor < self.pending_len {
            let kept = self.pending_len - cursor;
            self.pending.copy_within(cursor..self.pending_len, 0);
            self.pending[kept..remaining].copy_from_slice(chunk);
        } else {
            let offset = cursor - self.pending_len;
            self.pending[..remaining].copy_from_slice(&chunk[offset..]);
        }
        self.pending_len = remaining;
        report
    }
}

/// Messages prefixed with a little-endian u16 total length
#[derive(Debug, Clone, Copy)]
pub struct ExplicitLength {
    max_len: usize,
}

impl ExplicitLength {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Framing for ExplicitLength {
    fn max_message_len(&self) -> usize {
        self.max_len
    }

    fn boundary(&self, view: &StreamView<'_>) -> Boundary {
        let (Some(lo), Some(hi)) = (view.byte(0), view.byte(1)) else {
            return Boundary::NeedMore;
        };
        let len = u16::from_le_bytes([lo, hi]) as usize;
        if len == 0 || len > self.max_len {
            Boundary::Corrupt(len)
        } else {
            Boundary::Message(len)
        }
    }
}

/// Reports whose size follows from a leading report id
///
/// `size_of` returns 0 for ids it doesn't know, which leaves the bytes
/// buffered until they overflow the assembly buffer. Valid reports queued
/// behind a stray id are discarded with it; framing only recovers when a
/// later chunk happens to start on a report boundary.
#[derive(Debug, Clone, Copy)]
pub struct ImplicitSize {
    max_len: usize,
    size_of: fn(u8) -> usize,
}

impl ImplicitSize {
    pub fn new(max_len: usize, size_of: fn(u8) -> usize) -> Self {
        Self { max_len, size_of }
    }
}

impl Framing for ImplicitSize {
    fn max_message_len(&self) -> usize {
        self.max_len
    }

    fn boundary(&self, view: &StreamView<'_>) -> Boundary {
        match view.byte(0).map(self.size_of) {
            Some(0) | None => Boundary::NeedMore,
            Some(n) => Boundary::Message(n),
        }
    }
}
