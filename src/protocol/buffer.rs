//! Fixed-capacity circular byte buffer used as scratch storage for one Modbus
//! transaction.
//!
//! Empty and full both present as `read == write`, so the buffer tracks which
//! one it is explicitly. A [`RingBuffer::view`] shares the backing storage but
//! carries its own cursors; the codec uses views to checksum bytes that the
//! real cursor has not consumed yet. The storage is `Rc<RefCell<..>>`, which
//! keeps a buffer and all of its views on a single thread.

use std::{
    cell::RefCell,
    io::{self, Read, Write},
    rc::Rc,
};

use crate::error::is_transient;

/// Byte order for the 16-bit accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first (Modbus header fields).
    MsbFirst,
    /// Least significant byte first (Modbus CRC).
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Empty,
    Partial,
    Full,
}

type SharedStorage = Rc<RefCell<Box<[u8]>>>;

#[derive(Debug)]
pub struct RingBuffer {
    storage: SharedStorage,
    capacity: usize,
    read: usize,
    write: usize,
    fill: Fill,
}

impl RingBuffer {
    /// Create an empty buffer. `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_storage(vec![0u8; capacity])
    }

    /// Use `storage` as backing memory; its length becomes the capacity and
    /// the buffer starts out empty.
    pub fn with_storage(storage: Vec<u8>) -> Self {
        let capacity = storage.len();
        assert!(capacity > 0, "ring buffer capacity must be non-zero");

        Self {
            storage: Rc::new(RefCell::new(storage.into_boxed_slice())),
            capacity,
            read: 0,
            write: 0,
            fill: Fill::Empty,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.fill == Fill::Empty
    }

    pub fn is_full(&self) -> bool {
        self.fill == Fill::Full
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        match self.fill {
            Fill::Empty => 0,
            Fill::Full => self.capacity,
            Fill::Partial => (self.write + self.capacity - self.read) % self.capacity,
        }
    }

    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    /// A second buffer over the same storage with a copy of the current
    /// cursors. Cursor movement is not synchronized after this call.
    pub fn view(&self) -> RingBuffer {
        RingBuffer {
            storage: Rc::clone(&self.storage),
            capacity: self.capacity,
            read: self.read,
            write: self.write,
            fill: self.fill,
        }
    }

    pub fn write_u8(&mut self, value: u8) -> bool {
        self.write(&[value]) == 1
    }

    pub fn write_u16(&mut self, value: u16, order: ByteOrder) -> bool {
        let bytes = match order {
            ByteOrder::MsbFirst => value.to_be_bytes(),
            ByteOrder::LsbFirst => value.to_le_bytes(),
        };
        self.write(&bytes) == 2
    }

    /// Append `data` as a whole. Nothing is written when it does not fit.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.free() < data.len() {
            return 0;
        }

        let storage = Rc::clone(&self.storage);
        let mut storage = storage.borrow_mut();
        let mut written = 0;
        while written < data.len() {
            let run = self.writable_run().min(data.len() - written);
            let at = self.write;
            storage[at..at + run].copy_from_slice(&data[written..written + run]);
            self.advance_write(run);
            written += run;
        }
        written
    }

    /// Hand buffered bytes to `sink`, one contiguous run per call. Stops at
    /// the first short write.
    pub fn write_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<usize> {
        let storage = Rc::clone(&self.storage);
        let mut total = 0;

        loop {
            let run = self.readable_run();
            if run == 0 {
                break;
            }

            let at = self.read;
            let sent = match sink.write(&storage.borrow()[at..at + run]) {
                Ok(n) => n.min(run),
                Err(err) if is_transient(&err) => 0,
                Err(err) if total == 0 => return Err(err),
                Err(err) => {
                    log::debug!("write_to stopped after {total} bytes: {err}");
                    break;
                }
            };
            if sent == 0 {
                break;
            }

            self.advance_read(sent);
            total += sent;
            if sent < run {
                break;
            }
        }

        Ok(total)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        (self.read(&mut byte) == 1).then_some(byte[0])
    }

    /// Consumes nothing when fewer than two bytes are buffered.
    pub fn read_u16(&mut self, order: ByteOrder) -> Option<u16> {
        if self.len() < 2 {
            return None;
        }

        let mut bytes = [0u8; 2];
        self.read(&mut bytes);
        Some(match order {
            ByteOrder::MsbFirst => u16::from_be_bytes(bytes),
            ByteOrder::LsbFirst => u16::from_le_bytes(bytes),
        })
    }

    /// Copy up to `out.len()` buffered bytes into `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let storage = Rc::clone(&self.storage);
        let storage = storage.borrow();
        let mut done = 0;
        while done < out.len() {
            let run = self.readable_run().min(out.len() - done);
            if run == 0 {
                break;
            }
            let at = self.read;
            out[done..done + run].copy_from_slice(&storage[at..at + run]);
            self.advance_read(run);
            done += run;
        }
        done
    }

    /// Fill free space from `source`, one contiguous run per call. Stops at
    /// the first short read.
    pub fn read_from<R: Read + ?Sized>(&mut self, source: &mut R) -> io::Result<usize> {
        let storage = Rc::clone(&self.storage);
        let mut total = 0;

        loop {
            let run = self.writable_run();
            if run == 0 {
                break;
            }

            let at = self.write;
            let received = match source.read(&mut storage.borrow_mut()[at..at + run]) {
                Ok(n) => n.min(run),
                Err(err) if is_transient(&err) => 0,
                Err(err) if total == 0 => return Err(err),
                Err(err) => {
                    log::debug!("read_from stopped after {total} bytes: {err}");
                    break;
                }
            };
            if received == 0 {
                break;
            }

            self.advance_write(received);
            total += received;
            if received < run {
                break;
            }
        }

        Ok(total)
    }

    /// Drop up to `count` bytes from the front.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len());
        self.advance_read(count);
        count
    }

    /// Buffered bytes in order, without consuming them.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len()];
        self.view().read(&mut out);
        out
    }

    fn writable_run(&self) -> usize {
        match self.fill {
            Fill::Full => 0,
            _ if self.read > self.write => self.read - self.write,
            _ => self.capacity - self.write,
        }
    }

    fn readable_run(&self) -> usize {
        match self.fill {
            Fill::Empty => 0,
            _ if self.write > self.read => self.write - self.read,
            _ => self.capacity - self.read,
        }
    }

    fn advance_write(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.write = (self.write + count) % self.capacity;
        self.fill = if self.write == self.read {
            Fill::Full
        } else {
            Fill::Partial
        };
    }

    fn advance_read(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.read = (self.read + count) % self.capacity;
        self.fill = if self.read == self.write {
            Fill::Empty
        } else {
            Fill::Partial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Accepts at most `limit` bytes per call.
    struct TrickleSink {
        limit: usize,
        received: Vec<u8>,
    }

    impl Write for TrickleSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.received.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPort;

    impl Read for BrokenPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn assert_invariants(buf: &RingBuffer) {
        assert_eq!(buf.free() + buf.len(), buf.capacity());
        assert_eq!(buf.is_empty(), buf.len() == 0);
        assert_eq!(buf.is_full(), buf.len() == buf.capacity());
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = RingBuffer::new(16);
        assert!(buf.is_empty());
        assert!(!buf.is_full());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.free(), 16);
    }

    #[test]
    fn test_write_refuses_when_it_does_not_fit() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.write(&[1, 2, 3]), 3);
        assert_eq!(buf.write(&[4, 5]), 0);
        assert_eq!(buf.len(), 3);
        assert!(buf.write_u8(4));
        assert!(buf.is_full());
        assert!(!buf.write_u8(5));
        assert_invariants(&buf);
    }

    #[test]
    fn test_wraparound_round_trip() {
        let mut buf = RingBuffer::new(8);
        let mut scratch = [0u8; 5];
        assert_eq!(buf.write(&[9; 5]), 5);
        assert_eq!(buf.read(&mut scratch), 5);
        assert!(buf.is_empty());

        // cursors now sit at 5, so both the write and the read wrap
        let data = [10, 11, 12, 13, 14, 15, 16, 17];
        assert_eq!(buf.write(&data), 8);
        assert!(buf.is_full());
        assert_invariants(&buf);

        let mut out = [0u8; 8];
        assert_eq!(buf.read(&mut out), 8);
        assert_eq!(out, data);
        assert!(buf.is_empty());
        assert_invariants(&buf);
    }

    #[test]
    fn test_u16_byte_orders() {
        let mut buf = RingBuffer::new(8);
        assert!(buf.write_u16(0x1234, ByteOrder::MsbFirst));
        assert!(buf.write_u16(0x1234, ByteOrder::LsbFirst));
        assert_eq!(buf.to_vec(), vec![0x12, 0x34, 0x34, 0x12]);

        assert_eq!(buf.read_u16(ByteOrder::MsbFirst), Some(0x1234));
        assert_eq!(buf.read_u16(ByteOrder::LsbFirst), Some(0x1234));
        assert_eq!(buf.read_u16(ByteOrder::LsbFirst), None);
    }

    #[test]
    fn test_short_u16_read_consumes_nothing() {
        let mut buf = RingBuffer::new(4);
        buf.write_u8(0xAB);
        assert_eq!(buf.read_u16(ByteOrder::MsbFirst), None);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.read_u8(), Some(0xAB));
        assert_eq!(buf.read_u8(), None);
    }

    #[test]
    fn test_view_shares_storage_not_cursors() {
        let mut buf = RingBuffer::new(8);
        buf.write(&[1, 2, 3]);

        let mut view = buf.view();
        assert_eq!(view.read_u8(), Some(1));
        assert_eq!(view.len(), 2);
        assert_eq!(buf.len(), 3);

        // the view's write cursor did not move, so it does not see the new byte
        buf.write_u8(4);
        assert_eq!(view.len(), 2);
        assert_eq!(buf.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_view_writes_land_in_shared_storage() {
        let mut buf = RingBuffer::new(4);
        buf.write(&[1, 2, 3, 4]);

        let mut writer = buf.view();
        writer.discard(4);
        assert!(writer.write_u8(9));

        assert_eq!(buf.to_vec(), vec![9, 2, 3, 4]);
        assert!(buf.is_full());
    }

    #[test]
    fn test_write_to_stops_on_short_write() {
        let mut buf = RingBuffer::new(8);
        buf.write(&[1, 2, 3, 4, 5, 6]);
        let mut sink = TrickleSink {
            limit: 4,
            received: Vec::new(),
        };
        assert_eq!(buf.write_to(&mut sink).unwrap(), 4);
        assert_eq!(sink.received, vec![1, 2, 3, 4]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_write_to_drains_wrapped_remainder() {
        let mut buf = RingBuffer::new(6);
        buf.write(&[0; 4]);
        buf.discard(4);
        buf.write(&[1, 2, 3, 4, 5]);

        let mut sink = Vec::new();
        assert_eq!(buf.write_to(&mut sink).unwrap(), 5);
        assert_eq!(sink, vec![1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_from_fills_wrapped_space() {
        let mut buf = RingBuffer::new(6);
        buf.write(&[0; 3]);
        buf.discard(3);

        let data = [7u8, 8, 9, 10, 11, 12, 13];
        let mut source = &data[..];
        assert_eq!(buf.read_from(&mut source).unwrap(), 6);
        assert!(buf.is_full());
        assert_eq!(buf.to_vec(), vec![7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_read_from_reports_hard_errors() {
        let mut buf = RingBuffer::new(4);
        let err = buf.read_from(&mut BrokenPort).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_random_interleaving_tracks_length() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut buf = RingBuffer::new(37);
        let mut expected: std::collections::VecDeque<u8> = Default::default();
        let mut next = 0u8;

        for _ in 0..2000 {
            if rng.random_bool(0.5) {
                let n = rng.random_range(0..=buf.free());
                let chunk: Vec<u8> = (0..n)
                    .map(|_| {
                        next = next.wrapping_add(1);
                        next
                    })
                    .collect();
                assert_eq!(buf.write(&chunk), n);
                expected.extend(chunk);
            } else {
                let n = rng.random_range(0..=buf.len());
                let mut out = vec![0u8; n];
                assert_eq!(buf.read(&mut out), n);
                let want: Vec<u8> = expected.drain(..n).collect();
                assert_eq!(out, want);
            }
            assert_eq!(buf.len(), expected.len());
            assert_invariants(&buf);
        }
    }
}
