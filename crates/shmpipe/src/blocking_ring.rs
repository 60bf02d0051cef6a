//! Blocking SPSC byte ring: the non-blocking protocol plus futex waits on
//! the peer index and a cooperative stop signal.
//!
//! Stop is encoded as a reserved index value (`STOP_INDEX`) stored into
//! both indices, so the existing wait/notify channel on the indices
//! doubles as the cancellation signal. Once either index holds the
//! sentinel the stream is stopped for good: every size becomes zero and
//! every reservation comes back empty.

use crate::errors::StreamError;
use crate::futex;
use crate::header::{MAX_BUFFER_SIZE, MIN_BUFFER_SIZE, STOP_INDEX};
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};

/// Producer half of the blocking byte ring.
///
/// All operations are safe while at most one writer exists per ring,
/// except `stop` and `is_stopped`, which any thread may call concurrently
/// with anything else.
pub(crate) struct BlockingRingWriter<'a> {
    next_read: &'a AtomicU32,
    next_write: &'a AtomicU32,
    buffer: *mut u8,
    size: u32,
    next_write_local: u32,
    reserved: u32,
}

unsafe impl Send for BlockingRingWriter<'_> {}
// Shared references only reach the atomics (`available`, `wait`, `stop`,
// `is_stopped`); buffer access always goes through `&mut self`.
unsafe impl Sync for BlockingRingWriter<'_> {}

impl<'a> BlockingRingWriter<'a> {
    /// # Safety
    ///
    /// `buffer` must point to `size` writable bytes valid for `'a`, shared
    /// only with the paired reader, and no other writer may use the same
    /// index pair while this one exists.
    pub unsafe fn new(
        next_write: &'a AtomicU32,
        next_read: &'a AtomicU32,
        buffer: *mut u8,
        size: u32,
    ) -> Result<Self, StreamError> {
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size) {
            return Err(StreamError::InvalidArgument);
        }

        let mut next_write_local = next_write.load(Ordering::Relaxed);
        if next_write_local == STOP_INDEX {
            next_write_local = 0;
        }

        Ok(Self {
            next_read,
            next_write,
            buffer,
            size,
            next_write_local,
            reserved: 0,
        })
    }

    /// Free capacity right now; zero once the stream is stopped.
    pub fn available(&self) -> u32 {
        let next_read = self.next_read.load(Ordering::Relaxed);
        self.free_size(next_read)
    }

    /// Block until at least one byte is free, returning the new free
    /// capacity. Returns zero immediately once the stream is stopped.
    pub fn wait(&self) -> u32 {
        // The ring is full exactly when the reader sits one slot ahead of
        // our cached write position; park until it moves off that slot.
        let mut unexpected_next_read = self.next_write_local + 1;
        if unexpected_next_read == self.size {
            unexpected_next_read = 0;
        }

        let mut next_read = self.next_read.load(Ordering::Relaxed);
        while next_read == unexpected_next_read {
            next_read = futex::wait(self.next_read, unexpected_next_read);
        }

        self.free_size(next_read)
    }

    /// Permanently stop the stream and wake both halves.
    pub fn stop(&self) {
        self.next_read.store(STOP_INDEX, Ordering::Relaxed);
        futex::notify_all(self.next_read);
        self.next_write.store(STOP_INDEX, Ordering::Relaxed);
        futex::notify_all(self.next_write);
    }

    pub fn is_stopped(&self) -> bool {
        self.next_read.load(Ordering::Relaxed) == STOP_INDEX
            || self.next_write.load(Ordering::Relaxed) == STOP_INDEX
    }

    /// Try to reserve up to `want` bytes to write. Empty once stopped.
    pub fn try_reserve(&mut self, want: u32) -> &mut [u8] {
        let next_read = self.next_read.load(Ordering::Acquire);

        self.reserved = want.min(self.contiguous_free(next_read));

        // SAFETY: [next_write_local, next_write_local + reserved) is within
        // the buffer and owned exclusively by this writer until commit.
        unsafe {
            slice::from_raw_parts_mut(
                self.buffer.add(self.next_write_local as usize),
                self.reserved as usize,
            )
        }
    }

    /// Reserve as many contiguous bytes as possible. Empty once stopped.
    pub fn try_reserve_all(&mut self) -> &mut [u8] {
        self.try_reserve(MAX_BUFFER_SIZE)
    }

    /// Block until some bytes can be reserved, then reserve up to `want`
    /// of them. Empty once stopped.
    pub fn wait_reserve(&mut self, want: u32) -> &mut [u8] {
        self.wait();
        self.try_reserve(want)
    }

    /// Block until some bytes can be reserved, then reserve as many as
    /// possible. Empty once stopped.
    pub fn wait_reserve_all(&mut self) -> &mut [u8] {
        self.wait();
        self.try_reserve(MAX_BUFFER_SIZE)
    }

    /// Publish the first `written` bytes of the current reservation and
    /// wake a reader blocked on the write index.
    ///
    /// A concurrent `stop` may have overwritten the write index; the
    /// exchange detects that and re-applies the sentinel so stopping stays
    /// permanent.
    pub fn commit(&mut self, written: u32) {
        if written == 0 {
            return;
        }
        debug_assert!(written <= self.reserved, "commit beyond reservation");

        self.next_write_local += written;
        if self.next_write_local == self.size {
            self.next_write_local = 0;
        }
        debug_assert!(self.next_write_local < self.size);

        let old = self
            .next_write
            .swap(self.next_write_local, Ordering::Release);
        if old == STOP_INDEX {
            self.stop();
        }
        futex::notify_all(self.next_write);

        self.reserved = 0;
    }

    fn contiguous_free(&self, next_read: u32) -> u32 {
        if next_read == STOP_INDEX {
            return 0;
        }
        if self.next_write_local < next_read {
            return next_read - self.next_write_local - 1;
        }
        if next_read == 0 {
            // Keep one slot free so a full commit cannot look empty.
            return self.size - self.next_write_local - 1;
        }
        self.size - self.next_write_local
    }

    fn free_size(&self, next_read: u32) -> u32 {
        if next_read == STOP_INDEX {
            return 0;
        }
        let mut next_read = next_read;
        if next_read <= self.next_write_local {
            next_read += self.size;
        }
        next_read - self.next_write_local - 1
    }
}

/// Consumer half of the blocking byte ring.
///
/// All operations are safe while at most one reader exists per ring,
/// except `stop` and `is_stopped`, which any thread may call concurrently
/// with anything else.
pub(crate) struct BlockingRingReader<'a> {
    next_read: &'a AtomicU32,
    next_write: &'a AtomicU32,
    buffer: *const u8,
    size: u32,
    next_read_local: u32,
    reserved: u32,
}

unsafe impl Send for BlockingRingReader<'_> {}
// Shared references only reach the atomics; buffer access always goes
// through `&mut self`.
unsafe impl Sync for BlockingRingReader<'_> {}

impl<'a> BlockingRingReader<'a> {
    /// # Safety
    ///
    /// `buffer` must point to `size` readable bytes valid for `'a`, shared
    /// only with the paired writer, and no other reader may use the same
    /// index pair while this one exists.
    pub unsafe fn new(
        next_write: &'a AtomicU32,
        next_read: &'a AtomicU32,
        buffer: *const u8,
        size: u32,
    ) -> Result<Self, StreamError> {
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size) {
            return Err(StreamError::InvalidArgument);
        }

        let mut next_read_local = next_read.load(Ordering::Relaxed);
        if next_read_local == STOP_INDEX {
            next_read_local = 0;
        }

        Ok(Self {
            next_read,
            next_write,
            buffer,
            size,
            next_read_local,
            reserved: 0,
        })
    }

    /// Readable byte count right now; zero once the stream is stopped.
    pub fn available(&self) -> u32 {
        let next_write = self.next_write.load(Ordering::Relaxed);
        self.readable_size(next_write)
    }

    /// Block until at least one byte is readable, returning the new
    /// readable count. Returns zero immediately once the stream is
    /// stopped.
    pub fn wait(&self) -> u32 {
        // The ring is empty exactly while the writer still sits on our
        // cached read position.
        let unexpected_next_write = self.next_read_local;

        let mut next_write = self.next_write.load(Ordering::Relaxed);
        while next_write == unexpected_next_write {
            next_write = futex::wait(self.next_write, unexpected_next_write);
        }

        self.readable_size(next_write)
    }

    /// Permanently stop the stream and wake both halves.
    pub fn stop(&self) {
        self.next_read.store(STOP_INDEX, Ordering::Relaxed);
        futex::notify_all(self.next_read);
        self.next_write.store(STOP_INDEX, Ordering::Relaxed);
        futex::notify_all(self.next_write);
    }

    pub fn is_stopped(&self) -> bool {
        self.next_read.load(Ordering::Relaxed) == STOP_INDEX
            || self.next_write.load(Ordering::Relaxed) == STOP_INDEX
    }

    /// Try to reserve up to `want` readable bytes. Empty once stopped.
    pub fn try_reserve(&mut self, want: u32) -> &[u8] {
        let next_write = self.next_write.load(Ordering::Acquire);

        self.reserved = want.min(self.contiguous_readable(next_write));

        // SAFETY: [next_read_local, next_read_local + reserved) was
        // published by the writer before the Acquire load above.
        unsafe {
            slice::from_raw_parts(
                self.buffer.add(self.next_read_local as usize),
                self.reserved as usize,
            )
        }
    }

    /// Reserve as many contiguous readable bytes as possible. Empty once
    /// stopped.
    pub fn try_reserve_all(&mut self) -> &[u8] {
        self.try_reserve(MAX_BUFFER_SIZE)
    }

    /// Block until some bytes are readable, then reserve up to `want` of
    /// them. Empty once stopped.
    pub fn wait_reserve(&mut self, want: u32) -> &[u8] {
        self.wait();
        self.try_reserve(want)
    }

    /// Block until some bytes are readable, then reserve as many as
    /// possible. Empty once stopped.
    pub fn wait_reserve_all(&mut self) -> &[u8] {
        self.wait();
        self.try_reserve(MAX_BUFFER_SIZE)
    }

    /// Release the first `read` bytes of the current reservation and wake
    /// a writer blocked on the read index. Re-applies the stop sentinel if
    /// a concurrent `stop` raced the exchange.
    pub fn commit(&mut self, read: u32) {
        if read == 0 {
            return;
        }
        debug_assert!(read <= self.reserved, "commit beyond reservation");

        self.next_read_local += read;
        if self.next_read_local == self.size {
            self.next_read_local = 0;
        }
        debug_assert!(self.next_read_local < self.size);

        let old = self
            .next_read
            .swap(self.next_read_local, Ordering::Release);
        if old == STOP_INDEX {
            self.stop();
        }
        futex::notify_all(self.next_read);

        self.reserved = 0;
    }

    fn contiguous_readable(&self, next_write: u32) -> u32 {
        if next_write == STOP_INDEX {
            return 0;
        }
        if self.next_read_local <= next_write {
            return next_write - self.next_read_local;
        }
        self.size - self.next_read_local
    }

    fn readable_size(&self, next_write: u32) -> u32 {
        if next_write == STOP_INDEX {
            return 0;
        }
        let mut next_write = next_write;
        if next_write < self.next_read_local {
            next_write += self.size;
        }
        next_write - self.next_read_local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn indices(write: u32, read: u32) -> (AtomicU32, AtomicU32) {
        (AtomicU32::new(write), AtomicU32::new(read))
    }

    fn leaked_ring(
        size: u32,
    ) -> (
        BlockingRingWriter<'static>,
        BlockingRingReader<'static>,
        &'static AtomicU32,
        &'static AtomicU32,
    ) {
        let w: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));
        let r: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));
        let buf: &'static mut [u8] = Box::leak(vec![0u8; size as usize].into_boxed_slice());
        let base = buf.as_mut_ptr();
        let writer = unsafe { BlockingRingWriter::new(w, r, base, size) }.unwrap();
        let reader = unsafe { BlockingRingReader::new(w, r, base, size) }.unwrap();
        (writer, reader, w, r)
    }

    #[test]
    fn test_constructor_bounds() {
        let (w, r) = indices(0, 0);
        let mut buf = [0u8; 4];
        for size in [0, 1, MAX_BUFFER_SIZE + 1] {
            assert_eq!(
                unsafe { BlockingRingWriter::new(&w, &r, buf.as_mut_ptr(), size) }.err(),
                Some(StreamError::InvalidArgument)
            );
            assert_eq!(
                unsafe { BlockingRingReader::new(&w, &r, buf.as_ptr(), size) }.err(),
                Some(StreamError::InvalidArgument)
            );
        }
    }

    #[test]
    fn test_constructor_normalizes_stop_seed() {
        let (w, r) = indices(STOP_INDEX, STOP_INDEX);
        let mut buf = [0u8; 7];
        let writer = unsafe { BlockingRingWriter::new(&w, &r, buf.as_mut_ptr(), 7) }.unwrap();

        assert!(writer.is_stopped());
        assert_eq!(writer.available(), 0);
    }

    #[test]
    fn test_available_size_matches_light_arithmetic() {
        let cases = [(0, 0, 6), (1, 0, 5), (6, 0, 0), (5, 2, 3), (2, 5, 2)];
        for (w0, r0, expected) in cases {
            let (w, r) = indices(w0, r0);
            let mut buf = [0u8; 7];
            let writer = unsafe { BlockingRingWriter::new(&w, &r, buf.as_mut_ptr(), 7) }.unwrap();
            assert_eq!(writer.available(), expected, "w={} r={}", w0, r0);
        }
    }

    #[test]
    fn test_stop_zeroes_everything() {
        let (mut writer, mut reader, w, r) = leaked_ring(10);

        let slice = writer.try_reserve(3);
        slice.copy_from_slice(&[1, 2, 3]);
        writer.commit(3);

        writer.stop();

        assert_eq!(w.load(Ordering::Relaxed), STOP_INDEX);
        assert_eq!(r.load(Ordering::Relaxed), STOP_INDEX);
        assert!(writer.is_stopped());
        assert!(reader.is_stopped());
        assert_eq!(writer.available(), 0);
        assert_eq!(reader.available(), 0);
        assert!(writer.try_reserve_all().is_empty());
        assert!(reader.try_reserve_all().is_empty());
        assert_eq!(writer.wait(), 0, "wait must return immediately once stopped");
        assert_eq!(reader.wait(), 0, "wait must return immediately once stopped");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (writer, reader, w, r) = leaked_ring(10);

        writer.stop();
        writer.stop();
        reader.stop();

        assert_eq!(w.load(Ordering::Relaxed), STOP_INDEX);
        assert_eq!(r.load(Ordering::Relaxed), STOP_INDEX);
        assert!(writer.is_stopped());
    }

    #[test]
    fn test_commit_reapplies_stop_after_race() {
        let (mut writer, reader, w, r) = leaked_ring(10);

        let slice = writer.try_reserve(2);
        slice.copy_from_slice(&[9, 9]);

        // Stop lands between the reservation and the commit.
        reader.stop();
        writer.commit(2);

        assert_eq!(
            w.load(Ordering::Relaxed),
            STOP_INDEX,
            "commit must re-apply the sentinel it exchanged out"
        );
        assert_eq!(r.load(Ordering::Relaxed), STOP_INDEX);
        assert!(writer.is_stopped());
    }

    #[test]
    fn test_commit_zero_keeps_reservation() {
        let (mut writer, _reader, w, _r) = leaked_ring(10);

        assert_eq!(writer.try_reserve(4).len(), 4);
        writer.commit(0);
        assert_eq!(w.load(Ordering::Relaxed), 0);
        writer.commit(4);
        assert_eq!(w.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_reader_wait_wakes_on_commit() {
        let (mut writer, mut reader, _w, _r) = leaked_ring(10);

        let consumer = thread::spawn(move || {
            let slice = reader.wait_reserve_all();
            let bytes = slice.to_vec();
            let n = slice.len() as u32;
            reader.commit(n);
            bytes
        });

        thread::sleep(Duration::from_millis(50));
        let slice = writer.try_reserve(3);
        slice.copy_from_slice(&[7, 8, 9]);
        writer.commit(3);

        let bytes = consumer.join().expect("consumer panicked");
        assert_eq!(bytes, vec![7, 8, 9]);
    }

    #[test]
    fn test_stop_wakes_blocked_reader() {
        let (writer, mut reader, _w, _r) = leaked_ring(10);

        let consumer = thread::spawn(move || {
            let len = reader.wait_reserve_all().len();
            (len, reader.is_stopped())
        });

        thread::sleep(Duration::from_millis(50));
        writer.stop();

        let (len, stopped) = consumer.join().expect("consumer panicked");
        assert_eq!(len, 0, "a stopped wait_reserve must come back empty");
        assert!(stopped);
    }

    #[test]
    fn test_writer_wait_wakes_when_space_frees() {
        let (mut writer, mut reader, _w, _r) = leaked_ring(4);

        // Fill the ring: capacity is size - 1.
        let slice = writer.try_reserve_all();
        assert_eq!(slice.len(), 3);
        slice.copy_from_slice(&[1, 2, 3]);
        writer.commit(3);
        assert_eq!(writer.available(), 0);
        assert!(writer.try_reserve_all().is_empty());

        let producer = thread::spawn(move || writer.wait());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(reader.try_reserve(1).len(), 1);
        reader.commit(1);

        let free = producer.join().expect("producer panicked");
        assert_eq!(free, 1, "one byte freed by the reader commit");
    }

    #[test]
    fn test_wait_returns_free_size_without_blocking_when_not_full() {
        let (writer, _reader, _w, _r) = leaked_ring(10);
        assert_eq!(writer.wait(), 9, "an empty ring has all capacity free");
    }

    #[test]
    fn test_wait_reserve_returns_data_already_present() {
        let (mut writer, mut reader, _w, _r) = leaked_ring(10);

        let slice = writer.try_reserve(2);
        slice.copy_from_slice(&[4, 5]);
        writer.commit(2);

        assert_eq!(reader.wait(), 2);
        assert_eq!(reader.wait_reserve(1), &[4]);
        reader.commit(1);
        assert_eq!(reader.wait_reserve_all(), &[5]);
        reader.commit(1);
    }
}
