//! Non-blocking SPSC byte ring over a pair of shared atomic indices.
//!
//! Each half caches its own index locally and publishes it with Release
//! ordering on commit; the peer index is loaded with Acquire before any
//! byte in the newly visible span is touched. Reservations are contiguous:
//! a caller crossing the end of the buffer performs two reserve/commit
//! cycles.
//!
//! Lock-free and wait-free wherever 32-bit atomics are.

use crate::errors::StreamError;
use crate::header::{MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};

/// Producer half of the non-blocking byte ring.
///
/// All operations are safe while at most one writer exists per ring; the
/// paired reader may run concurrently in another thread or process.
pub(crate) struct LightRingWriter<'a> {
    next_read: &'a AtomicU32,
    next_write: &'a AtomicU32,
    buffer: *mut u8,
    size: u32,
    next_write_local: u32,
    reserved: u32,
}

// The raw buffer pointer is only dereferenced inside spans owned by this
// half under the SPSC protocol; shared references only reach the atomics.
unsafe impl Send for LightRingWriter<'_> {}
unsafe impl Sync for LightRingWriter<'_> {}

impl<'a> LightRingWriter<'a> {
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

        // Indices may already be in use by a previous session; never reset
        // them here.
        let next_write_local = next_write.load(Ordering::Relaxed);

        Ok(Self {
            next_read,
            next_write,
            buffer,
            size,
            next_write_local,
            reserved: 0,
        })
    }

    /// Free capacity right now. A size-only snapshot, so the peer load can
    /// be relaxed.
    pub fn available(&self) -> u32 {
        let mut next_read = self.next_read.load(Ordering::Relaxed);
        if next_read <= self.next_write_local {
            next_read += self.size;
        }
        next_read - self.next_write_local - 1
    }

    /// Try to reserve up to `want` bytes to write.
    ///
    /// The returned slice may be shorter than `available()` because
    /// reservations never wrap around the end of the buffer. A subsequent
    /// call drops the previous reservation.
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

    /// Reserve as many contiguous bytes as possible.
    pub fn try_reserve_all(&mut self) -> &mut [u8] {
        self.try_reserve(MAX_BUFFER_SIZE)
    }

    /// Publish the first `written` bytes of the current reservation to the
    /// reader. `commit(0)` leaves the reservation outstanding.
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

        self.next_write
            .store(self.next_write_local, Ordering::Release);

        self.reserved = 0;
    }

    fn contiguous_free(&self, next_read: u32) -> u32 {
        if self.next_write_local < next_read {
            return next_read - self.next_write_local - 1;
        }
        if next_read == 0 {
            // Reserve one byte fewer so a full commit cannot make the
            // indices equal again (that would read as empty).
            return self.size - self.next_write_local - 1;
        }
        self.size - self.next_write_local
    }
}

/// Consumer half of the non-blocking byte ring.
///
/// All operations are safe while at most one reader exists per ring.
pub(crate) struct LightRingReader<'a> {
    next_read: &'a AtomicU32,
    next_write: &'a AtomicU32,
    buffer: *const u8,
    size: u32,
    next_read_local: u32,
    reserved: u32,
}

unsafe impl Send for LightRingReader<'_> {}
unsafe impl Sync for LightRingReader<'_> {}

impl<'a> LightRingReader<'a> {
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

        let next_read_local = next_read.load(Ordering::Relaxed);

        Ok(Self {
            next_read,
            next_write,
            buffer,
            size,
            next_read_local,
            reserved: 0,
        })
    }

    /// Readable byte count right now.
    pub fn available(&self) -> u32 {
        let mut next_write = self.next_write.load(Ordering::Relaxed);
        if next_write < self.next_read_local {
            next_write += self.size;
        }
        next_write - self.next_read_local
    }

    /// Try to reserve up to `want` readable bytes.
    ///
    /// May return fewer than `available()` because reservations never wrap
    /// around the end of the buffer.
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

    /// Reserve as many contiguous readable bytes as possible.
    pub fn try_reserve_all(&mut self) -> &[u8] {
        self.try_reserve(MAX_BUFFER_SIZE)
    }

    /// Release the first `read` bytes of the current reservation back to
    /// the writer. `commit(0)` leaves the reservation outstanding.
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

        self.next_read.store(self.next_read_local, Ordering::Release);

        self.reserved = 0;
    }

    fn contiguous_readable(&self, next_write: u32) -> u32 {
        if self.next_read_local <= next_write {
            return next_write - self.next_read_local;
        }
        self.size - self.next_read_local
    }
}
