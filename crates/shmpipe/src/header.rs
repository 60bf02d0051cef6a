use std::sync::atomic::AtomicU32;

/// Fixed cache-line size assumed for index isolation.
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// Index value that marks a stream as permanently stopped.
///
/// Legal positions are always `< MAX_BUFFER_SIZE`, so this value can never
/// collide with one.
pub(crate) const STOP_INDEX: u32 = u32::MAX - 1;

/// Smallest allowed buffer length (capacity 1: one slot is sacrificed to
/// distinguish full from empty).
pub const MIN_BUFFER_SIZE: u32 = 2;

/// Largest allowed buffer length.
pub const MAX_BUFFER_SIZE: u32 = u32::MAX / 2;

/// SAFETY & MEMORY ORDERING:
///
/// This header defines the shared memory layout both processes map.
///
/// Writer protocol:
/// 1. Write payload bytes into the reserved span of the buffer
/// 2. Publish the advanced `next_write` index with `Ordering::Release`
///
/// Reader protocol:
/// 1. Load `next_write` with `Ordering::Acquire`
/// 2. Bytes in `[next_read, next_write)` are guaranteed visible
///
/// The symmetric pair on `next_read` publishes freed space back to the
/// writer. Indices are mutated only by their owning half, except that
/// either side may store `STOP_INDEX` into both.
///
/// Alignment:
/// `#[repr(C, align(64))]` plus explicit padding keeps each index on its
/// own cache line so producer and reader commits do not false-share, and
/// pins the layout for cross-process compatibility.
#[repr(C, align(64))]
pub struct StreamHeader {
    /// Index of the next byte the writer will fill.
    next_write: AtomicU32,
    _pad0: [u8; CACHE_LINE_SIZE - 4],
    /// Index of the next byte the reader will consume.
    next_read: AtomicU32,
    _pad1: [u8; CACHE_LINE_SIZE - 4],
    /// Buffer length in bytes. Written once at creation, immutable after.
    buffer_size: u32,
    _pad2: [u8; CACHE_LINE_SIZE - 4],
}

impl StreamHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Zero both indices and record the buffer length.
    ///
    /// Called exactly once, by the creating process, before the region is
    /// published to any peer.
    pub fn init(&mut self, buffer_size: u32) {
        *self.next_write.get_mut() = 0;
        *self.next_read.get_mut() = 0;
        self.buffer_size = buffer_size;
    }

    pub fn next_write(&self) -> &AtomicU32 {
        &self.next_write
    }

    pub fn next_read(&self) -> &AtomicU32 {
        &self.next_read
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}
