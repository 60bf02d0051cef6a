//! User-facing handles for the blocking flavor.
//!
//! Same shape as the light handles plus blocking waits and the stop
//! signal. `stop` and `is_stopped` are safe from any thread; everything
//! else assumes one writer thread and one reader thread per stream.

use crate::blocking_ring::{BlockingRingReader, BlockingRingWriter};
use crate::errors::StreamError;
use crate::names::Flavor;
use crate::region::SharedRegion;

const FLAVOR: Flavor = Flavor::Blocking;

/// Create the stream's region without keeping a handle open, so a
/// supervisor can set it up before either peer arrives.
pub fn create(name: &str, buffer_size: u32) -> Result<(), StreamError> {
    SharedRegion::open_or_create(FLAVOR, name, buffer_size).map(drop)
}

/// Destroy the stream's region and lock. Closing handles never does this;
/// a removed region's name is immediately reusable. Must not run
/// concurrently with a live handle for the same name.
pub fn remove(name: &str) -> Result<(), StreamError> {
    SharedRegion::remove(FLAVOR, name)
}

struct OpenedWriter {
    ring: BlockingRingWriter<'static>,
    // Keeps the mapping alive for the 'static references inside `ring`;
    // declared after it so the ring drops first.
    _region: SharedRegion,
}

/// Writer handle of a blocking stream.
pub struct BlockingStreamWriter {
    inner: Option<OpenedWriter>,
}

impl BlockingStreamWriter {
    /// A closed handle; call [`open`](Self::open) to attach it.
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Open the stream, creating the region if this is the first handle
    /// for `name`. An already open handle is closed first. A pre-existing
    /// region keeps its own buffer size regardless of `buffer_size`.
    pub fn open(&mut self, name: &str, buffer_size: u32) -> Result<(), StreamError> {
        self.close();

        let mut region = SharedRegion::open_or_create(FLAVOR, name, buffer_size)?;
        // SAFETY: `region` moves into `inner` below and outlives the ring.
        let header = unsafe { region.header_static() };
        let buffer = region.buffer_mut_ptr();
        let size = region.buffer_size();

        // SAFETY: the region mapping covers `size` buffer bytes, and the
        // at-most-one-live-writer rule is the caller's responsibility.
        let ring = unsafe {
            BlockingRingWriter::new(header.next_write(), header.next_read(), buffer, size)
        }?;

        self.inner = Some(OpenedWriter {
            ring,
            _region: region,
        });
        Ok(())
    }

    /// Release the ring half and the mapping. Safe to call repeatedly.
    /// Closing does not stop the stream or destroy the region.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_opened(&self) -> bool {
        self.inner.is_some()
    }

    /// Free capacity; zero when closed or stopped.
    pub fn available(&self) -> u32 {
        self.inner.as_ref().map_or(0, |s| s.ring.available())
    }

    /// Block until at least one byte is free; returns the new free
    /// capacity, or zero immediately when closed or stopped.
    pub fn wait(&self) -> u32 {
        self.inner.as_ref().map_or(0, |s| s.ring.wait())
    }

    /// Permanently stop the stream and wake any blocked peer. Safe from
    /// any thread; a no-op when closed.
    pub fn stop(&self) {
        if let Some(s) = &self.inner {
            tracing::debug!("stopping blocking stream from writer handle");
            s.ring.stop();
        }
    }

    /// Whether the stream is stopped. `false` when closed.
    pub fn is_stopped(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| s.ring.is_stopped())
    }

    /// Try to reserve up to `want` bytes to write; empty when closed,
    /// full or stopped.
    pub fn try_reserve(&mut self, want: u32) -> &mut [u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve(want),
            None => &mut [],
        }
    }

    /// Reserve as many contiguous bytes as possible; empty when closed,
    /// full or stopped.
    pub fn try_reserve_all(&mut self) -> &mut [u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve_all(),
            None => &mut [],
        }
    }

    /// Block until some bytes can be reserved, then reserve up to `want`
    /// of them; empty immediately when closed or stopped.
    pub fn wait_reserve(&mut self, want: u32) -> &mut [u8] {
        match &mut self.inner {
            Some(s) => s.ring.wait_reserve(want),
            None => &mut [],
        }
    }

    /// Block until some bytes can be reserved, then reserve as many as
    /// possible; empty immediately when closed or stopped.
    pub fn wait_reserve_all(&mut self) -> &mut [u8] {
        match &mut self.inner {
            Some(s) => s.ring.wait_reserve_all(),
            None => &mut [],
        }
    }

    /// Publish the first `written` bytes of the current reservation and
    /// wake a blocked reader.
    pub fn commit(&mut self, written: u32) {
        if let Some(s) = &mut self.inner {
            s.ring.commit(written);
        }
    }
}

impl Default for BlockingStreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

struct OpenedReader {
    ring: BlockingRingReader<'static>,
    _region: SharedRegion,
}

/// Reader handle of a blocking stream.
pub struct BlockingStreamReader {
    inner: Option<OpenedReader>,
}

impl BlockingStreamReader {
    /// A closed handle; call [`open`](Self::open) to attach it.
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Open the stream, creating the region if this is the first handle
    /// for `name`. An already open handle is closed first.
    pub fn open(&mut self, name: &str, buffer_size: u32) -> Result<(), StreamError> {
        self.close();

        let region = SharedRegion::open_or_create(FLAVOR, name, buffer_size)?;
        // SAFETY: `region` moves into `inner` below and outlives the ring.
        let header = unsafe { region.header_static() };
        let buffer = region.buffer_ptr();
        let size = region.buffer_size();

        // SAFETY: the region mapping covers `size` buffer bytes, and the
        // at-most-one-live-reader rule is the caller's responsibility.
        let ring = unsafe {
            BlockingRingReader::new(header.next_write(), header.next_read(), buffer, size)
        }?;

        self.inner = Some(OpenedReader {
            ring,
            _region: region,
        });
        Ok(())
    }

    /// Release the ring half and the mapping. Safe to call repeatedly.
    /// Closing does not stop the stream or destroy the region.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_opened(&self) -> bool {
        self.inner.is_some()
    }

    /// Readable byte count; zero when closed or stopped.
    pub fn available(&self) -> u32 {
        self.inner.as_ref().map_or(0, |s| s.ring.available())
    }

    /// Block until at least one byte is readable; returns the new
    /// readable count, or zero immediately when closed or stopped.
    pub fn wait(&self) -> u32 {
        self.inner.as_ref().map_or(0, |s| s.ring.wait())
    }

    /// Permanently stop the stream and wake any blocked peer. Safe from
    /// any thread; a no-op when closed.
    pub fn stop(&self) {
        if let Some(s) = &self.inner {
            tracing::debug!("stopping blocking stream from reader handle");
            s.ring.stop();
        }
    }

    /// Whether the stream is stopped. `false` when closed.
    pub fn is_stopped(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| s.ring.is_stopped())
    }

    /// Try to reserve up to `want` readable bytes; empty when closed,
    /// empty or stopped.
    pub fn try_reserve(&mut self, want: u32) -> &[u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve(want),
            None => &[],
        }
    }

    /// Reserve as many contiguous readable bytes as possible; empty when
    /// closed, empty or stopped.
    pub fn try_reserve_all(&mut self) -> &[u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve_all(),
            None => &[],
        }
    }

    /// Block until some bytes are readable, then reserve up to `want` of
    /// them; empty immediately when closed or stopped.
    pub fn wait_reserve(&mut self, want: u32) -> &[u8] {
        match &mut self.inner {
            Some(s) => s.ring.wait_reserve(want),
            None => &[],
        }
    }

    /// Block until some bytes are readable, then reserve as many as
    /// possible; empty immediately when closed or stopped.
    pub fn wait_reserve_all(&mut self) -> &[u8] {
        match &mut self.inner {
            Some(s) => s.ring.wait_reserve_all(),
            None => &[],
        }
    }

    /// Release the first `read` bytes of the current reservation and wake
    /// a blocked writer.
    pub fn commit(&mut self, read: u32) {
        if let Some(s) = &mut self.inner {
            s.ring.commit(read);
        }
    }
}

impl Default for BlockingStreamReader {
    fn default() -> Self {
        Self::new()
    }
}
