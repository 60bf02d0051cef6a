//! User-facing handles for the light (non-blocking) flavor.
//!
//! A handle bundles this process's mapping of the named region with one
//! ring half. Handles are move-only: copying one would alias ownership of
//! its half. A closed handle answers every ring operation with the
//! empty/zero result.

use crate::errors::StreamError;
use crate::light_ring::{LightRingReader, LightRingWriter};
use crate::names::Flavor;
use crate::region::SharedRegion;

const FLAVOR: Flavor = Flavor::Light;

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
    ring: LightRingWriter<'static>,
    // Keeps the mapping alive for the 'static references inside `ring`;
    // declared after it so the ring drops first.
    _region: SharedRegion,
}

/// Writer handle of a light stream.
pub struct LightStreamWriter {
    inner: Option<OpenedWriter>,
}

impl LightStreamWriter {
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
        let ring =
            unsafe { LightRingWriter::new(header.next_write(), header.next_read(), buffer, size) }?;

        self.inner = Some(OpenedWriter {
            ring,
            _region: region,
        });
        Ok(())
    }

    /// Release the ring half and the mapping. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_opened(&self) -> bool {
        self.inner.is_some()
    }

    /// Free capacity, or zero when closed.
    pub fn available(&self) -> u32 {
        self.inner.as_ref().map_or(0, |s| s.ring.available())
    }

    /// Try to reserve up to `want` bytes to write; empty when closed.
    pub fn try_reserve(&mut self, want: u32) -> &mut [u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve(want),
            None => &mut [],
        }
    }

    /// Reserve as many contiguous bytes as possible; empty when closed.
    pub fn try_reserve_all(&mut self) -> &mut [u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve_all(),
            None => &mut [],
        }
    }

    /// Publish the first `written` bytes of the current reservation.
    pub fn commit(&mut self, written: u32) {
        if let Some(s) = &mut self.inner {
            s.ring.commit(written);
        }
    }
}

impl Default for LightStreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

struct OpenedReader {
    ring: LightRingReader<'static>,
    _region: SharedRegion,
}

/// Reader handle of a light stream.
pub struct LightStreamReader {
    inner: Option<OpenedReader>,
}

impl LightStreamReader {
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
        let ring =
            unsafe { LightRingReader::new(header.next_write(), header.next_read(), buffer, size) }?;

        self.inner = Some(OpenedReader {
            ring,
            _region: region,
        });
        Ok(())
    }

    /// Release the ring half and the mapping. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_opened(&self) -> bool {
        self.inner.is_some()
    }

    /// Readable byte count, or zero when closed.
    pub fn available(&self) -> u32 {
        self.inner.as_ref().map_or(0, |s| s.ring.available())
    }

    /// Try to reserve up to `want` readable bytes; empty when closed.
    pub fn try_reserve(&mut self, want: u32) -> &[u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve(want),
            None => &[],
        }
    }

    /// Reserve as many contiguous readable bytes as possible; empty when
    /// closed.
    pub fn try_reserve_all(&mut self) -> &[u8] {
        match &mut self.inner {
            Some(s) => s.ring.try_reserve_all(),
            None => &[],
        }
    }

    /// Release the first `read` bytes of the current reservation back to
    /// the writer.
    pub fn commit(&mut self, read: u32) {
        if let Some(s) = &mut self.inner {
            s.ring.commit(read);
        }
    }
}

impl Default for LightStreamReader {
    fn default() -> Self {
        Self::new()
    }
}
