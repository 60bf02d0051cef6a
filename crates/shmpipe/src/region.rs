//! Shared-region placement: rendezvous of both processes on a named,
//! header-prefixed byte buffer.
//!
//! The region is a file under `/dev/shm` mapped read/write by every
//! handle. A named lock serializes concurrent creators so exactly one
//! process initializes the header; attaches never touch it. Dropping a
//! `SharedRegion` unmaps this process's view only — `remove` destroys the
//! region itself.

use crate::errors::StreamError;
use crate::header::{StreamHeader, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::named_lock::NamedLock;
use crate::names::{self, Flavor};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

pub(crate) struct SharedRegion {
    mmap: MmapMut,
}

impl SharedRegion {
    /// Open the region for `name`, creating and initializing it if no
    /// region exists yet. The named lock is held for the whole decision so
    /// racing openers cannot both initialize.
    ///
    /// `buffer_size` is only consulted on the create path; a pre-existing
    /// region wins regardless of the size requested here.
    pub fn open_or_create(
        flavor: Flavor,
        name: &str,
        buffer_size: u32,
    ) -> Result<Self, StreamError> {
        names::validate_stream_name(name)?;

        let lock = NamedLock::open_or_create(&names::lock_name(flavor, name))?;
        let _guard = lock.lock()?;

        let path = names::data_path(flavor, name);
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => Self::attach(&path, file),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Self::create_and_initialize(&path, buffer_size)
            }
            Err(e) => {
                tracing::debug!("failed to open region {}: {}", path.display(), e);
                Err(StreamError::FailedToOpen)
            }
        }
    }

    /// Destroy the region and its lock. The region may not exist; that is
    /// not an error. Must not run concurrently with a live handle for the
    /// same name.
    pub fn remove(flavor: Flavor, name: &str) -> Result<(), StreamError> {
        names::validate_stream_name(name)?;

        let lock_name = names::lock_name(flavor, name);
        let lock = NamedLock::open_or_create(&lock_name)?;
        {
            let _guard = lock.lock()?;
            let path = names::data_path(flavor, name);
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("removed stream region {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("failed to remove region {}: {}", path.display(), e),
            }
        }
        drop(lock);
        NamedLock::remove(&lock_name)
    }

    fn create_and_initialize(path: &Path, buffer_size: u32) -> Result<Self, StreamError> {
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&buffer_size) {
            return Err(StreamError::InvalidArgument);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                tracing::debug!("failed to create region {}: {}", path.display(), e);
                StreamError::FailedToOpen
            })?;

        let total = StreamHeader::SIZE as u64 + u64::from(buffer_size);
        file.set_len(total).map_err(|e| {
            tracing::debug!("failed to size region {}: {}", path.display(), e);
            StreamError::FailedToOpen
        })?;

        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            tracing::debug!("failed to map region {}: {}", path.display(), e);
            StreamError::FailedToOpen
        })?;

        // SAFETY: the mapping is at least header-sized (total above), page
        // alignment satisfies the header's alignment, and the lock gives
        // this process exclusive access until the header is published.
        let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut StreamHeader) };
        header.init(buffer_size);

        tracing::debug!(
            "created stream region {} ({} byte buffer)",
            path.display(),
            buffer_size
        );
        Ok(Self { mmap })
    }

    fn attach(path: &Path, file: File) -> Result<Self, StreamError> {
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            tracing::debug!("failed to map region {}: {}", path.display(), e);
            StreamError::FailedToOpen
        })?;

        if mmap.len() < StreamHeader::SIZE {
            tracing::debug!(
                "region {} is smaller than a header ({} bytes)",
                path.display(),
                mmap.len()
            );
            return Err(StreamError::FailedToOpen);
        }

        // SAFETY: length checked above; page alignment satisfies the
        // header's alignment; peers only touch the header through atomics.
        let header = unsafe { &*(mmap.as_ptr() as *const StreamHeader) };
        let buffer_size = header.buffer_size();
        if (mmap.len() as u64) < StreamHeader::SIZE as u64 + u64::from(buffer_size) {
            tracing::debug!(
                "region {} is shorter than its header claims",
                path.display()
            );
            return Err(StreamError::FailedToOpen);
        }

        tracing::debug!(
            "attached to stream region {} ({} byte buffer)",
            path.display(),
            buffer_size
        );
        Ok(Self { mmap })
    }

    /// Header view with the mapping's lifetime erased.
    ///
    /// # Safety
    ///
    /// The caller must keep this region alive for as long as the returned
    /// reference is used. Handles satisfy this by owning the region next
    /// to the ring half built from it.
    pub unsafe fn header_static(&self) -> &'static StreamHeader {
        &*(self.mmap.as_ptr() as *const StreamHeader)
    }

    pub fn buffer_size(&self) -> u32 {
        // SAFETY: attach/create verified the mapping covers the header.
        unsafe { &*(self.mmap.as_ptr() as *const StreamHeader) }.buffer_size()
    }

    pub fn buffer_ptr(&self) -> *const u8 {
        // Mapping covers header + buffer; verified on attach/create.
        unsafe { self.mmap.as_ptr().add(StreamHeader::SIZE) }
    }

    pub fn buffer_mut_ptr(&mut self) -> *mut u8 {
        unsafe { self.mmap.as_mut_ptr().add(StreamHeader::SIZE) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_ID: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> String {
        format!(
            "region_test_{}_{}_{}",
            tag,
            std::process::id(),
            TEST_ID.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_initializes_header() {
        let name = unique_name("create");
        let region = SharedRegion::open_or_create(Flavor::Light, &name, 64).unwrap();

        assert_eq!(region.buffer_size(), 64);
        let header = unsafe { region.header_static() };
        assert_eq!(header.next_write().load(Ordering::Relaxed), 0);
        assert_eq!(header.next_read().load(Ordering::Relaxed), 0);

        drop(region);
        SharedRegion::remove(Flavor::Light, &name).unwrap();
    }

    #[test]
    fn test_attach_keeps_existing_buffer_size() {
        let name = unique_name("mismatch");
        let first = SharedRegion::open_or_create(Flavor::Light, &name, 32).unwrap();

        // A second opener asking for a different size attaches to the
        // existing region; the stored size wins.
        let second = SharedRegion::open_or_create(Flavor::Light, &name, 4096).unwrap();
        assert_eq!(second.buffer_size(), 32);

        drop(first);
        drop(second);
        SharedRegion::remove(Flavor::Light, &name).unwrap();
    }

    #[test]
    fn test_attach_does_not_reset_indices() {
        let name = unique_name("reattach");
        let region = SharedRegion::open_or_create(Flavor::Blocking, &name, 16).unwrap();
        unsafe { region.header_static() }
            .next_write()
            .store(5, Ordering::Relaxed);
        drop(region);

        let region = SharedRegion::open_or_create(Flavor::Blocking, &name, 16).unwrap();
        assert_eq!(
            unsafe { region.header_static() }
                .next_write()
                .load(Ordering::Relaxed),
            5
        );

        drop(region);
        SharedRegion::remove(Flavor::Blocking, &name).unwrap();
    }

    #[test]
    fn test_create_rejects_out_of_range_sizes() {
        let name = unique_name("badsize");
        for size in [0, 1, MAX_BUFFER_SIZE + 1] {
            assert_eq!(
                SharedRegion::open_or_create(Flavor::Light, &name, size).err(),
                Some(StreamError::InvalidArgument)
            );
        }
        SharedRegion::remove(Flavor::Light, &name).unwrap();
    }

    #[test]
    fn test_remove_missing_region_is_ok() {
        SharedRegion::remove(Flavor::Light, &unique_name("missing")).unwrap();
    }

    #[test]
    fn test_remove_then_open_creates_fresh_region() {
        let name = unique_name("fresh");
        let region = SharedRegion::open_or_create(Flavor::Light, &name, 16).unwrap();
        unsafe { region.header_static() }
            .next_write()
            .store(3, Ordering::Relaxed);
        drop(region);

        SharedRegion::remove(Flavor::Light, &name).unwrap();

        let region = SharedRegion::open_or_create(Flavor::Light, &name, 16).unwrap();
        assert_eq!(
            unsafe { region.header_static() }
                .next_write()
                .load(Ordering::Relaxed),
            0,
            "Recreated region should start zeroed"
        );

        drop(region);
        SharedRegion::remove(Flavor::Light, &name).unwrap();
    }

    #[test]
    fn test_empty_name_is_invalid() {
        assert_eq!(
            SharedRegion::open_or_create(Flavor::Light, "", 16).err(),
            Some(StreamError::InvalidArgument)
        );
        assert_eq!(
            SharedRegion::remove(Flavor::Light, "").unwrap_err(),
            StreamError::InvalidArgument
        );
    }

    #[test]
    fn test_name_the_os_rejects_fails_to_open() {
        // A slash inside the stream name is not pre-validated; the OS
        // refuses the derived object names.
        assert_eq!(
            SharedRegion::open_or_create(Flavor::Light, "a/b", 16).err(),
            Some(StreamError::FailedToOpen)
        );
        assert_eq!(
            SharedRegion::remove(Flavor::Light, "a/b").unwrap_err(),
            StreamError::FailedToOpen
        );
    }
}
