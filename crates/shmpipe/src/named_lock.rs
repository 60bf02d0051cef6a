//! Inter-process mutex backed by a POSIX named semaphore.
//!
//! Serializes create/attach/remove of a shared region between processes.
//! The lock is never held during data transfer, only around the handful of
//! filesystem operations in `region`.

use crate::errors::StreamError;
use nix::errno::Errno;
use std::ffi::CString;

pub(crate) struct NamedLock {
    sem: *mut libc::sem_t,
}

impl NamedLock {
    /// Open the named semaphore, creating it with count 1 if it does not
    /// exist yet. Creation is atomic between racing processes.
    pub fn open_or_create(name: &str) -> Result<Self, StreamError> {
        let c_name = CString::new(name).map_err(|_| StreamError::FailedToOpen)?;

        let sem = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT, 0o644, 1) };
        if sem == libc::SEM_FAILED {
            tracing::debug!("sem_open({}) failed: {}", name, Errno::last());
            return Err(StreamError::FailedToOpen);
        }

        Ok(Self { sem })
    }

    /// Block until the lock is held. The guard releases it on drop, on all
    /// exit paths including panics.
    pub fn lock(&self) -> Result<LockGuard<'_>, StreamError> {
        loop {
            let ret = unsafe { libc::sem_wait(self.sem) };
            if ret == 0 {
                return Ok(LockGuard { lock: self });
            }
            match Errno::last() {
                Errno::EINTR => {}
                errno => {
                    tracing::warn!("sem_wait failed: {}", errno);
                    return Err(StreamError::InternalError);
                }
            }
        }
    }

    /// Remove the semaphore name from the system. Processes that still
    /// hold it keep a valid handle; a missing name is not an error.
    pub fn remove(name: &str) -> Result<(), StreamError> {
        let c_name = CString::new(name).map_err(|_| StreamError::FailedToOpen)?;

        let ret = unsafe { libc::sem_unlink(c_name.as_ptr()) };
        if ret != 0 && Errno::last() != Errno::ENOENT {
            tracing::warn!("sem_unlink({}) failed: {}", name, Errno::last());
            return Err(StreamError::InternalError);
        }
        Ok(())
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

unsafe impl Send for NamedLock {}

pub(crate) struct LockGuard<'a> {
    lock: &'a NamedLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let ret = unsafe { libc::sem_post(self.lock.sem) };
        if ret != 0 {
            tracing::warn!("sem_post failed: {}", Errno::last());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    static TEST_ID: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> String {
        format!(
            "/shmpipe_test_lock_{}_{}_{}",
            tag,
            std::process::id(),
            TEST_ID.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_lock_can_be_reacquired_after_release() {
        let name = unique_name("reacquire");
        let lock = NamedLock::open_or_create(&name).expect("open_or_create failed");

        drop(lock.lock().expect("first lock failed"));
        drop(lock.lock().expect("second lock failed"));

        NamedLock::remove(&name).expect("remove failed");
    }

    #[test]
    fn test_lock_excludes_other_openers() {
        let name = unique_name("exclude");
        let lock = NamedLock::open_or_create(&name).expect("open_or_create failed");
        let guard = lock.lock().expect("lock failed");

        let contender_name = name.clone();
        let contender = thread::spawn(move || {
            let lock = NamedLock::open_or_create(&contender_name).expect("open failed");
            // Blocks until the main thread releases.
            drop(lock.lock().expect("lock failed"));
        });

        // The contender must still be blocked while we hold the guard.
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!contender.is_finished(), "contender acquired a held lock");

        drop(guard);
        contender.join().expect("contender panicked");

        NamedLock::remove(&name).expect("remove failed");
    }

    #[test]
    fn test_remove_missing_name_is_ok() {
        NamedLock::remove(&unique_name("missing")).expect("remove of missing name failed");
    }

    #[test]
    fn test_embedded_nul_cannot_be_opened() {
        assert_eq!(
            NamedLock::open_or_create("bad\0name").err(),
            Some(StreamError::FailedToOpen)
        );
    }
}
