//! Address-based wait/notify on 32-bit atomics.
//!
//! Uses the shared futex operations (no `FUTEX_PRIVATE_FLAG`) so the same
//! calls work when the atomic lives in a region mapped by two processes.

use nix::errno::Errno;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Block until `atomic` holds a value different from `expected`.
///
/// Returns the first differing value observed. Spurious wakeups, EINTR and
/// lost races against a concurrent store are all absorbed by re-checking
/// the value before parking again.
pub(crate) fn wait(atomic: &AtomicU32, expected: u32) -> u32 {
    loop {
        let current = atomic.load(Ordering::Relaxed);
        if current != expected {
            return current;
        }

        let ret = unsafe {
            libc::syscall(
                libc::SYS_futex,
                atomic.as_ptr(),
                libc::FUTEX_WAIT,
                expected,
                ptr::null::<libc::timespec>(),
            )
        };

        if ret < 0 {
            match Errno::last() {
                // EAGAIN: the value changed before the kernel parked us.
                // EINTR: signal. Both just mean "re-check".
                Errno::EAGAIN | Errno::EINTR => {}
                errno => {
                    // Any other failure is treated as a wakeup.
                    tracing::warn!("futex wait failed: {}", errno);
                }
            }
        }
    }
}

/// Wake every thread currently parked on `atomic`, in any process mapping
/// the same region.
pub(crate) fn notify_all(atomic: &AtomicU32) {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic.as_ptr(),
            libc::FUTEX_WAKE,
            i32::MAX,
        )
    };

    if ret < 0 {
        tracing::warn!("futex wake failed: {}", Errno::last());
    }
}
