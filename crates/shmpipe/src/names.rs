//! Derivation of OS object names from user-supplied stream names.
//!
//! Every name embeds the flavor tag, so a light and a blocking stream with
//! the same user name can never collide on a region or a lock.

use crate::errors::StreamError;
use std::path::PathBuf;

/// Stream flavor, as embedded in shared object names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    Light,
    Blocking,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::Light => "light",
            Flavor::Blocking => "blocking",
        }
    }
}

/// Path of the file backing the stream's shared region.
pub(crate) fn data_path(flavor: Flavor, stream: &str) -> PathBuf {
    PathBuf::from(format!(
        "/dev/shm/shmpipe_{}_data_{}",
        flavor.as_str(),
        stream
    ))
}

/// Name of the named semaphore guarding create/attach/remove of the
/// region. Leading `/` as required for POSIX semaphore names.
pub(crate) fn lock_name(flavor: Flavor, stream: &str) -> String {
    format!("/shmpipe_{}_lock_{}", flavor.as_str(), stream)
}

/// Reject an empty stream name. Any other name is handed to the OS as-is;
/// one the OS cannot represent fails the open and surfaces as
/// `FailedToOpen` there.
pub(crate) fn validate_stream_name(name: &str) -> Result<(), StreamError> {
    if name.is_empty() {
        return Err(StreamError::InvalidArgument);
    }
    Ok(())
}
