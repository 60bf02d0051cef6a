use thiserror::Error;

/// Failures surfaced by stream lifecycle operations.
///
/// Only `open`, `create` and `remove` can fail. Steady-state ring
/// operations never do: full, empty and stopped conditions are reported
/// as empty slices or zero sizes instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// Buffer size out of range, or an empty stream name.
    #[error("Invalid argument.")]
    InvalidArgument,

    /// The OS refused to create or open the shared region or its lock
    /// (name it cannot represent, permissions, etc.).
    #[error("Failed to create or open a stream.")]
    FailedToOpen,

    /// Unclassified failure from the OS layer.
    #[error("Internal error.")]
    InternalError,
}

/// Numeric error codes spoken at the external boundary.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidArgument = 1,
    FailedToOpen = 2,
    InternalError = 3,
}

impl From<StreamError> for ErrorCode {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidArgument => ErrorCode::InvalidArgument,
            StreamError::FailedToOpen => ErrorCode::FailedToOpen,
            StreamError::InternalError => ErrorCode::InternalError,
        }
    }
}

impl From<Result<(), StreamError>> for ErrorCode {
    fn from(result: Result<(), StreamError>) -> Self {
        match result {
            Ok(()) => ErrorCode::Success,
            Err(err) => err.into(),
        }
    }
}

/// Message for a numeric error code, including codes received from
/// untrusted peers.
pub fn error_message(code: u32) -> &'static str {
    match code {
        0 => "Success.",
        1 => "Invalid argument.",
        2 => "Failed to create or open a stream.",
        3 => "Internal error.",
        _ => "Invalid error code.",
    }
}
