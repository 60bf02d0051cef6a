//! Byte-oriented single-producer/single-consumer streams between two
//! processes on the same host, backed by shared memory.
//!
//! Two flavors are offered:
//!
//! - **light** — non-blocking try-reserve/commit only. Lock-free and
//!   wait-free wherever 32-bit atomics are.
//! - **blocking** — the same protocol plus futex-based waits on
//!   empty/full and a cooperative, permanent stop signal.
//!
//! # Shared region layout
//!
//! ```text
//! offset 0    : AtomicU32 next_write  }
//! offset 64   : AtomicU32 next_read   }  header (3 cache lines)
//! offset 128  : u32 buffer_size       }
//! offset 192  : byte buffer[buffer_size]
//! ```
//!
//! Both peers rendezvous on a user-supplied stream name; the first opener
//! creates and initializes the region (serialized by a named lock), later
//! openers attach. Closing a handle never destroys the region — `remove`
//! does.
//!
//! # Example
//!
//! ```no_run
//! use shmpipe::{LightStreamReader, LightStreamWriter};
//!
//! let mut writer = LightStreamWriter::new();
//! writer.open("telemetry", 4096)?;
//! let buf = writer.try_reserve(5);
//! buf.copy_from_slice(b"hello");
//! writer.commit(5);
//!
//! // Typically in another process:
//! let mut reader = LightStreamReader::new();
//! reader.open("telemetry", 4096)?;
//! let bytes = reader.try_reserve_all();
//! assert_eq!(bytes, b"hello");
//! reader.commit(5);
//!
//! shmpipe::light_stream::remove("telemetry")?;
//! # Ok::<(), shmpipe::StreamError>(())
//! ```
//!
//! Reservations are contiguous: a producer crossing the end of the ring
//! gets the tail span first and the wrapped span on the next reserve.
//! At most one live writer and one live reader may exist per stream;
//! `stop`/`is_stopped` on the blocking flavor are safe from any thread.

pub mod blocking_stream;
pub mod errors;
pub mod light_stream;

mod blocking_ring;
mod futex;
mod header;
mod light_ring;
mod named_lock;
mod names;
mod region;

pub use blocking_stream::{BlockingStreamReader, BlockingStreamWriter};
pub use errors::{error_message, ErrorCode, StreamError};
pub use header::{MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use light_stream::{LightStreamReader, LightStreamWriter};
