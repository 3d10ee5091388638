//! Error types shared by the region, the strategies and the host.
//!
//! Running out of space is not an error here: `alloc` reports it with `None`
//! and the caller decides whether that is fatal.

use std::{fmt, io};

/// Errors reported by `palloc`.
#[derive(Debug)]
pub enum Error {
  /// A region of zero bytes was requested.
  EmptyRegion,

  /// The operating system refused to map the backing region.
  ReserveFailed {
    /// The requested region length.
    size: usize,
    /// The error reported by `mmap`.
    source: io::Error,
  },

  /// The region cannot hold the strategy's bookkeeping plus one block.
  RegionTooSmall {
    /// Name of the strategy that rejected the region.
    strategy: &'static str,
    /// Length of the region handed to `create`.
    size: usize,
    /// Smallest region the strategy accepts.
    minimum: usize,
  },

  /// An allocation that is not live in this allocator was freed, either
  /// because it came from somewhere else or because it was already freed.
  InvalidFree {
    /// Offset of the allocation body inside the arena.
    offset: usize,
  },

  /// An allocation the caller cannot do without did not fit.
  OutOfMemory {
    /// The requested size.
    size: usize,
  },

  /// The strategy name given to the host matches no known strategy.
  UnknownStrategy(String),
}

impl fmt::Display for Error {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Error::EmptyRegion => write!(f, "Cannot reserve an empty region"),
      Error::ReserveFailed { size, source } => {
        write!(f, "Failed to reserve a region of {size} bytes: {source}")
      }
      Error::RegionTooSmall {
        strategy,
        size,
        minimum,
      } => write!(
        f,
        "Region of {size} bytes is too small for the {strategy} strategy (minimum {minimum} bytes)"
      ),
      Error::InvalidFree { offset } => {
        write!(f, "Invalid free: no live allocation at offset {offset:#x}")
      }
      Error::OutOfMemory { size } => write!(f, "Out of memory: no block fits {size} bytes"),
      Error::UnknownStrategy(name) => write!(f, "Unknown strategy: {name}"),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::ReserveFailed { source, .. } => Some(source),
      _ => None,
    }
  }
}

/// Result type for `palloc` operations.
pub type Result<T> = std::result::Result<T, Error>;
