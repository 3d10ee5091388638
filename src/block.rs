use std::{mem, ops::Range};

use crate::align;

/// Descriptor of a block inside an arena.
///
/// Blocks are kept by offset in the allocators' own tables instead of being
/// written into the arena. The arena still reserves [`HEADER_SIZE`] bytes in
/// front of every block body, the room an in-band `{size, next}` header would
/// take, so the overhead a strategy reports matches the memory it consumes.
///
/// ```text
///   offset        body()                  end()
///   ▼             ▼                       ▼
///   ┌─────────────┬───────────────────────┐
///   │   header    │      size bytes       │
///   └─────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block {
  pub offset: usize,
  pub size: usize,
}

/// Bytes reserved in front of every block body.
pub const HEADER_SIZE: usize = align!(mem::size_of::<Block>());

impl Block {
  pub fn new(
    offset: usize,
    size: usize,
  ) -> Self {
    Self { offset, size }
  }

  /// Offset of the first body byte.
  pub fn body(&self) -> usize {
    self.offset + HEADER_SIZE
  }

  /// First byte past the block.
  pub fn end(&self) -> usize {
    self.body() + self.size
  }
}

/// Handle to a live allocation, returned by `alloc` and consumed by `free`.
///
/// It carries the body's offset inside the arena and the size that was
/// requested. The bytes behind it are reached through the allocator that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Allocation {
  offset: usize,
  size: usize,
}

impl Allocation {
  pub(crate) fn new(
    offset: usize,
    size: usize,
  ) -> Self {
    Self { offset, size }
  }

  /// Offset of the first usable byte inside the arena.
  pub fn offset(&self) -> usize {
    self.offset
  }

  /// Number of bytes the caller asked for.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Usable byte range inside the arena.
  pub fn range(&self) -> Range<usize> {
    self.offset..self.offset + self.size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_size_holds_a_descriptor() {
    assert!(HEADER_SIZE >= mem::size_of::<Block>());
    assert_eq!(HEADER_SIZE % mem::size_of::<usize>(), 0);
  }

  #[test]
  fn test_allocation_range() {
    let allocation = Allocation::new(48, 100);

    assert_eq!(allocation.range(), 48..148);
    assert_eq!(Block::new(32, 100).body(), 32 + HEADER_SIZE);
    assert_eq!(Block::new(32, 100).end(), 132 + HEADER_SIZE);
  }
}
