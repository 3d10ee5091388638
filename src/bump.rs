use tracing::debug;

use crate::{
  block::Allocation,
  error::Result,
  region::Region,
  strategy::{Arena, Create, Strategy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BumpConfig;

/// Linear allocator used when no other strategy can be set up.
///
/// ```text
///   ┌─────┬─────┬─────┬─────┬───────────────────────────────────────┐
///   │ A1  │ A2  │ A3  │ A4  │            Free Space                 │
///   └─────┴─────┴─────┴─────┴───────────────────────────────────────┘
///                           ▲                                       ▲
///                         offset                                   len
/// ```
///
/// Each allocation moves `offset` forward by exactly the requested size.
/// `free` does nothing: memory is only reclaimed when the region is
/// released. The offset belongs to the instance, two bump allocators never
/// share it.
#[derive(Debug)]
pub struct BumpAllocator {
  region: Region,
  offset: usize,
}

impl BumpAllocator {
  /// Offset of the next allocation.
  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn into_region(self) -> Region {
    self.region
  }
}

impl Create for BumpAllocator {
  type Config = BumpConfig;

  fn create(
    region: Region,
    _config: BumpConfig,
  ) -> Result<Self> {
    debug!(arena = region.len(), "created bump allocator");

    Ok(Self { region, offset: 0 })
  }
}

impl Arena for BumpAllocator {
  fn region(&self) -> &Region {
    &self.region
  }

  fn region_mut(&mut self) -> &mut Region {
    &mut self.region
  }
}

impl Strategy for BumpAllocator {
  fn name(&self) -> &'static str {
    "bump"
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<Allocation> {
    if size == 0 {
      return None;
    }

    let end = self.offset.checked_add(size)?;

    if end > self.region.len() {
      debug!(size, offset = self.offset, "bump: region exhausted");
      return None;
    }

    let allocation = Allocation::new(self.offset, size);
    self.offset = end;

    debug!(size, offset = allocation.offset(), "bump: alloc");

    Some(allocation)
  }

  fn free(
    &mut self,
    allocation: Allocation,
  ) -> Result<()> {
    debug!(offset = allocation.offset(), "bump: free is a no-op");
    Ok(())
  }

  fn usage(&self) -> Option<usize> {
    Some(self.offset)
  }

  fn largest_request(&self) -> usize {
    self.region.len() - self.offset
  }

  fn destroy(self: Box<Self>) -> Region {
    debug!(offset = self.offset, "destroyed bump allocator");
    self.into_region()
  }
}
