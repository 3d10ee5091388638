use crate::{
  block::Allocation,
  error::Result,
  region::Region,
};

pub(crate) mod sealed {
  use crate::region::Region;

  /// Raw access to the region a strategy owns.
  pub trait Arena {
    fn region(&self) -> &Region;

    fn region_mut(&mut self) -> &mut Region;
  }
}

pub(crate) use sealed::Arena;

/// Contract every allocation strategy implements.
///
/// A strategy is created over a [`Region`] it owns exclusively until
/// [`Strategy::destroy`] hands the region back. All methods take `&mut self`
/// where they change bookkeeping; strategies do no locking and callers that
/// share one across threads must serialize access themselves.
///
/// The arena is only reachable through live allocations. The region itself
/// stays private to the strategies of this crate until it is destroyed:
///
/// ```rust,compile_fail
/// use palloc::{BestFitAllocator, BestFitConfig, Create, Region, Strategy};
///
/// let region = Region::reserve(4096).unwrap();
/// let mut allocator = BestFitAllocator::create(region, BestFitConfig::default()).unwrap();
/// allocator.region_mut().bytes_mut(0..16).fill(0);
/// ```
pub trait Strategy: sealed::Arena {
  /// Short strategy name used in logs and reports.
  fn name(&self) -> &'static str;

  /// Returns an allocation usable for exactly `size` bytes, or `None` when
  /// `size` is zero or no free block satisfies the request.
  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<Allocation>;

  /// Returns `allocation` to the strategy.
  ///
  /// Freeing an allocation that was not produced by this strategy, or that
  /// was already freed, is a caller bug. Strategies that track live blocks
  /// report it as [`crate::Error::InvalidFree`] and leave their free lists
  /// untouched.
  fn free(
    &mut self,
    allocation: Allocation,
  ) -> Result<()>;

  /// Bytes held by live allocations plus block overhead, or `None` if the
  /// strategy does not keep a usage counter.
  fn usage(&self) -> Option<usize> {
    None
  }

  /// Number of bytes under management.
  fn arena_len(&self) -> usize {
    self.region().len()
  }

  /// Number of free blocks, or `None` when the strategy keeps no free list.
  fn free_blocks(&self) -> Option<usize> {
    None
  }

  /// Size of the largest request that would currently succeed.
  fn largest_request(&self) -> usize;

  /// Tears the strategy down and gives the region back to the caller.
  /// Dropping the returned region unmaps it.
  fn destroy(self: Box<Self>) -> Region;

  /// Bytes of a live allocation.
  fn bytes(
    &self,
    allocation: Allocation,
  ) -> &[u8] {
    self.region().bytes(allocation.range())
  }

  /// Writable bytes of a live allocation.
  fn bytes_mut(
    &mut self,
    allocation: Allocation,
  ) -> &mut [u8] {
    self.region_mut().bytes_mut(allocation.range())
  }
}

/// Construction half of the strategy contract, kept apart from [`Strategy`]
/// so the latter stays usable as a trait object.
pub trait Create: Strategy + Sized {
  /// Strategy-specific knobs.
  type Config: Default;

  /// Takes ownership of `region` and lays out the initial free blocks.
  /// Fails with [`crate::Error::RegionTooSmall`] when the region cannot hold
  /// the bookkeeping plus one block.
  fn create(
    region: Region,
    config: Self::Config,
  ) -> Result<Self>;
}
