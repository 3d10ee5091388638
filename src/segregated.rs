use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::{
  block::{Allocation, Block, HEADER_SIZE},
  error::{Error, Result},
  region::Region,
  strategy::{Arena, Create, Strategy},
};

/// Regions below this size are rejected outright.
pub const MIN_REGION_SIZE: usize = 512;

/// Smallest block, header included: a header plus a 4 byte body, rounded up
/// to a power of two.
pub const MIN_BLOCK_SIZE: usize = (HEADER_SIZE + 4).next_power_of_two();

/// What happens to a freed block whose buddy is also free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
  /// Freed blocks go back to their own class and are never recombined.
  /// Halves produced by splitting stay halves, so a long-running workload
  /// drifts towards small classes and large requests start failing.
  #[default]
  Never,
  /// Freed blocks are merged with their buddy (`offset ^ size`) while the
  /// buddy is free at the same size, climbing one class per merge.
  Buddy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegregatedConfig {
  pub merge: MergePolicy,
}

/// One free list per power-of-two size class.
///
/// ```text
///   class:   0      1      2       3       4    ...
///   size:    32     64     128     256     512  ...   (MIN_BLOCK_SIZE << class)
///            │      │      │       │       │
///            ▼      ▼      ▼       ▼       ▼
///          {..}   {..}   {..}    {..}    {..}        free block offsets
/// ```
///
/// At creation the arena is cut into the largest power-of-two block that
/// fits, then the next largest that fits in what remains, and so on until
/// less than [`MIN_BLOCK_SIZE`] is left. That tail is never handed out.
///
/// Every block in class `i` is exactly `MIN_BLOCK_SIZE << i` bytes and sits
/// at an offset that is a multiple of its size, which is what makes the
/// buddy of a block `offset ^ size`.
#[derive(Debug)]
pub struct SegregatedAllocator {
  region: Region,
  classes: Vec<BTreeSet<usize>>,
  /// Live blocks, block offset to block size (header included).
  live: BTreeMap<usize, usize>,
  merge: MergePolicy,
  used: usize,
}

/// Block size class for `size`, which must be a power of two no smaller
/// than [`MIN_BLOCK_SIZE`].
fn class_of(size: usize) -> usize {
  (size.trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros()) as usize
}

fn class_size(class: usize) -> usize {
  MIN_BLOCK_SIZE << class
}

/// Number of classes whose block size fits in `len` bytes.
fn class_count(len: usize) -> usize {
  let mut count = 0;
  let mut size = MIN_BLOCK_SIZE;

  while size <= len {
    count += 1;
    size = match size.checked_mul(2) {
      Some(next) => next,
      None => break,
    };
  }

  count
}

/// Block size that serves a request of `size` bytes, header included.
fn block_size_for(size: usize) -> Option<usize> {
  size
    .checked_add(HEADER_SIZE)?
    .checked_next_power_of_two()
    .map(|block| block.max(MIN_BLOCK_SIZE))
}

impl SegregatedAllocator {
  pub fn merge_policy(&self) -> MergePolicy {
    self.merge
  }

  /// Number of size classes.
  pub fn class_count(&self) -> usize {
    self.classes.len()
  }

  /// Free blocks per class, smallest class first.
  pub fn class_lengths(&self) -> Vec<usize> {
    self.classes.iter().map(BTreeSet::len).collect()
  }

  /// Free blocks in address order. `size` is the body size.
  pub fn free_list(&self) -> Vec<Block> {
    let mut blocks: Vec<Block> = self
      .classes
      .iter()
      .enumerate()
      .flat_map(|(class, offsets)| {
        offsets
          .iter()
          .map(move |&offset| Block::new(offset, class_size(class) - HEADER_SIZE))
      })
      .collect();
    blocks.sort();
    blocks
  }

  /// Live blocks in address order. `size` is the body size.
  pub fn live_blocks(&self) -> impl Iterator<Item = Block> + '_ {
    self
      .live
      .iter()
      .map(|(&offset, &size)| Block::new(offset, size - HEADER_SIZE))
  }

  /// Bytes at the end of the arena too small to form a block.
  pub fn slack(&self) -> usize {
    let mut remaining = self.region.len();

    for class in (0..self.classes.len()).rev() {
      if remaining >= class_size(class) {
        remaining -= class_size(class);
      }
    }

    remaining
  }

  pub fn into_region(self) -> Region {
    self.region
  }

  /// Takes the lowest free block of `class` or the first larger class,
  /// halving it down to `class` and filing the upper halves.
  fn take_block(
    &mut self,
    class: usize,
  ) -> Option<usize> {
    if let Some(offset) = self.classes[class].pop_first() {
      return Some(offset);
    }

    let source = (class + 1..self.classes.len()).find(|&i| !self.classes[i].is_empty())?;
    let offset = self.classes[source].pop_first()?;

    let mut size = class_size(source);
    let target = class_size(class);

    while size > target {
      let half = size >> 1;

      if half < target {
        break;
      }

      self.classes[class_of(half)].insert(offset + half);
      self.used += HEADER_SIZE;
      size = half;

      trace!(offset = offset + half, size = half, "segregated: split");
    }

    Some(offset)
  }

  /// Merges the block at `offset` with its free buddies and returns the
  /// resulting block.
  fn merge_buddies(
    &mut self,
    mut offset: usize,
    mut size: usize,
  ) -> (usize, usize) {
    while class_of(size) + 1 < self.classes.len() {
      let buddy = offset ^ size;

      if !self.classes[class_of(size)].remove(&buddy) {
        break;
      }

      trace!(offset, buddy, size, "segregated: merge");

      offset = offset.min(buddy);
      size <<= 1;
      self.used -= HEADER_SIZE;
    }

    (offset, size)
  }
}

impl Create for SegregatedAllocator {
  type Config = SegregatedConfig;

  fn create(
    region: Region,
    config: SegregatedConfig,
  ) -> Result<Self> {
    if region.len() < MIN_REGION_SIZE {
      return Err(Error::RegionTooSmall {
        strategy: "segregated",
        size: region.len(),
        minimum: MIN_REGION_SIZE,
      });
    }

    let count = class_count(region.len());
    let mut classes = vec![BTreeSet::new(); count];
    let mut used = 0;
    let mut cursor = 0;
    let mut remaining = region.len();

    for class in (0..count).rev() {
      if remaining < MIN_BLOCK_SIZE {
        break;
      }

      let size = class_size(class);

      if size <= remaining {
        classes[class].insert(cursor);
        used += HEADER_SIZE;
        cursor += size;
        remaining -= size;
      }
    }

    debug!(
      arena = region.len(),
      classes = count,
      slack = remaining,
      merge = ?config.merge,
      "created segregated allocator"
    );

    Ok(Self {
      region,
      classes,
      live: BTreeMap::new(),
      merge: config.merge,
      used,
    })
  }
}

impl Arena for SegregatedAllocator {
  fn region(&self) -> &Region {
    &self.region
  }

  fn region_mut(&mut self) -> &mut Region {
    &mut self.region
  }
}

impl Strategy for SegregatedAllocator {
  fn name(&self) -> &'static str {
    match self.merge {
      MergePolicy::Never => "segregated",
      MergePolicy::Buddy => "buddy",
    }
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<Allocation> {
    if size == 0 {
      return None;
    }

    let block = block_size_for(size)?;
    let class = class_of(block);

    if class >= self.classes.len() {
      debug!(size, block, "segregated: request larger than any class");
      return None;
    }

    let Some(offset) = self.take_block(class) else {
      debug!(size, block, "segregated: no free block in class or above");
      return None;
    };

    self.live.insert(offset, block);
    self.used += block - HEADER_SIZE;

    debug!(size, block, offset = offset + HEADER_SIZE, "segregated: alloc");

    Some(Allocation::new(offset + HEADER_SIZE, size))
  }

  fn free(
    &mut self,
    allocation: Allocation,
  ) -> Result<()> {
    let (offset, size) = allocation
      .offset()
      .checked_sub(HEADER_SIZE)
      .and_then(|offset| self.live.remove(&offset).map(|size| (offset, size)))
      .ok_or(Error::InvalidFree {
        offset: allocation.offset(),
      })?;

    self.used -= size - HEADER_SIZE;

    let (offset, size) = match self.merge {
      MergePolicy::Never => (offset, size),
      MergePolicy::Buddy => self.merge_buddies(offset, size),
    };

    self.classes[class_of(size)].insert(offset);

    debug!(
      offset = allocation.offset(),
      block = size,
      class = class_of(size),
      "segregated: free"
    );

    Ok(())
  }

  fn usage(&self) -> Option<usize> {
    Some(self.used)
  }

  fn free_blocks(&self) -> Option<usize> {
    Some(self.classes.iter().map(BTreeSet::len).sum())
  }

  fn largest_request(&self) -> usize {
    self
      .classes
      .iter()
      .rposition(|offsets| !offsets.is_empty())
      .map(|class| class_size(class) - HEADER_SIZE)
      .unwrap_or(0)
  }

  fn destroy(self: Box<Self>) -> Region {
    debug!(live = self.live.len(), "destroyed segregated allocator");
    self.into_region()
  }
}
