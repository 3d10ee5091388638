use std::collections::BTreeMap;

use tracing::debug;

use crate::{
  block::{Allocation, Block, HEADER_SIZE},
  error::{Error, Result},
  region::Region,
  strategy::{Arena, Create, Strategy},
};

/// A remainder is only split off when it can hold a header and at least one
/// byte of body.
const MIN_SPLIT: usize = HEADER_SIZE + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestFitConfig {
  /// Keep a running usage counter.
  pub accounting: bool,
}

impl Default for BestFitConfig {
  fn default() -> Self {
    Self { accounting: true }
  }
}

/// Single free list, best-fit search, split on allocation and exhaustive
/// coalescing on free.
///
/// ```text
///   alloc(n): smallest free block with size >= n, lowest address on ties
///
///   ┌──────┬───────────────────────────────────────┐
///   │ hdr  │              free (size)              │
///   └──────┴───────────────────────────────────────┘
///                          │ split
///                          ▼
///   ┌──────┬───────────┬──────┬────────────────────┐
///   │ hdr  │ alloc (n) │ hdr  │ free (size - n - h)│
///   └──────┴───────────┴──────┴────────────────────┘
/// ```
///
/// The free list is ordered by address, so after every `free` a single pass
/// over list neighbours is enough to leave no two physically adjacent free
/// blocks behind.
#[derive(Debug)]
pub struct BestFitAllocator {
  region: Region,
  /// Free blocks, header offset to body size, in address order.
  free: BTreeMap<usize, usize>,
  /// Live blocks, header offset to body size.
  live: BTreeMap<usize, usize>,
  used: Option<usize>,
}

impl BestFitAllocator {
  /// Free blocks in address order.
  pub fn free_list(&self) -> impl Iterator<Item = Block> + '_ {
    self.free.iter().map(|(&offset, &size)| Block::new(offset, size))
  }

  /// Live blocks in address order.
  pub fn live_blocks(&self) -> impl Iterator<Item = Block> + '_ {
    self.live.iter().map(|(&offset, &size)| Block::new(offset, size))
  }

  pub fn into_region(self) -> Region {
    self.region
  }

  /// Linear scan for the smallest block that fits. Strict comparison keeps
  /// the first (lowest address) block among equally sized candidates.
  fn find_free_block(
    &self,
    size: usize,
  ) -> Option<Block> {
    let mut best: Option<Block> = None;

    for (&offset, &block_size) in &self.free {
      if block_size < size {
        continue;
      }

      match best {
        Some(current) if current.size <= block_size => {}
        _ => best = Some(Block::new(offset, block_size)),
      }

      if block_size == size {
        break;
      }
    }

    best
  }

  /// Merges every run of physically contiguous free blocks. Returns the
  /// number of headers that were absorbed.
  fn coalesce(&mut self) -> usize {
    let mut merged: Vec<Block> = Vec::with_capacity(self.free.len());
    let mut merges = 0;

    for block in self.free_list() {
      match merged.last_mut() {
        Some(previous) if previous.end() == block.offset => {
          previous.size += HEADER_SIZE + block.size;
          merges += 1;
        }
        _ => merged.push(block),
      }
    }

    if merges > 0 {
      self.free = merged
        .into_iter()
        .map(|block| (block.offset, block.size))
        .collect();
    }

    merges
  }

  fn account_add(
    &mut self,
    bytes: usize,
  ) {
    if let Some(used) = self.used.as_mut() {
      *used += bytes;
    }
  }

  fn account_sub(
    &mut self,
    bytes: usize,
  ) {
    if let Some(used) = self.used.as_mut() {
      *used -= bytes;
    }
  }
}

impl Create for BestFitAllocator {
  type Config = BestFitConfig;

  fn create(
    region: Region,
    config: BestFitConfig,
  ) -> Result<Self> {
    if region.len() < MIN_SPLIT {
      return Err(Error::RegionTooSmall {
        strategy: "best-fit",
        size: region.len(),
        minimum: MIN_SPLIT,
      });
    }

    let mut free = BTreeMap::new();
    free.insert(0, region.len() - HEADER_SIZE);

    debug!(
      arena = region.len(),
      accounting = config.accounting,
      "created best-fit allocator"
    );

    Ok(Self {
      region,
      free,
      live: BTreeMap::new(),
      used: config.accounting.then_some(HEADER_SIZE),
    })
  }
}

impl Arena for BestFitAllocator {
  fn region(&self) -> &Region {
    &self.region
  }

  fn region_mut(&mut self) -> &mut Region {
    &mut self.region
  }
}

impl Strategy for BestFitAllocator {
  fn name(&self) -> &'static str {
    "best-fit"
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<Allocation> {
    if size == 0 {
      return None;
    }

    let Some(block) = self.find_free_block(size) else {
      debug!(size, free_blocks = self.free.len(), "best-fit: no block fits");
      return None;
    };

    self.free.remove(&block.offset);

    let body = if block.size - size >= MIN_SPLIT {
      let remainder = Block::new(block.body() + size, block.size - size - HEADER_SIZE);
      self.free.insert(remainder.offset, remainder.size);
      self.account_add(HEADER_SIZE);
      size
    } else {
      block.size
    };

    self.live.insert(block.offset, body);
    self.account_add(body);

    debug!(size, offset = block.body(), body, "best-fit: alloc");

    Some(Allocation::new(block.body(), size))
  }

  fn free(
    &mut self,
    allocation: Allocation,
  ) -> Result<()> {
    let (header, size) = allocation
      .offset()
      .checked_sub(HEADER_SIZE)
      .and_then(|header| self.live.remove(&header).map(|size| (header, size)))
      .ok_or(Error::InvalidFree {
        offset: allocation.offset(),
      })?;

    self.free.insert(header, size);
    self.account_sub(size);

    let merges = self.coalesce();
    self.account_sub(merges * HEADER_SIZE);

    debug!(
      offset = allocation.offset(),
      size,
      merges,
      free_blocks = self.free.len(),
      "best-fit: free"
    );

    Ok(())
  }

  fn usage(&self) -> Option<usize> {
    self.used
  }

  fn free_blocks(&self) -> Option<usize> {
    Some(self.free.len())
  }

  fn largest_request(&self) -> usize {
    self.free.values().copied().max().unwrap_or(0)
  }

  fn destroy(self: Box<Self>) -> Region {
    debug!(live = self.live.len(), "destroyed best-fit allocator");
    self.into_region()
  }
}
