use palloc::{
  Create, HEADER_SIZE, Host, HostConfig, MIN_BLOCK_SIZE, MergePolicy, Region, SegregatedAllocator,
  SegregatedConfig, Strategy,
};

const STRATEGIES: [&str; 4] = ["best-fit", "segregated", "buddy", "bump"];

fn host(
  strategy: &str,
  region_size: usize,
) -> Host {
  let host = Host::start(&HostConfig {
    region_size,
    strategy: Some(strategy.to_owned()),
    ..HostConfig::default()
  })
  .unwrap();

  assert!(!host.selection().fell_back, "{strategy} fell back");
  host
}

#[test]
fn test_zero_size_rejected_everywhere() {
  for strategy in STRATEGIES {
    let mut host = host(strategy, 1 << 16);

    assert!(host.alloc(0).is_none(), "{strategy}");
  }
}

#[test]
fn test_capacity_boundary() {
  // Overhead per strategy for a single allocation spanning the arena.
  let cases = [("best-fit", HEADER_SIZE), ("segregated", HEADER_SIZE), ("bump", 0)];

  for (strategy, overhead) in cases {
    let size = 1 << 16;

    let mut host = self::host(strategy, size);
    assert!(host.alloc(size - overhead + 1).is_none(), "{strategy}");

    let mut host = self::host(strategy, size);
    assert!(host.alloc(size - overhead).is_some(), "{strategy}");
  }
}

#[test]
fn test_reuse_after_free() {
  for strategy in ["best-fit", "segregated", "buddy"] {
    let mut host = host(strategy, 1 << 16);

    let first = host.alloc(128).unwrap();
    host.free(first).unwrap();
    let second = host.alloc(128).unwrap();

    assert_eq!(first, second, "{strategy}");
  }
}

#[test]
fn test_coalescing_spans_both_blocks() {
  let mut host = host("best-fit", 1 << 16);

  let a = host.alloc(100).unwrap();
  let b = host.alloc(100).unwrap();
  host.free(a).unwrap();
  host.free(b).unwrap();

  let c = host.alloc(180).unwrap();
  assert!(c.offset() >= a.offset());
  assert!(c.range().end <= b.range().end);
}

#[test]
fn test_size_class_rounding() {
  let region = Region::reserve(1 << 16).unwrap();
  let mut allocator = SegregatedAllocator::create(region, SegregatedConfig::default()).unwrap();

  allocator.alloc(MIN_BLOCK_SIZE + 1).unwrap();
  let block = allocator.live_blocks().next().unwrap();

  assert!(block.end() - block.offset >= 2 * MIN_BLOCK_SIZE.next_power_of_two());
}

#[test]
fn test_usage_stays_in_bounds() {
  for strategy in ["best-fit", "segregated", "buddy", "bump"] {
    let mut host = host(strategy, 1 << 18);
    let arena = host.allocator().arena_len();
    let mut live = Vec::new();

    for round in 0..2000usize {
      if round % 3 == 2 && !live.is_empty() {
        let allocation = live.swap_remove(round % live.len());
        host.free(allocation).unwrap();
      } else if let Some(allocation) = host.alloc(1 + round * 37 % 700) {
        live.push(allocation);
      }

      let usage = host.usage().unwrap();
      assert!(usage <= arena, "{strategy}: {usage} > {arena}");
    }
  }
}

#[test]
fn test_fragmentation_scenario() {
  for strategy in ["best-fit", "buddy"] {
    let size = 4 << 20;
    let mut host = host(strategy, size);

    let blocks: Vec<_> = (1..=1000).map(|i| host.alloc(i * 2).unwrap()).collect();

    for allocation in blocks.iter().step_by(2) {
      host.free(*allocation).unwrap();
    }
    for allocation in blocks.iter().skip(1).step_by(2) {
      host.free(*allocation).unwrap();
    }

    assert!(host.alloc(size / 2).is_some(), "{strategy}");
  }
}

#[test]
fn test_non_merging_segregated_discloses_fragmentation() {
  let region = Region::reserve(1 << 16).unwrap();
  let mut allocator = SegregatedAllocator::create(
    region,
    SegregatedConfig {
      merge: MergePolicy::Never,
    },
  )
  .unwrap();

  let small = allocator.alloc(1).unwrap();
  allocator.free(small).unwrap();

  // The halves split off for `small` are never put back together.
  assert!(allocator.alloc((1 << 16) - HEADER_SIZE).is_none());
  assert!(allocator.alloc((1 << 15) - HEADER_SIZE).is_some());
}

#[test]
fn test_destroy_hands_back_region() {
  for strategy in STRATEGIES {
    let mut host = host(strategy, 1 << 16);
    let allocation = host.alloc(10).unwrap();
    host.bytes_mut(allocation).fill(0x5A);

    let region = host.destroy();
    assert_eq!(region.len(), 1 << 16);
    assert_eq!(region.bytes(allocation.range()), &[0x5A; 10]);
  }
}
