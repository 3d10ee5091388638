//! Workloads that exercise whichever strategy the host is running.
//!
//! Apart from the demonstration sequence, nothing here is fatal: failed
//! allocations are counted and reported, since running out of a fixed
//! region is part of what is being measured. Every workload checks the
//! contract each strategy must honor: returned bytes hold what was written
//! to them, freed space becomes reusable and usage stays within the arena.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
  block::Allocation,
  error::{Error, Result},
  host::{Host, Selection, StrategyKind},
};

/// Text written into the oversized demonstration allocation.
const PROBE_TEXT: &[u8] = b"bibibibibibibibibibibibibibibibibibibibbibibibi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
  /// Allocations in the stress run.
  pub stress_blocks: usize,
  /// Largest request in the stress run.
  pub stress_max_size: usize,
  /// Allocations in the fragmentation run.
  pub fragmentation_blocks: usize,
  /// Alloc/free pairs in the reuse run.
  pub reuse_rounds: usize,
  /// Request size in the reuse run.
  pub reuse_size: usize,
}

impl Default for WorkloadConfig {
  fn default() -> Self {
    Self {
      stress_blocks: 10_000,
      stress_max_size: 2048,
      fragmentation_blocks: 1000,
      reuse_rounds: 1000,
      reuse_size: 128,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoReport {
  /// Whether the oversized probe fit.
  pub probe_allocated: bool,
  pub probe_size: usize,
  /// Offsets of the 1024, 100 and 100 byte allocations.
  pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressReport {
  pub requested: usize,
  pub succeeded: usize,
  pub failed: usize,
  /// Bytes asked for by the successful allocations.
  pub payload_bytes: usize,
  /// Usage right after the allocation loop.
  pub peak_usage: Option<usize>,
  /// `payload_bytes / peak_usage`, below 1.0 by the share lost to headers,
  /// rounding and bookkeeping.
  pub factor: Option<f64>,
  /// Allocations whose contents did not survive the other writes.
  pub corrupted: usize,
  pub alloc_time: Duration,
  pub free_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentationReport {
  pub requested: usize,
  pub succeeded: usize,
  /// Free blocks left after releasing even then odd indices.
  pub free_blocks: Option<usize>,
  pub half_size: usize,
  /// Whether half of the arena could be allocated afterwards.
  pub half_allocated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReuseReport {
  pub rounds: usize,
  pub size: usize,
  /// Rounds that got back the offset of the first round.
  pub reused: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
  pub strategy: &'static str,
  pub selection: Selection,
  pub arena_len: usize,
  pub demo: DemoReport,
  pub stress: StressReport,
  pub fragmentation: FragmentationReport,
  pub reuse: ReuseReport,
  /// Times usage was seen above the arena length.
  pub usage_violations: usize,
  pub final_usage: Option<usize>,
}

impl Report {
  /// `true` when no workload saw the contract broken. Strategies that
  /// reclaim memory must also hand a freed block back at least once during
  /// the reuse run; the bump fallback never does.
  pub fn is_sound(&self) -> bool {
    self.stress.corrupted == 0 && self.usage_violations == 0 && self.reclaims()
  }

  fn reclaims(&self) -> bool {
    self.selection.kind == StrategyKind::Bump || self.reuse.rounds < 2 || self.reuse.reused > 0
  }
}

/// Runs every workload in order on the host's allocator.
pub fn run(
  host: &mut Host,
  config: &WorkloadConfig,
) -> Result<Report> {
  let mut monitor = UsageMonitor::default();

  let demo = demo(host, &mut monitor)?;
  let stress = stress(host, config, &mut monitor)?;
  let fragmentation = fragmentation(host, config, &mut monitor)?;
  let reuse = reuse(host, config, &mut monitor)?;

  Ok(Report {
    strategy: host.allocator().name(),
    selection: host.selection().clone(),
    arena_len: host.allocator().arena_len(),
    demo,
    stress,
    fragmentation,
    reuse,
    usage_violations: monitor.violations,
    final_usage: host.usage(),
  })
}

#[derive(Debug, Default)]
struct UsageMonitor {
  violations: usize,
}

impl UsageMonitor {
  fn check(
    &mut self,
    host: &Host,
  ) {
    let arena = host.allocator().arena_len();

    if let Some(usage) = host.usage() {
      if usage > arena {
        error!(usage, arena, "usage exceeds the arena");
        self.violations += 1;
      }
    }
  }
}

fn pattern(index: usize) -> u8 {
  (index % 251) as u8 + 1
}

/// The fixed demonstration sequence: an `int`, a `double`, an oversized
/// probe, then 1024, 100 and 100 bytes, all freed again. Any of the small
/// allocations failing is fatal.
fn demo(
  host: &mut Host,
  monitor: &mut UsageMonitor,
) -> Result<DemoReport> {
  let required = |host: &mut Host, size: usize| host.alloc(size).ok_or(Error::OutOfMemory { size });

  let int = required(host, size_of::<i32>())?;
  host.bytes_mut(int).copy_from_slice(&1000i32.to_ne_bytes());

  let double = required(host, size_of::<f64>())?;
  host.bytes_mut(double).copy_from_slice(&1021.12f64.to_ne_bytes());

  let arena = host.allocator().arena_len();
  let probe_size = arena - arena / 7;
  let probe = host.alloc(probe_size);
  let shown = PROBE_TEXT.len().min(probe_size);

  match probe {
    Some(probe) => host.bytes_mut(probe)[..shown].copy_from_slice(&PROBE_TEXT[..shown]),
    None => warn!(size = probe_size, "demo: oversized probe did not fit"),
  }

  let mut offsets = Vec::with_capacity(3);
  let mut tail: Vec<Allocation> = Vec::with_capacity(3);

  for size in [1024, 100, 100] {
    let allocation = required(host, size)?;
    info!(size, offset = allocation.offset(), "demo: allocated");
    offsets.push(allocation.offset());
    tail.push(allocation);
  }

  monitor.check(host);

  let mut int_bytes = [0; size_of::<i32>()];
  int_bytes.copy_from_slice(host.bytes(int));
  let mut double_bytes = [0; size_of::<f64>()];
  double_bytes.copy_from_slice(host.bytes(double));

  let int_value = i32::from_ne_bytes(int_bytes);
  let double_value = f64::from_ne_bytes(double_bytes);
  let probe_text = probe
    .map(|probe| String::from_utf8_lossy(&host.bytes(probe)[..shown]).into_owned())
    .unwrap_or_default();

  info!(int_value, double_value, probe_text = %probe_text, "demo: values read back");

  host.free(int)?;
  host.free(double)?;
  host.free(probe)?;
  host.free(tail[1])?;
  host.free(tail[2])?;
  host.free(tail[0])?;

  monitor.check(host);

  Ok(DemoReport {
    probe_allocated: probe.is_some(),
    probe_size,
    offsets,
  })
}

/// Bulk allocation of varying sizes with a pattern written into each block,
/// verified once every block is live, then freed. Both loops are timed.
fn stress(
  host: &mut Host,
  config: &WorkloadConfig,
  monitor: &mut UsageMonitor,
) -> Result<StressReport> {
  let max_size = config.stress_max_size.max(1);
  let sizes: Vec<usize> = (0..config.stress_blocks)
    .map(|i| 1 + (i * 7919 + 13) % max_size)
    .collect();

  let mut live: Vec<(usize, Allocation)> = Vec::with_capacity(sizes.len());
  let mut failed = 0;

  let started = Instant::now();
  for (index, &size) in sizes.iter().enumerate() {
    match host.alloc(size) {
      Some(allocation) => {
        host.bytes_mut(allocation).fill(pattern(index));
        live.push((index, allocation));
      }
      None => failed += 1,
    }
  }
  let alloc_time = started.elapsed();

  monitor.check(host);

  let payload_bytes: usize = live.iter().map(|(_, allocation)| allocation.size()).sum();
  let peak_usage = host.usage();
  let factor = peak_usage
    .filter(|&usage| usage > 0)
    .map(|usage| payload_bytes as f64 / usage as f64);

  let corrupted = live
    .iter()
    .filter(|(index, allocation)| {
      let expected = pattern(*index);
      !host.bytes(*allocation).iter().all(|&byte| byte == expected)
    })
    .count();

  if corrupted > 0 {
    error!(corrupted, "stress: allocations overlap");
  }

  let started = Instant::now();
  for (_, allocation) in &live {
    host.free(*allocation)?;
  }
  let free_time = started.elapsed();

  monitor.check(host);

  info!(
    succeeded = live.len(),
    failed,
    factor = ?factor,
    alloc_time = ?alloc_time,
    free_time = ?free_time,
    "stress: done"
  );

  Ok(StressReport {
    requested: sizes.len(),
    succeeded: live.len(),
    failed,
    payload_bytes,
    peak_usage,
    factor,
    corrupted,
    alloc_time,
    free_time,
  })
}

/// Allocates blocks of increasing size, frees the even indices then the odd
/// ones, and asks for half of the arena.
fn fragmentation(
  host: &mut Host,
  config: &WorkloadConfig,
  monitor: &mut UsageMonitor,
) -> Result<FragmentationReport> {
  let blocks = config.fragmentation_blocks;
  let arena = host.allocator().arena_len();

  // Keep the whole run within a quarter of the arena.
  let triangle = (blocks * (blocks + 1) / 2).max(1);
  let step = (arena / 4 / triangle).max(1);

  let allocations: Vec<Option<Allocation>> = (1..=blocks).map(|i| host.alloc(i * step)).collect();
  let succeeded = allocations.iter().flatten().count();

  monitor.check(host);

  for allocation in allocations.iter().step_by(2) {
    host.free(*allocation)?;
  }
  for allocation in allocations.iter().skip(1).step_by(2) {
    host.free(*allocation)?;
  }

  monitor.check(host);

  let free_blocks = host.allocator().free_blocks();
  let half_size = arena / 2;
  let half = host.alloc(half_size);

  if half.is_none() {
    warn!(half_size, free_blocks = ?free_blocks, "fragmentation: half of the arena did not fit");
  }

  monitor.check(host);
  host.free(half)?;

  Ok(FragmentationReport {
    requested: blocks,
    succeeded,
    free_blocks,
    half_size,
    half_allocated: half.is_some(),
  })
}

/// Allocates and frees one size over and over, counting how often the
/// first offset comes back.
fn reuse(
  host: &mut Host,
  config: &WorkloadConfig,
  monitor: &mut UsageMonitor,
) -> Result<ReuseReport> {
  let mut first: Option<usize> = None;
  let mut reused = 0;

  for _ in 0..config.reuse_rounds {
    let Some(allocation) = host.alloc(config.reuse_size) else {
      break;
    };

    match first {
      None => first = Some(allocation.offset()),
      Some(offset) if offset == allocation.offset() => reused += 1,
      Some(_) => {}
    }

    host.free(allocation)?;
  }

  monitor.check(host);

  Ok(ReuseReport {
    rounds: config.reuse_rounds,
    size: config.reuse_size,
    reused,
  })
}
