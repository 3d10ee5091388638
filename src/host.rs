use std::{fmt, path::Path, str::FromStr};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
  best_fit::{BestFitAllocator, BestFitConfig},
  block::Allocation,
  bump::{BumpAllocator, BumpConfig},
  error::{Error, Result},
  region::Region,
  segregated::{MergePolicy, SegregatedAllocator, SegregatedConfig},
  strategy::{Create, Strategy},
};

/// Default backing region: 64 MiB.
pub const DEFAULT_REGION_SIZE: usize = 64 * 1024 * 1024;

/// Strategies the host knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
  BestFit,
  Segregated,
  /// Segregated lists with buddy merging forced on.
  Buddy,
  Bump,
}

impl StrategyKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      StrategyKind::BestFit => "best-fit",
      StrategyKind::Segregated => "segregated",
      StrategyKind::Buddy => "buddy",
      StrategyKind::Bump => "bump",
    }
  }
}

impl fmt::Display for StrategyKind {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StrategyKind {
  type Err = Error;

  /// Accepts a strategy name or something that looks like a path to a
  /// strategy module, e.g. `./build/liballocator_2n.so`. Directories,
  /// extensions and a `lib` prefix are ignored.
  fn from_str(name: &str) -> Result<Self> {
    let stem = Path::new(name)
      .file_stem()
      .and_then(|stem| stem.to_str())
      .unwrap_or(name);
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    let normalized = stem.to_ascii_lowercase().replace('_', "-");

    match normalized.as_str() {
      "best-fit" | "bestfit" | "list" | "allocator" | "allocator-list" => Ok(StrategyKind::BestFit),
      "segregated" | "pow2" | "2n" | "allocator-2n" => Ok(StrategyKind::Segregated),
      "buddy" => Ok(StrategyKind::Buddy),
      "bump" | "fallback" | "linear" => Ok(StrategyKind::Bump),
      _ => Err(Error::UnknownStrategy(name.to_owned())),
    }
  }
}

/// Everything the host needs to set up an allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
  /// Length of the backing region in bytes.
  pub region_size: usize,
  /// Strategy name or module path. `None` selects the bump fallback.
  pub strategy: Option<String>,
  /// Usage accounting for the best-fit strategy.
  pub accounting: bool,
  /// Merge policy for the segregated strategy.
  pub merge: MergePolicy,
}

impl Default for HostConfig {
  fn default() -> Self {
    Self {
      region_size: DEFAULT_REGION_SIZE,
      strategy: None,
      accounting: true,
      merge: MergePolicy::Never,
    }
  }
}

/// How the running strategy was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
  pub requested: Option<String>,
  pub kind: StrategyKind,
  /// `true` when the requested strategy could not be used and the bump
  /// allocator took its place.
  pub fell_back: bool,
}

fn build<S: Create + 'static>(
  region: Region,
  config: S::Config,
) -> Result<Box<dyn Strategy>> {
  Ok(Box::new(S::create(region, config)?))
}

fn construct(
  kind: StrategyKind,
  region: Region,
  config: &HostConfig,
) -> Result<Box<dyn Strategy>> {
  match kind {
    StrategyKind::BestFit => build::<BestFitAllocator>(
      region,
      BestFitConfig {
        accounting: config.accounting,
      },
    ),
    StrategyKind::Segregated => {
      build::<SegregatedAllocator>(region, SegregatedConfig { merge: config.merge })
    }
    StrategyKind::Buddy => build::<SegregatedAllocator>(
      region,
      SegregatedConfig {
        merge: MergePolicy::Buddy,
      },
    ),
    StrategyKind::Bump => build::<BumpAllocator>(region, BumpConfig),
  }
}

/// Owns the running strategy and the region behind it.
pub struct Host {
  allocator: Box<dyn Strategy>,
  selection: Selection,
}

impl Host {
  /// Reserves the region and builds the configured strategy.
  ///
  /// An unknown strategy name, or a strategy that rejects the region, falls
  /// back to the bump allocator over a fresh region. Failing to reserve a
  /// region, or failing to build the fallback itself, is an error.
  pub fn start(config: &HostConfig) -> Result<Self> {
    let (kind, mut fell_back) = match config.strategy.as_deref() {
      None => (StrategyKind::Bump, false),
      Some(name) => match name.parse::<StrategyKind>() {
        Ok(kind) => (kind, false),
        Err(err) => {
          warn!(%err, "falling back to the bump allocator");
          (StrategyKind::Bump, true)
        }
      },
    };

    let region = Region::reserve(config.region_size)?;

    let (kind, allocator) = match construct(kind, region, config) {
      Ok(allocator) => (kind, allocator),
      Err(err) if kind != StrategyKind::Bump => {
        warn!(%err, strategy = %kind, "falling back to the bump allocator");
        fell_back = true;
        let region = Region::reserve(config.region_size)?;
        (StrategyKind::Bump, construct(StrategyKind::Bump, region, config)?)
      }
      Err(err) => return Err(err),
    };

    info!(
      strategy = allocator.name(),
      region = config.region_size,
      fell_back,
      "allocator ready"
    );

    Ok(Self {
      allocator,
      selection: Selection {
        requested: config.strategy.clone(),
        kind,
        fell_back,
      },
    })
  }

  pub fn selection(&self) -> &Selection {
    &self.selection
  }

  pub fn allocator(&self) -> &dyn Strategy {
    self.allocator.as_ref()
  }

  pub fn allocator_mut(&mut self) -> &mut dyn Strategy {
    self.allocator.as_mut()
  }

  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Option<Allocation> {
    self.allocator.alloc(size)
  }

  /// Frees `allocation`. `None` stands for a null address and is ignored.
  pub fn free(
    &mut self,
    allocation: impl Into<Option<Allocation>>,
  ) -> Result<()> {
    match allocation.into() {
      Some(allocation) => self.allocator.free(allocation),
      None => Ok(()),
    }
  }

  pub fn usage(&self) -> Option<usize> {
    self.allocator.usage()
  }

  pub fn bytes(
    &self,
    allocation: Allocation,
  ) -> &[u8] {
    self.allocator.bytes(allocation)
  }

  pub fn bytes_mut(
    &mut self,
    allocation: Allocation,
  ) -> &mut [u8] {
    self.allocator.bytes_mut(allocation)
  }

  /// Tears the strategy down and returns the region. Dropping it unmaps the
  /// memory.
  pub fn destroy(self) -> Region {
    self.allocator.destroy()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(strategy: Option<&str>) -> HostConfig {
    HostConfig {
      region_size: 1 << 20,
      strategy: strategy.map(str::to_owned),
      ..HostConfig::default()
    }
  }

  #[test]
  fn test_strategy_names_and_paths() {
    let cases = [
      ("best-fit", StrategyKind::BestFit),
      ("List", StrategyKind::BestFit),
      ("./build/liballocator_list.so", StrategyKind::BestFit),
      ("allocator.dll", StrategyKind::BestFit),
      ("allocator_2n", StrategyKind::Segregated),
      ("/tmp/libpow2.dylib", StrategyKind::Segregated),
      ("buddy", StrategyKind::Buddy),
      ("fallback", StrategyKind::Bump),
    ];

    for (name, expected) in cases {
      assert_eq!(name.parse::<StrategyKind>().unwrap(), expected, "{name}");
    }

    assert!(matches!(
      "tlsf".parse::<StrategyKind>(),
      Err(Error::UnknownStrategy(name)) if name == "tlsf"
    ));
  }

  #[test]
  fn test_no_strategy_selects_bump() {
    let host = Host::start(&config(None)).unwrap();

    assert_eq!(host.selection().kind, StrategyKind::Bump);
    assert!(!host.selection().fell_back);
    assert_eq!(host.allocator().name(), "bump");
  }

  #[test]
  fn test_unknown_strategy_falls_back() {
    let host = Host::start(&config(Some("libmissing.so"))).unwrap();

    assert_eq!(host.selection().kind, StrategyKind::Bump);
    assert!(host.selection().fell_back);
    assert_eq!(host.selection().requested.as_deref(), Some("libmissing.so"));
  }

  #[test]
  fn test_rejected_region_falls_back() {
    let config = HostConfig {
      region_size: 256,
      strategy: Some("segregated".into()),
      ..HostConfig::default()
    };
    let host = Host::start(&config).unwrap();

    assert_eq!(host.selection().kind, StrategyKind::Bump);
    assert!(host.selection().fell_back);
  }

  #[test]
  fn test_empty_region_is_fatal() {
    let config = HostConfig {
      region_size: 0,
      ..config(Some("best-fit"))
    };

    assert!(matches!(Host::start(&config), Err(Error::EmptyRegion)));
  }

  #[test]
  fn test_unmappable_region_is_fatal() {
    let config = HostConfig {
      region_size: usize::MAX - 10,
      ..config(Some("best-fit"))
    };

    assert!(matches!(Host::start(&config), Err(Error::ReserveFailed { .. })));
  }

  #[test]
  fn test_buddy_kind_forces_merging() {
    let host = Host::start(&config(Some("buddy"))).unwrap();

    assert_eq!(host.allocator().name(), "buddy");
  }

  #[test]
  fn test_free_null_is_noop() {
    let mut host = Host::start(&config(Some("best-fit"))).unwrap();
    let usage = host.usage();

    host.free(None::<Allocation>).unwrap();
    assert_eq!(host.usage(), usage);

    let allocation = host.alloc(64).unwrap();
    host.bytes_mut(allocation).fill(7);
    assert_eq!(host.bytes(allocation), &[7; 64]);
    host.free(allocation).unwrap();
    assert_eq!(host.usage(), usage);

    let region = host.destroy();
    assert_eq!(region.len(), 1 << 20);
  }
}
