use anyhow::{Context, Result};
use clap::Parser;
use palloc::{
  DEFAULT_REGION_SIZE, Host, HostConfig, MergePolicy,
  harness::{self, Report, WorkloadConfig},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "palloc")]
#[command(
  about = "Runs allocation workloads against a pluggable fixed-region allocator",
  long_about = None
)]
struct Cli {
  /// Strategy name or module path (best-fit, segregated, buddy, bump, ...).
  /// Without it the bump fallback is used.
  strategy: Option<String>,

  /// Size of the backing region in bytes
  #[arg(long, default_value_t = DEFAULT_REGION_SIZE)]
  region_size: usize,

  /// Disable usage accounting in the best-fit strategy
  #[arg(long, default_value_t = false)]
  no_accounting: bool,

  /// Merge freed buddies in the segregated strategy
  #[arg(long, default_value_t = false)]
  buddy: bool,

  /// Allocations in the stress run
  #[arg(long, default_value_t = 10_000)]
  stress_blocks: usize,

  /// Alloc/free pairs in the reuse run
  #[arg(long, default_value_t = 1_000)]
  reuse_rounds: usize,

  /// Print the report as JSON
  #[arg(long, default_value_t = false)]
  json: bool,

  /// Log every allocation and free
  #[arg(short, long, default_value_t = false)]
  verbose: bool,
}

impl Cli {
  fn host_config(&self) -> HostConfig {
    HostConfig {
      region_size: self.region_size,
      strategy: self.strategy.clone(),
      accounting: !self.no_accounting,
      merge: if self.buddy {
        MergePolicy::Buddy
      } else {
        MergePolicy::Never
      },
    }
  }

  fn workload_config(&self) -> WorkloadConfig {
    WorkloadConfig {
      stress_blocks: self.stress_blocks,
      reuse_rounds: self.reuse_rounds,
      ..WorkloadConfig::default()
    }
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn print_report(report: &Report) {
  let percent = |value: Option<f64>| match value {
    Some(value) => format!("{:.2}%", value * 100.0),
    None => "n/a".to_owned(),
  };
  let bytes = |value: Option<usize>| match value {
    Some(value) => value.to_string(),
    None => "n/a".to_owned(),
  };

  println!("strategy          {}", report.strategy);
  if report.selection.fell_back {
    println!(
      "                  (fallback, requested {})",
      report.selection.requested.as_deref().unwrap_or("-")
    );
  }
  println!("arena             {} bytes", report.arena_len);
  println!();
  println!("[demo]");
  println!(
    "  probe           {} bytes, allocated: {}",
    report.demo.probe_size, report.demo.probe_allocated
  );
  println!("  offsets         {:?}", report.demo.offsets);
  println!();
  println!("[stress]");
  println!(
    "  allocations     {}/{} ({} failed)",
    report.stress.succeeded, report.stress.requested, report.stress.failed
  );
  println!("  payload         {} bytes", report.stress.payload_bytes);
  println!("  peak usage      {}", bytes(report.stress.peak_usage));
  println!("  factor          {}", percent(report.stress.factor));
  println!("  alloc time      {:?}", report.stress.alloc_time);
  println!("  free time       {:?}", report.stress.free_time);
  println!("  corrupted       {}", report.stress.corrupted);
  println!();
  println!("[fragmentation]");
  println!(
    "  allocations     {}/{}",
    report.fragmentation.succeeded, report.fragmentation.requested
  );
  println!("  free blocks     {}", bytes(report.fragmentation.free_blocks));
  println!(
    "  half of arena   {} bytes, allocated: {}",
    report.fragmentation.half_size, report.fragmentation.half_allocated
  );
  println!();
  println!("[reuse]");
  println!(
    "  reused          {}/{} of {} bytes",
    report.reuse.reused, report.reuse.rounds, report.reuse.size
  );
  println!();
  println!("final usage       {}", bytes(report.final_usage));
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let mut host = Host::start(&cli.host_config()).context("Failed to set up the allocator")?;

  let report =
    harness::run(&mut host, &cli.workload_config()).context("Demonstration workload failed")?;

  if cli.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    print_report(&report);
  }

  let region = host.destroy();
  info!(len = region.len(), "releasing region");
  drop(region);

  if !report.is_sound() {
    anyhow::bail!(
      "Allocator broke its contract: {} corrupted allocations, {} usage violations, {}/{} reuses",
      report.stress.corrupted,
      report.usage_violations,
      report.reuse.reused,
      report.reuse.rounds
    );
  }

  Ok(())
}
