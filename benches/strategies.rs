use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use palloc::{
  BestFitAllocator, BestFitConfig, BumpAllocator, BumpConfig, Create, MergePolicy, Region,
  SegregatedAllocator, SegregatedConfig, Strategy,
};

const ARENA: usize = 16 * 1024 * 1024;
const BATCH: usize = 1000;

fn strategy(name: &str) -> Box<dyn Strategy> {
  let region = Region::reserve(ARENA).unwrap();

  match name {
    "best-fit" => Box::new(BestFitAllocator::create(region, BestFitConfig::default()).unwrap()),
    "segregated" => {
      Box::new(SegregatedAllocator::create(region, SegregatedConfig::default()).unwrap())
    }
    "buddy" => Box::new(
      SegregatedAllocator::create(
        region,
        SegregatedConfig {
          merge: MergePolicy::Buddy,
        },
      )
      .unwrap(),
    ),
    _ => Box::new(BumpAllocator::create(region, BumpConfig).unwrap()),
  }
}

fn bench_alloc_free(c: &mut Criterion) {
  let mut group = c.benchmark_group("Alloc/Free Batch");
  group.sample_size(20);

  for name in ["best-fit", "segregated", "buddy"] {
    group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, name| {
      let mut allocator = strategy(name);

      b.iter(|| {
        let mut live = Vec::with_capacity(BATCH);
        for i in 0..BATCH {
          live.push(allocator.alloc(1 + (i * 37) % 512).unwrap());
        }
        for allocation in live {
          allocator.free(black_box(allocation)).unwrap();
        }
      });
    });
  }

  group.finish();
}

fn bench_reuse(c: &mut Criterion) {
  let mut group = c.benchmark_group("Same Size Reuse");

  for name in ["best-fit", "segregated", "buddy"] {
    group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, name| {
      let mut allocator = strategy(name);

      b.iter(|| {
        let allocation = allocator.alloc(black_box(128)).unwrap();
        allocator.free(allocation).unwrap();
      });
    });
  }

  group.bench_function("bump", |b| {
    b.iter_batched(
      || strategy("bump"),
      |mut allocator| {
        for _ in 0..BATCH {
          black_box(allocator.alloc(128));
        }
      },
      criterion::BatchSize::SmallInput,
    );
  });

  group.finish();
}

criterion_group!(benches, bench_alloc_free, bench_reuse);
criterion_main!(benches);
