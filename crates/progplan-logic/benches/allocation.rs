//! Criterion benchmarks for the section-level allocation path.
//!
//! Benchmarks:
//!   - rasterising a 42×38 footprint at 1 m cells
//!   - filling that grid with 40-cell regions by BFS growth
//!   - one section engine run for a full floor quota
//!
//! Run with: cargo bench -p progplan-logic --bench allocation

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use progplan_logic::allocator::{AllocationRequest, RegionAllocator};
use progplan_logic::config::EngineConfig;
use progplan_logic::geometry::polygon_from_vertices;
use progplan_logic::grid::PolygonGrid;
use progplan_logic::layout::{targets_from_quota, LayoutEngine};
use progplan_logic::observer::NoopObserver;
use progplan_logic::quota::{CategoryQuota, QuotaTable};

fn footprint() -> geo::Polygon<f64> {
    polygon_from_vertices(&[[0.0, 0.0], [42.0, 0.0], [42.0, 38.0], [0.0, 38.0]])
        .expect("valid footprint")
}

// ---------------------------------------------------------------------------
// Benchmark: grid construction
// ---------------------------------------------------------------------------

fn bench_grid_build(c: &mut Criterion) {
    let polygon = footprint();
    c.bench_function("grid_build_42x38", |b| {
        b.iter(|| PolygonGrid::build(black_box(&polygon), black_box(1.0), None));
    });
}

// ---------------------------------------------------------------------------
// Benchmark: region growth until the grid is full
// ---------------------------------------------------------------------------

fn bench_fill(c: &mut Criterion) {
    let grid = PolygonGrid::build(&footprint(), 1.0, None).expect("grid");
    let config = EngineConfig::default();

    c.bench_function("allocate_fill_40_cells", |b| {
        b.iter(|| {
            let mut grid = grid.clone();
            let mut allocator = RegionAllocator::new(&config);
            let mut rng = StdRng::seed_from_u64(7);
            let mut placed = 0;
            while let Some(cells) =
                allocator.allocate(&mut grid, AllocationRequest::new(35, 40), &mut rng)
            {
                allocator.note_placed(&mut grid, &cells);
                placed += 1;
            }
            black_box(placed)
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: one section engine run
// ---------------------------------------------------------------------------

fn bench_section_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("section_engine");
    group.sample_size(10);

    let grid = PolygonGrid::build(&footprint(), 1.0, None).expect("grid");
    let mut quota = QuotaTable::new();
    quota.insert("studio", CategoryQuota::new(25.0, 35.0, 10.0, 3));
    quota.insert("1room", CategoryQuota::new(35.0, 45.0, 20.0, 5));
    quota.insert("2room", CategoryQuota::new(50.0, 65.0, 20.0, 3));
    quota.insert("3room", CategoryQuota::new(70.0, 85.0, 15.0, 2));
    quota.insert("4room", CategoryQuota::new(90.0, 110.0, 35.0, 3));
    let targets = targets_from_quota(&quota, grid.cell_area());
    let config = EngineConfig {
        max_iterations: 10,
        time_budget_ms: 60_000,
        ..EngineConfig::default()
    };

    group.bench_function("floor_16_apartments", |b| {
        b.iter(|| {
            let mut engine = LayoutEngine::new(
                "bench",
                grid.clone(),
                targets.clone(),
                config.clone(),
                &NoopObserver,
            );
            let mut rng = StdRng::seed_from_u64(11);
            black_box(engine.run(&mut rng).plan.len())
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Register groups
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_grid_build, bench_fill, bench_section_engine);
criterion_main!(benches);
