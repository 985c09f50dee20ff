use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::{DMat4, DQuat, DVec3, EulerRot};
use rand::{rngs::StdRng, Rng, SeedableRng};

use kornia_registration::{
    correspondence::find_correspondences, icp_point_plane, point_plane::minimize_point_plane,
    DegeneracyPolicy, IcpConfig, KdTreeIndex, PointCloudNormal, PointNormal, SpatialIndex,
};

// random samples of a smooth height field in front of the camera
fn generate_patch_with_seed(num_points: usize, seed: u64) -> PointCloudNormal {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_points)
        .map(|_| {
            let x: f64 = rng.random_range(-1.0..1.0);
            let y: f64 = rng.random_range(-1.0..1.0);
            let z = 3.0 + 0.3 * x * x - 0.2 * y * y + 0.1 * x * y;
            PointNormal {
                point: DVec3::new(x, y, z),
                normal: DVec3::new(0.6 * x + 0.1 * y, -0.4 * y + 0.1 * x, -1.0).normalize(),
            }
        })
        .collect()
}

fn ground_truth() -> DMat4 {
    DMat4::from_rotation_translation(
        DQuat::from_euler(EulerRot::ZYX, 0.003, -0.003, 0.004),
        DVec3::new(0.008, -0.006, 0.01),
    )
}

fn bench_icp_point_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("icp_point_plane");
    // relaxed bounds, random sampling does not reach an exact fit
    let config = IcpConfig::default()
        .with_max_fitness(1e-2)
        .with_min_overlap(0.0);

    for num_points in [1_000, 10_000, 50_000] {
        let model = generate_patch_with_seed(num_points, 42);
        let data = generate_patch_with_seed(num_points, 7).transformed(&ground_truth().inverse());

        group.throughput(Throughput::Elements(num_points as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_points),
            &(model, data),
            |b, (model, data)| {
                b.iter(|| {
                    std::hint::black_box(icp_point_plane(
                        model,
                        data,
                        &DMat4::IDENTITY,
                        &config,
                    ))
                })
            },
        );
    }
    group.finish();
}

fn bench_correspondences(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_correspondences");

    for num_points in [1_000, 10_000, 50_000] {
        let model = generate_patch_with_seed(num_points, 42);
        let data = generate_patch_with_seed(num_points, 7);
        let index = KdTreeIndex::build(model.points());

        group.throughput(Throughput::Elements(num_points as u64));
        group.bench_function(BenchmarkId::from_parameter(num_points), |b| {
            b.iter(|| {
                std::hint::black_box(find_correspondences(
                    &data,
                    &model,
                    &index,
                    &ground_truth(),
                    f64::INFINITY,
                    0.7,
                ))
            })
        });
    }
    group.finish();
}

fn bench_minimize_point_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("minimize_point_plane");

    for num_points in [1_000, 10_000, 50_000] {
        let target = generate_patch_with_seed(num_points, 42);
        let source = target.transformed(&ground_truth().inverse());

        group.throughput(Throughput::Elements(num_points as u64));
        group.bench_function(BenchmarkId::from_parameter(num_points), |b| {
            b.iter(|| {
                std::hint::black_box(minimize_point_plane(
                    source.points(),
                    target.points(),
                    DegeneracyPolicy::Propagate,
                ))
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_icp_point_plane,
    bench_correspondences,
    bench_minimize_point_plane
);
criterion_main!(benches);
