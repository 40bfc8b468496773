use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use fastreg::KdTree;

fn kdtree_benchmark(c: &mut Criterion) {
    const N: usize = 100_000;

    let mut rng = SmallRng::from_seed([5; 32]);
    let points = Array2::from_shape_fn((N, 3), |_| rng.gen_range(-100.0..100.0));
    let queries = Array2::from_shape_fn((5000, 3), |_| rng.gen_range(-100.0..100.0));

    c.bench_function("kdtree creation", |b| {
        b.iter(|| KdTree::new(&points.view()));
    });

    let tree = KdTree::new(&points.view());
    c.bench_function("kdtree nearest", |b| {
        b.iter(|| {
            for query in queries.rows() {
                tree.nearest(query.as_slice().unwrap());
            }
        });
    });

    c.bench_function("kdtree radius search", |b| {
        b.iter(|| {
            for query in queries.rows() {
                tree.radius_search(query.as_slice().unwrap(), 5.0);
            }
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = kdtree_benchmark
}

criterion_main!(benches);
