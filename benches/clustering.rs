use clutch::cluster::{Clustering, Dbscan, FuzzyCMeans, JarvisPatrick, KMeans};
use clutch::data::{ArrayTupleList, KMeansPlusPlus};
use clutch::index::KdTree;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;

fn synthetic(n: usize, d: usize) -> ArrayTupleList {
    let mut rng = StdRng::seed_from_u64(42);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..d).map(|_| rng.random::<f64>()).collect())
        .collect();
    ArrayTupleList::from_rows(&rows).unwrap()
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    let data = synthetic(1000, 16);

    for workers in [1, 4] {
        group.bench_function(format!("n1000_d16_k10_w{workers}"), |b| {
            b.iter(|| {
                let model = KMeans::new(10)
                    .unwrap()
                    .with_max_iterations(10)
                    .unwrap()
                    .with_seeder(KMeansPlusPlus::new().with_seed(42))
                    .with_workers(workers)
                    .unwrap();
                model.cluster(black_box(&data)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_fuzzy(c: &mut Criterion) {
    let data = synthetic(1000, 16);
    c.bench_function("fuzzy_n1000_d16_k10", |b| {
        b.iter(|| {
            let model = FuzzyCMeans::new(10)
                .unwrap()
                .with_max_iterations(10)
                .unwrap()
                .with_seeder(KMeansPlusPlus::new().with_seed(42));
            model.cluster(black_box(&data)).unwrap();
        })
    });
}

fn bench_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbors");
    let data = synthetic(2000, 3);

    group.bench_function("kdtree_build_n2000_d3", |b| {
        b.iter(|| KdTree::build(black_box(&data), Box::new(clutch::data::Euclidean)).unwrap())
    });
    group.bench_function("dbscan_n2000_d3", |b| {
        let model = Dbscan::new(0.08, 5).unwrap();
        b.iter(|| model.cluster(black_box(&data)).unwrap())
    });
    group.bench_function("jarvis_patrick_n2000_d3", |b| {
        let model = JarvisPatrick::new(8, 4).unwrap();
        b.iter(|| model.cluster(black_box(&data)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_kmeans, bench_fuzzy, bench_neighbors);
criterion_main!(benches);
