//! K-means, X-Means, DBSCAN and Jarvis-Patrick on a simple 2D dataset.
//!
//! Run with `RUST_LOG=debug` to see the engine's log lines.

use std::sync::Arc;

use clutch::cluster::{Clustering, Dbscan, JarvisPatrick, KMeans, PointKind, SplittingKMeans};
use clutch::data::{ArrayTupleList, KMeansPlusPlus, TupleList};
use clutch::task::LogListener;

fn main() -> clutch::Result<()> {
    env_logger::init();

    // Three well-separated clusters in 2D plus one outlier.
    let data = ArrayTupleList::from_rows(&[
        // Cluster A (near origin)
        [0.0, 0.0],
        [0.1, 0.2],
        [0.2, 0.1],
        [-0.1, 0.1],
        // Cluster B (near (5, 5))
        [5.0, 5.0],
        [5.1, 4.9],
        [4.9, 5.1],
        [5.2, 5.2],
        // Cluster C (near (10, 0))
        [10.0, 0.0],
        [10.1, 0.1],
        [9.9, -0.1],
        [10.2, 0.2],
        // Outlier
        [20.0, 20.0],
    ])?;
    let shared: Arc<dyn TupleList> = Arc::new(data.clone());

    // --- K-means (k=3), run as a task ---
    let task = KMeans::new(3)?
        .with_seeder(KMeansPlusPlus::new().with_seed(42))
        .into_task(Arc::clone(&shared));
    task.add_listener(Arc::new(LogListener::new("kmeans")));
    task.start()?;
    let fit = task.await_result()?;
    println!("=== K-means (k=3): {} iterations ===", fit.iterations);
    print_clusters(&data, &fit.clusters);

    // --- X-Means (2..=6) ---
    let clusters = SplittingKMeans::xmeans(2, 6)?
        .with_seeder(KMeansPlusPlus::new().with_seed(42))
        .cluster(&data)?;
    println!("\n=== X-Means (2..=6) ===");
    print_clusters(&data, &clusters);

    // --- DBSCAN (eps=1.0, min_pts=3) ---
    let fit = Dbscan::new(1.0, 3)?.fit(&data, &clutch::task::TaskContext::detached())?;
    println!("\n=== DBSCAN (eps=1.0, min_pts=3) ===");
    for i in 0..data.len() {
        let tag = match fit.classify(i) {
            PointKind::Core => "core",
            PointKind::Edge => "edge",
            PointKind::Noise => "NOISE",
        };
        let row = data.row(i);
        println!("  point {:2} ({:5.1}, {:5.1}) => {}", i, row[0], row[1], tag);
    }

    // --- Jarvis-Patrick (K=3, J=1) ---
    let clusters = JarvisPatrick::new(3, 1)?.cluster(&data)?;
    println!("\n=== Jarvis-Patrick (K=3, J=1) ===");
    print_clusters(&data, &clusters);

    Ok(())
}

fn print_clusters(data: &ArrayTupleList, clusters: &[clutch::Cluster]) {
    for (label, cluster) in clusters.iter().enumerate() {
        for &i in cluster.members() {
            let row = data.row(i);
            println!("  point {:2} ({:5.1}, {:5.1}) => cluster {}", i, row[0], row[1], label);
        }
    }
}
