use super::ClusterFit;
use kmeans_colors::get_kmeans;
use palette::Lab;
use std::collections::HashSet;
use tracing::trace;

const CONVERGE: f32 = 1e-4;

fn distinct(samples: &[Lab]) -> usize {
    samples
        .iter()
        .map(|c| [c.l.to_bits(), c.a.to_bits(), c.b.to_bits()])
        .collect::<HashSet<_>>()
        .len()
}

/// Best of `n_init` seeded k-means runs.
///
/// `None` when there are fewer samples than clusters. Duplicate samples
/// reduce the effective cluster count instead of failing.
pub fn fit(
    samples: &[Lab],
    n_clusters: usize,
    max_iter: usize,
    n_init: usize,
    seed: u64,
) -> Option<ClusterFit> {
    if n_clusters == 0 || samples.len() < n_clusters {
        return None;
    }
    let k = n_clusters.min(distinct(samples)).min(u8::MAX as usize);

    let best = (0..n_init.max(1) as u64)
        .map(|run| get_kmeans(k, max_iter, CONVERGE, false, samples, seed + run))
        .min_by(|a, b| a.score.total_cmp(&b.score))?;
    trace!(k, score = best.score, "kmeans");

    let labels: Vec<usize> = best.indices.iter().map(|i| *i as usize).collect();
    Some(ClusterFit::from_labels(samples, &labels))
}
