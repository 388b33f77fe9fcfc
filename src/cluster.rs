mod agglomerative;
mod kmeans;
mod knn;
mod ordering;

pub use knn::Knn;
pub use ordering::ClusterOrder;

use palette::Lab;
use std::collections::BTreeMap;

/// Clustering configuration. Plain values: every [`Clustering::fit`] starts
/// from scratch and returns its own [`ClusterFit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clustering {
    KMeans {
        n_clusters: usize,
        max_iter: usize,
        n_init: usize,
        seed: u64,
    },
    /// Average linkage.
    Agglomerative { n_clusters: usize },
}

/// Result of one fit: a compact label per sample and the mean of each cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    pub labels: Vec<usize>,
    pub centers: Vec<Lab>,
}

impl ClusterFit {
    /// Relabels to `0..n` keeping the relative order of the raw labels.
    pub(crate) fn from_labels(samples: &[Lab], raw: &[usize]) -> ClusterFit {
        let remap: BTreeMap<usize, usize> = raw
            .iter()
            .copied()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(new, old)| (old, new))
            .collect();
        let labels: Vec<usize> = raw.iter().map(|l| remap[l]).collect();

        let mut sums = vec![(0f64, 0f64, 0f64, 0usize); remap.len()];
        for (s, l) in samples.iter().zip(&labels) {
            let acc = &mut sums[*l];
            acc.0 += s.l as f64;
            acc.1 += s.a as f64;
            acc.2 += s.b as f64;
            acc.3 += 1;
        }
        let centers = sums
            .into_iter()
            .map(|(l, a, b, n)| {
                let n = n as f64;
                Lab::new((l / n) as f32, (a / n) as f32, (b / n) as f32)
            })
            .collect();

        ClusterFit { labels, centers }
    }

    pub fn n_clusters(&self) -> usize {
        self.centers.len()
    }

    /// Sample indices of each cluster, indexed by label.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.n_clusters()];
        for (i, l) in self.labels.iter().enumerate() {
            members[*l].push(i);
        }
        members
    }
}

impl Clustering {
    pub fn kmeans(n_clusters: usize) -> Clustering {
        Clustering::KMeans {
            n_clusters,
            max_iter: 300,
            n_init: 4,
            seed: 0,
        }
    }

    pub fn agglomerative(n_clusters: usize) -> Clustering {
        Clustering::Agglomerative { n_clusters }
    }

    pub fn n_clusters(&self) -> usize {
        match self {
            Clustering::KMeans { n_clusters, .. } | Clustering::Agglomerative { n_clusters } => {
                *n_clusters
            }
        }
    }

    /// `None` when the samples can't be split into the requested clusters.
    pub fn fit(&self, samples: &[Lab]) -> Option<ClusterFit> {
        match *self {
            Clustering::KMeans {
                n_clusters,
                max_iter,
                n_init,
                seed,
            } => kmeans::fit(samples, n_clusters, max_iter, n_init, seed),
            Clustering::Agglomerative { n_clusters } => agglomerative::fit(samples, n_clusters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Lab> {
        let mut samples = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.1;
            samples.push(Lab::new(80. + jitter, 5., 5.));
            samples.push(Lab::new(20. + jitter, -5., 10.));
            samples.push(Lab::new(50. + jitter, 30., -20.));
        }
        samples
    }

    fn check_blobs(fit: &ClusterFit) {
        assert_eq!(fit.n_clusters(), 3);
        for chunk in fit.labels.chunks(3) {
            assert_eq!(chunk[0], fit.labels[0]);
            assert_eq!(chunk[1], fit.labels[1]);
            assert_eq!(chunk[2], fit.labels[2]);
        }

        let order = ClusterOrder::FirstChannel.order(fit);
        assert_eq!(order, vec![fit.labels[1], fit.labels[2], fit.labels[0]]);
        let ranks = ClusterOrder::FirstChannel.ranks(fit);
        assert_eq!(ranks[fit.labels[1]], 0);
        assert_eq!(ranks[fit.labels[0]], 2);
    }

    #[test]
    fn kmeans_separates_blobs() {
        let fit = Clustering::kmeans(3).fit(&blobs());
        check_blobs(&fit.expect("fit"));
    }

    #[test]
    fn agglomerative_separates_blobs() {
        let fit = Clustering::agglomerative(3).fit(&blobs());
        check_blobs(&fit.expect("fit"));
    }

    #[test]
    fn too_few_samples() {
        let samples = [Lab::new(1., 0., 0.), Lab::new(2., 0., 0.)];
        assert_eq!(Clustering::kmeans(3).fit(&samples), None);
        assert_eq!(Clustering::agglomerative(3).fit(&samples), None);
    }

    #[test]
    fn identical_samples_collapse() {
        let samples = vec![Lab::new(40., 10., 10.); 30];
        for clustering in [Clustering::kmeans(11), Clustering::agglomerative(6)] {
            let fit = clustering.fit(&samples).expect("fit");
            assert_eq!(fit.n_clusters(), 1);
            assert!(fit.labels.iter().all(|l| *l == 0));
        }
    }

    #[test]
    fn fit_is_deterministic() {
        let samples = blobs();
        let clustering = Clustering::kmeans(4);
        assert_eq!(clustering.fit(&samples), clustering.fit(&samples));
    }

    #[test]
    fn members_follow_labels() {
        let fit = ClusterFit::from_labels(
            &[Lab::new(1., 0., 0.), Lab::new(2., 0., 0.), Lab::new(3., 0., 0.)],
            &[7, 2, 7],
        );
        assert_eq!(fit.labels, vec![1, 0, 1]);
        assert_eq!(fit.members(), vec![vec![1], vec![0, 2]]);
        assert!((fit.centers[1].l - 2.).abs() < 1e-6);
    }
}
