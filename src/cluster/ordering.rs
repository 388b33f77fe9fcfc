use super::ClusterFit;

/// How clusters are ranked before they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterOrder {
    /// Label order as produced by the fit.
    Numerical,
    /// Ascending mean of the first channel; darkest first for Lab.
    #[default]
    FirstChannel,
}

impl ClusterOrder {
    /// Cluster labels, first-ranked first.
    pub fn order(&self, fit: &ClusterFit) -> Vec<usize> {
        let mut labels: Vec<usize> = (0..fit.n_clusters()).collect();
        if let ClusterOrder::FirstChannel = self {
            labels.sort_by(|a, b| fit.centers[*a].l.total_cmp(&fit.centers[*b].l));
        }
        labels
    }

    /// Rank of every cluster label, indexed by label.
    pub fn ranks(&self, fit: &ClusterFit) -> Vec<usize> {
        let mut ranks = vec![0; fit.n_clusters()];
        for (rank, label) in self.order(fit).into_iter().enumerate() {
            ranks[label] = rank;
        }
        ranks
    }
}
