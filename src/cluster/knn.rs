use palette::Lab;
use std::collections::BTreeMap;

/// Uniform-weight k-nearest-neighbour classifier over Lab samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knn {
    pub n_neighbors: usize,
}

impl Default for Knn {
    fn default() -> Self {
        Knn { n_neighbors: 3 }
    }
}

fn distance_sq(a: &Lab, b: &Lab) -> f32 {
    (a.l - b.l).powi(2) + (a.a - b.a).powi(2) + (a.b - b.b).powi(2)
}

impl Knn {
    pub fn new(n_neighbors: usize) -> Knn {
        Knn { n_neighbors }
    }

    /// Majority label among the nearest training samples, ties resolved to
    /// the smallest label. `None` without training data.
    pub fn predict_one(&self, samples: &[Lab], labels: &[usize], query: &Lab) -> Option<usize> {
        if samples.is_empty() || samples.len() != labels.len() {
            return None;
        }

        let mut by_distance: Vec<(f32, usize)> = samples
            .iter()
            .zip(labels)
            .map(|(s, l)| (distance_sq(s, query), *l))
            .collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
        for (_, label) in by_distance.iter().take(self.n_neighbors.max(1)) {
            *votes.entry(*label).or_default() += 1;
        }

        let top = votes.values().copied().max()?;
        votes.into_iter().find(|(_, v)| *v == top).map(|(label, _)| label)
    }

    pub fn predict(&self, samples: &[Lab], labels: &[usize], queries: &[Lab]) -> Option<Vec<usize>> {
        queries
            .iter()
            .map(|q| self.predict_one(samples, labels, q))
            .collect()
    }
}
