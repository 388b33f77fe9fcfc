use super::ClusterFit;
use palette::Lab;
use std::collections::HashMap;
use tracing::trace;

// Index into the condensed upper-triangular distance matrix, `i < j`.
fn condensed(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    n * i - i * (i + 1) / 2 + j - i - 1
}

fn distance(a: &Lab, b: &Lab) -> f64 {
    let dl = (a.l - b.l) as f64;
    let da = (a.a - b.a) as f64;
    let db = (a.b - b.b) as f64;
    (dl * dl + da * da + db * db).sqrt()
}

struct UnionFind(Vec<usize>);

impl UnionFind {
    fn find(&mut self, mut i: usize) -> usize {
        while self.0[i] != i {
            self.0[i] = self.0[self.0[i]];
            i = self.0[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.0[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Average-linkage merges of weighted points via the nearest-neighbour chain.
///
/// Returns `(a, b, distance)` per merge, in the order they were found.
fn average_linkage(points: &[Lab], weights: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut dist = vec![0f64; n * n.saturating_sub(1) / 2];
    for i in 0..n {
        for j in i + 1..n {
            dist[condensed(n, i, j)] = distance(&points[i], &points[j]);
        }
    }

    let mut size = weights.to_vec();
    let mut active = vec![true; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    while merges.len() + 1 < n {
        if chain.is_empty() {
            match active.iter().position(|a| *a) {
                Some(first) => chain.push(first),
                None => break,
            }
        }

        let (a, b, d) = loop {
            let a = chain[chain.len() - 1];
            let prev = (chain.len() >= 2).then(|| chain[chain.len() - 2]);

            let (mut best, mut best_d) = match prev {
                Some(p) => (p, dist[condensed(n, a, p)]),
                None => (usize::MAX, f64::INFINITY),
            };
            for j in (0..n).filter(|j| active[*j] && *j != a) {
                let d = dist[condensed(n, a, j)];
                if d < best_d {
                    best = j;
                    best_d = d;
                }
            }

            if Some(best) == prev {
                chain.truncate(chain.len() - 2);
                break (a, best, best_d);
            }
            chain.push(best);
        };

        // Lance-Williams update for average linkage, `b` absorbs `a`
        for k in (0..n).filter(|k| active[*k] && *k != a && *k != b) {
            let merged = (size[a] * dist[condensed(n, a, k)] + size[b] * dist[condensed(n, b, k)])
                / (size[a] + size[b]);
            dist[condensed(n, b, k)] = merged;
        }
        active[a] = false;
        size[b] += size[a];
        merges.push((a.min(b), a.max(b), d));
    }

    merges
}

/// Average-linkage agglomerative clustering cut at `n_clusters`.
///
/// Identical samples are collapsed into weighted points first, so the work
/// grows with the number of distinct colors rather than pixels.
pub fn fit(samples: &[Lab], n_clusters: usize) -> Option<ClusterFit> {
    if n_clusters == 0 || samples.len() < n_clusters {
        return None;
    }

    let mut index: HashMap<[u32; 3], usize> = HashMap::new();
    let mut points = Vec::new();
    let mut weights = Vec::new();
    let owner: Vec<usize> = samples
        .iter()
        .map(|c| {
            let key = [c.l.to_bits(), c.a.to_bits(), c.b.to_bits()];
            *index.entry(key).or_insert_with(|| {
                points.push(*c);
                weights.push(0.);
                points.len() - 1
            })
        })
        .collect();
    for o in &owner {
        weights[*o] += 1.;
    }

    let n = points.len();
    let k = n_clusters.min(n);
    trace!(points = n, k, "agglomerative");

    let mut merges = average_linkage(&points, &weights);
    merges.sort_by(|x, y| x.2.total_cmp(&y.2));

    let mut groups = UnionFind((0..n).collect());
    for (a, b, _) in merges.iter().take(n - k) {
        groups.union(*a, *b);
    }

    let labels: Vec<usize> = owner.iter().map(|o| groups.find(*o)).collect();
    Some(ClusterFit::from_labels(samples, &labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_closest_first() {
        let points = [
            Lab::new(0., 0., 0.),
            Lab::new(1., 0., 0.),
            Lab::new(10., 0., 0.),
            Lab::new(30., 0., 0.),
        ];
        let mut merges = average_linkage(&points, &[1., 1., 1., 1.]);
        merges.sort_by(|x, y| x.2.total_cmp(&y.2));

        assert_eq!(merges.len(), 3);
        assert_eq!((merges[0].0, merges[0].1), (0, 1));
        assert!((merges[0].2 - 1.).abs() < 1e-9);
        // average of 10 and 9
        assert!((merges[1].2 - 9.5).abs() < 1e-9);
    }

    #[test]
    fn weights_pull_average_distance() {
        let points = [Lab::new(0., 0., 0.), Lab::new(2., 0., 0.), Lab::new(5., 0., 0.)];
        let mut merges = average_linkage(&points, &[3., 1., 1.]);
        merges.sort_by(|x, y| x.2.total_cmp(&y.2));
        // (3 * 5 + 1 * 3) / 4
        assert!((merges[1].2 - 4.5).abs() < 1e-9);
    }
}
