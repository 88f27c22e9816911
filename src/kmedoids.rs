//! K-medoids clustering of orphan tasks by locality fingerprint, using
//! dynamic-time-warping distance. Cluster labels map straight onto per-core
//! buckets.

use rand::rngs::StdRng;
use rand::Rng;

use crate::params::KMEDOIDS_MAX_ITER;
use crate::workload::Workload;

/// Dynamic-time-warping distance with absolute-difference cost over the full
/// `(n+1) × (m+1)` tableau. Borders are unreachable except the origin.
pub fn dtw(a: &[f64], b: &[f64]) -> f64 {
    let (n, m) = (a.len(), b.len());
    let mut d = vec![vec![f64::INFINITY; m + 1]; n + 1];
    d[0][0] = 0.0;
    for i in 1..=n {
        for j in 1..=m {
            let cost = (a[i - 1] - b[j - 1]).abs();
            d[i][j] = cost + d[i - 1][j].min(d[i][j - 1]).min(d[i - 1][j - 1]);
        }
    }
    d[n][m]
}

/// Min-max normalises every vector against the global value range of the
/// group. A flat range maps everything to zero.
fn normalize(group: &[&Vec<f64>]) -> Vec<Vec<f64>> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in group {
        for &x in v.iter() {
            lo = lo.min(x);
            hi = hi.max(x);
        }
    }
    let span = hi - lo;
    group
        .iter()
        .map(|v| {
            v.iter()
                .map(|&x| if span > 0.0 { (x - lo) / span } else { 0.0 })
                .collect()
        })
        .collect()
}

/// K-medoids over task fingerprints. The number of clusters equals the
/// number of cores; each cluster feeds one per-core bucket.
pub struct KMedoids {
    clusters: usize,
    max_iter: usize,
}

impl KMedoids {
    pub fn new(clusters: usize) -> Self {
        assert!(clusters > 0);
        Self {
            clusters,
            max_iter: KMEDOIDS_MAX_ITER,
        }
    }

    /// Drains the orphan bucket and redistributes its tasks over the
    /// per-core buckets according to their cluster label.
    pub fn group(&self, workload: &mut Workload, winsize: usize, rng: &mut StdRng) {
        let mut tids = Vec::new();
        while let Some(tid) = workload.pop_bucket(workload.orphan()) {
            tids.push(tid);
        }
        if tids.is_empty() {
            return;
        }

        let vectors: Vec<Vec<f64>> = tids
            .iter()
            .map(|&tid| {
                workload
                    .task(tid)
                    .fingerprint(winsize)
                    .into_iter()
                    .map(f64::from)
                    .collect()
            })
            .collect();

        let labels = self.cluster(&vectors, rng);
        for (tid, label) in tids.into_iter().zip(labels) {
            workload.push_bucket(label, tid);
        }
    }

    /// Clusters the vectors, returning one label (0..k) per vector.
    pub fn cluster(&self, vectors: &[Vec<f64>], rng: &mut StdRng) -> Vec<usize> {
        let n = vectors.len();
        let k = self.clusters.min(n);
        let mut medoids = self.initial_medoids(vectors, k, rng);
        let mut labels = vec![0usize; n];

        for _ in 0..self.max_iter {
            for (i, v) in vectors.iter().enumerate() {
                labels[i] = Self::nearest_medoid(v, &medoids);
            }

            let mut changed = false;
            for cluster in 0..k {
                let members: Vec<usize> =
                    (0..n).filter(|&i| labels[i] == cluster).collect();
                if members.is_empty() {
                    continue;
                }
                let new_medoid = Self::find_medoid(vectors, &members);
                if medoids[cluster] != vectors[new_medoid] {
                    medoids[cluster] = vectors[new_medoid].clone();
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        labels
    }

    /// First medoid uniform-random; each next one is the vector farthest
    /// (by min DTW distance) from those already chosen.
    fn initial_medoids(&self, vectors: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
        let mut medoids = Vec::with_capacity(k);
        medoids.push(vectors[rng.gen_range(0..vectors.len())].clone());
        while medoids.len() < k {
            let mut best = 0;
            let mut best_dist = f64::NEG_INFINITY;
            for (i, v) in vectors.iter().enumerate() {
                let closest = medoids
                    .iter()
                    .map(|m| dtw(v, m))
                    .fold(f64::INFINITY, f64::min);
                if closest > best_dist {
                    best_dist = closest;
                    best = i;
                }
            }
            medoids.push(vectors[best].clone());
        }
        medoids
    }

    fn nearest_medoid(v: &[f64], medoids: &[Vec<f64>]) -> usize {
        let mut nearest = 0;
        let mut best = f64::INFINITY;
        for (c, m) in medoids.iter().enumerate() {
            let d = dtw(v, m);
            if d < best {
                best = d;
                nearest = c;
            }
        }
        nearest
    }

    /// The member minimising total DTW distance to the rest of the cluster,
    /// computed over the cluster's min-max-normalised points. Ties pick the
    /// lowest index.
    fn find_medoid(vectors: &[Vec<f64>], members: &[usize]) -> usize {
        let group: Vec<&Vec<f64>> = members.iter().map(|&i| &vectors[i]).collect();
        let normalized = normalize(&group);
        let mut best = members[0];
        let mut best_total = f64::INFINITY;
        for (a, &idx) in normalized.iter().zip(members) {
            let total: f64 = normalized.iter().map(|b| dtw(a, b)).sum();
            if total < best_total {
                best_total = total;
                best = idx;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn dtw_identical_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(dtw(&v, &v), 0.0);
    }

    #[test]
    fn dtw_absolute_difference() {
        assert_eq!(dtw(&[0.0], &[5.0]), 5.0);
        // Shifted ramp: warping re-aligns the overlap, only the ends pay.
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 3.0, 4.0];
        assert_eq!(dtw(&a, &b), 2.0);
    }

    #[test]
    fn dtw_warps_unequal_lengths() {
        let a = vec![0.0, 0.0, 0.0, 0.0];
        let b = vec![0.0];
        assert_eq!(dtw(&a, &b), 0.0);
        assert!(dtw(&[], &b).is_infinite());
    }

    #[test]
    fn identical_fingerprints_share_a_cluster() {
        let km = KMedoids::new(2);
        let mut rng = StdRng::seed_from_u64(1);
        let vectors = vec![vec![3.0, 3.0, 3.0], vec![3.0, 3.0, 3.0]];
        let labels = km.cluster(&vectors, &mut rng);
        assert_eq!(labels[0], labels[1]);
    }

    #[test]
    fn distinct_groups_separate() {
        let km = KMedoids::new(2);
        let mut rng = StdRng::seed_from_u64(7);
        let vectors = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![50.0, 50.0, 50.0],
            vec![50.0, 49.0, 50.0],
        ];
        let labels = km.cluster(&vectors, &mut rng);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn grouping_moves_orphans_into_core_buckets() {
        let mut w = Workload::new(2);
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..2 {
            let tid = w.push_task(i, 4, 0, &[0, 0, 0, 0]);
            for _ in 0..4 {
                w.task_mut(tid).record_access(1, 0);
            }
            let orphan = w.orphan();
            w.push_bucket(orphan, tid);
        }

        KMedoids::new(2).group(&mut w, 4, &mut rng);
        assert_eq!(w.bucket_len(w.orphan()), 0);
        // Identical fingerprints land together; the other bucket is empty.
        let (a, b) = (w.bucket_len(0), w.bucket_len(1));
        assert_eq!(a + b, 2);
        assert!(a == 0 || b == 0);
    }

    #[test]
    fn more_clusters_than_vectors_is_fine() {
        let km = KMedoids::new(4);
        let mut rng = StdRng::seed_from_u64(0);
        let labels = km.cluster(&[vec![1.0], vec![9.0]], &mut rng);
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|&l| l < 2));
    }
}
