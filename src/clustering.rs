//! K-means clustering of users
//!
//! Partitions users into behavioral groups from their attendance features
//! using Lloyd's algorithm on raw (unnormalized) Euclidean distance.
//!
//! # Algorithm
//!
//! 1. Pick `k` input points at random, without replacement, as centroids
//! 2. Assign every point to its nearest centroid (ties go to the lowest index)
//! 3. Move each centroid to the mean of its points
//! 4. Stop when the centroids no longer change or the iteration cap is hit
//!
//! A centroid that ends an iteration with no points is retired for the rest
//! of the run, so the number of clusters reported can be lower than `k`.

use crate::error::AnalyticsError;
use crate::features::UserFeatures;
use crate::types::{ClusterAssignment, ClusterCentroid, FeatureVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Default number of clusters
pub const DEFAULT_CLUSTER_COUNT: usize = 3;

/// Default iteration cap
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// K-means configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
    seed: Option<u64>,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_COUNT)
    }
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Pin the random source used for centroid initialization
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Fit on `points`, seeding from the configured seed or from entropy
    pub fn fit(&self, points: &[FeatureVector]) -> Result<KMeansFit, AnalyticsError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.fit_with_rng(points, &mut rng)
    }

    /// Fit on `points` with a caller-provided random source
    pub fn fit_with_rng<R: Rng + ?Sized>(
        &self,
        points: &[FeatureVector],
        rng: &mut R,
    ) -> Result<KMeansFit, AnalyticsError> {
        if points.is_empty() {
            return Err(AnalyticsError::EmptyInput);
        }
        if self.k == 0 {
            return Err(AnalyticsError::InvalidClusterCount(self.k));
        }
        if self.k > points.len() {
            return Err(AnalyticsError::ClusterCountExceedsData {
                k: self.k,
                n: points.len(),
            });
        }

        let mut centroids: Vec<FeatureVector> =
            points.choose_multiple(rng, self.k).copied().collect();
        let mut labels = assign_clusters(points, &centroids);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations.max(1) {
            iterations += 1;
            labels = assign_clusters(points, &centroids);
            let (new_centroids, _) = compute_centroids(points, &labels, centroids.len());

            if new_centroids == centroids {
                converged = true;
                break;
            }

            if new_centroids.len() < centroids.len() {
                tracing::warn!(
                    iteration = iterations,
                    retired = centroids.len() - new_centroids.len(),
                    active = new_centroids.len(),
                    "Retiring empty clusters"
                );
            }

            tracing::debug!(
                iteration = iterations,
                active = new_centroids.len(),
                "k-means iteration"
            );
            centroids = new_centroids;
        }

        // Labels refer to the centroids of the last assignment step; drop the
        // empty ones and renumber so cluster ids stay contiguous.
        let (centroids, remap) = compute_centroids(points, &labels, centroids.len());
        let labels = labels
            .into_iter()
            .map(|label| remap[label].unwrap_or(label))
            .collect();

        Ok(KMeansFit {
            labels,
            centroids,
            iterations,
            converged,
        })
    }
}

/// Result of a k-means run
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// 0-based cluster of each input point, in input order
    pub labels: Vec<usize>,
    /// Centroid of each non-empty cluster, indexed by label
    pub centroids: Vec<FeatureVector>,
    pub iterations: usize,
    pub converged: bool,
}

impl KMeansFit {
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }
}

/// Index of the nearest centroid; the first minimum wins on ties
pub fn nearest_centroid(point: &FeatureVector, centroids: &[FeatureVector]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;

    for (idx, centroid) in centroids.iter().enumerate() {
        let distance = point.distance(centroid);
        if distance < best_distance {
            best = idx;
            best_distance = distance;
        }
    }

    best
}

fn assign_clusters(points: &[FeatureVector], centroids: &[FeatureVector]) -> Vec<usize> {
    points
        .iter()
        .map(|point| nearest_centroid(point, centroids))
        .collect()
}

/// Mean of each non-empty cluster, plus a map from old label to compacted label
fn compute_centroids(
    points: &[FeatureVector],
    labels: &[usize],
    cluster_count: usize,
) -> (Vec<FeatureVector>, Vec<Option<usize>>) {
    let mut sums = vec![[0.0_f64; 2]; cluster_count];
    let mut counts = vec![0_usize; cluster_count];

    for (point, &label) in points.iter().zip(labels) {
        let [a, d] = point.as_array();
        sums[label][0] += a;
        sums[label][1] += d;
        counts[label] += 1;
    }

    let mut centroids = Vec::with_capacity(cluster_count);
    let mut remap = vec![None; cluster_count];

    for (label, (sum, count)) in sums.iter().zip(&counts).enumerate() {
        if *count == 0 {
            continue;
        }
        remap[label] = Some(centroids.len());
        let n = *count as f64;
        centroids.push(FeatureVector::new(sum[0] / n, sum[1] / n));
    }

    (centroids, remap)
}

/// Users grouped into clusters
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOutcome {
    /// One entry per user, grouped by cluster; cluster ids start at 1
    pub assignments: Vec<ClusterAssignment>,
    pub centroids: Vec<ClusterCentroid>,
    pub iterations: usize,
    pub converged: bool,
}

/// Cluster users by their feature vectors
///
/// Users are mapped back through their position in `users`, so two users with
/// identical features are still reported individually.
pub fn cluster_users(
    users: &[UserFeatures],
    kmeans: &KMeans,
) -> Result<ClusterOutcome, AnalyticsError> {
    let points: Vec<FeatureVector> = users.iter().map(|u| u.features).collect();
    let fit = kmeans.fit(&points)?;

    let mut assignments = Vec::with_capacity(users.len());
    for cluster in 0..fit.cluster_count() {
        for (user, _) in users
            .iter()
            .zip(&fit.labels)
            .filter(|(_, &label)| label == cluster)
        {
            assignments.push(ClusterAssignment {
                user_id: user.user_id.clone(),
                cluster_id: cluster + 1,
            });
        }
    }

    let centroids = fit
        .centroids
        .iter()
        .enumerate()
        .map(|(idx, centroid)| ClusterCentroid {
            cluster: idx + 1,
            average_per_day: centroid.average_per_day,
            days_present: centroid.days_present,
        })
        .collect();

    Ok(ClusterOutcome {
        assignments,
        centroids,
        iterations: fit.iterations,
        converged: fit.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn user(id: &str, avg: f64, days: f64) -> UserFeatures {
        UserFeatures {
            user_id: id.to_string(),
            features: FeatureVector::new(avg, days),
        }
    }

    fn sample_users() -> Vec<UserFeatures> {
        vec![
            user("123", 6.5, 15.0),
            user("456", 5.8, 20.0),
            user("789", 7.2, 10.0),
            user("101", 6.0, 18.0),
        ]
    }

    fn two_groups() -> Vec<FeatureVector> {
        vec![
            FeatureVector::new(1.0, 1.0),
            FeatureVector::new(1.0, 2.0),
            FeatureVector::new(2.0, 1.0),
            FeatureVector::new(10.0, 10.0),
            FeatureVector::new(10.0, 11.0),
            FeatureVector::new(11.0, 10.0),
        ]
    }

    #[test]
    fn test_empty_input() {
        let err = KMeans::new(3).fit(&[]).unwrap_err();
        assert!(matches!(err, AnalyticsError::EmptyInput));
        assert_eq!(err.to_string(), "input data is empty");

        let err = cluster_users(&[], &KMeans::new(3)).unwrap_err();
        assert!(err.to_string().contains("input data is empty"));
    }

    #[test]
    fn test_k_exceeds_dataset() {
        let err = cluster_users(&sample_users(), &KMeans::new(5)).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::ClusterCountExceedsData { k: 5, n: 4 }
        ));
        assert!(err.to_string().contains("k exceeds dataset size"));
    }

    #[test]
    fn test_zero_k_rejected() {
        let err = KMeans::new(0).fit(&two_groups()).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidClusterCount(0)));
    }

    #[test]
    fn test_every_user_assigned_once() {
        let users = sample_users();
        let outcome = cluster_users(&users, &KMeans::new(2)).unwrap();

        assert_eq!(outcome.assignments.len(), users.len());
        let ids: HashSet<&str> = outcome
            .assignments
            .iter()
            .map(|a| a.user_id.as_str())
            .collect();
        assert_eq!(ids.len(), users.len());
        assert!(outcome
            .assignments
            .iter()
            .all(|a| (1..=2).contains(&a.cluster_id)));
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let users = sample_users();
        let kmeans = KMeans::new(2).with_seed(42);

        let first = cluster_users(&users, &kmeans).unwrap();
        let second = cluster_users(&users, &kmeans).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_separates_distant_groups() {
        let points = two_groups();

        for seed in 0..10 {
            let fit = KMeans::new(2).with_seed(seed).fit(&points).unwrap();

            assert!(fit.converged);
            assert_eq!(fit.cluster_count(), 2);
            assert!(fit.labels[..3].iter().all(|&l| l == fit.labels[0]));
            assert!(fit.labels[3..].iter().all(|&l| l == fit.labels[3]));
            assert_ne!(fit.labels[0], fit.labels[3]);
        }
    }

    #[test]
    fn test_centroids_are_cluster_means() {
        let fit = KMeans::new(2).with_seed(7).fit(&two_groups()).unwrap();
        let low = fit.centroids[fit.labels[0]];
        let high = fit.centroids[fit.labels[3]];

        assert!((low.average_per_day - 4.0 / 3.0).abs() < 1e-9);
        assert!((low.days_present - 4.0 / 3.0).abs() < 1e-9);
        assert!((high.average_per_day - 31.0 / 3.0).abs() < 1e-9);
        assert!((high.days_present - 31.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_k_equals_n_gives_singletons() {
        let points = two_groups();
        let fit = KMeans::new(points.len()).with_seed(3).fit(&points).unwrap();

        let distinct: HashSet<usize> = fit.labels.iter().copied().collect();
        assert_eq!(distinct.len(), points.len());
        assert!(fit.converged);
        assert_eq!(fit.iterations, 1);
    }

    #[test]
    fn test_identical_points_retire_duplicate_centroids() {
        let users = vec![
            user("a", 5.0, 5.0),
            user("b", 5.0, 5.0),
            user("c", 5.0, 5.0),
            user("d", 5.0, 5.0),
        ];

        let outcome = cluster_users(&users, &KMeans::new(2).with_seed(1)).unwrap();

        assert_eq!(outcome.centroids.len(), 1);
        let ids: Vec<&str> = outcome
            .assignments
            .iter()
            .map(|a| a.user_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(outcome.assignments.iter().all(|a| a.cluster_id == 1));
    }

    #[test]
    fn test_duplicate_features_keep_distinct_users() {
        let users = vec![
            user("a", 8.0, 20.0),
            user("b", 8.0, 20.0),
            user("c", 1.0, 2.0),
        ];

        let outcome = cluster_users(&users, &KMeans::new(2).with_seed(5)).unwrap();
        let ids: HashSet<&str> = outcome
            .assignments
            .iter()
            .map(|a| a.user_id.as_str())
            .collect();
        assert_eq!(ids, HashSet::from(["a", "b", "c"]));
    }

    #[test]
    fn test_nearest_centroid_tie_breaks_low() {
        let centroids = vec![FeatureVector::new(0.0, 0.0), FeatureVector::new(2.0, 0.0)];
        let midpoint = FeatureVector::new(1.0, 0.0);
        assert_eq!(nearest_centroid(&midpoint, &centroids), 0);

        let near_second = FeatureVector::new(1.5, 0.0);
        assert_eq!(nearest_centroid(&near_second, &centroids), 1);
    }

    #[test]
    fn test_iteration_cap() {
        let fit = KMeans::new(2)
            .with_seed(11)
            .with_max_iterations(1)
            .fit(&two_groups())
            .unwrap();

        assert_eq!(fit.iterations, 1);
        assert_eq!(fit.labels.len(), 6);
        assert!(fit.cluster_count() <= 2);
    }
}
