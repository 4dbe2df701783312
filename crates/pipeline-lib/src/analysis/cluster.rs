//! Neighbourhood clustering on the value dimension
//!
//! Every point with at least one neighbour closer than `max_distance` seeds a
//! cluster made of itself plus those neighbours. Clusters overlap; this is a
//! density-reachability view of the window, not a partition.

use crate::models::Severity;
use serde::Serialize;

const DEFAULT_MAX_DISTANCE: f64 = 2.0;

/// Density reported for a cluster whose points all coincide
pub const MAX_CLUSTER_DENSITY: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Index of the seeding point
    pub center: usize,
    /// Seed followed by its neighbours, by index
    pub members: Vec<usize>,
    /// Mean distance from the seed to its neighbours
    pub average_distance: f64,
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    pub clusters: Vec<Cluster>,
    pub cluster_count: usize,
    pub cluster_sizes: Vec<usize>,
    pub cluster_densities: Vec<f64>,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct ClusterAnalyzer {
    pub max_distance: f64,
}

impl ClusterAnalyzer {
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }

    pub fn analyze(&self, values: &[f64]) -> ClusterResult {
        let mut clusters = Vec::new();

        for (i, seed) in values.iter().enumerate() {
            let mut members = vec![i];
            let mut total_distance = 0.0;

            for (j, other) in values.iter().enumerate() {
                if i == j {
                    continue;
                }
                let distance = (seed - other).abs();
                if distance < self.max_distance {
                    members.push(j);
                    total_distance += distance;
                }
            }

            let neighbours = members.len() - 1;
            if neighbours == 0 {
                continue;
            }

            let average_distance = total_distance / neighbours as f64;
            clusters.push(Cluster {
                center: i,
                members,
                average_distance,
                density: density(average_distance),
            });
        }

        let cluster_count = clusters.len();
        let score = if values.is_empty() {
            0.0
        } else {
            cluster_count as f64 / values.len() as f64
        };

        ClusterResult {
            cluster_sizes: clusters.iter().map(|c| c.members.len()).collect(),
            cluster_densities: clusters.iter().map(|c| c.density).collect(),
            cluster_count,
            clusters,
            severity: Severity::from_score(score),
        }
    }
}

impl Default for ClusterAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTANCE)
    }
}

/// 1 / average distance, capped for coincident points
fn density(average_distance: f64) -> f64 {
    if average_distance <= 1.0 / MAX_CLUSTER_DENSITY {
        MAX_CLUSTER_DENSITY
    } else {
        1.0 / average_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_groups() {
        let result = ClusterAnalyzer::default().analyze(&[1.0, 1.5, 10.0, 11.0, 50.0]);

        // Points 0,1 seed each other; 2,3 seed each other; 4 is isolated
        assert_eq!(result.cluster_count, 4);
        assert_eq!(result.cluster_sizes, vec![2, 2, 2, 2]);
        assert_eq!(result.clusters[0].members, vec![0, 1]);
        assert!((result.cluster_densities[0] - 2.0).abs() < 1e-12);
        assert!((result.cluster_densities[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_threshold_is_strict() {
        let result = ClusterAnalyzer::default().analyze(&[0.0, 2.0]);
        assert_eq!(result.cluster_count, 0);
        assert_eq!(result.severity, Severity::None);
    }

    #[test]
    fn test_coincident_points_use_capped_density() {
        let result = ClusterAnalyzer::default().analyze(&[3.0, 3.0, 3.0]);
        assert_eq!(result.cluster_count, 3);
        assert!(result
            .cluster_densities
            .iter()
            .all(|d| *d == MAX_CLUSTER_DENSITY));
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_empty_window() {
        let result = ClusterAnalyzer::default().analyze(&[]);
        assert_eq!(result.cluster_count, 0);
        assert!(result.cluster_densities.is_empty());
    }
}
