use itertools::Itertools;
use rand::Rng;
use thiserror::Error;

use crate::metrics::Metric;
use crate::projection::PrincipalComponentProjector;

#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("not enough points to cluster: {npoints} points, {min_nclusters} clusters requested")]
    NotEnoughPoints {
        npoints: usize,
        min_nclusters: usize,
    },

    #[error("invalid cluster count range [{min}, {max}]")]
    InvalidRange { min: usize, max: usize },
}

/// Result of a clustering pass over the live points.
///
/// `centers` live in the space the partition was computed in, which is the
/// projected space when feature projection is active. `assignments` always
/// index the original points.
#[derive(Debug, Clone)]
pub struct Clustering {
    pub n_clusters: usize,
    pub assignments: Vec<usize>,
    pub centers: Vec<Box<[f64]>>,
    pub sizes: Vec<usize>,
}

/// Partition points into clusters with a chosen cluster count.
pub trait Clusterer {
    fn cluster<R: Rng + ?Sized>(
        &self,
        points: &[&[f64]],
        min_nclusters: usize,
        max_nclusters: usize,
        rng: &mut R,
    ) -> Result<Clustering, ClusteringError>;
}

/// K-means with BIC-selected cluster count.
///
/// For every candidate count in `[min_nclusters, max_nclusters]` the best of
/// `ntrials` Lloyd runs is scored with the spherical-Gaussian BIC; the
/// candidate with the highest score wins. The scan proceeds upward with a
/// strictly-better comparison, so ties resolve toward fewer clusters.
#[derive(Debug, Clone)]
pub struct KmeansClusterer<M: Metric> {
    metric: M,
    projector: PrincipalComponentProjector,
    feature_projection: bool,
    ntrials: usize,
    relative_tolerance: f64,
}

impl<M: Metric> KmeansClusterer<M> {
    pub fn new(
        metric: M,
        projector: PrincipalComponentProjector,
        feature_projection: bool,
        ntrials: usize,
        relative_tolerance: f64,
    ) -> Self {
        assert!(ntrials > 0);
        assert!(relative_tolerance > 0.);
        Self {
            metric,
            projector,
            feature_projection,
            ntrials,
            relative_tolerance,
        }
    }

    fn lloyd<R: Rng + ?Sized>(
        &self,
        points: &[&[f64]],
        nclusters: usize,
        rng: &mut R,
    ) -> (Vec<usize>, Vec<Box<[f64]>>, f64) {
        let npoints = points.len();
        let dim = points[0].len();

        let mut centers: Vec<Box<[f64]>> = rand::seq::index::sample(rng, npoints, nclusters)
            .into_iter()
            .map(|idx| points[idx].to_vec().into())
            .collect();
        let mut assignments = vec![0usize; npoints];
        let mut total_distance = f64::INFINITY;

        for _ in 0..100 {
            for (assignment, point) in assignments.iter_mut().zip(points.iter()) {
                let mut best = 0usize;
                let mut best_distance = f64::INFINITY;
                for (idx, center) in centers.iter().enumerate() {
                    let distance = self.metric.distance(point, center);
                    if distance < best_distance {
                        best = idx;
                        best_distance = distance;
                    }
                }
                *assignment = best;
            }

            let mut sums = vec![vec![0f64; dim]; nclusters];
            let mut counts = vec![0usize; nclusters];
            for (&assignment, point) in assignments.iter().zip(points.iter()) {
                counts[assignment] += 1;
                for (sum, val) in sums[assignment].iter_mut().zip(point.iter()) {
                    *sum += val;
                }
            }
            for ((center, sum), &count) in centers.iter_mut().zip(sums).zip(counts.iter()) {
                if count == 0 {
                    // Reseed an empty cluster on a random point.
                    let idx = rng.gen_range(0..npoints);
                    center.copy_from_slice(points[idx]);
                } else {
                    for (out, val) in center.iter_mut().zip(sum) {
                        *out = val / count as f64;
                    }
                }
            }

            let new_total: f64 = assignments
                .iter()
                .zip(points.iter())
                .map(|(&assignment, point)| self.metric.distance(point, &centers[assignment]))
                .sum();
            if total_distance - new_total <= self.relative_tolerance * new_total {
                total_distance = new_total;
                break;
            }
            total_distance = new_total;
        }

        (assignments, centers, total_distance)
    }

    /// Spherical-Gaussian BIC of a partition, larger is better.
    fn bic(points: &[&[f64]], assignments: &[usize], centers: &[Box<[f64]>]) -> f64 {
        let npoints = points.len() as f64;
        let dim = points[0].len() as f64;
        let nclusters = centers.len();

        let mut sizes = vec![0f64; nclusters];
        let mut sum_sq = 0f64;
        for (&assignment, point) in assignments.iter().zip(points.iter()) {
            sizes[assignment] += 1.;
            sum_sq += point
                .iter()
                .zip(centers[assignment].iter())
                .map(|(p, c)| (p - c) * (p - c))
                .sum::<f64>();
        }

        let denom = dim * (npoints - nclusters as f64);
        let variance = if denom > 0. {
            (sum_sq / denom).max(1e-300)
        } else {
            1e-300
        };

        let mut log_likelihood = -0.5 * npoints * dim * (2. * std::f64::consts::PI * variance).ln()
            - 0.5 * dim * (npoints - nclusters as f64);
        for &size in sizes.iter().filter(|&&size| size > 0.) {
            log_likelihood += size * (size / npoints).ln();
        }

        let nparameters = nclusters as f64 * (dim + 1.);
        log_likelihood - 0.5 * nparameters * npoints.ln()
    }
}

impl<M: Metric> Clusterer for KmeansClusterer<M> {
    fn cluster<R: Rng + ?Sized>(
        &self,
        points: &[&[f64]],
        min_nclusters: usize,
        max_nclusters: usize,
        rng: &mut R,
    ) -> Result<Clustering, ClusteringError> {
        if min_nclusters == 0 || max_nclusters < min_nclusters {
            return Err(ClusteringError::InvalidRange {
                min: min_nclusters,
                max: max_nclusters,
            });
        }
        let npoints = points.len();
        if npoints < min_nclusters {
            return Err(ClusteringError::NotEnoughPoints {
                npoints,
                min_nclusters,
            });
        }

        let projected: Option<Vec<Box<[f64]>>> = if self.feature_projection {
            self.projector.project(points)
        } else {
            None
        };
        let cloud: Vec<&[f64]> = match projected.as_ref() {
            Some(projected) => projected.iter().map(|p| p.as_ref()).collect_vec(),
            None => points.to_vec(),
        };

        let mut best: Option<(f64, Vec<usize>, Vec<Box<[f64]>>)> = None;
        for nclusters in min_nclusters..=max_nclusters.min(npoints) {
            let mut trial_best: Option<(f64, Vec<usize>, Vec<Box<[f64]>>)> = None;
            for _ in 0..self.ntrials {
                let (assignments, centers, total) = self.lloyd(&cloud, nclusters, rng);
                if trial_best.as_ref().map_or(true, |(t, _, _)| total < *t) {
                    trial_best = Some((total, assignments, centers));
                }
            }
            let (_, assignments, centers) = trial_best.expect("ntrials is positive");
            let score = Self::bic(&cloud, &assignments, &centers);
            if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
                best = Some((score, assignments, centers));
            }
        }

        let (_, assignments, centers) = best.expect("cluster range is non-empty");
        let mut sizes = vec![0usize; centers.len()];
        for &assignment in &assignments {
            sizes[assignment] += 1;
        }

        Ok(Clustering {
            n_clusters: centers.len(),
            assignments,
            centers,
            sizes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::EuclideanMetric;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn clusterer() -> KmeansClusterer<EuclideanMetric> {
        KmeansClusterer::new(
            EuclideanMetric,
            PrincipalComponentProjector::default(),
            false,
            10,
            0.01,
        )
    }

    fn two_blobs(rng: &mut SmallRng) -> Vec<Vec<f64>> {
        let mut points = Vec::new();
        for _ in 0..40 {
            points.push(vec![rng.gen::<f64>(), rng.gen::<f64>()]);
        }
        for _ in 0..40 {
            points.push(vec![20. + rng.gen::<f64>(), 20. + rng.gen::<f64>()]);
        }
        points
    }

    #[test]
    fn separated_blobs_give_two_clusters() {
        let mut rng = SmallRng::seed_from_u64(11);
        let points = two_blobs(&mut rng);
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();

        let clustering = clusterer().cluster(&refs, 1, 5, &mut rng).unwrap();
        assert_eq!(clustering.n_clusters, 2);
        assert_eq!(clustering.sizes.iter().sum::<usize>(), 80);

        // All points of one blob share an assignment.
        let first = clustering.assignments[0];
        assert!(clustering.assignments[..40].iter().all(|&a| a == first));
        assert!(clustering.assignments[40..].iter().all(|&a| a != first));
    }

    #[test]
    fn forced_single_cluster() {
        let mut rng = SmallRng::seed_from_u64(12);
        let points = two_blobs(&mut rng);
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();

        let clustering = clusterer().cluster(&refs, 1, 1, &mut rng).unwrap();
        assert_eq!(clustering.n_clusters, 1);
        assert!(clustering.assignments.iter().all(|&a| a == 0));
    }

    #[test]
    fn duplicates_are_tolerated() {
        let mut rng = SmallRng::seed_from_u64(13);
        let mut points: Vec<Vec<f64>> = (0..20).map(|_| vec![1., 2.]).collect();
        points.extend((0..20).map(|_| vec![5., 6.]));
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();

        let clustering = clusterer().cluster(&refs, 1, 4, &mut rng).unwrap();
        assert!(clustering.n_clusters >= 1);
        assert_eq!(clustering.assignments.len(), 40);
    }

    #[test]
    fn rejects_bad_range() {
        let mut rng = SmallRng::seed_from_u64(14);
        let points = [vec![0., 0.], vec![1., 1.]];
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        assert!(matches!(
            clusterer().cluster(&refs, 3, 2, &mut rng),
            Err(ClusteringError::InvalidRange { .. })
        ));
        assert!(matches!(
            clusterer().cluster(&refs, 4, 6, &mut rng),
            Err(ClusteringError::NotEnoughPoints { .. })
        ));
    }
}
