use rand::Rng;
use thiserror::Error;

use crate::ellipsoid::Ellipsoid;
use crate::likelihood::Likelihood;
use crate::prior::JointPrior;

#[derive(Error, Debug)]
pub enum DrawError {
    #[error("exhausted {attempts} draw attempts under the likelihood constraint")]
    AttemptsExhausted { attempts: usize },

    #[error("no usable ellipsoid in the set")]
    EmptySet,
}

/// Per-cluster axis enlargement.
///
/// `fraction = f0 * X_remaining^s * sqrt(n_live / cluster_size)`: undersampled
/// clusters get more slack, and everything tightens as the remaining prior
/// mass shrinks.
#[derive(Debug, Clone, Copy)]
pub struct EnlargementPolicy {
    pub initial_fraction: f64,
    pub shrinking_rate: f64,
}

impl EnlargementPolicy {
    pub fn fraction(&self, remaining_prior_mass: f64, n_live: usize, cluster_size: usize) -> f64 {
        assert!(cluster_size > 0);
        self.initial_fraction
            * remaining_prior_mass.powf(self.shrinking_rate)
            * (n_live as f64 / cluster_size as f64).sqrt()
    }
}

/// A set of overlapping enlarged ellipsoids covering the live points.
///
/// Rebuilt whenever the clustering is refreshed. Supports uniform draws from
/// the union with inclusion multiplicity compensated by rejection, and the
/// constrained draws that feed live-point replacement.
#[derive(Debug, Clone)]
pub struct EllipsoidSet {
    ellipsoids: Vec<Ellipsoid>,
    overlap_counts: Vec<f64>,
}

impl EllipsoidSet {
    /// Build enlarged ellipsoids from a clustered point cloud.
    ///
    /// Clusters with fewer than `dim + 1` members are folded into the nearest
    /// viable cluster first; degenerate decompositions are excluded. When no
    /// cluster is viable the whole cloud is wrapped in a single ellipsoid.
    pub fn build(
        points: &[&[f64]],
        assignments: &[usize],
        n_clusters: usize,
        policy: &EnlargementPolicy,
        remaining_prior_mass: f64,
    ) -> EllipsoidSet {
        assert!(assignments.len() == points.len());
        let n_live = points.len();
        let dim = points.first().map_or(0, |point| point.len());

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
        for (idx, &assignment) in assignments.iter().enumerate() {
            members[assignment].push(idx);
        }
        members.retain(|member| !member.is_empty());

        let viable: Vec<bool> = members.iter().map(|member| member.len() > dim).collect();
        if viable.iter().any(|&flag| flag) {
            let centroids: Vec<Vec<f64>> = members
                .iter()
                .map(|member| {
                    let mut centroid = vec![0f64; dim];
                    for &idx in member {
                        for (out, val) in centroid.iter_mut().zip(points[idx].iter()) {
                            *out += val;
                        }
                    }
                    centroid.iter_mut().for_each(|val| *val /= member.len() as f64);
                    centroid
                })
                .collect();

            let mut merged = members.clone();
            for (idx, member) in members.iter().enumerate() {
                if viable[idx] {
                    continue;
                }
                let mut target = None;
                let mut best_distance = f64::INFINITY;
                for (other, flag) in viable.iter().enumerate() {
                    if !flag {
                        continue;
                    }
                    let distance: f64 = centroids[idx]
                        .iter()
                        .zip(centroids[other].iter())
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum();
                    if distance < best_distance {
                        best_distance = distance;
                        target = Some(other);
                    }
                }
                let target = target.expect("at least one viable cluster");
                merged[target].extend_from_slice(member);
                merged[idx].clear();
            }
            merged.retain(|member| !member.is_empty());
            members = merged;
        } else {
            members = vec![(0..n_live).collect()];
        }

        let mut ellipsoids = Vec::with_capacity(members.len());
        let mut kept_members = Vec::with_capacity(members.len());
        for member in members {
            let cluster: Vec<&[f64]> = member.iter().map(|&idx| points[idx]).collect();
            let fraction = policy.fraction(remaining_prior_mass, n_live, member.len());
            if let Some(ellipsoid) = Ellipsoid::from_points(&cluster, fraction) {
                ellipsoids.push(ellipsoid);
                kept_members.push(member);
            }
        }
        if ellipsoids.is_empty() && n_live > dim {
            let cluster: Vec<&[f64]> = points.to_vec();
            let fraction = policy.fraction(remaining_prior_mass, n_live, n_live);
            if let Some(ellipsoid) = Ellipsoid::from_points(&cluster, fraction) {
                ellipsoids.push(ellipsoid);
                kept_members.push((0..n_live).collect());
            }
        }

        let overlap_counts = kept_members
            .iter()
            .enumerate()
            .map(|(k, member)| {
                let total: usize = member
                    .iter()
                    .map(|&idx| {
                        ellipsoids
                            .iter()
                            .enumerate()
                            .filter(|(j, ellipsoid)| *j != k && ellipsoid.contains(points[idx]))
                            .count()
                    })
                    .sum();
                total as f64 / member.len() as f64
            })
            .collect();

        EllipsoidSet {
            ellipsoids,
            overlap_counts,
        }
    }

    pub fn len(&self) -> usize {
        self.ellipsoids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ellipsoids.is_empty()
    }

    pub fn ellipsoids(&self) -> &[Ellipsoid] {
        &self.ellipsoids
    }

    /// Average number of other ellipsoids sharing the members of ellipsoid `k`.
    pub fn overlap_count(&self, k: usize) -> f64 {
        self.overlap_counts[k]
    }

    /// Volume of ellipsoid `k` discounted by its average overlap.
    pub fn effective_log_volume(&self, k: usize) -> f64 {
        self.ellipsoids[k].log_volume() - (1. + self.overlap_counts[k]).ln()
    }

    /// Number of ellipsoids containing `theta`.
    pub fn multiplicity(&self, theta: &[f64]) -> usize {
        self.ellipsoids
            .iter()
            .filter(|ellipsoid| ellipsoid.contains(theta))
            .count()
    }

    pub fn contains(&self, theta: &[f64]) -> bool {
        self.ellipsoids
            .iter()
            .any(|ellipsoid| ellipsoid.contains(theta))
    }

    /// Draw a point uniformly from the union of the ellipsoids.
    ///
    /// Picks an ellipsoid with probability proportional to its volume, draws
    /// uniformly inside it, and accepts with probability one over the
    /// inclusion multiplicity.
    pub fn draw_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Box<[f64]>, DrawError> {
        if self.ellipsoids.is_empty() {
            return Err(DrawError::EmptySet);
        }

        let max_log_volume = self
            .ellipsoids
            .iter()
            .map(|ellipsoid| ellipsoid.log_volume())
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = self
            .ellipsoids
            .iter()
            .map(|ellipsoid| (ellipsoid.log_volume() - max_log_volume).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        loop {
            let mut pick = rng.gen::<f64>() * total;
            let mut chosen = self.ellipsoids.len() - 1;
            for (idx, weight) in weights.iter().enumerate() {
                pick -= weight;
                if pick <= 0. {
                    chosen = idx;
                    break;
                }
            }

            let point = self.ellipsoids[chosen].draw_uniform(rng);
            let multiplicity = self.multiplicity(&point);
            debug_assert!(multiplicity >= 1);
            if multiplicity == 1 || rng.gen::<f64>() < (multiplicity as f64).recip() {
                return Ok(point);
            }
        }
    }

    /// Draw a prior-distributed point above the likelihood floor.
    ///
    /// Union draws are uniform, so candidates are thinned by the prior
    /// density relative to its supremum before the likelihood constraint is
    /// checked. Every candidate counts against `max_attempts`.
    pub fn draw_constrained<L: Likelihood, R: Rng + ?Sized>(
        &self,
        prior: &JointPrior,
        likelihood: &L,
        log_likelihood_floor: f64,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<(Box<[f64]>, f64), DrawError> {
        let log_max_pdf = prior.log_max_pdf();
        for _ in 0..max_attempts {
            let candidate = self.draw_uniform(rng)?;
            let log_pdf = prior.log_pdf(&candidate);
            if log_pdf == f64::NEG_INFINITY {
                continue;
            }
            if log_pdf < log_max_pdf && rng.gen::<f64>() >= (log_pdf - log_max_pdf).exp() {
                continue;
            }
            let log_likelihood = likelihood.log_likelihood(&candidate);
            if log_likelihood > log_likelihood_floor {
                return Ok((candidate, log_likelihood));
            }
        }
        Err(DrawError::AttemptsExhausted {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::GaussianLikelihood;
    use crate::prior::{JointPrior, UniformPrior};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const NO_ENLARGEMENT: EnlargementPolicy = EnlargementPolicy {
        initial_fraction: 0.,
        shrinking_rate: 0.,
    };

    fn square_cloud(rng: &mut SmallRng, offset: f64, count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|_| {
                vec![
                    offset + rng.gen::<f64>() * 2.,
                    offset + rng.gen::<f64>() * 2.,
                ]
            })
            .collect()
    }

    #[test]
    fn covers_all_points() {
        let mut rng = SmallRng::seed_from_u64(31);
        let mut points = square_cloud(&mut rng, 0., 50);
        points.extend(square_cloud(&mut rng, 20., 50));
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let assignments: Vec<usize> = (0..100).map(|idx| usize::from(idx >= 50)).collect();

        let set = EllipsoidSet::build(&refs, &assignments, 2, &NO_ENLARGEMENT, 1.);
        assert_eq!(set.len(), 2);
        for point in &points {
            assert!(set.contains(point));
        }
        // Disjoint clouds never overlap.
        assert_eq!(set.overlap_count(0), 0.);
        assert_eq!(set.overlap_count(1), 0.);
    }

    #[test]
    fn small_cluster_is_merged() {
        let mut rng = SmallRng::seed_from_u64(32);
        let mut points = square_cloud(&mut rng, 0., 40);
        points.push(vec![30., 30.]);
        points.push(vec![30.1, 30.1]);
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let mut assignments = vec![0usize; 40];
        assignments.extend([1, 1]);

        let set = EllipsoidSet::build(&refs, &assignments, 2, &NO_ENLARGEMENT, 1.);
        assert_eq!(set.len(), 1);
        for point in &points {
            assert!(set.contains(point));
        }
    }

    #[test]
    fn identical_clouds_overlap_fully() {
        let mut rng = SmallRng::seed_from_u64(33);
        let points = square_cloud(&mut rng, 0., 30);
        let mut doubled = points.clone();
        doubled.extend(points);
        let refs: Vec<&[f64]> = doubled.iter().map(|p| p.as_slice()).collect();
        let assignments: Vec<usize> = (0..60).map(|idx| usize::from(idx >= 30)).collect();

        let set = EllipsoidSet::build(&refs, &assignments, 2, &NO_ENLARGEMENT, 1.);
        assert_eq!(set.len(), 2);
        assert_eq!(set.overlap_count(0), 1.);
        assert!((set.effective_log_volume(0)
            - (set.ellipsoids()[0].log_volume() - 2f64.ln()))
        .abs()
            < 1e-12);
    }

    #[test]
    fn union_draws_are_uniform_across_overlap() {
        let mut rng = SmallRng::seed_from_u64(34);
        let mut points = square_cloud(&mut rng, 0., 400);
        points.extend(square_cloud(&mut rng, 1.5, 400));
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let assignments: Vec<usize> = (0..800).map(|idx| usize::from(idx >= 400)).collect();

        let set = EllipsoidSet::build(&refs, &assignments, 2, &NO_ENLARGEMENT, 1.);
        assert_eq!(set.len(), 2);

        // One probe box deep in the overlap region, one covered by a single
        // ellipsoid, both well inside the union.
        let in_overlap =
            |p: &[f64]| (p[0] - 1.75).abs() < 0.15 && (p[1] - 1.75).abs() < 0.15;
        let in_single = |p: &[f64]| (p[0] - 0.5).abs() < 0.15 && (p[1] - 0.5).abs() < 0.15;
        assert!(set.multiplicity(&[1.75, 1.75]) == 2);
        assert!(set.multiplicity(&[0.5, 0.5]) == 1);

        let ndraws = 200_000usize;
        let mut overlap_hits = 0usize;
        let mut single_hits = 0usize;
        for _ in 0..ndraws {
            let draw = set.draw_uniform(&mut rng).unwrap();
            if in_overlap(&draw) {
                overlap_hits += 1;
            }
            if in_single(&draw) {
                single_hits += 1;
            }
        }

        // Equal-size boxes in a uniform union collect equal counts.
        let ratio = overlap_hits as f64 / single_hits as f64;
        assert!(
            (ratio - 1.).abs() < 0.15,
            "overlap {overlap_hits} vs single {single_hits}"
        );
    }

    #[test]
    fn constrained_draw_respects_floor() {
        let mut rng = SmallRng::seed_from_u64(35);
        let points = square_cloud(&mut rng, -1., 100);
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let assignments = vec![0usize; 100];

        let set = EllipsoidSet::build(&refs, &assignments, 1, &NO_ENLARGEMENT, 1.);
        let prior = JointPrior::new(vec![UniformPrior::new(vec![-2., -2.], vec![2., 2.])
            .unwrap()
            .into()])
        .unwrap();
        let likelihood = GaussianLikelihood::new(vec![0., 0.], 1.);

        let floor = likelihood.log_likelihood(&[0.5, 0.5]);
        for _ in 0..50 {
            let (theta, log_likelihood) = set
                .draw_constrained(&prior, &likelihood, floor, 10_000, &mut rng)
                .unwrap();
            assert!(log_likelihood > floor);
            assert!(prior.in_support(&theta));
            assert!(set.contains(&theta));
        }
    }

    #[test]
    fn impossible_floor_exhausts_attempts() {
        let mut rng = SmallRng::seed_from_u64(36);
        let points = square_cloud(&mut rng, -1., 50);
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let assignments = vec![0usize; 50];

        let set = EllipsoidSet::build(&refs, &assignments, 1, &NO_ENLARGEMENT, 1.);
        let prior = JointPrior::new(vec![UniformPrior::new(vec![-2., -2.], vec![2., 2.])
            .unwrap()
            .into()])
        .unwrap();
        let likelihood = GaussianLikelihood::new(vec![0., 0.], 1.);

        let result = set.draw_constrained(&prior, &likelihood, 10., 100, &mut rng);
        assert!(matches!(
            result,
            Err(DrawError::AttemptsExhausted { attempts: 100 })
        ));
    }
}
