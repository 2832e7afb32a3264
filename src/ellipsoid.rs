use faer::{Mat, Scale};
use itertools::izip;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::math::{log_unit_ball_volume, vector_dot};

/// Covariance ellipsoid of a point cloud.
///
/// The ellipsoid is centered on the cloud mean and aligned with the
/// eigenvectors of the sample covariance. The eigenvalues are scaled so that
/// every input point lies inside, then enlarged by the requested fraction on
/// each axis. Eigenvalues that come out non-positive are clamped to keep the
/// quadratic form positive definite.
#[derive(Debug, Clone)]
pub struct Ellipsoid {
    center: Box<[f64]>,
    eigenvalues: Box<[f64]>,
    eigenvectors: Vec<Box<[f64]>>,
    log_volume: f64,
    npoints: usize,
}

impl Ellipsoid {
    /// Fit an ellipsoid to `points`, enlarging each axis by
    /// `1 + enlargement_fraction`.
    ///
    /// Requires at least `dim + 1` points. Returns `None` if the cloud is too
    /// small or the eigendecomposition produced non-finite output.
    pub fn from_points(points: &[&[f64]], enlargement_fraction: f64) -> Option<Ellipsoid> {
        let npoints = points.len();
        let dim = points.first()?.len();
        if npoints < dim + 1 {
            return None;
        }

        let mut center = vec![0f64; dim];
        for point in points {
            assert!(point.len() == dim);
            for (mean, val) in center.iter_mut().zip(point.iter()) {
                *mean += val;
            }
        }
        center.iter_mut().for_each(|val| *val /= npoints as f64);

        let mut centered: Mat<f64> = Mat::zeros(dim, npoints);
        for (i, point) in points.iter().enumerate() {
            let col = centered.col_as_slice_mut(i);
            for ((out, val), mean) in col.iter_mut().zip(point.iter()).zip(center.iter()) {
                *out = val - mean;
            }
        }

        let mut cov = (&centered) * centered.transpose();
        cov *= Scale((npoints as f64).recip());

        let eig = cov.selfadjoint_eigendecomposition(faer::Side::Lower);
        let vals = eig.s().column_vector().to_owned();
        let vecs = eig.u().to_owned();
        if !(vals.is_all_finite() & vecs.is_all_finite()) {
            return None;
        }

        let max_val = vals.as_slice().iter().fold(0f64, |acc, &v| acc.max(v));
        let floor = if max_val > 0. { max_val * 1e-12 } else { 1e-12 };
        let mut eigenvalues: Vec<f64> = vals.as_slice().iter().map(|&v| v.max(floor)).collect();

        let eigenvectors: Vec<Box<[f64]>> = vecs
            .col_iter()
            .map(|col| {
                col.try_as_slice()
                    .expect("Eigenvector array not contiguous")
                    .to_vec()
                    .into()
            })
            .collect();

        // Scale the axes so the furthest member sits on the boundary, then
        // apply the enlargement on top of that.
        let mut max_dist_sq = 0f64;
        for point in points {
            let mut dist_sq = 0f64;
            for (vec, val) in eigenvectors.iter().zip(eigenvalues.iter()) {
                let proj: f64 = izip!(point.iter(), center.iter(), vec.iter())
                    .map(|(p, c, axis)| (p - c) * axis)
                    .sum();
                dist_sq += proj * proj / val;
            }
            max_dist_sq = max_dist_sq.max(dist_sq);
        }
        if max_dist_sq == 0. {
            max_dist_sq = 1.;
        }
        let scale = max_dist_sq * (1. + enlargement_fraction).powi(2);
        eigenvalues.iter_mut().for_each(|val| *val *= scale);

        let log_volume = log_unit_ball_volume(dim)
            + 0.5 * eigenvalues.iter().map(|val| val.ln()).sum::<f64>();
        if !log_volume.is_finite() {
            return None;
        }

        Some(Ellipsoid {
            center: center.into(),
            eigenvalues: eigenvalues.into(),
            eigenvectors,
            log_volume,
            npoints,
        })
    }

    pub fn ndim(&self) -> usize {
        self.center.len()
    }

    pub fn npoints(&self) -> usize {
        self.npoints
    }

    pub fn center(&self) -> &[f64] {
        &self.center
    }

    pub fn log_volume(&self) -> f64 {
        self.log_volume
    }

    /// Mahalanobis containment test in the eigenbasis.
    pub fn contains(&self, theta: &[f64]) -> bool {
        assert!(theta.len() == self.center.len());
        let mut dist_sq = 0f64;
        for (vec, val) in self.eigenvectors.iter().zip(self.eigenvalues.iter()) {
            let proj: f64 = izip!(theta.iter(), self.center.iter(), vec.iter())
                .map(|(p, c, axis)| (p - c) * axis)
                .sum();
            dist_sq += proj * proj / val;
        }
        dist_sq <= 1.
    }

    /// Draw a point uniformly from the interior.
    ///
    /// Uniform direction on the sphere times a radius `U^(1/D)`, mapped
    /// through the scaled eigenbasis.
    pub fn draw_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Box<[f64]> {
        let dim = self.center.len();

        let mut direction = vec![0f64; dim];
        loop {
            direction
                .iter_mut()
                .for_each(|val| *val = StandardNormal.sample(rng));
            let norm = vector_dot(&direction, &direction).sqrt();
            if norm > 0. {
                direction.iter_mut().for_each(|val| *val /= norm);
                break;
            }
        }

        let radius: f64 = rng.gen::<f64>().powf((dim as f64).recip());

        let mut out: Vec<f64> = self.center.to_vec();
        for (vec, val, dir) in izip!(
            self.eigenvectors.iter(),
            self.eigenvalues.iter(),
            direction.iter()
        ) {
            let stretch = val.sqrt() * radius * dir;
            for (out, axis) in out.iter_mut().zip(vec.iter()) {
                *out += stretch * axis;
            }
        }
        out.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn cross_points() -> Vec<Vec<f64>> {
        vec![
            vec![1., 0.],
            vec![-1., 0.],
            vec![0., 1.],
            vec![0., -1.],
        ]
    }

    #[test]
    fn unit_circle_from_cross() {
        let points = cross_points();
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let ell = Ellipsoid::from_points(&refs, 0.).unwrap();

        // Covariance diag(1/2) scaled so the members sit on the boundary
        // gives the unit circle.
        assert!((ell.log_volume() - std::f64::consts::PI.ln()).abs() < 1e-9);
        assert!(ell.contains(&[0.99, 0.]));
        assert!(ell.contains(&[0., -0.99]));
        assert!(!ell.contains(&[1.02, 0.]));
        assert!(!ell.contains(&[0.75, 0.75]));
    }

    #[test]
    fn members_always_inside() {
        let mut rng = SmallRng::seed_from_u64(3);
        let points: Vec<Vec<f64>> = (0..40)
            .map(|_| vec![rng.gen::<f64>() * 3., rng.gen::<f64>(), rng.gen::<f64>() * 0.1])
            .collect();
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let ell = Ellipsoid::from_points(&refs, 0.1).unwrap();
        for point in &points {
            assert!(ell.contains(point));
        }
    }

    #[test]
    fn degenerate_cloud_still_contains_members() {
        let points: Vec<Vec<f64>> =
            (0..6).map(|i| vec![i as f64, 0.]).collect();
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let ell = Ellipsoid::from_points(&refs, 0.).unwrap();
        for point in &points {
            assert!(ell.contains(point));
        }
    }

    #[test]
    fn too_few_points() {
        let points = [vec![0., 0.], vec![1., 1.]];
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        assert!(Ellipsoid::from_points(&refs, 0.).is_none());
    }

    #[test]
    fn draws_stay_inside() {
        let points = cross_points();
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let ell = Ellipsoid::from_points(&refs, 0.5).unwrap();
        let mut rng = SmallRng::seed_from_u64(17);
        for _ in 0..1000 {
            let draw = ell.draw_uniform(&mut rng);
            assert!(ell.contains(&draw));
        }
    }

    #[test]
    fn enlargement_grows_volume() {
        let points = cross_points();
        let refs: Vec<&[f64]> = points.iter().map(|p| p.as_slice()).collect();
        let small = Ellipsoid::from_points(&refs, 0.).unwrap();
        let large = Ellipsoid::from_points(&refs, 0.5).unwrap();
        assert!(large.log_volume() > small.log_volume());
        // Axes scale by 1.5, area by 1.5^2.
        let expected = small.log_volume() + 2. * 1.5f64.ln();
        assert!((large.log_volume() - expected).abs() < 1e-9);
    }
}
