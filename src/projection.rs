use faer::{Mat, Scale};

/// Principal component projection of a point cloud.
///
/// Used to reduce the live-point cloud to its leading principal axes before
/// clustering. Components are kept until they explain `variance_fraction` of
/// the total variance.
#[derive(Debug, Clone)]
pub struct PrincipalComponentProjector {
    variance_fraction: f64,
}

impl Default for PrincipalComponentProjector {
    fn default() -> Self {
        Self::new(0.95)
    }
}

impl PrincipalComponentProjector {
    pub fn new(variance_fraction: f64) -> Self {
        assert!(variance_fraction > 0. && variance_fraction <= 1.);
        Self { variance_fraction }
    }

    /// Project `points` onto the leading principal axes.
    ///
    /// Returns one reduced-dimension vector per input point. Falls back to
    /// the identity when the decomposition fails or nothing can be dropped.
    pub fn project(&self, points: &[&[f64]]) -> Option<Vec<Box<[f64]>>> {
        let npoints = points.len();
        let dim = points.first()?.len();
        if npoints < 2 || dim < 2 {
            return None;
        }

        let mut center = vec![0f64; dim];
        for point in points {
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

        // Eigenvalues come out ascending; walk from the top until the
        // requested variance fraction is covered.
        let total: f64 = vals.as_slice().iter().map(|v| v.max(0.)).sum();
        if total <= 0. {
            return None;
        }
        let mut kept = 0usize;
        let mut explained = 0f64;
        for val in vals.as_slice().iter().rev() {
            kept += 1;
            explained += val.max(0.);
            if explained >= self.variance_fraction * total {
                break;
            }
        }
        if kept >= dim {
            return None;
        }

        let columns: Vec<&[f64]> = vecs
            .col_iter()
            .map(|col| col.try_as_slice().expect("Eigenvector array not contiguous"))
            .collect();
        let axes: Vec<&[f64]> = columns.iter().rev().take(kept).copied().collect();

        let projected = points
            .iter()
            .map(|point| {
                axes.iter()
                    .map(|axis| {
                        point
                            .iter()
                            .zip(center.iter())
                            .zip(axis.iter())
                            .map(|((p, c), a)| (p - c) * a)
                            .sum()
                    })
                    .collect::<Vec<f64>>()
                    .into()
            })
            .collect();
        Some(projected)
    }
}
