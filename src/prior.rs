use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriorError {
    #[error("invalid prior bounds in dimension {dimension}: minimum {minimum} is not below maximum {maximum}")]
    InvalidBounds {
        dimension: usize,
        minimum: f64,
        maximum: f64,
    },

    #[error("invalid scale in dimension {dimension}: standard deviation must be positive")]
    InvalidScale { dimension: usize },

    #[error("dimension mismatch: {got} values for {expected} dimensions")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("grid prior needs a positive node count, separation and tolerance")]
    InvalidGrid,

    #[error("joint prior needs at least one block")]
    Empty,
}

/// Uniform density over an axis-aligned box.
#[derive(Debug, Clone)]
pub struct UniformPrior {
    minima: Box<[f64]>,
    maxima: Box<[f64]>,
    log_density: f64,
}

impl UniformPrior {
    pub fn new(minima: Vec<f64>, maxima: Vec<f64>) -> Result<Self, PriorError> {
        if minima.len() != maxima.len() {
            return Err(PriorError::DimensionMismatch {
                expected: minima.len(),
                got: maxima.len(),
            });
        }
        let mut log_density = 0f64;
        for (dimension, (&minimum, &maximum)) in minima.iter().zip(maxima.iter()).enumerate() {
            if !(minimum < maximum) {
                return Err(PriorError::InvalidBounds {
                    dimension,
                    minimum,
                    maximum,
                });
            }
            log_density -= (maximum - minimum).ln();
        }
        Ok(Self {
            minima: minima.into(),
            maxima: maxima.into(),
            log_density,
        })
    }

    pub fn minima(&self) -> &[f64] {
        &self.minima
    }

    pub fn maxima(&self) -> &[f64] {
        &self.maxima
    }
}

/// Independent normal density per dimension.
#[derive(Debug, Clone)]
pub struct NormalPrior {
    means: Box<[f64]>,
    standard_deviations: Box<[f64]>,
    log_max: f64,
}

impl NormalPrior {
    pub fn new(means: Vec<f64>, standard_deviations: Vec<f64>) -> Result<Self, PriorError> {
        if means.len() != standard_deviations.len() {
            return Err(PriorError::DimensionMismatch {
                expected: means.len(),
                got: standard_deviations.len(),
            });
        }
        let mut log_max = 0f64;
        for (dimension, &sd) in standard_deviations.iter().enumerate() {
            if !(sd > 0.) {
                return Err(PriorError::InvalidScale { dimension });
            }
            log_max -= 0.5 * (2. * std::f64::consts::PI * sd * sd).ln();
        }
        Ok(Self {
            means: means.into(),
            standard_deviations: standard_deviations.into(),
            log_max,
        })
    }
}

/// Uniform density over a regular lattice of narrow boxes.
///
/// Each dimension allows `nnodes` values `start + i * separation`, fuzzed to
/// a box of width `tolerance` around every node.
#[derive(Debug, Clone)]
pub struct GridUniformPrior {
    starting_values: Box<[f64]>,
    separations: Box<[f64]>,
    nnodes: Box<[usize]>,
    tolerances: Box<[f64]>,
    log_density: f64,
}

impl GridUniformPrior {
    pub fn new(
        starting_values: Vec<f64>,
        separations: Vec<f64>,
        nnodes: Vec<usize>,
        tolerances: Vec<f64>,
    ) -> Result<Self, PriorError> {
        let dim = starting_values.len();
        if separations.len() != dim || nnodes.len() != dim || tolerances.len() != dim {
            return Err(PriorError::DimensionMismatch {
                expected: dim,
                got: separations.len().min(nnodes.len()).min(tolerances.len()),
            });
        }
        let mut log_density = 0f64;
        for ((&separation, &count), &tolerance) in
            separations.iter().zip(nnodes.iter()).zip(tolerances.iter())
        {
            if count == 0 || !(tolerance > 0.) || !(separation > tolerance) {
                return Err(PriorError::InvalidGrid);
            }
            log_density -= (count as f64 * tolerance).ln();
        }
        Ok(Self {
            starting_values: starting_values.into(),
            separations: separations.into(),
            nnodes: nnodes.into(),
            tolerances: tolerances.into(),
            log_density,
        })
    }

    fn node_offset(&self, dimension: usize, value: f64) -> Option<(usize, f64)> {
        let start = self.starting_values[dimension];
        let separation = self.separations[dimension];
        let node = ((value - start) / separation).round();
        if node < 0. || node >= self.nnodes[dimension] as f64 {
            return None;
        }
        let offset = value - (start + node * separation);
        (offset.abs() <= 0.5 * self.tolerances[dimension]).then_some((node as usize, offset))
    }
}

/// A prior over one block of dimensions.
///
/// The supported densities form a closed set so the sampler can dispatch
/// statically. Blocks compose into a [`JointPrior`] with a product density.
#[derive(Debug, Clone)]
pub enum Prior {
    Uniform(UniformPrior),
    Normal(NormalPrior),
    GridUniform(GridUniformPrior),
}

impl From<UniformPrior> for Prior {
    fn from(prior: UniformPrior) -> Self {
        Prior::Uniform(prior)
    }
}

impl From<NormalPrior> for Prior {
    fn from(prior: NormalPrior) -> Self {
        Prior::Normal(prior)
    }
}

impl From<GridUniformPrior> for Prior {
    fn from(prior: GridUniformPrior) -> Self {
        Prior::GridUniform(prior)
    }
}

impl Prior {
    pub fn ndimensions(&self) -> usize {
        match self {
            Prior::Uniform(prior) => prior.minima.len(),
            Prior::Normal(prior) => prior.means.len(),
            Prior::GridUniform(prior) => prior.starting_values.len(),
        }
    }

    /// Log density at `theta`, negative infinity outside the support.
    pub fn log_pdf(&self, theta: &[f64]) -> f64 {
        assert!(theta.len() == self.ndimensions());
        match self {
            Prior::Uniform(prior) => {
                let inside = theta
                    .iter()
                    .zip(prior.minima.iter())
                    .zip(prior.maxima.iter())
                    .all(|((&val, &minimum), &maximum)| val >= minimum && val <= maximum);
                if inside {
                    prior.log_density
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Normal(prior) => {
                let mut log_pdf = prior.log_max;
                for ((&val, &mean), &sd) in theta
                    .iter()
                    .zip(prior.means.iter())
                    .zip(prior.standard_deviations.iter())
                {
                    let scaled = (val - mean) / sd;
                    log_pdf -= 0.5 * scaled * scaled;
                }
                log_pdf
            }
            Prior::GridUniform(prior) => {
                let inside = theta
                    .iter()
                    .enumerate()
                    .all(|(dimension, &val)| prior.node_offset(dimension, val).is_some());
                if inside {
                    prior.log_density
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    /// Supremum of the log density, used for rejection reweighting.
    pub fn log_max_pdf(&self) -> f64 {
        match self {
            Prior::Uniform(prior) => prior.log_density,
            Prior::Normal(prior) => prior.log_max,
            Prior::GridUniform(prior) => prior.log_density,
        }
    }

    /// Draw a sample distributed according to the prior.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut [f64]) {
        assert!(out.len() == self.ndimensions());
        match self {
            Prior::Uniform(_) | Prior::GridUniform(_) => {
                let unit: Vec<f64> = (0..out.len()).map(|_| rng.gen()).collect();
                let mapped = self.map_from_unit_cube(&unit, out);
                debug_assert!(mapped);
            }
            Prior::Normal(prior) => {
                for ((out, &mean), &sd) in out
                    .iter_mut()
                    .zip(prior.means.iter())
                    .zip(prior.standard_deviations.iter())
                {
                    let standard: f64 = StandardNormal.sample(rng);
                    *out = mean + sd * standard;
                }
            }
        }
    }

    /// Map unit-cube coordinates into parameter space.
    ///
    /// Returns false when the prior has no closed-form map (normal blocks).
    pub fn map_from_unit_cube(&self, unit: &[f64], out: &mut [f64]) -> bool {
        assert!(unit.len() == self.ndimensions());
        assert!(out.len() == self.ndimensions());
        match self {
            Prior::Uniform(prior) => {
                for (((out, &u), &minimum), &maximum) in out
                    .iter_mut()
                    .zip(unit.iter())
                    .zip(prior.minima.iter())
                    .zip(prior.maxima.iter())
                {
                    *out = minimum + u * (maximum - minimum);
                }
                true
            }
            Prior::Normal(_) => false,
            Prior::GridUniform(prior) => {
                for (dimension, (out, &u)) in out.iter_mut().zip(unit.iter()).enumerate() {
                    let count = prior.nnodes[dimension] as f64;
                    let scaled = (u * count).min(count - 1e-12);
                    let node = scaled.floor();
                    let within = scaled - node;
                    *out = prior.starting_values[dimension]
                        + node * prior.separations[dimension]
                        + (within - 0.5) * prior.tolerances[dimension];
                }
                true
            }
        }
    }
}

/// Product prior over consecutive blocks of dimensions.
#[derive(Debug, Clone)]
pub struct JointPrior {
    blocks: Vec<Prior>,
    ndimensions: usize,
}

impl JointPrior {
    pub fn new(blocks: Vec<Prior>) -> Result<Self, PriorError> {
        if blocks.is_empty() {
            return Err(PriorError::Empty);
        }
        let ndimensions = blocks.iter().map(|block| block.ndimensions()).sum();
        Ok(Self {
            blocks,
            ndimensions,
        })
    }

    pub fn ndimensions(&self) -> usize {
        self.ndimensions
    }

    pub fn blocks(&self) -> &[Prior] {
        &self.blocks
    }

    pub fn log_pdf(&self, theta: &[f64]) -> f64 {
        assert!(theta.len() == self.ndimensions);
        let mut log_pdf = 0f64;
        let mut offset = 0usize;
        for block in &self.blocks {
            let next = offset + block.ndimensions();
            log_pdf += block.log_pdf(&theta[offset..next]);
            offset = next;
        }
        log_pdf
    }

    pub fn log_max_pdf(&self) -> f64 {
        self.blocks.iter().map(|block| block.log_max_pdf()).sum()
    }

    pub fn in_support(&self, theta: &[f64]) -> bool {
        self.log_pdf(theta) > f64::NEG_INFINITY
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut [f64]) {
        assert!(out.len() == self.ndimensions);
        let mut offset = 0usize;
        for block in &self.blocks {
            let next = offset + block.ndimensions();
            block.draw(rng, &mut out[offset..next]);
            offset = next;
        }
    }

    pub fn map_from_unit_cube(&self, unit: &[f64], out: &mut [f64]) -> bool {
        assert!(unit.len() == self.ndimensions);
        assert!(out.len() == self.ndimensions);
        let mut offset = 0usize;
        for block in &self.blocks {
            let next = offset + block.ndimensions();
            if !block.map_from_unit_cube(&unit[offset..next], &mut out[offset..next]) {
                return false;
            }
            offset = next;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_rejects_inverted_bounds() {
        assert!(matches!(
            UniformPrior::new(vec![0., 5.], vec![1., 5.]),
            Err(PriorError::InvalidBounds { dimension: 1, .. })
        ));
        assert!(matches!(
            UniformPrior::new(vec![0.], vec![1., 2.]),
            Err(PriorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn uniform_density_and_support() {
        let prior: Prior = UniformPrior::new(vec![0., 0.], vec![2., 5.]).unwrap().into();
        assert!((prior.log_pdf(&[1., 1.]) - -(10f64.ln())).abs() < 1e-12);
        assert_eq!(prior.log_pdf(&[3., 1.]), f64::NEG_INFINITY);
        assert_eq!(prior.log_max_pdf(), prior.log_pdf(&[1., 1.]));
    }

    #[test]
    fn uniform_unit_cube_map() {
        let prior: Prior = UniformPrior::new(vec![-1.], vec![3.]).unwrap().into();
        let mut out = [0f64];
        assert!(prior.map_from_unit_cube(&[0.5], &mut out));
        assert!((out[0] - 1.).abs() < 1e-12);
    }

    #[test]
    fn normal_density() {
        let prior: Prior = NormalPrior::new(vec![0.], vec![1.]).unwrap().into();
        let expected = -0.5 * (2. * std::f64::consts::PI).ln();
        assert!((prior.log_pdf(&[0.]) - expected).abs() < 1e-12);
        assert!((prior.log_pdf(&[1.]) - (expected - 0.5)).abs() < 1e-12);
        let mut out = [0f64];
        assert!(!prior.map_from_unit_cube(&[0.5], &mut out));
    }

    #[test]
    fn grid_draws_snap_to_nodes() {
        let prior: Prior = GridUniformPrior::new(vec![1.], vec![2.], vec![4], vec![0.2])
            .unwrap()
            .into();
        let mut rng = SmallRng::seed_from_u64(21);
        let mut out = [0f64];
        for _ in 0..200 {
            prior.draw(&mut rng, &mut out);
            assert!(prior.log_pdf(&out).is_finite());
            let node = ((out[0] - 1.) / 2.).round();
            assert!((0. ..4.).contains(&node));
            assert!((out[0] - (1. + node * 2.)).abs() <= 0.1 + 1e-12);
        }
        assert_eq!(prior.log_pdf(&[2.]), f64::NEG_INFINITY);
    }

    #[test]
    fn joint_composition() {
        let joint = JointPrior::new(vec![
            UniformPrior::new(vec![0., 0.], vec![1., 1.]).unwrap().into(),
            NormalPrior::new(vec![0.], vec![2.]).unwrap().into(),
        ])
        .unwrap();
        assert_eq!(joint.ndimensions(), 3);

        let block_uniform = Prior::from(UniformPrior::new(vec![0., 0.], vec![1., 1.]).unwrap());
        let block_normal = Prior::from(NormalPrior::new(vec![0.], vec![2.]).unwrap());
        let expected = block_uniform.log_pdf(&[0.5, 0.5]) + block_normal.log_pdf(&[1.]);
        assert!((joint.log_pdf(&[0.5, 0.5, 1.]) - expected).abs() < 1e-12);
        assert!(!joint.in_support(&[1.5, 0.5, 1.]));

        let mut rng = SmallRng::seed_from_u64(22);
        let mut out = [0f64; 3];
        joint.draw(&mut rng, &mut out);
        assert!(joint.in_support(&out));
    }
}
