use crate::model::Model;

/// Log likelihood of a parameter vector.
///
/// Implementations must be pure: the same `theta` always yields the same
/// value. Disallowed regions are expressed as negative infinity rather than
/// errors, since nested sampling treats them as zero likelihood.
pub trait Likelihood {
    fn log_likelihood(&self, theta: &[f64]) -> f64;
}

/// Gaussian noise around a forward model, one uncertainty per observation.
#[derive(Debug, Clone)]
pub struct NormalLikelihood<M: Model> {
    observations: Vec<f64>,
    uncertainties: Vec<f64>,
    model: M,
    log_normalization: f64,
}

impl<M: Model> NormalLikelihood<M> {
    pub fn new(observations: Vec<f64>, uncertainties: Vec<f64>, model: M) -> Self {
        assert!(observations.len() == uncertainties.len());
        assert!(observations.len() == model.ncovariates());
        assert!(uncertainties.iter().all(|&sigma| sigma > 0.));
        let log_normalization = uncertainties
            .iter()
            .map(|&sigma| -0.5 * (2. * std::f64::consts::PI * sigma * sigma).ln())
            .sum();
        Self {
            observations,
            uncertainties,
            model,
            log_normalization,
        }
    }
}

impl<M: Model> Likelihood for NormalLikelihood<M> {
    fn log_likelihood(&self, theta: &[f64]) -> f64 {
        let mut predictions = vec![0f64; self.observations.len()];
        self.model.predictions(theta, &mut predictions);
        let mut log_likelihood = self.log_normalization;
        for ((&observation, &sigma), prediction) in self
            .observations
            .iter()
            .zip(self.uncertainties.iter())
            .zip(predictions)
        {
            let scaled = (observation - prediction) / sigma;
            log_likelihood -= 0.5 * scaled * scaled;
        }
        log_likelihood
    }
}

/// Gaussian noise with a single shared uncertainty, taken as the mean of the
/// per-observation uncertainties.
#[derive(Debug, Clone)]
pub struct MeanNormalLikelihood<M: Model> {
    observations: Vec<f64>,
    mean_uncertainty: f64,
    model: M,
    log_normalization: f64,
}

impl<M: Model> MeanNormalLikelihood<M> {
    pub fn new(observations: Vec<f64>, uncertainties: &[f64], model: M) -> Self {
        assert!(!uncertainties.is_empty());
        assert!(observations.len() == model.ncovariates());
        let mean_uncertainty =
            uncertainties.iter().sum::<f64>() / uncertainties.len() as f64;
        assert!(mean_uncertainty > 0.);
        let log_normalization = -0.5
            * observations.len() as f64
            * (2. * std::f64::consts::PI * mean_uncertainty * mean_uncertainty).ln();
        Self {
            observations,
            mean_uncertainty,
            model,
            log_normalization,
        }
    }
}

impl<M: Model> Likelihood for MeanNormalLikelihood<M> {
    fn log_likelihood(&self, theta: &[f64]) -> f64 {
        let mut predictions = vec![0f64; self.observations.len()];
        self.model.predictions(theta, &mut predictions);
        let mut log_likelihood = self.log_normalization;
        for (&observation, prediction) in self.observations.iter().zip(predictions) {
            let scaled = (observation - prediction) / self.mean_uncertainty;
            log_likelihood -= 0.5 * scaled * scaled;
        }
        log_likelihood
    }
}

/// Isotropic Gaussian blob with unit total mass.
///
/// `log L = -|theta - center|^2 / (2 sigma^2) - (D/2) log(2 pi sigma^2)`,
/// so the evidence under a uniform prior has a closed form.
#[derive(Debug, Clone)]
pub struct GaussianLikelihood {
    center: Vec<f64>,
    sigma: f64,
}

impl GaussianLikelihood {
    pub fn new(center: Vec<f64>, sigma: f64) -> Self {
        assert!(sigma > 0.);
        Self { center, sigma }
    }
}

impl Likelihood for GaussianLikelihood {
    fn log_likelihood(&self, theta: &[f64]) -> f64 {
        assert!(theta.len() == self.center.len());
        let dim = self.center.len() as f64;
        let mut dist_sq = 0f64;
        for (&val, &center) in theta.iter().zip(self.center.iter()) {
            dist_sq += (val - center) * (val - center);
        }
        -0.5 * dist_sq / (self.sigma * self.sigma)
            - 0.5 * dim * (2. * std::f64::consts::PI * self.sigma * self.sigma).ln()
    }
}

/// Highly multi-modal eggbox surface in two dimensions.
///
/// `log L = (2 + cos(x/2) cos(y/2))^5` has 18 distinct modes on
/// `[0, 10 pi]^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EggboxLikelihood;

impl Likelihood for EggboxLikelihood {
    fn log_likelihood(&self, theta: &[f64]) -> f64 {
        assert!(theta.len() == 2);
        (2. + (0.5 * theta[0]).cos() * (0.5 * theta[1]).cos()).powi(5)
    }
}

/// Rosenbrock valley in two dimensions, a curved degenerate ridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct RosenbrockLikelihood;

impl Likelihood for RosenbrockLikelihood {
    fn log_likelihood(&self, theta: &[f64]) -> f64 {
        assert!(theta.len() == 2);
        let (x, y) = (theta[0], theta[1]);
        -((1. - x) * (1. - x) + 100. * (y - x * x) * (y - x * x))
    }
}
