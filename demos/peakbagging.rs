//! Peak bagging on a single Lorentzian profile.
//!
//! Reads a three-column observation table (covariate, observation,
//! uncertainty), fits a Lorentzian with uniform priors on centroid,
//! amplitude and width, and writes the posterior files into the output
//! directory.
//!
//! Usage: `peakbagging <input file> <output directory>`

use anyhow::{bail, Context, Result};
use nested_rs::{
    read_observations, EuclideanMetric, JointPrior, KmeansClusterer, LorentzianModel,
    NestedSampler, NestedSamplerArgs, NormalLikelihood, PowerlawReducer,
    PrincipalComponentProjector, Results, UniformPrior,
};

fn main() -> Result<()> {
    let arguments: Vec<String> = std::env::args().collect();
    if arguments.len() != 3 {
        bail!("Usage: peakbagging <input file> <output directory>");
    }

    let (covariates, observations, uncertainties) =
        read_observations(&arguments[1]).context("Could not read the observation table")?;

    // Boundaries of the free parameters: centroid, amplitude, width.
    let minima = vec![0., 0.8, 1.];
    let maxima = vec![20., 1.5, 3.];
    let prior = JointPrior::new(vec![UniformPrior::new(minima, maxima)?.into()])?;

    let model = LorentzianModel::new(covariates);
    let likelihood = NormalLikelihood::new(observations, uncertainties, model);

    let clusterer = KmeansClusterer::new(
        EuclideanMetric,
        PrincipalComponentProjector::default(),
        false,
        10,
        0.01,
    );

    let args = NestedSamplerArgs {
        seed: 42,
        initial_nobjects: 1000,
        min_nobjects: 1000,
        max_ndraw_attempts: 50_000,
        n_initial_iterations_without_clustering: 1000,
        n_iterations_with_same_clustering: 100,
        initial_enlargement_fraction: 0.369 * 3f64.powf(0.574),
        shrinking_rate: 0.,
        termination_factor: 0.01,
        min_nclusters: 1,
        max_nclusters: 4,
        verbose: true,
        ..NestedSamplerArgs::default()
    };
    let reducer = PowerlawReducer::new(1e2, 0.4, args.termination_factor);

    let mut sampler = NestedSampler::new(prior, likelihood, clusterer, reducer, args)?;
    let report = sampler.run()?;
    println!(
        "log evidence: {:.6} +/- {:.6}  (information gain {:.6}, {} iterations)",
        report.log_evidence,
        report.log_evidence_error,
        report.information_gain,
        report.niterations,
    );

    let results = Results::new(&sampler);
    let credible_level = 68.3;
    results
        .write_to_directory(&arguments[2], credible_level)
        .context("Could not write the result files")?;

    Ok(())
}
