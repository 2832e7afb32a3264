//! Multi-modal demo on the eggbox likelihood.
//!
//! `log L(x, y) = (2 + cos(x/2) cos(y/2))^5` over a uniform prior on
//! `[0, 10 pi]^2` has 18 well-separated modes, which exercises the
//! clustering and the ellipsoid union sampling. Results land in
//! `demo_eggbox_output/`.

use anyhow::Result;
use nested_rs::{
    EggboxLikelihood, EuclideanMetric, JointPrior, KmeansClusterer, NestedSampler,
    NestedSamplerArgs, PowerlawReducer, PrincipalComponentProjector, Results, UniformPrior,
};

fn main() -> Result<()> {
    let ndimensions = 2usize;
    let upper = 10. * std::f64::consts::PI;
    let prior = JointPrior::new(vec![UniformPrior::new(vec![0., 0.], vec![upper, upper])?.into()])?;
    let likelihood = EggboxLikelihood;

    let metric = EuclideanMetric;
    let projector = PrincipalComponentProjector::default();
    let feature_projection_activated = false;
    let ntrials = 10;
    let relative_tolerance = 0.01;
    let clusterer = KmeansClusterer::new(
        metric,
        projector,
        feature_projection_activated,
        ntrials,
        relative_tolerance,
    );

    let args = NestedSamplerArgs {
        seed: 42,
        initial_nobjects: 2000,
        min_nobjects: 2000,
        max_ndraw_attempts: 50_000,
        n_initial_iterations_without_clustering: 2000,
        n_iterations_with_same_clustering: 200,
        initial_enlargement_fraction: 0.369 * (ndimensions as f64).powf(0.574),
        shrinking_rate: 0.,
        termination_factor: 1.,
        min_nclusters: 6,
        max_nclusters: 12,
        verbose: true,
        ..NestedSamplerArgs::default()
    };

    let tolerance = 1e2;
    let exponent = 0.4;
    let reducer = PowerlawReducer::new(tolerance, exponent, args.termination_factor);

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
    results.write_to_directory("demo_eggbox_output", credible_level)?;

    Ok(())
}
