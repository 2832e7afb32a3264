use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::kmeans::Clusterer;
use crate::likelihood::Likelihood;
use crate::math::logsumexp;
use crate::reducer::LivePointsReducer;
use crate::sampler::{NestedSampler, NestedSamplerArgs, PosteriorEntry};

/// Plain-text result writer for a finished run.
///
/// One file per output quantity: per-dimension posterior samples, their log
/// likelihoods, the normalized posterior weights, the evidence summary and a
/// per-dimension parameter summary.
pub struct Results<'a> {
    posterior: &'a [PosteriorEntry],
    ndimensions: usize,
    log_evidence: f64,
    log_evidence_error: f64,
    information_gain: f64,
    niterations: usize,
    args: &'a NestedSamplerArgs,
}

impl<'a> Results<'a> {
    pub fn new<L, C, D>(sampler: &'a NestedSampler<L, C, D>) -> Self
    where
        L: Likelihood,
        C: Clusterer,
        D: LivePointsReducer,
    {
        Results {
            posterior: sampler.posterior(),
            ndimensions: sampler.ndimensions(),
            log_evidence: sampler.log_evidence(),
            log_evidence_error: sampler.log_evidence_error(),
            information_gain: sampler.information_gain(),
            niterations: sampler.niterations(),
            args: sampler.args(),
        }
    }

    /// Posterior weights normalized to unit sum.
    pub fn posterior_probabilities(&self) -> Vec<f64> {
        let log_weights: Vec<f64> = self
            .posterior
            .iter()
            .map(|entry| entry.log_weight)
            .collect();
        let log_total = logsumexp(&log_weights);
        log_weights
            .iter()
            .map(|log_weight| (log_weight - log_total).exp())
            .collect()
    }

    /// Write one `parameterXXX.txt` per dimension next to `prefix`.
    pub fn write_parameters_to_file<P: AsRef<Path>>(&self, prefix: P) -> Result<()> {
        let prefix = prefix.as_ref();
        for dimension in 0..self.ndimensions {
            let path = prefix.with_file_name(format!(
                "{}{dimension:03}.txt",
                prefix
                    .file_name()
                    .map(|name| name.to_string_lossy())
                    .unwrap_or_default()
            ));
            let mut writer = BufWriter::new(
                File::create(&path)
                    .with_context(|| format!("Could not create {}", path.display()))?,
            );
            for entry in self.posterior {
                writeln!(writer, "{:.12e}", entry.theta[dimension])?;
            }
            writer.flush()?;
        }
        Ok(())
    }

    pub fn write_log_likelihood_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {}", path.display()))?,
        );
        for entry in self.posterior {
            writeln!(writer, "{:.12e}", entry.log_likelihood)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_posterior_probability_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {}", path.display()))?,
        );
        for probability in self.posterior_probabilities() {
            writeln!(writer, "{probability:.12e}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Four lines: log evidence, its error, the information gain and the
    /// iteration count.
    pub fn write_evidence_information_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {}", path.display()))?,
        );
        writeln!(writer, "{:.12e}", self.log_evidence)?;
        writeln!(writer, "{:.12e}", self.log_evidence_error)?;
        writeln!(writer, "{:.12e}", self.information_gain)?;
        writeln!(writer, "{}", self.niterations)?;
        writer.flush()?;
        Ok(())
    }

    /// Per dimension: mean, median, mode and the credible bounds at
    /// `credible_level` percent.
    pub fn write_parameters_summary_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        credible_level: f64,
    ) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {}", path.display()))?,
        );
        writeln!(
            writer,
            "# Mean    Median    Mode    Lower CL ({credible_level}%)    Upper CL ({credible_level}%)"
        )?;
        for summary in self.parameter_summaries(credible_level) {
            writeln!(
                writer,
                "{:.12e} {:.12e} {:.12e} {:.12e} {:.12e}",
                summary.mean, summary.median, summary.mode, summary.credible_lower,
                summary.credible_upper,
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Trailing configuration block of the clustering setup.
    pub fn write_configuration_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {}", path.display()))?,
        );
        writeln!(
            writer,
            "# Configuring parameters used for the ellipsoidal sampler and clustering"
        )?;
        writeln!(writer, "# Row #1: Minimum Nclusters")?;
        writeln!(writer, "# Row #2: Maximum Nclusters")?;
        writeln!(writer, "# Row #3: Initial Enlargement Fraction")?;
        writeln!(writer, "# Row #4: Shrinking Rate")?;
        writeln!(writer, "{}", self.args.min_nclusters)?;
        writeln!(writer, "{}", self.args.max_nclusters)?;
        writeln!(writer, "{}", self.args.initial_enlargement_fraction)?;
        writeln!(writer, "{}", self.args.shrinking_rate)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the full output file set into `directory`.
    pub fn write_to_directory<P: AsRef<Path>>(
        &self,
        directory: P,
        credible_level: f64,
    ) -> Result<()> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)
            .with_context(|| format!("Could not create {}", directory.display()))?;
        self.write_parameters_to_file(directory.join("parameter"))?;
        self.write_log_likelihood_to_file(directory.join("logLikelihood.txt"))?;
        self.write_posterior_probability_to_file(directory.join("posteriorDistribution.txt"))?;
        self.write_evidence_information_to_file(directory.join("evidenceInformation.txt"))?;
        self.write_parameters_summary_to_file(
            directory.join("parameterSummary.txt"),
            credible_level,
        )?;
        self.write_configuration_to_file(directory.join("samplerConfiguration.txt"))?;
        Ok(())
    }

    pub fn parameter_summaries(&self, credible_level: f64) -> Vec<ParameterSummary> {
        assert!(credible_level > 0. && credible_level < 100.);
        let probabilities = self.posterior_probabilities();
        let tail = 0.5 * (1. - credible_level / 100.);

        (0..self.ndimensions)
            .map(|dimension| {
                let values: Vec<f64> = self
                    .posterior
                    .iter()
                    .map(|entry| entry.theta[dimension])
                    .collect();

                let mean = values
                    .iter()
                    .zip(probabilities.iter())
                    .map(|(value, probability)| value * probability)
                    .sum();

                let mode_idx = probabilities
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);

                ParameterSummary {
                    mean,
                    median: weighted_quantile(&values, &probabilities, 0.5),
                    mode: values[mode_idx],
                    credible_lower: weighted_quantile(&values, &probabilities, tail),
                    credible_upper: weighted_quantile(&values, &probabilities, 1. - tail),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterSummary {
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub credible_lower: f64,
    pub credible_upper: f64,
}

/// Quantile of a weighted sample by inverting the cumulative weights.
fn weighted_quantile(values: &[f64], weights: &[f64], quantile: f64) -> f64 {
    assert!(values.len() == weights.len());
    assert!(!values.is_empty());

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let total: f64 = weights.iter().sum();
    let target = quantile * total;
    let mut cumulative = 0f64;
    for &idx in &order {
        cumulative += weights[idx];
        if cumulative >= target {
            return values[idx];
        }
    }
    values[*order.last().expect("values is non-empty")]
}
