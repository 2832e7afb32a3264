use crate::math::logaddexp;

/// Read-only view of the sampler state handed to a reducer.
///
/// The reducer needs sampler state and the sampler calls the reducer; passing
/// a snapshot by value at call time keeps the two free of mutual ownership.
#[derive(Debug, Clone, Copy)]
pub struct RunSnapshot {
    pub iteration: usize,
    pub n_live: usize,
    pub n_live_initial: usize,
    pub n_live_min: usize,
    pub log_evidence: f64,
    pub log_width: f64,
    pub log_remaining_prior_mass: f64,
    pub max_live_log_likelihood: f64,
    pub termination_factor: f64,
}

impl RunSnapshot {
    /// Log of the evidence still expected from the live points.
    pub fn log_remaining_evidence(&self) -> f64 {
        self.max_live_log_likelihood + self.log_remaining_prior_mass
    }
}

/// Schedule for shrinking the live-point count as a run progresses.
///
/// Implementations return the live-point count to keep after the current
/// iteration. The sampler clamps the result to `[n_live_min, n_live]`, so a
/// reducer can never grow the ensemble.
pub trait LivePointsReducer {
    fn next_nlive(&mut self, snapshot: &RunSnapshot) -> usize;
}

/// Power-law removal schedule.
///
/// Leaves the ensemble alone until the remaining-evidence ratio drops below
/// the termination factor, then removes `iteration^exponent / tolerance`
/// points per iteration.
#[derive(Debug, Clone, Copy)]
pub struct PowerlawReducer {
    tolerance: f64,
    exponent: f64,
    termination_factor: f64,
}

impl PowerlawReducer {
    pub fn new(tolerance: f64, exponent: f64, termination_factor: f64) -> Self {
        assert!(tolerance > 0.);
        assert!(exponent >= 0.);
        Self {
            tolerance,
            exponent,
            termination_factor,
        }
    }
}

impl LivePointsReducer for PowerlawReducer {
    fn next_nlive(&mut self, snapshot: &RunSnapshot) -> usize {
        let log_ratio = snapshot.log_remaining_evidence() - snapshot.log_evidence;
        if !(log_ratio < self.termination_factor) {
            return snapshot.n_live;
        }
        let removal =
            ((snapshot.iteration as f64).powf(self.exponent) / self.tolerance).round() as usize;
        snapshot
            .n_live
            .saturating_sub(removal)
            .max(snapshot.n_live_min)
    }
}

/// Removal proportional to the expected remaining evidence.
///
/// The live-point count tracks the fraction of the total evidence still
/// outstanding, scaled by `tolerance`, so the ensemble thins out as the run
/// converges (Feroz et al. 2009).
#[derive(Debug, Clone, Copy)]
pub struct FerozReducer {
    tolerance: f64,
}

impl FerozReducer {
    pub fn new(tolerance: f64) -> Self {
        assert!(tolerance > 0.);
        Self { tolerance }
    }
}

impl LivePointsReducer for FerozReducer {
    fn next_nlive(&mut self, snapshot: &RunSnapshot) -> usize {
        let log_remaining = snapshot.log_remaining_evidence();
        let log_total = logaddexp(snapshot.log_evidence, log_remaining);
        let fraction = if log_total == f64::NEG_INFINITY {
            1.
        } else {
            (log_remaining - log_total).exp()
        };
        let span = snapshot.n_live_initial.saturating_sub(snapshot.n_live_min) as f64;
        let target = snapshot.n_live_min
            + (span * (fraction * self.tolerance).min(1.)).round() as usize;
        target.min(snapshot.n_live)
    }
}
