#[inline]
pub(crate) fn logaddexp(a: f64, b: f64) -> f64 {
    if a == b {
        return a + 2f64.ln();
    }
    let diff = a - b;
    if diff > 0. {
        a + (-diff).exp().ln_1p()
    } else if diff < 0. {
        b + diff.exp().ln_1p()
    } else {
        // diff is NAN
        diff
    }
}

/// Stable log of a sum of exponentials, shifted by the maximum term.
pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|&val| (val - max).exp()).sum();
    max + sum.ln()
}

#[inline]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    assert!(b.len() == n);

    let mut result = 0.;
    for (val1, val2) in a.iter().zip(b) {
        result += *val1 * *val2;
    }
    result
}

/// Log volume of the unit ball in `dim` dimensions.
///
/// `V(D) = pi^(D/2) / Gamma(D/2 + 1)`. The gamma argument is always an
/// integer or half integer, so the log-gamma term is accumulated through
/// the recurrence from `Gamma(1)` or `Gamma(1/2)`.
pub(crate) fn log_unit_ball_volume(dim: usize) -> f64 {
    let half_dim = 0.5 * dim as f64;
    let mut x = if dim % 2 == 0 { 1.0 } else { 0.5 };
    let mut ln_gamma = if dim % 2 == 0 {
        0.
    } else {
        0.5 * std::f64::consts::PI.ln()
    };
    while x < half_dim + 1. {
        ln_gamma += x.ln();
        x += 1.;
    }
    half_dim * std::f64::consts::PI.ln() - ln_gamma
}
