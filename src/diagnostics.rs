//! Convergence diagnostics and posterior summary statistics.
//!
//! Two questions get answered here: did the independent chains agree with
//! each other (split-chain potential scale reduction, "R-hat"), and how many
//! effectively independent draws did the run produce (effective sample size
//! from the truncated autocorrelation sum). Both follow the textbook
//! estimators; neither is an error when its preconditions fail, since a
//! statistic that cannot be computed is reported as `None`.
//!
//! # Algorithm
//!
//! R-hat, following Gelman & Rubin (1992) with the split-chain refinement:
//! 1. Halve each chain, giving `2M` sequences of length `n/2`.
//! 2. `W` = mean of the per-sequence variances.
//! 3. `B` = `n/2` times the variance of the per-sequence means.
//! 4. `var+ = ((n/2 - 1) W + B) / (n/2)`, `R-hat = sqrt(var+ / W)`.
//!
//! ESS, following Gelman et al. (2013): average the per-chain autocorrelation
//! at each lag, sum lags until the first non-positive value, and divide the
//! total draw count by `1 + 2 * sum`.
//!
//! # References
//!
//! Gelman, A., & Rubin, D. B. (1992). Inference from iterative simulation
//! using multiple sequences. Statistical Science, 7(4), 457-472.
//!
//! Gelman, A., Carlin, J. B., Stern, H. S., Dunson, D. B., Vehtari, A., &
//! Rubin, D. B. (2013). Bayesian Data Analysis (3rd ed.). CRC Press.

use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::chain::{Parameter, Trace};
use crate::errors::{Error, Result};

/// Minimum retained draws per chain for a meaningful autocorrelation sum.
const MIN_DRAWS_FOR_ESS: usize = 10;

/// Summary statistics for one scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// Posterior mean over all chains' retained draws.
    pub mean: f64,
    /// Posterior standard deviation (sample variance, `n - 1` divisor).
    pub sd: f64,
    /// Lower bound of the equal-tailed credible interval.
    pub ci_lower: f64,
    /// Upper bound of the equal-tailed credible interval.
    pub ci_upper: f64,
    /// Monte-Carlo standard error of the mean, `sd / sqrt(ess)`.
    /// `None` whenever the effective sample size is not computable.
    pub mcse_mean: Option<f64>,
    /// Effective sample size; `None` with fewer than 10 draws per chain.
    pub ess: Option<f64>,
    /// Split-chain potential scale reduction; `None` with a single chain or
    /// fewer than 4 draws per chain.
    pub r_hat: Option<f64>,
}

/// Per-parameter summary of a finished run, in reporting order
/// (tau, mu1, mu2, sigma).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n_chains: usize,
    pub draws_per_chain: usize,
    /// Mass of the equal-tailed credible intervals below.
    pub ci_width: f64,
    pub parameters: IndexMap<Parameter, ParameterSummary>,
}

impl Summary {
    /// The summary of one parameter. Every parameter is always present.
    pub fn parameter(&self, param: Parameter) -> &ParameterSummary {
        &self.parameters[&param]
    }
}

impl Trace {
    /// Summarize the run with the credible-interval width it was
    /// configured with.
    pub fn summary(&self) -> Summary {
        build_summary(self, self.ci_width())
    }

    /// Summarize the run with a different credible-interval width.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] unless `ci_width` lies in `(0, 1)`.
    pub fn summary_with_width(&self, ci_width: f64) -> Result<Summary> {
        validate_ci_width(ci_width)?;
        Ok(build_summary(self, ci_width))
    }
}

pub(crate) fn validate_ci_width(ci_width: f64) -> Result<()> {
    if !(ci_width.is_finite() && 0.0 < ci_width && ci_width < 1.0) {
        return Err(Error::Configuration(format!(
            "credible-interval width must lie in (0, 1), got {ci_width}"
        )));
    }
    Ok(())
}

fn build_summary(trace: &Trace, ci_width: f64) -> Summary {
    let parameters = Parameter::ALL
        .iter()
        .map(|&param| {
            let per_chain = trace.chain_series(param);
            let pooled: Vec<f64> = per_chain.iter().flat_map(|c| c.iter().copied()).collect();

            let mean = mean(&pooled);
            let sd = sample_var(&pooled, mean).sqrt();
            let mut sorted = pooled;
            sorted.sort_unstable_by(f64::total_cmp);
            let tail = (1.0 - ci_width) / 2.0;
            let ess = ess(&per_chain);

            let summary = ParameterSummary {
                mean,
                sd,
                ci_lower: quantile(&sorted, tail),
                ci_upper: quantile(&sorted, 1.0 - tail),
                mcse_mean: ess.map(|e| sd / e.sqrt()),
                ess,
                r_hat: split_r_hat(&per_chain),
            };
            (param, summary)
        })
        .collect();

    Summary {
        n_chains: trace.n_chains(),
        draws_per_chain: trace.draws_per_chain(),
        ci_width,
        parameters,
    }
}

/// Split-chain potential scale reduction over one parameter's per-chain draws.
///
/// Halving each chain doubles the sequences entering the comparison, so slow
/// drift within a chain shows up as disagreement even when the full-chain
/// means coincide. Chains of unequal length are truncated to the shortest
/// before halving. Returns `None` with fewer than 2 chains or fewer than 4
/// draws in the shortest chain.
///
/// Degenerate variance is resolved rather than left as NaN: when every
/// sequence is constant the chains either agree exactly (1.0) or sit at
/// distinct values (infinity, an unambiguous non-convergence signal). The
/// discrete change-point index regularly produces such constant series on
/// well-separated data.
pub fn split_r_hat(chains: &[Array1<f64>]) -> Option<f64> {
    if chains.len() < 2 {
        return None;
    }
    let n = chains.iter().map(|c| c.len()).min()?;
    let n_split = n / 2;
    if n_split < 2 {
        return None;
    }

    let mut seq_means = Vec::with_capacity(chains.len() * 2);
    let mut seq_vars = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        let values = chain.to_vec();
        for half in [&values[..n_split], &values[n_split..2 * n_split]] {
            let m = mean(half);
            seq_means.push(m);
            seq_vars.push(sample_var(half, m));
        }
    }

    let w = seq_vars.iter().sum::<f64>() / seq_vars.len() as f64;
    let grand_mean = mean(&seq_means);
    let b = n_split as f64 * sample_var(&seq_means, grand_mean);

    if w == 0.0 {
        return Some(if b == 0.0 { 1.0 } else { f64::INFINITY });
    }
    let var_plus = ((n_split - 1) as f64 * w + b) / n_split as f64;
    Some((var_plus / w).sqrt())
}

/// Effective sample size over one parameter's per-chain draws.
///
/// Autocorrelations are averaged across chains, then summed over lags
/// `1, 2, ..` until the first non-positive value; the estimate is
/// `total / (1 + 2 * sum)`. The lag range is capped at `min(n/2, 100)`.
/// Returns `None` with no chains or fewer than 10 draws per chain.
pub fn ess(chains: &[Array1<f64>]) -> Option<f64> {
    if chains.is_empty() {
        return None;
    }
    let n = chains[0].len();
    if n < MIN_DRAWS_FOR_ESS {
        return None;
    }

    let max_lag = (n / 2).min(100);
    let mut avg_autocorr = vec![0.0; max_lag];
    for chain in chains {
        let values = chain.to_vec();
        let m = mean(&values);
        let variance = lag_autocovariance(&values, m, 0);
        if variance == 0.0 {
            // A flat chain carries no autocorrelation signal at any lag.
            continue;
        }
        let scale = variance * chains.len() as f64;
        for (lag, slot) in avg_autocorr.iter_mut().enumerate() {
            *slot += lag_autocovariance(&values, m, lag + 1) / scale;
        }
    }

    let mut sum_autocorr = 0.0;
    for &ac in &avg_autocorr {
        if ac <= 0.0 {
            break;
        }
        sum_autocorr += ac;
    }

    let total = chains.iter().map(|c| c.len()).sum::<usize>() as f64;
    Some(total / (1.0 + 2.0 * sum_autocorr))
}

/// Autocovariance of `series` at `lag`, from deviations around `mean`.
///
/// Normalized by the `n - lag` pairs the lag leaves in range; zero once the
/// lag reaches the series length. Lag 0 gives the variance (`n` divisor),
/// which is what the autocorrelations in [`ess`] are scaled by.
fn lag_autocovariance(series: &[f64], mean: f64, lag: usize) -> f64 {
    if lag >= series.len() {
        return 0.0;
    }
    let pairs = (series.len() - lag) as f64;
    series[lag..]
        .iter()
        .zip(series)
        .map(|(late, early)| (late - mean) * (early - mean))
        .sum::<f64>()
        / pairs
}

/// Linear-interpolation quantile over an already-sorted slice.
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    debug_assert!((0.0..=1.0).contains(&q));
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with the `n - 1` divisor; zero for fewer than 2 values.
pub(crate) fn sample_var(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (values.len() - 1) as f64
}
