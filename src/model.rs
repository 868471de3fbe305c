//! Generative model for a single mean shift in a univariate series.
//!
//! # Model
//!
//! The series `x[0..N]` is modelled as Gaussian noise around one of two
//! regime means, switching at an unknown index `tau`:
//!
//! ```text
//! tau   ~ DiscreteUniform(0, N - 1)
//! mu1   ~ Normal(mu1_mean, mu1_sd)
//! mu2   ~ Normal(mu2_mean, mu2_sd)
//! sigma ~ Exponential(sigma_rate)
//! x[i]  ~ Normal(mu1 if i < tau else mu2, sigma)
//! ```
//!
//! Observations with index below `tau` belong to the first regime, so
//! `tau = 0` makes the first regime empty and `tau = N - 1` leaves a single
//! observation in the second.
//!
//! # Numerical notes
//!
//! [`ChangePointModel::log_joint_density`] accumulates entirely in log space
//! and never normalizes intermediates. States outside the support
//! (`tau >= N`, `sigma <= 0`) evaluate to negative infinity rather than an
//! error; distinguishing "impossible proposal" from "numerically broken
//! current state" is the sampler's job.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::chain::Draw;
use crate::errors::{Error, Result};

/// ln(2 * pi), the constant term of the Gaussian log-density.
const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Prior hyperparameters for the change-point model.
///
/// Defaults describe daily event counts in the tens with a suspected upward
/// shift; override them for data on a different scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    /// Mean of the Normal prior on the first regime mean.
    /// Default: 40.0
    pub mu1_mean: f64,

    /// Standard deviation of the Normal prior on the first regime mean.
    /// Default: 20.0
    pub mu1_sd: f64,

    /// Mean of the Normal prior on the second regime mean.
    /// Default: 80.0
    pub mu2_mean: f64,

    /// Standard deviation of the Normal prior on the second regime mean.
    /// Default: 20.0
    pub mu2_sd: f64,

    /// Rate of the Exponential prior on the shared noise scale.
    /// Default: 1.0
    pub sigma_rate: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            mu1_mean: 40.0,
            mu1_sd: 20.0,
            mu2_mean: 80.0,
            mu2_sd: 20.0,
            sigma_rate: 1.0,
        }
    }
}

impl Priors {
    /// Check that every hyperparameter is finite and every scale strictly
    /// positive.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mu1_mean", self.mu1_mean),
            ("mu1_sd", self.mu1_sd),
            ("mu2_mean", self.mu2_mean),
            ("mu2_sd", self.mu2_sd),
            ("sigma_rate", self.sigma_rate),
        ] {
            if !value.is_finite() {
                return Err(Error::Configuration(format!(
                    "prior hyperparameter {name} must be finite, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("mu1_sd", self.mu1_sd),
            ("mu2_sd", self.mu2_sd),
            ("sigma_rate", self.sigma_rate),
        ] {
            if value <= 0.0 {
                return Err(Error::Configuration(format!(
                    "prior hyperparameter {name} must be > 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Count and sum of the observations on each side of a candidate split.
///
/// Side 1 covers indices `0..tau`, side 2 covers `tau..N`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitSums {
    pub n1: usize,
    pub sum1: f64,
    pub n2: usize,
    pub sum2: f64,
}

/// The change-point model bound to a borrowed observation sequence.
///
/// The sequence is validated once at construction (length and finiteness)
/// and never mutated; all densities and sufficient statistics are pure
/// functions of the borrowed data and the current parameter state.
#[derive(Debug, Clone)]
pub struct ChangePointModel<'a> {
    data: &'a [f64],
    priors: Priors,
    total_sum: f64,
    total_sum_sq: f64,
}

impl<'a> ChangePointModel<'a> {
    /// Bind the model to an observation sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the sequence has fewer than 3
    /// observations, contains a non-finite value, or the priors are invalid.
    pub fn new(data: &'a [f64], priors: Priors) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::Configuration(format!(
                "observation sequence must have at least 3 points, got {}",
                data.len()
            )));
        }
        if let Some(i) = data.iter().position(|x| !x.is_finite()) {
            return Err(Error::Configuration(format!(
                "observation {i} is not finite ({})",
                data[i]
            )));
        }
        priors.validate()?;

        let total_sum = data.iter().sum();
        let total_sum_sq = data.iter().map(|x| x * x).sum();
        Ok(Self {
            data,
            priors,
            total_sum,
            total_sum_sq,
        })
    }

    /// Number of observations `N`.
    pub fn n_obs(&self) -> usize {
        self.data.len()
    }

    /// The borrowed observation sequence.
    pub fn values(&self) -> &'a [f64] {
        self.data
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    /// Sum and sum-of-squares over the whole sequence, precomputed at
    /// construction for the incremental split scans.
    pub(crate) fn totals(&self) -> (f64, f64) {
        (self.total_sum, self.total_sum_sq)
    }

    /// Unnormalized log posterior density of a parameter state.
    ///
    /// Sum of the four log-prior terms and the per-observation Gaussian
    /// log-likelihoods, with the regime mean selected per index. Returns
    /// negative infinity for states outside the support.
    pub fn log_joint_density(&self, draw: &Draw) -> f64 {
        let n = self.data.len();
        if draw.tau >= n || draw.sigma <= 0.0 {
            return f64::NEG_INFINITY;
        }

        let p = &self.priors;
        let mut lp = -(n as f64).ln(); // tau ~ DiscreteUniform(0, N-1)
        lp += normal_logpdf(draw.mu1, p.mu1_mean, p.mu1_sd);
        lp += normal_logpdf(draw.mu2, p.mu2_mean, p.mu2_sd);
        lp += p.sigma_rate.ln() - p.sigma_rate * draw.sigma;

        let mut sum_sq = 0.0;
        for (i, &x) in self.data.iter().enumerate() {
            let mu = if i < draw.tau { draw.mu1 } else { draw.mu2 };
            let r = x - mu;
            sum_sq += r * r;
        }
        lp - (n as f64) * (0.5 * LN_2PI + draw.sigma.ln())
            - sum_sq / (2.0 * draw.sigma * draw.sigma)
    }

    /// Count and sum of observations on each side of `tau`.
    ///
    /// One pass over the shorter-than-`tau` prefix; the second side is
    /// derived from the precomputed total.
    pub fn split_sums(&self, tau: usize) -> SplitSums {
        debug_assert!(tau <= self.data.len());
        let sum1: f64 = self.data[..tau].iter().sum();
        SplitSums {
            n1: tau,
            sum1,
            n2: self.data.len() - tau,
            sum2: self.total_sum - sum1,
        }
    }

    /// Draw an initial parameter state from the priors.
    pub fn draw_from_priors(&self, rng: &mut StdRng) -> Result<Draw> {
        let p = &self.priors;
        let mu1 = normal_dist(p.mu1_mean, p.mu1_sd)?.sample(rng);
        let mu2 = normal_dist(p.mu2_mean, p.mu2_sd)?.sample(rng);
        let sigma = Exp::new(p.sigma_rate)
            .map_err(|e| Error::Configuration(format!("sigma prior: {e}")))?
            .sample(rng);
        Ok(Draw {
            tau: rng.gen_range(0..self.data.len()),
            mu1,
            mu2,
            sigma,
        })
    }
}

/// Gaussian log-density at `x`.
pub(crate) fn normal_logpdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * LN_2PI - sd.ln() - 0.5 * z * z
}

/// Build a `rand_distr` Normal, mapping the (validated-unreachable)
/// construction failure into a configuration error.
pub(crate) fn normal_dist(mean: f64, sd: f64) -> Result<Normal<f64>> {
    Normal::new(mean, sd).map_err(|e| Error::Configuration(format!("normal({mean}, {sd}): {e}")))
}
