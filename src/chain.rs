//! Storage for sampled parameter states.
//!
//! A [`Draw`] is one accepted parameter state, a [`Chain`] is the ordered
//! retained draws of one independent chain plus its bookkeeping, and a
//! [`Trace`] gathers every finished chain of a run. All three serialize via
//! serde so callers can persist or render them; nothing here performs I/O.

use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// The scalar quantities sampled by the engine, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Change-point index.
    Tau,
    /// Mean of the first regime (indices below tau).
    Mu1,
    /// Mean of the second regime (indices at or above tau).
    Mu2,
    /// Shared observation noise scale.
    Sigma,
}

impl Parameter {
    /// All parameters in reporting order.
    pub const ALL: [Parameter; 4] = [
        Parameter::Tau,
        Parameter::Mu1,
        Parameter::Mu2,
        Parameter::Sigma,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Tau => "tau",
            Parameter::Mu1 => "mu1",
            Parameter::Mu2 => "mu2",
            Parameter::Sigma => "sigma",
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One parameter state: the sampler's position after a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    /// Change-point index, always in `[0, N-1]`.
    pub tau: usize,
    /// First regime mean.
    pub mu1: f64,
    /// Second regime mean.
    pub mu2: f64,
    /// Shared noise scale, always strictly positive.
    pub sigma: f64,
}

impl Draw {
    /// The value of one scalar component (`tau` cast to a float).
    pub fn value(&self, param: Parameter) -> f64 {
        match param {
            Parameter::Tau => self.tau as f64,
            Parameter::Mu1 => self.mu1,
            Parameter::Mu2 => self.mu2,
            Parameter::Sigma => self.sigma,
        }
    }
}

/// Retained draws and bookkeeping of one independent chain.
///
/// Append-only while the chain runs; immutable once sampling ends. Retained
/// draws are exclusively post-tuning states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Chain index within the run, `0..chains`.
    id: usize,
    /// Seed of this chain's generator.
    seed: u64,
    /// Retained post-tuning draws, in sweep order.
    draws: Vec<Draw>,
    /// Accepted sigma Metropolis proposals (tuning and sampling phases).
    sigma_accepted: usize,
    /// Total sigma Metropolis proposals (tuning and sampling phases).
    sigma_proposed: usize,
}

impl Chain {
    pub(crate) fn new(id: usize, seed: u64, capacity: usize) -> Self {
        Self {
            id,
            seed,
            draws: Vec::with_capacity(capacity),
            sigma_accepted: 0,
            sigma_proposed: 0,
        }
    }

    pub(crate) fn push(&mut self, draw: Draw) {
        self.draws.push(draw);
    }

    pub(crate) fn record_sigma(&mut self, accepted: bool) {
        self.sigma_proposed += 1;
        if accepted {
            self.sigma_accepted += 1;
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of retained draws.
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Retained draws in sweep order.
    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    /// Fraction of sigma proposals accepted across both phases.
    ///
    /// Returns 0.0 before any proposal has been made.
    pub fn acceptance_rate(&self) -> f64 {
        if self.sigma_proposed > 0 {
            self.sigma_accepted as f64 / self.sigma_proposed as f64
        } else {
            0.0
        }
    }

    /// One parameter's retained draws as an array.
    pub fn series(&self, param: Parameter) -> Array1<f64> {
        self.draws.iter().map(|d| d.value(param)).collect()
    }
}

/// Every finished chain of one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    chains: Vec<Chain>,
    /// Credible-interval mass used by [`Trace::summary`](crate::diagnostics),
    /// echoed from the run configuration.
    ci_width: f64,
}

impl Trace {
    pub(crate) fn new(chains: Vec<Chain>, ci_width: f64) -> Self {
        Self { chains, ci_width }
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Retained draws per chain (identical across chains by construction).
    pub fn draws_per_chain(&self) -> usize {
        self.chains.first().map_or(0, Chain::len)
    }

    /// Total retained draws across all chains.
    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(Chain::len).sum()
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn ci_width(&self) -> f64 {
        self.ci_width
    }

    /// One parameter's draws per chain, for cross-chain diagnostics.
    pub fn chain_series(&self, param: Parameter) -> Vec<Array1<f64>> {
        self.chains.iter().map(|c| c.series(param)).collect()
    }

    /// Map from parameter to its draws concatenated across chains, in
    /// reporting order.
    pub fn to_param_map(&self) -> IndexMap<Parameter, Array1<f64>> {
        Parameter::ALL
            .iter()
            .map(|&p| {
                let series = self
                    .chains
                    .iter()
                    .flat_map(|c| c.draws.iter().map(move |d| d.value(p)))
                    .collect();
                (p, series)
            })
            .collect()
    }

    /// All retained draws concatenated in chain order, as a matrix of shape
    /// `(total_draws, 4)` with columns in reporting order.
    pub fn flat_samples(&self) -> Array2<f64> {
        let mut flat = Array2::zeros((self.total_draws(), Parameter::ALL.len()));
        let mut row = 0;
        for chain in &self.chains {
            for draw in &chain.draws {
                for (col, &p) in Parameter::ALL.iter().enumerate() {
                    flat[[row, col]] = draw.value(p);
                }
                row += 1;
            }
        }
        flat
    }

    /// Flatten into the combined posterior sample set.
    ///
    /// # Errors
    ///
    /// [`Error`](crate::errors::Error) if the trace holds no draws; a trace
    /// produced by a validated run always holds at least one.
    pub fn posterior(&self) -> crate::errors::Result<crate::posterior::PosteriorDraws> {
        let draws = self
            .chains
            .iter()
            .flat_map(|c| c.draws.iter().copied())
            .collect();
        crate::posterior::PosteriorDraws::new(draws)
    }
}
