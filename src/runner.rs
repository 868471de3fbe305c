//! Multi-chain orchestration: configuration, validation, parallel execution.
//!
//! A run is fully described by a [`SamplerConfig`] plus the observation
//! sequence. [`ChainRunner::new`] validates everything up front: an invalid
//! configuration is rejected before any sampling begins, never discovered
//! mid-run. Chains are independent and embarrassingly parallel: each owns
//! its seeded generator and kernel state, shares only the read-only model,
//! and is gathered in index order, so a run's output depends on its seed and
//! nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::chain::{Chain, Draw, Trace};
use crate::diagnostics::validate_ci_width;
use crate::errors::{Error, Result};
use crate::model::{ChangePointModel, Priors};
use crate::sampler::ChainSampler;

/// Stride between consecutive chains' generator seeds. Odd, so the derived
/// seeds never collide for any base seed and chain count.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Sigma acceptance rates outside this band trigger a warning after the run.
const ACCEPTANCE_BAND: (f64, f64) = (0.10, 0.80);

/// Initial-state policy for the chains of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainInit {
    /// Each chain draws its start from the priors with its own generator,
    /// so differing seeds give differing starting points.
    FromPrior,

    /// One explicit starting state per chain, e.g. deliberately
    /// overdispersed starts for a convergence check.
    Explicit(Vec<Draw>),
}

impl Default for ChainInit {
    fn default() -> Self {
        ChainInit::FromPrior
    }
}

/// Configuration of a sampling run.
///
/// Plain serde data with documented defaults; [`SamplerConfig::validate`]
/// enforces every bound listed on the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of independent chains, at least 1.
    /// Default: 2
    pub chains: usize,

    /// Sweeps discarded as tuning before retention begins.
    /// Default: 1000
    pub tuning_iterations: usize,

    /// Retained sweeps per chain, at least 1.
    /// Default: 1000
    pub sampling_iterations: usize,

    /// Base seed. Chain `i` runs its generator from
    /// [`seed_for_chain(i)`](SamplerConfig::seed_for_chain).
    /// Default: 0
    pub seed: u64,

    /// Prior hyperparameters of the change-point model.
    pub priors: Priors,

    /// Standard deviation of the log-scale sigma innovation, finite and > 0.
    /// The default targets a 30-50% acceptance rate on data of the scale the
    /// default priors describe.
    /// Default: 0.3
    pub step_scale: f64,

    /// Mass of the equal-tailed credible intervals in summaries, in (0, 1).
    /// Default: 0.94
    pub ci_width: f64,

    /// Initial-state policy.
    /// Default: `FromPrior`
    pub init: ChainInit,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 2,
            tuning_iterations: 1000,
            sampling_iterations: 1000,
            seed: 0,
            priors: Priors::default(),
            step_scale: 0.3,
            ci_width: 0.94,
            init: ChainInit::FromPrior,
        }
    }
}

impl SamplerConfig {
    /// Deterministic generator seed of chain `index`.
    pub fn seed_for_chain(&self, index: usize) -> u64 {
        self.seed
            .wrapping_add((index as u64).wrapping_mul(SEED_STRIDE))
    }

    /// Check every field bound.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return Err(Error::Configuration(
                "number of chains must be at least 1, got 0".to_string(),
            ));
        }
        if self.sampling_iterations == 0 {
            return Err(Error::Configuration(
                "sampling_iterations must be at least 1, got 0".to_string(),
            ));
        }
        if !(self.step_scale.is_finite() && self.step_scale > 0.0) {
            return Err(Error::Configuration(format!(
                "step_scale must be finite and > 0, got {}",
                self.step_scale
            )));
        }
        validate_ci_width(self.ci_width)?;
        self.priors.validate()?;
        if let ChainInit::Explicit(states) = &self.init {
            if states.len() != self.chains {
                return Err(Error::Configuration(format!(
                    "explicit init provides {} states, expected one per chain ({})",
                    states.len(),
                    self.chains
                )));
            }
        }
        Ok(())
    }
}

/// Cloneable cancellation flag shared between a running sampler and its
/// caller. Every chain checks it once per sweep, so a cancelled run stops
/// within one sweep's worth of work per chain.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run holding this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Executes the configured number of independent chains over one
/// observation sequence.
#[derive(Debug)]
pub struct ChainRunner<'a> {
    model: ChangePointModel<'a>,
    config: SamplerConfig,
}

impl<'a> ChainRunner<'a> {
    /// Validate the configuration against the observation sequence.
    ///
    /// All rejection happens here: field bounds, sequence length and
    /// finiteness, and (for explicit initial states) one in-support state
    /// per chain. A constructed runner cannot fail with a configuration
    /// error mid-run.
    pub fn new(data: &'a [f64], config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        let model = ChangePointModel::new(data, config.priors.clone())?;

        if let ChainInit::Explicit(states) = &config.init {
            for (i, state) in states.iter().enumerate() {
                if state.tau >= model.n_obs() {
                    return Err(Error::Configuration(format!(
                        "explicit init for chain {i}: tau {} outside 0..{}",
                        state.tau,
                        model.n_obs()
                    )));
                }
                if !(state.sigma.is_finite() && state.sigma > 0.0) {
                    return Err(Error::Configuration(format!(
                        "explicit init for chain {i}: sigma must be finite and > 0, got {}",
                        state.sigma
                    )));
                }
                if !state.mu1.is_finite() || !state.mu2.is_finite() {
                    return Err(Error::Configuration(format!(
                        "explicit init for chain {i}: regime means must be finite, got ({}, {})",
                        state.mu1, state.mu2
                    )));
                }
            }
        }
        Ok(Self { model, config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn model(&self) -> &ChangePointModel<'a> {
        &self.model
    }

    /// Run every chain to completion.
    pub fn run(&self) -> Result<Trace> {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Run every chain, aborting with [`Error::Cancelled`] once `cancel` is
    /// observed set.
    pub fn run_with_cancel(&self, cancel: &CancelToken) -> Result<Trace> {
        let cfg = &self.config;
        debug!(
            "sampling {} chains: {} tuning + {} retained sweeps over {} observations",
            cfg.chains,
            cfg.tuning_iterations,
            cfg.sampling_iterations,
            self.model.n_obs()
        );

        let chains = (0..cfg.chains)
            .into_par_iter()
            .map(|index| self.run_chain(index, cancel))
            .collect::<Result<Vec<Chain>>>()?;
        Ok(Trace::new(chains, cfg.ci_width))
    }

    /// One chain: tune (discard), then sample (retain).
    fn run_chain(&self, index: usize, cancel: &CancelToken) -> Result<Chain> {
        let cfg = &self.config;
        let seed = cfg.seed_for_chain(index);
        let init = match &cfg.init {
            ChainInit::FromPrior => None,
            ChainInit::Explicit(states) => Some(states[index]),
        };

        let mut sampler = ChainSampler::new(&self.model, index, seed, cfg.step_scale, init)?;
        let mut chain = Chain::new(index, seed, cfg.sampling_iterations);

        for _ in 0..cfg.tuning_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let accepted = sampler.sweep()?;
            chain.record_sigma(accepted);
        }
        for _ in 0..cfg.sampling_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let accepted = sampler.sweep()?;
            chain.record_sigma(accepted);
            chain.push(sampler.state());
        }

        let rate = chain.acceptance_rate();
        debug!("chain {index} finished with sigma acceptance rate {rate:.3}");
        if rate < ACCEPTANCE_BAND.0 || rate > ACCEPTANCE_BAND.1 {
            warn!(
                "chain {index} sigma acceptance rate {rate:.3} is outside [{}, {}]; \
                 adjust step_scale toward a 30-50% rate",
                ACCEPTANCE_BAND.0, ACCEPTANCE_BAND.1
            );
        }
        Ok(chain)
    }
}

/// Validate and run in one call: the one-stop entry point for callers that
/// do not need to hold a runner.
pub fn sample(data: &[f64], config: SamplerConfig) -> Result<Trace> {
    ChainRunner::new(data, config)?.run()
}
