//! Bayesian single change-point detection for univariate series.
//!
//! Given an ordered sequence of real-valued observations, this crate infers
//! where the generating process's mean shifted, the two regime means, and
//! the shared noise scale, as a posterior sample set with calibrated
//! uncertainty rather than a single estimate.
//!
//! The engine is a problem-specific MCMC sampler rather than a call into a
//! probabilistic-programming library: the discrete change point and the two
//! regime means are drawn exactly from their full conditionals, and the
//! noise scale moves by a log-scale random-walk Metropolis step. Multiple
//! independent seeded chains run in parallel and feed split-chain
//! convergence diagnostics.
//!
//! # Quick start
//!
//! ```
//! use stepchange::{sample, SamplerConfig};
//!
//! // A synthetic series with a level shift at index 20.
//! let data: Vec<f64> = (0..40)
//!     .map(|i| {
//!         let level = if i < 20 { 5.0 } else { 12.0 };
//!         level + 0.1 * (i % 3) as f64
//!     })
//!     .collect();
//!
//! let config = SamplerConfig {
//!     chains: 2,
//!     tuning_iterations: 200,
//!     sampling_iterations: 500,
//!     seed: 7,
//!     ..SamplerConfig::default()
//! };
//! let trace = sample(&data, config)?;
//!
//! let posterior = trace.posterior()?;
//! assert_eq!(posterior.len(), 1000);
//! assert!((18..=22).contains(&posterior.point_estimate_index()));
//!
//! let summary = trace.summary();
//! assert_eq!(summary.n_chains, 2);
//! # Ok::<(), stepchange::Error>(())
//! ```
//!
//! # Module organisation
//!
//! Data flows strictly upward through the modules:
//! - [`model`]: priors, likelihood, and the joint log density.
//! - [`sampler`]: the single-chain Gibbs-within-Metropolis kernel.
//! - [`chain`]: retained draws and per-chain bookkeeping.
//! - [`runner`]: configuration, validation, parallel chains, cancellation.
//! - [`diagnostics`]: split-chain R-hat, effective sample size, summaries.
//! - [`posterior`]: typed accessors over the combined draws.
//!
//! # Scope
//!
//! The crate is a pure in-memory library. Loading data, rendering charts or
//! tables, and serving results live with the caller; every output type
//! derives serde so those collaborators can persist it in whatever format
//! they choose.

pub mod chain;
pub mod diagnostics;
pub mod model;
pub mod posterior;
pub mod runner;
pub mod sampler;

pub mod errors;

pub use chain::{Chain, Draw, Parameter, Trace};
pub use diagnostics::{ParameterSummary, Summary};
pub use errors::{Error, Result};
pub use model::{ChangePointModel, Priors};
pub use posterior::PosteriorDraws;
pub use runner::{sample, CancelToken, ChainInit, ChainRunner, SamplerConfig};
