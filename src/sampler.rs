//! Single-chain Gibbs-within-Metropolis kernel for the change-point model.
//!
//! One sweep updates each parameter from its full conditional given the
//! current values of the others, in a fixed order:
//!
//! 1. `tau`: exact categorical draw. The log-likelihood of every candidate
//!    split is built from prefix sums updated in O(1) per candidate (O(N)
//!    per sweep), normalized with the log-sum-exp trick and sampled by
//!    inverse CDF. No accept/reject step, so the discrete index mixes in a
//!    single sweep even when regimes are far apart.
//! 2. `mu1`, `mu2`: exact draws from the Gaussian-conjugate conditionals
//!    (posterior precision = prior precision + n/sigma^2). An empty regime
//!    reduces to its prior.
//! 3. `sigma`: random-walk Metropolis on the log scale, which keeps the
//!    scale positive by construction; the acceptance ratio carries the
//!    log-transform Jacobian.
//!
//! # References
//!
//! Gelman, A., Carlin, J. B., Stern, H. S., Dunson, D. B., Vehtari, A., &
//! Rubin, D. B. (2013). Bayesian Data Analysis (3rd ed.), chapters 2 and 11.
//! CRC Press.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::chain::Draw;
use crate::errors::{Error, Result};
use crate::model::{normal_dist, ChangePointModel};

/// Kernel state of one independent chain: current position, private
/// generator, and the sigma proposal distribution.
#[derive(Debug)]
pub struct ChainSampler<'a> {
    model: &'a ChangePointModel<'a>,
    chain_id: usize,
    state: Draw,
    rng: StdRng,
    /// Log-scale innovation for the sigma proposal.
    innovation: Normal<f64>,
    /// Scratch buffer for the categorical tau weights, reused every sweep.
    tau_weights: Vec<f64>,
    /// Completed sweeps, for error context.
    sweeps: usize,
}

impl<'a> ChainSampler<'a> {
    /// Seed a chain at an initial state.
    ///
    /// With `init = None` the initial state is drawn from the priors using
    /// this chain's generator, so differing seeds start differing chains.
    /// The initial state's log joint density is evaluated immediately:
    /// a non-finite value aborts with [`Error::Numerical`] before the first
    /// sweep rather than several hundred iterations in.
    pub fn new(
        model: &'a ChangePointModel<'a>,
        chain_id: usize,
        seed: u64,
        step_scale: f64,
        init: Option<Draw>,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let state = match init {
            Some(draw) => draw,
            None => model.draw_from_priors(&mut rng)?,
        };
        let initial_lp = model.log_joint_density(&state);
        if !initial_lp.is_finite() {
            return Err(Error::Numerical {
                chain: chain_id,
                sweep: 0,
                value: initial_lp,
            });
        }
        Ok(Self {
            model,
            chain_id,
            state,
            rng,
            innovation: normal_dist(0.0, step_scale)?,
            tau_weights: Vec::with_capacity(model.n_obs()),
            sweeps: 0,
        })
    }

    /// Current position.
    pub fn state(&self) -> Draw {
        self.state
    }

    /// Advance the chain by one full sweep (tau, mu1, mu2, sigma).
    ///
    /// Returns whether the sigma Metropolis proposal was accepted.
    ///
    /// # Errors
    ///
    /// [`Error::Numerical`] if the log joint density of the current state is
    /// non-finite; the run cannot meaningfully continue from such a state.
    pub fn sweep(&mut self) -> Result<bool> {
        self.sweeps += 1;
        self.update_tau();
        self.update_means()?;
        self.update_sigma()
    }

    /// Exact draw of `tau` from its categorical full conditional.
    fn update_tau(&mut self) {
        let model = self.model;
        let data = model.values();
        let n = data.len();
        let (total_sum, total_sum_sq) = model.totals();
        let Draw {
            mu1, mu2, sigma, ..
        } = self.state;

        // Unnormalized log-weight of split t, keeping only t-dependent
        // terms: the flat tau prior and the Gaussian normalization are
        // shared by every candidate and cancel.
        let inv_two_var = 1.0 / (2.0 * sigma * sigma);
        let mut prefix_sum = 0.0;
        let mut prefix_sum_sq = 0.0;
        let mut max_logw = f64::NEG_INFINITY;
        self.tau_weights.clear();
        for (t, &x) in data.iter().enumerate() {
            // Residual sums of both regimes for a split at t, from the
            // prefix sums over data[..t] and the precomputed totals.
            let rss1 = prefix_sum_sq - 2.0 * mu1 * prefix_sum + t as f64 * mu1 * mu1;
            let tail_sum = total_sum - prefix_sum;
            let tail_sum_sq = total_sum_sq - prefix_sum_sq;
            let rss2 = tail_sum_sq - 2.0 * mu2 * tail_sum + (n - t) as f64 * mu2 * mu2;

            let logw = -(rss1 + rss2) * inv_two_var;
            self.tau_weights.push(logw);
            if logw > max_logw {
                max_logw = logw;
            }

            prefix_sum += x;
            prefix_sum_sq += x * x;
        }

        // Log-sum-exp: shift by the max, exponentiate, inverse-CDF draw.
        let mut total = 0.0;
        for w in self.tau_weights.iter_mut() {
            *w = (*w - max_logw).exp();
            total += *w;
        }
        let target = self.rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = n - 1;
        for (t, &w) in self.tau_weights.iter().enumerate() {
            cumulative += w;
            if cumulative >= target {
                chosen = t;
                break;
            }
        }
        self.state.tau = chosen;
    }

    /// Exact conjugate draws of both regime means given `tau` and `sigma`.
    fn update_means(&mut self) -> Result<()> {
        let model = self.model;
        let priors = model.priors();
        let split = model.split_sums(self.state.tau);
        let sigma = self.state.sigma;

        self.state.mu1 =
            self.draw_conjugate_mean(priors.mu1_mean, priors.mu1_sd, split.n1, split.sum1, sigma)?;
        self.state.mu2 =
            self.draw_conjugate_mean(priors.mu2_mean, priors.mu2_sd, split.n2, split.sum2, sigma)?;
        Ok(())
    }

    /// Draw from `Normal(post_mean, post_sd)` where the posterior combines a
    /// Normal prior with `n` same-variance Gaussian observations summing to
    /// `sum`. With `n = 0` this is exactly the prior, which is the required
    /// fallback for an empty regime.
    fn draw_conjugate_mean(
        &mut self,
        prior_mean: f64,
        prior_sd: f64,
        n: usize,
        sum: f64,
        sigma: f64,
    ) -> Result<f64> {
        let prior_precision = 1.0 / (prior_sd * prior_sd);
        let obs_precision = 1.0 / (sigma * sigma);
        let post_precision = prior_precision + n as f64 * obs_precision;
        let post_mean = (prior_mean * prior_precision + sum * obs_precision) / post_precision;
        let post_sd = post_precision.recip().sqrt();
        Ok(normal_dist(post_mean, post_sd)?.sample(&mut self.rng))
    }

    /// Random-walk Metropolis update of `sigma` on the log scale.
    fn update_sigma(&mut self) -> Result<bool> {
        let current_lp = self.model.log_joint_density(&self.state);
        if !current_lp.is_finite() {
            return Err(Error::Numerical {
                chain: self.chain_id,
                sweep: self.sweeps,
                value: current_lp,
            });
        }

        let eps = self.innovation.sample(&mut self.rng);
        let mut proposal = self.state;
        proposal.sigma = self.state.sigma * eps.exp();
        let proposal_lp = self.model.log_joint_density(&proposal);

        // Proposing on the log scale multiplies the ratio by sigma'/sigma;
        // in log space that Jacobian term is exactly eps. A non-finite
        // proposal density is an ordinary rejection, never an error.
        let log_accept = proposal_lp - current_lp + eps;
        let u: f64 = self.rng.gen();
        let accepted = proposal_lp.is_finite() && u.ln() < log_accept;
        if accepted {
            self.state = proposal;
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{normal_logpdf, Priors};
    use is_close::is_close;

    fn two_regime_data() -> Vec<f64> {
        // Sharp level shift at index 6.
        vec![
            5.1, 4.9, 5.3, 4.8, 5.0, 5.2, 9.1, 8.8, 9.2, 9.0, 8.9, 9.3,
        ]
    }

    fn sampler<'a>(
        model: &'a ChangePointModel<'a>,
        seed: u64,
        init: Option<Draw>,
    ) -> ChainSampler<'a> {
        ChainSampler::new(model, 0, seed, 0.3, init).unwrap()
    }

    /// Exact tau conditional computed the slow way: full O(N^2) rescan of the
    /// likelihood for every candidate split, normalized in probability space.
    fn brute_force_tau_probs(data: &[f64], mu1: f64, mu2: f64, sigma: f64) -> Vec<f64> {
        let logw: Vec<f64> = (0..data.len())
            .map(|t| {
                data.iter()
                    .enumerate()
                    .map(|(i, &x)| normal_logpdf(x, if i < t { mu1 } else { mu2 }, sigma))
                    .sum()
            })
            .collect();
        let max = logw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = logw.iter().map(|w| (w - max).exp()).collect();
        let total: f64 = weights.iter().sum();
        weights.iter().map(|w| w / total).collect()
    }

    #[test]
    fn tau_draw_frequencies_match_exact_conditional() {
        let data = two_regime_data();
        let model = ChangePointModel::new(&data, Priors::default()).unwrap();
        let init = Draw {
            tau: 3,
            mu1: 5.0,
            mu2: 9.0,
            sigma: 0.8,
        };
        let expected = brute_force_tau_probs(&data, init.mu1, init.mu2, init.sigma);

        let mut s = sampler(&model, 11, Some(init));
        let n_draws = 40_000;
        let mut counts = vec![0usize; data.len()];
        for _ in 0..n_draws {
            // Only the tau block runs, so its conditional (a function of the
            // fixed mu1/mu2/sigma) stays the same for every draw.
            s.update_tau();
            counts[s.state.tau] += 1;
        }

        for (t, &p) in expected.iter().enumerate() {
            let freq = counts[t] as f64 / n_draws as f64;
            assert!(
                (freq - p).abs() < 0.01,
                "split {t}: frequency {freq} vs exact {p}"
            );
        }
    }

    #[test]
    fn conjugate_mean_draws_have_posterior_moments() {
        let data = two_regime_data();
        let priors = Priors {
            mu1_mean: 3.0,
            mu1_sd: 4.0,
            ..Priors::default()
        };
        let model = ChangePointModel::new(&data, priors.clone()).unwrap();
        let init = Draw {
            tau: 6,
            mu1: 5.0,
            mu2: 9.0,
            sigma: 0.5,
        };

        // Analytic conditional for mu1 given tau = 6, sigma = 0.5.
        let split = model.split_sums(6);
        let prior_prec = 1.0 / (priors.mu1_sd * priors.mu1_sd);
        let obs_prec = 1.0 / (init.sigma * init.sigma);
        let post_prec = prior_prec + split.n1 as f64 * obs_prec;
        let post_mean = (priors.mu1_mean * prior_prec + split.sum1 * obs_prec) / post_prec;
        let post_sd = post_prec.recip().sqrt();

        let mut s = sampler(&model, 23, Some(init));
        let n_draws = 20_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..n_draws {
            s.update_means().unwrap();
            sum += s.state.mu1;
            sum_sq += s.state.mu1 * s.state.mu1;
        }
        let mean = sum / n_draws as f64;
        let sd = (sum_sq / n_draws as f64 - mean * mean).sqrt();

        assert!(
            (mean - post_mean).abs() < 4.0 * post_sd / (n_draws as f64).sqrt(),
            "mean {mean} vs analytic {post_mean}"
        );
        assert!(is_close!(sd, post_sd, rel_tol = 0.05));
    }

    #[test]
    fn empty_regime_mean_falls_back_to_prior() {
        let data = [9.0, 9.2, 8.8, 9.1];
        let priors = Priors::default();
        let model = ChangePointModel::new(&data, priors.clone()).unwrap();
        let init = Draw {
            tau: 0,
            mu1: 0.0,
            mu2: 9.0,
            sigma: 0.5,
        };

        let mut s = sampler(&model, 5, Some(init));
        let n_draws = 20_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..n_draws {
            s.update_means().unwrap();
            sum += s.state.mu1;
            sum_sq += s.state.mu1 * s.state.mu1;
        }
        let mean = sum / n_draws as f64;
        let sd = (sum_sq / n_draws as f64 - mean * mean).sqrt();

        // No observations in regime 1, so draws come from Normal(40, 20).
        assert!((mean - priors.mu1_mean).abs() < 0.6, "mean {mean}");
        assert!(is_close!(sd, priors.mu1_sd, rel_tol = 0.05));
    }

    #[test]
    fn sweeps_keep_state_in_support() {
        let data = two_regime_data();
        let model = ChangePointModel::new(&data, Priors::default()).unwrap();
        let mut s = sampler(&model, 99, None);

        let mut accepted = 0usize;
        for _ in 0..500 {
            if s.sweep().unwrap() {
                accepted += 1;
            }
            assert!(s.state.tau < data.len());
            assert!(s.state.sigma > 0.0);
            assert!(s.state.mu1.is_finite() && s.state.mu2.is_finite());
        }
        // The log-scale walk should accept some but not all proposals.
        assert!(accepted > 0 && accepted < 500, "accepted {accepted}/500");
    }

    #[test]
    fn identical_seeds_reproduce_the_same_path() {
        let data = two_regime_data();
        let model = ChangePointModel::new(&data, Priors::default()).unwrap();
        let mut a = sampler(&model, 1234, None);
        let mut b = sampler(&model, 1234, None);

        assert_eq!(a.state(), b.state());
        for _ in 0..100 {
            a.sweep().unwrap();
            b.sweep().unwrap();
            assert_eq!(a.state(), b.state());
        }
    }

    #[test]
    fn differing_seeds_start_from_differing_states() {
        let data = two_regime_data();
        let model = ChangePointModel::new(&data, Priors::default()).unwrap();
        let a = sampler(&model, 1, None);
        let b = sampler(&model, 2, None);
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn non_finite_initial_density_is_fatal() {
        let data = two_regime_data();
        let model = ChangePointModel::new(&data, Priors::default()).unwrap();
        // Finite parameters whose residuals overflow the density to -inf.
        let init = Draw {
            tau: 6,
            mu1: 1e200,
            mu2: 9.0,
            sigma: 1.0,
        };
        let err = ChainSampler::new(&model, 3, 0, 0.3, Some(init)).unwrap_err();
        assert!(matches!(err, Error::Numerical { chain: 3, sweep: 0, .. }));
    }
}
