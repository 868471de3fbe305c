//! Read-only queries over the combined posterior sample set.
//!
//! [`PosteriorDraws`] flattens every chain's retained draws into one
//! exchangeable sample from the joint posterior. The accessors are pure:
//! point estimates, quantile credible intervals, and the regime-shift
//! quantities downstream reports are built from.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::chain::{Draw, Parameter};
use crate::diagnostics::{mean, quantile, sample_var, validate_ci_width};
use crate::errors::{Error, Result};

/// Concatenated post-tuning draws across all chains.
///
/// Guaranteed non-empty: a validated run always retains at least one draw,
/// and direct construction rejects an empty set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraws {
    draws: Vec<Draw>,
}

impl PosteriorDraws {
    /// Wrap an existing sample set, e.g. draws deserialized from storage.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `draws` is empty.
    pub fn new(draws: Vec<Draw>) -> Result<Self> {
        if draws.is_empty() {
            return Err(Error::Configuration(
                "posterior sample set must not be empty".to_string(),
            ));
        }
        Ok(Self { draws })
    }

    /// Total number of draws, `chains * sampling_iterations` for a full run.
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    /// One parameter's draws as an array.
    pub fn series(&self, param: Parameter) -> Array1<f64> {
        self.draws.iter().map(|d| d.value(param)).collect()
    }

    /// All draws as a matrix of shape `(len, 4)`, columns in reporting
    /// order (tau, mu1, mu2, sigma).
    pub fn draw_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.draws.len(), Parameter::ALL.len()));
        for (row, draw) in self.draws.iter().enumerate() {
            for (col, &p) in Parameter::ALL.iter().enumerate() {
                matrix[[row, col]] = draw.value(p);
            }
        }
        matrix
    }

    /// Posterior mean.
    pub fn mean(&self, param: Parameter) -> f64 {
        mean(&self.values(param))
    }

    /// Posterior standard deviation (sample variance, `n - 1` divisor).
    /// Zero for a single draw.
    pub fn sd(&self, param: Parameter) -> f64 {
        let values = self.values(param);
        if values.len() < 2 {
            return 0.0;
        }
        let m = mean(&values);
        sample_var(&values, m).sqrt()
    }

    /// Posterior median.
    pub fn median(&self, param: Parameter) -> f64 {
        quantile(&self.sorted(param), 0.5)
    }

    /// Equal-tailed credible interval containing `width` posterior mass.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] unless `width` lies in `(0, 1)`.
    pub fn credible_interval(&self, param: Parameter, width: f64) -> Result<(f64, f64)> {
        validate_ci_width(width)?;
        let sorted = self.sorted(param);
        let tail = (1.0 - width) / 2.0;
        Ok((quantile(&sorted, tail), quantile(&sorted, 1.0 - tail)))
    }

    /// The posterior median of `tau`, rounded to the nearest integer index.
    ///
    /// An even draw count can put the median halfway between two indices;
    /// rounding keeps the estimate inside the range of sampled indices.
    pub fn point_estimate_index(&self) -> usize {
        self.median(Parameter::Tau).round() as usize
    }

    /// Posterior mean of the per-draw regime difference `mu2 - mu1`.
    pub fn mean_shift(&self) -> f64 {
        let diffs: Vec<f64> = self.draws.iter().map(|d| d.mu2 - d.mu1).collect();
        mean(&diffs)
    }

    /// Relative size of the shift, `(mean(mu2) - mean(mu1)) / mean(mu1)`,
    /// as a fraction. Meaningful only when the first regime mean is well
    /// away from zero.
    pub fn relative_shift(&self) -> f64 {
        let m1 = self.mean(Parameter::Mu1);
        (self.mean(Parameter::Mu2) - m1) / m1
    }

    fn values(&self, param: Parameter) -> Vec<f64> {
        self.draws.iter().map(|d| d.value(param)).collect()
    }

    fn sorted(&self, param: Parameter) -> Vec<f64> {
        let mut values = self.values(param);
        values.sort_unstable_by(f64::total_cmp);
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn posterior(rows: &[(usize, f64, f64, f64)]) -> PosteriorDraws {
        PosteriorDraws::new(
            rows.iter()
                .map(|&(tau, mu1, mu2, sigma)| Draw {
                    tau,
                    mu1,
                    mu2,
                    sigma,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_an_empty_sample_set() {
        assert!(PosteriorDraws::new(Vec::new()).is_err());
    }

    #[test]
    fn point_estimates_on_known_draws() {
        let p = posterior(&[
            (3, 1.0, 5.0, 0.5),
            (4, 2.0, 6.0, 0.5),
            (4, 3.0, 7.0, 0.5),
            (5, 4.0, 8.0, 0.5),
        ]);

        assert!(is_close!(p.mean(Parameter::Mu1), 2.5));
        assert!(is_close!(p.median(Parameter::Mu1), 2.5));
        assert!(is_close!(p.median(Parameter::Tau), 4.0));
        // Sample sd of 1..=4.
        assert!(is_close!(p.sd(Parameter::Mu1), (5.0f64 / 3.0).sqrt()));
    }

    #[test]
    fn point_estimate_index_rounds_half_draws_up() {
        let p = posterior(&[
            (1, 0.0, 0.0, 1.0),
            (2, 0.0, 0.0, 1.0),
            (3, 0.0, 0.0, 1.0),
            (4, 0.0, 0.0, 1.0),
        ]);
        // Median of 1,2,3,4 is 2.5; rounds to the sampled index 3.
        assert_eq!(p.point_estimate_index(), 3);

        let p = posterior(&[(5, 0.0, 0.0, 1.0), (5, 0.0, 0.0, 1.0), (7, 0.0, 0.0, 1.0)]);
        assert_eq!(p.point_estimate_index(), 5);
    }

    #[test]
    fn credible_interval_validates_width_and_brackets_the_mean() {
        let draws: Vec<(usize, f64, f64, f64)> =
            (0..100).map(|i| (1, i as f64, 0.0, 1.0)).collect();
        let p = posterior(&draws);

        assert!(p.credible_interval(Parameter::Mu1, 0.0).is_err());
        assert!(p.credible_interval(Parameter::Mu1, 1.0).is_err());
        assert!(p.credible_interval(Parameter::Mu1, -0.5).is_err());
        assert!(p.credible_interval(Parameter::Mu1, f64::NAN).is_err());

        let (lo, hi) = p.credible_interval(Parameter::Mu1, 0.94).unwrap();
        let m = p.mean(Parameter::Mu1);
        assert!(lo < m && m < hi, "[{lo}, {hi}] should bracket {m}");
        assert!(is_close!(lo, 0.03 * 99.0));
        assert!(is_close!(hi, 0.97 * 99.0));
    }

    #[test]
    fn shift_accessors_quantify_the_regime_change() {
        let p = posterior(&[
            (5, 10.0, 90.0, 1.0),
            (5, 11.0, 91.0, 1.0),
            (5, 9.0, 89.0, 1.0),
        ]);
        assert!(is_close!(p.mean_shift(), 80.0));
        assert!(is_close!(p.relative_shift(), 8.0));
    }

    #[test]
    fn relative_shift_is_the_ratio_of_mean_levels() {
        // Mean levels 5 and 15: a shift of 10, twice the first level.
        // Averaging the per-draw ratios instead would give 50/9.
        let p = posterior(&[(5, 1.0, 11.0, 1.0), (5, 9.0, 19.0, 1.0)]);
        assert!(is_close!(p.relative_shift(), 2.0));
        assert!(is_close!(p.mean_shift(), 10.0));
    }

    #[test]
    fn series_and_matrix_expose_reporting_columns() {
        let p = posterior(&[(2, 1.5, 2.5, 0.7), (3, 1.6, 2.6, 0.8)]);

        assert_eq!(p.series(Parameter::Tau).to_vec(), vec![2.0, 3.0]);
        assert_eq!(p.series(Parameter::Sigma).to_vec(), vec![0.7, 0.8]);

        let m = p.draw_matrix();
        assert_eq!(m.dim(), (2, 4));
        assert_eq!(m[[0, 0]], 2.0);
        assert_eq!(m[[1, 2]], 2.6);
    }
}
