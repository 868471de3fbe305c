use thiserror::Error;

/// Error type for invalid configurations and failed sampling runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Rejected before any sampling begins: invalid counts, hyperparameters,
    /// interval widths, or an unusable observation sequence.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The log joint density of an already-accepted state evaluated to a
    /// non-finite value. This indicates a prior/likelihood misconfiguration
    /// and aborts the run.
    #[error("non-finite log joint density ({value}) for current state of chain {chain} at sweep {sweep}")]
    Numerical {
        chain: usize,
        sweep: usize,
        value: f64,
    },

    /// The caller's cancellation token was observed set.
    #[error("sampling run cancelled")]
    Cancelled,
}

/// Convenience type for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
