//! Error types for the sampling engine.

use thiserror::Error;

/// Engine error type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ModelError {
    /// Configuration error, reported at initialization.
    #[error("configuration error: {0}")]
    Config(String),

    /// A toponym present in the corpus has no candidate regions.
    #[error("toponym {toponym} has an empty candidate-region filter")]
    EmptyFilter {
        /// Vocabulary id of the offending toponym.
        toponym: u32,
    },

    /// One or more tokens produced an all-zero probability vector
    /// during a training sweep.
    #[error("degenerate sampling: {tokens} token(s) had zero candidate mass in sweep {sweep}")]
    SamplingDegenerate {
        /// Sweep index (0-based) in which the counter was observed.
        sweep: usize,
        /// Number of affected token resamples in that sweep.
        tokens: usize,
    },

    /// Decode was requested before any posterior samples were collected.
    #[error("no posterior samples collected; run training with sampling iterations first")]
    NoSamples,

    /// Malformed input or run file.
    #[error("format error in {path}: {reason}")]
    Format {
        /// File the error was found in.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
