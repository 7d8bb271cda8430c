//! Error types for the sieve pipeline.
//!
//! ## Error Cases
//! - `Overflow`: the candidate walk left the range of the sieve's integer type,
//!   so every prime it can hold has been produced. Fatal for the pipeline.
//!   Inside the merger, a multiples stream overflowing only means it is
//!   finished.
//! - `Closed`: the other end of a stream is gone. Expected during shutdown and
//!   treated as a normal termination signal by every task.
//! - `NotWheelPrime`: a multiples generator was requested for a value that the
//!   2·3·5·7 wheel already excludes.
//! - `InvalidConfig`: a [`crate::SieveConfig`] that cannot build a pipeline.
//! - `InvalidOrdinal`: the Kth-prime query was asked for `k == 0`.

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the sieve can produce.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A generator stepped past the largest value of the integer type.
    #[error("integer overflow in {stage} generator")]
    Overflow { stage: &'static str },

    /// The producer or consumer of a stream has shut down.
    #[error("stream closed")]
    Closed,

    /// No multiples generator exists for a value sharing a factor with 210.
    #[error("{value} is not coprime to 2, 3, 5 and 7")]
    NotWheelPrime { value: u64 },

    /// The pipeline configuration was rejected.
    #[error("invalid sieve configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Prime ordinals start at 1.
    #[error("prime ordinals are 1-indexed")]
    InvalidOrdinal,
}

impl Error {
    /// Returns `true` for errors that only signal an orderly shutdown.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
