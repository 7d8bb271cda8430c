use crate::{Error, Result};

/// Channel capacities for one sieve pipeline.
///
/// Every stream except the feedback path is bounded; these values decide how
/// far each producer may run ahead of its reader. Larger buffers hide task
/// scheduling latency at the cost of memory. The feedback path is unbounded
/// regardless: `feedback_buffer` only bounds the relay's output side and
/// `feedback_initial_capacity` is where its ring buffer starts growing from.
///
/// # Example
/// ```
/// use eratos::SieveConfig;
///
/// let config = SieveConfig::default()
///     .with_composite_buffer(16_384)
///     .with_output_buffer(64);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SieveConfig {
    /// Capacity of the wheel candidate stream.
    pub candidate_buffer: usize,
    /// Capacity of each per-prime multiples stream.
    pub multiple_buffer: usize,
    /// Capacity of the merged composite stream.
    pub composite_buffer: usize,
    /// Capacity of the public prime stream.
    pub output_buffer: usize,
    /// Capacity of the bounded side of the feedback relay.
    pub feedback_buffer: usize,
    /// Initial ring size of the feedback relay. Doubles when full.
    pub feedback_initial_capacity: usize,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            candidate_buffer: 1024,
            multiple_buffer: 1024,
            composite_buffer: 8192,
            output_buffer: 1024,
            feedback_buffer: 1024,
            feedback_initial_capacity: 1024,
        }
    }
}

impl SieveConfig {
    #[must_use]
    pub const fn with_candidate_buffer(mut self, capacity: usize) -> Self {
        self.candidate_buffer = capacity;
        self
    }

    #[must_use]
    pub const fn with_multiple_buffer(mut self, capacity: usize) -> Self {
        self.multiple_buffer = capacity;
        self
    }

    #[must_use]
    pub const fn with_composite_buffer(mut self, capacity: usize) -> Self {
        self.composite_buffer = capacity;
        self
    }

    #[must_use]
    pub const fn with_output_buffer(mut self, capacity: usize) -> Self {
        self.output_buffer = capacity;
        self
    }

    #[must_use]
    pub const fn with_feedback_buffer(mut self, capacity: usize) -> Self {
        self.feedback_buffer = capacity;
        self
    }

    #[must_use]
    pub const fn with_feedback_initial_capacity(mut self, capacity: usize) -> Self {
        self.feedback_initial_capacity = capacity;
        self
    }

    /// Checks that every capacity can back a channel.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] naming the first zero capacity.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("candidate_buffer", self.candidate_buffer),
            ("multiple_buffer", self.multiple_buffer),
            ("composite_buffer", self.composite_buffer),
            ("output_buffer", self.output_buffer),
            ("feedback_buffer", self.feedback_buffer),
            ("feedback_initial_capacity", self.feedback_initial_capacity),
        ];

        for (name, value) in fields {
            if value == 0 {
                return Err(Error::InvalidConfig {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }
        Ok(())
    }
}
