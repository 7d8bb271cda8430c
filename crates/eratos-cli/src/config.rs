use anyhow::bail;
use clap::Parser;
use eratos::SieveConfig;

/// Command-line arguments for the `eratos` binary.
///
/// Every tuning knob can also be set through an environment variable (or a
/// `.env` file); flags win over the environment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "eratos",
    version,
    about = "Print all primes <= N, or only the Nth prime, using a concurrent merge sieve"
)]
pub struct CliArgs {
    /// Upper bound (inclusive), or the ordinal when `--nth` is given.
    pub n: u64,

    /// Print only the Nth prime (1-indexed) instead of every prime <= N.
    #[arg(short, long, default_value_t = false)]
    pub nth: bool,

    /// Number of runtime worker threads.
    ///
    /// Sieve stages are independent tasks and may run in parallel, but the
    /// control loop is sequential, so returns diminish quickly. Defaults to
    /// the number of logical CPUs.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub workers: Option<usize>,

    /// Capacity of the wheel candidate stream.
    ///
    /// Environment variable: `CANDIDATE_BUFFER`
    #[arg(long, env = "CANDIDATE_BUFFER", default_value_t = SieveConfig::default().candidate_buffer)]
    pub candidate_buffer: usize,

    /// Capacity of each per-prime multiples stream.
    ///
    /// Environment variable: `MULTIPLE_BUFFER`
    #[arg(long, env = "MULTIPLE_BUFFER", default_value_t = SieveConfig::default().multiple_buffer)]
    pub multiple_buffer: usize,

    /// Capacity of the merged composite stream.
    ///
    /// Environment variable: `COMPOSITE_BUFFER`
    #[arg(long, env = "COMPOSITE_BUFFER", default_value_t = SieveConfig::default().composite_buffer)]
    pub composite_buffer: usize,

    /// Number of primes buffered ahead of the printer.
    ///
    /// Environment variable: `OUTPUT_BUFFER`
    #[arg(long, env = "OUTPUT_BUFFER", default_value_t = SieveConfig::default().output_buffer)]
    pub output_buffer: usize,

    /// Capacity of the bounded side of the feedback relay. The relay itself
    /// is unbounded.
    ///
    /// Environment variable: `FEEDBACK_BUFFER`
    #[arg(long, env = "FEEDBACK_BUFFER", default_value_t = SieveConfig::default().feedback_buffer)]
    pub feedback_buffer: usize,
}

/// What to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Every prime `<=` the bound.
    UpTo(u64),
    /// Only the prime with this 1-indexed ordinal.
    Nth(u64),
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub query: Query,
    pub workers: usize,
    pub sieve: SieveConfig,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let workers = args.workers.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        let query = if args.nth {
            if args.n == 0 {
                bail!("the Nth prime is 1-indexed; N must be at least 1");
            }
            Query::Nth(args.n)
        } else {
            Query::UpTo(args.n)
        };

        let sieve = SieveConfig::default()
            .with_candidate_buffer(args.candidate_buffer)
            .with_multiple_buffer(args.multiple_buffer)
            .with_composite_buffer(args.composite_buffer)
            .with_output_buffer(args.output_buffer)
            .with_feedback_buffer(args.feedback_buffer);
        sieve.validate()?;

        Ok(Self {
            query,
            workers,
            sieve,
        })
    }
}
