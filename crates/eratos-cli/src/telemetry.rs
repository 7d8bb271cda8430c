//! Logging setup for the `eratos` binary.
//!
//! Primes go to stdout, so every log line goes to stderr. The filter defaults
//! to `warn` and can be overridden with `RUST_LOG`, for example:
//!
//! ```bash
//! RUST_LOG=eratos=debug eratos 1000000 > /dev/null
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        )
        .try_init()?;

    Ok(())
}
