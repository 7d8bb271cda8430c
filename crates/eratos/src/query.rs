//! The two questions callers ask of the stream: "all primes up to N" and
//! "the Kth prime". Both open a pipeline, read what they need and shut it
//! down before returning.

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, PrimeStream, Result, SieveConfig, SieveInt, Source};

/// Returns every prime `<= bound`, in increasing order.
///
/// # Errors
///
/// [`Error::InvalidConfig`] for a rejected `config`. A `bound` near the top of
/// `T` is fine: once the stream overflows, every prime in `T` has been read.
///
/// # Example
/// ```
/// use eratos::{SieveConfig, primes_up_to};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> eratos::Result<()> {
/// let primes = primes_up_to(30_u32, SieveConfig::default()).await?;
/// assert_eq!(primes, [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
/// # Ok(())
/// # }
/// ```
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(config)))]
pub async fn primes_up_to<T: SieveInt>(bound: T, config: SieveConfig) -> Result<Vec<T>> {
    let mut stream = PrimeStream::open(config)?;
    let mut primes = Vec::new();

    let result = loop {
        match stream.next().await {
            Ok(p) if p <= bound => primes.push(p),
            Ok(_) | Err(Error::Overflow { .. }) => break Ok(primes),
            Err(e) => break Err(e),
        }
    };

    stream.shutdown().await;
    result
}

/// Returns the `k`th prime, 1-indexed: `nth_prime(1)` is 2.
///
/// # Errors
///
/// - [`Error::InvalidOrdinal`] for `k == 0`.
/// - [`Error::InvalidConfig`] for a rejected `config`.
/// - [`Error::Overflow`] if the `k`th prime is out of range for `T`.
///
/// # Example
/// ```
/// use eratos::{SieveConfig, nth_prime};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> eratos::Result<()> {
/// assert_eq!(nth_prime::<u32>(1000, SieveConfig::default()).await?, 7919);
/// # Ok(())
/// # }
/// ```
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(config)))]
pub async fn nth_prime<T: SieveInt>(k: u64, config: SieveConfig) -> Result<T> {
    if k == 0 {
        return Err(Error::InvalidOrdinal);
    }

    let mut stream = PrimeStream::open(config)?;
    let mut result = Err(Error::Closed);
    for _ in 0..k {
        result = stream.next().await;
        if result.is_err() {
            break;
        }
    }

    stream.shutdown().await;
    result
}
