use crate::config::Query;
use eratos::{PrimeStream, Source};
use std::io::{self, Write};

/// Reads from `stream` until `query` is answered, writing one prime per line.
///
/// Returns the number of lines written. The stream is left open; closing it
/// is the caller's job.
///
/// # Errors
///
/// Sieve errors (overflow) and write errors, including `BrokenPipe` when the
/// reader of stdout goes away early.
pub async fn print_primes<W: Write>(
    stream: &mut PrimeStream<u64>,
    query: Query,
    out: &mut W,
) -> anyhow::Result<u64> {
    let mut written = 0;

    match query {
        Query::UpTo(bound) => loop {
            let p = stream.next().await?;
            if p > bound {
                break;
            }
            writeln!(out, "{p}")?;
            written += 1;
        },
        Query::Nth(k) => {
            for _ in 1..k {
                stream.next().await?;
            }
            writeln!(out, "{}", stream.next().await?)?;
            written = 1;
        }
    }

    out.flush()?;
    Ok(written)
}

/// `true` if `err` only means stdout was closed under us (e.g. `| head`).
pub fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
}
