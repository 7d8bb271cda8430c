#![doc = include_str!("../README.md")]

mod config;
mod error;
mod feedback;
mod int;
mod merge;
mod query;
mod scope;
mod sieve;
mod source;
mod wheel;

#[cfg(test)]
mod tests;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::feedback::{FeedbackReceiver, FeedbackSender};
pub use crate::int::*;
pub use crate::merge::{CompositeMerger, CompositeSink, MergeQueue, Peekable};
pub use crate::query::*;
pub use crate::sieve::{BOOTSTRAP_PRIMES, PrimeStream, SieveState};
pub use crate::source::{Feed, Source, SourceStatus};
pub use crate::wheel::*;
