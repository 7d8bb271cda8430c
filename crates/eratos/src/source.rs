use core::future::Future;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{Error, Result, SieveInt, Spin, scope::Scope};

/// Outcome of a non-blocking read from a [`Source`].
///
/// - [`SourceStatus::Ready`] carries the next value; it has been consumed.
/// - [`SourceStatus::Pending`] means the producer has not caught up yet. The
///   source is still open; try again or fall back to [`Source::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus<T> {
    /// A value was available and has been taken.
    Ready {
        /// The value read from the source.
        value: T,
    },
    /// Nothing is available right now.
    Pending,
}

impl<T> SourceStatus<T> {
    /// Returns the value if ready.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready { value } => Some(value),
            Self::Pending => None,
        }
    }
}

/// A strictly increasing, single-reader stream of integers.
///
/// Everything the sieve merges or compares is a `Source`: the wheel walk
/// itself ([`Spin`]), the channel end of a generator task ([`Feed`]), the
/// feedback relay ([`crate::FeedbackReceiver`]) and the public
/// [`crate::PrimeStream`]. This lets the merge queue hold any of them without
/// special cases.
pub trait Source<T: SieveInt>: Send {
    /// Reads the next value without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] once the producer is gone and nothing is buffered.
    /// - Any error the producer forwarded, e.g. [`Error::Overflow`].
    fn try_next(&mut self) -> Result<SourceStatus<T>>;

    /// Waits for the next value.
    ///
    /// # Errors
    ///
    /// Same as [`Source::try_next`].
    fn next(&mut self) -> impl Future<Output = Result<T>> + Send;
}

impl<T: SieveInt> Source<T> for Spin<T> {
    fn try_next(&mut self) -> Result<SourceStatus<T>> {
        match Iterator::next(self) {
            Some(Ok(value)) => Ok(SourceStatus::Ready { value }),
            Some(Err(e)) => Err(e),
            None => Err(Error::Closed),
        }
    }

    fn next(&mut self) -> impl Future<Output = Result<T>> + Send {
        let next = match Iterator::next(self) {
            Some(item) => item,
            None => Err(Error::Closed),
        };
        core::future::ready(next)
    }
}

/// The reading end of a generator task.
///
/// Items are `Result`s so a producer can hand its fatal error downstream
/// before it exits. Dropping a `Feed` closes the channel, which the producer
/// observes on its next send.
#[derive(Debug)]
pub struct Feed<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T: SieveInt> Feed<T> {
    pub(crate) const fn new(rx: mpsc::Receiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Closes the channel. Buffered values can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl<T: SieveInt> Source<T> for Feed<T> {
    fn try_next(&mut self) -> Result<SourceStatus<T>> {
        match self.rx.try_recv() {
            Ok(item) => item.map(|value| SourceStatus::Ready { value }),
            Err(TryRecvError::Empty) => Ok(SourceStatus::Pending),
            Err(TryRecvError::Disconnected) => Err(Error::Closed),
        }
    }

    fn next(&mut self) -> impl Future<Output = Result<T>> + Send {
        async move { self.rx.recv().await.unwrap_or(Err(Error::Closed)) }
    }
}

/// Runs `iter` in its own task, buffering up to `capacity` values ahead of
/// the reader.
///
/// The task stops when the iterator yields an error (after forwarding it),
/// when the returned [`Feed`] is dropped, or when the pipeline is cancelled.
pub(crate) fn spawn_source<T, I>(
    scope: &Scope,
    stage: &'static str,
    iter: I,
    capacity: usize,
) -> Feed<T>
where
    T: SieveInt,
    I: Iterator<Item = Result<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    scope.spawn(generator_loop(stage, iter, tx, scope.clone()));
    Feed::new(rx)
}

#[allow(clippy::used_underscore_binding)]
async fn generator_loop<T, I>(
    _stage: &'static str,
    iter: I,
    tx: mpsc::Sender<Result<T>>,
    scope: Scope,
) where
    T: SieveInt,
    I: Iterator<Item = Result<T>>,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("{_stage} generator started");

    for item in iter {
        let fatal = item.is_err();

        #[cfg(feature = "tracing")]
        {
            if let Err(e) = &item {
                tracing::warn!("{_stage} generator failed: {e}");
            }
        }

        tokio::select! {
            biased;
            () = scope.token().cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    // Reader dropped its end.
                    break;
                }
            }
        }

        if fatal {
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("{_stage} generator stopped");
}
