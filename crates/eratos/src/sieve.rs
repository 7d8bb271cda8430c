//! The sieve control loop and the public prime stream.
//!
//! ```text
//!  candidates ─────────────────────────▶ ┌───────┐
//!                                        │ sieve │ ──▶ PrimeStream
//!  multiples(p) ──▶ merger ─composites─▶ └───────┘
//!        ▲            ▲                      │
//!        └─ spawned ──┴──── feedback relay ◀─┘
//! ```
//!
//! Every box is its own tokio task and every arrow a channel. Only the
//! feedback arrow is unbounded.

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use futures::Stream;
use tokio::sync::mpsc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Feed, FeedbackSender, Result, SieveConfig, SieveInt, Source, SourceStatus, candidates,
    feedback::feedback, merge::merger_loop, scope::Scope, source::spawn_source,
};

/// Primes emitted directly, before the sieve loop starts. 2, 3, 5 and 7 are
/// the wheel's own primes; 11 is the first prime with a multiples stream.
pub const BOOTSTRAP_PRIMES: [u8; 5] = [2, 3, 5, 7, 11];

/// Lifecycle of a pipeline as seen from its [`PrimeStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SieveState {
    /// Tasks are producing primes.
    Running,
    /// The pipeline was closed, dropped or aborted by an error.
    Stopped,
}

/// An infinite, strictly increasing stream of primes starting at 2.
///
/// Backed by a pipeline of tokio tasks, so it must be opened from inside a
/// tokio runtime. Read it as a [`futures::Stream`] or through [`Source`].
///
/// Closing is cascading: [`PrimeStream::close`] cancels every task of the
/// pipeline, [`PrimeStream::shutdown`] also waits for them to exit, and
/// dropping the stream cancels as well. Closing twice is a no-op.
///
/// Every prime representable in `T` is produced. The only error a running
/// stream yields is [`Error::Overflow`], once, right after the largest of
/// them. The stream ends after it.
///
/// # Example
/// ```
/// use eratos::{PrimeStream, SieveConfig, Source};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> eratos::Result<()> {
/// let mut primes = PrimeStream::<u32>::open(SieveConfig::default())?;
/// let mut first = Vec::new();
/// for _ in 0..10 {
///     first.push(primes.next().await?);
/// }
/// assert_eq!(first, [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
/// primes.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PrimeStream<T> {
    rx: mpsc::Receiver<Result<T>>,
    scope: Scope,
    closed: bool,
}

impl<T: SieveInt> PrimeStream<T> {
    /// Starts a new pipeline.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `config` fails [`SieveConfig::validate`].
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime, as [`tokio::spawn`] does.
    #[cfg_attr(feature = "tracing", instrument(level = "debug"))]
    pub fn open(config: SieveConfig) -> Result<Self> {
        config.validate()?;

        let scope = Scope::new();
        let (output_tx, output_rx) = mpsc::channel(config.output_buffer);
        let (composite_tx, composite_rx) = mpsc::channel(config.composite_buffer);
        let (feedback_tx, feedback_rx) = feedback(
            &scope,
            config.feedback_initial_capacity,
            config.feedback_buffer,
        );

        scope.spawn(merger_loop(
            feedback_rx,
            composite_tx,
            config.multiple_buffer,
            scope.clone(),
        ));

        let core = SieveCore {
            candidates: spawn_source(&scope, "candidates", candidates(), config.candidate_buffer),
            composites: Feed::new(composite_rx),
            feedback: feedback_tx,
            output: output_tx,
            scope: scope.clone(),
            emitted: 0,
        };
        scope.spawn(core.run());

        Ok(Self {
            rx: output_rx,
            scope,
            closed: false,
        })
    }

    /// Stops the pipeline without waiting for its tasks. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            #[cfg(feature = "tracing")]
            tracing::debug!("closing prime stream");
            self.closed = true;
        }
        self.rx.close();
        self.scope.cancel();
    }

    /// Stops the pipeline and waits until every task has exited.
    pub async fn shutdown(&mut self) {
        self.close();
        self.scope.shutdown().await;

        #[cfg(feature = "tracing")]
        tracing::debug!("prime stream shut down");
    }

    pub fn state(&self) -> SieveState {
        if self.closed || self.scope.is_cancelled() {
            SieveState::Stopped
        } else {
            SieveState::Running
        }
    }

    /// Number of pipeline tasks that have not exited yet.
    pub fn live_tasks(&self) -> usize {
        self.scope.live_tasks()
    }
}

impl<T: SieveInt> Source<T> for PrimeStream<T> {
    fn try_next(&mut self) -> Result<SourceStatus<T>> {
        if self.closed {
            return Err(Error::Closed);
        }
        match self.rx.try_recv() {
            Ok(item) => item.map(|value| SourceStatus::Ready { value }),
            Err(mpsc::error::TryRecvError::Empty) => Ok(SourceStatus::Pending),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Error::Closed),
        }
    }

    fn next(&mut self) -> impl Future<Output = Result<T>> + Send {
        async move {
            if self.closed {
                return Err(Error::Closed);
            }
            self.rx.recv().await.unwrap_or(Err(Error::Closed))
        }
    }
}

impl<T: SieveInt> Stream for PrimeStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl<T> Drop for PrimeStream<T> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

/// The control loop: walks candidates against composites in lockstep.
///
/// A candidate below the current composite is prime; it is registered with
/// the merger through the feedback relay and emitted. A candidate equal to the
/// composite is discarded. Once the composite stream ends, no composite in
/// range is left and every further candidate is prime, until the candidates
/// themselves overflow.
///
/// Only this task decides to abort the pipeline: it forwards any upstream
/// error to the output and cancels the scope.
struct SieveCore<T> {
    candidates: Feed<T>,
    composites: Feed<T>,
    feedback: FeedbackSender<T>,
    output: mpsc::Sender<Result<T>>,
    scope: Scope,
    emitted: u64,
}

impl<T: SieveInt> SieveCore<T> {
    async fn run(mut self) {
        #[cfg(feature = "tracing")]
        tracing::trace!("sieve loop started");

        let result = self.sieve().await;

        if let Err(e) = result {
            if !e.is_closed() {
                #[cfg(feature = "tracing")]
                tracing::warn!("sieve aborted after {} primes: {e}", self.emitted);

                tokio::select! {
                    biased;
                    () = self.scope.token().cancelled() => {},
                    _ = self.output.send(Err(e)) => {},
                }
            }
        }

        // Whatever ended the loop ends the pipeline.
        self.scope.cancel();

        #[cfg(feature = "tracing")]
        tracing::trace!("sieve loop stopped after {} primes", self.emitted);
    }

    async fn sieve(&mut self) -> Result<()> {
        for p in BOOTSTRAP_PRIMES {
            self.emit(T::from_u8(p)).await?;
        }
        self.register(T::from_u8(11));

        let mut p = recv(&self.scope, &mut self.candidates).await?;
        loop {
            let c = match recv(&self.scope, &mut self.composites).await {
                Ok(c) => c,
                // The merger released every composite that fits in `T`.
                Err(Error::Closed) if !self.scope.is_cancelled() => break,
                Err(e) => return Err(e),
            };
            while p < c {
                self.register(p);
                self.emit(p).await?;
                p = recv(&self.scope, &mut self.candidates).await?;
            }
            if p == c {
                p = recv(&self.scope, &mut self.candidates).await?;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("no composites left past {p}, every remaining candidate is prime");

        loop {
            self.emit(p).await?;
            p = recv(&self.scope, &mut self.candidates).await?;
        }
    }

    fn register(&self, prime: T) {
        // A closed relay means the merger has exited. If it failed, the error
        // is queued on the composite stream behind the composites it sent.
        let _ = self.feedback.push(prime);
    }

    async fn emit(&mut self, prime: T) -> Result<()> {
        tokio::select! {
            biased;
            () = self.scope.token().cancelled() => Err(Error::Closed),
            sent = self.output.send(Ok(prime)) => {
                sent.map_err(|_| Error::Closed)?;
                self.emitted += 1;
                Ok(())
            }
        }
    }
}

async fn recv<T: SieveInt>(scope: &Scope, feed: &mut Feed<T>) -> Result<T> {
    tokio::select! {
        biased;
        () = scope.token().cancelled() => Err(Error::Closed),
        value = feed.next() => value,
    }
}
