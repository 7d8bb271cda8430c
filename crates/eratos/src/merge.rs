//! k-way merge of the per-prime multiples streams into one composite stream.
//!
//! A multiples stream that steps past the largest value of `T` has no more
//! representable composites. It is dropped from the merge rather than treated
//! as an error, so the merged stream covers every composite up to `T::MAX`.

use core::cmp::Reverse;
use core::future::Future;
use std::collections::BinaryHeap;
use tokio::sync::mpsc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Feed, FeedbackReceiver, Result, SieveInt, Source, multiples, scope::Scope,
    source::spawn_source,
};

/// Reads the next value of a multiples stream. `None` once it ran out of range.
async fn read<T: SieveInt, S: Source<T>>(source: &mut S) -> Result<Option<T>> {
    match source.next().await {
        Ok(value) => Ok(Some(value)),
        Err(Error::Overflow { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Where merged composites go, one at a time.
pub trait CompositeSink<T: SieveInt>: Send {
    /// Hands over the next composite, waiting for room if the sink is bounded.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] once nobody reads the sink anymore.
    fn send(&mut self, value: T) -> impl Future<Output = Result<()>> + Send;
}

impl<T: SieveInt> CompositeSink<T> for Vec<T> {
    fn send(&mut self, value: T) -> impl Future<Output = Result<()>> + Send {
        self.push(value);
        core::future::ready(Ok(()))
    }
}

/// A [`Source`] with its next unconsumed value held in `head`.
///
/// `head` is always the value that will be handed out next; advancing moves
/// it out and refills it from the source. A `None` head means the source ran
/// past the range of `T` and will never produce again.
#[derive(Debug)]
pub struct Peekable<T, S> {
    head: Option<T>,
    source: S,
}

impl<T: SieveInt, S: Source<T>> Peekable<T, S> {
    /// Reads the first value of `source` into `head`.
    ///
    /// # Errors
    ///
    /// Whatever the source returns for its first read, except overflow.
    pub async fn new(mut source: S) -> Result<Self> {
        let head = read(&mut source).await?;
        Ok(Self { head, source })
    }

    /// The next value, without consuming it.
    pub const fn head(&self) -> Option<T> {
        self.head
    }

    /// Returns the current head and reads its successor. `None` once the
    /// stream is exhausted.
    ///
    /// # Errors
    ///
    /// Whatever the source returns, except overflow. The head is left
    /// untouched on error.
    pub async fn advance(&mut self) -> Result<Option<T>> {
        let Some(current) = self.head else {
            return Ok(None);
        };
        self.head = read(&mut self.source).await?;
        Ok(Some(current))
    }
}

/// A min-queue of [`Peekable`] streams ordered by head.
///
/// Streams live in an arena indexed by insertion order; the heap holds only
/// `(head, index)` pairs, so the queue never owns a stream twice and streams
/// never point back at the queue. A stream leaves the heap for good once it
/// is exhausted.
#[derive(Debug)]
pub struct MergeQueue<T, S> {
    streams: Vec<Peekable<T, S>>,
    heap: BinaryHeap<Reverse<(T, usize)>>,
}

impl<T, S> Default for MergeQueue<T, S> {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            heap: BinaryHeap::new(),
        }
    }
}

impl<T: SieveInt, S: Source<T>> MergeQueue<T, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams ever pushed.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of streams that can still produce.
    pub fn live(&self) -> usize {
        self.heap.len()
    }

    /// Smallest head in the queue, `None` when no stream can produce.
    pub fn min(&self) -> Option<T> {
        self.heap.peek().map(|Reverse((head, _))| *head)
    }

    pub fn push(&mut self, stream: Peekable<T, S>) {
        let index = self.streams.len();
        if let Some(head) = stream.head() {
            self.heap.push(Reverse((head, index)));
        }
        self.streams.push(stream);
    }

    /// Takes the smallest head out of the queue, advances its stream and
    /// reinserts it unless it is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates the stream's read error. The queue is left without that
    /// stream's entry, which is fine: any error here ends the merge.
    pub async fn pop_advance(&mut self) -> Result<Option<T>> {
        let Some((value, index)) = self.pop_if(|_| true) else {
            return Ok(None);
        };
        self.refill(index).await?;
        Ok(Some(value))
    }

    fn pop_if(&mut self, predicate: impl FnOnce(T) -> bool) -> Option<(T, usize)> {
        let min = self.min()?;
        if !predicate(min) {
            return None;
        }
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    // Moves the stream at `index` past the head just taken from the heap.
    async fn refill(&mut self, index: usize) -> Result<()> {
        let Some(stream) = self.streams.get_mut(index) else {
            return Ok(());
        };
        stream.advance().await?;
        if let Some(head) = stream.head() {
            self.heap.push(Reverse((head, index)));
        }
        Ok(())
    }
}

/// Merges multiples streams, registered one prime at a time in increasing
/// order, into a strictly increasing stream of composites.
///
/// Registering prime `p` releases every composite below `p²` (none of them
/// can come from `p` or a later prime) followed by `p²` itself. A composite
/// reachable from several primes, such as 2431 = 11·13·17, is released once.
/// Each composite is handed to the sink as soon as it is known.
#[derive(Debug)]
pub struct CompositeMerger<T, S> {
    queue: MergeQueue<T, S>,
    last: Option<T>,
    collapsed: u64,
    saturated: bool,
}

impl<T, S> Default for CompositeMerger<T, S> {
    fn default() -> Self {
        Self {
            queue: MergeQueue::default(),
            last: None,
            collapsed: 0,
            saturated: false,
        }
    }
}

impl<T: SieveInt, S: Source<T>> CompositeMerger<T, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of multiples streams registered so far.
    pub fn streams(&self) -> usize {
        self.queue.len()
    }

    /// Number of duplicate composites dropped so far.
    pub const fn collapsed(&self) -> u64 {
        self.collapsed
    }

    /// `true` once every composite representable in `T` has been released.
    pub const fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Registers the multiples stream of the next confirmed prime and sends
    /// the composites it unlocks to `sink`.
    ///
    /// A stream whose first value is already out of range saturates the
    /// merger, see [`CompositeMerger::saturate`].
    ///
    /// # Errors
    ///
    /// Propagates any read error from `multiples` or a queued stream, and
    /// the sink's error. Composites released before the error were already
    /// sent.
    pub async fn register<K: CompositeSink<T>>(
        &mut self,
        mut multiples: S,
        sink: &mut K,
    ) -> Result<()> {
        let Some(square) = read(&mut multiples).await? else {
            return self.saturate(sink).await;
        };

        self.release_below(Some(square), sink).await?;

        // Already covered by `square`; drop without emitting.
        while let Some((_, index)) = self.queue.pop_if(|head| head == square) {
            self.collapsed += 1;
            self.queue.refill(index).await?;
        }

        self.emit(square, sink).await?;
        self.queue.push(Peekable::new(multiples).await?);
        Ok(())
    }

    /// Releases every composite still queued.
    ///
    /// Called when the next prime's square is out of range: no later prime
    /// can add a composite that fits in `T`, so the queued streams are all
    /// that is left.
    ///
    /// # Errors
    ///
    /// Same as [`CompositeMerger::register`].
    pub async fn saturate<K: CompositeSink<T>>(&mut self, sink: &mut K) -> Result<()> {
        self.release_below(None, sink).await?;
        self.saturated = true;
        Ok(())
    }

    // `None` bound releases everything.
    async fn release_below<K: CompositeSink<T>>(
        &mut self,
        bound: Option<T>,
        sink: &mut K,
    ) -> Result<()> {
        while let Some((value, index)) = self
            .queue
            .pop_if(|head| bound.is_none_or(|bound| head < bound))
        {
            self.emit(value, sink).await?;
            self.queue.refill(index).await?;
        }
        Ok(())
    }

    async fn emit<K: CompositeSink<T>>(&mut self, value: T, sink: &mut K) -> Result<()> {
        if self.last.is_some_and(|last| value <= last) {
            self.collapsed += 1;
            return Ok(());
        }
        self.last = Some(value);
        sink.send(value).await
    }
}

/// The composite channel as seen by the merger task.
struct Outbox<T> {
    tx: mpsc::Sender<Result<T>>,
    scope: Scope,
}

impl<T: SieveInt> CompositeSink<T> for Outbox<T> {
    fn send(&mut self, value: T) -> impl Future<Output = Result<()>> + Send {
        async move {
            tokio::select! {
                biased;
                () = self.scope.token().cancelled() => Err(Error::Closed),
                sent = self.tx.send(Ok(value)) => sent.map_err(|_| Error::Closed),
            }
        }
    }
}

/// The composite merger task.
///
/// Reads confirmed primes from the feedback relay, spawns a multiples
/// generator for each and streams the merged composites to `composites`.
/// Exits when the merger saturates, the feedback relay closes, the composite
/// reader goes away, or the scope is cancelled. A fatal error is forwarded
/// before exiting; deciding to abort the pipeline is left to the reader.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub(crate) async fn merger_loop<T: SieveInt>(
    mut primes: FeedbackReceiver<T>,
    composites: mpsc::Sender<Result<T>>,
    multiple_buffer: usize,
    scope: Scope,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("composite merger started");

    let mut merger: CompositeMerger<T, Feed<T>> = CompositeMerger::new();
    let mut outbox = Outbox {
        tx: composites,
        scope: scope.clone(),
    };

    let result = tokio::select! {
        biased;
        () = scope.token().cancelled() => Ok(()),
        result = merge(&mut primes, &mut merger, &mut outbox, multiple_buffer, &scope) => result,
    };

    if let Err(e) = result {
        if !e.is_closed() {
            #[cfg(feature = "tracing")]
            tracing::warn!("composite merger failed: {e}");

            tokio::select! {
                biased;
                () = scope.token().cancelled() => {},
                _ = outbox.tx.send(Err(e)) => {},
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(
        "composite merger stopped after {} streams ({} duplicates collapsed, saturated: {})",
        merger.streams(),
        merger.collapsed(),
        merger.is_saturated()
    );
}

async fn merge<T: SieveInt>(
    primes: &mut FeedbackReceiver<T>,
    merger: &mut CompositeMerger<T, Feed<T>>,
    outbox: &mut Outbox<T>,
    multiple_buffer: usize,
    scope: &Scope,
) -> Result<()> {
    while !merger.is_saturated() {
        let prime = primes.next().await?;
        match multiples(prime) {
            Ok(spin) => {
                let feed = spawn_source(scope, "multiples", spin, multiple_buffer);
                merger.register(feed, outbox).await?;
            }
            // `prime²` does not fit, and neither does any later square.
            Err(Error::Overflow { .. }) => merger.saturate(outbox).await?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
