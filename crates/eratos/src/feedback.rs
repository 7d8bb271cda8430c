//! The feedback path from prime discovery back into the composite merger.
//!
//! The sieve loop confirms primes far faster than the merger needs them: the
//! merger only wants primes up to the square root of the current frontier. If
//! this path were bounded, the sieve loop would eventually block registering a
//! prime while the merger blocks waiting for the sieve loop to take a
//! composite, and the pipeline would deadlock on itself.
//!
//! [`feedback`] therefore splits the path in two:
//!
//! - a write end, [`FeedbackSender::push`], that appends to a growable ring
//!   buffer under a short lock. It can never wait on the reader.
//! - a relay task that drains the ring into a small bounded channel whenever
//!   the reader has room. The ring doubles when a write finds it full.
//!
//! The ring is the only unbounded store on this path. The read end,
//! [`FeedbackReceiver`], is an ordinary blocking [`Source`].

use core::future::Future;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{
    Notify,
    mpsc::{self, error::TryRecvError},
};

use crate::{Error, Result, SieveInt, Source, SourceStatus, scope::Scope};

#[derive(Debug)]
struct Ring<T> {
    buf: VecDeque<T>,
    senders: usize,
    relay_gone: bool,
}

#[derive(Debug)]
struct Shared<T> {
    ring: Mutex<Ring<T>>,
    // Signals a write or the last writer leaving.
    notify: Notify,
}

/// Write end of the feedback relay. Cheap to clone.
#[derive(Debug)]
pub struct FeedbackSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for FeedbackSender<T> {
    fn clone(&self) -> Self {
        self.shared.ring.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for FeedbackSender<T> {
    fn drop(&mut self) {
        let last = {
            let mut ring = self.shared.ring.lock();
            ring.senders -= 1;
            ring.senders == 0
        };
        if last {
            self.shared.notify.notify_one();
        }
    }
}

impl<T: SieveInt> FeedbackSender<T> {
    /// Queues `value` for the reader. Never waits.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if the relay has already shut down.
    pub fn push(&self, value: T) -> Result<()> {
        {
            let mut ring = self.shared.ring.lock();
            if ring.relay_gone {
                return Err(Error::Closed);
            }
            if ring.buf.len() == ring.buf.capacity() {
                let grow_by = ring.buf.capacity().max(1);
                ring.buf.reserve_exact(grow_by);

                #[cfg(feature = "tracing")]
                tracing::debug!("feedback buffer expanded to {}", ring.buf.capacity());
            }
            ring.buf.push_back(value);
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Returns `true` once the relay has shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.ring.lock().relay_gone
    }
}

/// Read end of the feedback relay.
#[derive(Debug)]
pub struct FeedbackReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T: SieveInt> FeedbackReceiver<T> {
    /// Closes the read end; the relay exits once it notices.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl<T: SieveInt> Source<T> for FeedbackReceiver<T> {
    fn try_next(&mut self) -> Result<SourceStatus<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(SourceStatus::Ready { value }),
            Err(TryRecvError::Empty) => Ok(SourceStatus::Pending),
            Err(TryRecvError::Disconnected) => Err(Error::Closed),
        }
    }

    fn next(&mut self) -> impl Future<Output = Result<T>> + Send {
        async move { self.rx.recv().await.ok_or(Error::Closed) }
    }
}

/// Creates a feedback relay inside `scope`.
///
/// `initial_capacity` sizes the ring buffer; `output_capacity` bounds how far
/// the relay may run ahead of the reader.
///
/// Closing semantics:
/// - When every [`FeedbackSender`] is dropped, the relay delivers whatever the
///   ring still holds and then closes the read end.
/// - When the [`FeedbackReceiver`] is dropped or the scope is cancelled, the
///   relay discards the ring and exits. Later writes fail with
///   [`Error::Closed`].
pub(crate) fn feedback<T: SieveInt>(
    scope: &Scope,
    initial_capacity: usize,
    output_capacity: usize,
) -> (FeedbackSender<T>, FeedbackReceiver<T>) {
    let shared = Arc::new(Shared {
        ring: Mutex::new(Ring {
            buf: VecDeque::with_capacity(initial_capacity.max(1)),
            senders: 1,
            relay_gone: false,
        }),
        notify: Notify::new(),
    });
    let (out_tx, out_rx) = mpsc::channel(output_capacity);
    scope.spawn(relay_loop(Arc::clone(&shared), out_tx, scope.clone()));
    (FeedbackSender { shared }, FeedbackReceiver { rx: out_rx })
}

async fn relay_loop<T: SieveInt>(
    shared: Arc<Shared<T>>,
    outbound: mpsc::Sender<T>,
    scope: Scope,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("feedback relay started");

    loop {
        let next = {
            let mut ring = shared.ring.lock();
            match ring.buf.pop_front() {
                Some(value) => Some(value),
                // Writers are gone and everything was delivered.
                None if ring.senders == 0 => break,
                None => None,
            }
        };

        let keep_going = match next {
            Some(value) => tokio::select! {
                biased;
                () = scope.token().cancelled() => false,
                sent = outbound.send(value) => sent.is_ok(),
            },
            None => tokio::select! {
                biased;
                () = scope.token().cancelled() => false,
                () = outbound.closed() => false,
                () = shared.notify.notified() => true,
            },
        };
        if !keep_going {
            break;
        }
    }

    let _undelivered = {
        let mut ring = shared.ring.lock();
        ring.relay_gone = true;
        core::mem::take(&mut ring.buf).len()
    };

    #[cfg(feature = "tracing")]
    tracing::trace!("feedback relay stopped with {_undelivered} undelivered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use tokio::time::timeout;

    const BURST: u64 = 100_000;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn burst_is_accepted_without_a_reader() {
        let scope = Scope::new();
        let (tx, mut rx) = feedback::<u64>(&scope, 16, 4);

        // `push` is synchronous: if this loop finishes, no write blocked.
        for v in 0..BURST {
            tx.push(v).unwrap();
        }

        // Let the relay absorb the burst before anyone reads.
        tokio::time::sleep(Duration::from_millis(50)).await;

        for expected in 0..BURST {
            assert_eq!(rx.next().await, Ok(expected));
        }
        assert_eq!(rx.try_next(), Ok(SourceStatus::Pending));

        scope.shutdown().await;
    }

    #[tokio::test]
    async fn interleaved_reads_and_writes_stay_fifo() {
        let scope = Scope::new();
        let (tx, mut rx) = feedback::<u32>(&scope, 1, 1);

        let mut next_read = 0;
        for v in 0..1_000_u32 {
            tx.push(v).unwrap();
            if v % 7 == 0 {
                assert_eq!(rx.next().await, Ok(next_read));
                next_read += 1;
            }
        }
        while next_read < 1_000 {
            assert_eq!(rx.next().await, Ok(next_read));
            next_read += 1;
        }

        scope.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_writer_drains_then_closes() {
        let scope = Scope::new();
        let (tx, mut rx) = feedback::<u32>(&scope, 2, 2);
        for v in [11, 13, 17, 19, 23] {
            tx.push(v).unwrap();
        }
        drop(tx);

        for v in [11, 13, 17, 19, 23] {
            assert_eq!(rx.next().await, Ok(v));
        }
        assert_eq!(rx.next().await, Err(Error::Closed));
        timeout(Duration::from_secs(5), scope.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_the_reader_stops_the_relay() {
        let scope = Scope::new();
        let (tx, rx) = feedback::<u32>(&scope, 4, 4);
        tx.push(11).unwrap();
        drop(rx);

        timeout(Duration::from_secs(5), async {
            while !tx.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(tx.push(13), Err(Error::Closed));
        scope.shutdown().await;
    }

    #[tokio::test]
    async fn ring_doubles_when_full() {
        let scope = Scope::new();
        let (tx, _rx) = feedback::<u32>(&scope, 4, 1);
        // Fill the ring while the relay task has not run yet.
        for v in 0..9 {
            tx.push(v).unwrap();
        }
        assert!(tx.shared.ring.lock().buf.capacity() >= 16);
        scope.shutdown().await;
        assert_eq!(tx.push(9), Err(Error::Closed));
    }

    #[tokio::test]
    async fn cancel_stops_a_full_relay() {
        let scope = Scope::new();
        let (tx, _rx) = feedback::<u32>(&scope, 4, 1);
        for v in 0..64 {
            tx.push(v).unwrap();
        }

        timeout(Duration::from_secs(5), scope.shutdown())
            .await
            .unwrap();
        assert_eq!(scope.live_tasks(), 0);
    }
}
