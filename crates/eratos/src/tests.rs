use crate::{
    Error, PrimeStream, SieveConfig, SieveInt, SieveState, Source, SourceStatus, nth_prime,
    primes_up_to,
};
use core::time::Duration;
use tokio::time::timeout;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

fn reference_primes(bound: u64) -> Vec<u64> {
    (2..=bound).filter(|&n| is_prime(n)).collect()
}

async fn first_primes<T: SieveInt>(count: usize, config: SieveConfig) -> Vec<T> {
    let mut stream = PrimeStream::<T>::open(config).unwrap();
    let mut primes = Vec::with_capacity(count);
    for _ in 0..count {
        primes.push(stream.next().await.unwrap());
    }
    stream.shutdown().await;
    primes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn primes_up_to_a_million_match_trial_division() {
    let expected = reference_primes(1_000_000);
    let actual: Vec<u64> = primes_up_to(1_000_000_u32, SieveConfig::default())
        .await
        .unwrap()
        .into_iter()
        .map(u64::from)
        .collect();

    assert_eq!(actual.len(), 78_498);
    assert_eq!(actual, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn known_ordinals() {
    let config = SieveConfig::default();
    assert_eq!(nth_prime::<u32>(1, config).await, Ok(2));
    assert_eq!(nth_prime::<u32>(5, config).await, Ok(11));
    assert_eq!(nth_prime::<u32>(1_000, config).await, Ok(7_919));
    assert_eq!(nth_prime::<i32>(1_000_000, config).await, Ok(15_485_863));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_integer_type_agrees() {
    let config = SieveConfig::default();
    let expected: Vec<u64> = first_primes::<u64>(5_000, config).await;

    let as_u32: Vec<u64> = first_primes::<u32>(5_000, config)
        .await
        .into_iter()
        .map(u64::from)
        .collect();
    let as_i64: Vec<u64> = first_primes::<i64>(5_000, config)
        .await
        .into_iter()
        .map(|p| p as u64)
        .collect();
    let as_usize: Vec<u64> = first_primes::<usize>(5_000, config)
        .await
        .into_iter()
        .map(|p| p as u64)
        .collect();

    assert_eq!(as_u32, expected);
    assert_eq!(as_i64, expected);
    assert_eq!(as_usize, expected);
    assert!(expected.iter().all(|&p| is_prime(p)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_slot_channels_do_not_deadlock() {
    let tight = SieveConfig::default()
        .with_candidate_buffer(1)
        .with_multiple_buffer(1)
        .with_composite_buffer(1)
        .with_output_buffer(1)
        .with_feedback_buffer(1)
        .with_feedback_initial_capacity(1);

    let primes = timeout(Duration::from_secs(60), primes_up_to(50_000_u32, tight))
        .await
        .expect("pipeline stalled")
        .unwrap();
    let expected: Vec<u32> = reference_primes(50_000)
        .into_iter()
        .map(|p| p as u32)
        .collect();
    assert_eq!(primes, expected);
}

#[tokio::test(flavor = "current_thread")]
async fn runs_on_a_single_threaded_runtime() {
    let primes = primes_up_to(10_000_u32, SieveConfig::default()).await.unwrap();
    assert_eq!(primes.len(), 1_229);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn futures_stream_interface() {
    use futures::StreamExt;

    let stream = PrimeStream::<u32>::open(SieveConfig::default()).unwrap();
    let primes: Vec<u32> = stream
        .take(25)
        .map(|p| p.unwrap())
        .collect()
        .await;
    let expected: Vec<u32> = reference_primes(100).into_iter().map(|p| p as u32).collect();
    assert_eq!(primes, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_stream_adapters() {
    use tokio_stream::StreamExt;

    let primes: Vec<u32> = PrimeStream::<u32>::open(SieveConfig::default())
        .unwrap()
        .map_while(Result::ok)
        .take_while(|&p| p < 100)
        .collect()
        .await;
    assert_eq!(primes.len(), 25);
    assert_eq!(primes.last(), Some(&97));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn try_next_eventually_yields() {
    let mut stream = PrimeStream::<u32>::open(SieveConfig::default()).unwrap();
    let mut seen = Vec::new();
    while seen.len() < 10 {
        match stream.try_next().unwrap() {
            SourceStatus::Ready { value } => seen.push(value),
            SourceStatus::Pending => tokio::task::yield_now().await,
        }
    }
    assert_eq!(seen, [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    stream.shutdown().await;
}

async fn read_until_error(config: SieveConfig) -> (Vec<u16>, Error, PrimeStream<u16>) {
    let mut stream = PrimeStream::<u16>::open(config).unwrap();
    let mut primes = Vec::new();
    let error = loop {
        match stream.next().await {
            Ok(p) => primes.push(p),
            Err(e) => break e,
        }
    };
    (primes, error, stream)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_representable_prime_precedes_overflow() {
    let (primes, error, mut stream) = read_until_error(SieveConfig::default()).await;

    let expected: Vec<u16> = reference_primes(u64::from(u16::MAX))
        .into_iter()
        .map(|p| p as u16)
        .collect();
    assert_eq!(primes.len(), 6_542);
    assert_eq!(primes, expected);
    assert_eq!(primes.last(), Some(&65_521));
    assert_eq!(error, Error::Overflow { stage: "candidates" });

    assert_eq!(stream.next().await, Err(Error::Closed));
    assert_eq!(stream.state(), SieveState::Stopped);
    timeout(SHUTDOWN_DEADLINE, stream.shutdown()).await.unwrap();
    assert_eq!(stream.live_tasks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overflow_survives_any_buffering() {
    // The merger can finish far ahead of the sieve loop, or in lockstep.
    let roomy = SieveConfig::default().with_composite_buffer(65_536);
    let tight = SieveConfig::default()
        .with_candidate_buffer(1)
        .with_multiple_buffer(1)
        .with_composite_buffer(1)
        .with_output_buffer(1)
        .with_feedback_buffer(1);

    for config in [roomy, tight] {
        let (primes, error, mut stream) = read_until_error(config).await;
        assert_eq!(primes.len(), 6_542);
        assert_eq!(error, Error::Overflow { stage: "candidates" });
        stream.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_cascades_to_every_task() {
    let mut stream = PrimeStream::<u64>::open(SieveConfig::default()).unwrap();
    assert_eq!(stream.state(), SieveState::Running);

    let mut last = 0;
    for _ in 0..20_000 {
        let p = stream.next().await.unwrap();
        assert!(p > last);
        last = p;
    }
    // One multiples task per prime up to sqrt(last), plus the fixed stages.
    assert!(stream.live_tasks() > 4);

    timeout(SHUTDOWN_DEADLINE, stream.shutdown())
        .await
        .expect("tasks still running after shutdown");
    assert_eq!(stream.live_tasks(), 0);
    assert_eq!(stream.state(), SieveState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_is_idempotent() {
    let mut stream = PrimeStream::<u32>::open(SieveConfig::default()).unwrap();
    assert_eq!(stream.next().await, Ok(2));

    stream.close();
    stream.close();
    assert_eq!(stream.next().await, Err(Error::Closed));
    assert_eq!(stream.try_next(), Err(Error::Closed));

    timeout(SHUTDOWN_DEADLINE, stream.shutdown()).await.unwrap();
    timeout(SHUTDOWN_DEADLINE, stream.shutdown()).await.unwrap();
    assert_eq!(stream.live_tasks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_before_reading_anything() {
    let mut stream = PrimeStream::<u32>::open(SieveConfig::default()).unwrap();
    timeout(SHUTDOWN_DEADLINE, stream.shutdown()).await.unwrap();
    assert_eq!(stream.live_tasks(), 0);
}
