//! Behavioral properties of the resilient client under concurrency.

use std::sync::Arc;
use std::time::Duration;

use ferry_client::{BackoffPolicy, FetchError, ResilientClient, TransportError};
use ferry_test_utils::generators::{arb_key, arb_transport_failure};
use ferry_test_utils::{
    connection_error, echo_transport, expected_echo, fast_config, ScriptedTransport,
};
use proptest::prelude::*;

// ============================================================================
// DEDUPLICATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_transport_call() {
    let transport = echo_transport().with_latency(Duration::from_millis(50));
    let client = ResilientClient::new(transport, fast_config(3)).unwrap();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.fetch("user:123").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(expected_echo("user:123")));
    }
    assert_eq!(client.transport().calls_for("user:123"), 1);
    assert_eq!(client.stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_failure() {
    let transport = ScriptedTransport::<String>::new()
        .with_latency(Duration::from_millis(50))
        .script("user:404", [Err(FetchError::not_found("user:404"))]);
    let client = ResilientClient::new(transport, fast_config(3)).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.fetch("user:404").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.await.unwrap(),
            Err(FetchError::not_found("user:404"))
        );
    }
    assert_eq!(client.transport().calls_for("user:404"), 1);
    assert!(client.cache().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_misses_share_one_transport_call() {
    let transport = echo_transport().with_latency(Duration::from_millis(20));
    let client = ResilientClient::new(transport, fast_config(3)).unwrap();
    let barrier = Arc::new(tokio::sync::Barrier::new(24));

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let client = client.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                client.fetch("doc:1").await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(expected_echo("doc:1")));
    }
    // Late arrivals hit the cache, which is filled before the flight settles.
    assert_eq!(client.transport().calls_for("doc:1"), 1);
}

// ============================================================================
// RETRY SEQUENCING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn retries_are_sequential_and_spaced_by_backoff() {
    let transport = ScriptedTransport::new().script(
        "k",
        [
            Err(connection_error("k")),
            Err(connection_error("k")),
            Err(connection_error("k")),
            Ok(42u32),
        ],
    );
    let config = fast_config(4);
    let backoff = BackoffPolicy::from_config(&config);
    let client = ResilientClient::new(transport, config).unwrap();

    assert_eq!(client.fetch("k").await, Ok(42));

    let times = client.transport().call_times("k");
    assert_eq!(times.len(), 4);
    for (attempt, pair) in times.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= backoff.ceiling(attempt as u32),
            "attempt {} started after {:?}",
            attempt + 1,
            gap
        );
    }
}

#[tokio::test(start_paused = true)]
async fn exhaustion_after_exactly_max_retries() {
    let transport = ScriptedTransport::<u32>::new().with_fallback(|key| {
        Err(FetchError::transport(
            key,
            TransportError::Status {
                status: 503,
                reason: "unavailable".to_string(),
            },
        ))
    });
    let client = ResilientClient::new(transport, fast_config(5)).unwrap();

    match client.fetch("k").await {
        Err(FetchError::RetriesExhausted {
            key,
            attempts,
            last: TransportError::Status { status, .. },
        }) => {
            assert_eq!(key, "k");
            assert_eq!(attempts, 5);
            assert_eq!(status, 503);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(client.transport().calls_for("k"), 5);
    assert!(client.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn non_retryable_failures_stop_after_one_attempt() {
    let transport = ScriptedTransport::<u32>::new()
        .script("missing", [Err(FetchError::not_found("missing"))])
        .script("garbled", [Err(FetchError::decode("garbled", "expected value"))]);
    let client = ResilientClient::new(transport, fast_config(5)).unwrap();

    assert_eq!(
        client.fetch("missing").await,
        Err(FetchError::not_found("missing"))
    );
    assert!(matches!(
        client.fetch("garbled").await,
        Err(FetchError::Decode { .. })
    ));
    assert_eq!(client.transport().calls_for("missing"), 1);
    assert_eq!(client.transport().calls_for("garbled"), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_attempts_time_out_and_retry() {
    let transport = echo_transport().with_latency(Duration::from_secs(5));
    let config = fast_config(2).with_request_timeout(Duration::from_millis(100));
    let client = ResilientClient::new(transport, config).unwrap();

    match client.fetch("slow").await {
        Err(FetchError::RetriesExhausted {
            attempts: 2,
            last: TransportError::Timeout { after },
            ..
        }) => assert_eq!(after, Duration::from_millis(100)),
        other => panic!("expected timeout exhaustion, got {:?}", other),
    }
    assert_eq!(client.transport().calls_for("slow"), 2);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn abandoned_caller_does_not_disturb_joiners() {
    let transport = echo_transport().with_latency(Duration::from_millis(100));
    let client = ResilientClient::new(transport, fast_config(1)).unwrap();

    let impatient = {
        let client = client.clone();
        tokio::spawn(async move {
            tokio::time::timeout(Duration::from_millis(10), client.fetch("k")).await
        })
    };
    let patient = {
        let client = client.clone();
        tokio::spawn(async move { client.fetch("k").await })
    };

    assert!(impatient.await.unwrap().is_err());
    assert_eq!(patient.await.unwrap(), Ok(expected_echo("k")));
    assert_eq!(client.transport().calls_for("k"), 1);
}

#[tokio::test(start_paused = true)]
async fn last_caller_leaving_still_populates_cache() {
    let transport = echo_transport().with_latency(Duration::from_millis(100));
    let client = ResilientClient::new(transport, fast_config(1)).unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(10), client.fetch("k")).await;
    assert!(gave_up.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.cache().get("k"), Some(expected_echo("k")));
    assert_eq!(client.stats().in_flight, 0);

    assert_eq!(client.fetch("k").await, Ok(expected_echo("k")));
    assert_eq!(client.transport().calls_for("k"), 1);
}

// ============================================================================
// NO LOST UPDATES
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn distinct_keys_never_interfere() {
    const KEYS: usize = 64;
    const CALLERS_PER_KEY: usize = 8;

    let transport = echo_transport().with_latency(Duration::from_millis(2));
    let config = fast_config(3).with_capacity(KEYS);
    let client = ResilientClient::new(transport, config).unwrap();

    let mut handles = Vec::with_capacity(KEYS * CALLERS_PER_KEY);
    for caller in 0..CALLERS_PER_KEY {
        for n in 0..KEYS {
            // Interleave keys differently per caller round.
            let key = format!("item:{}", (n + caller * 7) % KEYS);
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let value = client.fetch(&key).await;
                (key, value)
            }));
        }
    }

    for handle in handles {
        let (key, value) = handle.await.unwrap();
        assert_eq!(value, Ok(expected_echo(&key)));
    }

    assert_eq!(client.cache().len(), KEYS);
    for n in 0..KEYS {
        let key = format!("item:{}", n);
        assert_eq!(client.cache().get(&key), Some(expected_echo(&key)));
        assert_eq!(client.transport().calls_for(&key), 1);
    }
    assert_eq!(client.transport().total_calls(), KEYS);
}

#[tokio::test]
async fn batch_fetch_respects_capacity_bound() {
    let config = fast_config(1).with_capacity(4).with_batch_concurrency(3);
    let client = ResilientClient::new(echo_transport(), config).unwrap();

    let keys: Vec<String> = (0..20).map(|n| format!("k{}", n)).collect();
    let results = client.fetch_many(keys.clone()).await;

    assert_eq!(results.len(), keys.len());
    for ((key, result), expected) in results.iter().zip(&keys) {
        assert_eq!(key, expected);
        assert_eq!(result, &Ok(expected_echo(expected)));
    }
    assert!(client.cache().len() <= 4);
    assert!(client.stats().evictions >= 16);
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_success_on_attempt_k_calls_transport_k_times(
        max_retries in 1u32..7,
        offset in 0u32..7,
    ) {
        let k = 1 + offset % max_retries;
        let mut outcomes: Vec<_> = (1..k).map(|_| Err(connection_error("k"))).collect();
        outcomes.push(Ok(k));
        let transport = ScriptedTransport::new().script("k", outcomes);
        let client = ResilientClient::new(transport, fast_config(max_retries)).unwrap();

        let result = paused_runtime().block_on(client.fetch("k"));

        prop_assert_eq!(result, Ok(k));
        prop_assert_eq!(client.transport().calls_for("k"), k as usize);
    }

    #[test]
    fn prop_terminal_failures_are_returned_after_one_call(
        (key, failure) in arb_key()
            .prop_flat_map(|key| (Just(key.clone()), arb_transport_failure(key)))
            .prop_filter("terminal failures only", |(_, failure)| !failure.is_retryable()),
        max_retries in 1u32..7,
    ) {
        let transport = ScriptedTransport::<u32>::new()
            .script(&key, [Err(failure.clone())])
            .with_fallback(|_| Ok(0));
        let client = ResilientClient::new(transport, fast_config(max_retries)).unwrap();

        let result = paused_runtime().block_on(client.fetch(&key));

        prop_assert_eq!(result, Err(failure));
        prop_assert_eq!(client.transport().calls_for(&key), 1);
        prop_assert!(client.cache().is_empty());
    }

    #[test]
    fn prop_always_failing_transport_exhausts(max_retries in 1u32..7) {
        let transport = ScriptedTransport::<u8>::new()
            .with_fallback(|key| Err(connection_error(key)));
        let client = ResilientClient::new(transport, fast_config(max_retries)).unwrap();

        let result = paused_runtime().block_on(client.fetch("k"));

        let exhausted = matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts, .. }) if attempts == max_retries
        );
        prop_assert!(exhausted);
        prop_assert_eq!(client.transport().calls_for("k"), max_retries as usize);
    }
}
