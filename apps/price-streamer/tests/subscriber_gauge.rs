//! Subscriber Gauge Tests
//!
//! Runs in its own binary so the global Prometheus recorder only sees this
//! broadcaster.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;

use price_streamer::{Broadcaster, PriceSample, init_metrics};

fn sample(secs: i64) -> PriceSample {
    PriceSample::new(
        Utc.timestamp_opt(secs, 0).unwrap(),
        Decimal::from(secs),
        "BTC",
        "Bitcoin",
    )
}

fn subscriber_gauge(handle: &PrometheusHandle) -> f64 {
    handle
        .render()
        .lines()
        .find_map(|line| line.strip_prefix("price_streamer_subscribers "))
        .expect("subscriber gauge rendered")
        .trim()
        .parse()
        .unwrap()
}

#[test]
fn test_gauge_matches_registry_after_concurrent_churn() {
    let handle = init_metrics().unwrap();
    let broadcaster = Arc::new(Broadcaster::new(1).unwrap());

    // Long-lived subscribers that never read, so broadcasts evict them.
    let idle: Vec<_> = (0..16).map(|_| broadcaster.subscribe()).collect();

    let churners: Vec<_> = (0..8)
        .map(|_| {
            let broadcaster = Arc::clone(&broadcaster);
            thread::spawn(move || {
                for _ in 0..500 {
                    let subscription = broadcaster.subscribe();
                    drop(subscription);
                }
            })
        })
        .collect();

    let producer = {
        let broadcaster = Arc::clone(&broadcaster);
        thread::spawn(move || {
            for secs in 0..500 {
                broadcaster.broadcast(sample(secs));
            }
        })
    };

    let keepers: Vec<_> = (0..4)
        .map(|_| {
            let broadcaster = Arc::clone(&broadcaster);
            thread::spawn(move || (0..25).map(|_| broadcaster.subscribe()).collect::<Vec<_>>())
        })
        .collect();

    for churner in churners {
        churner.join().unwrap();
    }
    producer.join().unwrap();
    let kept: Vec<_> = keepers
        .into_iter()
        .flat_map(|keeper| keeper.join().unwrap())
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let registered = broadcaster.subscriber_count() as f64;
    assert_eq!(subscriber_gauge(&handle), registered);

    drop(kept);
    drop(idle);
    assert_eq!(broadcaster.subscriber_count(), 0);
    assert_eq!(subscriber_gauge(&handle), 0.0);
}
