use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use windowlimit::ratelimit::{ManualClock, Quota, RateLimiter, TimeWindow, WindowKey, WindowStore};

fn quota(n: u64) -> Quota {
    Quota::new(n).unwrap()
}

fn manual_limiter() -> (Arc<RateLimiter>, ManualClock) {
    let clock = ManualClock::new();
    let store = Arc::new(WindowStore::with_clock(Arc::new(clock.clone())));
    (Arc::new(RateLimiter::with_store(store)), clock)
}

/// Run `calls` admissions for `key` at once and return them.
fn burst(limiter: &Arc<RateLimiter>, key: &WindowKey, limit: u64, calls: usize) -> Vec<(bool, u64)> {
    let barrier = Arc::new(Barrier::new(calls));
    let handles: Vec<_> = (0..calls)
        .map(|_| {
            let limiter = Arc::clone(limiter);
            let barrier = Arc::clone(&barrier);
            let key = key.clone();
            thread::spawn(move || {
                barrier.wait();
                let admission = limiter.admit(&key, quota(limit), TimeWindow::Minute);
                (admission.allowed, admission.count)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn quota_boundary_admits_exactly_n() {
    let limiter = RateLimiter::new();
    let key = WindowKey::new("192.0.2.1", "/api/items");

    for n in 1..=7 {
        let admission = limiter.admit(&key, quota(7), TimeWindow::Minute);
        assert!(admission.allowed, "request {} should be allowed", n);
    }
    assert!(!limiter.admit(&key, quota(7), TimeWindow::Minute).allowed);
}

#[test]
fn single_admission_boundary() {
    let limiter = RateLimiter::new();
    let key = WindowKey::new("192.0.2.1", "/api/once");

    assert!(limiter.admit(&key, quota(1), TimeWindow::Minute).allowed);
    assert!(!limiter.admit(&key, quota(1), TimeWindow::Minute).allowed);
}

#[test]
fn expired_window_starts_fresh_even_when_exhausted() {
    let (limiter, clock) = manual_limiter();
    let key = WindowKey::new("192.0.2.1", "/api/items");

    for _ in 0..4 {
        limiter.admit(&key, quota(3), TimeWindow::Minute);
    }
    assert!(!limiter.admit(&key, quota(3), TimeWindow::Minute).allowed);

    clock.advance(Duration::from_secs(60) + Duration::from_millis(1));
    let admission = limiter.admit(&key, quota(3), TimeWindow::Minute);
    assert!(admission.allowed);
    assert_eq!(admission.count, 1);
    assert_eq!(admission.remaining, 2);
}

#[test]
fn keys_are_independent_under_concurrency() {
    let limiter = Arc::new(RateLimiter::new());
    let a = WindowKey::new("192.0.2.1", "/a");
    let b = WindowKey::new("192.0.2.2", "/a");

    let handles: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .map(|key| {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                (0..500)
                    .filter(|_| limiter.admit(&key, quota(100), TimeWindow::Minute).allowed)
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 100);
    }
    let window = Duration::from_secs(60);
    assert_eq!(limiter.store().current_count(&a, window), Some(500));
    assert_eq!(limiter.store().current_count(&b, window), Some(500));
}

#[test]
fn concurrent_callers_get_distinct_ranks() {
    let limiter = Arc::new(RateLimiter::new());
    let key = WindowKey::new("192.0.2.1", "/hot");
    let m = 64;

    let results = burst(&limiter, &key, m as u64, m);
    assert!(results.iter().all(|(allowed, _)| *allowed));
    let ranks: HashSet<u64> = results.iter().map(|(_, count)| *count).collect();
    assert_eq!(ranks, (1..=m as u64).collect::<HashSet<u64>>());
}

#[test]
fn one_extra_concurrent_caller_is_rejected() {
    let limiter = Arc::new(RateLimiter::new());
    let key = WindowKey::new("192.0.2.1", "/hot");
    let m = 64;

    let results = burst(&limiter, &key, m as u64, m + 1);
    let rejected = results.iter().filter(|(allowed, _)| !allowed).count();
    assert_eq!(rejected, 1);
    let (_, rank) = results.iter().find(|(allowed, _)| !allowed).unwrap();
    assert_eq!(*rank, m as u64 + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_get_distinct_ranks() {
    let limiter = Arc::new(RateLimiter::new());
    let key = WindowKey::new("192.0.2.1", "/tasks");

    let tasks = (0..200).map(|_| {
        let limiter = Arc::clone(&limiter);
        let key = key.clone();
        tokio::spawn(async move { limiter.admit(&key, quota(150), TimeWindow::Minute) })
    });
    let admissions: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let ranks: HashSet<u64> = admissions.iter().map(|a| a.count).collect();
    assert_eq!(ranks.len(), 200);
    assert_eq!(admissions.iter().filter(|a| a.allowed).count(), 150);
}

#[test]
fn release_all_restores_quota() {
    let limiter = RateLimiter::new();
    let key = WindowKey::new("192.0.2.1", "/api/items");

    for _ in 0..3 {
        limiter.admit(&key, quota(2), TimeWindow::Minute);
    }
    assert!(!limiter.admit(&key, quota(2), TimeWindow::Minute).allowed);

    limiter.release_all();
    assert!(limiter.admit(&key, quota(2), TimeWindow::Minute).allowed);
}

#[test]
fn kill_switch_never_touches_counters() {
    let limiter = RateLimiter::new();
    let key = WindowKey::new("192.0.2.1", "/api/items");
    let other = WindowKey::new("198.51.100.7", "/other");

    limiter.set_enabled(false);
    for _ in 0..100 {
        assert!(limiter.admit(&key, quota(1), TimeWindow::Minute).allowed);
        assert!(limiter.admit(&other, quota(1), TimeWindow::Minute).allowed);
    }
    assert!(limiter.store().is_empty());

    limiter.set_enabled(true);
    let admission = limiter.admit(&key, quota(1), TimeWindow::Minute);
    assert!(admission.allowed);
    assert_eq!(admission.count, 1);
    assert!(!limiter.admit(&key, quota(1), TimeWindow::Minute).allowed);
}

#[test]
fn twenty_per_minute_scenario() {
    let limiter = RateLimiter::new();
    let key = WindowKey::new("192.0.2.1", "/api/items");

    for expected in (0..20).rev() {
        let admission = limiter.admit(&key, quota(20), TimeWindow::Minute);
        assert!(admission.allowed);
        assert_eq!(admission.remaining, expected);
    }
    assert!(!limiter.admit(&key, quota(20), TimeWindow::Minute).allowed);

    limiter.release_all();
    let admission = limiter.admit(&key, quota(20), TimeWindow::Minute);
    assert!(admission.allowed);
    assert_eq!(admission.remaining, 19);
}
