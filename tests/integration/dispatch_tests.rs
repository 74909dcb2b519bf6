//! Dispatcher behaviour across threads and restarts

use chrono::Utc;
use crawl_queue::config::DispatcherConfig;
use crawl_queue::{Admission, Dispatcher, EntryState, Outcome, SqliteStorage, VisitStatus};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn in_memory() -> Dispatcher {
    let storage = SqliteStorage::new_in_memory().expect("Failed to open in-memory database");
    Dispatcher::new(storage, DispatcherConfig::default()).expect("Failed to create dispatcher")
}

#[test]
fn test_priority_then_submission_order() {
    let dispatcher = in_memory();
    let submissions = [
        ("https://first.test/", 1),
        ("https://low.test/", -1),
        ("https://second.test/", 1),
        ("https://zero.test/", 0),
    ];
    for (url, priority) in submissions {
        assert_eq!(dispatcher.submit(url, priority).unwrap(), Admission::Admitted);
    }

    let claimed: Vec<String> = (0..4)
        .map(|_| dispatcher.claim("worker-1").unwrap().unwrap().url)
        .collect();
    assert_eq!(
        claimed,
        vec![
            "https://first.test/",
            "https://second.test/",
            "https://zero.test/",
            "https://low.test/",
        ]
    );
    assert!(dispatcher.claim("worker-1").unwrap().is_none());
}

#[test]
fn test_concurrent_claims_are_distinct() {
    const WORKERS: usize = 8;
    const ENTRIES: usize = 20;

    let dir = TempDir::new().unwrap();
    let dispatcher = Arc::new(
        Dispatcher::open(&dir.path().join("queue.db"), DispatcherConfig::default()).unwrap(),
    );
    for i in 0..ENTRIES {
        dispatcher
            .submit(&format!("https://site.test/page-{}", i), 0)
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dispatcher
                    .claim(&format!("worker-{}", i))
                    .unwrap()
                    .map(|entry| entry.url)
            })
        })
        .collect();

    let claimed: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().expect("every worker gets an entry"))
        .collect();
    let distinct: HashSet<&String> = claimed.iter().collect();

    assert_eq!(claimed.len(), WORKERS);
    assert_eq!(distinct.len(), WORKERS);

    let stats = dispatcher.stats().unwrap();
    assert_eq!(stats.claimed, WORKERS as u64);
    assert_eq!(stats.pending, (ENTRIES - WORKERS) as u64);
}

#[test]
fn test_restart_recovers_abandoned_claims() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("queue.db");

    {
        let dispatcher = Dispatcher::open(&db_path, DispatcherConfig::default()).unwrap();
        dispatcher.submit("https://a.test/", 0).unwrap();
        dispatcher.submit("https://b.test/", 0).unwrap();

        let done = dispatcher.claim("worker-1").unwrap().unwrap();
        dispatcher.complete(&done.url, &Outcome::Success, &[]).unwrap();

        let abandoned = dispatcher.claim("worker-1").unwrap().unwrap();
        assert_eq!(abandoned.url, "https://b.test/");
        // Dropped here with b.test still claimed
    }

    let dispatcher = Dispatcher::open(&db_path, DispatcherConfig::default()).unwrap();

    let recovered = dispatcher.entry("https://b.test/").unwrap().unwrap();
    assert_eq!(recovered.state, EntryState::Pending);
    assert_eq!(recovered.claimed_by, None);

    let history = dispatcher.entry("https://a.test/").unwrap().unwrap();
    assert_eq!(history.state, EntryState::Done);
    assert!(dispatcher.visit("https://a.test/").unwrap().is_some());

    let reclaimed = dispatcher.claim("worker-2").unwrap().unwrap();
    assert_eq!(reclaimed.url, "https://b.test/");
    assert_eq!(reclaimed.claimed_by.as_deref(), Some("worker-2"));
}

#[test]
fn test_success_with_discovered_link() {
    let dispatcher = in_memory();
    dispatcher.submit("https://a.test", 0).unwrap();

    let entry = dispatcher.claim("W1").unwrap().unwrap();
    assert_eq!(entry.url, "https://a.test/");

    // Stored timestamps keep microseconds only
    let before = Utc::now() - chrono::Duration::milliseconds(1);
    let report = dispatcher
        .complete(
            &entry.url,
            &Outcome::Success,
            &["https://b.test".to_string()],
        )
        .unwrap();
    let after = Utc::now();
    assert_eq!(report.admitted, 1);

    let a = dispatcher.entry("https://a.test/").unwrap().unwrap();
    assert_eq!(a.state, EntryState::Done);

    let pending = dispatcher.peek(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, "https://b.test/");
    assert_eq!(pending[0].state, EntryState::Pending);

    let visit = dispatcher.visit("https://a.test/").unwrap().unwrap();
    assert_eq!(visit.last_status, VisitStatus::Success);
    assert!(visit.last_visited_at >= before && visit.last_visited_at <= after);
}

#[test]
fn test_failure_is_not_requeued() {
    let dispatcher = in_memory();
    dispatcher.submit("https://c.test", 0).unwrap();
    let entry = dispatcher.claim("W1").unwrap().unwrap();

    dispatcher
        .complete(
            &entry.url,
            &Outcome::Failure("Timeout: no result after 60s".to_string()),
            &[],
        )
        .unwrap();

    let c = dispatcher.entry("https://c.test/").unwrap().unwrap();
    assert_eq!(c.state, EntryState::Failed);
    assert_eq!(c.last_error.as_deref(), Some("Timeout: no result after 60s"));
    assert_eq!(dispatcher.size().unwrap(), 0);
    assert!(dispatcher.claim("W1").unwrap().is_none());
    assert_eq!(
        dispatcher.visit("https://c.test/").unwrap().unwrap().last_status,
        VisitStatus::Failure
    );
}

#[test]
fn test_repeated_submission_while_pending() {
    let dispatcher = in_memory();
    assert_eq!(
        dispatcher.submit("https://a.test/", 0).unwrap(),
        Admission::Admitted
    );
    assert_eq!(
        dispatcher.submit("https://a.test/", 5).unwrap(),
        Admission::Duplicate
    );
    assert_eq!(
        dispatcher.submit("https://A.test/#top", 0).unwrap(),
        Admission::Duplicate
    );

    let stats = dispatcher.stats().unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(dispatcher.entry("https://a.test/").unwrap().unwrap().priority, 0);
}

#[test]
fn test_resubmission_within_cooldown() {
    let dispatcher = in_memory();
    dispatcher.submit("https://a.test/", 0).unwrap();
    let entry = dispatcher.claim("W1").unwrap().unwrap();
    dispatcher.complete(&entry.url, &Outcome::Success, &[]).unwrap();

    assert_eq!(
        dispatcher.submit("https://a.test/", 0).unwrap(),
        Admission::CooldownRejected
    );
    assert!(!dispatcher.is_eligible("https://a.test/").unwrap());
    assert_eq!(dispatcher.size().unwrap(), 0);
}

fn submit_concurrently(dispatcher: &Arc<Dispatcher>, url: &str, threads: usize) -> Vec<Admission> {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let dispatcher = Arc::clone(dispatcher);
            let barrier = Arc::clone(&barrier);
            let url = url.to_string();
            thread::spawn(move || {
                barrier.wait();
                dispatcher.submit(&url, 0).unwrap()
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_submissions_admit_once() {
    const SUBMITTERS: usize = 16;

    let dir = TempDir::new().unwrap();
    let dispatcher = Arc::new(
        Dispatcher::open(&dir.path().join("queue.db"), DispatcherConfig::default()).unwrap(),
    );

    let results = submit_concurrently(&dispatcher, "https://race.test/page", SUBMITTERS);
    let admitted = results.iter().filter(|r| **r == Admission::Admitted).count();
    let duplicate = results.iter().filter(|r| **r == Admission::Duplicate).count();

    assert_eq!(admitted, 1);
    assert_eq!(duplicate, SUBMITTERS - 1);
    assert_eq!(dispatcher.stats().unwrap().pending, 1);
}

#[test]
fn test_concurrent_resubmissions_after_visit_are_rejected() {
    const SUBMITTERS: usize = 16;

    let dir = TempDir::new().unwrap();
    let dispatcher = Arc::new(
        Dispatcher::open(&dir.path().join("queue.db"), DispatcherConfig::default()).unwrap(),
    );
    dispatcher.submit("https://race.test/page", 0).unwrap();
    let entry = dispatcher.claim("worker-1").unwrap().unwrap();
    dispatcher.complete(&entry.url, &Outcome::Success, &[]).unwrap();

    let results = submit_concurrently(&dispatcher, "https://race.test/page", SUBMITTERS);

    assert!(results.iter().all(|r| *r == Admission::CooldownRejected));
    let stats = dispatcher.stats().unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.done, 1);
}
