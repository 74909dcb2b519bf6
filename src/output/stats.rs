//! Statistics generation from the scheduler database
//!
//! This module provides functionality for extracting and displaying
//! queue, ledger and worker statistics.

use crate::dispatcher::{Dispatcher, QueueStats};
use crate::storage::{Storage, VisitRecord};
use crate::worker::PoolStats;
use crate::Result;

/// How many domains the summary lists
const TOP_DOMAINS: usize = 10;

/// How many recent visits the summary lists
const RECENT_VISITS: usize = 10;

/// Scheduler statistics summary
#[derive(Debug, Clone)]
pub struct SchedulerStatistics {
    /// Entry counts by state plus ledger size
    pub queue: QueueStats,

    /// Domains with the most queue entries
    pub top_domains: Vec<(String, u64)>,

    /// Most recently visited URLs, newest first
    pub recent_visits: Vec<VisitRecord>,
}

impl SchedulerStatistics {
    pub fn total_entries(&self) -> u64 {
        self.queue.pending + self.queue.claimed + self.queue.done + self.queue.failed
    }
}

/// Loads statistics through the dispatcher
///
/// # Arguments
///
/// * `dispatcher` - The dispatcher owning the queue and ledger
///
/// # Returns
///
/// * `Ok(SchedulerStatistics)` - Successfully loaded statistics
/// * `Err(SchedulerError)` - Failed to query storage
pub fn load_statistics<S: Storage>(dispatcher: &Dispatcher<S>) -> Result<SchedulerStatistics> {
    Ok(SchedulerStatistics {
        queue: dispatcher.stats()?,
        top_domains: dispatcher.domain_counts(TOP_DOMAINS)?,
        recent_visits: dispatcher.recent_visits(RECENT_VISITS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SchedulerStatistics) {
    println!("=== Queue Statistics ===\n");

    let total = stats.total_entries();
    println!("Entries by State:");
    for (label, count) in [
        ("pending", stats.queue.pending),
        ("claimed", stats.queue.claimed),
        ("done", stats.queue.done),
        ("failed", stats.queue.failed),
    ] {
        println!("  {}: {} ({:.1}%)", label, count, percentage(count, total));
    }
    println!("  total: {}", total);
    println!();

    println!("Visit Ledger:");
    println!("  URLs visited: {}", stats.queue.total_visits);
    println!();

    if !stats.top_domains.is_empty() {
        println!("Top Domains ({}):", stats.top_domains.len());
        for (domain, count) in &stats.top_domains {
            println!("  {}: {}", domain, count);
        }
        println!();
    }

    if !stats.recent_visits.is_empty() {
        println!("Recent Visits:");
        for visit in &stats.recent_visits {
            println!(
                "  {} [{}] {} (visited {} times)",
                visit.last_visited_at.format("%Y-%m-%d %H:%M:%S"),
                visit.last_status,
                visit.url,
                visit.visit_count
            );
        }
        println!();
    }

    let finished = stats.queue.done + stats.queue.failed;
    println!(
        "Success Rate: {:.1}% ({} / {} finished entries succeeded)",
        percentage(stats.queue.done, finished),
        stats.queue.done,
        finished
    );
}

/// Prints per-worker counters and step timings
pub fn print_pool_statistics(stats: &PoolStats) {
    println!("=== Worker Statistics ===\n");
    println!(
        "Workers: {} ({} running), {} processed, {} failed",
        stats.total_workers,
        stats.running,
        stats.total_processed(),
        stats.total_failed()
    );

    for worker in &stats.workers {
        println!();
        println!(
            "{}: {} processed, {} failed{}",
            worker.id,
            worker.processed_count,
            worker.failed_count,
            if worker.running { "" } else { " (stopped)" }
        );
        for (step, summary) in &worker.step_timings {
            println!(
                "  {:<10} avg {:.3}s  min {:.3}s  max {:.3}s  ({} samples)",
                step.as_str(),
                summary.avg_secs,
                summary.min_secs,
                summary.max_secs,
                summary.count
            );
        }
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::dispatcher::Outcome;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_load_statistics() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let dispatcher = Dispatcher::new(storage, DispatcherConfig::default()).unwrap();
        dispatcher.submit("https://a.test/", 0).unwrap();
        dispatcher.submit("https://a.test/other", 0).unwrap();
        dispatcher.submit("https://b.test/", 0).unwrap();

        let entry = dispatcher.claim("worker-1").unwrap().unwrap();
        dispatcher.complete(&entry.url, &Outcome::Success, &[]).unwrap();

        let stats = load_statistics(&dispatcher).unwrap();
        assert_eq!(stats.total_entries(), 3);
        assert_eq!(stats.queue.done, 1);
        assert_eq!(stats.queue.pending, 2);
        assert_eq!(stats.queue.total_visits, 1);
        assert_eq!(stats.top_domains[0], ("a.test".to_string(), 2));
        assert_eq!(stats.recent_visits.len(), 1);
    }

    #[test]
    fn test_percentage_of_nothing() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }
}
