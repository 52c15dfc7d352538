//! Bounded fan-out for probes.
//!
//! Items are split into consecutive batches of at most `concurrency` probes.
//! A batch runs concurrently and must drain completely before the next one
//! starts, so no more than `concurrency` probes are ever in flight.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};

use crate::types::{Progress, ProgressFn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStats {
    pub batches: usize,
    pub elapsed: Duration,
}

/// Runs `probe` over every item and returns exactly one result per item.
///
/// Results come back in completion order inside a batch and batch order
/// across batches. `on_progress` fires once per finished probe.
pub async fn run_batched<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    mut probe: F,
    on_progress: Option<ProgressFn<'_>>,
) -> (Vec<R>, ScheduleStats)
where
    T: Display,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    let limit = concurrency.max(1);
    let started = Instant::now();

    log::debug!("[scan::batch] run_batched: items={} concurrency={}", total, limit);

    let mut results = Vec::with_capacity(total);
    let mut completed = 0usize;
    let mut batches = 0usize;
    let mut pending = items.into_iter().peekable();

    while pending.peek().is_some() {
        batches += 1;

        let mut in_flight: FuturesUnordered<_> = pending
            .by_ref()
            .take(limit)
            .map(|item| {
                let label = item.to_string();
                let fut = probe(item);
                async move { (label, fut.await) }
            })
            .collect();

        log::trace!("[scan::batch] batch_started: batch={} size={}", batches, in_flight.len());

        while let Some((label, result)) = in_flight.next().await {
            completed += 1;
            if let Some(report) = on_progress {
                report(Progress {
                    percentage: percentage(completed, total),
                    completed,
                    total,
                    item: label,
                });
            }
            results.push(result);
        }
    }

    let stats = ScheduleStats {
        batches,
        elapsed: started.elapsed(),
    };
    log::debug!("[scan::batch] run_batched_completed: items={} batches={} duration={}ms",
        total, stats.batches, stats.elapsed.as_millis());

    (results, stats)
}

pub(crate) fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 * 100.0) / total as f64).round() as u8
}
