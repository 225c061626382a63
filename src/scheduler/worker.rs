//! Scrape workers: fetch, convert and write one target per job.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::RetryHint;
use crate::scraper::{ScrapeError, Scraper};
use crate::target::{PlatformId, ScrapeTarget};
use crate::writer::{PointsWriter, WriteError};

/// Shared job queue receiver. Workers take turns pulling from it.
pub(super) type JobQueue = Arc<Mutex<mpsc::Receiver<ScrapeTarget>>>;

/// What a single job ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Outcome {
    /// Points were written; the count is what reached the writer.
    Written(usize),
    /// The fetch produced no storable points, so nothing was written.
    Empty,
    ScrapeFailed,
    WriteFailed,
    Cancelled,
}

/// Everything a worker needs besides its queue.
pub(super) struct WorkerContext {
    pub scraper: Arc<dyn Scraper>,
    pub writer: Arc<dyn PointsWriter>,
    pub cancel: CancellationToken,
}

fn retry_after_ms(hint: &impl RetryHint) -> Option<u64> {
    hint.retry_after()
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Worker loop. Exits when cancelled or when the queue is closed.
pub(super) async fn run(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    jobs: JobQueue,
    done: mpsc::UnboundedSender<PlatformId>,
) {
    tracing::debug!(worker_id, "Worker started");
    loop {
        let job = {
            let mut rx = jobs.lock().await;
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(target) = job else {
            break;
        };

        let outcome = execute(&ctx, &target).await;
        tracing::trace!(worker_id, target_id = %target.id, ?outcome, "Job finished");

        // The coordinator may already be gone during shutdown.
        let _ = done.send(target.id);
        if outcome == Outcome::Cancelled {
            break;
        }
    }
    tracing::debug!(worker_id, "Worker stopped");
}

/// Run one scrape job. Failures are logged here and never propagated.
pub(super) async fn execute(ctx: &WorkerContext, target: &ScrapeTarget) -> Outcome {
    let metrics = match ctx.scraper.fetch(target, &ctx.cancel).await {
        Ok(metrics) => metrics,
        Err(ScrapeError::Cancelled(_)) => return Outcome::Cancelled,
        Err(e) => {
            tracing::warn!(
                target_id = %target.id,
                url = %target.url,
                code = %e.code(),
                retry_after_ms = retry_after_ms(&e),
                error = %e,
                "Scrape failed"
            );
            return Outcome::ScrapeFailed;
        }
    };

    let (points, conversion_error) = metrics.points().into_result();
    if let Some(e) = conversion_error {
        tracing::warn!(
            target_id = %target.id,
            dropped = e.dropped().len(),
            kept = points.len(),
            error = %e,
            "Some metrics could not be converted"
        );
    }
    if points.is_empty() {
        tracing::debug!(target_id = %target.id, "Scrape produced no points");
        return Outcome::Empty;
    }

    let count = points.len();
    match ctx
        .writer
        .write_points(&ctx.cancel, target.org_id, target.bucket_id, points)
        .await
    {
        Ok(()) => {
            tracing::debug!(target_id = %target.id, points = count, "Points written");
            Outcome::Written(count)
        }
        Err(WriteError::Cancelled) => Outcome::Cancelled,
        Err(e) => {
            tracing::warn!(
                target_id = %target.id,
                org_id = %target.org_id,
                bucket_id = %target.bucket_id,
                code = %e.code(),
                retry_after_ms = retry_after_ms(&e),
                error = %e,
                "Writing points failed"
            );
            Outcome::WriteFailed
        }
    }
}
