//! Fixed worker pool for loading large row sets in chunks.
//!
//! `[0, item_count)` is cut into contiguous chunks that a bounded queue hands
//! to a fixed number of tasks. The first failing chunk is reported as soon as
//! it is observed, without waiting for the rest. Chunks are independent
//! writes: when an error is returned, any other chunk may or may not have
//! been applied, so callers must not assume atomicity.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use rolescope_core::{AppError, AppResult};

/// What happens to undispatched chunks once one chunk fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep handing out the remaining chunks to surviving workers in the
    /// background, applying as much as possible.
    #[default]
    DrainDispatched,
    /// Stop dispatching; workers finish the chunk they hold and exit.
    CancelRemaining,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Items per chunk.
    pub batch_size: usize,
    /// Behaviour after the first failure.
    pub failure_policy: FailurePolicy,
}

impl BatchOptions {
    /// Creates options with the default failure policy.
    #[must_use]
    pub fn new(workers: usize, batch_size: usize) -> Self {
        Self {
            workers,
            batch_size,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Overrides the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// Half-open item range handled by one worker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkBounds {
    /// Inclusive start.
    pub start: usize,
    /// Exclusive end.
    pub end: usize,
}

impl ChunkBounds {
    /// Returns the chunk as a range, usable to slice the source rows.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns the number of items in the chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns whether the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partitions `[0, item_count)` into chunks of `batch_size`; the last one may
/// be shorter. A zero batch size is treated as one.
pub fn chunk_bounds(item_count: usize, batch_size: usize) -> impl Iterator<Item = ChunkBounds> {
    let batch_size = batch_size.max(1);
    (0..item_count)
        .step_by(batch_size)
        .map(move |start| ChunkBounds {
            start,
            end: start.saturating_add(batch_size).min(item_count),
        })
}

/// Runs `each` over every chunk of `[0, item_count)` on a fixed worker pool.
///
/// Returns `Ok(())` once every chunk succeeded, or the first failure wrapped
/// in [`AppError::PartialBatch`] with the failing chunk bounds. Zero items
/// succeed immediately without calling `each`.
pub async fn run_batches<F, Fut>(options: BatchOptions, item_count: usize, each: F) -> AppResult<()>
where
    F: Fn(ChunkBounds) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    if item_count == 0 {
        return Ok(());
    }

    if options.workers == 0 {
        return Err(AppError::Validation(
            "bulk loader needs at least one worker".to_owned(),
        ));
    }

    if options.batch_size == 0 {
        return Err(AppError::Validation(
            "bulk loader batch size must be greater than zero".to_owned(),
        ));
    }

    let each = Arc::new(each);
    let stopped = Arc::new(AtomicBool::new(false));
    let cancel_on_failure = options.failure_policy == FailurePolicy::CancelRemaining;
    let (chunk_sender, chunk_receiver) = mpsc::channel::<ChunkBounds>(1);
    let chunk_receiver = Arc::new(Mutex::new(chunk_receiver));
    let (error_sender, mut error_receiver) = mpsc::channel::<AppError>(1);

    let mut workers = Vec::with_capacity(options.workers);
    for worker in 0..options.workers {
        let each = Arc::clone(&each);
        let stopped = Arc::clone(&stopped);
        let chunk_receiver = Arc::clone(&chunk_receiver);
        let error_sender = error_sender.clone();

        workers.push(tokio::spawn(async move {
            loop {
                if stopped.load(Ordering::Acquire) {
                    break;
                }

                let next = chunk_receiver.lock().await.recv().await;
                let Some(bounds) = next else {
                    break;
                };
                if stopped.load(Ordering::Acquire) {
                    break;
                }

                if let Err(error) = each(bounds).await {
                    warn!(
                        worker,
                        start = bounds.start,
                        end = bounds.end,
                        error = %error,
                        "bulk load chunk failed"
                    );
                    if cancel_on_failure {
                        stopped.store(true, Ordering::Release);
                    }
                    // Only the first failure is kept.
                    let _ = error_sender.try_send(AppError::PartialBatch {
                        start: bounds.start,
                        end: bounds.end,
                        source: Box::new(error),
                    });
                    break;
                }
            }
        }));
    }
    // Workers own the queue from here; once they all exit, dispatch fails.
    drop(chunk_receiver);

    let dispatch_stopped = Arc::clone(&stopped);
    let completion_error_sender = error_sender;
    let batch_size = options.batch_size;
    let dispatcher = tokio::spawn(async move {
        for bounds in chunk_bounds(item_count, batch_size) {
            if dispatch_stopped.load(Ordering::Acquire) {
                break;
            }
            if chunk_sender.send(bounds).await.is_err() {
                break;
            }
        }
        drop(chunk_sender);

        for worker in workers {
            if let Err(error) = worker.await {
                let _ = completion_error_sender.try_send(AppError::Internal(format!(
                    "bulk load worker stopped unexpectedly: {error}"
                )));
            }
        }
    });

    tokio::select! {
        biased;
        Some(error) = error_receiver.recv() => Err(error),
        joined = dispatcher => {
            joined.map_err(|error| {
                AppError::Internal(format!("bulk load dispatcher stopped unexpectedly: {error}"))
            })?;

            match error_receiver.try_recv() {
                Ok(error) => Err(error),
                Err(_) => Ok(()),
            }
        }
    }
}
