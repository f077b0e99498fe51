//! Bounded worker pool
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - Pacing dispatches so the archive host sees spaced requests
//! - Stopping dispatch on cancellation while in-flight work drains
//! - Handing every result back to a single caller-side loop

use crate::state::Pacer;
use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// What happened to the items given to [`WorkerPool::run`]
#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// Items never handed to a worker, in their original order
    pub undispatched: Vec<T>,

    /// Items whose worker panicked; no result was delivered for them
    pub panicked: Vec<T>,

    /// Whether dispatch stopped because the cancellation token fired
    pub cancelled: bool,

    /// Whether dispatch stopped because the result handler asked it to
    pub stopped: bool,
}

/// Runs an async operation over a list of items with at most
/// `max_concurrency` in flight
///
/// Results are delivered to the caller's handler one at a time, in
/// completion order, on the task that called `run`. A failed item never
/// cancels its siblings.
pub struct WorkerPool {
    max_concurrency: usize,
    pacer: Pacer,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `max_concurrency` - Upper bound on simultaneously running workers
    /// * `request_delay` - Minimum spacing between two dispatches
    /// * `cancel` - Token that stops further dispatch when cancelled
    pub fn new(max_concurrency: usize, request_delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            pacer: Pacer::new(request_delay),
            cancel,
        }
    }

    /// Returns the concurrency bound
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns the number of dispatches made so far
    pub fn dispatched(&self) -> u64 {
        self.pacer.request_count
    }

    /// Dispatches `worker` over `items`, feeding each result to `on_result`
    ///
    /// Returning `ControlFlow::Break` from the handler stops further
    /// dispatch; work already in flight still completes and is still handed
    /// to the handler.
    pub async fn run<T, R, W, Fut, H>(
        &mut self,
        items: Vec<T>,
        worker: W,
        mut on_result: H,
    ) -> PoolOutcome<T>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        W: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
        H: FnMut(T, R) -> ControlFlow<()>,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut in_flight: JoinSet<R> = JoinSet::new();
        let mut dispatched: HashMap<Id, T> = HashMap::new();
        let mut panicked = Vec::new();
        let mut queue = items.into_iter().peekable();

        let mut cancelled = false;
        let mut stopped = false;

        while queue.peek().is_some() && !stopped {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }

                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    if let Some((item, result)) = claim(joined, &mut dispatched, &mut panicked) {
                        stopped = on_result(item, result).is_break();
                    }
                }

                permit = semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            cancelled = true;
                            break;
                        }
                        _ = self.pacer.wait_turn() => {}
                    }

                    let Some(item) = queue.next() else { break };
                    let work = worker(item.clone());

                    let handle = in_flight.spawn(async move {
                        let result = work.await;
                        drop(permit);
                        result
                    });
                    dispatched.insert(handle.id(), item);
                }
            }
        }

        let undispatched: Vec<T> = queue.collect();

        if cancelled && !in_flight.is_empty() {
            tracing::info!(
                "Cancellation requested; waiting for {} in-flight downloads",
                in_flight.len()
            );
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            if let Some((item, result)) = claim(joined, &mut dispatched, &mut panicked) {
                if on_result(item, result).is_break() {
                    stopped = true;
                }
            }
        }

        PoolOutcome {
            undispatched,
            panicked,
            cancelled,
            stopped,
        }
    }

    /// Runs `worker` over `items` and collects every `(item, result)` pair
    ///
    /// Pairs come back in completion order, not input order.
    pub async fn map<T, R, W, Fut>(&mut self, items: Vec<T>, worker: W) -> (Vec<(T, R)>, PoolOutcome<T>)
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        W: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let mut results = Vec::new();
        let outcome = self
            .run(items, worker, |item, result| {
                results.push((item, result));
                ControlFlow::Continue(())
            })
            .await;

        (results, outcome)
    }
}

/// Pairs a finished task with the item it was started for
fn claim<T, R>(
    joined: Result<(Id, R), JoinError>,
    dispatched: &mut HashMap<Id, T>,
    panicked: &mut Vec<T>,
) -> Option<(T, R)> {
    match joined {
        Ok((id, result)) => dispatched.remove(&id).map(|item| (item, result)),
        Err(e) => {
            tracing::error!("Worker task failed: {}", e);
            if let Some(item) = dispatched.remove(&e.id()) {
                panicked.push(item);
            }
            None
        }
    }
}
