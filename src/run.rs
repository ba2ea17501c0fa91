use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;

use crate::configuration::{Configuration, Operation, OperationContext};

// Rate limits operations by issuing timestamps indicating when the next
// operation should happen. Uses atomics, can be shared between threads.
struct RateLimiter {
    base: Instant,
    increment_nanos: u64,
    nanos_counter: AtomicU64,
}

impl RateLimiter {
    pub fn new(base: Instant, ops_per_second: f64) -> Self {
        let increment_nanos = (1_000_000_000f64 / ops_per_second) as u64;
        Self {
            base,
            increment_nanos,
            nanos_counter: AtomicU64::new(0),
        }
    }

    pub fn issue_next_start_time(&self) -> Instant {
        let nanos = self
            .nanos_counter
            .fetch_add(self.increment_nanos, Ordering::Relaxed);

        self.base + Duration::from_nanos(nanos)
    }
}

// When an operation ID equal or larger to this value is issued, the worker
// task will stop itself. This is used in the `ask_to_stop` method
// which sets the operation_counter to this value. The value of this constant
// is chosen to be very large so that it is impossible to reach it, and
// small enough so that operation execution attempts which happen after
// `ask_to_stop` do not overflow it.
const INVALID_OP_ID_THRESHOLD: u64 = 1u64 << 63u64;

// Represents shareable state and configuration of a worker.
struct WorkerContext {
    operation_counter: AtomicU64,
    rate_limiter: Option<RateLimiter>,
}

impl WorkerContext {
    pub fn new(config: &Configuration, now: Instant) -> Self {
        Self {
            operation_counter: AtomicU64::new(0),
            rate_limiter: config
                .rate_limit_per_second
                .map(|rate| RateLimiter::new(now, rate)),
        }
    }

    // Prevents more operations from being issued
    pub fn ask_to_stop(&self) {
        self.operation_counter
            .store(INVALID_OP_ID_THRESHOLD, Ordering::Relaxed);
    }

    // Issues the next operation id. If the context got a signal to stop,
    // it will return `None`.
    fn issue_operation_id(&self) -> Option<u64> {
        let id = self.operation_counter.fetch_add(1, Ordering::Relaxed);
        (id < INVALID_OP_ID_THRESHOLD).then_some(id)
    }

    // Repeatedly runs the `operation` until it is asked to stop
    // or an execution of the `operation` will either return `Err`
    // or `ControlFlow::Break`.
    pub async fn run_worker(&self, mut operation: Box<dyn Operation>) -> Result<()> {
        while let Some(op_id) = self.issue_operation_id() {
            let scheduled_start_time = match &self.rate_limiter {
                Some(rate_limiter) => {
                    let start_time = rate_limiter.issue_next_start_time();
                    tokio::time::sleep_until(start_time).await;
                    start_time
                }
                None => Instant::now(),
            };

            let ctx = OperationContext {
                operation_id: op_id,
                scheduled_start_time,
                actual_start_time: Instant::now(),
            };

            match operation.execute(&ctx).await {
                Ok(ControlFlow::Continue(_)) => continue,
                Ok(ControlFlow::Break(_)) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

pub async fn run(config: Configuration) -> Result<()> {
    let start_time = Instant::now();
    let ctx = Arc::new(WorkerContext::new(&config, start_time));

    // Spawn as many worker tasks as the concurrency allows
    let mut worker_handles = (0..config.concurrency)
        .map(|_| {
            let ctx_clone = Arc::clone(&ctx);
            let operation = config.operation_factory.create();
            let (fut, handle) = async move { ctx_clone.run_worker(operation).await }.remote_handle();
            tokio::task::spawn(fut);
            handle
        })
        .collect::<FuturesUnordered<_>>();

    let mut result: Result<()> = Ok(());

    // The first error stops the run; partial data written so far stays
    // in the store.
    while let Some(worker_result) = worker_handles.next().await {
        if let Err(err) = worker_result {
            if result.is_ok() {
                result = Err(err);
            }
            ctx.ask_to_stop();
        }
    }

    result
}
