use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::Instant;

/// Defines the configuration of a fill or benchmark run.
pub struct Configuration {
    /// The concurrency with which the run's operations will be performed.
    ///
    /// The tool will spawn as many tokio tasks as this number specifies,
    /// and each task will sequentially perform the operations.
    ///
    /// Must not be zero.
    pub concurrency: u64,

    /// The maximum number of operations to be performed per second.
    /// If `None`, then there is no rate limit imposed.
    pub rate_limit_per_second: Option<f64>,

    /// Creates the operations performed during the run.
    ///
    /// Each worker task gets its own operation object, so per-worker state
    /// (e.g. an RNG) does not need to be synchronized.
    pub operation_factory: Arc<dyn OperationFactory>,
}

/// Contains all necessary context needed to execute an Operation.
pub struct OperationContext {
    /// The current ID of the operation being performed.
    ///
    /// The tool tries to issue operation IDs sequentially, however because
    /// of the parallelism the operations can be reordered. To be more precise,
    /// if an operation with ID `X` > 0 was issued, then the tool has attempted
    /// or will attempt to execute operations of IDs less than `X`.
    ///
    /// Operations are expected to map their ID deterministically onto
    /// a disjoint slice of the workload, which is what makes it possible
    /// to run them concurrently without any further coordination.
    pub operation_id: u64,

    /// The time when the operation was scheduled to start.
    ///
    /// If there is no rate limit configured, this is the moment the worker
    /// became free to start the operation.
    pub scheduled_start_time: Instant,

    /// The time when the operation actually started executing.
    pub actual_start_time: Instant,
}

/// Creates operations for worker tasks.
pub trait OperationFactory: Send + Sync {
    /// Creates an Operation.
    ///
    /// The single operation object is used by a single worker to perform
    /// operations sequentially.
    fn create(&self) -> Box<dyn Operation>;
}

/// Represents an operation which is repeatedly performed during the run.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Executes the operation, given information in the OperationContext.
    ///
    /// The operation should behave deterministically with respect to the
    /// operation ID, i.e. the same slice of work should be attempted when
    /// given exactly the same OperationContext.
    ///
    /// Returns ControlFlow::Break if it should finish work, for example
    /// if the operation ID has exceeded the size of the workload.
    /// In other cases, it returns ControlFlow::Continue.
    async fn execute(&mut self, ctx: &OperationContext) -> Result<ControlFlow<()>>;
}
