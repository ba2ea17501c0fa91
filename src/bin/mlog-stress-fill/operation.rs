use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use mlog_stress::configuration::{Operation, OperationContext, OperationFactory};
use mlog_stress::generator::{DeviceReadingGenerator, MachineLogGenerator};
use mlog_stress::store::RecordSink;

use crate::stats::ShardedStats;

/// The full set of records to be written, addressable by global record index.
pub(crate) enum FillPlan {
    MachineLog(MachineLogGenerator),
    DeviceReadings(DeviceReadingGenerator),
}

impl FillPlan {
    pub fn total_records(&self) -> u64 {
        match self {
            FillPlan::MachineLog(generator) => generator.total_records(),
            FillPlan::DeviceReadings(generator) => generator.total_records(),
        }
    }
}

pub(crate) struct FillOperationFactory {
    sink: Arc<dyn RecordSink>,
    stats: Arc<ShardedStats>,
    plan: Arc<FillPlan>,
    batch_size: u64,
}

impl FillOperationFactory {
    pub fn new(
        sink: Arc<dyn RecordSink>,
        stats: Arc<ShardedStats>,
        plan: Arc<FillPlan>,
        batch_size: u64,
    ) -> Self {
        Self {
            sink,
            stats,
            plan,
            batch_size,
        }
    }
}

impl OperationFactory for FillOperationFactory {
    fn create(&self) -> Box<dyn Operation> {
        Box::new(FillOperation {
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&self.stats),
            plan: Arc::clone(&self.plan),
            batch_size: self.batch_size,
        })
    }
}

// Operation id N owns the records [N * batch_size, (N+1) * batch_size),
// so workers partition the keyspace without coordination.
struct FillOperation {
    sink: Arc<dyn RecordSink>,
    stats: Arc<ShardedStats>,
    plan: Arc<FillPlan>,
    batch_size: u64,
}

#[async_trait]
impl Operation for FillOperation {
    async fn execute(&mut self, ctx: &OperationContext) -> Result<ControlFlow<()>> {
        let total = self.plan.total_records();
        let start = ctx.operation_id.saturating_mul(self.batch_size);
        if start >= total {
            return Ok(ControlFlow::Break(()));
        }
        let end = (start + self.batch_size).min(total);

        let result = match &*self.plan {
            FillPlan::MachineLog(generator) => {
                let batch = generator.batch(start..end);
                self.sink.insert_machine_logs(&batch).await
            }
            FillPlan::DeviceReadings(generator) => {
                let batch = {
                    let mut rng = rand::thread_rng();
                    generator.batch(start..end, &mut rng)
                };
                self.sink.insert_readings(&batch).await
            }
        };

        if let Err(err) = result.as_ref() {
            error!(
                error = %err,
                batch_start = start,
                batch_end = end,
                "insert error",
            );
        }

        let mut stats = self.stats.get_shard_mut();
        stats.account_op(ctx, &result, (end - start) as usize);
        drop(stats);

        result?;
        Ok(ControlFlow::Continue(()))
    }
}
