#[macro_use]
extern crate async_trait;

mod args;
mod operation;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mlog_stress::configuration::Configuration;
use mlog_stress::generator::{
    DeviceReadingConfig, DeviceReadingGenerator, MachineLogConfig, MachineLogGenerator,
};
use mlog_stress::sharded_stats::{Stats as _, StatsFactory as _};
use mlog_stress::store::{MemoryStore, MongoStore, MongoStoreConfig, MySqlStore, RecordSink};

use crate::args::{parse_fill_args, FillArgs, StoreKind, Variant};
use crate::operation::{FillOperationFactory, FillPlan};
use crate::stats::{ShardedStats, StatsFactory, StatsPrinter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let fill_args = match parse_fill_args(std::env::args())? {
        Some(fill_args) => fill_args,
        None => return Ok(()),
    };
    let fill_args = Arc::new(fill_args);

    fill_args.print_configuration();

    let stats_factory = Arc::new(StatsFactory::new(fill_args.measure_latency));
    let sharded_stats = Arc::new(ShardedStats::new(Arc::clone(&stats_factory)));

    let run_config = prepare(Arc::clone(&fill_args), Arc::clone(&sharded_stats))
        .await
        .context("failed to prepare the fill run")?;

    let mut combined_stats = stats_factory.create();
    let printer = StatsPrinter::new(fill_args.measure_latency);

    let run_finished = mlog_stress::run::run(run_config);
    futures::pin_mut!(run_finished);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    // Skip the first tick, which is immediate
    ticker.tick().await;

    printer.print_header(&mut std::io::stdout())?;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let partial_stats = sharded_stats.get_combined_and_clear();
                printer.print_partial(&partial_stats, &mut std::io::stdout())?;
                combined_stats.combine(&partial_stats);
            }
            result = &mut run_finished => {
                if result.is_ok() {
                    // Combine stats for the last time
                    let partial_stats = sharded_stats.get_combined_and_clear();
                    combined_stats.combine(&partial_stats);
                    printer.print_final(&combined_stats, &mut std::io::stdout())?;
                }
                return result.context("an error occurred during the fill run");
            }
        }
    }
}

async fn prepare(fill_args: Arc<FillArgs>, stats: Arc<ShardedStats>) -> Result<Configuration> {
    let plan = build_plan(&fill_args)?;
    info!(total_records = plan.total_records(), "fill plan ready");

    let sink = build_sink(&fill_args).await?;
    let operation_factory =
        FillOperationFactory::new(sink, stats, Arc::new(plan), fill_args.batch_size);

    let rate_limit_per_second = (fill_args.max_rate > 0).then(|| fill_args.max_rate as f64);

    Ok(Configuration {
        concurrency: fill_args.concurrency,
        rate_limit_per_second,
        operation_factory: Arc::new(operation_factory),
    })
}

fn build_plan(fill_args: &FillArgs) -> Result<FillPlan> {
    match fill_args.variant {
        Variant::MachineLog => {
            let generator = MachineLogGenerator::new(MachineLogConfig {
                start_date: fill_args.start_date,
                end_date: fill_args.end_date,
                items: fill_args.items,
                tick_interval_secs: fill_args.tick_interval,
                format: fill_args.tick_format(),
            })?;
            Ok(FillPlan::MachineLog(generator))
        }
        Variant::DeviceReadings => {
            let generator = DeviceReadingGenerator::new(DeviceReadingConfig {
                start_date: fill_args.start_date,
                end_date: fill_args.end_date,
                device_id: fill_args.device_id,
                items: fill_args.items,
                tick_interval_secs: fill_args.tick_interval,
            })?;
            Ok(FillPlan::DeviceReadings(generator))
        }
    }
}

async fn build_sink(fill_args: &FillArgs) -> Result<Arc<dyn RecordSink>> {
    match fill_args.store {
        StoreKind::MongoDb => {
            let store = MongoStore::connect(&MongoStoreConfig {
                uri: fill_args.uri.clone(),
                database: fill_args.database.clone(),
                machine_log_collection: fill_args.machine_log_target.clone(),
                readings_collection: fill_args.readings_target.clone(),
            })
            .await?;
            Ok(Arc::new(store))
        }
        StoreKind::MySql => {
            let store = MySqlStore::connect(
                &fill_args.uri,
                &fill_args.machine_log_target,
                &fill_args.readings_target,
            )
            .await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
