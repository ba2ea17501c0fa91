mod args;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use mlog_stress::aggregate::{
    max_abs_diff, Aggregator, ClientSide, PeriodAggregates, ServerSide,
};
use mlog_stress::store::{
    AggregateFilter, MongoStore, MongoStoreConfig, ReadingQuery, ReadingStore,
};
use mlog_stress::timing::timed;

use crate::args::{parse_query_args, QueryArgs};

// Above this, the two strategies are considered to disagree and the
// benchmark fails.
const EQUIVALENCE_TOLERANCE: f64 = 1e-9;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let query_args = match parse_query_args(std::env::args())? {
        Some(query_args) => query_args,
        None => return Ok(()),
    };

    query_args.print_configuration();
    println!();

    let store = MongoStore::connect(&MongoStoreConfig {
        uri: query_args.uri.clone(),
        database: query_args.database.clone(),
        machine_log_collection: "machine_log".to_owned(),
        readings_collection: query_args.collection.clone(),
    })
    .await
    .context("failed to connect to the store")?;

    let filter = AggregateFilter {
        device_id: query_args.device_id,
        item_ids: query_args.item_ids.clone(),
        start_date: query_args.start_date,
        end_date: query_args.end_date,
    };

    if query_args.count {
        let (count, elapsed) = timed("count", store.count_readings()).await;
        println!("Documents:\t{} ({})", count?, format_secs(elapsed));
    }

    // Raw fetch of one item's readings over the whole window, timed as its
    // own benchmark signal
    if let Some(item) = query_args.find_item {
        let query = ReadingQuery {
            device_id: query_args.device_id,
            item_ids: vec![item],
            window: filter.window(),
        };
        let (readings, elapsed) = timed("find", store.find_readings(&query)).await;
        println!(
            "Item {} readings:\t{} ({})",
            item,
            readings?.len(),
            format_secs(elapsed)
        );
    }

    let client_result = if query_args.strategy.runs_client() {
        Some(run_strategy(&ClientSide, "client", &store, &filter, &query_args).await?)
    } else {
        None
    };
    let server_result = if query_args.strategy.runs_server() {
        Some(run_strategy(&ServerSide, "server", &store, &filter, &query_args).await?)
    } else {
        None
    };

    if let (Some(client), Some(server)) = (&client_result, &server_result) {
        let difference = max_abs_diff(client, server);
        println!("Max difference:\t{difference:e}");
        anyhow::ensure!(
            difference <= EQUIVALENCE_TOLERANCE,
            "client-side and server-side results differ by {} (tolerance {})",
            difference,
            EQUIVALENCE_TOLERANCE,
        );
    }

    // When both ran the results are equal within tolerance, so either
    // will do for the report
    let result = client_result
        .or(server_result)
        .context("no strategy was selected")?;
    report(&result, &query_args)?;

    Ok(())
}

async fn run_strategy(
    aggregator: &dyn Aggregator,
    name: &str,
    store: &MongoStore,
    filter: &AggregateFilter,
    query_args: &QueryArgs,
) -> Result<PeriodAggregates> {
    let (result, elapsed) = timed(
        name,
        aggregator.aggregate(store, filter, query_args.period, query_args.stat),
    )
    .await;
    println!("{}:\t\t{}", capitalize(name), format_secs(elapsed));
    result.with_context(|| format!("{name}-side aggregation failed"))
}

fn report(result: &PeriodAggregates, query_args: &QueryArgs) -> Result<()> {
    match &query_args.out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, result)?;
            println!("Results written to {}", path.display());
        }
        None => {
            println!();
            for (key, items) in result {
                for (item, value) in items {
                    println!("{key}\titem {item}\t{value:.4}");
                }
            }
        }
    }
    Ok(())
}

fn format_secs(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
