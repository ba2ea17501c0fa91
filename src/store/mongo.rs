use anyhow::{bail, Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::{Client, Collection};

use crate::aggregate::{native_pipeline, Statistic};
use crate::model::{DeviceReading, MachineLog};
use crate::period::Period;

use super::{AggregateFilter, AggregateRow, ReadingQuery, ReadingStore, RecordSink};

#[derive(Clone, Debug)]
pub struct MongoStoreConfig {
    pub uri: String,
    pub database: String,
    pub machine_log_collection: String,
    pub readings_collection: String,
}

/// The MongoDB store. Write-capable for both record variants and
/// query-capable through the driver's find and aggregation APIs.
pub struct MongoStore {
    machine_logs: Collection<MachineLog>,
    readings: Collection<DeviceReading>,
}

impl MongoStore {
    pub async fn connect(config: &MongoStoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .with_context(|| format!("failed to connect to mongodb at {}", config.uri))?;
        let db = client.database(&config.database);
        Ok(Self {
            machine_logs: db.collection(&config.machine_log_collection),
            readings: db.collection(&config.readings_collection),
        })
    }
}

#[async_trait]
impl RecordSink for MongoStore {
    async fn insert_machine_logs(&self, batch: &[MachineLog]) -> Result<()> {
        self.machine_logs
            .insert_many(batch)
            .await
            .context("machine log bulk insert failed")?;
        Ok(())
    }

    async fn insert_readings(&self, batch: &[DeviceReading]) -> Result<()> {
        self.readings
            .insert_many(batch)
            .await
            .context("reading bulk insert failed")?;
        Ok(())
    }
}

fn reading_filter(query: &ReadingQuery) -> Document {
    doc! {
        "device_id": query.device_id,
        "device_item_id": { "$in": query.item_ids.clone() },
        "timestamp": {
            "$gte": DateTime::from_chrono(query.window.0),
            "$lt": DateTime::from_chrono(query.window.1),
        },
    }
}

#[async_trait]
impl ReadingStore for MongoStore {
    async fn count_readings(&self) -> Result<u64> {
        Ok(self.readings.count_documents(doc! {}).await?)
    }

    async fn find_readings(&self, query: &ReadingQuery) -> Result<Vec<DeviceReading>> {
        let cursor = self
            .readings
            .find(reading_filter(query))
            .await
            .context("reading query failed")?;
        Ok(cursor.try_collect().await?)
    }

    async fn native_aggregate(
        &self,
        filter: &AggregateFilter,
        period: Period,
        stat: Statistic,
    ) -> Result<Vec<AggregateRow>> {
        let pipeline = native_pipeline(filter, period, stat);
        let mut cursor = self
            .readings
            .aggregate(pipeline)
            .await
            .context("aggregation pipeline failed")?;

        let mut rows = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            rows.push(decode_row(&document)?);
        }
        Ok(rows)
    }
}

fn decode_row(document: &Document) -> Result<AggregateRow> {
    let date = document
        .get_datetime("date")
        .context("aggregation row is missing a date")?
        .to_chrono()
        .date_naive();
    let device_item_id = numeric(document, "device_item_id")? as i32;
    let value = numeric(document, "value")?;
    Ok(AggregateRow {
        date,
        device_item_id,
        value,
    })
}

// $sum yields Double for double inputs but Int32/Int64 for integer ones,
// so the decoder accepts all three.
fn numeric(document: &Document, key: &str) -> Result<f64> {
    match document.get(key) {
        Some(Bson::Double(v)) => Ok(*v),
        Some(Bson::Int32(v)) => Ok(*v as f64),
        Some(Bson::Int64(v)) => Ok(*v as f64),
        other => bail!("unexpected value for {key:?} in aggregation row: {other:?}"),
    }
}
