mod memory;
mod mongo;
mod mysql;

pub use memory::MemoryStore;
pub use mongo::{MongoStore, MongoStoreConfig};
pub use mysql::MySqlStore;

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::aggregate::Statistic;
use crate::model::{DeviceReading, MachineLog};
use crate::period::{day_start, Period};

/// A predicate over the reading collection: one device, a set of item ids
/// and a half-open time window.
#[derive(Clone, Debug)]
pub struct ReadingQuery {
    pub device_id: i32,
    pub item_ids: Vec<i32>,
    pub window: (DateTime<Utc>, DateTime<Utc>),
}

/// The predicate shared by both aggregation strategies.
#[derive(Clone, Debug)]
pub struct AggregateFilter {
    pub device_id: i32,
    pub item_ids: Vec<i32>,
    /// Inclusive, whole calendar days.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AggregateFilter {
    /// The half-open UTC window covering the whole date range.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            day_start(self.start_date),
            day_start(self.end_date + Days::new(1)),
        )
    }
}

/// One group produced by a store engine's native aggregation: the first day
/// of the period (for monthly groups, the first of the month), the item id,
/// and the aggregated value, ordered by date then item id.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateRow {
    pub date: NaiveDate,
    pub device_item_id: i32,
    pub value: f64,
}

/// A write-capable collection or table.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert_machine_logs(&self, batch: &[MachineLog]) -> Result<()>;
    async fn insert_readings(&self, batch: &[DeviceReading]) -> Result<()>;
}

/// A query-capable reading collection.
///
/// `find_readings` is the raw fetch used by the client-side aggregation
/// strategy; `native_aggregate` is the store engine's own group/project/sort
/// path used by the server-side strategy.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn count_readings(&self) -> Result<u64>;

    async fn find_readings(&self, query: &ReadingQuery) -> Result<Vec<DeviceReading>>;

    async fn native_aggregate(
        &self,
        filter: &AggregateFilter,
        period: Period,
        stat: Statistic,
    ) -> Result<Vec<AggregateRow>>;
}
