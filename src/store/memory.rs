use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;

use crate::aggregate::Statistic;
use crate::model::{DeviceReading, MachineLog};
use crate::period::Period;

use super::{AggregateFilter, AggregateRow, ReadingQuery, ReadingStore, RecordSink};

/// An in-memory store.
///
/// Implements both capability traits over plain vectors, with grouping done
/// on the spot for `native_aggregate`. Backs dry-run fills and lets the
/// aggregation equivalence suite run without a live database.
#[derive(Default)]
pub struct MemoryStore {
    machine_logs: Mutex<Vec<MachineLog>>,
    readings: Mutex<Vec<DeviceReading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machine_log_count(&self) -> usize {
        self.machine_logs.lock().len()
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn insert_machine_logs(&self, batch: &[MachineLog]) -> Result<()> {
        self.machine_logs.lock().extend_from_slice(batch);
        Ok(())
    }

    async fn insert_readings(&self, batch: &[DeviceReading]) -> Result<()> {
        self.readings.lock().extend_from_slice(batch);
        Ok(())
    }
}

fn matches(reading: &DeviceReading, query: &ReadingQuery) -> bool {
    reading.device_id == query.device_id
        && query.item_ids.contains(&reading.device_item_id)
        && reading.timestamp >= query.window.0
        && reading.timestamp < query.window.1
}

fn group_date(date: NaiveDate, period: Period) -> NaiveDate {
    match period {
        Period::Daily => date,
        Period::Monthly => date.with_day(1).unwrap(),
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn count_readings(&self) -> Result<u64> {
        Ok(self.readings.lock().len() as u64)
    }

    async fn find_readings(&self, query: &ReadingQuery) -> Result<Vec<DeviceReading>> {
        Ok(self
            .readings
            .lock()
            .iter()
            .filter(|reading| matches(reading, query))
            .cloned()
            .collect())
    }

    async fn native_aggregate(
        &self,
        filter: &AggregateFilter,
        period: Period,
        stat: Statistic,
    ) -> Result<Vec<AggregateRow>> {
        let query = ReadingQuery {
            device_id: filter.device_id,
            item_ids: filter.item_ids.clone(),
            window: filter.window(),
        };

        // BTreeMap keys give the same ordering a sort stage would
        let mut groups: BTreeMap<(NaiveDate, i32), (f64, u64)> = BTreeMap::new();
        for reading in self.readings.lock().iter() {
            if !matches(reading, &query) {
                continue;
            }
            let key = (
                group_date(reading.timestamp.date_naive(), period),
                reading.device_item_id,
            );
            let (sum, count) = groups.entry(key).or_insert((0.0, 0));
            *sum += reading.value;
            *count += 1;
        }

        Ok(groups
            .into_iter()
            .map(|((date, device_item_id), (sum, count))| AggregateRow {
                date,
                device_item_id,
                value: match stat {
                    Statistic::Sum => sum,
                    // A group only exists when count > 0
                    Statistic::Average => sum / count as f64,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::period::day_start;

    fn reading(item: i32, ts: &str, value: f64) -> DeviceReading {
        let timestamp = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S")
            .expect("bad test timestamp")
            .and_utc();
        DeviceReading {
            device_id: 1,
            device_item_id: item,
            created_at: timestamp,
            updated_at: timestamp,
            timestamp,
            value,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_find_readings_window_is_half_open() {
        let store = MemoryStore::new();
        store
            .insert_readings(&[
                reading(1, "2022-01-01 00:00:00", 1.0),
                reading(1, "2022-01-01 23:59:55", 2.0),
                reading(1, "2022-01-02 00:00:00", 4.0),
            ])
            .await
            .unwrap();

        let query = ReadingQuery {
            device_id: 1,
            item_ids: vec![1],
            window: (day_start(date(2022, 1, 1)), day_start(date(2022, 1, 2))),
        };
        let rows = store.find_readings(&query).await.unwrap();
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, [1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_find_readings_filters_items_and_device() {
        let store = MemoryStore::new();
        store
            .insert_readings(&[
                reading(1, "2022-01-01 10:00:00", 1.0),
                reading(4, "2022-01-01 10:00:00", 2.0),
                DeviceReading {
                    device_id: 2,
                    ..reading(1, "2022-01-01 10:00:00", 8.0)
                },
            ])
            .await
            .unwrap();

        let query = ReadingQuery {
            device_id: 1,
            item_ids: vec![1, 2, 3],
            window: (day_start(date(2022, 1, 1)), day_start(date(2022, 1, 2))),
        };
        let rows = store.find_readings(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_native_aggregate_daily_average() {
        let store = MemoryStore::new();
        store
            .insert_readings(&[
                reading(1, "2022-01-01 01:00:00", 10.0),
                reading(1, "2022-01-01 02:00:00", 20.0),
                reading(2, "2022-01-01 03:00:00", 5.0),
                reading(1, "2022-01-02 01:00:00", 40.0),
            ])
            .await
            .unwrap();

        let filter = AggregateFilter {
            device_id: 1,
            item_ids: vec![1, 2],
            start_date: date(2022, 1, 1),
            end_date: date(2022, 1, 2),
        };
        let rows = store
            .native_aggregate(&filter, Period::Daily, Statistic::Average)
            .await
            .unwrap();

        assert_eq!(
            rows,
            [
                AggregateRow {
                    date: date(2022, 1, 1),
                    device_item_id: 1,
                    value: 15.0
                },
                AggregateRow {
                    date: date(2022, 1, 1),
                    device_item_id: 2,
                    value: 5.0
                },
                AggregateRow {
                    date: date(2022, 1, 2),
                    device_item_id: 1,
                    value: 40.0
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_native_aggregate_monthly_sum_groups_by_month() {
        let store = MemoryStore::new();
        store
            .insert_readings(&[
                reading(1, "2022-01-05 01:00:00", 1.0),
                reading(1, "2022-01-20 01:00:00", 2.0),
                reading(1, "2022-02-01 01:00:00", 4.0),
            ])
            .await
            .unwrap();

        let filter = AggregateFilter {
            device_id: 1,
            item_ids: vec![1],
            start_date: date(2022, 1, 1),
            end_date: date(2022, 2, 28),
        };
        let rows = store
            .native_aggregate(&filter, Period::Monthly, Statistic::Sum)
            .await
            .unwrap();

        assert_eq!(
            rows,
            [
                AggregateRow {
                    date: date(2022, 1, 1),
                    device_item_id: 1,
                    value: 3.0
                },
                AggregateRow {
                    date: date(2022, 2, 1),
                    device_item_id: 1,
                    value: 4.0
                },
            ]
        );
    }
}
