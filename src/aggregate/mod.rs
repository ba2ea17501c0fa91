mod client;
mod server;

pub use client::ClientSide;
pub use server::{native_pipeline, ServerSide};

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Result;

use crate::period::Period;
use crate::store::{AggregateFilter, ReadingStore};

/// The reducer applied to every period/item group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statistic {
    Sum,
    Average,
}

impl FromStr for Statistic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(Statistic::Sum),
            "average" | "avg" => Ok(Statistic::Average),
            _ => Err(anyhow::anyhow!(
                "invalid statistic {:?}, expected \"sum\" or \"average\"",
                s
            )),
        }
    }
}

/// The output shape shared by both strategies: period key to item id to
/// aggregated value. Every period in the filter's range is present, with
/// zeros for item ids that had no matching records.
pub type PeriodAggregates = BTreeMap<String, BTreeMap<i32, f64>>;

/// An aggregation strategy.
///
/// The two implementations, [`ClientSide`] and [`ServerSide`], are selected
/// at call time and must produce equivalent results for the same predicate,
/// which is what the benchmark (and the test suite) compares.
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn aggregate(
        &self,
        store: &dyn ReadingStore,
        filter: &AggregateFilter,
        period: Period,
        stat: Statistic,
    ) -> Result<PeriodAggregates>;
}

/// Every period in range mapped to zeros for every requested item id.
///
/// Both strategies start from this shape, so an empty period yields an
/// all-zero mapping rather than a missing key, and the two outputs can be
/// diffed directly.
fn zero_filled(filter: &AggregateFilter, period: Period) -> PeriodAggregates {
    period
        .buckets(filter.start_date, filter.end_date)
        .into_iter()
        .map(|bucket| {
            let zeros = filter.item_ids.iter().map(|&item| (item, 0.0)).collect();
            (bucket.key, zeros)
        })
        .collect()
}

/// The largest absolute difference between two result maps.
///
/// Returns infinity when the shapes differ, which counts as maximal
/// disagreement between the strategies.
pub fn max_abs_diff(a: &PeriodAggregates, b: &PeriodAggregates) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    let mut max = 0.0f64;
    for (key, a_items) in a {
        let Some(b_items) = b.get(key) else {
            return f64::INFINITY;
        };
        if a_items.len() != b_items.len() {
            return f64::INFINITY;
        }
        for (item, a_value) in a_items {
            let Some(b_value) = b_items.get(item) else {
                return f64::INFINITY;
            };
            max = max.max((a_value - b_value).abs());
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rand::Rng;

    use super::*;
    use crate::generator::{DeviceReadingConfig, DeviceReadingGenerator};
    use crate::store::{MemoryStore, RecordSink};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn filter(start: NaiveDate, end: NaiveDate) -> AggregateFilter {
        AggregateFilter {
            device_id: 1,
            item_ids: vec![1, 2, 3],
            start_date: start,
            end_date: end,
        }
    }

    async fn seeded_store(
        start: NaiveDate,
        end: NaiveDate,
        items: u32,
        tick_interval_secs: u32,
    ) -> MemoryStore {
        let generator = DeviceReadingGenerator::new(DeviceReadingConfig {
            start_date: start,
            end_date: end,
            device_id: 1,
            items,
            tick_interval_secs,
        })
        .unwrap();

        let store = MemoryStore::new();
        let mut rng = rand::thread_rng();
        let batch = generator.batch(0..generator.total_records(), &mut rng);
        store.insert_readings(&batch).await.unwrap();
        store
    }

    #[test]
    fn test_zero_filled_shape() {
        let zeros = zero_filled(&filter(date(2022, 1, 1), date(2022, 3, 31)), Period::Monthly);
        assert_eq!(zeros.len(), 3);
        for items in zeros.values() {
            assert_eq!(items.len(), 3);
            assert!(items.values().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_max_abs_diff() {
        let mut a = PeriodAggregates::new();
        a.insert("2022-01".into(), [(1, 1.0), (2, 2.0)].into_iter().collect());
        let mut b = a.clone();
        assert_eq!(max_abs_diff(&a, &b), 0.0);

        b.get_mut("2022-01").unwrap().insert(2, 2.5);
        assert_eq!(max_abs_diff(&a, &b), 0.5);

        b.remove("2022-01");
        assert_eq!(max_abs_diff(&a, &b), f64::INFINITY);
    }

    #[test]
    fn test_statistic_from_str() {
        assert_eq!("sum".parse::<Statistic>().unwrap(), Statistic::Sum);
        assert_eq!("avg".parse::<Statistic>().unwrap(), Statistic::Average);
        assert!("median".parse::<Statistic>().is_err());
    }

    // The scenario from the seeding benchmark: 1 day x 3 items x 5-second
    // ticks, then both strategies must agree on the per-item averages.
    #[tokio::test]
    async fn test_strategies_agree_on_dense_day() {
        let day = date(2022, 6, 1);
        let store = seeded_store(day, day, 3, 5).await;
        assert_eq!(store.count_readings().await.unwrap(), 51_840);

        let filter = filter(day, day);
        let client = ClientSide
            .aggregate(&store, &filter, Period::Daily, Statistic::Average)
            .await
            .unwrap();
        let server = ServerSide
            .aggregate(&store, &filter, Period::Daily, Statistic::Average)
            .await
            .unwrap();

        assert!(max_abs_diff(&client, &server) <= 1e-9);
        // Uniform values in [0, 100) over 17,280 samples hug the mean
        for &value in client["2022-06-01"].values() {
            assert!((30.0..70.0).contains(&value), "average was {value}");
        }
    }

    #[tokio::test]
    async fn test_strategies_agree_monthly() {
        let store = seeded_store(date(2022, 1, 1), date(2022, 2, 28), 3, 3600).await;
        let filter = filter(date(2022, 1, 1), date(2022, 2, 28));

        for stat in [Statistic::Sum, Statistic::Average] {
            let client = ClientSide
                .aggregate(&store, &filter, Period::Monthly, stat)
                .await
                .unwrap();
            let server = ServerSide
                .aggregate(&store, &filter, Period::Monthly, stat)
                .await
                .unwrap();
            assert!(max_abs_diff(&client, &server) <= 1e-9);
        }
    }

    #[tokio::test]
    async fn test_monthly_sum_equals_sum_of_daily_sums() {
        let store = seeded_store(date(2022, 1, 1), date(2022, 1, 31), 3, 3600).await;
        let filter = filter(date(2022, 1, 1), date(2022, 1, 31));

        let monthly = ClientSide
            .aggregate(&store, &filter, Period::Monthly, Statistic::Sum)
            .await
            .unwrap();
        let daily = ServerSide
            .aggregate(&store, &filter, Period::Daily, Statistic::Sum)
            .await
            .unwrap();

        for item in [1, 2, 3] {
            let from_days: f64 = daily.values().map(|items| items[&item]).sum();
            let difference = (monthly["2022-01"][&item] - from_days).abs();
            assert!(difference <= 1e-6, "difference was {difference}");
        }
    }

    fn reading_at(item: i32, day: NaiveDate, value: f64) -> crate::model::DeviceReading {
        let ts = crate::period::day_start(day) + chrono::Duration::hours(12);
        crate::model::DeviceReading {
            device_id: 1,
            device_item_id: item,
            created_at: ts,
            updated_at: ts,
            timestamp: ts,
            value,
        }
    }

    // A monthly range that starts mid-month: the bucket spans all of
    // January, but only records within the requested dates may count.
    #[tokio::test]
    async fn test_strategies_agree_on_mid_month_range() {
        let store = MemoryStore::new();
        store
            .insert_readings(&[
                reading_at(1, date(2022, 1, 5), 42.0),
                reading_at(1, date(2022, 1, 20), 7.0),
            ])
            .await
            .unwrap();

        let filter = AggregateFilter {
            device_id: 1,
            item_ids: vec![1],
            start_date: date(2022, 1, 15),
            end_date: date(2022, 1, 31),
        };

        for stat in [Statistic::Sum, Statistic::Average] {
            let client = ClientSide
                .aggregate(&store, &filter, Period::Monthly, stat)
                .await
                .unwrap();
            let server = ServerSide
                .aggregate(&store, &filter, Period::Monthly, stat)
                .await
                .unwrap();
            assert!(max_abs_diff(&client, &server) <= 1e-9);
            // The January 5th reading is outside the range
            assert_eq!(client["2022-01"][&1], 7.0);
        }
    }

    #[tokio::test]
    async fn test_empty_month_is_all_zeros() {
        // Data in January only; February must still be present, all zeros
        let store = seeded_store(date(2022, 1, 1), date(2022, 1, 31), 3, 3600).await;
        let filter = filter(date(2022, 1, 1), date(2022, 2, 28));

        for aggregator in [&ClientSide as &dyn Aggregator, &ServerSide] {
            let result = aggregator
                .aggregate(&store, &filter, Period::Monthly, Statistic::Average)
                .await
                .unwrap();
            let february = &result["2022-02"];
            assert_eq!(february.len(), 3);
            assert!(february.values().all(|&v| v == 0.0));
        }
    }

    #[tokio::test]
    async fn test_aggregation_is_idempotent() {
        let store = seeded_store(date(2022, 3, 1), date(2022, 3, 3), 3, 3600).await;
        let filter = filter(date(2022, 3, 1), date(2022, 3, 3));

        let first = ClientSide
            .aggregate(&store, &filter, Period::Daily, Statistic::Average)
            .await
            .unwrap();
        let second = ClientSide
            .aggregate(&store, &filter, Period::Daily, Statistic::Average)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_item_filter_is_respected() {
        let store = seeded_store(date(2022, 1, 1), date(2022, 1, 1), 10, 3600).await;
        let filter = AggregateFilter {
            device_id: 1,
            item_ids: vec![3],
            start_date: date(2022, 1, 1),
            end_date: date(2022, 1, 1),
        };

        let result = ClientSide
            .aggregate(&store, &filter, Period::Daily, Statistic::Sum)
            .await
            .unwrap();
        let items: Vec<i32> = result["2022-01-01"].keys().copied().collect();
        assert_eq!(items, [3]);

        // thread_rng makes exact sums unpredictable, but 24 values in
        // [0, 100) are bounded
        let sum = result["2022-01-01"][&3];
        assert!(sum > 0.0 && sum < 2_400.0);
    }
}
