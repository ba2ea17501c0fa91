use std::collections::BTreeMap;

use anyhow::Result;

use crate::period::Period;
use crate::store::{AggregateFilter, ReadingQuery, ReadingStore};

use super::{zero_filled, Aggregator, PeriodAggregates, Statistic};

/// The client-side strategy: fetch matching records and reduce them here.
///
/// One find round trip per period (12 for a monthly year, one per day for
/// daily), then a single accumulation pass over every fetched record. This
/// is deliberately the naive slow path the server-side pipeline is compared
/// against.
pub struct ClientSide;

#[async_trait]
impl Aggregator for ClientSide {
    async fn aggregate(
        &self,
        store: &dyn ReadingStore,
        filter: &AggregateFilter,
        period: Period,
        stat: Statistic,
    ) -> Result<PeriodAggregates> {
        let mut result = zero_filled(filter, period);
        let (range_start, range_end) = filter.window();

        for bucket in period.buckets(filter.start_date, filter.end_date) {
            // Monthly buckets span whole calendar months; clamp to the
            // filter's range so a partial first or last month fetches the
            // same records the server-side match stage does.
            let window = (
                bucket.window.0.max(range_start),
                bucket.window.1.min(range_end),
            );
            let query = ReadingQuery {
                device_id: filter.device_id,
                item_ids: filter.item_ids.clone(),
                window,
            };
            let readings = store.find_readings(&query).await?;

            let mut groups: BTreeMap<i32, (f64, u64)> = filter
                .item_ids
                .iter()
                .map(|&item| (item, (0.0, 0)))
                .collect();
            for reading in readings {
                if let Some((sum, count)) = groups.get_mut(&reading.device_item_id) {
                    *sum += reading.value;
                    *count += 1;
                }
            }

            let values = groups
                .into_iter()
                .map(|(item, (sum, count))| {
                    let value = match stat {
                        Statistic::Sum => sum,
                        // An empty group averages to zero, never divides
                        Statistic::Average if count == 0 => 0.0,
                        Statistic::Average => sum / count as f64,
                    };
                    (item, value)
                })
                .collect();
            result.insert(bucket.key, values);
        }

        Ok(result)
    }
}
