use anyhow::Result;
use mongodb::bson::{doc, Bson, DateTime, Document};

use crate::period::Period;
use crate::store::{AggregateFilter, ReadingStore};

use super::{zero_filled, Aggregator, PeriodAggregates, Statistic};

/// The server-side strategy: one native aggregation over the whole window,
/// computed by the store engine, folded into the shared output shape.
pub struct ServerSide;

#[async_trait]
impl Aggregator for ServerSide {
    async fn aggregate(
        &self,
        store: &dyn ReadingStore,
        filter: &AggregateFilter,
        period: Period,
        stat: Statistic,
    ) -> Result<PeriodAggregates> {
        let rows = store.native_aggregate(filter, period, stat).await?;

        let mut result = zero_filled(filter, period);
        for row in rows {
            let key = period.key_for(row.date);
            if let Some(items) = result.get_mut(&key) {
                if let Some(value) = items.get_mut(&row.device_item_id) {
                    *value = row.value;
                }
            }
        }
        Ok(result)
    }
}

/// Builds the match/group/project/sort pipeline evaluated by the document
/// store: filter on device, item set and window, group per calendar period
/// and item with sum and count reducers, project the period back into a
/// date, and sort by date then item id.
pub fn native_pipeline(
    filter: &AggregateFilter,
    period: Period,
    stat: Statistic,
) -> Vec<Document> {
    let (start, end) = filter.window();
    let match_stage = doc! {
        "$match": {
            "device_id": filter.device_id,
            "device_item_id": { "$in": filter.item_ids.clone() },
            "timestamp": {
                "$gte": DateTime::from_chrono(start),
                "$lt": DateTime::from_chrono(end),
            },
        },
    };

    let mut group_key = doc! {
        "year": { "$year": "$timestamp" },
        "month": { "$month": "$timestamp" },
    };
    let mut date_parts = doc! {
        "year": "$_id.year",
        "month": "$_id.month",
    };
    match period {
        Period::Daily => {
            group_key.insert("day", doc! { "$dayOfMonth": "$timestamp" });
            date_parts.insert("day", "$_id.day");
        }
        Period::Monthly => {
            date_parts.insert("day", 1);
        }
    }
    group_key.insert("device_item_id", "$device_item_id");

    let group_stage = doc! {
        "$group": {
            "_id": group_key,
            "total_value": { "$sum": "$value" },
            "count": { "$sum": 1 },
        },
    };

    let value_expression: Bson = match stat {
        Statistic::Sum => "$total_value".into(),
        Statistic::Average => doc! { "$divide": ["$total_value", "$count"] }.into(),
    };
    let project_stage = doc! {
        "$project": {
            "_id": 0,
            "date": { "$dateFromParts": date_parts },
            "device_item_id": "$_id.device_item_id",
            "value": value_expression,
        },
    };

    let sort_stage = doc! {
        "$sort": { "date": 1, "device_item_id": 1 },
    };

    vec![match_stage, group_stage, project_stage, sort_stage]
}
