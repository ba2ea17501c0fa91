use std::ops::Range;

use anyhow::Result;
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};
use rand::Rng;

use crate::model::{DeviceReading, MachineLog};
use crate::period::day_start;

const SECONDS_PER_DAY: u32 = 86_400;

/// The ordered sequence of intra-day offsets at a fixed sampling interval.
///
/// Computed once and reused for every day, so the innermost generation loop
/// never recomputes the fixed pattern. With the default 5-second interval
/// a day has 17,280 ticks, the last one at 23:59:55.
pub struct TickSchedule {
    offsets: Vec<u32>,
}

impl TickSchedule {
    pub fn new(interval_secs: u32) -> Result<Self> {
        anyhow::ensure!(
            interval_secs > 0 && SECONDS_PER_DAY % interval_secs == 0,
            "tick interval must be a positive divisor of a day, got {}s",
            interval_secs,
        );
        Ok(Self {
            offsets: (0..SECONDS_PER_DAY).step_by(interval_secs as usize).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offsets in seconds from midnight, strictly increasing.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }
}

/// How a tick's timestamp is rendered into the record's string fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickFormat {
    /// `2022-01-01T00:00:05.000000Z`, the document-store rendering.
    Iso,
    /// `2022-01-01 00:00:05`, the SQL rendering.
    Sql,
}

impl TickFormat {
    fn label(&self, date: NaiveDate, offset_secs: u32) -> String {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(offset_secs, 0).unwrap();
        match self {
            TickFormat::Iso => format!(
                "{}T{}.000000Z",
                date.format("%Y-%m-%d"),
                time.format("%H:%M:%S")
            ),
            TickFormat::Sql => format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M:%S")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MachineLogConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Number of item series per day. Items only multiply volume here:
    /// all fields derive from the tick number and the date alone.
    pub items: u32,
    pub tick_interval_secs: u32,
    pub format: TickFormat,
}

/// Generates the string-variant records for a date range.
///
/// Records are addressable by a global index in `0..total_records()`, with
/// the tick innermost, then the item, then the day. Random access is what
/// lets concurrent fill workers partition the keyspace by operation id.
pub struct MachineLogGenerator {
    config: MachineLogConfig,
    ticks: TickSchedule,
}

impl MachineLogGenerator {
    pub fn new(config: MachineLogConfig) -> Result<Self> {
        anyhow::ensure!(
            config.start_date <= config.end_date,
            "start date {} is after end date {}",
            config.start_date,
            config.end_date,
        );
        anyhow::ensure!(config.items > 0, "item count must be positive");
        let ticks = TickSchedule::new(config.tick_interval_secs)?;
        Ok(Self { config, ticks })
    }

    fn days(&self) -> u64 {
        self.config
            .end_date
            .signed_duration_since(self.config.start_date)
            .num_days() as u64
            + 1
    }

    pub fn total_records(&self) -> u64 {
        self.days() * self.config.items as u64 * self.ticks.len() as u64
    }

    pub fn record_at(&self, index: u64) -> MachineLog {
        let ticks = self.ticks.len() as u64;
        let per_day = self.config.items as u64 * ticks;
        let day = index / per_day;
        let tick = (index % per_day % ticks) as usize;

        let date = self.config.start_date + Days::new(day);
        let date_str = date.format("%Y-%m-%d").to_string();
        let ts = self.config.format.label(date, self.ticks.offsets()[tick]);
        let n = tick.to_string();

        MachineLog {
            partij_id: format!("{n} G {date_str}"),
            partij_omschrijving: format!("{n}{ts}T{n}"),
            herkomst: format!("{date_str}{n}"),
            maat: format!("{n} | {n}"),
            container: format!("C_{n}"),
            inhaaldatum: date_str,
            locatie: format!("{n}%&{ts}{n}"),
            timestamp: ts,
            value: tick as i64,
        }
    }

    pub fn batch(&self, range: Range<u64>) -> Vec<MachineLog> {
        range.map(|index| self.record_at(index)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct DeviceReadingConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub device_id: i32,
    /// Item ids cycle over `1..=items`, each producing its own series.
    pub items: u32,
    pub tick_interval_secs: u32,
}

/// Generates the numeric-variant records for a date range.
///
/// The record count follows the same day/item/tick layout as the string
/// variant, but timestamps are independently random within each record's
/// day (not ordered) and values are uniform in `[0, 100)`.
pub struct DeviceReadingGenerator {
    config: DeviceReadingConfig,
    ticks: TickSchedule,
}

impl DeviceReadingGenerator {
    pub fn new(config: DeviceReadingConfig) -> Result<Self> {
        anyhow::ensure!(
            config.start_date <= config.end_date,
            "start date {} is after end date {}",
            config.start_date,
            config.end_date,
        );
        anyhow::ensure!(config.items > 0, "item count must be positive");
        let ticks = TickSchedule::new(config.tick_interval_secs)?;
        Ok(Self { config, ticks })
    }

    fn days(&self) -> u64 {
        self.config
            .end_date
            .signed_duration_since(self.config.start_date)
            .num_days() as u64
            + 1
    }

    pub fn total_records(&self) -> u64 {
        self.days() * self.config.items as u64 * self.ticks.len() as u64
    }

    pub fn record_at(
        &self,
        index: u64,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> DeviceReading {
        let ticks = self.ticks.len() as u64;
        let per_day = self.config.items as u64 * ticks;
        let day = index / per_day;
        let item = (index % per_day / ticks) as u32 + 1;

        let date = self.config.start_date + Days::new(day);
        let offset_secs = rng.gen_range(0..SECONDS_PER_DAY);

        DeviceReading {
            device_id: self.config.device_id,
            device_item_id: item as i32,
            created_at: now,
            updated_at: now,
            timestamp: day_start(date) + Duration::seconds(offset_secs as i64),
            value: rng.gen_range(0f64..100f64),
        }
    }

    pub fn batch(&self, range: Range<u64>, rng: &mut impl Rng) -> Vec<DeviceReading> {
        let now = Utc::now();
        range.map(|index| self.record_at(index, now, rng)).collect()
    }
}
