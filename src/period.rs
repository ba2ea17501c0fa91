use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

/// An aggregation bucket granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    Monthly,
    Daily,
}

/// One aggregation bucket: its textual key and its half-open UTC window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub window: (DateTime<Utc>, DateTime<Utc>),
}

impl Period {
    /// Enumerates the buckets covering the inclusive date range.
    ///
    /// Monthly buckets always span whole calendar months, even when the range
    /// starts or ends mid-month; each bucket's window is half-open, so
    /// consecutive buckets never overlap and never leave gaps.
    pub fn buckets(&self, start: NaiveDate, end: NaiveDate) -> Vec<Bucket> {
        let mut buckets = Vec::new();
        match self {
            Period::Daily => {
                let mut day = start;
                while day <= end {
                    let next = day + Days::new(1);
                    buckets.push(Bucket {
                        key: day.format("%Y-%m-%d").to_string(),
                        window: (day_start(day), day_start(next)),
                    });
                    day = next;
                }
            }
            Period::Monthly => {
                let (mut year, mut month) = (start.year(), start.month());
                loop {
                    let first = month_start(year, month);
                    if first > end {
                        break;
                    }
                    let (next_year, next_month) = next_month(year, month);
                    buckets.push(Bucket {
                        key: format!("{year:04}-{month:02}"),
                        window: (day_start(first), day_start(month_start(next_year, next_month))),
                    });
                    (year, month) = (next_year, next_month);
                }
            }
        }
        buckets
    }

    /// The bucket key a given date falls into.
    pub fn key_for(&self, date: NaiveDate) -> String {
        match self {
            Period::Monthly => date.format("%Y-%m").to_string(),
            Period::Daily => date.format("%Y-%m-%d").to_string(),
        }
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "month" | "monthly" => Ok(Period::Monthly),
            "day" | "daily" => Ok(Period::Daily),
            _ => Err(anyhow::anyhow!(
                "invalid period {:?}, expected \"month\" or \"day\"",
                s
            )),
        }
    }
}

/// Midnight UTC of the given day.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// First day of the given month. `month` must be in 1..=12.
pub fn month_start(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_buckets_cover_year() {
        let buckets = Period::Monthly.buckets(date(2022, 1, 1), date(2022, 12, 31));
        assert_eq!(buckets.len(), 12);
        assert_eq!(buckets[0].key, "2022-01");
        assert_eq!(buckets[11].key, "2022-12");

        // Windows are half-open and contiguous
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].window.1, pair[1].window.0);
        }
        assert_eq!(buckets[0].window.0, day_start(date(2022, 1, 1)));
        assert_eq!(buckets[11].window.1, day_start(date(2023, 1, 1)));
    }

    #[test]
    fn test_monthly_buckets_across_year_boundary() {
        let buckets = Period::Monthly.buckets(date(2022, 11, 15), date(2023, 2, 1));
        let keys: Vec<_> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["2022-11", "2022-12", "2023-01", "2023-02"]);
    }

    #[test]
    fn test_daily_buckets_single_day() {
        let buckets = Period::Daily.buckets(date(2022, 6, 1), date(2022, 6, 1));
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].key, "2022-06-01");
        assert_eq!(
            buckets[0].window,
            (day_start(date(2022, 6, 1)), day_start(date(2022, 6, 2)))
        );
    }

    #[test]
    fn test_daily_bucket_count_full_year() {
        let buckets = Period::Daily.buckets(date(2022, 1, 1), date(2022, 12, 31));
        assert_eq!(buckets.len(), 365);
    }

    #[test]
    fn test_key_for() {
        assert_eq!(Period::Monthly.key_for(date(2022, 3, 14)), "2022-03");
        assert_eq!(Period::Daily.key_for(date(2022, 3, 14)), "2022-03-14");
    }

    #[test]
    fn test_period_from_str() {
        assert_eq!("month".parse::<Period>().unwrap(), Period::Monthly);
        assert_eq!("daily".parse::<Period>().unwrap(), Period::Daily);
        assert!("week".parse::<Period>().is_err());
    }
}
