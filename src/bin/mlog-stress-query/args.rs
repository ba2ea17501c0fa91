use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use mlog_stress::aggregate::Statistic;
use mlog_stress::period::Period;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Strategy {
    Client,
    Server,
    Both,
}

impl Strategy {
    pub fn runs_client(&self) -> bool {
        matches!(self, Strategy::Client | Strategy::Both)
    }

    pub fn runs_server(&self) -> bool {
        matches!(self, Strategy::Server | Strategy::Both)
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client" => Ok(Strategy::Client),
            "server" => Ok(Strategy::Server),
            "both" => Ok(Strategy::Both),
            _ => Err(anyhow::anyhow!(
                "invalid strategy {:?}, expected \"client\", \"server\" or \"both\"",
                s
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct QueryArgs {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub device_id: i32,
    pub item_ids: Vec<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period: Period,
    pub stat: Statistic,
    pub strategy: Strategy,
    pub out: Option<PathBuf>,
    pub count: bool,
    pub find_item: Option<i32>,
}

impl QueryArgs {
    pub fn print_configuration(&self) {
        println!("Database:\t{}", self.database);
        println!("Collection:\t{}", self.collection);
        println!("Device:\t\t{}", self.device_id);
        println!("Items:\t\t{:?}", self.item_ids);
        println!("Date range:\t{} .. {}", self.start_date, self.end_date);
        println!("Period:\t\t{:?}", self.period);
        println!("Statistic:\t{:?}", self.stat);
        println!("Strategy:\t{:?}", self.strategy);
    }
}

fn print_usage(program_name: &str) {
    println!("Usage: {program_name} [OPTIONS]");
    println!();
    println!("Runs the sum/average aggregation benchmark against a seeded");
    println!("reading collection, via the client-side loop, the server-side");
    println!("pipeline, or both (comparing their results).");
    println!();
    println!("Options:");
    println!("  --uri <URI>                  connection string (default: $MLOG_URI)");
    println!("  --database <NAME>            database name (default: mlog)");
    println!("  --collection <NAME>          reading collection (default: device_log)");
    println!("  --device-id <N>              device to filter on (default: 1)");
    println!("  --items <N,N,...>            item ids to aggregate (default: 1,2,3)");
    println!("  --start-date <YYYY-MM-DD>    first day, inclusive (default: 2022-01-01)");
    println!("  --end-date <YYYY-MM-DD>      last day, inclusive (default: 2022-12-31)");
    println!("  --period <month|day>         aggregation bucket (default: month)");
    println!("  --stat <sum|average>         reducer (default: average)");
    println!("  --strategy <client|server|both>");
    println!("  --out <PATH>                 write results as JSON instead of stdout");
    println!("  --count                      count documents before aggregating");
    println!("  --find-item <N>              also time a raw fetch of one item's readings");
}

/// Parses and validates query frontend params. Returns `None` when help
/// was requested.
pub(crate) fn parse_query_args<I, S>(mut args: I) -> Result<Option<QueryArgs>>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let program_name = args
        .next()
        .map(|s| s.as_ref().to_owned())
        .unwrap_or_else(|| "mlog-stress-query".to_owned());

    let mut parsed = QueryArgs {
        uri: std::env::var("MLOG_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_owned()),
        database: "mlog".to_owned(),
        collection: "device_log".to_owned(),
        device_id: 1,
        item_ids: vec![1, 2, 3],
        start_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
        period: Period::Monthly,
        stat: Statistic::Average,
        strategy: Strategy::Both,
        out: None,
        count: false,
        find_item: None,
    };

    while let Some(flag) = args.next() {
        let flag = flag.as_ref();
        match flag {
            "--help" | "-h" => {
                print_usage(&program_name);
                return Ok(None);
            }
            "--uri" => parsed.uri = take_value(&mut args, flag)?,
            "--database" => parsed.database = take_value(&mut args, flag)?,
            "--collection" => parsed.collection = take_value(&mut args, flag)?,
            "--device-id" => parsed.device_id = parse_value(&mut args, flag)?,
            "--items" => parsed.item_ids = parse_item_list(&take_value(&mut args, flag)?)?,
            "--start-date" => parsed.start_date = parse_value(&mut args, flag)?,
            "--end-date" => parsed.end_date = parse_value(&mut args, flag)?,
            "--period" => parsed.period = parse_value(&mut args, flag)?,
            "--stat" => parsed.stat = parse_value(&mut args, flag)?,
            "--strategy" => parsed.strategy = parse_value(&mut args, flag)?,
            "--out" => parsed.out = Some(PathBuf::from(take_value(&mut args, flag)?)),
            "--count" => parsed.count = true,
            "--find-item" => parsed.find_item = Some(parse_value(&mut args, flag)?),
            _ => anyhow::bail!("unknown flag {:?}", flag),
        }
    }

    anyhow::ensure!(
        parsed.start_date <= parsed.end_date,
        "start date {} is after end date {}",
        parsed.start_date,
        parsed.end_date,
    );
    anyhow::ensure!(!parsed.item_ids.is_empty(), "--items must not be empty");

    Ok(Some(parsed))
}

fn parse_item_list(list: &str) -> Result<Vec<i32>> {
    list.split(',')
        .map(|item| {
            item.trim()
                .parse()
                .with_context(|| format!("invalid item id {:?}", item))
        })
        .collect()
}

fn take_value<I, S>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    args.next()
        .map(|value| value.as_ref().to_owned())
        .ok_or_else(|| anyhow::anyhow!("missing value for {}", flag))
}

fn parse_value<I, S, T>(args: &mut I, flag: &str) -> Result<T>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    take_value(args, flag)?
        .parse()
        .map_err(Into::into)
        .with_context(|| format!("invalid value for {flag}"))
}
