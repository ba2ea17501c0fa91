use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use hdrhistogram::Histogram;
use tokio::time::Instant;

use mlog_stress::configuration::OperationContext;
use mlog_stress::sharded_stats;

pub(crate) type ShardedStats = sharded_stats::ShardedStats<StatsFactory>;

pub(crate) struct StatsFactory {
    measure_latency: bool,
}

impl StatsFactory {
    pub fn new(measure_latency: bool) -> Self {
        Self { measure_latency }
    }
}

impl sharded_stats::StatsFactory for StatsFactory {
    type Stats = Stats;

    fn create(&self) -> Stats {
        Stats {
            operations: 0,
            rows: 0,
            errors: 0,
            latency: self
                .measure_latency
                .then(|| Histogram::new(3).unwrap()),
        }
    }
}

pub(crate) struct Stats {
    pub operations: u64,
    pub rows: u64,
    pub errors: u64,
    // Per-operation latency in nanoseconds, measured from the scheduled
    // start time
    pub latency: Option<Histogram<u64>>,
}

impl sharded_stats::Stats for Stats {
    fn clear(&mut self) {
        self.operations = 0;
        self.rows = 0;
        self.errors = 0;
        if let Some(latency) = &mut self.latency {
            latency.reset();
        }
    }

    fn combine(&mut self, other: &Self) {
        self.operations += other.operations;
        self.rows += other.rows;
        self.errors += other.errors;
        if let (Some(latency), Some(other_latency)) = (&mut self.latency, &other.latency) {
            latency.add(other_latency).unwrap();
        }
    }
}

impl Stats {
    pub fn account_op(&mut self, ctx: &OperationContext, result: &Result<()>, rows: usize) {
        self.operations += 1;
        match result {
            Ok(()) => {
                self.rows += rows as u64;
                if let Some(latency) = &mut self.latency {
                    let elapsed = Instant::now() - ctx.scheduled_start_time;
                    let _ = latency.record(elapsed.as_nanos() as u64);
                }
            }
            Err(_) => {
                self.errors += 1;
            }
        }
    }
}

pub(crate) struct StatsPrinter {
    start_time: Instant,
    with_latency: bool,
}

impl StatsPrinter {
    pub fn new(with_latency: bool) -> Self {
        Self {
            start_time: Instant::now(),
            with_latency,
        }
    }

    pub fn print_header(&self, out: &mut impl Write) -> Result<()> {
        if self.with_latency {
            writeln!(
                out,
                "{:>8} {:>8} {:>10} {:>6} {:>9} {:>9} {:>9}",
                "time", "ops/s", "rows/s", "errors", "p50", "p99", "max",
            )?;
        } else {
            writeln!(
                out,
                "{:>8} {:>8} {:>10} {:>6}",
                "time", "ops/s", "rows/s", "errors",
            )?;
        }
        Ok(())
    }

    // Stats passed here are from a single 1-second interval, so the raw
    // counts are already per-second rates.
    pub fn print_partial(&self, stats: &Stats, out: &mut impl Write) -> Result<()> {
        let time = Instant::now() - self.start_time;
        if let (true, Some(latency)) = (self.with_latency, &stats.latency) {
            writeln!(
                out,
                "{:>8} {:>8} {:>10} {:>6} {:>9} {:>9} {:>9}",
                format_secs(time),
                stats.operations,
                stats.rows,
                stats.errors,
                format_latency(latency.value_at_quantile(0.5)),
                format_latency(latency.value_at_quantile(0.99)),
                format_latency(latency.max()),
            )?;
        } else {
            writeln!(
                out,
                "{:>8} {:>8} {:>10} {:>6}",
                format_secs(time),
                stats.operations,
                stats.rows,
                stats.errors,
            )?;
        }
        Ok(())
    }

    pub fn print_final(&self, stats: &Stats, out: &mut impl Write) -> Result<()> {
        let time = Instant::now() - self.start_time;
        writeln!(out)?;
        writeln!(out, "Results:")?;
        writeln!(out, "Time:\t\t{}", format_secs(time))?;
        writeln!(out, "Total ops:\t{}", stats.operations)?;
        writeln!(out, "Total rows:\t{}", stats.rows)?;
        if stats.errors != 0 {
            writeln!(out, "Total errors:\t{}", stats.errors)?;
        }

        let rows_per_second = stats.rows as f64 / time.as_secs_f64();
        writeln!(out, "Rows/s:\t\t{rows_per_second:.0}")?;

        if let Some(latency) = &stats.latency {
            writeln!(out, "Write latency:")?;
            writeln!(
                out,
                "  median:\t{}",
                format_latency(latency.value_at_quantile(0.5))
            )?;
            writeln!(
                out,
                "  95th:\t\t{}",
                format_latency(latency.value_at_quantile(0.95))
            )?;
            writeln!(
                out,
                "  99th:\t\t{}",
                format_latency(latency.value_at_quantile(0.99))
            )?;
            writeln!(out, "  max:\t\t{}", format_latency(latency.max()))?;
        }

        Ok(())
    }
}

fn format_secs(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

fn format_latency(nanos: u64) -> String {
    format!("{:.1}ms", nanos as f64 / 1_000_000.0)
}
