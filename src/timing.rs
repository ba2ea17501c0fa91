use std::future::Future;
use std::time::{Duration, Instant};

use tracing::info;

/// Measures the wall-clock time of a future.
///
/// The elapsed time is logged on completion and returned alongside the
/// future's output, so callers can both report it and use it as the
/// benchmark signal.
pub async fn timed<T, F>(name: &str, fut: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    let elapsed = start.elapsed();
    info!(task = name, elapsed_secs = elapsed.as_secs_f64(), "task finished");
    (output, elapsed)
}
