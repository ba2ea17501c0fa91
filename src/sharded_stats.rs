use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use thread_local::ThreadLocal;

pub trait StatsFactory: Send + Sync {
    type Stats: Stats;
    fn create(&self) -> Self::Stats;
}

pub trait Stats: Sync + Send {
    fn clear(&mut self);
    fn combine(&mut self, other: &Self);
}

/// A sharded statistics structure.
///
/// For each thread, a separate instance of the stats structure is kept,
/// and that thread keeps accounting its own statistics in that instance.
/// When it is time to report the statistics, stats from all threads are
/// collected into one object and returned, while the per-thread stats objects
/// are cleared.
///
/// Each shard is protected by a separate parking_lot::Mutex - assuming that
/// the structure is read infrequently (the reporting ticker fires once
/// a second), the shards will be uncontended most of the time.
pub struct ShardedStats<F: StatsFactory> {
    shards: ThreadLocal<Arc<Mutex<F::Stats>>>,
    all: Mutex<Vec<Arc<Mutex<F::Stats>>>>,
    factory: Arc<F>,
}

impl<F: StatsFactory> ShardedStats<F> {
    /// Creates a new ShardedStats with given factory.
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            shards: ThreadLocal::new(),
            all: Mutex::new(Vec::new()),
            factory,
        }
    }

    /// Gets and locks access to this thread's stats structure.
    pub fn get_shard_mut(&self) -> MutexGuard<'_, F::Stats> {
        self.shards
            .get_or(|| {
                let shard = Arc::new(Mutex::new(self.factory.create()));
                self.all.lock().push(shard.clone());
                shard
            })
            .lock()
    }

    /// Combines statistics from all threads and clears all threads' stats.
    pub fn get_combined_and_clear(&self) -> F::Stats {
        let mut combined = self.factory.create();
        for shard in self.all.lock().iter() {
            let shard = &mut shard.lock();
            combined.combine(shard);
            shard.clear();
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CounterFactory;

    struct Counter(u64);

    impl StatsFactory for CounterFactory {
        type Stats = Counter;
        fn create(&self) -> Counter {
            Counter(0)
        }
    }

    impl Stats for Counter {
        fn clear(&mut self) {
            self.0 = 0;
        }
        fn combine(&mut self, other: &Self) {
            self.0 += other.0;
        }
    }

    #[test]
    fn test_combine_and_clear() {
        let stats = Arc::new(ShardedStats::new(Arc::new(CounterFactory)));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.get_shard_mut().0 += 1;
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(stats.get_combined_and_clear().0, 400);
        // All shards were cleared by the previous call
        assert_eq!(stats.get_combined_and_clear().0, 0);
    }
}
