//! Background terrain generation on a pool of named worker threads.
//!
//! Any synchronous [`TerrainSource`] becomes an asynchronous
//! [`TerrainProvider`] by wrapping it in a [`ThreadedTerrainProvider`].
//! Jobs go through a bounded channel; a full queue hands the responder
//! back so the surface retries on a later frame.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Sender, TrySendError, bounded};
use dashmap::DashMap;
use strata_geo::{TileKey, TilingScheme};

use super::{Credit, TerrainData, TerrainProvider};
use crate::error::LoadFailure;
use crate::request::Responder;

/// Synchronous terrain generation, run off the frame thread.
pub trait TerrainSource: Send + Sync + 'static {
    fn tiling_scheme(&self) -> &TilingScheme;

    fn level_maximum_geometric_error(&self, level: u32) -> f64;

    fn maximum_level(&self) -> u32 {
        20
    }

    fn approximate_height_range(&self, _key: TileKey) -> (f64, f64) {
        (0.0, 0.0)
    }

    fn has_water_mask(&self) -> bool {
        false
    }

    /// Produce the tile. Called on a worker thread.
    fn generate(&self, key: TileKey) -> Result<TerrainData, LoadFailure>;
}

struct Job {
    key: TileKey,
    responder: Responder<TerrainData>,
    cancelled: Arc<AtomicBool>,
}

/// Worker threads pulling generation jobs for one source.
pub struct WorkerPool<S: TerrainSource> {
    job_sender: Sender<Job>,
    active_jobs: Arc<DashMap<TileKey, Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
    source: Arc<S>,
}

impl<S: TerrainSource> WorkerPool<S> {
    /// Spawn `thread_count` workers sharing a queue of `queue_capacity` jobs.
    pub fn new(source: Arc<S>, thread_count: usize, queue_capacity: usize) -> io::Result<Self> {
        let (job_sender, job_receiver) = bounded::<Job>(queue_capacity.max(1));
        let active_jobs: Arc<DashMap<TileKey, Arc<AtomicBool>>> = Arc::new(DashMap::new());
        let in_flight = Arc::new(AtomicU64::new(0));

        for index in 0..thread_count.max(1) {
            let receiver = job_receiver.clone();
            let source = Arc::clone(&source);
            let active_jobs = Arc::clone(&active_jobs);
            let in_flight = Arc::clone(&in_flight);

            std::thread::Builder::new()
                .name(format!("terrain-worker-{index}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // Dropping the responder reports the job as cancelled.
                        if !job.cancelled.load(Ordering::Relaxed) {
                            let result = source.generate(job.key);
                            if !job.cancelled.load(Ordering::Relaxed) {
                                job.responder.resolve(result);
                            }
                        }
                        active_jobs.remove_if(&job.key, |_, flag| Arc::ptr_eq(flag, &job.cancelled));
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })?;
        }

        Ok(Self {
            job_sender,
            active_jobs,
            in_flight,
            source,
        })
    }

    /// A pool sized from the number of CPU cores, leaving headroom for the
    /// frame thread.
    pub fn with_defaults(source: Arc<S>) -> io::Result<Self> {
        let threads = num_cpus::get().saturating_sub(2).max(1);
        Self::new(source, threads, 64)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Queue `key` for generation, or hand the responder back if the queue
    /// is full.
    pub fn submit(&self, key: TileKey, responder: Responder<TerrainData>) -> Result<(), Responder<TerrainData>> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_jobs.insert(key, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let job = Job {
            key,
            responder,
            cancelled,
        };
        self.job_sender.try_send(job).map_err(|error| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            let job = match error {
                TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
            };
            self.active_jobs
                .remove_if(&job.key, |_, flag| Arc::ptr_eq(flag, &job.cancelled));
            job.responder
        })
    }

    /// Cancel a queued or running job. No-op once it has finished.
    pub fn cancel(&self, key: &TileKey) {
        if let Some((_, cancelled)) = self.active_jobs.remove(key) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.active_jobs.iter() {
            entry.value().store(true, Ordering::Relaxed);
        }
        self.active_jobs.clear();
    }

    /// Jobs queued or running.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.active_jobs.contains_key(key)
    }
}

impl<S: TerrainSource> Drop for WorkerPool<S> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// A [`TerrainProvider`] generating tiles on a [`WorkerPool`].
pub struct ThreadedTerrainProvider<S: TerrainSource> {
    pool: WorkerPool<S>,
    credits: Vec<Credit>,
}

impl<S: TerrainSource> ThreadedTerrainProvider<S> {
    pub fn new(pool: WorkerPool<S>) -> Self {
        Self {
            pool,
            credits: Vec::new(),
        }
    }

    pub fn with_credit(mut self, credit: Credit) -> Self {
        self.credits.push(credit);
        self
    }

    pub fn pool(&self) -> &WorkerPool<S> {
        &self.pool
    }
}

impl<S: TerrainSource> TerrainProvider for ThreadedTerrainProvider<S> {
    fn tiling_scheme(&self) -> &TilingScheme {
        self.pool.source().tiling_scheme()
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.pool.source().level_maximum_geometric_error(level)
    }

    fn maximum_level(&self) -> u32 {
        self.pool.source().maximum_level()
    }

    fn approximate_height_range(&self, key: TileKey) -> (f64, f64) {
        self.pool.source().approximate_height_range(key)
    }

    fn has_water_mask(&self) -> bool {
        self.pool.source().has_water_mask()
    }

    fn credits(&self) -> Vec<Credit> {
        self.credits.clone()
    }

    fn request_tile(
        &self,
        key: TileKey,
        responder: Responder<TerrainData>,
    ) -> Result<(), Responder<TerrainData>> {
        self.pool.submit(key, responder)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use strata_geo::Ellipsoid;

    use super::*;
    use crate::request::{Completion, CompletionQueue, TerrainToken};
    use crate::tile::TileId;

    struct FlatSource {
        scheme: TilingScheme,
    }

    impl TerrainSource for FlatSource {
        fn tiling_scheme(&self) -> &TilingScheme {
            &self.scheme
        }

        fn level_maximum_geometric_error(&self, level: u32) -> f64 {
            1000.0 / f64::from(1u32 << level)
        }

        fn generate(&self, key: TileKey) -> Result<TerrainData, LoadFailure> {
            if key.level > 3 {
                return Err(LoadFailure::not_found("too deep"));
            }
            Ok(TerrainData::flat(4, 4))
        }
    }

    fn pool(threads: usize, capacity: usize) -> WorkerPool<FlatSource> {
        let source = Arc::new(FlatSource {
            scheme: TilingScheme::geographic(Ellipsoid::WGS84),
        });
        WorkerPool::new(source, threads, capacity).unwrap()
    }

    fn wait_for(queue: &CompletionQueue, count: usize) -> Vec<Completion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut completions = Vec::new();
        while completions.len() < count && Instant::now() < deadline {
            completions.extend(queue.drain());
            std::thread::sleep(Duration::from_millis(1));
        }
        completions
    }

    /// Generated tiles and failures both come back through the responder.
    #[test]
    fn test_jobs_resolve_on_worker_threads() {
        let pool = pool(2, 8);
        let queue = CompletionQueue::new();
        for (index, level) in [0u32, 5].into_iter().enumerate() {
            let token = TerrainToken {
                tile: TileId::new(index as u32, 0),
                provider_epoch: 0,
            };
            assert!(pool.submit(TileKey::new(level, 0, 0), queue.terrain_responder(token)).is_ok());
        }

        let completions = wait_for(&queue, 2);
        assert_eq!(completions.len(), 2);
        let failures = completions
            .iter()
            .filter(|completion| matches!(completion, Completion::Terrain(_, Err(_))))
            .count();
        assert_eq!(failures, 1);
    }

    /// A cancelled job still answers exactly once.
    #[test]
    fn test_cancelled_job_reports_cancellation() {
        let pool = pool(1, 8);
        let queue = CompletionQueue::new();
        let key = TileKey::new(2, 1, 1);
        let token = TerrainToken {
            tile: TileId::new(0, 0),
            provider_epoch: 0,
        };
        assert!(pool.submit(key, queue.terrain_responder(token)).is_ok());
        pool.cancel(&key);

        let completions = wait_for(&queue, 1);
        // Either the worker finished first or the dropped responder reported
        // the cancellation; exactly one completion arrives.
        assert_eq!(completions.len(), 1);
        assert!(!pool.is_pending(&key));
    }

    #[test]
    fn test_threaded_provider_delegates_to_source() {
        let provider = ThreadedTerrainProvider::new(pool(1, 4));
        assert_eq!(provider.level_zero_tiles().len(), 2);
        assert!((provider.level_maximum_geometric_error(1) - 500.0).abs() < 1e-9);
    }
}
