//! Day-granular prediction cache with single-flight computation
//!
//! Blocks are keyed by calendar date and always hold exactly 24 hourly
//! predictions. Concurrent callers that miss on the same date share one
//! in-flight computation: the first caller installs a shared future in the
//! in-flight map, later callers clone and await it, and the entry is removed
//! once the block has been written to the store. Unrelated dates never wait
//! on each other.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::stepper::StepOutput;
use crate::domain::DayBlock;
use crate::error::{ForecastError, Result};

/// Persistence for day blocks; technology is up to the adapter.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, date: NaiveDate) -> AnyResult<Option<DayBlock>>;

    /// Overwrites any block stored for the same date.
    async fn put(&self, block: DayBlock) -> AnyResult<()>;

    /// Drop blocks for `from..=to`; returns how many were removed.
    async fn invalidate(&self, from: NaiveDate, to: NaiveDate) -> AnyResult<usize>;
}

/// In-process store with optional expiry.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    blocks: RwLock<HashMap<NaiveDate, DayBlock>>,
    ttl: Option<Duration>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: std::time::Duration) -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(ttl).ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    fn is_fresh(&self, block: &DayBlock) -> bool {
        match self.ttl {
            Some(ttl) => Utc::now() - block.inserted_at < ttl,
            None => true,
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, date: NaiveDate) -> AnyResult<Option<DayBlock>> {
        let block = self.blocks.read().get(&date).cloned();
        match block {
            Some(block) if self.is_fresh(&block) => Ok(Some(block)),
            Some(_) => {
                self.blocks.write().remove(&date);
                debug!(%date, "day block expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, block: DayBlock) -> AnyResult<()> {
        self.blocks.write().insert(block.date, block);
        Ok(())
    }

    async fn invalidate(&self, from: NaiveDate, to: NaiveDate) -> AnyResult<usize> {
        let mut blocks = self.blocks.write();
        let before = blocks.len();
        blocks.retain(|date, _| *date < from || *date > to);
        Ok(before - blocks.len())
    }
}

/// A freshly computed day: the 24 steps of one orchestrator run.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRun {
    pub date: NaiveDate,
    pub steps: Vec<StepOutput>,
}

impl DayRun {
    pub fn predictions(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.prediction).collect()
    }
}

/// How a day was obtained. Every caller sharing a computation receives
/// the same value.
#[derive(Debug, Clone, PartialEq)]
pub enum DayFetch {
    /// Predictions only; residual history for these hours is not recoverable.
    Cached(DayBlock),
    Computed(Arc<DayRun>),
}

impl DayFetch {
    pub fn predictions(&self) -> Vec<f64> {
        match self {
            DayFetch::Cached(block) => block.predictions().to_vec(),
            DayFetch::Computed(run) => run.predictions(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, DayFetch::Cached(_))
    }
}

type InflightDay = Shared<BoxFuture<'static, Result<DayFetch>>>;
type InflightMap = Arc<Mutex<HashMap<NaiveDate, InflightDay>>>;

pub struct DayBlockCache {
    store: Arc<dyn CacheStore>,
    inflight: InflightMap,
}

impl DayBlockCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, date: NaiveDate) -> Result<Option<DayBlock>> {
        self.store.get(date).await.map_err(cache_error)
    }

    /// Store a full day; any length other than 24 is rejected and the
    /// existing entry is left as it was.
    pub async fn put(&self, date: NaiveDate, predictions: Vec<f64>) -> Result<()> {
        let block = DayBlock::new(date, predictions)?;
        self.store.put(block).await.map_err(cache_error)
    }

    pub async fn invalidate(&self, from: NaiveDate, to: NaiveDate) -> Result<usize> {
        let removed = self.store.invalidate(from, to).await.map_err(cache_error)?;
        info!(%from, %to, removed, "invalidated day blocks");
        Ok(removed)
    }

    /// Number of dates currently being computed.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Return the cached block for `date`, or run `compute` once for all
    /// concurrent callers and cache its predictions.
    ///
    /// `compute` runs on the blocking pool.
    pub async fn get_or_compute<F>(&self, date: NaiveDate, compute: F) -> Result<DayFetch>
    where
        F: FnOnce() -> Result<DayRun> + Send + 'static,
    {
        if let Some(block) = self.get(date).await? {
            debug!(%date, "day block cache hit");
            return Ok(DayFetch::Cached(block));
        }

        let (shared, leader) = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&date) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let fut = compute_and_store(
                        self.store.clone(),
                        self.inflight.clone(),
                        date,
                        compute,
                    )
                    .boxed()
                    .shared();
                    inflight.insert(date, fut.clone());
                    (fut, true)
                }
            }
        };

        if leader {
            debug!(%date, "day block cache miss, computing");
        } else {
            debug!(%date, "joining in-flight day block computation");
        }
        shared.await
    }
}

impl std::fmt::Debug for DayBlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DayBlockCache")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

async fn compute_and_store<F>(
    store: Arc<dyn CacheStore>,
    inflight: InflightMap,
    date: NaiveDate,
    compute: F,
) -> Result<DayFetch>
where
    F: FnOnce() -> Result<DayRun> + Send + 'static,
{
    let outcome: Result<DayFetch> = async {
        // another computation may have landed between the caller's miss and now
        if let Some(block) = store.get(date).await.map_err(cache_error)? {
            return Ok(DayFetch::Cached(block));
        }
        let run = tokio::task::spawn_blocking(compute)
            .await
            .map_err(|e| ForecastError::Internal(format!("day block task failed: {e}")))??;
        let block = DayBlock::new(date, run.predictions())?;
        store.put(block).await.map_err(cache_error)?;
        info!(%date, "day block computed and cached");
        Ok(DayFetch::Computed(Arc::new(run)))
    }
    .await;

    inflight.lock().remove(&date);
    outcome
}

fn cache_error(e: anyhow::Error) -> ForecastError {
    ForecastError::Cache(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::stepper::CorrectionStatus;
    use crate::domain::day_start;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn flat_run(date: NaiveDate, value: f64) -> DayRun {
        let start = day_start(date);
        DayRun {
            date,
            steps: (0..24)
                .map(|h| StepOutput {
                    timestamp: start + Duration::hours(h),
                    prediction: value,
                    baseline: value,
                    correction: 0.0,
                    scaled_correction: 0.0,
                    status: CorrectionStatus::Unavailable,
                    notes: Vec::new(),
                })
                .collect(),
        }
    }

    fn cache() -> DayBlockCache {
        DayBlockCache::new(Arc::new(InMemoryCacheStore::new()))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = cache();
        let values: Vec<f64> = (0..24).map(|h| 1000.0 + h as f64).collect();
        cache.put(date(8), values.clone()).await.unwrap();
        let block = cache.get(date(8)).await.unwrap().unwrap();
        assert_eq!(block.predictions(), values.as_slice());

        let err = cache.put(date(8), vec![1.0; 10]).await.unwrap_err();
        assert_eq!(err, ForecastError::InvalidBlockLength { date: date(8), len: 10 });
        let block = cache.get(date(8)).await.unwrap().unwrap();
        assert_eq!(block.predictions(), values.as_slice());
    }

    #[tokio::test]
    async fn test_put_is_idempotent_overwrite() {
        let cache = cache();
        cache.put(date(8), vec![1.0; 24]).await.unwrap();
        cache.put(date(8), vec![2.0; 24]).await.unwrap();
        assert_eq!(cache.get(date(8)).await.unwrap().unwrap().predictions(), &[2.0; 24]);
    }

    #[tokio::test]
    async fn test_invalidate_range() {
        let cache = cache();
        for d in 1..=5 {
            cache.put(date(d), vec![d as f64; 24]).await.unwrap();
        }
        assert_eq!(cache.invalidate(date(2), date(4)).await.unwrap(), 3);
        assert!(cache.get(date(1)).await.unwrap().is_some());
        assert!(cache.get(date(3)).await.unwrap().is_none());
        assert!(cache.get(date(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = InMemoryCacheStore::with_ttl(std::time::Duration::from_millis(0));
        store.put(DayBlock::new(date(8), vec![1.0; 24]).unwrap()).await.unwrap();
        assert!(store.get(date(8)).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_compute_caches() {
        let cache = cache();
        let fetch = cache
            .get_or_compute(date(8), move || Ok(flat_run(date(8), 7.0)))
            .await
            .unwrap();
        assert!(!fetch.is_cached());
        assert_eq!(cache.in_flight(), 0);

        let again = cache
            .get_or_compute(date(8), || panic!("must be served from cache"))
            .await
            .unwrap();
        assert!(again.is_cached());
        assert_eq!(again.predictions(), vec![7.0; 24]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |calls: Arc<AtomicUsize>| {
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok::<_, ForecastError>(flat_run(date(8), 3.0))
            }
        };
        let (a, b) = tokio::join!(
            cache.get_or_compute(date(8), compute(calls.clone())),
            cache.get_or_compute(date(8), compute(calls.clone())),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_failed_computation_is_not_cached() {
        let cache = cache();
        let err = cache
            .get_or_compute(date(8), || Err(ForecastError::FatalModelUnavailable("x".into())))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.get(date(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_short_run_is_rejected() {
        let cache = cache();
        let err = cache
            .get_or_compute(date(8), || {
                let mut run = flat_run(date(8), 1.0);
                run.steps.truncate(10);
                Ok(run)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidBlockLength { len: 10, .. }));
        assert!(cache.get(date(8)).await.unwrap().is_none());
    }
}
