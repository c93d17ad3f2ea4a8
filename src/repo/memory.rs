use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::HistoricalStore;
use crate::domain::Observation;

/// Actuals held in memory, keyed by timestamp.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoricalStore {
    data: Arc<RwLock<BTreeMap<DateTime<Utc>, Observation>>>,
}

impl InMemoryHistoricalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for obs in observations {
            anyhow::ensure!(obs.is_actual(), "only actual observations can be stored ({})", obs.timestamp);
            map.insert(obs.timestamp, obs);
        }
        Ok(Self {
            data: Arc::new(RwLock::new(map)),
        })
    }

    /// Record a new actual; an existing actual for the hour is never replaced.
    pub async fn insert(&self, obs: Observation) -> Result<bool> {
        anyhow::ensure!(obs.is_actual(), "only actual observations can be stored ({})", obs.timestamp);
        let mut data = self.data.write().await;
        if data.contains_key(&obs.timestamp) {
            return Ok(false);
        }
        data.insert(obs.timestamp, obs);
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl HistoricalStore for InMemoryHistoricalStore {
    async fn get_window(&self, end_exclusive: DateTime<Utc>, length: usize) -> Result<Vec<Observation>> {
        let start = end_exclusive - Duration::hours(length as i64);
        let data = self.data.read().await;
        Ok(data.range(start..end_exclusive).map(|(_, o)| o.clone()).collect())
    }

    async fn get_actual(&self, timestamp: DateTime<Utc>) -> Result<Option<Observation>> {
        Ok(self.data.read().await.get(&timestamp).cloned())
    }

    async fn last_available(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.data.read().await.keys().next_back().copied())
    }
}
