//! Bounded rolling buffers owned by a single forecast run.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use super::Observation;
use crate::error::{ForecastError, Result};
use crate::ml::ResidualScaler;

/// Fixed-capacity, strictly time-ordered window of hourly observations.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingHistory {
    capacity: usize,
    entries: VecDeque<Observation>,
}

impl WorkingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Build from ordered observations, keeping the newest `capacity`.
    pub fn from_observations(
        capacity: usize,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<Self> {
        let mut history = Self::new(capacity);
        for obs in observations {
            history.push(obs)?;
        }
        Ok(history)
    }

    /// Append the next hour, evicting the oldest entry beyond capacity.
    pub fn push(&mut self, obs: Observation) -> Result<()> {
        if let Some(last) = self.entries.back() {
            if obs.timestamp <= last.timestamp {
                return Err(ForecastError::NonMonotonicHistory {
                    timestamp: obs.timestamp,
                    last: last.timestamp,
                });
            }
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(obs);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.entries.back()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|o| o.timestamp)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Observation> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Demand values, oldest first.
    pub fn demand_values(&self) -> Vec<f64> {
        self.entries.iter().map(|o| o.demand_mw).collect()
    }

    /// The entry at `timestamp`, else the closest held one. Ties go to the
    /// newer neighbour.
    pub fn nearest(&self, timestamp: DateTime<Utc>) -> Option<&Observation> {
        let idx = self.entries.partition_point(|o| o.timestamp < timestamp);
        let older = idx.checked_sub(1).and_then(|i| self.entries.get(i));
        match (older, self.entries.get(idx)) {
            (Some(o), Some(n)) if timestamp - o.timestamp < n.timestamp - timestamp => Some(o),
            (Some(o), None) => Some(o),
            (_, newer) => newer,
        }
    }

    /// Entries with `from <= timestamp < to`, oldest first.
    pub fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl DoubleEndedIterator<Item = &Observation> {
        let lo = self.entries.partition_point(|o| o.timestamp < from);
        let hi = self.entries.partition_point(|o| o.timestamp < to).max(lo);
        self.entries.range(lo..hi)
    }

    /// True when every consecutive pair is exactly one hour apart.
    pub fn is_contiguous(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| b.timestamp - a.timestamp == Duration::hours(1))
    }
}

/// Fixed-capacity window of scaled residuals, advanced in lock-step with
/// [`WorkingHistory`]. Values stay in the scale recorded in `scaler`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualBuffer {
    capacity: usize,
    values: VecDeque<f64>,
    scaler: ResidualScaler,
}

impl ResidualBuffer {
    pub fn new(capacity: usize, scaler: ResidualScaler) -> Self {
        Self {
            capacity: capacity.max(1),
            values: VecDeque::with_capacity(capacity.max(1)),
            scaler,
        }
    }

    pub fn from_scaled(
        capacity: usize,
        scaler: ResidualScaler,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        let mut buffer = Self::new(capacity, scaler);
        for v in values {
            buffer.push(v);
        }
        buffer
    }

    pub fn push(&mut self, scaled: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(scaled);
    }

    /// The newest `n` values, oldest first; `None` while fewer are held.
    pub fn tail(&self, n: usize) -> Option<Vec<f64>> {
        if n > self.values.len() {
            return None;
        }
        Some(self.values.iter().skip(self.values.len() - n).copied().collect())
    }

    pub fn scaler(&self) -> ResidualScaler {
        self.scaler
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}
