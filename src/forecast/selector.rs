//! Serving-strategy decision per request
//!
//! | request start                          | plan                          |
//! |----------------------------------------|-------------------------------|
//! | no actuals at all                      | `InsufficientHistory`         |
//! | after `last + 1h`, gap over ceiling    | `GapTooLong`                  |
//! | after `last + 1h`                      | gap fill, then iterative      |
//! | exactly `last + 1h`                    | iterative                     |
//! | inside history, horizon fits, actual   | replay at the requested start |
//! | inside history otherwise               | replay at `last - (H - 1)`    |
//!
//! The gap ceiling is checked here, before any store or weather work.
//!
//! Replay anchors need a full lookback window of actuals.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::engine::ForecastEngine;
use super::gap::gap_hours;
use crate::domain::{ForecastRequest, ServingMode, SnapNote};
use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ServingPlan {
    Replay {
        anchor: DateTime<Utc>,
        last_available: DateTime<Utc>,
        snapped: Option<SnapNote>,
    },
    GapFill {
        last_available: DateTime<Utc>,
        gap_hours: usize,
    },
    Iterative {
        last_available: DateTime<Utc>,
    },
}

impl ServingPlan {
    pub fn mode(&self) -> ServingMode {
        match self {
            ServingPlan::Replay { .. } => ServingMode::Replay,
            ServingPlan::GapFill { .. } => ServingMode::GapFill,
            ServingPlan::Iterative { .. } => ServingMode::Iterative,
        }
    }

    pub fn last_available(&self) -> DateTime<Utc> {
        match self {
            ServingPlan::Replay { last_available, .. }
            | ServingPlan::GapFill { last_available, .. }
            | ServingPlan::Iterative { last_available } => *last_available,
        }
    }

    /// Where the returned forecast begins.
    pub fn anchor(&self, request: &ForecastRequest) -> DateTime<Utc> {
        match self {
            ServingPlan::Replay { anchor, .. } => *anchor,
            _ => request.start,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceSelector {
    max_horizon: usize,
    max_gap: usize,
    lookback: usize,
}

impl SourceSelector {
    pub fn new(max_horizon: usize, max_gap: usize, lookback: usize) -> Self {
        Self {
            max_horizon,
            max_gap,
            lookback,
        }
    }

    /// Lookback window a replay anchor must have.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Decide from the store boundary alone; replay lookback is checked by
    /// [`Self::plan`].
    pub fn decide(
        &self,
        request: &ForecastRequest,
        last_available: Option<DateTime<Utc>>,
        start_has_actual: bool,
    ) -> Result<ServingPlan> {
        let horizon = request.horizon_hours;
        if horizon == 0 || horizon > self.max_horizon {
            return Err(ForecastError::HorizonOutOfBounds {
                requested: horizon,
                max: self.max_horizon,
            });
        }
        let last = last_available.ok_or(ForecastError::InsufficientHistory {
            required: self.lookback,
            available: 0,
        })?;
        let next = last + Duration::hours(1);

        if request.start > next {
            let gap = gap_hours(last, request.start);
            if gap > self.max_gap {
                return Err(ForecastError::GapTooLong {
                    hours: gap,
                    max: self.max_gap,
                });
            }
            return Ok(ServingPlan::GapFill {
                last_available: last,
                gap_hours: gap,
            });
        }
        if request.start == next {
            return Ok(ServingPlan::Iterative {
                last_available: last,
            });
        }

        let fits = request.end_inclusive() <= last;
        if fits && start_has_actual {
            return Ok(ServingPlan::Replay {
                anchor: request.start,
                last_available: last,
                snapped: None,
            });
        }
        let anchor = last - Duration::hours(horizon as i64 - 1);
        let reason = if fits {
            "no actual recorded at the requested start; moved to the latest replay anchor"
        } else {
            "horizon extends past the last recorded actual; moved to the latest replay anchor"
        };
        warn!(
            requested = %request.start,
            %anchor,
            reason,
            "replay start moved to the latest replay anchor"
        );
        Ok(ServingPlan::Replay {
            anchor,
            last_available: last,
            snapped: Some(SnapNote {
                requested: request.start,
                anchor,
                reason: reason.to_string(),
            }),
        })
    }

    pub async fn plan(&self, engine: &ForecastEngine, request: &ForecastRequest) -> Result<ServingPlan> {
        let last = engine.last_available().await?;
        let start_has_actual = match last {
            Some(last) if request.start <= last => engine.actual_at(request.start).await?.is_some(),
            _ => false,
        };
        let plan = self.decide(request, last, start_has_actual)?;

        if let ServingPlan::Replay { anchor, .. } = &plan {
            let available = engine
                .store()
                .get_window(*anchor, self.lookback)
                .await
                .map_err(|e| ForecastError::Store(e.to_string()))?
                .len();
            if available < self.lookback {
                return Err(ForecastError::InsufficientHistory {
                    required: self.lookback,
                    available,
                });
            }
        }
        info!(mode = %plan.mode(), start = %request.start, horizon = request.horizon_hours, "serving plan chosen");
        Ok(plan)
    }
}
