//! Forecast orchestration
//!
//! Leaves first: feature reconstruction, the hybrid step, the horizon driver,
//! the day-block cache, gap filling and finally the serving-strategy
//! selector behind [`ForecastService`].

pub mod cache;
pub mod calendar;
pub mod confidence;
pub mod engine;
pub mod features;
pub mod gap;
pub mod horizon;
pub mod metrics;
pub mod replay;
pub mod selector;
pub mod service;
pub mod stats;
pub mod stepper;
pub mod weekly;

pub use cache::{CacheStore, DayBlockCache, DayFetch, DayRun, InMemoryCacheStore};
pub use calendar::{FixedHolidayCalendar, HolidayCalendar};
pub use confidence::ConfidenceModel;
pub use engine::{ActualContext, ForecastEngine};
pub use features::{FeatureReconstructor, FeatureVector};
pub use gap::{GapFill, GapFiller, GapReport};
pub use horizon::{HorizonOrchestrator, HorizonRun};
pub use metrics::{BacktestMetrics, ForecastMetrics};
pub use selector::{ServingPlan, SourceSelector};
pub use service::ForecastService;
pub use stepper::{CorrectionStatus, HybridStepper, StepOutput};
