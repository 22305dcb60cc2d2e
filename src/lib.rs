//! uplog library: reachability probing, a periodic scheduler and a rotating
//! time-series log store for the resulting observations.

pub mod adapters;
pub mod config;
pub mod domain;
mod error;
pub mod fmt;
pub mod services;
pub mod stats;
pub mod storage;

pub use adapters::tcp::is_reachable_tcp;
pub use domain::observation::Observation;
pub use error::UplogError;
pub use services::probe::Prober;
pub use services::scheduler::{
    FnSink, ObservationSink, Scheduler, SchedulerConfig, SchedulerState,
};
pub use storage::{LogStore, StoreConfig};
