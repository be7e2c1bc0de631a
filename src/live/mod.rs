//! Match tracking: the live tracker with its simulator, and the series poller.

pub mod series;
pub mod simulation;
pub mod tracker;

pub use series::SeriesPoller;
pub use tracker::{LiveMatchTracker, TrackerConfig};
