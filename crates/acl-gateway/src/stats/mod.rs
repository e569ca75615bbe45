//! Per-subscriber usage statistics.

pub mod aggregator;

pub use aggregator::StatsAggregator;
