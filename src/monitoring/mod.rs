pub mod stats_collector;

pub use stats_collector::StatsCollector;
