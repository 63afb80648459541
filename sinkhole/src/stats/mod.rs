pub use aggregator::{BlockedDomainCounter, StatsAggregator, StatsSnapshot};

mod aggregator;
mod ring;

/// Receives the outcome of every decided question.
pub trait StatsSink: Send + Sync {
    fn record_query(&self, domain: &str, blocked: bool);
}
