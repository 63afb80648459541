use async_trait::async_trait;
use sinkhole_dns::DnsMessage;
use tokio::time::Instant;

pub use error::ForwardError;
pub use forwarder::UdpForwarder;

mod error;
pub mod forwarder;

/// Exchanges a query with an upstream resolver.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Send `query` unmodified and return the decoded reply, giving up at `deadline`.
    async fn forward(&self, query: &[u8], deadline: Instant) -> Result<DnsMessage, ForwardError>;
}
