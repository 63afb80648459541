use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use sinkhole_dns::DnsMessage;
use tokio::time::Instant;

/// Everything known about one inbound query.
#[derive(Debug, Clone)]
pub struct DnsRequestCtx {
    client: SocketAddr,
    raw: Bytes,
    message: OnceCell<DnsMessage>,
    budget: RequestBudget,
}

impl DnsRequestCtx {
    pub fn new(deadline: Duration, client: SocketAddr, raw: Bytes) -> Self {
        Self {
            client,
            raw,
            message: OnceCell::new(),
            budget: RequestBudget::new(deadline),
        }
    }

    /// Address the query came from.
    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Lazily decode and return the DNS message.
    pub fn message(&self) -> anyhow::Result<&DnsMessage> {
        self.message.get_or_try_init(|| DnsMessage::decode(&self.raw))
    }

    /// Raw request bytes, exactly as received.
    pub fn raw(&self) -> Bytes {
        self.raw.clone()
    }

    pub fn budget(&self) -> &RequestBudget {
        &self.budget
    }
}

/// Produces the response for one inbound query.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    async fn handle(&self, ctx: &DnsRequestCtx) -> anyhow::Result<DnsMessage>;
}

/// A budget for processing a DNS request, based on a deadline.
#[derive(Debug, Clone)]
pub struct RequestBudget {
    deadline: Instant,
}

impl RequestBudget {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    /// Deadline for a single step that may take at most `per_step`, never
    /// past the request deadline.
    pub fn cap(&self, per_step: Duration) -> Instant {
        self.deadline.min(Instant::now() + per_step)
    }
}
