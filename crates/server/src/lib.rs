use std::{net::SocketAddr, sync::Arc, time::Duration};

use sinkhole_context::DnsHandler;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

mod udp;

/// Size of the receive buffer for inbound datagrams.
const RECV_SIZE: usize = 4096;

/// DNS Server
pub struct DnsServer {
    socket: Arc<UdpSocket>,
    /// Budget for answering a single query.
    timeout: Duration,
}

impl DnsServer {
    /// Bind the UDP listener. Failing to bind is fatal for the caller.
    pub async fn bind(addr: SocketAddr, timeout: Duration) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            timeout,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve queries until `cancel` fires, then wait up to `grace` for in-flight ones.
    pub async fn run(
        self,
        handler: Arc<dyn DnsHandler>,
        cancel: CancellationToken,
        grace: Duration,
    ) -> anyhow::Result<()> {
        udp::run_udp(self.socket, handler, self.timeout, RECV_SIZE, cancel, grace).await
    }
}
