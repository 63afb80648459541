use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use sinkhole_dns::{
    helpers::{self, HEADER_LEN},
    writer::MAX_MESSAGE_SIZE,
};
use tokio::{net::UdpSocket, time::Instant};

use crate::ForwardError;

/// Largest reply accepted from the upstream: anything a DNS message can hold,
/// so EDNS answers above 4 KiB are not cut short.
const MAX_RESPONSE_SIZE: usize = MAX_MESSAGE_SIZE;

/// A single UDP exchange with an upstream server.
#[derive(Debug)]
pub(crate) struct UdpConn {
    socket: UdpSocket,
}

impl UdpConn {
    /// Bind an ephemeral port of the upstream's address family and connect to it.
    pub async fn new(upstream_addr: SocketAddr) -> Result<Self, ForwardError> {
        let bind_addr = if upstream_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(upstream_addr).await?;
        Ok(Self { socket })
    }

    /// Send a DNS query and wait for the matching response.
    pub async fn send_and_receive(&self, query: &[u8], deadline: Instant) -> Result<Bytes, ForwardError> {
        let want_id = helpers::extract_transaction_id(query).ok_or_else(|| {
            ForwardError::Malformed(anyhow::anyhow!("query shorter than a dns header"))
        })?;

        tokio::time::timeout_at(deadline, self.socket.send(query)).await??;

        let mut buf = BytesMut::zeroed(MAX_RESPONSE_SIZE);

        loop {
            let n = tokio::time::timeout_at(deadline, self.socket.recv(&mut buf)).await??;

            let reply = &buf[..n];
            if n >= HEADER_LEN
                && helpers::is_response(reply) == Some(true)
                && helpers::extract_transaction_id(reply) == Some(want_id)
            {
                buf.truncate(n);
                return Ok(buf.freeze());
            }

            tracing::trace!(len = n, "discarding unrelated upstream datagram");
        }
    }
}
