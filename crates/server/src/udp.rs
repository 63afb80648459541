use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use sinkhole_context::{DnsHandler, DnsRequestCtx};
use sinkhole_dns::{
    DnsFlags, DnsMessage, DnsMessageBuilder, DnsResponseCode,
    helpers::{self, HEADER_LEN},
    writer::MIN_UDP_PAYLOAD,
};
use tokio::net::UdpSocket;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Run the DNS server over UDP.
pub(crate) async fn run_udp(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn DnsHandler>,
    timeout: Duration,
    recv_size: usize,
    cancel: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()> {
    let tracker = TaskTracker::new();
    let mut buffer = BytesMut::with_capacity(recv_size);

    tracing::info!("UDP listening on {}", socket.local_addr()?);

    loop {
        buffer.resize(recv_size, 0);

        let (len, client) = tokio::select! {
            _ = cancel.cancelled() => break,
            res = socket.recv_from(&mut buffer[..]) => match res {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("UDP receive failed: {}", e);
                    continue;
                }
            },
        };
        let raw = buffer.split_to(len).freeze();

        let sock = socket.clone();
        let handler = handler.clone();

        tracker.spawn(async move {
            let ctx = DnsRequestCtx::new(timeout, client, raw);
            if let Some(resp) = respond(handler.as_ref(), &ctx).await {
                if let Err(e) = sock.send_to(&resp, client).await {
                    tracing::warn!("Failed to write response to client {}: {}", client, e);
                }
            }
        });
    }

    tracker.close();
    tracing::info!(in_flight = tracker.len(), "UDP listener stopped, draining queries");

    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        tracing::warn!(
            "{} queries still in flight after {:?}, abandoning them",
            tracker.len(),
            grace
        );
    }

    Ok(())
}

/// Produce the bytes to send back for one datagram, if any.
async fn respond(handler: &dyn DnsHandler, ctx: &DnsRequestCtx) -> Option<Bytes> {
    let query = match ctx.message() {
        Ok(query) => query,
        Err(e) => {
            tracing::debug!(client = %ctx.client(), "undecodable query: {:#}", e);
            return format_error_response(&ctx.raw());
        }
    };

    if query.flags.response {
        tracing::debug!(client = %ctx.client(), "ignoring datagram with QR set");
        return None;
    }

    let response = match handler.handle(ctx).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(client = %ctx.client(), "query handling failed: {:#}", e);
            DnsMessageBuilder::reply_to(query)
                .with_response(DnsResponseCode::ServerFailure)
                .build()
        }
    };

    match encode_for_client(query, &response) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(client = %ctx.client(), "failed to encode response: {:#}", e);
            None
        }
    }
}

/// Encode within the client's advertised UDP size, falling back to a TC=1 reply.
fn encode_for_client(query: &DnsMessage, response: &DnsMessage) -> anyhow::Result<Bytes> {
    let limit = query
        .edns()
        .map(|edns| usize::from(edns.udp_payload_size).max(MIN_UDP_PAYLOAD))
        .unwrap_or(MIN_UDP_PAYLOAD);

    match response.encode_with_max(limit) {
        Ok(bytes) => Ok(bytes),
        Err(_) => {
            tracing::debug!(id = response.id, limit, "response exceeds client limit, truncating");
            response.truncated().encode_with_max(limit)
        }
    }
}

/// FORMERR reply for a datagram that carries a header but does not decode.
fn format_error_response(raw: &[u8]) -> Option<Bytes> {
    if raw.len() < HEADER_LEN || helpers::is_response(raw) == Some(true) {
        return None;
    }
    let id = helpers::extract_transaction_id(raw)?;

    let mut flags = DnsFlags::default();
    flags.recursion_desired = raw[2] & 0x01 != 0;

    DnsMessageBuilder::new()
        .with_id(id)
        .with_flags(flags)
        .with_response(DnsResponseCode::FormatError)
        .build()
        .encode()
        .ok()
}

