use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use sinkhole_dns::{DnsMessage, helpers};
use tokio::time::Instant;
use udp::UdpConn;

use crate::{ForwardError, Forwarder};

mod udp;

/// Forwarder that relays queries to a single upstream server over UDP.
#[derive(Debug, Clone)]
pub struct UdpForwarder {
    upstream: SocketAddr,
    timeout: Duration,
}

impl UdpForwarder {
    pub fn new(upstream: SocketAddr, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }
}

#[async_trait]
impl Forwarder for UdpForwarder {
    async fn forward(&self, query: &[u8], deadline: Instant) -> Result<DnsMessage, ForwardError> {
        let deadline = deadline.min(Instant::now() + self.timeout);

        // A fresh socket per exchange keeps source ports unpredictable.
        let conn = UdpConn::new(self.upstream).await?;
        let bytes = conn.send_and_receive(query, deadline).await?;

        if helpers::is_truncated(&bytes).unwrap_or(false) {
            tracing::debug!(upstream = %self.upstream, "upstream reply truncated, relaying as is");
        }

        DnsMessage::decode(&bytes).map_err(ForwardError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use bytes::Bytes;
    use sinkhole_dns::{
        ClassType, DnsMessageBuilder, DnsQuestion, DnsRecord, DnsRecordData, DnsResponseCode,
        DomainName, RecordType,
    };
    use tokio::net::UdpSocket;

    use super::*;

    fn query(id: u16) -> Bytes {
        DnsMessageBuilder::new()
            .with_id(id)
            .add_question(DnsQuestion::new(
                DomainName::from_ascii("example.com").unwrap(),
                RecordType::A,
                ClassType::IN,
            ))
            .build()
            .encode()
            .unwrap()
    }

    fn answer_for(query: &DnsMessage) -> DnsMessage {
        DnsMessageBuilder::reply_to(query)
            .add_answer(DnsRecord::new(
                DomainName::from_ascii("example.com").unwrap(),
                RecordType::A,
                ClassType::IN,
                60,
                DnsRecordData::Ipv4(Ipv4Addr::new(93, 184, 216, 34)),
            ))
            .with_response(DnsResponseCode::NoError)
            .build()
    }

    #[tokio::test]
    async fn test_forward_relays_reply() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, peer) = upstream.recv_from(&mut buf).await.unwrap();
            let q = DnsMessage::decode(&buf[..n]).unwrap();

            // A stray reply with the wrong id must be skipped.
            let mut stray = answer_for(&q);
            stray.id = q.id.wrapping_add(1);
            upstream.send_to(&stray.encode().unwrap(), peer).await.unwrap();

            upstream.send_to(&answer_for(&q).encode().unwrap(), peer).await.unwrap();
        });

        let forwarder = UdpForwarder::new(addr, Duration::from_secs(2));
        let reply = forwarder
            .forward(&query(4242), Instant::now() + Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(reply.id, 4242);
        assert_eq!(reply.answers().len(), 1);
        assert_eq!(reply.response_code(), DnsResponseCode::NoError);
    }

    #[tokio::test]
    async fn test_forward_accepts_large_reply() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, peer) = upstream.recv_from(&mut buf).await.unwrap();
            let q = DnsMessage::decode(&buf[..n]).unwrap();

            let mut reply = DnsMessageBuilder::reply_to(&q);
            for i in 0..300u16 {
                reply = reply.add_answer(DnsRecord::new(
                    DomainName::from_ascii(format!("host-{i}.example.com")).unwrap(),
                    RecordType::A,
                    ClassType::IN,
                    60,
                    DnsRecordData::Ipv4(Ipv4Addr::new(10, 0, (i >> 8) as u8, i as u8)),
                ));
            }
            let bytes = reply.with_response(DnsResponseCode::NoError).build().encode().unwrap();
            assert!(bytes.len() > 4096);
            upstream.send_to(&bytes, peer).await.unwrap();
        });

        let forwarder = UdpForwarder::new(addr, Duration::from_secs(2));
        let reply = forwarder
            .forward(&query(77), Instant::now() + Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(reply.answers().len(), 300);
        assert_eq!(
            reply.answers()[299].data,
            DnsRecordData::Ipv4(Ipv4Addr::new(10, 0, 1, 43))
        );
    }

    #[tokio::test]
    async fn test_forward_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let forwarder = UdpForwarder::new(silent.local_addr().unwrap(), Duration::from_millis(100));

        let started = Instant::now();
        let err = forwarder
            .forward(&query(1), Instant::now() + Duration::from_secs(10))
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Timeout));
        assert_eq!(err.response_code(), DnsResponseCode::ServerFailure);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_forward_rejects_malformed_reply() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, peer) = upstream.recv_from(&mut buf).await.unwrap();
            // Header says one question, body is missing.
            let reply = [buf[0], buf[1], 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0];
            upstream.send_to(&reply, peer).await.unwrap();
        });

        let forwarder = UdpForwarder::new(addr, Duration::from_secs(2));
        let err = forwarder
            .forward(&query(9), Instant::now() + Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Malformed(_)));
    }
}
