use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sinkhole_blocklist::BlockedSet;
use sinkhole_context::{DnsHandler, DnsRequestCtx};
use sinkhole_dns::{DnsMessage, DnsMessageBuilder, DnsRecord, DnsResponseCode, Edns};
use sinkhole_resolver::Forwarder;

use crate::stats::StatsSink;

/// Blocks listed names and forwards everything else upstream.
pub struct QueryHandler {
    blocklist: Arc<BlockedSet>,
    forwarder: Arc<dyn Forwarder>,
    stats: Arc<dyn StatsSink>,
    upstream_timeout: Duration,
}

impl QueryHandler {
    pub fn new(
        blocklist: Arc<BlockedSet>,
        forwarder: Arc<dyn Forwarder>,
        stats: Arc<dyn StatsSink>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            blocklist,
            forwarder,
            stats,
            upstream_timeout,
        }
    }
}

#[async_trait]
impl DnsHandler for QueryHandler {
    async fn handle(&self, ctx: &DnsRequestCtx) -> anyhow::Result<DnsMessage> {
        let query = ctx.message()?;

        let mut status = ResponseStatus::default();
        let mut sections = Sections::default();

        for question in query.questions() {
            let domain = normalize(question.qname.as_str());

            if self.blocklist.contains(domain) {
                tracing::debug!(domain, qtype = %question.qtype, "blocked");
                self.stats.record_query(domain, true);
                status.merge(Precedence::Blocked, DnsResponseCode::NxDomain);
                continue;
            }

            let deadline = ctx.budget().cap(self.upstream_timeout);
            match self.forwarder.forward(&ctx.raw(), deadline).await {
                Ok(mut upstream) => {
                    status.merge(Precedence::Upstream, upstream.response_code());
                    sections.absorb(&mut upstream);
                    self.stats.record_query(domain, false);
                }
                Err(e) => {
                    tracing::warn!(domain, error = %e, "forwarding failed");
                    status.merge(Precedence::Failed, e.response_code());
                }
            }
        }

        let mut builder = DnsMessageBuilder::reply_to(query)
            .with_answers(sections.answers)
            .with_authority_records(sections.authority)
            .with_additional_records(sections.additional);
        // An EDNS client gets an OPT record back even when nothing was relayed.
        match sections.edns {
            Some(edns) => builder = builder.with_edns(edns),
            None if query.edns().is_some() => builder = builder.with_edns(Edns::default()),
            None => {}
        }

        let mut response = builder.with_response(status.code).build();
        response.flags.truncated = sections.truncated;
        Ok(response)
    }
}

/// Strip exactly one trailing root dot.
fn normalize(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
enum Precedence {
    #[default]
    Unset,
    Upstream,
    Blocked,
    Failed,
}

/// Status across all questions: failure beats block beats upstream, and the
/// later of equal rank wins.
#[derive(Debug, Default)]
struct ResponseStatus {
    precedence: Precedence,
    code: DnsResponseCode,
}

impl ResponseStatus {
    fn merge(&mut self, precedence: Precedence, code: DnsResponseCode) {
        if precedence >= self.precedence {
            self.precedence = precedence;
            self.code = code;
        }
    }
}

/// Upstream records collected in question order.
#[derive(Debug, Default)]
struct Sections {
    answers: Vec<DnsRecord>,
    authority: Vec<DnsRecord>,
    additional: Vec<DnsRecord>,
    edns: Option<Edns>,
    /// Set when any upstream reply came back truncated.
    truncated: bool,
}

impl Sections {
    fn absorb(&mut self, upstream: &mut DnsMessage) {
        let (answers, authority, additional) = upstream.take_sections();
        self.answers.extend(answers);
        self.authority.extend(authority);
        self.additional.extend(additional);
        self.truncated |= upstream.flags.truncated;
        if let Some(edns) = upstream.edns() {
            self.edns = Some(edns.clone());
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod handler_tests;
