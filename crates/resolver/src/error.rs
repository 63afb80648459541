use sinkhole_dns::DnsResponseCode;

/// Why an upstream exchange did not produce a usable reply.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream did not reply before the deadline")]
    Timeout,
    #[error("upstream i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed upstream reply: {0:#}")]
    Malformed(#[source] anyhow::Error),
}

impl ForwardError {
    /// Response code the client sees for this failure.
    pub fn response_code(&self) -> DnsResponseCode {
        DnsResponseCode::ServerFailure
    }
}

impl From<tokio::time::error::Elapsed> for ForwardError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ForwardError::Timeout
    }
}
