use std::{io::Read, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
}

/// Status and body of one HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends one Overpass QL query and hands back the raw response.
///
/// Non-2xx statuses are not errors at this level; the gateway decides what
/// to retry. `Err` means no HTTP response was obtained at all.
pub trait OverpassTransport: Send + Sync {
    fn post_query(&self, endpoint: &str, query: &str) -> Result<TransportResponse, TransportError>;
}

/// Blocking `reqwest` transport posting the query as the `data` form field.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl OverpassTransport for HttpTransport {
    fn post_query(&self, endpoint: &str, query: &str) -> Result<TransportResponse, TransportError> {
        let mut response = self.client.post(endpoint).form(&[("data", query)]).send()?;
        let status = response.status().as_u16();
        let mut body = Vec::new();
        response.read_to_end(&mut body)?;
        tracing::debug!("overpass answered {} with {} bytes", status, body.len());
        Ok(TransportResponse { status, body })
    }
}
