// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport seam for the issuance round-trip.
//!
//! The lifecycle only consumes a blocking call/response contract; the
//! default implementation speaks JSON over HTTPS to the issuance proxy.
//! Timeouts are this adapter's responsibility and surface as a generic
//! transport failure.

use std::fmt;
use std::time::Duration;

use scopeblind_common::api::{IssueRequest, IssueResponse};
use tracing::debug;

#[derive(Debug)]
pub enum TransportError {
    /// Connection, timeout or body decoding failure.
    Http(reqwest::Error),
    /// The issuance endpoint answered with a non-2xx status.
    Status { status: u16 },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "issuance transport failure: {}", e),
            TransportError::Status { status } => {
                write!(f, "issuance endpoint returned HTTP {}", status)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Http(e) => Some(e),
            TransportError::Status { .. } => None,
        }
    }
}

/// Blocking call/response contract with the issuance service.
pub trait IssuanceTransport: Send + Sync {
    fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, TransportError>;
}

/// Default transport: POST `{proxy_url}/issue` with a JSON body.
pub struct HttpIssuanceTransport {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpIssuanceTransport {
    pub fn new(proxy_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            http,
            endpoint: endpoint_for(proxy_url),
        })
    }
}

fn endpoint_for(proxy_url: &str) -> String {
    format!("{}/issue", proxy_url.trim_end_matches('/'))
}

impl IssuanceTransport for HttpIssuanceTransport {
    fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, TransportError> {
        debug!(endpoint = %self.endpoint, site = %request.site_id, "issuance request");
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(TransportError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        resp.json::<IssueResponse>().map_err(TransportError::Http)
    }
}
