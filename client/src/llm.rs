// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Header-injection boundary for HTTP-client SDKs.
//!
//! Provider SDKs (LLM clients and the like) that build their requests on
//! `reqwest::blocking` can merge the credential headers into any outbound
//! call with [`WithScopeProof::with_scope_proof`]; the core stays ignorant
//! of the SDK's specifics. The proof is computed from the request's own
//! method and URL path, so the injected headers always match what the
//! verifier will see.

use reqwest::header::{HeaderName, HeaderValue};

use crate::{ClientError, ScopeBlindClient};

pub trait WithScopeProof: Sized {
    /// Attach `X-ScopeBlind-Proof` and `X-ScopeBlind-Site` for this
    /// request's method and path. May trigger issuance on first use.
    fn with_scope_proof(self, client: &ScopeBlindClient) -> Result<Self, ClientError>;
}

impl WithScopeProof for reqwest::blocking::Request {
    fn with_scope_proof(mut self, client: &ScopeBlindClient) -> Result<Self, ClientError> {
        let method = self.method().as_str().to_string();
        let path = self.url().path().to_string();
        let headers = client.proof_headers(&method, &path)?;

        for (name, value) in &headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Header(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| ClientError::Header(e.to_string()))?;
            self.headers_mut().insert(name, value);
        }
        Ok(self)
    }
}
