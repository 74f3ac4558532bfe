// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-request header production.
//!
//! The signing context is the upper-cased method and the URL's path joined
//! by `:`; query string and fragment are excluded. Two URLs differing only
//! in query parameters therefore sign identically. This is a caller-visible
//! property of the credential's scope, not an accident.

use std::collections::HashMap;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use scopeblind_common::api::{PROOF_HEADER, SITE_HEADER};
use url::Url;

use crate::lifecycle::TokenManager;
use crate::ClientError;

/// Stateless header producer; all token state lives in the manager.
pub struct RequestSigner {
    manager: Arc<TokenManager>,
    site_id: String,
}

impl RequestSigner {
    pub fn new(manager: Arc<TokenManager>, site_id: impl Into<String>) -> Self {
        Self {
            manager,
            site_id: site_id.into(),
        }
    }

    /// Compute the two-header set for one outbound call. May trigger
    /// issuance on first use; pure computation otherwise.
    pub fn proof_headers(
        &self,
        method: &str,
        target: &str,
    ) -> Result<HashMap<String, String>, ClientError> {
        let context = signing_context(method, target)?;
        let token = self.manager.ensure_token(&self.site_id)?;
        let proof = self.manager.engine().spend_proof(&token, &context)?;

        let mut headers = HashMap::with_capacity(2);
        headers.insert(PROOF_HEADER.to_string(), Base64::encode_string(&proof));
        headers.insert(SITE_HEADER.to_string(), self.site_id.clone());
        Ok(headers)
    }
}

/// Build the signing context `METHOD:PATH` from a method and either a bare
/// path or a full URL.
pub(crate) fn signing_context(method: &str, target: &str) -> Result<String, ClientError> {
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ClientError::InvalidTarget(format!(
            "'{}' is not an HTTP method",
            method
        )));
    }
    Ok(format!("{}:{}", method.to_ascii_uppercase(), request_path(target)?))
}

fn request_path(target: &str) -> Result<String, ClientError> {
    // Absolute URL: sign only its path component.
    if let Ok(url) = Url::parse(target) {
        return Ok(url.path().to_string());
    }
    // Bare path: strip query and fragment ourselves.
    let end = target.find(['?', '#']).unwrap_or(target.len());
    let path = &target[..end];
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Err(ClientError::InvalidTarget(format!(
            "'{}' is neither an absolute URL nor a rooted path",
            target
        )))
    }
}
