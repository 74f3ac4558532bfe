// SPDX-License-Identifier: Apache-2.0 OR MIT

// common/src/api.rs
use serde::{Deserialize, Serialize};

// ============================================================================
// Issuance wire contract
// ============================================================================
//
// One POST to `{proxy}/issue` per issuance round-trip. Byte arrays travel as
// JSON arrays of integers.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Rate-limit scope this credential is requested for.
    #[serde(rename = "siteId")]
    pub site_id: String,

    /// Blinded element produced by the engine; safe to transmit.
    pub request: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    /// Issuer evaluation, consumed immediately by unblind.
    pub evaluation: Vec<u8>,
}

// ============================================================================
// Outbound header names
// ============================================================================
//
// The entire wire-visible contract with a resource verifier.

/// Base64-encoded spend proof bytes.
pub const PROOF_HEADER: &str = "X-ScopeBlind-Proof";

/// Plaintext site identifier.
pub const SITE_HEADER: &str = "X-ScopeBlind-Site";
