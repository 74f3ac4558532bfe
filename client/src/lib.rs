// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Privacy-preserving rate-limit credential client.
//!
//! A [`ScopeBlindClient`] proves to a verifier that it is entitled to make
//! a request without revealing which credential it is spending and without
//! letting successive requests be linked. The lifecycle:
//!
//! 1. issuance: blind a random input, send it to the issuance proxy,
//!    unblind the evaluation into a token (once per site, persisted);
//! 2. spend: per outbound call, bind the token to the request's
//!    `METHOD:PATH` context and emit two headers, `X-ScopeBlind-Proof`
//!    and `X-ScopeBlind-Site`.
//!
//! # Caller-visible properties
//!
//! - Only the path component of a URL is signed; query string and fragment
//!   are excluded, so URLs differing only in query parameters sign
//!   identically.
//! - One token per site identifier at a time; re-issuance replaces it
//!   wholesale.
//! - Concurrent callers are safe: at most one issuance round-trip is in
//!   flight per site, and everyone waiting receives the shared result.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use scopeblind_crypto::{create_engine, EngineConfig, VoprfError, PROTOCOL_CONTEXT};

pub mod config;
pub mod lifecycle;
pub mod llm;
pub mod signer;
pub mod store;
pub mod transport;

pub use config::{Backend, ClientConfig, ConfigError};
pub use lifecycle::{IssuanceError, StorePolicy, TokenManager};
pub use llm::WithScopeProof;
pub use scopeblind_common::api::{PROOF_HEADER, SITE_HEADER};
pub use scopeblind_crypto::Token;
pub use store::{StoreError, TokenStore};
pub use transport::{HttpIssuanceTransport, IssuanceTransport, TransportError};

use signer::RequestSigner;

/// Any failure surfaced by the client API.
#[derive(Debug)]
pub enum ClientError {
    Config(ConfigError),
    Issuance(IssuanceError),
    Proof(VoprfError),
    Store(StoreError),
    InvalidTarget(String),
    Header(String),
    Http(reqwest::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Config(e) => e.fmt(f),
            ClientError::Issuance(e) => e.fmt(f),
            ClientError::Proof(e) => write!(f, "spend proof generation failed: {}", e),
            ClientError::Store(e) => e.fmt(f),
            ClientError::InvalidTarget(msg) => write!(f, "cannot sign request: {}", msg),
            ClientError::Header(msg) => write!(f, "cannot encode credential headers: {}", msg),
            ClientError::Http(e) => write!(f, "http request failed: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Config(e) => Some(e),
            ClientError::Issuance(e) => Some(e),
            ClientError::Proof(e) => Some(e),
            ClientError::Store(e) => Some(e),
            ClientError::Http(e) => Some(e),
            ClientError::InvalidTarget(_) | ClientError::Header(_) => None,
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e)
    }
}

impl From<IssuanceError> for ClientError {
    fn from(e: IssuanceError) -> Self {
        ClientError::Issuance(e)
    }
}

impl From<VoprfError> for ClientError {
    fn from(e: VoprfError) -> Self {
        ClientError::Proof(e)
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        ClientError::Store(e)
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Issuance(IssuanceError::Transport(e))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

/// The single entry point embedders hold on to.
pub struct ScopeBlindClient {
    site_id: String,
    manager: Arc<TokenManager>,
    signer: RequestSigner,
    http: reqwest::blocking::Client,
}

impl ScopeBlindClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let engine_config = match &config.backend {
            Backend::Real { issuer_public_key } => EngineConfig::Real {
                issuer_public_key: issuer_public_key.clone(),
                context: PROTOCOL_CONTEXT.to_vec(),
            },
            Backend::Simulated => EngineConfig::Simulated,
        };
        let engine: Arc<dyn scopeblind_crypto::VoprfEngine> =
            Arc::from(create_engine(engine_config)?);

        let transport = Arc::new(HttpIssuanceTransport::new(
            &config.proxy_url,
            config.http_timeout,
        )?);
        let store = TokenStore::new(&config.token_dir);
        let manager = Arc::new(TokenManager::new(
            engine,
            transport,
            store,
            config.store_policy,
        ));

        let http = reqwest::blocking::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            signer: RequestSigner::new(manager.clone(), config.site_id.clone()),
            site_id: config.site_id,
            manager,
            http,
        })
    }

    /// Assemble a client from an existing manager. Test seam and escape
    /// hatch for embedders wiring their own transport or store.
    pub fn from_parts(site_id: impl Into<String>, manager: Arc<TokenManager>) -> Self {
        let site_id = site_id.into();
        Self {
            signer: RequestSigner::new(manager.clone(), site_id.clone()),
            site_id,
            manager,
            http: reqwest::blocking::Client::new(),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Get the current token, issuing one if necessary.
    pub fn ensure_token(&self) -> Result<Token, ClientError> {
        Ok(self.manager.ensure_token(&self.site_id)?)
    }

    /// Seed a credential obtained elsewhere; memory only.
    pub fn install_token(&self, token: Token) {
        self.manager.install_token(&self.site_id, token);
    }

    /// Drop the current credential, e.g. after the verifier rejected it.
    pub fn invalidate_token(&self) -> Result<(), ClientError> {
        Ok(self.manager.invalidate(&self.site_id)?)
    }

    /// Compute the credential headers for one outbound call. `target` may
    /// be a bare path (`/api/x`) or a full URL.
    pub fn proof_headers(
        &self,
        method: &str,
        target: &str,
    ) -> Result<HashMap<String, String>, ClientError> {
        self.signer.proof_headers(method, target)
    }

    /// Convenience: perform a bodyless request to `url` with the credential
    /// headers attached.
    pub fn request(
        &self,
        method: &str,
        url: &str,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ClientError::InvalidTarget(format!("'{}' is not an HTTP method", method)))?;
        let request = self.http.request(method, url).build()?;
        let request = llm::WithScopeProof::with_scope_proof(request, self)?;
        Ok(self.http.execute(request)?)
    }
}
