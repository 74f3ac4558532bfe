// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use scopeblind_common::duration::env_duration;

use crate::lifecycle::StorePolicy;

pub const DEFAULT_PROXY_URL: &str = "https://proxy.scopeblind.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// Engine backend, selected explicitly at construction. There is no
/// runtime fallback between the two.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Full protocol math; needs the issuer's evaluation public key
    /// (SEC1 compressed).
    Real { issuer_public_key: Vec<u8> },
    /// Insecure simulation for integration testing only.
    Simulated,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "missing required env var {}", var),
            ConfigError::Invalid { var, reason } => write!(f, "invalid {}: {}", var, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Rate-limit scope this client spends credentials for.
    pub site_id: String,
    /// Issuance proxy base URL.
    pub proxy_url: String,
    /// Directory holding the per-site token files.
    pub token_dir: PathBuf,
    pub backend: Backend,
    pub store_policy: StorePolicy,
    /// Timeout for the issuance round-trip, owned by the transport.
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn new(site_id: impl Into<String>, backend: Backend) -> Self {
        Self {
            site_id: site_id.into(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            token_dir: PathBuf::from("."),
            backend,
            store_policy: StorePolicy::Required,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Env-driven construction.
    ///
    /// - `SCOPEBLIND_SITE_ID` (required)
    /// - `SCOPEBLIND_PROXY_URL`
    /// - `SCOPEBLIND_TOKEN_DIR`
    /// - `SCOPEBLIND_BACKEND` ("real" [default] | "simulated")
    /// - `SCOPEBLIND_ISSUER_PUBKEY` (base64url SEC1; required when real)
    /// - `SCOPEBLIND_STORE_POLICY` ("required" [default] | "best-effort")
    /// - `SCOPEBLIND_HTTP_TIMEOUT` (e.g. "5s", "1m")
    pub fn from_env() -> Result<Self, ConfigError> {
        let site_id = env_opt("SCOPEBLIND_SITE_ID").ok_or(ConfigError::Missing("SCOPEBLIND_SITE_ID"))?;
        let proxy_url =
            env_opt("SCOPEBLIND_PROXY_URL").unwrap_or_else(|| DEFAULT_PROXY_URL.to_string());
        let token_dir = env_opt("SCOPEBLIND_TOKEN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let backend = match env_opt("SCOPEBLIND_BACKEND").as_deref() {
            None | Some("real") => {
                let pk_b64 = env_opt("SCOPEBLIND_ISSUER_PUBKEY")
                    .ok_or(ConfigError::Missing("SCOPEBLIND_ISSUER_PUBKEY"))?;
                let issuer_public_key =
                    Base64UrlUnpadded::decode_vec(&pk_b64).map_err(|_| ConfigError::Invalid {
                        var: "SCOPEBLIND_ISSUER_PUBKEY",
                        reason: "not valid base64url".to_string(),
                    })?;
                if issuer_public_key.len() != 33 {
                    return Err(ConfigError::Invalid {
                        var: "SCOPEBLIND_ISSUER_PUBKEY",
                        reason: format!(
                            "expected 33-byte SEC1 compressed key, got {} bytes",
                            issuer_public_key.len()
                        ),
                    });
                }
                Backend::Real { issuer_public_key }
            }
            Some("simulated") => Backend::Simulated,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "SCOPEBLIND_BACKEND",
                    reason: format!("'{}' (expected 'real' or 'simulated')", other),
                })
            }
        };

        let store_policy = match env_opt("SCOPEBLIND_STORE_POLICY").as_deref() {
            None | Some("required") => StorePolicy::Required,
            Some("best-effort") | Some("best_effort") => StorePolicy::BestEffort,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "SCOPEBLIND_STORE_POLICY",
                    reason: format!("'{}' (expected 'required' or 'best-effort')", other),
                })
            }
        };

        let http_timeout = Duration::from_secs(env_duration(
            "SCOPEBLIND_HTTP_TIMEOUT",
            DEFAULT_HTTP_TIMEOUT_SECS,
        ));

        Ok(Self {
            site_id,
            proxy_url,
            token_dir,
            backend,
            store_policy,
            http_timeout,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
