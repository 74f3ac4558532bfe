// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Token lifecycle: cached slot → disk → one issuance round-trip.
//!
//! The manager owns an explicit registry mapping each site identifier to
//! its token slot; there is no ambient per-process state. The slot mutex is
//! held for the whole issuance round-trip, so concurrent callers for the
//! same site queue behind the in-flight attempt and are released with the
//! shared result; exactly one issuance call reaches the transport.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use base64ct::{Base64, Encoding};
use rand::RngCore;
use scopeblind_common::api::IssueRequest;
use scopeblind_crypto::{Token, VoprfEngine, VoprfError};
use tracing::{debug, info, warn};

use crate::store::{StoreError, TokenStore};
use crate::transport::{IssuanceTransport, TransportError};

/// What a persistence failure during issuance means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePolicy {
    /// Persistence is part of issuance: a failed write fails the whole
    /// attempt and nothing is cached.
    Required,
    /// Degraded mode: the token stays usable for this process lifetime and
    /// the failure is logged.
    BestEffort,
}

/// Failure of `ensure_token`. No token is cached on any of these paths.
#[derive(Debug)]
pub enum IssuanceError {
    Engine(VoprfError),
    Transport(TransportError),
    Store(StoreError),
}

impl fmt::Display for IssuanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuanceError::Engine(e) => write!(f, "issuance failed in the engine: {}", e),
            IssuanceError::Transport(e) => write!(f, "issuance failed in transport: {}", e),
            IssuanceError::Store(e) => write!(f, "issuance failed persisting the token: {}", e),
        }
    }
}

impl std::error::Error for IssuanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IssuanceError::Engine(e) => Some(e),
            IssuanceError::Transport(e) => Some(e),
            IssuanceError::Store(e) => Some(e),
        }
    }
}

impl From<VoprfError> for IssuanceError {
    fn from(e: VoprfError) -> Self {
        IssuanceError::Engine(e)
    }
}

impl From<TransportError> for IssuanceError {
    fn from(e: TransportError) -> Self {
        IssuanceError::Transport(e)
    }
}

impl From<StoreError> for IssuanceError {
    fn from(e: StoreError) -> Self {
        IssuanceError::Store(e)
    }
}

struct SiteSlot {
    token: Mutex<Option<Token>>,
}

pub struct TokenManager {
    engine: Arc<dyn VoprfEngine>,
    transport: Arc<dyn IssuanceTransport>,
    store: TokenStore,
    store_policy: StorePolicy,
    slots: Mutex<HashMap<String, Arc<SiteSlot>>>,
}

impl TokenManager {
    pub fn new(
        engine: Arc<dyn VoprfEngine>,
        transport: Arc<dyn IssuanceTransport>,
        store: TokenStore,
        store_policy: StorePolicy,
    ) -> Self {
        Self {
            engine,
            transport,
            store,
            store_policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn VoprfEngine> {
        &self.engine
    }

    fn slot(&self, site: &str) -> Arc<SiteSlot> {
        let mut slots = self.slots.lock().expect("slot registry lock poisoned");
        slots
            .entry(site.to_string())
            .or_insert_with(|| {
                Arc::new(SiteSlot {
                    token: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Return the site's token, issuing one if neither memory nor disk has
    /// it. Blocks callers for the same site behind an in-flight issuance.
    pub fn ensure_token(&self, site: &str) -> Result<Token, IssuanceError> {
        let slot = self.slot(site);
        let mut guard = slot.token.lock().expect("token slot lock poisoned");

        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        // A corrupt cache file is reported but not fatal; issuance replaces it.
        match self.store.load(site) {
            Ok(Some(token)) => {
                debug!(site = %site, "credential restored from disk");
                *guard = Some(token.clone());
                return Ok(token);
            }
            Ok(None) => {}
            Err(e) => warn!(site = %site, error = %e, "ignoring unreadable token file"),
        }

        let token = self.issue(site)?;

        match self.store.save(site, &token) {
            Ok(()) => {}
            Err(e) => match self.store_policy {
                StorePolicy::Required => return Err(e.into()),
                StorePolicy::BestEffort => {
                    warn!(site = %site, error = %e, "token not persisted; usable for this process only")
                }
            },
        }

        *guard = Some(token.clone());
        Ok(token)
    }

    fn issue(&self, site: &str) -> Result<Token, IssuanceError> {
        // Fresh random input per attempt; its only job is to make the PRF
        // output unpredictable to us before issuance.
        let mut input = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut input);
        let input_b64 = Base64::encode_string(&input);

        let (request, state) = self.engine.blind(input_b64.as_bytes())?;
        info!(site = %site, "requesting credential issuance");

        let response = self.transport.issue(&IssueRequest {
            site_id: site.to_string(),
            request,
        })?;

        let token = self
            .engine
            .unblind(&response.evaluation, state, input_b64.as_bytes())?;
        info!(site = %site, "credential issued");
        Ok(token)
    }

    /// Seed a credential obtained elsewhere (migration, tests). Memory only;
    /// nothing is persisted.
    pub fn install_token(&self, site: &str, token: Token) {
        let slot = self.slot(site);
        let mut guard = slot.token.lock().expect("token slot lock poisoned");
        *guard = Some(token);
    }

    /// Ready → Empty: drop the cached token and its file, e.g. after the
    /// verifier rejects the credential as exhausted.
    pub fn invalidate(&self, site: &str) -> Result<(), StoreError> {
        let slot = self.slot(site);
        let mut guard = slot.token.lock().expect("token slot lock poisoned");
        *guard = None;
        self.store.remove(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopeblind_common::api::IssueResponse;
    use scopeblind_crypto::engine::SimulatedVoprfEngine;
    use scopeblind_crypto::ProtocolError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// In-memory transport that hands back a fixed evaluation and counts
    /// how many round-trips actually happen.
    struct FixedTransport {
        evaluation: Vec<u8>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedTransport {
        fn new(evaluation: Vec<u8>) -> Self {
            Self {
                evaluation,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                evaluation: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    impl IssuanceTransport for FixedTransport {
        fn issue(&self, _request: &IssueRequest) -> Result<IssueResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TransportError::Status { status: 503 });
            }
            Ok(IssueResponse {
                evaluation: self.evaluation.clone(),
            })
        }
    }

    fn manager_with(
        transport: Arc<FixedTransport>,
        dir: &std::path::Path,
        policy: StorePolicy,
    ) -> TokenManager {
        TokenManager::new(
            Arc::new(SimulatedVoprfEngine::new()),
            transport,
            TokenStore::new(dir),
            policy,
        )
    }

    #[test]
    fn issues_once_then_serves_from_memory() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FixedTransport::new(b"evaluation".to_vec()));
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        let t1 = manager.ensure_token("site-a").unwrap();
        let t2 = manager.ensure_token("site-a").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restores_from_disk_without_a_round_trip() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("site-a", &Token::new(vec![5; 27])).unwrap();

        let transport = Arc::new(FixedTransport::new(b"unused".to_vec()));
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        let token = manager.ensure_token("site-a").unwrap();
        assert_eq!(token.as_bytes(), &[5u8; 27][..]);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sites_are_isolated() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FixedTransport::new(b"evaluation".to_vec()));
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        manager.ensure_token("site-a").unwrap();
        manager.ensure_token("site-b").unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn transport_failure_leaves_state_empty_and_retries() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FixedTransport::failing());
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        let err = manager.ensure_token("site-a").unwrap_err();
        assert!(matches!(err, IssuanceError::Transport(_)));
        assert!(TokenStore::new(dir.path()).load("site-a").unwrap().is_none());

        // Still empty: the next call attempts issuance again.
        let _ = manager.ensure_token("site-a").unwrap_err();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn malformed_evaluation_leaves_state_empty() {
        let dir = tempdir().unwrap();
        // Simulated engine treats an empty evaluation as malformed.
        let transport = Arc::new(FixedTransport::new(Vec::new()));
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        let err = manager.ensure_token("site-a").unwrap_err();
        match err {
            IssuanceError::Engine(VoprfError::Protocol(ProtocolError::MalformedEvaluation)) => {}
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(TokenStore::new(dir.path()).load("site-a").unwrap().is_none());
    }

    #[test]
    fn required_store_failure_fails_issuance_and_caches_nothing() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let transport = Arc::new(FixedTransport::new(b"evaluation".to_vec()));
        let manager = TokenManager::new(
            Arc::new(SimulatedVoprfEngine::new()),
            transport.clone(),
            TokenStore::new(&blocker),
            StorePolicy::Required,
        );

        let err = manager.ensure_token("site-a").unwrap_err();
        assert!(matches!(err, IssuanceError::Store(_)));

        // State stays empty: a second call re-issues.
        let _ = manager.ensure_token("site-a").unwrap_err();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn best_effort_store_failure_degrades_to_memory_only() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let transport = Arc::new(FixedTransport::new(b"evaluation".to_vec()));
        let manager = TokenManager::new(
            Arc::new(SimulatedVoprfEngine::new()),
            transport.clone(),
            TokenStore::new(&blocker),
            StorePolicy::BestEffort,
        );

        let token = manager.ensure_token("site-a").unwrap();
        assert_eq!(token.as_bytes(), b"evaluation");
        // Cached in memory, not on disk.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        manager.ensure_token("site-a").unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_returns_to_empty() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FixedTransport::new(b"evaluation".to_vec()));
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        manager.ensure_token("site-a").unwrap();
        manager.invalidate("site-a").unwrap();

        assert!(TokenStore::new(dir.path()).load("site-a").unwrap().is_none());
        manager.ensure_token("site-a").unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn install_token_skips_issuance_and_disk() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FixedTransport::new(b"unused".to_vec()));
        let manager = manager_with(transport.clone(), dir.path(), StorePolicy::Required);

        manager.install_token("site-a", Token::from(&b"mock_token_bytes_1234567890"[..]));
        let token = manager.ensure_token("site-a").unwrap();
        assert_eq!(token.as_bytes(), b"mock_token_bytes_1234567890");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(TokenStore::new(dir.path()).load("site-a").unwrap().is_none());
    }
}
