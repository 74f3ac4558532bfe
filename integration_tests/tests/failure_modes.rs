// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Issuance failure paths must leave the lifecycle empty: no partial
//! token is ever cached or readable afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scopeblind_client::{
    IssuanceError, IssuanceTransport, StorePolicy, TokenManager, TokenStore, TransportError,
};
use scopeblind_common::api::{IssueRequest, IssueResponse};
use scopeblind_crypto::{ProtocolError, VoprfError};
use scopeblind_integration_tests::support::{real_engine, InProcessIssuer};
use tempfile::tempdir;

/// Answers every issuance with a 3-byte evaluation.
struct TruncatingTransport {
    calls: AtomicUsize,
}

impl IssuanceTransport for TruncatingTransport {
    fn issue(&self, _request: &IssueRequest) -> Result<IssueResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(IssueResponse {
            evaluation: vec![1, 2, 3],
        })
    }
}

#[test]
fn truncated_evaluation_is_malformed_and_state_stays_empty() {
    let dir = tempdir().unwrap();
    let issuer = InProcessIssuer::new([7u8; 32]);
    let transport = Arc::new(TruncatingTransport {
        calls: AtomicUsize::new(0),
    });
    let manager = TokenManager::new(
        real_engine(&issuer),
        transport.clone(),
        TokenStore::new(dir.path()),
        StorePolicy::Required,
    );

    let err = manager.ensure_token("prod-site").unwrap_err();
    match err {
        IssuanceError::Engine(VoprfError::Protocol(ProtocolError::MalformedEvaluation)) => {}
        other => panic!("unexpected error: {:?}", other),
    }

    // Nothing cached in memory or on disk; the next call starts over.
    assert!(TokenStore::new(dir.path()).load("prod-site").unwrap().is_none());
    let _ = manager.ensure_token("prod-site").unwrap_err();
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn rejected_issuance_surfaces_the_status() {
    let dir = tempdir().unwrap();
    let issuer = Arc::new(InProcessIssuer::new([7u8; 32]));
    // An InProcessIssuer fed garbage rejects with a 400-style failure; here
    // the engine's blinded request is fine, so corrupt it in a wrapper.
    struct Rejecting(Arc<InProcessIssuer>);
    impl IssuanceTransport for Rejecting {
        fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, TransportError> {
            let mut mangled = request.clone();
            mangled.request = vec![0xFF; 4];
            self.0.issue(&mangled)
        }
    }

    let manager = TokenManager::new(
        real_engine(&issuer),
        Arc::new(Rejecting(issuer.clone())),
        TokenStore::new(dir.path()),
        StorePolicy::Required,
    );

    let err = manager.ensure_token("prod-site").unwrap_err();
    match err {
        IssuanceError::Transport(TransportError::Status { status }) => assert_eq!(status, 400),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(TokenStore::new(dir.path()).load("prod-site").unwrap().is_none());
}

#[test]
fn denied_store_write_fails_required_issuance_cleanly() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    let issuer = Arc::new(InProcessIssuer::new([7u8; 32]));
    let manager = TokenManager::new(
        real_engine(&issuer),
        issuer.clone(),
        TokenStore::new(&blocker),
        StorePolicy::Required,
    );

    let err = manager.ensure_token("prod-site").unwrap_err();
    assert!(matches!(err, IssuanceError::Store(_)));

    // No stale cache entry is readable afterwards, in memory or on disk.
    let _ = manager.ensure_token("prod-site").unwrap_err();
    assert_eq!(issuer.call_count(), 2);
}

#[test]
fn denied_store_write_degrades_under_best_effort() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    let issuer = Arc::new(InProcessIssuer::new([7u8; 32]));
    let manager = TokenManager::new(
        real_engine(&issuer),
        issuer.clone(),
        TokenStore::new(&blocker),
        StorePolicy::BestEffort,
    );

    let token = manager.ensure_token("prod-site").unwrap();
    assert_eq!(token.len(), 32);

    // Usable for this process lifetime without further round-trips.
    let again = manager.ensure_token("prod-site").unwrap();
    assert_eq!(again, token);
    assert_eq!(issuer.call_count(), 1);
}
