// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Exactly one issuance round-trip under concurrent callers.

use std::sync::Arc;
use std::time::Duration;

use scopeblind_client::{StorePolicy, TokenManager, TokenStore};
use scopeblind_integration_tests::support::{real_engine, InProcessIssuer};
use tempfile::tempdir;

#[test]
fn concurrent_callers_share_one_issuance() {
    let dir = tempdir().unwrap();
    // The issuer holds each evaluation long enough that all callers pile up
    // behind the in-flight round-trip.
    let issuer = Arc::new(InProcessIssuer::with_delay(
        [7u8; 32],
        Duration::from_millis(100),
    ));
    let manager = Arc::new(TokenManager::new(
        real_engine(&issuer),
        issuer.clone(),
        TokenStore::new(dir.path()),
        StorePolicy::Required,
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.ensure_token("busy-site").unwrap())
        })
        .collect();

    let tokens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Everyone got the same credential from a single round-trip.
    assert_eq!(issuer.call_count(), 1);
    for token in &tokens[1..] {
        assert_eq!(token, &tokens[0]);
    }
}

#[test]
fn distinct_sites_issue_independently() {
    let dir = tempdir().unwrap();
    let issuer = Arc::new(InProcessIssuer::with_delay(
        [7u8; 32],
        Duration::from_millis(50),
    ));
    let manager = Arc::new(TokenManager::new(
        real_engine(&issuer),
        issuer.clone(),
        TokenStore::new(dir.path()),
        StorePolicy::Required,
    ));

    let handles: Vec<_> = ["site-a", "site-b"]
        .into_iter()
        .map(|site| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.ensure_token(site).unwrap())
        })
        .collect();

    let tokens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(issuer.call_count(), 2);
    assert_ne!(tokens[0], tokens[1]);
}
