// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for the end-to-end tests.

pub mod support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use scopeblind_client::{IssuanceTransport, TransportError};
    use scopeblind_common::api::{IssueRequest, IssueResponse};
    use scopeblind_crypto::engine::RealVoprfEngine;
    use scopeblind_crypto::voprf::Issuer;
    use scopeblind_crypto::{VoprfEngine, PROTOCOL_CONTEXT};

    /// The issuance service collapsed into a transport: evaluates blinded
    /// requests in-process and counts the round-trips it sees.
    pub struct InProcessIssuer {
        issuer: Issuer,
        public_key: [u8; 33],
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl InProcessIssuer {
        pub fn new(sk: [u8; 32]) -> Self {
            let issuer =
                Issuer::from_secret_key(sk, PROTOCOL_CONTEXT).expect("test secret key is valid");
            let public_key = issuer.public_key_sec1_compressed();
            Self {
                issuer,
                public_key,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        /// Hold each evaluation for `delay`, so concurrent callers really
        /// overlap with the in-flight round-trip.
        pub fn with_delay(sk: [u8; 32], delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(sk)
            }
        }

        pub fn public_key(&self) -> [u8; 33] {
            self.public_key
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IssuanceTransport for InProcessIssuer {
        fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let evaluation = self
                .issuer
                .evaluate(&request.request)
                .map_err(|_| TransportError::Status { status: 400 })?;
            Ok(IssueResponse { evaluation })
        }
    }

    /// A real engine wired against this issuer's key.
    pub fn real_engine(issuer: &InProcessIssuer) -> Arc<dyn VoprfEngine> {
        Arc::new(
            RealVoprfEngine::new(&issuer.public_key(), PROTOCOL_CONTEXT)
                .expect("issuer public key is a valid point"),
        )
    }
}
