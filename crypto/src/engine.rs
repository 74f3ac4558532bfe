// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine strategy: real protocol math vs. insecure simulation.
//!
//! The backend is selected once, at construction, from configuration. There
//! is no runtime capability detection and no fallback between the two: a
//! misconfigured real deployment fails loudly instead of silently degrading
//! to the simulation.

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::spend;
use crate::voprf::core::{Client, ClientBlindState};
use crate::{CryptoError, ProtocolError, Token, VoprfError};

/// Opaque blinding state handed back by [`VoprfEngine::blind`].
///
/// Consumed by value in `unblind`, so it cannot outlive the issuance
/// attempt. A state minted by one engine strategy is rejected by the other
/// with [`ProtocolError::MissingState`].
pub struct BlindState {
    inner: StateInner,
}

enum StateInner {
    Real(ClientBlindState),
    Simulated,
}

/// The VOPRF engine seam used by the token lifecycle.
///
/// Implementations must be safe to share across caller threads; blind and
/// spend-proof generation are pure computation and never block.
pub trait VoprfEngine: Send + Sync {
    /// Blind `input`. The returned request bytes are safe to transmit; the
    /// state must never leave the process.
    fn blind(&self, input: &[u8]) -> Result<(Vec<u8>, BlindState), VoprfError>;

    /// Consume the issuer evaluation and the blind state, producing the
    /// spendable token.
    fn unblind(
        &self,
        evaluation: &[u8],
        state: BlindState,
        input: &[u8],
    ) -> Result<Token, VoprfError>;

    /// Produce the encoded spend proof binding `token` to `context`.
    fn spend_proof(&self, token: &Token, context: &str) -> Result<Vec<u8>, VoprfError>;
}

/// Configuration for selecting the engine backend.
#[derive(Debug, Clone)]
pub enum EngineConfig {
    /// Full protocol math; requires the issuer's evaluation public key
    /// (SEC1 compressed) to check issuance proofs.
    Real {
        issuer_public_key: Vec<u8>,
        context: Vec<u8>,
    },
    /// Insecure simulation for integration testing only.
    Simulated,
}

/// Create an engine from configuration.
pub fn create_engine(config: EngineConfig) -> Result<Box<dyn VoprfEngine>, VoprfError> {
    match config {
        EngineConfig::Real {
            issuer_public_key,
            context,
        } => Ok(Box::new(RealVoprfEngine::new(&issuer_public_key, &context)?)),
        EngineConfig::Simulated => Ok(Box::new(SimulatedVoprfEngine::new())),
    }
}

/// Production engine: P-256 VOPRF with DLEQ-checked issuance and
/// Schnorr-style spend proofs.
pub struct RealVoprfEngine {
    client: Client,
    issuer_public_key: Vec<u8>,
}

impl RealVoprfEngine {
    /// Fails with [`CryptoError::InvalidPoint`] if the issuer key is not a
    /// valid compressed P-256 point.
    pub fn new(issuer_public_key_sec1: &[u8], context: &[u8]) -> Result<Self, VoprfError> {
        crate::voprf::core::decode_point(issuer_public_key_sec1)
            .ok_or(CryptoError::InvalidPoint)?;
        Ok(Self {
            client: Client::new(context),
            issuer_public_key: issuer_public_key_sec1.to_vec(),
        })
    }
}

impl VoprfEngine for RealVoprfEngine {
    fn blind(&self, input: &[u8]) -> Result<(Vec<u8>, BlindState), VoprfError> {
        let (request, state) = self.client.blind(input)?;
        Ok((
            request,
            BlindState {
                inner: StateInner::Real(state),
            },
        ))
    }

    fn unblind(
        &self,
        evaluation: &[u8],
        state: BlindState,
        input: &[u8],
    ) -> Result<Token, VoprfError> {
        let state = match state.inner {
            StateInner::Real(st) => st,
            StateInner::Simulated => return Err(ProtocolError::MissingState.into()),
        };
        self.client
            .unblind(evaluation, state, input, &self.issuer_public_key)
    }

    fn spend_proof(&self, token: &Token, context: &str) -> Result<Vec<u8>, VoprfError> {
        let proof = spend::generate(token.as_bytes(), context, &mut rand::rngs::OsRng)?;
        Ok(spend::encode(&proof).to_vec())
    }
}

/// Test-only engine: no blinding, no proofs, no security.
///
/// Every operation logs at WARN so a simulated deployment can never be
/// mistaken for a secure one.
pub struct SimulatedVoprfEngine;

impl SimulatedVoprfEngine {
    pub fn new() -> Self {
        warn!("SIMULATED VOPRF engine active: tokens and proofs are INSECURE, integration testing only");
        SimulatedVoprfEngine
    }
}

impl Default for SimulatedVoprfEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VoprfEngine for SimulatedVoprfEngine {
    fn blind(&self, _input: &[u8]) -> Result<(Vec<u8>, BlindState), VoprfError> {
        let mut request = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut request);
        Ok((
            request,
            BlindState {
                inner: StateInner::Simulated,
            },
        ))
    }

    fn unblind(
        &self,
        evaluation: &[u8],
        state: BlindState,
        _input: &[u8],
    ) -> Result<Token, VoprfError> {
        match state.inner {
            StateInner::Simulated => {}
            StateInner::Real(_) => return Err(ProtocolError::MissingState.into()),
        }
        if evaluation.is_empty() {
            return Err(ProtocolError::MalformedEvaluation.into());
        }
        // The simulation takes the evaluation bytes as the token verbatim.
        Ok(Token::from(evaluation))
    }

    fn spend_proof(&self, token: &Token, context: &str) -> Result<Vec<u8>, VoprfError> {
        warn!("generating SIMULATED spend proof (insecure)");
        let mut h = Sha256::new();
        h.update(token.as_bytes());
        h.update(context.as_bytes());
        Ok(h.finalize().to_vec())
    }
}
