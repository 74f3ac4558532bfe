// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cryptographic core for ScopeBlind
//!
//! This crate implements the client side of a VOPRF(P-256, SHA-256)
//! credential protocol plus the per-request spend proof:
//!
//! - [`voprf`]: blind / unblind protocol math and the issuer-side
//!   evaluation used by tests and local tooling.
//! - [`spend`]: Schnorr-style discrete-log proof binding a token to a
//!   `METHOD:PATH` signing context.
//! - [`engine`]: the statically selected engine strategy
//!   ([`engine::RealVoprfEngine`] / [`engine::SimulatedVoprfEngine`]).
//!
//! # Memory zeroization
//!
//! Blinding factors, spend scalars and ephemeral Schnorr nonces are
//! `p256::Scalar` values, which implement `DefaultIsZeroes` from the
//! `zeroize` crate and are erased when dropped. Curve points and encoded
//! requests are public values and are not zeroized.

use core::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

pub mod engine;
pub mod spend;
pub mod voprf;

pub use engine::{create_engine, BlindState, EngineConfig, VoprfEngine};

/// Domain-separation context shared by every ScopeBlind deployment.
///
/// Changing this breaks interoperability with deployed issuers.
pub const PROTOCOL_CONTEXT: &[u8] = b"scopeblind:v1";

/// Randomness or arithmetic failure inside the VOPRF engine.
///
/// Fatal to the current operation; never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The randomness source produced unusable output.
    Randomness,
    /// A derived scalar reduced to zero.
    ZeroScalar,
    /// Point decoding or hash-to-curve failed.
    InvalidPoint,
    /// A DLEQ or spend proof did not verify.
    ProofRejected,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::Randomness => write!(f, "randomness source failure"),
            CryptoError::ZeroScalar => write!(f, "derived scalar is zero"),
            CryptoError::InvalidPoint => write!(f, "invalid curve point"),
            CryptoError::ProofRejected => write!(f, "proof verification failed"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Protocol sequencing or format violation.
///
/// Fatal to the current issuance attempt; the caller must restart from
/// `blind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// No usable blind state for this unblind call.
    MissingState,
    /// The issuer evaluation has the wrong length or layout.
    MalformedEvaluation,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MissingState => write!(f, "no blind state for this unblind"),
            ProtocolError::MalformedEvaluation => write!(f, "malformed issuer evaluation"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Union of the two engine-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoprfError {
    Crypto(CryptoError),
    Protocol(ProtocolError),
}

impl fmt::Display for VoprfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoprfError::Crypto(e) => e.fmt(f),
            VoprfError::Protocol(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for VoprfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VoprfError::Crypto(e) => Some(e),
            VoprfError::Protocol(e) => Some(e),
        }
    }
}

impl From<CryptoError> for VoprfError {
    fn from(e: CryptoError) -> Self {
        VoprfError::Crypto(e)
    }
}

impl From<ProtocolError> for VoprfError {
    fn from(e: ProtocolError) -> Self {
        VoprfError::Protocol(e)
    }
}

/// The spendable credential: the finalized, unblinded PRF output.
///
/// Real issuance always produces 32 bytes; injected or simulated tokens may
/// be any length. Compared in constant time and never printed in full.
#[derive(Clone)]
pub struct Token(Vec<u8>);

impl Token {
    pub fn new(bytes: Vec<u8>) -> Self {
        Token(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Token {
    fn from(bytes: Vec<u8>) -> Self {
        Token(bytes)
    }
}

impl From<&[u8]> for Token {
    fn from(bytes: &[u8]) -> Self {
        Token(bytes.to_vec())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for Token {}

impl Drop for Token {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({} bytes)", self.0.len())
    }
}
