// SPDX-License-Identifier: Apache-2.0 OR MIT

use elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use elliptic_curve::{
    bigint::{NonZero, U256},
    scalar::FromUintUnchecked,
    sec1::{FromEncodedPoint, ToEncodedPoint},
    Curve, Field,
};
use p256::{AffinePoint, EncodedPoint, NistP256, ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::dleq::{decode_proof, encode_proof, prove, verify};
use crate::{CryptoError, ProtocolError, Token, VoprfError};

pub(crate) const COMPRESSED_POINT_LEN: usize = 33;

// Evaluation format: [VERSION||A||B||Proof]
// VERSION: 1 byte (0x01 for current version)
// A: 33 bytes (blinded element echoed back, compressed point)
// B: 33 bytes (evaluated element, compressed point)
// Proof: 64 bytes (DLEQ proof that B = k*A under the issuer key)
pub(crate) const EVALUATION_VERSION_V1: u8 = 0x01;
const EVALUATION_VERSION_LEN: usize = 1;
const EVALUATION_POINT_LEN: usize = COMPRESSED_POINT_LEN;
const EVALUATION_PROOF_LEN: usize = 64;
pub const EVALUATION_LEN: usize = EVALUATION_VERSION_LEN + EVALUATION_POINT_LEN * 2 + EVALUATION_PROOF_LEN;

const FINALIZE_DST: &[u8] = b"ScopeBlind-VOPRF-P256-SHA256:Finalize";

/// RFC 9380-compliant hash-to-curve for P-256 (SSWU_RO).
pub(crate) fn hash_to_curve(input: &[u8], ctx: &[u8]) -> Option<ProjectivePoint> {
    const BASE_DST: &[u8] = b"P256_XMD:SHA-256_SSWU_RO_";
    let mut dst = Vec::with_capacity(BASE_DST.len() + ctx.len());
    dst.extend_from_slice(BASE_DST);
    dst.extend_from_slice(ctx);

    let point = NistP256::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[input], &[&dst]).ok()?;
    Some(ProjectivePoint::from(point))
}

pub(crate) fn encode_point(p: &ProjectivePoint) -> [u8; COMPRESSED_POINT_LEN] {
    p.to_affine()
        .to_encoded_point(true)
        .as_bytes()
        .try_into()
        .expect("compressed SEC1 encoding is 33 bytes")
}

pub(crate) fn decode_point(bytes: &[u8]) -> Option<ProjectivePoint> {
    let ep = EncodedPoint::from_bytes(bytes).ok()?;
    let ap: Option<AffinePoint> = AffinePoint::from_encoded_point(&ep).into();
    let ap = ap?;
    if ap.is_identity().into() {
        return None;
    }
    Some(ProjectivePoint::from(ap))
}

fn generator() -> ProjectivePoint {
    ProjectivePoint::GENERATOR
}

pub(crate) fn scalar_from_be32(bytes: [u8; 32]) -> Result<Scalar, CryptoError> {
    let u = U256::from_be_slice(&bytes);
    let n = NonZero::new(NistP256::ORDER).expect("curve order is nonzero");
    let s = Scalar::from_uint_unchecked(u.rem(&n));

    let is_zero = s.to_bytes().ct_eq(&Scalar::ZERO.to_bytes());
    if bool::from(is_zero) {
        return Err(CryptoError::ZeroScalar);
    }
    Ok(s)
}

/// PRF finalize: Token = H(dst || ctx || len(input) || input || N).
fn prf_output(input: &[u8], unblinded: &ProjectivePoint, ctx: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(FINALIZE_DST);
    h.update(ctx);
    h.update((input.len() as u64).to_be_bytes());
    h.update(input);
    h.update(encode_point(unblinded));
    let out = h.finalize();
    let mut out32 = [0u8; 32];
    out32.copy_from_slice(&out);
    out32
}

/// Client-side blinding state for one in-flight issuance attempt.
///
/// The blinding factor `r` is a `Scalar`, which implements `DefaultIsZeroes`
/// and is erased from memory on drop. Consumed by value in
/// [`Client::unblind`], so a state cannot outlive its attempt.
pub struct ClientBlindState {
    /// Blinding factor (auto-zeroized on drop).
    r: Scalar,
    /// Blinded element A = r * H1(input); echoed back by the issuer.
    a: ProjectivePoint,
}

pub struct Client {
    ctx: Vec<u8>,
}

impl Client {
    pub fn new(ctx: &[u8]) -> Self {
        Self { ctx: ctx.to_vec() }
    }

    /// Blind the input. Returns the wire-safe blinded element and the state
    /// that must never leave the process.
    pub fn blind(&self, input: &[u8]) -> Result<(Vec<u8>, ClientBlindState), VoprfError> {
        let p = hash_to_curve(input, &self.ctx).ok_or(CryptoError::InvalidPoint)?;
        let r = Scalar::random(rand::rngs::OsRng);
        if bool::from(r.is_zero()) {
            return Err(CryptoError::ZeroScalar.into());
        }
        let a = p * r;
        Ok((encode_point(&a).to_vec(), ClientBlindState { r, a }))
    }

    /// Parse the issuer evaluation, check the DLEQ proof against the issuer
    /// key, unblind N = r^-1 * B and derive the token.
    pub fn unblind(
        &self,
        evaluation: &[u8],
        state: ClientBlindState,
        input: &[u8],
        issuer_pubkey_sec1_compressed: &[u8],
    ) -> Result<Token, VoprfError> {
        if evaluation.len() != EVALUATION_LEN {
            return Err(ProtocolError::MalformedEvaluation.into());
        }
        if evaluation[0] != EVALUATION_VERSION_V1 {
            return Err(ProtocolError::MalformedEvaluation.into());
        }

        let offset = EVALUATION_VERSION_LEN;
        let a = decode_point(&evaluation[offset..offset + EVALUATION_POINT_LEN])
            .ok_or(ProtocolError::MalformedEvaluation)?;
        let b = decode_point(
            &evaluation[offset + EVALUATION_POINT_LEN..offset + EVALUATION_POINT_LEN * 2],
        )
        .ok_or(ProtocolError::MalformedEvaluation)?;
        let proof_bytes: &[u8; 64] = evaluation[offset + EVALUATION_POINT_LEN * 2..]
            .try_into()
            .map_err(|_| ProtocolError::MalformedEvaluation)?;
        let proof = decode_proof(proof_bytes);

        // The evaluation must be bound to the element we actually sent.
        if a != state.a {
            return Err(CryptoError::ProofRejected.into());
        }

        let q = decode_point(issuer_pubkey_sec1_compressed).ok_or(CryptoError::InvalidPoint)?;
        let ok = verify(
            &generator().to_affine(),
            &q.to_affine(),
            &a.to_affine(),
            &b.to_affine(),
            &proof,
            Some(&self.ctx),
        );
        if !ok {
            return Err(CryptoError::ProofRejected.into());
        }

        let r_inv: Option<Scalar> = state.r.invert().into();
        let r_inv = r_inv.ok_or(CryptoError::ZeroScalar)?;
        let n = b * r_inv;

        Ok(Token::new(prf_output(input, &n, &self.ctx).to_vec()))
    }
}

/// Issuer-side evaluation. The production issuer is a remote service; this
/// lives here for tests, benches and local tooling.
pub struct Issuer {
    k: Scalar,
    q: ProjectivePoint, // k*G
    ctx: Vec<u8>,
}

impl Issuer {
    pub fn from_secret_key(sk_bytes: [u8; 32], ctx: &[u8]) -> Result<Self, CryptoError> {
        let k = scalar_from_be32(sk_bytes)?;
        let q = generator() * k;
        Ok(Self {
            k,
            q,
            ctx: ctx.to_vec(),
        })
    }

    pub fn public_key_sec1_compressed(&self) -> [u8; COMPRESSED_POINT_LEN] {
        encode_point(&self.q)
    }

    pub fn evaluate(&self, blinded_bytes: &[u8]) -> Result<Vec<u8>, VoprfError> {
        let a = decode_point(blinded_bytes).ok_or(CryptoError::InvalidPoint)?;
        let b = a * self.k;

        let mut rng = rand::rngs::OsRng;
        let proof = prove(
            &self.k,
            &generator().to_affine(),
            &self.q.to_affine(),
            &a.to_affine(),
            &b.to_affine(),
            &mut rng,
            Some(&self.ctx),
        );

        let mut evaluation = Vec::with_capacity(EVALUATION_LEN);
        evaluation.push(EVALUATION_VERSION_V1);
        evaluation.extend_from_slice(&encode_point(&a));
        evaluation.extend_from_slice(&encode_point(&b));
        evaluation.extend_from_slice(&encode_proof(&proof));
        Ok(evaluation)
    }
}
