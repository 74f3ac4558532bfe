// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-request spend proof.
//!
//! A spend proof binds a stored token to one signing context (the
//! upper-cased HTTP method and path, `"POST:/api/x"`) without exposing the
//! token. The construction is a Schnorr-style discrete-log proof over the
//! same P-256 group as the VOPRF:
//!
//! - `x = H2S(token)`, the spend scalar, derivable only with the token;
//! - `M = H2C(context)`, the context point;
//! - `W = x*M`, the context-bound element carried in the proof;
//! - a proof of knowledge of `x` with `W`, `M` and the context string
//!   bound into the Fiat-Shamir challenge.
//!
//! `W` is pseudorandom per context under DDH, so proofs for different
//! contexts are unlinkable to anyone not holding the token, while a party
//! that can derive the token's spend scalar recomputes `W` and checks both
//! the binding and the proof.

use core::fmt;

use p256::{
    elliptic_curve::{ops::Reduce, Field},
    ProjectivePoint, Scalar,
};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::voprf::core::{decode_point, encode_point, hash_to_curve, COMPRESSED_POINT_LEN};
use crate::CryptoError;

const SPEND_DST: &[u8] = b"ScopeBlind-Spend-P256-v1";
const SPEND_KEY_DST: &[u8] = b"ScopeBlind-Spend-P256-v1:SpendKey";

/// Encoded proof layout: W (33) || c (32) || s (32).
pub const SPEND_PROOF_LEN: usize = COMPRESSED_POINT_LEN + 32 + 32;

/// A context-bound spend proof. Transient; generated per outbound request
/// and never persisted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SpendProof {
    w: ProjectivePoint,
    c: Scalar,
    s: Scalar,
}

impl fmt::Debug for SpendProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // W alone identifies the (token, context) pair; keep it out of logs.
        write!(f, "SpendProof(..)")
    }
}

/// Derive the spend scalar from the token bytes: x = H(dst || len || token) mod n.
fn spend_scalar(token: &[u8]) -> Result<Scalar, CryptoError> {
    let mut h = Sha256::new();
    h.update(SPEND_KEY_DST);
    h.update((token.len() as u64).to_be_bytes());
    h.update(token);
    let x = Scalar::reduce_bytes(&h.finalize());
    if bool::from(x.is_zero()) {
        return Err(CryptoError::ZeroScalar);
    }
    Ok(x)
}

fn context_point(context: &str) -> Result<ProjectivePoint, CryptoError> {
    hash_to_curve(context.as_bytes(), SPEND_DST).ok_or(CryptoError::InvalidPoint)
}

/// Fiat-Shamir challenge over the full transcript, context included.
fn challenge_scalar(
    m: &ProjectivePoint,
    w: &ProjectivePoint,
    t: &ProjectivePoint,
    context: &str,
) -> Scalar {
    let mut h = Sha256::new();
    h.update(u32::try_from(SPEND_DST.len()).unwrap_or(0).to_be_bytes());
    h.update(SPEND_DST);
    for p in [m, w, t] {
        h.update(encode_point(p));
    }
    h.update((context.len() as u64).to_be_bytes());
    h.update(context.as_bytes());
    Scalar::reduce_bytes(&h.finalize())
}

/// Generate a spend proof for `token` bound to `context`.
///
/// The ephemeral nonce is zeroized on drop; all scalar arithmetic on the
/// spend scalar is constant-time.
pub fn generate<R: RngCore + CryptoRng>(
    token: &[u8],
    context: &str,
    rng: &mut R,
) -> Result<SpendProof, CryptoError> {
    let x = spend_scalar(token)?;
    let m = context_point(context)?;
    let w = m * x;

    let r = Scalar::random(rng);
    if bool::from(r.is_zero()) {
        return Err(CryptoError::ZeroScalar);
    }
    let t = m * r;
    let c = challenge_scalar(&m, &w, &t, context);
    let s = r + c * x;

    Ok(SpendProof { w, c, s })
}

/// Full verification with the token in hand: recompute the context binding
/// `W = x*M` and check the Schnorr equation. This is what an issuer-backed
/// verifier does after recovering the token for a presented credential.
pub fn verify(token: &[u8], context: &str, proof: &SpendProof) -> bool {
    let x = match spend_scalar(token) {
        Ok(x) => x,
        Err(_) => return false,
    };
    let m = match context_point(context) {
        Ok(m) => m,
        Err(_) => return false,
    };

    let expected_w = m * x;
    let w_matches = encode_point(&expected_w).ct_eq(&encode_point(&proof.w));
    bool::from(w_matches) && verify_knowledge(context, proof)
}

/// Proof-of-knowledge check alone: the prover knows `x` with `W = x*M`,
/// bound to `context`. Does not require the token.
pub fn verify_knowledge(context: &str, proof: &SpendProof) -> bool {
    let m = match context_point(context) {
        Ok(m) => m,
        Err(_) => return false,
    };

    // t' = s*M - c*W; accept iff the challenge recomputes.
    let t_prime = m * proof.s - proof.w * proof.c;
    let c_check = challenge_scalar(&m, &proof.w, &t_prime, context);
    bool::from(c_check.to_bytes().ct_eq(&proof.c.to_bytes()))
}

/// Serialize to `SPEND_PROOF_LEN` bytes: W || c || s.
pub fn encode(proof: &SpendProof) -> [u8; SPEND_PROOF_LEN] {
    let mut out = [0u8; SPEND_PROOF_LEN];
    out[..COMPRESSED_POINT_LEN].copy_from_slice(&encode_point(&proof.w));
    out[COMPRESSED_POINT_LEN..COMPRESSED_POINT_LEN + 32].copy_from_slice(&proof.c.to_bytes());
    out[COMPRESSED_POINT_LEN + 32..].copy_from_slice(&proof.s.to_bytes());
    out
}

/// Deserialize from bytes; `None` on wrong length or invalid point.
pub fn decode(bytes: &[u8]) -> Option<SpendProof> {
    if bytes.len() != SPEND_PROOF_LEN {
        return None;
    }
    let w = decode_point(&bytes[..COMPRESSED_POINT_LEN])?;
    let c_bytes: [u8; 32] = bytes[COMPRESSED_POINT_LEN..COMPRESSED_POINT_LEN + 32]
        .try_into()
        .ok()?;
    let s_bytes: [u8; 32] = bytes[COMPRESSED_POINT_LEN + 32..].try_into().ok()?;
    Some(SpendProof {
        w,
        c: Scalar::reduce_bytes(&p256::FieldBytes::from(c_bytes)),
        s: Scalar::reduce_bytes(&p256::FieldBytes::from(s_bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    const TOKEN: &[u8] = b"mock_token_bytes_1234567890";

    #[test]
    fn proof_round_trip() {
        let mut rng = OsRng;
        let proof = generate(TOKEN, "POST:/api/test", &mut rng).unwrap();

        assert!(verify(TOKEN, "POST:/api/test", &proof));
        assert!(verify_knowledge("POST:/api/test", &proof));

        let enc = encode(&proof);
        assert_eq!(enc.len(), SPEND_PROOF_LEN);
        let dec = decode(&enc).unwrap();
        assert_eq!(proof, dec);
        assert!(verify(TOKEN, "POST:/api/test", &dec));
    }

    #[test]
    fn proof_is_context_bound() {
        let mut rng = OsRng;
        let proof = generate(TOKEN, "POST:/api/test", &mut rng).unwrap();

        // Anti-replay across endpoints: the same proof must not verify for
        // any other context.
        assert!(!verify(TOKEN, "GET:/api/test", &proof));
        assert!(!verify(TOKEN, "POST:/api/other", &proof));
        assert!(!verify_knowledge("POST:/api/other", &proof));
    }

    #[test]
    fn proofs_differ_across_contexts() {
        let mut rng = OsRng;
        let p1 = generate(TOKEN, "POST:/a", &mut rng).unwrap();
        let p2 = generate(TOKEN, "POST:/b", &mut rng).unwrap();
        assert_ne!(encode(&p1), encode(&p2));
    }

    #[test]
    fn proof_requires_the_right_token() {
        let mut rng = OsRng;
        let proof = generate(TOKEN, "POST:/api/test", &mut rng).unwrap();
        assert!(!verify(b"some other token", "POST:/api/test", &proof));
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let mut rng = OsRng;
        let proof = generate(TOKEN, "POST:/api/test", &mut rng).unwrap();
        let mut enc = encode(&proof);

        for idx in [0, COMPRESSED_POINT_LEN, COMPRESSED_POINT_LEN + 32, SPEND_PROOF_LEN - 1] {
            enc[idx] ^= 0x01;
            match decode(&enc) {
                Some(bad) => assert!(!verify(TOKEN, "POST:/api/test", &bad)),
                None => {} // corrupted point encodings may fail to decode at all
            }
            enc[idx] ^= 0x01;
        }
    }

    #[test]
    fn wrong_length_fails_to_decode() {
        assert!(decode(&[0u8; 3]).is_none());
        assert!(decode(&[0u8; SPEND_PROOF_LEN + 1]).is_none());
    }
}
