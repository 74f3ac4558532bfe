// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Discrete Log Equality (DLEQ) proof for P-256.
//!
//! Proves that the same secret `k` links two point pairs, `Y = k*G` and
//! `B = k*A`, without revealing `k`. The issuer attaches one of these to
//! every evaluation so the client can check the evaluation used the
//! advertised key.
use core::fmt;
use p256::{
    elliptic_curve::{ops::Reduce, sec1::ToEncodedPoint, Field},
    AffinePoint, FieldBytes, ProjectivePoint, Scalar,
};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A DLEQ proof: Fiat-Shamir challenge `c` and Schnorr response `s`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DleqProof {
    pub c: Scalar,
    pub s: Scalar,
}

impl fmt::Debug for DleqProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DleqProof {{ c: 0x{}, s: 0x{} }}", hex32(&self.c), hex32(&self.s))
    }
}

/// Domain separation tag for the transcript.
const DLEQ_DST: &[u8] = b"ScopeBlind-DLEQ-P256-v1";

/// Fiat-Shamir challenge as a scalar: c = H(transcript) mod n.
fn challenge_scalar(
    g: &AffinePoint,
    y: &AffinePoint,
    a: &AffinePoint,
    b: &AffinePoint,
    t1: &AffinePoint,
    t2: &AffinePoint,
    dst: &[u8],
) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(u32::try_from(dst.len()).unwrap_or(0).to_be_bytes());
    hasher.update(dst);
    for p in [g, y, a, b, t1, t2] {
        hasher.update(p.to_encoded_point(true).as_bytes());
    }
    Scalar::reduce_bytes(&hasher.finalize())
}

fn full_dst(extra: Option<&[u8]>) -> Vec<u8> {
    let mut dst = Vec::with_capacity(DLEQ_DST.len() + extra.map_or(0, |d| d.len()));
    dst.extend_from_slice(DLEQ_DST);
    if let Some(extra) = extra {
        dst.extend_from_slice(extra);
    }
    dst
}

/// Create a DLEQ proof that `y = k*G` and `b = k*a` for the same `k`.
///
/// The ephemeral scalar `r` is zeroized on drop via RustCrypto's `Scalar`.
pub fn prove<R: RngCore + CryptoRng>(
    k: &Scalar,
    g: &AffinePoint,
    y: &AffinePoint,
    a: &AffinePoint,
    b: &AffinePoint,
    rng: &mut R,
    dst: Option<&[u8]>,
) -> DleqProof {
    let r = Scalar::random(rng);
    let t1 = (ProjectivePoint::from(*g) * r).to_affine();
    let t2 = (ProjectivePoint::from(*a) * r).to_affine();

    let c = challenge_scalar(g, y, a, b, &t1, &t2, &full_dst(dst));
    let s = r + c * *k;

    DleqProof { c, s }
}

/// Verify a DLEQ proof.
pub fn verify(
    g: &AffinePoint,
    y: &AffinePoint,
    a: &AffinePoint,
    b: &AffinePoint,
    proof: &DleqProof,
    dst: Option<&[u8]>,
) -> bool {
    let t1_prime =
        (ProjectivePoint::from(*g) * proof.s - ProjectivePoint::from(*y) * proof.c).to_affine();
    let t2_prime =
        (ProjectivePoint::from(*a) * proof.s - ProjectivePoint::from(*b) * proof.c).to_affine();

    let c_check = challenge_scalar(g, y, a, b, &t1_prime, &t2_prime, &full_dst(dst));

    // Constant-time comparison; the challenge is derived from secret-linked
    // material and must not leak through timing.
    bool::from(c_check.to_bytes().ct_eq(&proof.c.to_bytes()))
}

/// Serialize proof to 64 bytes (c || s).
pub fn encode_proof(proof: &DleqProof) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&proof.c.to_bytes());
    out[32..].copy_from_slice(&proof.s.to_bytes());
    out
}

/// Deserialize proof from 64 bytes.
pub fn decode_proof(bytes: &[u8; 64]) -> DleqProof {
    let c_bytes: [u8; 32] = bytes[..32].try_into().expect("slice is 32 bytes");
    let s_bytes: [u8; 32] = bytes[32..].try_into().expect("slice is 32 bytes");
    DleqProof {
        c: Scalar::reduce_bytes(&FieldBytes::from(c_bytes)),
        s: Scalar::reduce_bytes(&FieldBytes::from(s_bytes)),
    }
}

fn hex32(x: &Scalar) -> String {
    x.to_bytes().iter().map(|byte| format!("{:02x}", byte)).collect()
}
