// SPDX-License-Identifier: Apache-2.0 OR MIT

//! VOPRF(P-256, SHA-256)-verifiable protocol implementation built on RustCrypto.
pub mod core;
pub mod dleq;
pub use self::core::{Client, ClientBlindState, Issuer, EVALUATION_LEN};
