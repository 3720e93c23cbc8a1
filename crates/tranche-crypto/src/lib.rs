//! # tranche-crypto: Cryptographic Primitives
//!
//! - **Ed25519** signing and verification of platform attestations.
//! - **Merkle trees** with domain-separated SHA-256 for settlement roots and
//!   per-investor inclusion proofs.
//! - **Sealing curve**: a minimal group interface (generator, scalar
//!   multiply, encodings) with a Ristretto255 backend.
//! - **Sealed bids**: ECIES-style commitment of an investment amount to the
//!   sale's public point, openable by anyone once the private scalar is
//!   revealed.
//!
//! ## Crate Policy
//!
//! - Depends only on `tranche-core` internally.
//! - Signing input is always `&CanonicalBytes`.
//! - Secret material never appears in `Debug` output.

pub mod curve;
pub mod ed25519;
pub mod merkle;
pub mod sealing;

pub use curve::{CurvePoint, CurveScalar, Ristretto255, SealingCurve, SealingCurveKind};
pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use merkle::{MerkleHash, MerkleProof, MerkleTree, ProofStep, Side};
pub use sealing::{open_amount, seal_amount, SealTag, SealedAmount, SealedBid};
