//! # Ed25519 Attestation Signatures
//!
//! The platform signer authorizes investor actions in pre-liquid sales by
//! signing an attestation off-ledger; the sale verifies the signature
//! against the signer registered in the directory.
//!
//! ## Security Invariant
//!
//! - Signing input MUST be `&CanonicalBytes`. The signer and the sale hash
//!   the same JCS bytes no matter how the attestation was serialized in
//!   transit.
//! - `Ed25519KeyPair` does not implement `Serialize`, and its `Debug`
//!   output never contains key material. The only way out is
//!   [`Ed25519KeyPair::seed_bytes()`], used when writing a key file.
//!
//! ## Accounts
//!
//! An account controlled by a signing key is identified by the key's
//! 32 public bytes. [`Ed25519PublicKey::from_account()`] and
//! [`Ed25519PublicKey::to_account()`] convert between the two.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tranche_core::{hex, AccountId, CanonicalBytes, CryptoError};

/// An Ed25519 public key (32 bytes), hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey(pub [u8; 32]);

/// An Ed25519 signature (64 bytes), hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519Signature(pub [u8; 64]);

/// An Ed25519 signing key.
pub struct Ed25519KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Ed25519PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The public key an account identifier stands for.
    pub fn from_account(account: &AccountId) -> Self {
        Self(*account.as_bytes())
    }

    /// The account identifier controlled by this key.
    pub fn to_account(&self) -> AccountId {
        AccountId::from_bytes(self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a public key from 64 hex characters, `0x` prefix optional.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex::decode_array::<32>(s.trim())
            .map(Self)
            .map_err(|e| CryptoError::KeyError(format!("public key: {e}")))
    }

    /// Convert to a dalek verifying key. Fails for byte strings that are
    /// not a valid curve point.
    pub fn to_verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::KeyError(format!("invalid public key: {e}")))
    }

    /// Verify `signature` over `data` with this key.
    pub fn verify(&self, data: &CanonicalBytes, signature: &Ed25519Signature) -> Result<(), CryptoError> {
        verify(data, signature, &self.to_verifying_key()?)
    }
}

impl Serialize for Ed25519PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PublicKey({}...)", hex::prefix(&self.0))
    }
}

impl std::fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Ed25519Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a signature from 128 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex::decode_array::<64>(s.trim())
            .map(Self)
            .map_err(|e| CryptoError::VerificationFailed(format!("signature: {e}")))
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signature({}...)", hex::prefix(&self.0))
    }
}

impl std::fmt::Display for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Ed25519KeyPair {
    /// Generate a key from the OS random source.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Rebuild a key from its 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Parse a key file body: 64 hex characters of seed.
    pub fn from_seed_hex(s: &str) -> Result<Self, CryptoError> {
        let seed = hex::decode_array::<32>(s.trim())
            .map_err(|e| CryptoError::KeyError(format!("signing key: {e}")))?;
        Ok(Self::from_seed(&seed))
    }

    /// The raw seed. Only key-file export should call this.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// The account this key controls.
    pub fn account(&self) -> AccountId {
        self.public_key().to_account()
    }

    /// Sign canonical bytes.
    pub fn sign(&self, data: &CanonicalBytes) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(data.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519KeyPair(<private>)")
    }
}

/// Verify an Ed25519 signature over canonical bytes.
pub fn verify(
    data: &CanonicalBytes,
    signature: &Ed25519Signature,
    verifying_key: &ed25519_dalek::VerifyingKey,
) -> Result<(), CryptoError> {
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key
        .verify(data.as_bytes(), &sig)
        .map_err(|e| CryptoError::VerificationFailed(format!("Ed25519 verification failed: {e}")))
}
