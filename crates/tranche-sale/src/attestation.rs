//! # Signed-Attestation Verifier
//!
//! Pre-liquid sales have no fixed price, so an off-ledger platform signer
//! bounds each investor's exposure instead of an on-ledger whitelist. Every
//! exposure-relevant action carries a fresh [`SignedAttestation`] over:
//!
//! `(account, sale, chain_id, position_cap, allocation_rate, action, nonce, expires_at)`
//!
//! ## Security Invariant
//!
//! An attestation is accepted only if all of the following hold:
//!
//! 1. The Ed25519 signature over its canonical bytes verifies against the
//!    platform signer resolved from the directory.
//! 2. Account, sale, chain, and action match the call being made.
//! 3. `now <= expires_at`.
//! 4. `nonce` is strictly greater than the investor's last consumed nonce.
//! 5. Its digest is not already in the sale's replay set.
//!
//! Verification has no side effects. The caller records the digest and nonce
//! only after the rest of the operation has succeeded.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tranche_core::amount::decimal;
use tranche_core::{
    sha256_digest, AccountId, Amount, CanonicalBytes, ContentDigest, SaleId, SignatureError,
    Timestamp,
};
use tranche_crypto::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// The action an attestation authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationAction {
    Invest,
    WithdrawExcess,
    ClaimAllocation,
}

impl std::fmt::Display for AttestationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Invest => "invest",
            Self::WithdrawExcess => "withdraw_excess",
            Self::ClaimAllocation => "claim_allocation",
        })
    }
}

/// The signed tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub account: AccountId,
    pub sale: SaleId,
    pub chain_id: u64,
    /// Cumulative capital the position may hold.
    #[serde(with = "decimal")]
    pub position_cap: Amount,
    /// Pro-rata share of the token allocation, `1e18` fixed point.
    #[serde(with = "decimal")]
    pub allocation_rate: Amount,
    pub action: AttestationAction,
    pub nonce: u64,
    pub expires_at: Timestamp,
}

impl Attestation {
    pub fn canonical_bytes(&self) -> Result<CanonicalBytes, SignatureError> {
        CanonicalBytes::new(self).map_err(|e| SignatureError::Invalid {
            account: self.account,
            reason: format!("attestation does not canonicalize: {e}"),
        })
    }

    /// Replay-set key.
    pub fn digest(&self) -> Result<ContentDigest, SignatureError> {
        Ok(sha256_digest(&self.canonical_bytes()?))
    }

    /// Sign with the platform signer's key.
    pub fn sign(self, signer: &Ed25519KeyPair) -> Result<SignedAttestation, SignatureError> {
        let signature = signer.sign(&self.canonical_bytes()?);
        Ok(SignedAttestation {
            attestation: self,
            signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    pub attestation: Attestation,
    pub signature: Ed25519Signature,
}

/// What the call expects the attestation to say.
#[derive(Debug, Clone, Copy)]
pub struct AttestationScope {
    pub account: AccountId,
    pub sale: SaleId,
    pub chain_id: u64,
    pub action: AttestationAction,
    pub now: Timestamp,
    pub last_nonce: u64,
}

/// An attestation that passed verification, not yet consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAttestation {
    pub digest: ContentDigest,
    pub nonce: u64,
    pub position_cap: Amount,
    pub allocation_rate: Amount,
}

fn mismatch(field: &'static str, expected: impl ToString, actual: impl ToString) -> SignatureError {
    SignatureError::Mismatch {
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Verify `signed` for `scope` against `signer`, given the replay set.
pub fn verify_attestation(
    signed: &SignedAttestation,
    scope: &AttestationScope,
    signer: &AccountId,
    consumed: &BTreeSet<ContentDigest>,
) -> Result<VerifiedAttestation, SignatureError> {
    let a = &signed.attestation;
    let bytes = a.canonical_bytes()?;
    Ed25519PublicKey::from_account(signer)
        .verify(&bytes, &signed.signature)
        .map_err(|e| SignatureError::Invalid {
            account: a.account,
            reason: e.to_string(),
        })?;

    if a.account != scope.account {
        return Err(mismatch("account", scope.account, a.account));
    }
    if a.sale != scope.sale {
        return Err(mismatch("sale", scope.sale, a.sale));
    }
    if a.chain_id != scope.chain_id {
        return Err(mismatch("chain_id", scope.chain_id, a.chain_id));
    }
    if a.action != scope.action {
        return Err(mismatch("action", scope.action, a.action));
    }
    if scope.now > a.expires_at {
        return Err(SignatureError::Expired {
            expires_at: a.expires_at,
            now: scope.now,
        });
    }
    let digest = sha256_digest(&bytes);
    if consumed.contains(&digest) {
        return Err(SignatureError::Reused {
            digest: digest.to_hex(),
        });
    }
    if a.nonce <= scope.last_nonce {
        return Err(SignatureError::Stale {
            account: a.account,
            nonce: a.nonce,
            last_nonce: scope.last_nonce,
        });
    }
    Ok(VerifiedAttestation {
        digest,
        nonce: a.nonce,
        position_cap: a.position_cap,
        allocation_rate: a.allocation_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        signer: Ed25519KeyPair,
        investor: AccountId,
        sale: SaleId,
        now: Timestamp,
    }

    fn fixture() -> Fixture {
        Fixture {
            signer: Ed25519KeyPair::from_seed(&[9u8; 32]),
            investor: AccountId::derive("investor", b"alice"),
            sale: SaleId::new(),
            now: Timestamp::parse("2026-03-01T12:00:00Z").unwrap(),
        }
    }

    impl Fixture {
        fn attestation(&self, nonce: u64) -> Attestation {
            Attestation {
                account: self.investor,
                sale: self.sale,
                chain_id: 1,
                position_cap: 5_000,
                allocation_rate: 250_000_000_000_000_000,
                action: AttestationAction::Invest,
                nonce,
                expires_at: self.now.checked_add_secs(600).unwrap(),
            }
        }

        fn scope(&self, last_nonce: u64) -> AttestationScope {
            AttestationScope {
                account: self.investor,
                sale: self.sale,
                chain_id: 1,
                action: AttestationAction::Invest,
                now: self.now,
                last_nonce,
            }
        }
    }

    #[test]
    fn valid_attestation_verifies() {
        let f = fixture();
        let signed = f.attestation(1).sign(&f.signer).unwrap();
        let v = verify_attestation(&signed, &f.scope(0), &f.signer.account(), &BTreeSet::new()).unwrap();
        assert_eq!(v.nonce, 1);
        assert_eq!(v.position_cap, 5_000);
        assert_eq!(v.digest, signed.attestation.digest().unwrap());
    }

    #[test]
    fn wrong_signer_rejected() {
        let f = fixture();
        let rogue = Ed25519KeyPair::from_seed(&[1u8; 32]);
        let signed = f.attestation(1).sign(&rogue).unwrap();
        assert!(matches!(
            verify_attestation(&signed, &f.scope(0), &f.signer.account(), &BTreeSet::new()),
            Err(SignatureError::Invalid { .. })
        ));
    }

    #[test]
    fn tampered_cap_rejected() {
        let f = fixture();
        let mut signed = f.attestation(1).sign(&f.signer).unwrap();
        signed.attestation.position_cap = 1_000_000;
        assert!(matches!(
            verify_attestation(&signed, &f.scope(0), &f.signer.account(), &BTreeSet::new()),
            Err(SignatureError::Invalid { .. })
        ));
    }

    #[test]
    fn scope_mismatches_rejected() {
        let f = fixture();
        let signer = f.signer.account();
        let empty = BTreeSet::new();
        let mut other_action = f.attestation(1);
        other_action.action = AttestationAction::ClaimAllocation;
        let signed = other_action.sign(&f.signer).unwrap();
        assert!(matches!(
            verify_attestation(&signed, &f.scope(0), &signer, &empty),
            Err(SignatureError::Mismatch { field: "action", .. })
        ));

        let signed = f.attestation(1).sign(&f.signer).unwrap();
        let scope = AttestationScope {
            account: AccountId::derive("investor", b"bob"),
            ..f.scope(0)
        };
        assert!(matches!(
            verify_attestation(&signed, &scope, &signer, &empty),
            Err(SignatureError::Mismatch { field: "account", .. })
        ));
        let scope = AttestationScope { chain_id: 2, ..f.scope(0) };
        assert!(matches!(
            verify_attestation(&signed, &scope, &signer, &empty),
            Err(SignatureError::Mismatch { field: "chain_id", .. })
        ));
    }

    #[test]
    fn expiry_is_inclusive() {
        let f = fixture();
        let signed = f.attestation(1).sign(&f.signer).unwrap();
        let signer = f.signer.account();
        let empty = BTreeSet::new();
        let at_expiry = AttestationScope {
            now: f.now.checked_add_secs(600).unwrap(),
            ..f.scope(0)
        };
        assert!(verify_attestation(&signed, &at_expiry, &signer, &empty).is_ok());
        let after = AttestationScope {
            now: f.now.checked_add_secs(601).unwrap(),
            ..f.scope(0)
        };
        assert!(matches!(
            verify_attestation(&signed, &after, &signer, &empty),
            Err(SignatureError::Expired { .. })
        ));
    }

    #[test]
    fn replay_and_stale_nonce_rejected() {
        let f = fixture();
        let signer = f.signer.account();
        let signed = f.attestation(2).sign(&f.signer).unwrap();
        let consumed: BTreeSet<_> = [signed.attestation.digest().unwrap()].into_iter().collect();
        assert!(matches!(
            verify_attestation(&signed, &f.scope(0), &signer, &consumed),
            Err(SignatureError::Reused { .. })
        ));
        assert_eq!(
            verify_attestation(&signed, &f.scope(2), &signer, &BTreeSet::new()),
            Err(SignatureError::Stale {
                account: f.investor,
                nonce: 2,
                last_nonce: 2
            })
        );
    }

    #[test]
    fn amounts_travel_as_decimal_strings() {
        let f = fixture();
        let json = serde_json::to_value(f.attestation(1)).unwrap();
        assert_eq!(json["position_cap"], "5000");
        assert_eq!(json["action"], "invest");
    }
}
