//! # Settlement Merkle Trees
//!
//! Binary Merkle trees over opaque leaf encodings. A sale stores only the
//! roots; investors present a leaf's fields plus an inclusion proof, and the
//! sale recomputes the leaf bytes itself before verifying.
//!
//! ## Algorithm
//!
//! Domain-separated SHA-256:
//! - Leaf: `SHA256(0x00 || leaf_bytes)`.
//! - Node: `SHA256(0x01 || left || right)`.
//!
//! Levels are built pairwise left to right. A node left without a sibling
//! is promoted unchanged to the next level, so no proof step is emitted for
//! it and no leaf is ever duplicated.
//!
//! ## Security Invariant
//!
//! The `0x00`/`0x01` prefixes keep an interior node from being presented as
//! a leaf. Leaf layouts that also carry a tree tag (see the settlement
//! module of `tranche-sale`) keep a leaf of one tree from verifying against
//! another.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tranche_core::{hex, CryptoError};

/// A 32-byte tree hash: a root, or a sibling inside a proof.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MerkleHash(pub [u8; 32]);

impl MerkleHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex::decode_array::<32>(s)
            .map(Self)
            .map_err(|e| CryptoError::Merkle(format!("hash: {e}")))
    }
}

impl Serialize for MerkleHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MerkleHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for MerkleHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MerkleHash({}...)", hex::prefix(&self.0))
    }
}

impl std::fmt::Display for MerkleHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// `SHA256(0x00 || leaf_bytes)`.
pub fn leaf_hash(leaf_bytes: &[u8]) -> MerkleHash {
    let mut h = Sha256::new();
    h.update([0x00]);
    h.update(leaf_bytes);
    MerkleHash(h.finalize().into())
}

/// `SHA256(0x01 || left || right)`.
pub fn node_hash(left: &MerkleHash, right: &MerkleHash) -> MerkleHash {
    let mut h = Sha256::new();
    h.update([0x01]);
    h.update(left.0);
    h.update(right.0);
    MerkleHash(h.finalize().into())
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub side: Side,
    pub hash: MerkleHash,
}

/// Sibling path from a leaf up to the root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerkleProof(pub Vec<ProofStep>);

impl MerkleProof {
    /// Fold the path over `leaf_bytes` and compare with `root`.
    pub fn verify(&self, root: &MerkleHash, leaf_bytes: &[u8]) -> bool {
        self.compute_root(leaf_bytes) == *root
    }

    /// The root this proof implies for `leaf_bytes`.
    pub fn compute_root(&self, leaf_bytes: &[u8]) -> MerkleHash {
        self.0.iter().fold(leaf_hash(leaf_bytes), |acc, step| match step.side {
            Side::Left => node_hash(&step.hash, &acc),
            Side::Right => node_hash(&acc, &step.hash),
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A fully materialized tree. `levels[0]` are the leaf hashes and the last
/// level holds the root alone.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<MerkleHash>>,
}

impl MerkleTree {
    /// Build a tree over encoded leaves, in the given order.
    pub fn from_leaves<L: AsRef<[u8]>>(leaves: &[L]) -> Result<Self, CryptoError> {
        if leaves.is_empty() {
            return Err(CryptoError::Merkle("cannot build a tree with no leaves".into()));
        }
        let mut levels = vec![leaves.iter().map(|l| leaf_hash(l.as_ref())).collect::<Vec<_>>()];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair {
                    [l, r] => node_hash(l, r),
                    _ => pair[0],
                })
                .collect();
            levels.push(next);
        }
        Ok(Self { levels })
    }

    pub fn root(&self) -> MerkleHash {
        // `from_leaves` guarantees at least one level with one hash.
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, CryptoError> {
        if index >= self.leaf_count() {
            return Err(CryptoError::Merkle(format!(
                "leaf index {index} out of range for {} leaves",
                self.leaf_count()
            )));
        }
        let mut steps = Vec::new();
        let mut pos = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = pos ^ 1;
            if let Some(hash) = level.get(sibling) {
                let side = if sibling < pos { Side::Left } else { Side::Right };
                steps.push(ProofStep { side, hash: *hash });
            }
            pos /= 2;
        }
        Ok(MerkleProof(steps))
    }
}
