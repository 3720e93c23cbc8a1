//! # Sealing Curve
//!
//! The sealed-bid protocol needs only a prime-order group with a fixed
//! generator, scalar multiplication, and fixed-width encodings. This module
//! defines that interface as [`SealingCurve`] and provides a Ristretto255
//! backend. The protocol code in [`crate::sealing`] is written against the
//! trait, so tests can drive it with a toy group.
//!
//! ## Security Invariant
//!
//! Points and scalars cross the trait boundary as encodings. Every backend
//! validates an encoding before use: non-canonical scalars, the zero
//! scalar, undecodable points, and the identity are rejected.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tranche_core::{hex, CryptoError};

/// An encoded group element.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurvePoint(pub [u8; 32]);

/// An encoded scalar. `Debug` output is redacted; the sale's private scalar
/// is secret until results are published.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurveScalar(pub [u8; 32]);

macro_rules! hex_newtype {
    ($ty:ident, $what:literal) => {
        impl $ty {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
                hex::decode_array::<32>(s)
                    .map(Self)
                    .map_err(|e| CryptoError::KeyError(format!(concat!($what, ": {}"), e)))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(CurvePoint, "curve point");
hex_newtype!(CurveScalar, "curve scalar");

impl std::fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CurvePoint({}...)", hex::prefix(&self.0))
    }
}

impl std::fmt::Display for CurvePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for CurveScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CurveScalar(<secret>)")
    }
}

/// A prime-order group usable for sealing bids.
pub trait SealingCurve {
    /// Stable backend name, recorded with each sale.
    fn name(&self) -> &'static str;

    /// The fixed generator `G`.
    fn generator(&self) -> CurvePoint;

    /// Reject encodings that are not a non-identity group element.
    fn validate_point(&self, point: &CurvePoint) -> Result<(), CryptoError>;

    /// Reject non-canonical or zero scalars.
    fn validate_scalar(&self, scalar: &CurveScalar) -> Result<(), CryptoError>;

    /// `scalar · point`. Both inputs are validated.
    fn mul(&self, point: &CurvePoint, scalar: &CurveScalar) -> Result<CurvePoint, CryptoError>;

    /// A uniformly random valid scalar.
    fn random_scalar(&self, rng: &mut dyn RngCore) -> CurveScalar;

    /// `scalar · G`.
    fn public_point(&self, scalar: &CurveScalar) -> Result<CurvePoint, CryptoError> {
        self.mul(&self.generator(), scalar)
    }

    /// Require `scalar · G == point`.
    fn check_keypair(&self, point: &CurvePoint, scalar: &CurveScalar) -> Result<(), CryptoError> {
        if self.public_point(scalar)? != *point {
            return Err(CryptoError::KeyError("private scalar does not match public point".into()));
        }
        Ok(())
    }
}

/// The Ristretto255 group over Curve25519.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ristretto255;

impl Ristretto255 {
    fn scalar(s: &CurveScalar) -> Result<Scalar, CryptoError> {
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(s.0))
            .ok_or_else(|| CryptoError::KeyError("scalar is not canonically encoded".into()))?;
        if scalar == Scalar::ZERO {
            return Err(CryptoError::KeyError("scalar is zero".into()));
        }
        Ok(scalar)
    }
}

impl SealingCurve for Ristretto255 {
    fn name(&self) -> &'static str {
        "ristretto255"
    }

    fn generator(&self) -> CurvePoint {
        CurvePoint(RISTRETTO_BASEPOINT_POINT.compress().to_bytes())
    }

    fn validate_point(&self, point: &CurvePoint) -> Result<(), CryptoError> {
        // The identity encodes as all zeros.
        if point.0 == [0u8; 32] {
            return Err(CryptoError::InvalidPoint("identity element".into()));
        }
        CompressedRistretto(point.0)
            .decompress()
            .map(|_| ())
            .ok_or_else(|| CryptoError::InvalidPoint(format!("{point:?} does not decode")))
    }

    fn validate_scalar(&self, scalar: &CurveScalar) -> Result<(), CryptoError> {
        Self::scalar(scalar).map(|_| ())
    }

    fn mul(&self, point: &CurvePoint, scalar: &CurveScalar) -> Result<CurvePoint, CryptoError> {
        self.validate_point(point)?;
        let p = CompressedRistretto(point.0)
            .decompress()
            .ok_or_else(|| CryptoError::InvalidPoint(format!("{point:?} does not decode")))?;
        let s = Self::scalar(scalar)?;
        Ok(CurvePoint((p * s).compress().to_bytes()))
    }

    fn random_scalar(&self, rng: &mut dyn RngCore) -> CurveScalar {
        loop {
            let mut wide = [0u8; 64];
            rng.fill_bytes(&mut wide);
            let s = Scalar::from_bytes_mod_order_wide(&wide);
            if s != Scalar::ZERO {
                return CurveScalar(s.to_bytes());
            }
        }
    }
}

/// The sealing backends a sale can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealingCurveKind {
    #[default]
    Ristretto255,
}

static RISTRETTO255: Ristretto255 = Ristretto255;

impl SealingCurveKind {
    pub fn backend(&self) -> &'static dyn SealingCurve {
        match self {
            SealingCurveKind::Ristretto255 => &RISTRETTO255,
        }
    }
}
