//! Sealed-bid auctions: bid binding, key reveal and bid opening.

mod common;

use common::{account, Harness};
use tranche_core::{AccountingError, PhaseError, SaleError, ValidationError};
use tranche_crypto::{seal_amount, CurvePoint, CurveScalar, Ristretto255, SealedBid, SealingCurve, SealingCurveKind};
use tranche_sale::{InvestPayload, PriceDiscovery, ResultsPublication, TokenLedger};

fn scalar(n: u8) -> CurveScalar {
    let mut bytes = [0u8; 32];
    bytes[0] = n;
    CurveScalar(bytes)
}

fn sale_key() -> (CurveScalar, CurvePoint) {
    let sk = scalar(42);
    let pk = Ristretto255.public_point(&sk).unwrap();
    (sk, pk)
}

fn auction() -> Harness {
    let (_, public_key) = sale_key();
    Harness::new(
        PriceDiscovery::SealedBidAuction {
            public_key,
            curve: SealingCurveKind::Ristretto255,
        },
        true,
    )
}

fn bid(who: &str, amount: u128, ephemeral: u8) -> SealedBid {
    let (_, pk) = sale_key();
    seal_amount(&Ristretto255, amount, &pk, &scalar(ephemeral), &account(who)).unwrap()
}

fn invest_with(h: &mut Harness, who: &str, amount: u128, payload: InvestPayload) -> Result<(), SaleError> {
    let investor = account(who);
    h.fund(investor, amount);
    let ctx = h.ctx(investor, h.during_sale());
    h.sale.invest(&ctx, &mut h.ledger, amount, &payload)
}

fn publish(h: &mut Harness, private_key: Option<CurveScalar>) -> Result<(), SaleError> {
    let bundle = h.bundle(&[h.outcome(account("alice"), 1_000, 0, 4_000)], 0);
    let op = h.ctx(h.operator, h.after_refund());
    if !h.sale.status().results_publication_initialized {
        h.sale.initialize_results_publication(&op)?;
    }
    h.sale
        .publish_results(&op, ResultsPublication::from_bundle(&bundle, private_key))
}

// ---------------------------------------------------------------------------
// Bids
// ---------------------------------------------------------------------------

#[test]
fn bid_must_be_bound_to_caller_and_sale_key() {
    let mut h = auction();
    assert_eq!(
        invest_with(&mut h, "bob", 1_000, InvestPayload::SealedBid(bid("alice", 5_000, 7))),
        Err(ValidationError::SealedBidSaltMismatch {
            expected: account("bob"),
            actual: account("alice"),
        }
        .into())
    );

    let other_key = Ristretto255.public_point(&scalar(99)).unwrap();
    let foreign =
        seal_amount(&Ristretto255, 5_000, &other_key, &scalar(7), &account("bob")).unwrap();
    assert_eq!(
        invest_with(&mut h, "bob", 1_000, InvestPayload::SealedBid(foreign)),
        Err(ValidationError::SealedBidKeyMismatch.into())
    );
    assert!(h.sale.position(&account("bob")).is_none());
}

#[test]
fn undecodable_ephemeral_point_is_rejected_before_any_transfer() {
    let mut h = auction();
    let alice = account("alice");
    let mut garbled = bid("alice", 5_000, 7);
    garbled.ciphertext.ephemeral = CurvePoint([0xff; 32]);
    let before = h.sale.record().clone();
    assert!(matches!(
        invest_with(&mut h, "alice", 1_000, InvestPayload::SealedBid(garbled)),
        Err(SaleError::Validation(ValidationError::Malformed {
            field: "sealed bid",
            ..
        }))
    ));
    assert_eq!(h.sale.record(), &before);
    assert_eq!(h.ledger.balance_of(&h.capital, &alice), 1_000);
    assert_eq!(h.ledger.balance_of(&h.capital, &h.vault()), 0);
}

#[test]
fn plain_investment_is_rejected() {
    let mut h = auction();
    assert_eq!(
        invest_with(&mut h, "alice", 1_000, InvestPayload::Plain),
        Err(ValidationError::MissingPayload {
            variant: "sealed_bid_auction",
            payload: "sealed bid",
        }
        .into())
    );
}

#[test]
fn top_up_requires_the_same_bid() {
    let mut h = auction();
    let first = bid("alice", 5_000, 7);
    invest_with(&mut h, "alice", 1_000, InvestPayload::SealedBid(first)).unwrap();
    invest_with(&mut h, "alice", 500, InvestPayload::SealedBid(first)).unwrap();
    assert_eq!(h.sale.position(&account("alice")).unwrap().invested, 1_500);

    let changed = bid("alice", 9_000, 8);
    assert_eq!(
        invest_with(&mut h, "alice", 500, InvestPayload::SealedBid(changed)),
        Err(ValidationError::SealedBidChanged {
            account: account("alice")
        }
        .into())
    );
    assert_eq!(h.sale.position(&account("alice")).unwrap().sealed_bid, Some(first));
    assert_eq!(h.sale.status().total_capital_raised, 1_500);
}

// ---------------------------------------------------------------------------
// Reveal
// ---------------------------------------------------------------------------

#[test]
fn bids_open_only_after_reveal() {
    let mut h = auction();
    invest_with(&mut h, "alice", 1_000, InvestPayload::SealedBid(bid("alice", 5_000, 7))).unwrap();
    assert_eq!(
        h.sale.decrypt_sealed_bid(&account("alice")),
        Err(PhaseError::PrivateKeyNotRevealed.into())
    );

    let (sk, _) = sale_key();
    publish(&mut h, Some(sk)).unwrap();
    assert_eq!(h.sale.decrypt_sealed_bid(&account("alice")), Ok(5_000));
    assert_eq!(
        h.sale.decrypt_sealed_bid(&account("nobody")),
        Err(AccountingError::NoPosition {
            account: account("nobody")
        }
        .into())
    );
}

#[test]
fn reveal_requires_the_matching_key() {
    let mut h = auction();
    invest_with(&mut h, "alice", 1_000, InvestPayload::SealedBid(bid("alice", 5_000, 7))).unwrap();
    assert_eq!(
        publish(&mut h, None),
        Err(ValidationError::MissingPayload {
            variant: "sealed_bid_auction",
            payload: "private key",
        }
        .into())
    );
    assert_eq!(
        publish(&mut h, Some(scalar(43))),
        Err(ValidationError::PrivateKeyMismatch.into())
    );
    assert!(!h.sale.status().results_published);
    assert!(h.sale.status().revealed_private_key.is_none());

    let (sk, _) = sale_key();
    publish(&mut h, Some(sk)).unwrap();
    assert_eq!(h.sale.status().revealed_private_key, Some(sk));
}

#[test]
fn priced_sales_reject_a_private_key() {
    let mut h = Harness::fixed_price();
    invest_with(&mut h, "alice", 1_000, InvestPayload::Plain).unwrap();
    let result = publish(&mut h, Some(scalar(42)));
    assert_eq!(
        result,
        Err(ValidationError::UnexpectedPayload {
            variant: "fixed_price",
            payload: "private key",
        }
        .into())
    );
    assert_eq!(
        h.sale.decrypt_sealed_bid(&account("alice")),
        Err(ValidationError::UnsupportedForVariant {
            operation: "decrypt_sealed_bid",
            variant: "fixed_price",
        }
        .into())
    );
}
