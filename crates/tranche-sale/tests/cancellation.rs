//! Cancellation, exact fee arguments, and accounting invariants under
//! arbitrary investor activity.

mod common;

use common::{account, Harness, HOUR};
use proptest::prelude::*;
use tranche_core::{
    AccountingError, LedgerError, PhaseError, ProofError, SaleError,
};
use tranche_sale::{
    AttestationAction, InvestPayload, PriceDiscovery, ResultsPublication, SalePhase, TokenLedger,
};

fn invest(h: &mut Harness, who: &str, amount: u128) {
    let investor = account(who);
    h.fund(investor, amount);
    let ctx = h.ctx(investor, h.during_sale());
    h.sale
        .invest(&ctx, &mut h.ledger, amount, &InvestPayload::Plain)
        .unwrap();
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn canceled_sale_returns_capital_once() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000);
    invest(&mut h, "bob", 500);
    let project = h.ctx(h.project, h.during_sale());

    let alice = account("alice");
    let ctx = h.ctx(alice, h.during_sale());
    assert_eq!(
        h.sale.withdraw_invested_capital_if_canceled(&ctx, &mut h.ledger),
        Err(PhaseError::NotCanceled.into())
    );

    h.sale.cancel_sale(&project, &mut h.ledger).unwrap();
    assert_eq!(h.sale.phase(h.during_sale()), SalePhase::Canceled);
    assert_eq!(
        h.sale.cancel_sale(&project, &mut h.ledger),
        Err(PhaseError::Canceled.into())
    );

    h.fund(alice, 100);
    assert_eq!(
        h.sale
            .invest(&ctx, &mut h.ledger, 100, &InvestPayload::Plain),
        Err(PhaseError::Canceled.into())
    );
    assert_eq!(
        h.sale.refund(&ctx, &mut h.ledger),
        Err(PhaseError::Canceled.into())
    );

    assert_eq!(
        h.sale.withdraw_invested_capital_if_canceled(&ctx, &mut h.ledger),
        Ok(1_000)
    );
    assert_eq!(
        h.sale.withdraw_invested_capital_if_canceled(&ctx, &mut h.ledger),
        Err(ProofError::AlreadyRefunded { account: alice }.into())
    );
    let nobody = account("nobody");
    assert_eq!(
        h.sale
            .withdraw_invested_capital_if_canceled(&h.ctx(nobody, h.during_sale()), &mut h.ledger),
        Err(AccountingError::NoPosition { account: nobody }.into())
    );

    // Cancellation ignores the refund window.
    let bob = h.ctx(account("bob"), h.after_refund());
    assert_eq!(
        h.sale.withdraw_invested_capital_if_canceled(&bob, &mut h.ledger),
        Ok(500)
    );
    assert_eq!(h.ledger.balance_of(&h.capital, &h.vault()), 0);
    assert_eq!(h.sale.status().total_capital_raised, 0);
    assert!(h.sale.record().conservation_holds());
}

#[test]
fn cancellation_locks_once_publication_starts() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000);
    let op = h.ctx(h.operator, h.after_refund());
    h.sale.initialize_results_publication(&op).unwrap();
    let project = h.ctx(h.project, h.after_refund());
    assert_eq!(
        h.sale.cancel_sale(&project, &mut h.ledger),
        Err(PhaseError::CancelLocked.into())
    );
    assert_eq!(
        h.sale.initialize_results_publication(&op),
        Err(PhaseError::AlreadyDone {
            action: "initialize_results_publication"
        }
        .into())
    );
}

#[test]
fn cancel_pulls_back_withdrawn_capital() {
    let mut h = Harness::new(PriceDiscovery::PreLiquidWindowed, false);
    for (who, amount) in [("alice", 1_000), ("bob", 500)] {
        let signed = h.attest(account(who), AttestationAction::Invest, amount, 0, 1);
        h.fund(account(who), amount);
        let ctx = h.ctx(account(who), h.during_sale());
        h.sale
            .invest(&ctx, &mut h.ledger, amount, &InvestPayload::Attestation(signed))
            .unwrap();
    }
    let bundle = h.bundle(
        &[
            tranche_sale::InvestorOutcome {
                version: Some(1),
                ..h.outcome(account("alice"), 1_000, 0, 0)
            },
            tranche_sale::InvestorOutcome {
                version: Some(1),
                ..h.outcome(account("bob"), 500, 0, 0)
            },
        ],
        0,
    );

    // Capital can be published and withdrawn without locking cancellation.
    let op = h.ctx(h.operator, h.after_refund());
    h.sale
        .publish_capital_raised(&op, bundle.roots.accepted_capital, 1_500)
        .unwrap();
    let project = h.ctx(h.project, h.after_refund());
    let split = h.sale.withdraw_capital(&project, &mut h.ledger, 37, 7).unwrap();
    assert_eq!(split.net, 1_456);
    assert_eq!(h.sale.status().capital_withdrawn, 1_500);

    // Without an allowance for the gross amount the cancel fails whole.
    let vault = h.vault();
    let capital = h.capital.clone();
    assert!(matches!(
        h.sale.cancel_sale(&project, &mut h.ledger),
        Err(SaleError::Ledger(LedgerError::InsufficientAllowance { .. }))
    ));
    assert!(!h.sale.status().canceled);

    h.ledger.mint(&capital, &h.project, 44).unwrap();
    h.ledger.approve(&capital, &h.project, &vault, 1_500);
    h.sale.cancel_sale(&project, &mut h.ledger).unwrap();
    assert_eq!(h.ledger.balance_of(&capital, &vault), 1_500);
    assert_eq!(h.sale.status().capital_returned, 1_500);

    for who in ["alice", "bob"] {
        let ctx = h.ctx(account(who), h.after_refund());
        h.sale
            .withdraw_invested_capital_if_canceled(&ctx, &mut h.ledger)
            .unwrap();
    }
    assert_eq!(h.ledger.balance_of(&capital, &account("alice")), 1_000);
    assert_eq!(h.ledger.balance_of(&capital, &vault), 0);
}

// ---------------------------------------------------------------------------
// Fee arguments
// ---------------------------------------------------------------------------

#[test]
fn fee_arguments_must_be_exact() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000);
    let bundle = h.bundle(&[h.outcome(account("alice"), 1_000, 0, 1_000)], 0);
    let op = h.ctx(h.operator, h.after_refund());
    h.sale.initialize_results_publication(&op).unwrap();
    h.sale
        .publish_results(&op, ResultsPublication::from_bundle(&bundle, None))
        .unwrap();
    h.fund_project_tokens(1_010);
    let project = h.ctx(h.project, h.after_refund());

    // 1% platform token fee on 1000 is 10; the referrer token fee is zero.
    for (platform, referrer) in [(9, 0), (11, 0), (10, 1)] {
        assert!(matches!(
            h.sale
                .supply_tokens(&project, &mut h.ledger, 1_000, platform, referrer),
            Err(SaleError::Accounting(AccountingError::FeeMismatch { .. }))
        ));
    }
    assert_eq!(h.ledger.balance_of(&h.token, &h.project), 1_010);
    assert_eq!(
        h.sale.supply_tokens(&project, &mut h.ledger, 999, 9, 0),
        Err(AccountingError::AmountMismatch {
            field: "token supply",
            expected: 1_000,
            supplied: 999,
        }
        .into())
    );
    h.sale
        .supply_tokens(&project, &mut h.ledger, 1_000, 10, 0)
        .unwrap();
    assert_eq!(
        h.sale.supply_tokens(&project, &mut h.ledger, 1_000, 10, 0),
        Err(PhaseError::AlreadyDone {
            action: "supply_tokens"
        }
        .into())
    );

    // 2.5% of 1000 is 25 and 0.5% is 5.
    assert!(matches!(
        h.sale.withdraw_capital(&project, &mut h.ledger, 24, 5),
        Err(SaleError::Accounting(AccountingError::FeeMismatch { .. }))
    ));
    assert!(!h.sale.status().has_withdrawn_capital);
    let split = h.sale.withdraw_capital(&project, &mut h.ledger, 25, 5).unwrap();
    assert_eq!(split.net, 970);
    assert_eq!(
        h.sale.withdraw_capital(&project, &mut h.ledger, 25, 5),
        Err(PhaseError::AlreadyDone {
            action: "withdraw_capital"
        }
        .into())
    );
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Action {
    Invest { who: usize, amount: u128 },
    Refund { who: usize },
    Advance { secs: u64 },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0usize..4, 1u128..5_000).prop_map(|(who, amount)| Action::Invest { who, amount }),
        (0usize..4).prop_map(|who| Action::Refund { who }),
        (0u64..48).prop_map(|h| Action::Advance { secs: h * HOUR }),
    ]
}

proptest! {
    #[test]
    fn vault_always_backs_raised_capital(actions in prop::collection::vec(action(), 1..40)) {
        let mut h = Harness::fixed_price();
        let investors = ["alice", "bob", "carol", "dave"];
        let mut now = h.during_sale();
        for a in actions {
            let before = h.sale.record().clone();
            let result = match a {
                Action::Invest { who, amount } => {
                    let investor = account(investors[who]);
                    h.fund(investor, amount);
                    let ctx = h.ctx(investor, now);
                    h.sale.invest(&ctx, &mut h.ledger, amount, &InvestPayload::Plain).map(|_| ())
                }
                Action::Refund { who } => {
                    let ctx = h.ctx(account(investors[who]), now);
                    h.sale.refund(&ctx, &mut h.ledger).map(|_| ())
                }
                Action::Advance { secs } => {
                    now = now.checked_add_secs(secs).unwrap();
                    Ok(())
                }
            };
            if result.is_err() {
                prop_assert_eq!(h.sale.record(), &before);
            }
            prop_assert!(h.sale.record().conservation_holds());
            prop_assert_eq!(
                h.ledger.balance_of(&h.capital, &h.vault()),
                h.sale.status().total_capital_raised
            );
        }
    }
}
