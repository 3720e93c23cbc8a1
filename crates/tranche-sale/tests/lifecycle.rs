//! End-to-end lifecycle of fixed-price sales: invest, refund, publish,
//! supply, settle, withdraw.

mod common;

use common::{account, Harness, HOUR};
use tranche_core::{
    AccountingError, AuthorizationError, LedgerError, PhaseError, ProofError, SaleError,
    ValidationError,
};
use tranche_crypto::MerkleProof;
use tranche_sale::{
    AllocationClaim, InvestPayload, ResultsPublication, SalePhase, SettlementBundle, TokenLedger,
};

fn invest(h: &mut Harness, who: &str, amount: u128) -> Result<(), SaleError> {
    let investor = account(who);
    h.fund(investor, amount);
    let ctx = h.ctx(investor, h.during_sale());
    h.sale.invest(&ctx, &mut h.ledger, amount, &InvestPayload::Plain)
}

/// Two investors, results published for alice 1000/1000 and bob 300/300
/// with 200 excess.
fn published(h: &mut Harness) -> SettlementBundle {
    invest(h, "alice", 1_000).unwrap();
    invest(h, "bob", 500).unwrap();
    let bundle = h.bundle(
        &[
            h.outcome(account("alice"), 1_000, 0, 1_000),
            h.outcome(account("bob"), 300, 200, 300),
        ],
        1_000,
    );
    let op = h.ctx(h.operator, h.after_refund());
    h.sale.initialize_results_publication(&op).unwrap();
    h.sale
        .publish_results(&op, ResultsPublication::from_bundle(&bundle, None))
        .unwrap();
    bundle
}

fn supplied(h: &mut Harness) -> SettlementBundle {
    let bundle = published(h);
    h.fund_project_tokens(1_313);
    let ctx = h.ctx(h.project, h.after_refund());
    h.sale.supply_tokens(&ctx, &mut h.ledger, 1_300, 13, 0).unwrap();
    bundle
}

fn claim_for(bundle: &SettlementBundle, who: &str, amount: u128) -> AllocationClaim {
    let proofs = &bundle.proofs[&account(who)];
    AllocationClaim {
        amount,
        vesting: proofs.vesting.clone(),
        proof: proofs.token_allocation.clone(),
        attestation: None,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_invest_publish_supply_claim() {
    let mut h = Harness::fixed_price();
    let bundle = supplied(&mut h);
    let alice = account("alice");

    let ctx = h.ctx(alice, h.after_refund());
    let receipt = h
        .sale
        .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &claim_for(&bundle, "alice", 1_000))
        .unwrap();
    assert_eq!(receipt.immediate, 100);
    assert_eq!(receipt.vested, 900);
    assert_eq!(h.ledger.balance_of(&h.token, &alice), 100);
    assert_eq!(h.ledger.balance_of(&h.token, &receipt.vesting), 900);
    assert_eq!(h.factory.instance(&receipt.vesting).unwrap().beneficiary, alice);
    assert_eq!(h.sale.position(&alice).unwrap().vesting, Some(receipt.vesting));

    let before = h.sale.record().clone();
    let again = h
        .sale
        .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &claim_for(&bundle, "alice", 1_000));
    assert_eq!(again, Err(ProofError::AlreadySettled { account: alice }.into()));
    assert_eq!(h.sale.record(), &before);
}

#[test]
fn failed_immediate_payout_creates_no_vesting_instance() {
    let mut h = Harness::fixed_price();
    let bundle = supplied(&mut h);
    let alice = account("alice");
    let token = h.token.clone();
    h.ledger.mint(&token, &alice, u128::MAX - 50).unwrap();
    let before = h.sale.record().clone();
    let vault_tokens = h.ledger.balance_of(&token, &h.vault());

    let ctx = h.ctx(alice, h.after_refund());
    assert!(matches!(
        h.sale
            .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &claim_for(&bundle, "alice", 1_000)),
        Err(SaleError::Ledger(LedgerError::BalanceOverflow { amount: 100, .. }))
    ));
    assert_eq!(h.factory.instances().count(), 0);
    assert_eq!(h.sale.record(), &before);
    assert_eq!(h.ledger.balance_of(&token, &h.vault()), vault_tokens);
}

#[test]
fn scenario_b_refund_after_window_is_phase_error() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    invest(&mut h, "alice", 1_000).unwrap();
    let late = h.after_refund();
    let result = h.sale.refund(&h.ctx(alice, late), &mut h.ledger);
    assert_eq!(
        result,
        Err(PhaseError::RefundPeriodOver {
            now: late,
            refund_end: h.refund_end()
        }
        .into())
    );
    assert_eq!(h.sale.position(&alice).unwrap().capital(), 1_000);
}

#[test]
fn results_publish_once() {
    let mut h = Harness::fixed_price();
    let bundle = published(&mut h);
    let op = h.ctx(h.operator, h.after_refund());
    let before = h.sale.record().clone();
    assert_eq!(
        h.sale
            .publish_results(&op, ResultsPublication::from_bundle(&bundle, None)),
        Err(PhaseError::AlreadyDone {
            action: "publish_results"
        }
        .into())
    );
    assert_eq!(h.sale.record(), &before);
}

#[test]
fn excess_capital_is_claimed_once() {
    let mut h = Harness::fixed_price();
    let bundle = published(&mut h);
    let bob = account("bob");
    let ctx = h.ctx(bob, h.after_refund());
    let proof = &bundle.proofs[&bob].excess_capital;
    assert_eq!(
        h.sale.claim_excess_capital(&ctx, &mut h.ledger, 200, proof, None),
        Ok(200)
    );
    let before = h.sale.record().clone();
    assert_eq!(
        h.sale.claim_excess_capital(&ctx, &mut h.ledger, 200, proof, None),
        Err(ProofError::ExcessAlreadyClaimed { account: bob }.into())
    );
    assert_eq!(h.sale.record(), &before);
    assert_eq!(h.ledger.balance_of(&h.capital, &bob), 200);
    assert_eq!(h.ledger.balance_of(&h.capital, &h.vault()), 1_300);
}

#[test]
fn refund_allowed_at_exact_refund_end() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    invest(&mut h, "alice", 1_000).unwrap();
    let at_end = h.refund_end();
    assert_eq!(h.sale.refund(&h.ctx(alice, at_end), &mut h.ledger), Ok(1_000));
    assert_eq!(h.ledger.balance_of(&h.capital, &alice), 1_000);
    assert_eq!(h.sale.status().total_capital_raised, 0);
    assert!(h.sale.position(&alice).unwrap().has_refunded);
}

#[test]
fn full_settlement_pays_every_party() {
    let mut h = Harness::fixed_price();
    let bundle = supplied(&mut h);
    let bob = account("bob");
    let ctx = h.ctx(bob, h.after_refund());
    let proofs = &bundle.proofs[&bob];
    assert_eq!(
        h.sale
            .claim_excess_capital(&ctx, &mut h.ledger, 200, &proofs.excess_capital, None),
        Ok(200)
    );
    assert_eq!(h.ledger.balance_of(&h.capital, &bob), 200);

    let project = h.ctx(h.project, h.after_refund());
    let split = h.sale.withdraw_capital(&project, &mut h.ledger, 32, 6).unwrap();
    assert_eq!((split.platform, split.referrer, split.net), (32, 6, 1_262));
    assert_eq!(h.ledger.balance_of(&h.capital, &h.project), 1_262);
    assert_eq!(h.ledger.balance_of(&h.capital, &h.fee_receiver), 32);
    assert_eq!(h.ledger.balance_of(&h.capital, &h.referrer), 6);
    assert_eq!(h.ledger.balance_of(&h.capital, &h.vault()), 0);
    assert_eq!(h.ledger.balance_of(&h.token, &h.fee_receiver), 13);
    assert_eq!(h.sale.phase(h.after_refund()), SalePhase::Finalized);
    assert!(h.sale.record().conservation_holds());
}

// ---------------------------------------------------------------------------
// Phase guards
// ---------------------------------------------------------------------------

#[test]
fn phases_are_time_ordered() {
    let h = Harness::fixed_price();
    assert_eq!(h.sale.phase(h.at(0)), SalePhase::Active);
    assert_eq!(h.sale.phase(h.sale_end()), SalePhase::Active);
    assert_eq!(h.sale.phase(h.sale_end().checked_add_secs(1).unwrap()), SalePhase::Ended);
    assert_eq!(h.sale.phase(h.after_refund()), SalePhase::Closed);
}

#[test]
fn invest_before_start_fails() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    h.fund(alice, 1_000);
    let early = tranche_core::Timestamp::from_epoch_secs(h.t0.epoch_secs() - 1).unwrap();
    assert_eq!(h.sale.phase(early), SalePhase::Created);
    assert_eq!(
        h.sale
            .invest(&h.ctx(alice, early), &mut h.ledger, 1_000, &InvestPayload::Plain),
        Err(PhaseError::NotStarted { now: early, start: h.t0 }.into())
    );
    assert!(h.sale.position(&alice).is_none());
}

#[test]
fn invest_outside_sale_period_fails() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    h.fund(alice, 1_000);
    let late = h.sale_end().checked_add_secs(1).unwrap();
    assert_eq!(
        h.sale
            .invest(&h.ctx(alice, late), &mut h.ledger, 1_000, &InvestPayload::Plain),
        Err(PhaseError::SaleEnded {
            now: late,
            end: h.sale_end()
        }
        .into())
    );
    assert!(h.sale.position(&alice).is_none());
}

#[test]
fn invest_input_validation() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    h.fund(alice, 1_000);
    let ctx = h.ctx(alice, h.during_sale());
    assert_eq!(
        h.sale.invest(&ctx, &mut h.ledger, 0, &InvestPayload::Plain),
        Err(ValidationError::ZeroAmount { field: "amount" }.into())
    );
    assert_eq!(
        h.sale.invest(&ctx, &mut h.ledger, 99, &InvestPayload::Plain),
        Err(ValidationError::BelowMinimum {
            amount: 99,
            minimum: 100
        }
        .into())
    );
}

#[test]
fn failed_pull_leaves_no_position() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    let ctx = h.ctx(alice, h.during_sale());
    let result = h.sale.invest(&ctx, &mut h.ledger, 500, &InvestPayload::Plain);
    assert!(matches!(
        result,
        Err(SaleError::Ledger(LedgerError::InsufficientAllowance { .. }))
    ));
    assert!(h.sale.position(&alice).is_none());
    assert_eq!(h.sale.status().total_capital_raised, 0);
}

#[test]
fn refunded_position_takes_no_more_investment() {
    let mut h = Harness::fixed_price();
    let alice = account("alice");
    invest(&mut h, "alice", 500).unwrap();
    h.sale
        .refund(&h.ctx(alice, h.during_sale()), &mut h.ledger)
        .unwrap();
    assert_eq!(
        invest(&mut h, "alice", 500),
        Err(PhaseError::PositionClosed { account: alice }.into())
    );
}

#[test]
fn publication_requires_initialization_after_refund_window() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000).unwrap();
    let bundle = h.bundle(&[h.outcome(account("alice"), 1_000, 0, 1_000)], 0);
    let early = h.ctx(h.operator, h.refund_end());
    assert_eq!(
        h.sale.initialize_results_publication(&early),
        Err(PhaseError::RefundPeriodNotOver { now: h.refund_end() }.into())
    );
    let op = h.ctx(h.operator, h.after_refund());
    assert_eq!(
        h.sale
            .publish_results(&op, ResultsPublication::from_bundle(&bundle, None)),
        Err(PhaseError::ResultsPublicationNotInitialized.into())
    );
}

#[test]
fn fixed_price_caps_total_allocation() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000).unwrap();
    let bundle = h.bundle(&[h.outcome(account("alice"), 1_000, 0, 1_001)], 0);
    let op = h.ctx(h.operator, h.after_refund());
    h.sale.initialize_results_publication(&op).unwrap();
    assert_eq!(
        h.sale
            .publish_results(&op, ResultsPublication::from_bundle(&bundle, None)),
        Err(AccountingError::AllocationExceeded {
            requested: 1_001,
            remaining: 1_000
        }
        .into())
    );
}

#[test]
fn accepted_capital_cannot_exceed_raised() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000).unwrap();
    let bundle = h.bundle(&[h.outcome(account("alice"), 1_200, 0, 1_000)], 0);
    let op = h.ctx(h.operator, h.after_refund());
    h.sale.initialize_results_publication(&op).unwrap();
    assert_eq!(
        h.sale
            .publish_results(&op, ResultsPublication::from_bundle(&bundle, None)),
        Err(AccountingError::AcceptedExceedsRaised {
            accepted: 1_200,
            raised: 1_000
        }
        .into())
    );
}

#[test]
fn withdraw_capital_waits_for_token_supply() {
    let mut h = Harness::fixed_price();
    published(&mut h);
    let ctx = h.ctx(h.project, h.after_refund());
    assert_eq!(
        h.sale.withdraw_capital(&ctx, &mut h.ledger, 32, 6),
        Err(PhaseError::TokensNotSupplied.into())
    );
}

#[test]
fn claims_wait_for_token_supply() {
    let mut h = Harness::fixed_price();
    let bundle = published(&mut h);
    let ctx = h.ctx(account("alice"), h.after_refund());
    assert_eq!(
        h.sale.claim_token_allocation(
            &ctx,
            &mut h.ledger,
            &mut h.factory,
            &claim_for(&bundle, "alice", 1_000)
        ),
        Err(PhaseError::TokensNotSupplied.into())
    );
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[test]
fn role_checks_name_the_caller() {
    let mut h = Harness::fixed_price();
    published(&mut h);
    let mallory = account("mallory");
    let ctx = h.ctx(mallory, h.after_refund());
    assert_eq!(
        h.sale.supply_tokens(&ctx, &mut h.ledger, 1_300, 13, 0),
        Err(AuthorizationError::NotProject { caller: mallory }.into())
    );
    assert_eq!(
        h.sale.initialize_results_publication(&ctx),
        Err(AuthorizationError::NotPlatform { caller: mallory }.into())
    );
    assert_eq!(
        h.sale.cancel_sale(&ctx, &mut h.ledger),
        Err(AuthorizationError::NotProject { caller: mallory }.into())
    );
}

#[test]
fn claim_requires_the_synced_vesting_factory() {
    let mut h = Harness::fixed_price();
    let bundle = supplied(&mut h);
    let mut rogue = tranche_sale::InMemoryVestingFactory::new(account("rogue-factory"));
    let ctx = h.ctx(account("alice"), h.after_refund());
    assert_eq!(
        h.sale
            .claim_token_allocation(&ctx, &mut h.ledger, &mut rogue, &claim_for(&bundle, "alice", 1_000)),
        Err(AuthorizationError::UnknownVestingFactory {
            expected: account("vesting-factory"),
            actual: account("rogue-factory"),
        }
        .into())
    );
}

#[test]
fn directory_sync_is_platform_only_and_picks_up_changes() {
    let mut h = Harness::fixed_price();
    let new_receiver = account("new-fee-receiver");
    h.directory
        .set(tranche_sale::DirectoryKey::PlatformFeeReceiver, new_receiver);
    assert!(h
        .sale
        .sync_directory(&h.ctx(h.project, h.at(HOUR)), &h.directory)
        .is_err());
    assert_ne!(h.sale.status().directory.platform_fee_receiver, new_receiver);
    h.sale
        .sync_directory(&h.ctx(h.operator, h.at(HOUR)), &h.directory)
        .unwrap();
    assert_eq!(h.sale.status().directory.platform_fee_receiver, new_receiver);
}

#[test]
fn emergency_withdraw_is_platform_only() {
    let mut h = Harness::fixed_price();
    invest(&mut h, "alice", 1_000).unwrap();
    let rescue = account("rescue");
    let capital = h.capital.clone();
    assert!(h
        .sale
        .emergency_withdraw(&h.ctx(h.project, h.at(HOUR)), &mut h.ledger, &capital, 10, rescue)
        .is_err());
    h.sale
        .emergency_withdraw(&h.ctx(h.operator, h.at(HOUR)), &mut h.ledger, &capital, 400, rescue)
        .unwrap();
    assert_eq!(h.ledger.balance_of(&capital, &rescue), 400);
    assert_eq!(h.ledger.balance_of(&capital, &h.vault()), 600);
}

// ---------------------------------------------------------------------------
// Merkle settlement
// ---------------------------------------------------------------------------

#[test]
fn wrong_amount_or_proof_is_rejected() {
    let mut h = Harness::fixed_price();
    let bundle = supplied(&mut h);
    let alice = account("alice");
    let ctx = h.ctx(alice, h.after_refund());
    assert_eq!(
        h.sale
            .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &claim_for(&bundle, "alice", 1_001)),
        Err(ProofError::InvalidProof {
            tree: "token allocation",
            account: alice,
            amount: 1_001
        }
        .into())
    );

    // Bob's proof does not verify for alice.
    let mut stolen = claim_for(&bundle, "bob", 300);
    stolen.vesting = bundle.proofs[&alice].vesting.clone();
    assert!(matches!(
        h.sale
            .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &stolen),
        Err(SaleError::Proof(ProofError::InvalidProof { .. }))
    ));

    // An accepted-capital proof does not verify against the excess tree.
    let bob = account("bob");
    let ctx = h.ctx(bob, h.after_refund());
    assert!(matches!(
        h.sale.claim_excess_capital(
            &ctx,
            &mut h.ledger,
            300,
            &bundle.proofs[&bob].accepted_capital,
            None
        ),
        Err(SaleError::Proof(ProofError::InvalidProof { .. }))
    ));
    assert!(matches!(
        h.sale
            .claim_excess_capital(&ctx, &mut h.ledger, 200, &MerkleProof::default(), None),
        Err(SaleError::Proof(ProofError::InvalidProof { .. }))
    ));
}

#[test]
fn different_vesting_schedule_is_rejected() {
    let mut h = Harness::fixed_price();
    let bundle = supplied(&mut h);
    let ctx = h.ctx(account("alice"), h.after_refund());
    let mut claim = claim_for(&bundle, "alice", 1_000);
    claim.vesting = h.vesting(10_000);
    assert!(matches!(
        h.sale
            .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &claim),
        Err(SaleError::Proof(ProofError::InvalidProof { .. }))
    ));
    let mut claim = claim_for(&bundle, "alice", 1_000);
    claim.vesting.start = h.refund_end();
    assert!(matches!(
        h.sale
            .claim_token_allocation(&ctx, &mut h.ledger, &mut h.factory, &claim),
        Err(SaleError::Validation(ValidationError::InvalidVestingConfig { .. }))
    ));
}

#[test]
fn withdraw_unaccepted_capital_returns_the_difference() {
    let mut h = Harness::fixed_price();
    let bundle = published(&mut h);
    let bob = account("bob");
    let ctx = h.ctx(bob, h.after_refund());
    let proof = &bundle.proofs[&bob].accepted_capital;
    assert_eq!(
        h.sale
            .withdraw_unaccepted_capital(&ctx, &mut h.ledger, 300, proof, None),
        Ok(200)
    );
    assert_eq!(h.sale.position(&bob).unwrap().capital(), 300);
    // The two excess paths share one flag.
    assert_eq!(
        h.sale.claim_excess_capital(
            &ctx,
            &mut h.ledger,
            200,
            &bundle.proofs[&bob].excess_capital,
            None
        ),
        Err(ProofError::ExcessAlreadyClaimed { account: bob }.into())
    );
}
