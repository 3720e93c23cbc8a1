//! # Sale Lifecycle State Machine
//!
//! [`Sale`] owns one [`SaleRecord`] and exposes every entry point of the
//! lifecycle. Each entry point takes a [`CallContext`] naming the caller and
//! the current time; there is no ambient clock or sender.
//!
//! ## Roles
//!
//! | Operation | Caller |
//! |-----------|--------|
//! | `create`, `sync_directory`, `set_purchase_asset`, `initialize_results_publication`, `publish_capital_raised`, `publish_results`, `emergency_withdraw` | platform operator |
//! | `cancel_sale`, `supply_tokens`, `withdraw_capital` | project |
//! | `end_sale` | project or platform operator |
//! | `invest`, `refund`, claims, `withdraw_invested_capital_if_canceled` | investor |
//!
//! ## Atomicity
//!
//! Every operation evaluates all of its guards before touching state, then
//! applies its effects, then moves tokens. Outgoing transfers are covered by
//! a vault balance check made before the first of them. If anything still
//! fails after effects were applied, the sale status and the caller's
//! position are restored to their values before the call, so a failing call
//! leaves no partial change behind. Consumed attestation digests are
//! recorded last.
//!
//! ## Funds
//!
//! Capital and purchase tokens sit in the sale's vault account, derived
//! from the sale id. Investors and the project approve the vault as spender
//! for the amounts they pay in.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tranche_core::amount::decimal;
use tranche_core::{
    verify_fee, AccountId, AccountingError, Amount, AssetId, AuthorizationError, ContentDigest, FeeSplit,
    LedgerError, PhaseError, ProofError, SaleError, SaleId, Timestamp, ValidationError,
};
use tranche_crypto::{open_amount, CurveScalar, MerkleHash, MerkleProof};

use crate::attestation::{AttestationAction, SignedAttestation};
use crate::collab::{Directory, DirectoryEntries, TokenLedger, VestingFactory};
use crate::config::{PriceDiscovery, SaleConfig};
use crate::settlement::{SettlementBundle, SettlementLeaf, SettlementRoots, SettlementTree};
use crate::state::{InvestorPosition, SalePhase, SaleRecord, SaleStatus};
use crate::strategy::{AttestationGate, InvestPayload};
use crate::vesting::VestingConfig;

/// Who is calling, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: AccountId,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: AccountId, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

/// The ledger account holding a sale's funds.
pub fn vault_account(sale: &SaleId) -> AccountId {
    AccountId::derive("sale-vault", sale.as_uuid().as_bytes())
}

/// Input to [`Sale::publish_results`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsPublication {
    pub roots: SettlementRoots,
    #[serde(with = "decimal")]
    pub total_accepted_capital: Amount,
    #[serde(with = "decimal")]
    pub total_tokens_allocated: Amount,
    /// The sealing scalar; required for auctions, rejected otherwise.
    #[serde(default)]
    pub private_key: Option<CurveScalar>,
}

impl ResultsPublication {
    pub fn from_bundle(bundle: &SettlementBundle, private_key: Option<CurveScalar>) -> Self {
        Self {
            roots: bundle.roots,
            total_accepted_capital: bundle.total_accepted_capital,
            total_tokens_allocated: bundle.total_tokens_allocated,
            private_key,
        }
    }
}

/// Input to [`Sale::claim_token_allocation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationClaim {
    #[serde(with = "decimal")]
    pub amount: Amount,
    pub vesting: VestingConfig,
    pub proof: MerkleProof,
    #[serde(default)]
    pub attestation: Option<SignedAttestation>,
}

/// How a claimed allocation was paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub immediate: Amount,
    pub vested: Amount,
    pub vesting: AccountId,
}

/// A running sale.
#[derive(Debug, Clone)]
pub struct Sale {
    record: SaleRecord,
}

// ---------------------------------------------------------------------------
// Guards and transfer helpers
// ---------------------------------------------------------------------------

fn overflow(operation: &'static str) -> AccountingError {
    AccountingError::Overflow { operation }
}

impl SaleRecord {
    fn vault(&self) -> AccountId {
        vault_account(&self.config.sale_id)
    }

    fn require_platform(&self, caller: AccountId) -> Result<(), AuthorizationError> {
        if caller != self.status.directory.platform_operator {
            return Err(AuthorizationError::NotPlatform { caller });
        }
        Ok(())
    }

    fn require_project(&self, caller: AccountId) -> Result<(), AuthorizationError> {
        if caller != self.config.project {
            return Err(AuthorizationError::NotProject { caller });
        }
        Ok(())
    }

    fn require_not_canceled(&self) -> Result<(), PhaseError> {
        if self.status.canceled {
            return Err(PhaseError::Canceled);
        }
        Ok(())
    }

    fn require_refund_over(&self, now: Timestamp) -> Result<(), PhaseError> {
        if !self.status.refund_window_over(now) {
            return Err(PhaseError::RefundPeriodNotOver { now });
        }
        Ok(())
    }

    fn require_results(&self) -> Result<(), PhaseError> {
        if !self.status.results_published {
            return Err(PhaseError::ResultsNotPublished);
        }
        Ok(())
    }

    fn purchase_asset(&self) -> Result<AssetId, PhaseError> {
        self.status
            .purchase_asset
            .clone()
            .ok_or(PhaseError::PurchaseAssetUnknown)
    }

    fn existing_position(&self, account: AccountId) -> Result<InvestorPosition, AccountingError> {
        self.positions
            .get(&account)
            .cloned()
            .ok_or(AccountingError::NoPosition { account })
    }

    fn gate(&self, now: Timestamp) -> AttestationGate<'_> {
        AttestationGate {
            sale: self.config.sale_id,
            chain_id: self.config.chain_id,
            signer: self.status.directory.platform_signer,
            now,
            consumed: &self.consumed_attestations,
        }
    }

    /// The vault must hold `required` of `asset` before any push.
    fn ensure_vault(
        &self,
        ledger: &dyn TokenLedger,
        asset: &AssetId,
        required: Amount,
    ) -> Result<(), AccountingError> {
        let available = ledger.balance_of(asset, &self.vault());
        if available < required {
            return Err(AccountingError::InsufficientVault {
                asset: asset.clone(),
                required,
                available,
            });
        }
        Ok(())
    }

    /// Pay `amount` out of the vault. Zero amounts move nothing.
    fn push(
        &self,
        ledger: &mut dyn TokenLedger,
        asset: &AssetId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        ledger.transfer(asset, &self.vault(), to, amount)
    }

    /// Pull `amount` from `owner` into the vault against the vault's allowance.
    fn pull(
        &self,
        ledger: &mut dyn TokenLedger,
        asset: &AssetId,
        owner: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let vault = self.vault();
        ledger.transfer_from(asset, &vault, owner, &vault, amount)
    }

    fn position_mut(&mut self, account: AccountId) -> &mut InvestorPosition {
        self.positions.entry(account).or_default()
    }

    fn reduce_raised(&mut self, amount: Amount) -> Result<(), AccountingError> {
        self.status.total_capital_raised = self
            .status
            .total_capital_raised
            .checked_sub(amount)
            .ok_or(overflow("capital raised"))?;
        Ok(())
    }
}

fn closed_position_error(account: AccountId, position: &InvestorPosition) -> Option<SaleError> {
    if position.has_refunded {
        Some(ProofError::AlreadyRefunded { account }.into())
    } else if position.has_claimed_excess {
        Some(ProofError::ExcessAlreadyClaimed { account }.into())
    } else {
        None
    }
}

impl Sale {
    /// Create a sale. The caller must be the platform operator resolved from
    /// `directory`, which must be the directory named in `config`.
    pub fn create(
        ctx: &CallContext,
        config: SaleConfig,
        directory: &dyn Directory,
    ) -> Result<Self, SaleError> {
        config.validate()?;
        if directory.id() != config.directory {
            return Err(AuthorizationError::UnknownDirectory {
                expected: config.directory,
                actual: directory.id(),
            }
            .into());
        }
        let entries = DirectoryEntries::load(directory)?;
        if ctx.caller != entries.platform_operator {
            return Err(AuthorizationError::NotPlatform { caller: ctx.caller }.into());
        }

        let start = config.start_time.unwrap_or(ctx.now);
        let mut status = SaleStatus::new(&config, start, entries);
        if let Some(period) = config.sale_period_secs {
            let end = start
                .checked_add_secs(period)
                .ok_or_else(|| ValidationError::Malformed {
                    field: "sale_period_secs",
                    reason: "timestamp overflows".into(),
                })?;
            let (end, refund_end, lockup_end) = config.windows_from(end)?;
            status.end = Some(end);
            status.refund_end = Some(refund_end);
            status.lockup_end = Some(lockup_end);
        }

        info!(
            sale = %config.sale_id,
            variant = config.price_discovery.name(),
            start = %start,
            "sale created"
        );
        Ok(Self {
            record: SaleRecord {
                config,
                status,
                positions: BTreeMap::new(),
                consumed_attestations: BTreeSet::new(),
            },
        })
    }

    /// Resume a persisted sale.
    pub fn from_record(record: SaleRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &SaleRecord {
        &self.record
    }

    pub fn into_record(self) -> SaleRecord {
        self.record
    }

    pub fn id(&self) -> SaleId {
        self.record.config.sale_id
    }

    pub fn config(&self) -> &SaleConfig {
        &self.record.config
    }

    pub fn status(&self) -> &SaleStatus {
        &self.record.status
    }

    pub fn position(&self, account: &AccountId) -> Option<&InvestorPosition> {
        self.record.positions.get(account)
    }

    pub fn phase(&self, now: Timestamp) -> SalePhase {
        self.record.status.phase(now)
    }

    pub fn vault(&self) -> AccountId {
        self.record.vault()
    }

    /// Run `op` against the record; on failure restore the status and the
    /// position of `account`.
    fn atomic<T>(
        &mut self,
        operation: &'static str,
        ctx: &CallContext,
        account: Option<AccountId>,
        op: impl FnOnce(&mut SaleRecord) -> Result<T, SaleError>,
    ) -> Result<T, SaleError> {
        let status = self.record.status.clone();
        let position = account.map(|a| (a, self.record.positions.get(&a).cloned()));
        let result = op(&mut self.record);
        if let Err(err) = &result {
            self.record.status = status;
            if let Some((a, prev)) = position {
                match prev {
                    Some(p) => {
                        self.record.positions.insert(a, p);
                    }
                    None => {
                        self.record.positions.remove(&a);
                    }
                }
            }
            if matches!(err, SaleError::Signature(_)) {
                warn!(sale = %self.record.config.sale_id, caller = %ctx.caller, operation, error = %err, "attestation rejected");
            } else {
                debug!(sale = %self.record.config.sale_id, caller = %ctx.caller, operation, class = err.class(), error = %err, "operation rejected");
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Platform administration
    // -----------------------------------------------------------------------

    /// Refresh the cached directory entries.
    pub fn sync_directory(&mut self, ctx: &CallContext, directory: &dyn Directory) -> Result<(), SaleError> {
        self.atomic("sync_directory", ctx, None, |sale| {
            sale.require_platform(ctx.caller)?;
            if directory.id() != sale.config.directory {
                return Err(AuthorizationError::UnknownDirectory {
                    expected: sale.config.directory,
                    actual: directory.id(),
                }
                .into());
            }
            sale.status.directory = DirectoryEntries::load(directory)?;
            info!(sale = %sale.config.sale_id, "directory synced");
            Ok(())
        })
    }

    /// Fix the purchase asset of a pre-liquid sale. Once only.
    pub fn set_purchase_asset(&mut self, ctx: &CallContext, asset: AssetId) -> Result<(), SaleError> {
        self.atomic("set_purchase_asset", ctx, None, |sale| {
            sale.require_platform(ctx.caller)?;
            sale.require_not_canceled()?;
            if sale.status.purchase_asset.is_some() {
                return Err(PhaseError::AlreadyDone {
                    action: "set_purchase_asset",
                }
                .into());
            }
            info!(sale = %sale.config.sale_id, asset = %asset, "purchase asset set");
            sale.status.purchase_asset = Some(asset);
            Ok(())
        })
    }

    /// Close an open-ended pre-liquid sale now, anchoring the refund and
    /// lockup windows at this moment.
    pub fn end_sale(&mut self, ctx: &CallContext) -> Result<(), SaleError> {
        self.atomic("end_sale", ctx, None, |sale| {
            if sale.config.price_discovery != PriceDiscovery::PreLiquidOpen {
                return Err(ValidationError::UnsupportedForVariant {
                    operation: "end_sale",
                    variant: sale.config.price_discovery.name(),
                }
                .into());
            }
            if ctx.caller != sale.config.project && ctx.caller != sale.status.directory.platform_operator {
                return Err(AuthorizationError::NotProjectOrPlatform { caller: ctx.caller }.into());
            }
            sale.require_not_canceled()?;
            if sale.status.end.is_some() {
                return Err(PhaseError::AlreadyDone { action: "end_sale" }.into());
            }
            if ctx.now < sale.status.start {
                return Err(PhaseError::NotStarted {
                    now: ctx.now,
                    start: sale.status.start,
                }
                .into());
            }
            let (end, refund_end, lockup_end) = sale.config.windows_from(ctx.now)?;
            sale.status.end = Some(end);
            sale.status.refund_end = Some(refund_end);
            sale.status.lockup_end = Some(lockup_end);
            info!(sale = %sale.config.sale_id, caller = %ctx.caller, refund_end = %refund_end, "sale ended");
            Ok(())
        })
    }

    /// Lock cancellation ahead of publishing results.
    pub fn initialize_results_publication(&mut self, ctx: &CallContext) -> Result<(), SaleError> {
        self.atomic("initialize_results_publication", ctx, None, |sale| {
            sale.require_platform(ctx.caller)?;
            sale.require_not_canceled()?;
            sale.require_refund_over(ctx.now)?;
            if sale.status.results_publication_initialized {
                return Err(PhaseError::AlreadyDone {
                    action: "initialize_results_publication",
                }
                .into());
            }
            sale.status.results_publication_initialized = true;
            info!(sale = %sale.config.sale_id, "results publication initialized, cancellation locked");
            Ok(())
        })
    }

    /// Publish the accepted-capital root of a pre-liquid sale ahead of the
    /// full results, so the project can withdraw capital before tokens exist.
    pub fn publish_capital_raised(
        &mut self,
        ctx: &CallContext,
        accepted_capital_root: MerkleHash,
        total_accepted_capital: Amount,
    ) -> Result<(), SaleError> {
        self.atomic("publish_capital_raised", ctx, None, |sale| {
            if !sale.config.price_discovery.is_pre_liquid() {
                return Err(ValidationError::UnsupportedForVariant {
                    operation: "publish_capital_raised",
                    variant: sale.config.price_discovery.name(),
                }
                .into());
            }
            sale.require_platform(ctx.caller)?;
            sale.require_not_canceled()?;
            sale.require_refund_over(ctx.now)?;
            if sale.status.capital_published {
                return Err(PhaseError::AlreadyDone {
                    action: "publish_capital_raised",
                }
                .into());
            }
            if total_accepted_capital > sale.status.total_capital_raised {
                return Err(AccountingError::AcceptedExceedsRaised {
                    accepted: total_accepted_capital,
                    raised: sale.status.total_capital_raised,
                }
                .into());
            }
            sale.status.accepted_capital_root = Some(accepted_capital_root);
            sale.status.total_accepted_capital = total_accepted_capital;
            sale.status.capital_published = true;
            info!(
                sale = %sale.config.sale_id,
                root = %accepted_capital_root,
                total_accepted_capital = %total_accepted_capital,
                "capital raised published"
            );
            Ok(())
        })
    }

    /// Publish the three settlement roots and totals. Auctions reveal the
    /// sealing scalar here.
    pub fn publish_results(&mut self, ctx: &CallContext, publication: ResultsPublication) -> Result<(), SaleError> {
        self.atomic("publish_results", ctx, None, |sale| {
            sale.require_platform(ctx.caller)?;
            sale.require_not_canceled()?;
            if !sale.status.results_publication_initialized {
                return Err(PhaseError::ResultsPublicationNotInitialized.into());
            }
            if sale.status.results_published {
                return Err(PhaseError::AlreadyDone {
                    action: "publish_results",
                }
                .into());
            }

            let variant = sale.config.price_discovery.name();
            match (&sale.config.price_discovery, &publication.private_key) {
                (PriceDiscovery::SealedBidAuction { public_key, curve }, Some(key)) => {
                    curve
                        .backend()
                        .check_keypair(public_key, key)
                        .map_err(|_| ValidationError::PrivateKeyMismatch)?;
                }
                (PriceDiscovery::SealedBidAuction { .. }, None) => {
                    return Err(ValidationError::MissingPayload {
                        variant,
                        payload: "private key",
                    }
                    .into())
                }
                (_, Some(_)) => {
                    return Err(ValidationError::UnexpectedPayload {
                        variant,
                        payload: "private key",
                    }
                    .into())
                }
                (_, None) => {}
            }

            if sale.status.capital_published {
                if sale.status.accepted_capital_root != Some(publication.roots.accepted_capital) {
                    return Err(ValidationError::Malformed {
                        field: "accepted capital root",
                        reason: "differs from the root published with capital raised".into(),
                    }
                    .into());
                }
                if publication.total_accepted_capital != sale.status.total_accepted_capital {
                    return Err(AccountingError::AmountMismatch {
                        field: "total accepted capital",
                        expected: sale.status.total_accepted_capital,
                        supplied: publication.total_accepted_capital,
                    }
                    .into());
                }
            }
            if publication.total_accepted_capital > sale.status.total_capital_raised {
                return Err(AccountingError::AcceptedExceedsRaised {
                    accepted: publication.total_accepted_capital,
                    raised: sale.status.total_capital_raised,
                }
                .into());
            }
            if let Some(max) = sale
                .config
                .price_discovery
                .max_allocation(publication.total_accepted_capital)?
            {
                if publication.total_tokens_allocated > max {
                    return Err(AccountingError::AllocationExceeded {
                        requested: publication.total_tokens_allocated,
                        remaining: max,
                    }
                    .into());
                }
            }

            let roots = publication.roots;
            sale.status.accepted_capital_root = Some(roots.accepted_capital);
            sale.status.excess_capital_root = Some(roots.excess_capital);
            sale.status.token_allocation_root = Some(roots.token_allocation);
            sale.status.total_accepted_capital = publication.total_accepted_capital;
            sale.status.total_tokens_allocated = publication.total_tokens_allocated;
            sale.status.revealed_private_key = publication.private_key;
            sale.status.results_published = true;
            sale.status.capital_published = true;
            info!(
                sale = %sale.config.sale_id,
                total_accepted_capital = %publication.total_accepted_capital,
                total_tokens_allocated = %publication.total_tokens_allocated,
                key_revealed = publication.private_key.is_some(),
                "results published"
            );
            Ok(())
        })
    }

    /// Move `amount` of any asset out of the vault, regardless of phase.
    pub fn emergency_withdraw(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        asset: &AssetId,
        amount: Amount,
        to: AccountId,
    ) -> Result<(), SaleError> {
        self.atomic("emergency_withdraw", ctx, None, |sale| {
            sale.require_platform(ctx.caller)?;
            to.ensure_nonzero("recipient")?;
            if amount == 0 {
                return Err(ValidationError::ZeroAmount { field: "amount" }.into());
            }
            sale.ensure_vault(&*ledger, asset, amount)?;
            sale.push(ledger, asset, &to, amount)?;
            warn!(
                sale = %sale.config.sale_id,
                caller = %ctx.caller,
                asset = %asset,
                amount = %amount,
                to = %to,
                "emergency withdrawal"
            );
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Project
    // -----------------------------------------------------------------------

    /// Cancel the sale. Capital the project already withdrew is pulled back
    /// in full.
    pub fn cancel_sale(&mut self, ctx: &CallContext, ledger: &mut dyn TokenLedger) -> Result<(), SaleError> {
        self.atomic("cancel_sale", ctx, None, |sale| {
            sale.require_project(ctx.caller)?;
            sale.require_not_canceled()?;
            if sale.status.results_publication_initialized {
                return Err(PhaseError::CancelLocked.into());
            }
            let owed = sale
                .status
                .capital_withdrawn
                .saturating_sub(sale.status.capital_returned);

            sale.status.canceled = true;
            sale.status.capital_returned = sale.status.capital_withdrawn;

            let asset = sale.config.capital_asset.clone();
            sale.pull(ledger, &asset, &sale.config.project, owed)?;
            warn!(sale = %sale.config.sale_id, returned = %owed, "sale canceled");
            Ok(())
        })
    }

    /// Deliver the allocated tokens plus exact token fees.
    pub fn supply_tokens(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        amount: Amount,
        platform_fee: Amount,
        referrer_fee: Amount,
    ) -> Result<FeeSplit, SaleError> {
        self.atomic("supply_tokens", ctx, None, |sale| {
            sale.require_project(ctx.caller)?;
            sale.require_not_canceled()?;
            sale.require_results()?;
            if sale.status.tokens_supplied {
                return Err(PhaseError::AlreadyDone { action: "supply_tokens" }.into());
            }
            let asset = sale.purchase_asset()?;
            if amount != sale.status.total_tokens_allocated {
                return Err(AccountingError::AmountMismatch {
                    field: "token supply",
                    expected: sale.status.total_tokens_allocated,
                    supplied: amount,
                }
                .into());
            }
            let fees = sale.config.fees;
            let platform = verify_fee("platform token", amount, fees.platform_token, platform_fee)?;
            let referrer = verify_fee("referrer token", amount, fees.referrer_token, referrer_fee)?;
            let total = amount
                .checked_add(platform)
                .and_then(|t| t.checked_add(referrer))
                .ok_or(overflow("token supply"))?;

            sale.status.tokens_supplied = true;

            let project = sale.config.project;
            let fee_receiver = sale.status.directory.platform_fee_receiver;
            let referrer_account = sale.config.referrer;
            sale.pull(ledger, &asset, &project, total)?;
            sale.push(ledger, &asset, &fee_receiver, platform)?;
            sale.push(ledger, &asset, &referrer_account, referrer)?;
            info!(
                sale = %sale.config.sale_id,
                amount = %amount,
                platform_fee = %platform,
                referrer_fee = %referrer,
                "tokens supplied"
            );
            Ok(FeeSplit {
                platform,
                referrer,
                net: amount,
            })
        })
    }

    /// Pay out the accepted capital net of exact capital fees.
    pub fn withdraw_capital(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        platform_fee: Amount,
        referrer_fee: Amount,
    ) -> Result<FeeSplit, SaleError> {
        self.atomic("withdraw_capital", ctx, None, |sale| {
            sale.require_project(ctx.caller)?;
            sale.require_not_canceled()?;
            if sale.status.has_withdrawn_capital {
                return Err(PhaseError::AlreadyDone {
                    action: "withdraw_capital",
                }
                .into());
            }
            if sale.config.price_discovery.is_pre_liquid() {
                if !sale.status.capital_published {
                    return Err(PhaseError::CapitalNotPublished.into());
                }
            } else {
                sale.require_refund_over(ctx.now)?;
                sale.require_results()?;
                if !sale.status.tokens_supplied {
                    return Err(PhaseError::TokensNotSupplied.into());
                }
            }
            let base = sale.status.total_accepted_capital;
            if base == 0 {
                return Err(AccountingError::NothingToWithdraw.into());
            }
            let fees = sale.config.fees;
            let split = fees.capital_split(base)?;
            verify_fee("platform capital", base, fees.platform_capital, platform_fee)?;
            verify_fee("referrer capital", base, fees.referrer_capital, referrer_fee)?;
            let asset = sale.config.capital_asset.clone();
            sale.ensure_vault(&*ledger, &asset, base)?;

            sale.status.has_withdrawn_capital = true;
            sale.status.capital_withdrawn = base;

            let fee_receiver = sale.status.directory.platform_fee_receiver;
            let referrer_account = sale.config.referrer;
            let project = sale.config.project;
            sale.push(ledger, &asset, &fee_receiver, split.platform)?;
            sale.push(ledger, &asset, &referrer_account, split.referrer)?;
            sale.push(ledger, &asset, &project, split.net)?;
            info!(
                sale = %sale.config.sale_id,
                gross = %base,
                net = %split.net,
                platform_fee = %split.platform,
                referrer_fee = %split.referrer,
                "capital withdrawn"
            );
            Ok(split)
        })
    }

    // -----------------------------------------------------------------------
    // Investors
    // -----------------------------------------------------------------------

    /// Invest `amount` of the capital asset.
    pub fn invest(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        amount: Amount,
        payload: &InvestPayload,
    ) -> Result<(), SaleError> {
        let investor = ctx.caller;
        self.atomic("invest", ctx, Some(investor), |sale| {
            investor.ensure_nonzero("investor")?;
            sale.require_not_canceled()?;
            if ctx.now < sale.status.start {
                return Err(PhaseError::NotStarted {
                    now: ctx.now,
                    start: sale.status.start,
                }
                .into());
            }
            if let Some(end) = sale.status.end {
                if ctx.now > end {
                    return Err(PhaseError::SaleEnded { now: ctx.now, end }.into());
                }
            }
            if amount == 0 {
                return Err(ValidationError::ZeroAmount { field: "amount" }.into());
            }
            if amount < sale.config.minimum_investment {
                return Err(ValidationError::BelowMinimum {
                    amount,
                    minimum: sale.config.minimum_investment,
                }
                .into());
            }
            let position = sale.positions.get(&investor).cloned().unwrap_or_default();
            if position.is_closed() {
                return Err(PhaseError::PositionClosed { account: investor }.into());
            }
            let acceptance = sale.config.price_discovery.accept(
                investor,
                amount,
                &position,
                payload,
                &sale.gate(ctx.now),
            )?;
            let invested = position
                .invested
                .checked_add(amount)
                .ok_or(overflow("position capital"))?;
            let raised = sale
                .status
                .total_capital_raised
                .checked_add(amount)
                .ok_or(overflow("capital raised"))?;

            let entry = sale.position_mut(investor);
            entry.invested = invested;
            if let Some(bid) = acceptance.sealed_bid {
                entry.sealed_bid = Some(bid);
            }
            if let Some(att) = acceptance.attestation {
                entry.attested_cap = Some(att.position_cap);
                entry.last_nonce = att.nonce;
                entry.version = att.nonce;
            }
            sale.status.total_capital_raised = raised;

            let asset = sale.config.capital_asset.clone();
            sale.pull(ledger, &asset, &investor, amount)?;
            if let Some(att) = acceptance.attestation {
                sale.consumed_attestations.insert(att.digest);
            }
            info!(
                sale = %sale.config.sale_id,
                investor = %investor,
                amount = %amount,
                position = %invested,
                "investment accepted"
            );
            Ok(())
        })
    }

    /// Return the caller's whole capital while the refund window is open.
    pub fn refund(&mut self, ctx: &CallContext, ledger: &mut dyn TokenLedger) -> Result<Amount, SaleError> {
        let investor = ctx.caller;
        self.atomic("refund", ctx, Some(investor), |sale| {
            sale.require_not_canceled()?;
            if let Some(refund_end) = sale.status.refund_end {
                if ctx.now > refund_end {
                    return Err(PhaseError::RefundPeriodOver {
                        now: ctx.now,
                        refund_end,
                    }
                    .into());
                }
            }
            let position = sale.existing_position(investor)?;
            if let Some(err) = closed_position_error(investor, &position) {
                return Err(err);
            }
            let capital = position.capital();
            if capital == 0 {
                return Err(AccountingError::NothingToRefund { account: investor }.into());
            }
            let asset = sale.config.capital_asset.clone();
            sale.ensure_vault(&*ledger, &asset, capital)?;

            let entry = sale.position_mut(investor);
            entry.refunded = entry.refunded.saturating_add(capital);
            entry.has_refunded = true;
            sale.reduce_raised(capital)?;

            sale.push(ledger, &asset, &investor, capital)?;
            info!(sale = %sale.config.sale_id, investor = %investor, amount = %capital, "investment refunded");
            Ok(capital)
        })
    }

    /// Return the caller's capital after the sale was canceled.
    pub fn withdraw_invested_capital_if_canceled(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
    ) -> Result<Amount, SaleError> {
        let investor = ctx.caller;
        self.atomic("withdraw_invested_capital_if_canceled", ctx, Some(investor), |sale| {
            if !sale.status.canceled {
                return Err(PhaseError::NotCanceled.into());
            }
            let position = sale.existing_position(investor)?;
            if let Some(err) = closed_position_error(investor, &position) {
                return Err(err);
            }
            let capital = position.capital();
            if capital == 0 {
                return Err(AccountingError::NothingToRefund { account: investor }.into());
            }
            let asset = sale.config.capital_asset.clone();
            sale.ensure_vault(&*ledger, &asset, capital)?;

            let entry = sale.position_mut(investor);
            entry.refunded = entry.refunded.saturating_add(capital);
            entry.has_refunded = true;
            sale.reduce_raised(capital)?;

            sale.push(ledger, &asset, &investor, capital)?;
            info!(sale = %sale.config.sale_id, investor = %investor, amount = %capital, "capital returned after cancellation");
            Ok(capital)
        })
    }

    /// Claim the excess-capital amount proven against the excess root.
    pub fn claim_excess_capital(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        amount: Amount,
        proof: &MerkleProof,
        attestation: Option<&SignedAttestation>,
    ) -> Result<Amount, SaleError> {
        let investor = ctx.caller;
        self.atomic("claim_excess_capital", ctx, Some(investor), |sale| {
            sale.require_not_canceled()?;
            sale.require_results()?;
            let root = sale
                .status
                .excess_capital_root
                .ok_or(PhaseError::ResultsNotPublished)?;
            let position = sale.existing_position(investor)?;
            if let Some(err) = closed_position_error(investor, &position) {
                return Err(err);
            }
            let discovery = &sale.config.price_discovery;
            let verified = discovery.claim_attestation(
                attestation,
                investor,
                AttestationAction::WithdrawExcess,
                &position,
                &sale.gate(ctx.now),
            )?;
            SettlementLeaf {
                tree: SettlementTree::ExcessCapital,
                account: investor,
                amount,
                version: discovery.leaf_version(&position),
                vesting: None,
            }
            .verify(&root, proof)?;
            sale.pay_excess(ctx, ledger, investor, &position, amount, verified.map(|v| (v.nonce, v.digest)))
        })
    }

    /// Prove the accepted amount and take back everything above it.
    pub fn withdraw_unaccepted_capital(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        accepted: Amount,
        proof: &MerkleProof,
        attestation: Option<&SignedAttestation>,
    ) -> Result<Amount, SaleError> {
        let investor = ctx.caller;
        self.atomic("withdraw_unaccepted_capital", ctx, Some(investor), |sale| {
            sale.require_not_canceled()?;
            if !sale.status.results_publication_initialized {
                return Err(PhaseError::ResultsPublicationNotInitialized.into());
            }
            let discovery = &sale.config.price_discovery;
            let root = sale.status.accepted_capital_root.ok_or(if discovery.is_pre_liquid() {
                PhaseError::CapitalNotPublished
            } else {
                PhaseError::ResultsNotPublished
            })?;
            let position = sale.existing_position(investor)?;
            if let Some(err) = closed_position_error(investor, &position) {
                return Err(err);
            }
            let verified = discovery.claim_attestation(
                attestation,
                investor,
                AttestationAction::WithdrawExcess,
                &position,
                &sale.gate(ctx.now),
            )?;
            SettlementLeaf {
                tree: SettlementTree::AcceptedCapital,
                account: investor,
                amount: accepted,
                version: discovery.leaf_version(&position),
                vesting: None,
            }
            .verify(&root, proof)?;
            let capital = position.capital();
            if accepted > capital {
                return Err(AccountingError::ExceedsInvested {
                    account: investor,
                    requested: accepted,
                    invested: capital,
                }
                .into());
            }
            sale.pay_excess(
                ctx,
                ledger,
                investor,
                &position,
                capital - accepted,
                verified.map(|v| (v.nonce, v.digest)),
            )
        })
    }

    /// Claim the proven token allocation: the immediate fraction goes to the
    /// caller, the rest to a new vesting instance.
    pub fn claim_token_allocation(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        vesting_factory: &mut dyn VestingFactory,
        claim: &AllocationClaim,
    ) -> Result<ClaimReceipt, SaleError> {
        let investor = ctx.caller;
        self.atomic("claim_token_allocation", ctx, Some(investor), |sale| {
            sale.require_not_canceled()?;
            sale.require_results()?;
            if !sale.status.tokens_supplied {
                return Err(PhaseError::TokensNotSupplied.into());
            }
            let asset = sale.purchase_asset()?;
            let expected_factory = sale.status.directory.vesting_factory;
            if vesting_factory.id() != expected_factory {
                return Err(AuthorizationError::UnknownVestingFactory {
                    expected: expected_factory,
                    actual: vesting_factory.id(),
                }
                .into());
            }
            let root = sale
                .status
                .token_allocation_root
                .ok_or(PhaseError::ResultsNotPublished)?;
            let position = sale.existing_position(investor)?;
            if position.has_settled {
                return Err(ProofError::AlreadySettled { account: investor }.into());
            }
            if position.has_refunded {
                return Err(ProofError::AlreadyRefunded { account: investor }.into());
            }
            claim.vesting.validate(sale.status.lockup_end)?;

            let discovery = &sale.config.price_discovery;
            let verified = discovery.claim_attestation(
                claim.attestation.as_ref(),
                investor,
                AttestationAction::ClaimAllocation,
                &position,
                &sale.gate(ctx.now),
            )?;
            if let Some(v) = &verified {
                let expected = PriceDiscovery::attested_allocation(
                    sale.status.total_tokens_allocated,
                    v.allocation_rate,
                )?;
                if claim.amount != expected {
                    return Err(AccountingError::AmountMismatch {
                        field: "attested allocation",
                        expected,
                        supplied: claim.amount,
                    }
                    .into());
                }
            }
            SettlementLeaf {
                tree: SettlementTree::TokenAllocation,
                account: investor,
                amount: claim.amount,
                version: discovery.leaf_version(&position),
                vesting: Some(claim.vesting.digest()?),
            }
            .verify(&root, &claim.proof)?;

            if claim.amount == 0 {
                return Err(ValidationError::ZeroAmount { field: "allocation" }.into());
            }
            let claimed = sale
                .status
                .total_tokens_claimed
                .checked_add(claim.amount)
                .ok_or(overflow("tokens claimed"))?;
            if claimed > sale.status.total_tokens_allocated {
                return Err(AccountingError::AllocationExceeded {
                    requested: claim.amount,
                    remaining: sale
                        .status
                        .total_tokens_allocated
                        .saturating_sub(sale.status.total_tokens_claimed),
                }
                .into());
            }
            let (immediate, vested) = claim.vesting.split(claim.amount)?;
            sale.ensure_vault(&*ledger, &asset, claim.amount)?;
            // Pay out before creating the instance so a failed payout leaves
            // no instance behind.
            sale.push(ledger, &asset, &investor, immediate)?;
            let vesting = vesting_factory.create_vesting(&investor, &asset, &claim.vesting)?;
            sale.push(ledger, &asset, &vesting, vested)?;

            let entry = sale.position_mut(investor);
            entry.allocation = claim.amount;
            entry.has_settled = true;
            entry.vesting = Some(vesting);
            if let Some(v) = &verified {
                entry.last_nonce = v.nonce;
            }
            sale.status.total_tokens_claimed = claimed;
            if let Some(v) = verified {
                sale.consumed_attestations.insert(v.digest);
            }
            info!(
                sale = %sale.config.sale_id,
                investor = %investor,
                amount = %claim.amount,
                immediate = %immediate,
                vested = %vested,
                vesting = %vesting,
                "token allocation claimed"
            );
            Ok(ClaimReceipt {
                immediate,
                vested,
                vesting,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Open an investor's sealed bid with the revealed scalar.
    pub fn decrypt_sealed_bid(&self, investor: &AccountId) -> Result<Amount, SaleError> {
        let curve = match &self.record.config.price_discovery {
            PriceDiscovery::SealedBidAuction { curve, .. } => curve,
            other => {
                return Err(ValidationError::UnsupportedForVariant {
                    operation: "decrypt_sealed_bid",
                    variant: other.name(),
                }
                .into())
            }
        };
        let key = self
            .record
            .status
            .revealed_private_key
            .ok_or(PhaseError::PrivateKeyNotRevealed)?;
        let bid = self
            .record
            .positions
            .get(investor)
            .and_then(|p| p.sealed_bid)
            .ok_or(AccountingError::NoPosition { account: *investor })?;
        open_amount(curve.backend(), &bid.ciphertext, &key, &bid.salt).map_err(|e| {
            ValidationError::Malformed {
                field: "sealed bid",
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl SaleRecord {
    /// Shared tail of both excess paths.
    fn pay_excess(
        &mut self,
        ctx: &CallContext,
        ledger: &mut dyn TokenLedger,
        investor: AccountId,
        position: &InvestorPosition,
        amount: Amount,
        attestation: Option<(u64, ContentDigest)>,
    ) -> Result<Amount, SaleError> {
        if amount == 0 {
            return Err(AccountingError::NothingToWithdraw.into());
        }
        let capital = position.capital();
        if amount > capital {
            return Err(AccountingError::ExceedsInvested {
                account: investor,
                requested: amount,
                invested: capital,
            }
            .into());
        }
        let asset = self.config.capital_asset.clone();
        self.ensure_vault(&*ledger, &asset, amount)?;

        let entry = self.position_mut(investor);
        entry.excess_claimed = amount;
        entry.has_claimed_excess = true;
        if let Some((nonce, _)) = attestation {
            entry.last_nonce = nonce;
        }
        self.reduce_raised(amount)?;

        self.push(ledger, &asset, &investor, amount)?;
        if let Some((_, digest)) = attestation {
            self.consumed_attestations.insert(digest);
        }
        info!(
            sale = %self.config.sale_id,
            caller = %ctx.caller,
            amount = %amount,
            "excess capital returned"
        );
        Ok(amount)
    }
}
