//! # Sale Simulation
//!
//! Runs a YAML-scripted sale against the in-memory ledger, directory and
//! vesting factory, step by step, and prints the final sale record with all
//! balances.
//!
//! ```yaml
//! created_at: "2026-01-01T00:00:00Z"
//! signer_seed: "<hex>"            # pre-liquid only
//! vesting_factory: "<hex>"
//! directory: { id: "<hex>", entries: { platform_operator: "<hex>", ... } }
//! sale: { ...SaleConfig... }
//! mints:
//!   - { asset: USDC, account: "<hex>", amount: "5000" }
//! steps:
//!   - { at: "2026-01-01T01:00:00Z", caller: "<hex>", action: approve, asset: USDC, amount: "1000" }
//!   - { at: "2026-01-01T01:00:00Z", caller: "<hex>", action: invest, amount: "1000" }
//!   - { at: "2026-01-10T00:00:00Z", caller: "<hex>", action: refund, expect_error: phase }
//! ```
//!
//! A step with `expect_error` must fail with that error class; any other
//! outcome stops the run with exit code 1.
//!
//! Settlement is scripted with a `settle` step carrying the off-ledger
//! outcomes. Later publish and claim steps take their roots, amounts and
//! proofs from it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use tranche_core::amount::decimal;
use tranche_core::{AccountId, Amount, AssetId, SaleError, Timestamp};
use tranche_crypto::{CurveScalar, Ed25519KeyPair, SealedBid};
use tranche_sale::{
    AllocationClaim, Attestation, AttestationAction, CallContext, Directory, DirectoryKey,
    InMemoryLedger, InMemoryVestingFactory, InvestPayload, InvestorOutcome, InvestorProofs,
    ResultsPublication, Sale, SaleConfig, SaleRecord, SettlementBundle, SignedAttestation,
    StaticDirectory, TokenLedger, VestingConfig,
};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario YAML.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Write the final report here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Scenario format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub created_at: Timestamp,
    /// Platform signer seed (hex), used to sign attestation terms.
    #[serde(default)]
    pub signer_seed: Option<String>,
    pub vesting_factory: AccountId,
    pub directory: StaticDirectory,
    pub sale: SaleConfig,
    #[serde(default)]
    pub mints: Vec<Mint>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mint {
    pub asset: AssetId,
    pub account: AccountId,
    #[serde(with = "decimal")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub at: Timestamp,
    #[serde(default)]
    pub caller: Option<AccountId>,
    /// Error class the step must fail with.
    #[serde(default)]
    pub expect_error: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

/// Attestation fields the simulator signs with the scenario's signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestTerms {
    #[serde(default, with = "decimal")]
    pub position_cap: Amount,
    #[serde(default, with = "decimal")]
    pub allocation_rate: Amount,
    pub nonce: u64,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Caller approves the sale vault to pull `amount` of `asset`.
    Approve {
        asset: AssetId,
        #[serde(with = "decimal")]
        amount: Amount,
    },
    Invest {
        #[serde(with = "decimal")]
        amount: Amount,
        #[serde(default)]
        sealed_bid: Option<SealedBid>,
        #[serde(default)]
        attest: Option<AttestTerms>,
    },
    Refund,
    WithdrawIfCanceled,
    CancelSale,
    EndSale,
    SyncDirectory,
    SetPurchaseAsset {
        asset: AssetId,
    },
    InitializeResultsPublication,
    /// Build the settlement trees; no caller.
    Settle {
        vesting: VestingConfig,
        outcomes: Vec<InvestorOutcome>,
    },
    PublishCapitalRaised,
    PublishResults {
        #[serde(default)]
        private_key: Option<CurveScalar>,
    },
    SupplyTokens {
        #[serde(with = "decimal")]
        amount: Amount,
        #[serde(with = "decimal")]
        platform_fee: Amount,
        #[serde(with = "decimal")]
        referrer_fee: Amount,
    },
    WithdrawCapital {
        #[serde(with = "decimal")]
        platform_fee: Amount,
        #[serde(with = "decimal")]
        referrer_fee: Amount,
    },
    ClaimExcess {
        #[serde(default)]
        attest: Option<AttestTerms>,
    },
    WithdrawUnaccepted {
        #[serde(default)]
        attest: Option<AttestTerms>,
    },
    ClaimAllocation {
        #[serde(default)]
        attest: Option<AttestTerms>,
    },
    /// Release the caller's vested tokens.
    ReleaseVesting,
    EmergencyWithdraw {
        asset: AssetId,
        #[serde(with = "decimal")]
        amount: Amount,
        to: AccountId,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Invest { .. } => "invest",
            Self::Refund => "refund",
            Self::WithdrawIfCanceled => "withdraw_if_canceled",
            Self::CancelSale => "cancel_sale",
            Self::EndSale => "end_sale",
            Self::SyncDirectory => "sync_directory",
            Self::SetPurchaseAsset { .. } => "set_purchase_asset",
            Self::InitializeResultsPublication => "initialize_results_publication",
            Self::Settle { .. } => "settle",
            Self::PublishCapitalRaised => "publish_capital_raised",
            Self::PublishResults { .. } => "publish_results",
            Self::SupplyTokens { .. } => "supply_tokens",
            Self::WithdrawCapital { .. } => "withdraw_capital",
            Self::ClaimExcess { .. } => "claim_excess",
            Self::WithdrawUnaccepted { .. } => "withdraw_unaccepted",
            Self::ClaimAllocation { .. } => "claim_allocation",
            Self::ReleaseVesting => "release_vesting",
            Self::EmergencyWithdraw { .. } => "emergency_withdraw",
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// A sale wired to in-memory collaborators.
pub struct Simulation {
    pub sale: Sale,
    pub ledger: InMemoryLedger,
    pub directory: StaticDirectory,
    pub factory: InMemoryVestingFactory,
    signer: Option<Ed25519KeyPair>,
    bundle: Option<SettlementBundle>,
    outcomes: BTreeMap<AccountId, InvestorOutcome>,
}

/// Final state printed after a run.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub record: &'a SaleRecord,
    /// Non-zero balances by asset, then account.
    pub balances: BTreeMap<String, BTreeMap<AccountId, String>>,
}

impl Simulation {
    pub fn new(scenario: &Scenario) -> Result<Self> {
        let signer = scenario
            .signer_seed
            .as_deref()
            .map(Ed25519KeyPair::from_seed_hex)
            .transpose()
            .context("invalid signer_seed")?;
        let operator = scenario
            .directory
            .resolve(DirectoryKey::PlatformOperator)
            .context("directory has no platform_operator")?;
        let ctx = CallContext::new(operator, scenario.created_at);
        let sale = Sale::create(&ctx, scenario.sale.clone(), &scenario.directory).context("sale creation rejected")?;

        let mut ledger = InMemoryLedger::new();
        for m in &scenario.mints {
            ledger
                .mint(&m.asset, &m.account, m.amount)
                .with_context(|| format!("invalid mint to {}", m.account))?;
        }
        Ok(Self {
            sale,
            ledger,
            directory: scenario.directory.clone(),
            factory: InMemoryVestingFactory::new(scenario.vesting_factory),
            signer,
            bundle: None,
            outcomes: BTreeMap::new(),
        })
    }

    fn sign(&self, account: AccountId, action: AttestationAction, terms: &AttestTerms) -> Result<SignedAttestation> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| anyhow!("attestation terms need a signer_seed in the scenario"))?;
        let signed = Attestation {
            account,
            sale: self.sale.id(),
            chain_id: self.sale.config().chain_id,
            position_cap: terms.position_cap,
            allocation_rate: terms.allocation_rate,
            action,
            nonce: terms.nonce,
            expires_at: terms.expires_at,
        }
        .sign(signer)?;
        Ok(signed)
    }

    fn sign_opt(
        &self,
        account: AccountId,
        action: AttestationAction,
        terms: Option<&AttestTerms>,
    ) -> Result<Option<SignedAttestation>> {
        terms.map(|t| self.sign(account, action, t)).transpose()
    }

    fn bundle(&self) -> Result<&SettlementBundle> {
        self.bundle
            .as_ref()
            .ok_or_else(|| anyhow!("no settle step has run yet"))
    }

    fn settled(&self, account: AccountId) -> Result<(InvestorOutcome, InvestorProofs)> {
        let proofs = self
            .bundle()?
            .proofs
            .get(&account)
            .cloned()
            .ok_or_else(|| anyhow!("{account} has no settlement outcome"))?;
        let outcome = self
            .outcomes
            .get(&account)
            .cloned()
            .ok_or_else(|| anyhow!("{account} has no settlement outcome"))?;
        Ok((outcome, proofs))
    }

    /// Apply one step. The outer error is a broken scenario; the inner one
    /// is the sale's verdict.
    pub fn apply(&mut self, step: &Step) -> Result<std::result::Result<String, SaleError>> {
        let caller = || {
            step.caller
                .ok_or_else(|| anyhow!("{} needs a caller", step.action.name()))
        };
        let ctx = |caller: AccountId| CallContext::new(caller, step.at);

        let verdict = match &step.action {
            Action::Approve { asset, amount } => {
                let owner = caller()?;
                let vault = self.sale.vault();
                self.ledger.approve(asset, &owner, &vault, *amount);
                Ok(format!("{owner} approved {amount} {asset}"))
            }
            Action::Invest {
                amount,
                sealed_bid,
                attest,
            } => {
                let investor = caller()?;
                let payload = match (sealed_bid, attest) {
                    (Some(bid), None) => InvestPayload::SealedBid(*bid),
                    (None, Some(terms)) => {
                        InvestPayload::Attestation(self.sign(investor, AttestationAction::Invest, terms)?)
                    }
                    (None, None) => InvestPayload::Plain,
                    (Some(_), Some(_)) => bail!("invest step carries both a sealed bid and attestation terms"),
                };
                self.sale
                    .invest(&ctx(investor), &mut self.ledger, *amount, &payload)
                    .map(|()| format!("{investor} invested {amount}"))
            }
            Action::Refund => {
                let investor = caller()?;
                self.sale
                    .refund(&ctx(investor), &mut self.ledger)
                    .map(|a| format!("{investor} refunded {a}"))
            }
            Action::WithdrawIfCanceled => {
                let investor = caller()?;
                self.sale
                    .withdraw_invested_capital_if_canceled(&ctx(investor), &mut self.ledger)
                    .map(|a| format!("{investor} withdrew {a}"))
            }
            Action::CancelSale => self
                .sale
                .cancel_sale(&ctx(caller()?), &mut self.ledger)
                .map(|()| "sale canceled".to_string()),
            Action::EndSale => self
                .sale
                .end_sale(&ctx(caller()?))
                .map(|()| format!("sale ended at {}", step.at)),
            Action::SyncDirectory => self
                .sale
                .sync_directory(&ctx(caller()?), &self.directory)
                .map(|()| "directory synced".to_string()),
            Action::SetPurchaseAsset { asset } => self
                .sale
                .set_purchase_asset(&ctx(caller()?), asset.clone())
                .map(|()| format!("purchase asset {asset}")),
            Action::InitializeResultsPublication => self
                .sale
                .initialize_results_publication(&ctx(caller()?))
                .map(|()| "results publication initialized".to_string()),
            Action::Settle { vesting, outcomes } => {
                let bundle = SettlementBundle::build(outcomes, vesting).map_err(SaleError::from);
                bundle.map(|b| {
                    let summary = format!(
                        "{} outcomes, accepted {}, allocated {}",
                        b.proofs.len(),
                        b.total_accepted_capital,
                        b.total_tokens_allocated
                    );
                    self.outcomes = outcomes.iter().map(|o| (o.account, o.clone())).collect();
                    self.bundle = Some(b);
                    summary
                })
            }
            Action::PublishCapitalRaised => {
                let bundle = self.bundle()?;
                let (root, total) = (bundle.roots.accepted_capital, bundle.total_accepted_capital);
                self.sale
                    .publish_capital_raised(&ctx(caller()?), root, total)
                    .map(|()| format!("capital raised {total} published"))
            }
            Action::PublishResults { private_key } => {
                let publication = ResultsPublication::from_bundle(self.bundle()?, *private_key);
                self.sale
                    .publish_results(&ctx(caller()?), publication)
                    .map(|()| "results published".to_string())
            }
            Action::SupplyTokens {
                amount,
                platform_fee,
                referrer_fee,
            } => self
                .sale
                .supply_tokens(&ctx(caller()?), &mut self.ledger, *amount, *platform_fee, *referrer_fee)
                .map(|s| format!("supplied {} tokens, fees {}/{}", s.net, s.platform, s.referrer)),
            Action::WithdrawCapital {
                platform_fee,
                referrer_fee,
            } => self
                .sale
                .withdraw_capital(&ctx(caller()?), &mut self.ledger, *platform_fee, *referrer_fee)
                .map(|s| format!("withdrew {} net, fees {}/{}", s.net, s.platform, s.referrer)),
            Action::ClaimExcess { attest } => {
                let investor = caller()?;
                let (outcome, proofs) = self.settled(investor)?;
                let att = self.sign_opt(investor, AttestationAction::WithdrawExcess, attest.as_ref())?;
                self.sale
                    .claim_excess_capital(
                        &ctx(investor),
                        &mut self.ledger,
                        outcome.excess_capital,
                        &proofs.excess_capital,
                        att.as_ref(),
                    )
                    .map(|a| format!("{investor} claimed {a} excess"))
            }
            Action::WithdrawUnaccepted { attest } => {
                let investor = caller()?;
                let (outcome, proofs) = self.settled(investor)?;
                let att = self.sign_opt(investor, AttestationAction::WithdrawExcess, attest.as_ref())?;
                self.sale
                    .withdraw_unaccepted_capital(
                        &ctx(investor),
                        &mut self.ledger,
                        outcome.accepted_capital,
                        &proofs.accepted_capital,
                        att.as_ref(),
                    )
                    .map(|a| format!("{investor} withdrew {a} unaccepted"))
            }
            Action::ClaimAllocation { attest } => {
                let investor = caller()?;
                let (outcome, proofs) = self.settled(investor)?;
                let claim = AllocationClaim {
                    amount: outcome.token_allocation,
                    vesting: proofs.vesting,
                    proof: proofs.token_allocation,
                    attestation: self.sign_opt(investor, AttestationAction::ClaimAllocation, attest.as_ref())?,
                };
                self.sale
                    .claim_token_allocation(&ctx(investor), &mut self.ledger, &mut self.factory, &claim)
                    .map(|r| format!("{investor} received {} now, {} vesting at {}", r.immediate, r.vested, r.vesting))
            }
            Action::ReleaseVesting => {
                let investor = caller()?;
                let vesting = self
                    .sale
                    .position(&investor)
                    .and_then(|p| p.vesting)
                    .ok_or_else(|| anyhow!("{investor} has no vesting instance"))?;
                self.factory
                    .release(&mut self.ledger, &vesting, step.at)
                    .map(|a| format!("{investor} released {a}"))
                    .map_err(SaleError::from)
            }
            Action::EmergencyWithdraw { asset, amount, to } => self
                .sale
                .emergency_withdraw(&ctx(caller()?), &mut self.ledger, asset, *amount, *to)
                .map(|()| format!("{amount} {asset} moved to {to}")),
        };
        Ok(verdict)
    }

    pub fn report(&self) -> Report<'_> {
        let status = self.sale.status();
        let mut assets = vec![self.sale.config().capital_asset.clone()];
        assets.extend(status.purchase_asset.clone());
        let balances = assets
            .into_iter()
            .map(|asset| {
                let by_account = self
                    .ledger
                    .balances(&asset)
                    .into_iter()
                    .map(|(account, amount)| (account, amount.to_string()))
                    .collect();
                (asset.to_string(), by_account)
            })
            .collect();
        Report {
            record: self.sale.record(),
            balances,
        }
    }

    /// Capital held by the vault.
    pub fn vault_capital(&self) -> Amount {
        self.ledger
            .balance_of(&self.sale.config().capital_asset, &self.sale.vault())
    }
}

pub fn run_simulate(args: &SimulateArgs) -> Result<u8> {
    let scenario: Scenario = crate::read_yaml(&args.file, "scenario")?;
    let mut sim = Simulation::new(&scenario)?;
    tracing::info!(sale = %sim.sale.id(), steps = scenario.steps.len(), "simulation started");

    for (i, step) in scenario.steps.iter().enumerate() {
        let n = i + 1;
        let name = step.action.name();
        let verdict = sim
            .apply(step)
            .with_context(|| format!("step {n} ({name}) is malformed"))?;
        match (verdict, &step.expect_error) {
            (Ok(summary), None) => println!("OK: step {n} {name}: {summary}"),
            (Err(e), Some(class)) if e.class() == class.as_str() => {
                println!("OK: step {n} {name} rejected as expected: {e}")
            }
            (Ok(_), Some(class)) => {
                println!("FAIL: step {n} {name} succeeded, expected a {class} error");
                return Ok(1);
            }
            (Err(e), _) => {
                println!("FAIL: step {n} {name}: {e}");
                return Ok(1);
            }
        }
    }

    if !sim.sale.record().conservation_holds() {
        println!("FAIL: sale accounting does not balance");
        return Ok(1);
    }
    println!("OK: {} steps, accounting balances", scenario.steps.len());
    crate::emit_json(&sim.report(), args.out.as_deref())?;
    Ok(0)
}
