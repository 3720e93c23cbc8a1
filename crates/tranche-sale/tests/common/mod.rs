//! Shared fixture for the sale integration tests: one sale wired to the
//! in-memory ledger, directory and vesting factory.

#![allow(dead_code)]

use tranche_core::amount::RATE_PRECISION;
use tranche_core::{AccountId, Amount, AssetId, BasisPoints, FeeSchedule, SaleId, Timestamp};
use tranche_crypto::Ed25519KeyPair;
use tranche_sale::{
    vault_account, Attestation, AttestationAction, CallContext, DirectoryKey, InMemoryLedger,
    InMemoryVestingFactory, InvestorOutcome, PeriodBounds, PriceDiscovery, Sale, SaleConfig,
    SettlementBundle, SignedAttestation, StaticDirectory, VestingConfig, VestingKind,
};

pub const HOUR: u64 = 3_600;
pub const DAY: u64 = 24 * HOUR;
pub const WEEK: u64 = 7 * DAY;

pub fn account(name: &str) -> AccountId {
    AccountId::derive("test", name.as_bytes())
}

pub fn bps(n: u32) -> BasisPoints {
    BasisPoints::new(n).unwrap()
}

pub struct Harness {
    pub ledger: InMemoryLedger,
    pub directory: StaticDirectory,
    pub factory: InMemoryVestingFactory,
    pub signer: Ed25519KeyPair,
    pub operator: AccountId,
    pub fee_receiver: AccountId,
    pub project: AccountId,
    pub referrer: AccountId,
    pub capital: AssetId,
    pub token: AssetId,
    pub t0: Timestamp,
    pub sale: Sale,
}

impl Harness {
    /// Fixed price of one capital unit per token unit.
    pub fn fixed_price() -> Self {
        Self::new(
            PriceDiscovery::FixedPrice {
                token_price: RATE_PRECISION,
            },
            true,
        )
    }

    pub fn new(price_discovery: PriceDiscovery, with_purchase_asset: bool) -> Self {
        let signer = Ed25519KeyPair::from_seed(&[7u8; 32]);
        let operator = account("operator");
        let fee_receiver = account("fee-receiver");
        let factory = InMemoryVestingFactory::new(account("vesting-factory"));
        let directory = StaticDirectory::new(account("directory"))
            .with(DirectoryKey::PlatformOperator, operator)
            .with(DirectoryKey::PlatformSigner, signer.account())
            .with(DirectoryKey::PlatformFeeReceiver, fee_receiver)
            .with(DirectoryKey::VestingFactory, account("vesting-factory"));
        let t0 = Timestamp::parse("2026-01-01T00:00:00Z").unwrap();
        let capital = AssetId::new("USDC").unwrap();
        let token = AssetId::new("TOK").unwrap();
        let sale_period_secs = match price_discovery {
            PriceDiscovery::PreLiquidOpen => None,
            _ => Some(WEEK),
        };
        let config = SaleConfig {
            sale_id: SaleId::new(),
            chain_id: 1,
            capital_asset: capital.clone(),
            purchase_asset: with_purchase_asset.then(|| token.clone()),
            start_time: Some(t0),
            sale_period_secs,
            refund_period_secs: DAY,
            lockup_period_secs: DAY,
            fees: FeeSchedule {
                platform_capital: bps(250),
                platform_token: bps(100),
                referrer_capital: bps(50),
                referrer_token: BasisPoints::ZERO,
            },
            minimum_investment: 100,
            project: account("project"),
            referrer: account("referrer"),
            directory: directory.id,
            price_discovery,
            bounds: PeriodBounds::default(),
        };
        let sale = Sale::create(&CallContext::new(operator, t0), config, &directory).unwrap();
        Self {
            ledger: InMemoryLedger::new(),
            directory,
            factory,
            signer,
            operator,
            fee_receiver,
            project: account("project"),
            referrer: account("referrer"),
            capital,
            token,
            t0,
            sale,
        }
    }

    pub fn vault(&self) -> AccountId {
        vault_account(&self.sale.id())
    }

    pub fn at(&self, secs: u64) -> Timestamp {
        self.t0.checked_add_secs(secs).unwrap()
    }

    pub fn during_sale(&self) -> Timestamp {
        self.at(HOUR)
    }

    pub fn sale_end(&self) -> Timestamp {
        self.sale.status().end.unwrap()
    }

    pub fn refund_end(&self) -> Timestamp {
        self.sale.status().refund_end.unwrap()
    }

    pub fn after_refund(&self) -> Timestamp {
        self.refund_end().checked_add_secs(1).unwrap()
    }

    pub fn ctx(&self, caller: AccountId, now: Timestamp) -> CallContext {
        CallContext::new(caller, now)
    }

    /// Give `who` `amount` of the capital asset, approved to the vault.
    pub fn fund(&mut self, who: AccountId, amount: Amount) {
        let vault = self.vault();
        let capital = self.capital.clone();
        self.ledger.mint(&capital, &who, amount).unwrap();
        let allowed = tranche_sale::TokenLedger::allowance(&self.ledger, &capital, &who, &vault);
        self.ledger.approve(&capital, &who, &vault, allowed + amount);
    }

    /// Give the project `amount` of the purchase token, approved to the vault.
    pub fn fund_project_tokens(&mut self, amount: Amount) {
        let vault = self.vault();
        let token = self.token.clone();
        let project = self.project;
        self.ledger.mint(&token, &project, amount).unwrap();
        self.ledger.approve(&token, &project, &vault, amount);
    }

    pub fn vesting(&self, immediate_bps: u32) -> VestingConfig {
        VestingConfig {
            kind: VestingKind::Linear,
            start: self.sale.status().lockup_end.unwrap(),
            duration_secs: 30 * DAY,
            cliff_secs: 0,
            epoch_duration_secs: 0,
            epoch_count: 0,
            immediate_release: bps(immediate_bps),
        }
    }

    pub fn outcome(&self, who: AccountId, accepted: Amount, excess: Amount, tokens: Amount) -> InvestorOutcome {
        InvestorOutcome {
            account: who,
            accepted_capital: accepted,
            excess_capital: excess,
            token_allocation: tokens,
            version: None,
            vesting: None,
        }
    }

    pub fn bundle(&self, outcomes: &[InvestorOutcome], immediate_bps: u32) -> SettlementBundle {
        SettlementBundle::build(outcomes, &self.vesting(immediate_bps)).unwrap()
    }

    pub fn attest(
        &self,
        who: AccountId,
        action: AttestationAction,
        position_cap: Amount,
        allocation_rate: Amount,
        nonce: u64,
    ) -> SignedAttestation {
        Attestation {
            account: who,
            sale: self.sale.id(),
            chain_id: 1,
            position_cap,
            allocation_rate,
            action,
            nonce,
            expires_at: self.at(52 * WEEK),
        }
        .sign(&self.signer)
        .unwrap()
    }
}
