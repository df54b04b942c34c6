pub mod adjustments;
pub mod distributor;
pub mod partners;
pub mod period;
pub mod rules;
pub mod units;
pub mod validator;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::commission_config::{CommissionConfig, GlobalRoles};
use crate::domain::distribution::{
    CommissionDistribution, CommissionPhase, CommissionRole, PaymentStatus,
};
use crate::domain::partner::ProductPartner;
use crate::domain::rule::CommissionRule;
use crate::domain::sale::{CommissionSale, FrozenCalculation};
use crate::errors::DomainError;

use self::{
    distributor::{
        DeterministicPhaseDistributor, DistributionInput, PhaseDistributor, SaleRolePercents,
    },
    partners::{
        DeterministicPartnerSplitter, PartnerSplit, PartnerSplitInput, PartnerSplitter,
        PhaseAmounts, DEFAULT_VAT_RATE_PERCENT,
    },
    rules::{DeterministicRuleEngine, RuleEngine, RuleEvaluation, RuleEvaluationInput},
    units::UnitSource,
    validator::{ConfigValidationInput, ConfigValidator, DeterministicConfigValidator},
};

/// Money is kept at two decimals, ties rounded away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationSettings {
    pub commission_percent: Decimal,
    pub vat_rate_percent: Decimal,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            commission_percent: Decimal::ONE_HUNDRED,
            vat_rate_percent: DEFAULT_VAT_RATE_PERCENT,
        }
    }
}

/// Whether a previously calculated sale keeps the percents it was frozen with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezePolicy {
    #[default]
    KeepFrozen,
    Refresh,
}

#[derive(Clone, Copy, Debug)]
pub struct CalculationInput<'a> {
    pub sale: &'a CommissionSale,
    pub config: &'a CommissionConfig,
    pub global_roles: &'a GlobalRoles,
    pub rules: &'a [CommissionRule],
    pub partners: &'a [ProductPartner],
    pub settings: CalculationSettings,
    pub freeze_policy: FreezePolicy,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTotals {
    pub commission_total: Decimal,
    pub sale_phase_amount: Decimal,
    pub post_sale_phase_amount: Decimal,
    pub pool_amount: Decimal,
    pub bonus_total: Decimal,
    pub role_percents: SaleRolePercents,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionCalculation {
    /// The input sale with the percents used frozen onto it.
    pub sale: CommissionSale,
    pub totals: CommissionTotals,
    /// Role rows followed by one bonus row per applicable rule.
    pub distributions: Vec<CommissionDistribution>,
    pub rule_evaluation: RuleEvaluation,
    pub partner_split: PartnerSplit,
}

pub trait CommissionCalculator: Send + Sync {
    fn calculate(
        &self,
        input: CalculationInput<'_>,
        units: &dyn UnitSource,
    ) -> Result<CommissionCalculation, DomainError>;
}

/// The calculator wired with the deterministic engines.
pub type DefaultCommissionCalculator = DeterministicCommissionCalculator<
    DeterministicConfigValidator,
    DeterministicPhaseDistributor,
    DeterministicRuleEngine,
    DeterministicPartnerSplitter,
>;

pub struct DeterministicCommissionCalculator<V, D, R, S> {
    validator: V,
    distributor: D,
    rule_engine: R,
    splitter: S,
}

impl<V, D, R, S> DeterministicCommissionCalculator<V, D, R, S> {
    pub fn new(validator: V, distributor: D, rule_engine: R, splitter: S) -> Self {
        Self { validator, distributor, rule_engine, splitter }
    }
}

impl Default for DefaultCommissionCalculator {
    fn default() -> Self {
        Self::new(
            DeterministicConfigValidator,
            DeterministicPhaseDistributor,
            DeterministicRuleEngine,
            DeterministicPartnerSplitter,
        )
    }
}

impl<V, D, R, S> CommissionCalculator for DeterministicCommissionCalculator<V, D, R, S>
where
    V: ConfigValidator,
    D: PhaseDistributor,
    R: RuleEngine,
    S: PartnerSplitter,
{
    fn calculate(
        &self,
        input: CalculationInput<'_>,
        units: &dyn UnitSource,
    ) -> Result<CommissionCalculation, DomainError> {
        let CalculationInput {
            sale,
            config,
            global_roles,
            rules,
            partners,
            settings,
            freeze_policy,
            calculated_at,
        } = input;

        self.validator.validate(ConfigValidationInput { config, global_roles }).into_result()?;

        let frozen = effective_percents(sale, config, settings, freeze_policy, calculated_at);
        let mut effective_config = config.clone();
        effective_config.phase_sale_percent = frozen.phase_sale_percent;
        effective_config.phase_post_sale_percent = frozen.phase_post_sale_percent;

        let phases = self.distributor.distribute(DistributionInput {
            config: &effective_config,
            global_roles,
            sale,
            commission_percent: frozen.commission_percent,
        });

        let rule_evaluation = self.rule_engine.evaluate(
            RuleEvaluationInput {
                development: &sale.development,
                rules,
                signed_on: sale.signed_on,
                as_of: calculated_at.date_naive(),
            },
            units,
        );

        let mut distributions = phases.distributions;
        let mut bonus_total = Decimal::ZERO;
        for rule in &rule_evaluation.applicable {
            let amount = percent_of(phases.commission_total, rule.commission_percent);
            bonus_total += amount;
            distributions.push(CommissionDistribution {
                sale_id: sale.id.clone(),
                role: CommissionRole::BonusRule,
                phase: CommissionPhase::Bonus,
                recipient: Some(sale.owner.clone()),
                percent: rule.commission_percent,
                base_amount: phases.commission_total,
                amount,
                vat_amount: percent_of(amount, rule.vat_percent),
                rule_id: Some(rule.id.clone()),
                payment_status: PaymentStatus::Pending,
                paid_at: None,
            });
        }

        let mut calculated_sale = sale.clone();
        calculated_sale.calculation = Some(frozen);

        let partner_split = self.splitter.split(PartnerSplitInput {
            sale_id: &sale.id,
            amounts: PhaseAmounts::from_frozen(&calculated_sale)?,
            partners,
            vat_rate_percent: settings.vat_rate_percent,
        });

        info!(
            event_name = "commission.sale.calculated",
            sale_id = %sale.id,
            development = %sale.development,
            commission_total = %phases.commission_total,
            rows = distributions.len(),
            bonus_rules = rule_evaluation.applicable.len(),
            partners = partner_split.commissions.len(),
            "commission calculated"
        );

        Ok(CommissionCalculation {
            sale: calculated_sale,
            totals: CommissionTotals {
                commission_total: phases.commission_total,
                sale_phase_amount: phases.sale_phase_amount,
                post_sale_phase_amount: phases.post_sale_phase_amount,
                pool_amount: phases.pool_amount,
                bonus_total,
                role_percents: phases.role_percents,
            },
            distributions,
            rule_evaluation,
            partner_split,
        })
    }
}

fn effective_percents(
    sale: &CommissionSale,
    config: &CommissionConfig,
    settings: CalculationSettings,
    freeze_policy: FreezePolicy,
    calculated_at: DateTime<Utc>,
) -> FrozenCalculation {
    match (&sale.calculation, freeze_policy) {
        (Some(frozen), FreezePolicy::KeepFrozen) => {
            FrozenCalculation { calculated_at, ..frozen.clone() }
        }
        _ => FrozenCalculation {
            phase_sale_percent: config.phase_sale_percent,
            phase_post_sale_percent: config.phase_post_sale_percent,
            commission_percent: settings.commission_percent,
            calculated_at,
        },
    }
}
