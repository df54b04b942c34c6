use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commission::{percent_of, round_money};
use crate::domain::commission_config::{CommissionConfig, GlobalRoles};
use crate::domain::distribution::{
    CommissionDistribution, CommissionPhase, CommissionRole, PaymentStatus,
};
use crate::domain::sale::CommissionSale;

#[derive(Clone, Copy, Debug)]
pub struct DistributionInput<'a> {
    pub config: &'a CommissionConfig,
    pub global_roles: &'a GlobalRoles,
    pub sale: &'a CommissionSale,
    /// Share of the sale value treated as commissionable; 100 by default.
    pub commission_percent: Decimal,
}

/// Sale-side role percents after the absent advisor's share has been moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRolePercents {
    pub sale_manager_percent: Decimal,
    pub deal_owner_percent: Decimal,
    pub external_advisor_percent: Decimal,
    pub redistributed: bool,
}

impl SaleRolePercents {
    pub fn total(&self) -> Decimal {
        self.sale_manager_percent + self.deal_owner_percent + self.external_advisor_percent
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDistribution {
    pub commission_total: Decimal,
    pub sale_phase_amount: Decimal,
    pub post_sale_phase_amount: Decimal,
    pub pool_amount: Decimal,
    pub role_percents: SaleRolePercents,
    pub distributions: Vec<CommissionDistribution>,
}

pub trait PhaseDistributor: Send + Sync {
    fn distribute(&self, input: DistributionInput<'_>) -> PhaseDistribution;
}

#[derive(Default)]
pub struct DeterministicPhaseDistributor;

impl PhaseDistributor for DeterministicPhaseDistributor {
    fn distribute(&self, input: DistributionInput<'_>) -> PhaseDistribution {
        distribute_phases(input)
    }
}

/// Moves `advisor` onto manager and owner in proportion to their current
/// weights (evenly when both are zero). The owner takes the remainder, so
/// the three-role total is conserved exactly.
pub fn redistribute_advisor_share(
    sale_manager: Decimal,
    deal_owner: Decimal,
    advisor: Decimal,
) -> SaleRolePercents {
    if advisor <= Decimal::ZERO {
        return SaleRolePercents {
            sale_manager_percent: sale_manager,
            deal_owner_percent: deal_owner,
            external_advisor_percent: Decimal::ZERO,
            redistributed: false,
        };
    }

    let weight = sale_manager + deal_owner;
    let manager_share =
        if weight.is_zero() { advisor / Decimal::TWO } else { advisor * sale_manager / weight };
    let owner_share = advisor - manager_share;

    SaleRolePercents {
        sale_manager_percent: sale_manager + manager_share,
        deal_owner_percent: deal_owner + owner_share,
        external_advisor_percent: Decimal::ZERO,
        redistributed: true,
    }
}

pub fn sale_role_percents(config: &CommissionConfig, sale: &CommissionSale) -> SaleRolePercents {
    if sale.has_external_advisor() {
        return SaleRolePercents {
            sale_manager_percent: config.sale_manager_percent,
            deal_owner_percent: config.deal_owner_percent,
            external_advisor_percent: config.external_advisor_percent(),
            redistributed: false,
        };
    }

    redistribute_advisor_share(
        config.sale_manager_percent,
        config.deal_owner_percent,
        config.external_advisor_percent(),
    )
}

pub fn distribute_phases(input: DistributionInput<'_>) -> PhaseDistribution {
    let DistributionInput { config, global_roles, sale, commission_percent } = input;

    let commission_total = percent_of(sale.total_value, commission_percent);
    let sale_phase_amount = percent_of(commission_total, config.phase_sale_percent);
    let post_sale_phase_amount = percent_of(commission_total, config.phase_post_sale_percent);
    let pool_amount = percent_of(sale_phase_amount, config.pool_percent());
    let role_percents = sale_role_percents(config, sale);

    let mut rows = RowBuilder { sale, rows: Vec::new() };

    rows.push(
        CommissionRole::SaleManager,
        CommissionPhase::Sale,
        role_percents.sale_manager_percent,
        pool_amount,
    );
    rows.push(
        CommissionRole::DealOwner,
        CommissionPhase::Sale,
        role_percents.deal_owner_percent,
        pool_amount,
    );
    if sale.has_external_advisor() {
        rows.push(
            CommissionRole::ExternalAdvisor,
            CommissionPhase::Sale,
            role_percents.external_advisor_percent,
            pool_amount,
        );
    }
    rows.push(
        CommissionRole::OperationsCoordinator,
        CommissionPhase::Sale,
        global_roles.operations_coordinator_percent,
        sale_phase_amount,
    );
    rows.push(
        CommissionRole::Marketing,
        CommissionPhase::Sale,
        global_roles.marketing_percent,
        sale_phase_amount,
    );

    rows.push(
        CommissionRole::LegalManager,
        CommissionPhase::PostSale,
        global_roles.legal_manager_percent,
        post_sale_phase_amount,
    );
    rows.push(
        CommissionRole::PostSaleCoordinator,
        CommissionPhase::PostSale,
        global_roles.post_sale_coordinator_percent,
        post_sale_phase_amount,
    );
    for (role, setting) in [
        (CommissionRole::CustomerService, &config.customer_service),
        (CommissionRole::Deliveries, &config.deliveries),
        (CommissionRole::Bonds, &config.bonds),
    ] {
        if let Some(percent) = setting.payable_percent() {
            rows.push(role, CommissionPhase::PostSale, percent, post_sale_phase_amount);
        }
    }

    PhaseDistribution {
        commission_total,
        sale_phase_amount,
        post_sale_phase_amount,
        pool_amount,
        role_percents,
        distributions: rows.rows,
    }
}

struct RowBuilder<'a> {
    sale: &'a CommissionSale,
    rows: Vec<CommissionDistribution>,
}

impl RowBuilder<'_> {
    fn push(
        &mut self,
        role: CommissionRole,
        phase: CommissionPhase,
        percent: Decimal,
        base: Decimal,
    ) {
        if percent <= Decimal::ZERO {
            return;
        }

        let recipient = match role {
            CommissionRole::DealOwner => Some(self.sale.owner.clone()),
            CommissionRole::ExternalAdvisor => self.sale.external_advisor.clone(),
            _ => None,
        };

        self.rows.push(CommissionDistribution {
            sale_id: self.sale.id.clone(),
            role,
            phase,
            recipient,
            percent,
            base_amount: round_money(base),
            amount: percent_of(base, percent),
            vat_amount: Decimal::ZERO,
            rule_id: None,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
        });
    }
}
