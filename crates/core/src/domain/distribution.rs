use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::rule::RuleId;
use crate::domain::sale::SaleId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionPhase {
    Sale,
    PostSale,
    Bonus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionRole {
    SaleManager,
    DealOwner,
    ExternalAdvisor,
    OperationsCoordinator,
    Marketing,
    LegalManager,
    PostSaleCoordinator,
    CustomerService,
    Deliveries,
    Bonds,
    BonusRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl CommissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::PostSale => "post_sale",
            Self::Bonus => "bonus",
        }
    }
}

impl CommissionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaleManager => "sale_manager",
            Self::DealOwner => "deal_owner",
            Self::ExternalAdvisor => "external_advisor",
            Self::OperationsCoordinator => "operations_coordinator",
            Self::Marketing => "marketing",
            Self::LegalManager => "legal_manager",
            Self::PostSaleCoordinator => "post_sale_coordinator",
            Self::CustomerService => "customer_service",
            Self::Deliveries => "deliveries",
            Self::Bonds => "bonds",
            Self::BonusRule => "bonus_rule",
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for CommissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CommissionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionPhase {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sale" => Ok(Self::Sale),
            "post_sale" => Ok(Self::PostSale),
            "bonus" => Ok(Self::Bonus),
            other => Err(DomainError::InvalidRecord(format!("unknown commission phase `{other}`"))),
        }
    }
}

impl FromStr for CommissionRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sale_manager" => Ok(Self::SaleManager),
            "deal_owner" => Ok(Self::DealOwner),
            "external_advisor" => Ok(Self::ExternalAdvisor),
            "operations_coordinator" => Ok(Self::OperationsCoordinator),
            "marketing" => Ok(Self::Marketing),
            "legal_manager" => Ok(Self::LegalManager),
            "post_sale_coordinator" => Ok(Self::PostSaleCoordinator),
            "customer_service" => Ok(Self::CustomerService),
            "deliveries" => Ok(Self::Deliveries),
            "bonds" => Ok(Self::Bonds),
            "bonus_rule" => Ok(Self::BonusRule),
            other => Err(DomainError::InvalidRecord(format!("unknown commission role `{other}`"))),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(DomainError::InvalidRecord(format!("unknown payment status `{other}`"))),
        }
    }
}

/// One payout row per (sale, role, phase). Bonus rows also carry the rule
/// that produced them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionDistribution {
    pub sale_id: SaleId,
    pub role: CommissionRole,
    pub phase: CommissionPhase,
    pub recipient: Option<String>,
    pub percent: Decimal,
    /// Amount the percent was applied to.
    pub base_amount: Decimal,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub rule_id: Option<RuleId>,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl CommissionDistribution {
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::InvalidTransition {
                entity: "distribution",
                from: PaymentStatus::Paid.as_str().to_string(),
                to: PaymentStatus::Paid.as_str().to_string(),
            });
        }

        self.payment_status = PaymentStatus::Paid;
        self.paid_at = Some(at);
        Ok(())
    }

    /// Same role, phase and bonus rule as `other`.
    pub fn same_payout(&self, other: &CommissionDistribution) -> bool {
        self.role == other.role && self.phase == other.phase && self.rule_id == other.rule_id
    }

    /// Keeps the payment state of an earlier calculation of the same payout.
    pub fn carry_payment_from(&mut self, previous: &CommissionDistribution) {
        self.payment_status = previous.payment_status;
        self.paid_at = previous.paid_at;
    }
}
