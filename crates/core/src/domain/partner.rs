use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::development::DevelopmentKey;
use crate::domain::distribution::CommissionPhase;
use crate::domain::sale::SaleId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartnerId(pub String);

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Financial stakeholder of a development's product, paid a share of the
/// total commission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPartner {
    pub id: PartnerId,
    pub development: DevelopmentKey,
    pub name: String,
    /// 0 to 100. Totals across partners are not checked.
    pub participation_percent: Decimal,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    PendingInvoice,
    Invoiced,
    Collected,
}

impl CollectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingInvoice => "pending_invoice",
            Self::Invoiced => "invoiced",
            Self::Collected => "collected",
        }
    }
}

impl FromStr for CollectionState {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending_invoice" => Ok(Self::PendingInvoice),
            "invoiced" => Ok(Self::Invoiced),
            "collected" => Ok(Self::Collected),
            other => Err(DomainError::InvalidRecord(format!("unknown collection state `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCollection {
    pub state: CollectionState,
    pub collected_at: Option<DateTime<Utc>>,
}

impl Default for PhaseCollection {
    fn default() -> Self {
        Self { state: CollectionState::PendingInvoice, collected_at: None }
    }
}

impl PhaseCollection {
    /// Moving to `Collected` stamps `at`; any other move clears the stamp.
    /// Setting the current state again changes nothing.
    pub fn transition_to(&mut self, next: CollectionState, at: DateTime<Utc>) {
        if self.state == next {
            return;
        }

        self.collected_at = (next == CollectionState::Collected).then_some(at);
        self.state = next;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerCommission {
    pub sale_id: SaleId,
    pub partner_id: PartnerId,
    pub participation_percent: Decimal,
    pub sale_phase_amount: Decimal,
    pub post_sale_phase_amount: Decimal,
    pub total_amount: Decimal,
    pub vat_rate_percent: Decimal,
    pub vat_amount: Decimal,
    pub total_with_vat: Decimal,
    pub sale_phase: PhaseCollection,
    pub post_sale_phase: PhaseCollection,
}

impl PartnerCommission {
    pub fn collection(&self, phase: CommissionPhase) -> Option<&PhaseCollection> {
        match phase {
            CommissionPhase::Sale => Some(&self.sale_phase),
            CommissionPhase::PostSale => Some(&self.post_sale_phase),
            CommissionPhase::Bonus => None,
        }
    }

    pub fn set_collection_state(
        &mut self,
        phase: CommissionPhase,
        next: CollectionState,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let collection = match phase {
            CommissionPhase::Sale => &mut self.sale_phase,
            CommissionPhase::PostSale => &mut self.post_sale_phase,
            CommissionPhase::Bonus => {
                return Err(DomainError::InvalidTransition {
                    entity: "partner commission",
                    from: phase.as_str().to_string(),
                    to: next.as_str().to_string(),
                })
            }
        };

        collection.transition_to(next, at);
        Ok(())
    }

    /// Keeps collection progress from an earlier calculation of the same row.
    pub fn carry_collection_from(&mut self, previous: &PartnerCommission) {
        self.sale_phase = previous.sale_phase.clone();
        self.post_sale_phase = previous.post_sale_phase.clone();
    }
}
