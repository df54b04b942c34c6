use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commission::{percent_of, round_money};
use crate::domain::partner::{PartnerCommission, PhaseCollection, ProductPartner};
use crate::domain::sale::{CommissionSale, SaleId};
use crate::errors::DomainError;

pub const DEFAULT_VAT_RATE_PERCENT: Decimal = Decimal::from_parts(16, 0, 0, false, 0);

/// Partner-facing revenue per phase. Always derived from the sale value and
/// its frozen percents, never from role payouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAmounts {
    pub sale_phase_amount: Decimal,
    pub post_sale_phase_amount: Decimal,
}

impl PhaseAmounts {
    pub fn from_percents(
        total_value: Decimal,
        commission_percent: Decimal,
        phase_sale_percent: Decimal,
        phase_post_sale_percent: Decimal,
    ) -> Self {
        let commission_total = percent_of(total_value, commission_percent);
        Self {
            sale_phase_amount: percent_of(commission_total, phase_sale_percent),
            post_sale_phase_amount: percent_of(commission_total, phase_post_sale_percent),
        }
    }

    pub fn from_frozen(sale: &CommissionSale) -> Result<Self, DomainError> {
        let frozen = sale.calculation.as_ref().ok_or_else(|| {
            DomainError::Computation(format!(
                "sale `{}` has no frozen calculation to split among partners",
                sale.id
            ))
        })?;

        Ok(Self::from_percents(
            sale.total_value,
            frozen.commission_percent,
            frozen.phase_sale_percent,
            frozen.phase_post_sale_percent,
        ))
    }

    pub fn total(&self) -> Decimal {
        self.sale_phase_amount + self.post_sale_phase_amount
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PartnerSplitInput<'a> {
    pub sale_id: &'a SaleId,
    pub amounts: PhaseAmounts,
    pub partners: &'a [ProductPartner],
    pub vat_rate_percent: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSplit {
    pub commissions: Vec<PartnerCommission>,
    /// Sum of participations used. Not required to be 100.
    pub participation_total: Decimal,
}

impl PartnerSplit {
    pub fn is_fully_allocated(&self) -> bool {
        self.participation_total == Decimal::ONE_HUNDRED
    }
}

pub trait PartnerSplitter: Send + Sync {
    fn split(&self, input: PartnerSplitInput<'_>) -> PartnerSplit;
}

#[derive(Default)]
pub struct DeterministicPartnerSplitter;

impl PartnerSplitter for DeterministicPartnerSplitter {
    fn split(&self, input: PartnerSplitInput<'_>) -> PartnerSplit {
        split_among_partners(input)
    }
}

pub fn split_among_partners(input: PartnerSplitInput<'_>) -> PartnerSplit {
    let PartnerSplitInput { sale_id, amounts, partners, vat_rate_percent } = input;
    let mut participation_total = Decimal::ZERO;
    let mut commissions = Vec::new();

    for partner in partners.iter().filter(|partner| partner.active) {
        let participation = partner.participation_percent;
        if participation <= Decimal::ZERO {
            continue;
        }
        participation_total += participation;

        let total_amount = percent_of(amounts.total(), participation);
        let vat_amount = percent_of(total_amount, vat_rate_percent);
        let total_with_vat =
            round_money(total_amount * (Decimal::ONE + vat_rate_percent / Decimal::ONE_HUNDRED));

        commissions.push(PartnerCommission {
            sale_id: sale_id.clone(),
            partner_id: partner.id.clone(),
            participation_percent: participation,
            sale_phase_amount: percent_of(amounts.sale_phase_amount, participation),
            post_sale_phase_amount: percent_of(amounts.post_sale_phase_amount, participation),
            total_amount,
            vat_rate_percent,
            vat_amount,
            total_with_vat,
            sale_phase: PhaseCollection::default(),
            post_sale_phase: PhaseCollection::default(),
        });
    }

    PartnerSplit { commissions, participation_total }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{split_among_partners, PartnerSplitInput, PhaseAmounts, DEFAULT_VAT_RATE_PERCENT};
    use crate::domain::development::DevelopmentKey;
    use crate::domain::partner::{CollectionState, PartnerId, ProductPartner};
    use crate::domain::sale::{CommissionSale, FrozenCalculation, SaleId};
    use crate::errors::DomainError;

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    fn partner(id: &str, participation: &str) -> ProductPartner {
        ProductPartner {
            id: PartnerId(id.to_string()),
            development: DevelopmentKey("merida".to_string()),
            name: format!("Partner {id}"),
            participation_percent: dec(participation),
            active: true,
        }
    }

    fn sale(calculation: Option<FrozenCalculation>) -> CommissionSale {
        CommissionSale {
            id: SaleId("S-9".to_string()),
            development: DevelopmentKey("merida".to_string()),
            total_value: dec("3000000"),
            signed_on: NaiveDate::from_ymd_opt(2025, 5, 5).expect("valid date"),
            owner: "ana.lopez".to_string(),
            external_advisor: None,
            term_months: None,
            square_meters: None,
            calculation,
        }
    }

    #[test]
    fn default_vat_rate_is_sixteen_percent() {
        assert_eq!(DEFAULT_VAT_RATE_PERCENT, dec("16"));
    }

    #[test]
    fn frozen_amounts_come_from_sale_value_and_frozen_percents() {
        let frozen = FrozenCalculation {
            phase_sale_percent: dec("70"),
            phase_post_sale_percent: dec("30"),
            commission_percent: dec("4"),
            calculated_at: Utc::now(),
        };

        let amounts = PhaseAmounts::from_frozen(&sale(Some(frozen))).expect("frozen sale");

        assert_eq!(amounts.sale_phase_amount, dec("84000.00"));
        assert_eq!(amounts.post_sale_phase_amount, dec("36000.00"));
        assert_eq!(amounts.total(), dec("120000.00"));
    }

    #[test]
    fn uncalculated_sale_has_no_partner_amounts() {
        let error = PhaseAmounts::from_frozen(&sale(None)).expect_err("nothing frozen yet");
        assert!(matches!(error, DomainError::Computation(_)));
    }

    #[test]
    fn shares_follow_participation_with_vat_on_top() {
        let partners = vec![partner("P-1", "60"), partner("P-2", "40")];
        let sale_id = SaleId("S-9".to_string());

        let split = split_among_partners(PartnerSplitInput {
            sale_id: &sale_id,
            amounts: PhaseAmounts {
                sale_phase_amount: dec("84000"),
                post_sale_phase_amount: dec("36000"),
            },
            partners: &partners,
            vat_rate_percent: DEFAULT_VAT_RATE_PERCENT,
        });

        assert!(split.is_fully_allocated());
        let first = &split.commissions[0];
        assert_eq!(first.sale_phase_amount, dec("50400.00"));
        assert_eq!(first.post_sale_phase_amount, dec("21600.00"));
        assert_eq!(first.total_amount, dec("72000.00"));
        assert_eq!(first.vat_amount, dec("11520.00"));
        assert_eq!(first.total_with_vat, dec("83520.00"));
        assert_eq!(first.sale_phase.state, CollectionState::PendingInvoice);
        assert_eq!(first.post_sale_phase.state, CollectionState::PendingInvoice);
        assert_eq!(split.commissions[1].total_amount, dec("48000.00"));
    }

    #[test]
    fn over_allocation_is_reported_not_corrected() {
        let partners = vec![partner("P-1", "80"), partner("P-2", "40")];
        let sale_id = SaleId("S-9".to_string());

        let split = split_among_partners(PartnerSplitInput {
            sale_id: &sale_id,
            amounts: PhaseAmounts {
                sale_phase_amount: dec("700"),
                post_sale_phase_amount: dec("300"),
            },
            partners: &partners,
            vat_rate_percent: Decimal::ZERO,
        });

        assert_eq!(split.participation_total, dec("120"));
        assert!(!split.is_fully_allocated());
        let paid: Decimal = split.commissions.iter().map(|row| row.total_amount).sum();
        assert_eq!(paid, dec("1200.00"));
    }

    #[test]
    fn inactive_and_zero_participation_partners_get_no_row() {
        let partners = vec![
            ProductPartner { active: false, ..partner("P-1", "50") },
            partner("P-2", "0"),
            partner("P-3", "25"),
        ];
        let sale_id = SaleId("S-9".to_string());

        let split = split_among_partners(PartnerSplitInput {
            sale_id: &sale_id,
            amounts: PhaseAmounts {
                sale_phase_amount: dec("700"),
                post_sale_phase_amount: dec("300"),
            },
            partners: &partners,
            vat_rate_percent: DEFAULT_VAT_RATE_PERCENT,
        });

        assert_eq!(split.commissions.len(), 1);
        assert_eq!(split.commissions[0].partner_id, PartnerId("P-3".to_string()));
        assert_eq!(split.participation_total, dec("25"));
    }
}
