use std::fmt;

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::development::DevelopmentKey;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaleId(pub String);

impl fmt::Display for SaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Percents actually used when the sale was last calculated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenCalculation {
    pub phase_sale_percent: Decimal,
    pub phase_post_sale_percent: Decimal,
    pub commission_percent: Decimal,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSale {
    pub id: SaleId,
    pub development: DevelopmentKey,
    pub total_value: Decimal,
    pub signed_on: NaiveDate,
    pub owner: String,
    pub external_advisor: Option<String>,
    pub term_months: Option<u32>,
    pub square_meters: Option<Decimal>,
    pub calculation: Option<FrozenCalculation>,
}

impl CommissionSale {
    pub fn is_calculated(&self) -> bool {
        self.calculation.is_some()
    }

    pub fn has_external_advisor(&self) -> bool {
        self.external_advisor.as_deref().map(|name| !name.trim().is_empty()).unwrap_or(false)
    }

    /// Post-sale trigger date: signing date plus the term in months.
    pub fn deed_date(&self) -> Option<NaiveDate> {
        let months = self.term_months?;
        self.signed_on.checked_add_months(Months::new(months))
    }

    pub fn price_per_square_meter(&self) -> Result<Decimal, DomainError> {
        let area = self.square_meters.unwrap_or(Decimal::ZERO);
        if area <= Decimal::ZERO {
            return Err(DomainError::Computation(format!(
                "sale `{}` has non-positive area ({area} m2)",
                self.id
            )));
        }

        Ok((self.total_value / area).round_dp(2))
    }
}
