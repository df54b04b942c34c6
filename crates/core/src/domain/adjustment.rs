use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::distribution::{CommissionPhase, CommissionRole};
use crate::domain::sale::SaleId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjustmentId(pub String);

/// History of a manual override. Recalculation never reads these back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionAdjustment {
    pub id: AdjustmentId,
    pub sale_id: SaleId,
    pub phase: CommissionPhase,
    pub old_role: CommissionRole,
    pub new_role: CommissionRole,
    pub old_percent: Decimal,
    pub new_percent: Decimal,
    pub old_amount: Decimal,
    pub new_amount: Decimal,
    pub reason: String,
    pub adjusted_by: String,
    pub adjusted_at: DateTime<Utc>,
}
