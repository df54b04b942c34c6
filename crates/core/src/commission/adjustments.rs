use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::commission::percent_of;
use crate::commission::validator::ConfigViolation;
use crate::domain::adjustment::{AdjustmentId, CommissionAdjustment};
use crate::domain::distribution::{CommissionDistribution, CommissionRole, PaymentStatus};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverrideRequest {
    pub new_percent: Option<Decimal>,
    pub new_role: Option<CommissionRole>,
    pub reason: String,
    pub adjusted_by: String,
    pub adjusted_at: DateTime<Utc>,
}

/// Applies a manual override to one row and returns the row together with
/// its history record. The amount is recomputed from the row's base amount.
pub fn apply_override(
    distribution: &CommissionDistribution,
    request: &OverrideRequest,
) -> Result<(CommissionDistribution, CommissionAdjustment), DomainError> {
    if distribution.payment_status == PaymentStatus::Paid {
        return Err(DomainError::InvalidTransition {
            entity: "distribution",
            from: PaymentStatus::Paid.as_str().to_string(),
            to: "adjusted".to_string(),
        });
    }

    let mut violations = Vec::new();
    if request.new_percent.is_none() && request.new_role.is_none() {
        violations.push(ConfigViolation::new(
            "EMPTY_OVERRIDE",
            "override",
            "override must change the percent, the role, or both",
        ));
    }
    if let Some(percent) = request.new_percent {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            violations.push(ConfigViolation::new(
                "PERCENT_OUT_OF_RANGE",
                "new_percent",
                format!("new_percent must be between 0 and 100 (got {percent})"),
            ));
        }
    }
    if request.reason.trim().is_empty() {
        violations.push(ConfigViolation::new(
            "MISSING_REASON",
            "reason",
            "override needs a reason",
        ));
    }
    if !violations.is_empty() {
        return Err(DomainError::Validation(violations));
    }

    let new_percent = request.new_percent.unwrap_or(distribution.percent);
    let new_role = request.new_role.unwrap_or(distribution.role);

    let mut adjusted = distribution.clone();
    adjusted.percent = new_percent;
    adjusted.role = new_role;
    adjusted.amount = percent_of(distribution.base_amount, new_percent);

    let adjustment = CommissionAdjustment {
        id: AdjustmentId(Uuid::new_v4().to_string()),
        sale_id: distribution.sale_id.clone(),
        phase: distribution.phase,
        old_role: distribution.role,
        new_role,
        old_percent: distribution.percent,
        new_percent,
        old_amount: distribution.amount,
        new_amount: adjusted.amount,
        reason: request.reason.trim().to_string(),
        adjusted_by: request.adjusted_by.clone(),
        adjusted_at: request.adjusted_at,
    };

    Ok((adjusted, adjustment))
}
