use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::development::DevelopmentKey;

/// Post-sale role that a development can switch on independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalRole {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub percent: Decimal,
}

impl OptionalRole {
    pub fn enabled(percent: Decimal) -> Self {
        Self { enabled: true, percent }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Percent to pay, only when the role is switched on with a positive share.
    pub fn payable_percent(&self) -> Option<Decimal> {
        (self.enabled && self.percent > Decimal::ZERO).then_some(self.percent)
    }
}

/// Per-development commission percentages.
///
/// `phase_sale_percent + phase_post_sale_percent` is expected to be 100 but
/// is not checked; downstream reports read it as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub development: DevelopmentKey,
    pub phase_sale_percent: Decimal,
    pub phase_post_sale_percent: Decimal,
    /// Share of the sale-phase amount forming the sale-side pool. `None` means
    /// the whole sale-phase amount is the pool.
    #[serde(default)]
    pub sale_pool_percent: Option<Decimal>,
    pub sale_manager_percent: Decimal,
    pub deal_owner_percent: Decimal,
    #[serde(default)]
    pub external_advisor_percent: Option<Decimal>,
    #[serde(default)]
    pub customer_service: OptionalRole,
    #[serde(default)]
    pub deliveries: OptionalRole,
    #[serde(default)]
    pub bonds: OptionalRole,
}

impl CommissionConfig {
    pub fn pool_percent(&self) -> Decimal {
        self.sale_pool_percent.unwrap_or(Decimal::ONE_HUNDRED)
    }

    pub fn external_advisor_percent(&self) -> Decimal {
        self.external_advisor_percent.unwrap_or(Decimal::ZERO)
    }

    pub fn phase_total_percent(&self) -> Decimal {
        self.phase_sale_percent + self.phase_post_sale_percent
    }
}

/// Indirect roles shared by every development.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRoles {
    #[serde(default)]
    pub operations_coordinator_percent: Decimal,
    #[serde(default)]
    pub marketing_percent: Decimal,
    #[serde(default)]
    pub legal_manager_percent: Decimal,
    #[serde(default)]
    pub post_sale_coordinator_percent: Decimal,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CommissionConfig, OptionalRole};
    use crate::domain::development::DevelopmentKey;

    #[test]
    fn optional_role_pays_only_when_enabled_with_positive_percent() {
        let five = Decimal::new(5, 0);
        assert_eq!(OptionalRole::enabled(five).payable_percent(), Some(five));
        assert_eq!(OptionalRole::enabled(Decimal::ZERO).payable_percent(), None);
        assert_eq!(
            OptionalRole { enabled: false, percent: Decimal::new(5, 0) }.payable_percent(),
            None
        );
    }

    #[test]
    fn missing_pool_means_whole_sale_phase() {
        let config = CommissionConfig {
            development: DevelopmentKey("torre norte".into()),
            phase_sale_percent: Decimal::new(60, 0),
            phase_post_sale_percent: Decimal::new(30, 0),
            sale_pool_percent: None,
            sale_manager_percent: Decimal::new(50, 0),
            deal_owner_percent: Decimal::new(50, 0),
            external_advisor_percent: None,
            customer_service: OptionalRole::disabled(),
            deliveries: OptionalRole::disabled(),
            bonds: OptionalRole::disabled(),
        };

        assert_eq!(config.pool_percent(), Decimal::ONE_HUNDRED);
        assert_eq!(config.external_advisor_percent(), Decimal::ZERO);
        assert_eq!(config.phase_total_percent(), Decimal::new(90, 0));
    }
}
