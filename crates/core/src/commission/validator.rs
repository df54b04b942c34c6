use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::commission_config::{CommissionConfig, GlobalRoles, OptionalRole};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub code: String,
    pub field: String,
    pub message: String,
}

impl ConfigViolation {
    pub fn new(code: &str, field: &str, message: impl Into<String>) -> Self {
        Self { code: code.to_string(), field: field.to_string(), message: message.into() }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConfigValidationInput<'a> {
    pub config: &'a CommissionConfig,
    pub global_roles: &'a GlobalRoles,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub violations: Vec<ConfigViolation>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self { valid: true, violations: Vec::new() }
    }
}

impl ConfigValidation {
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.valid {
            Ok(())
        } else {
            Err(DomainError::Validation(self.violations))
        }
    }

    pub fn messages(&self) -> Vec<&str> {
        self.violations.iter().map(|violation| violation.message.as_str()).collect()
    }
}

pub trait ConfigValidator: Send + Sync {
    fn validate(&self, input: ConfigValidationInput<'_>) -> ConfigValidation;
}

#[derive(Default)]
pub struct DeterministicConfigValidator;

impl ConfigValidator for DeterministicConfigValidator {
    fn validate(&self, input: ConfigValidationInput<'_>) -> ConfigValidation {
        validate_commission_config(input)
    }
}

/// Checks run in a fixed order so the violation list is stable:
/// phase and pool ranges, post-sale global role ranges, mandatory roles,
/// then enabled optional roles.
pub fn validate_commission_config(input: ConfigValidationInput<'_>) -> ConfigValidation {
    let config = input.config;
    let mut result = ConfigValidation::default();

    check_range(&mut result, "phase_sale_percent", config.phase_sale_percent);
    check_range(&mut result, "phase_post_sale_percent", config.phase_post_sale_percent);
    if let Some(pool) = config.sale_pool_percent {
        check_range(&mut result, "sale_pool_percent", pool);
    }
    check_range(&mut result, "legal_manager_percent", input.global_roles.legal_manager_percent);
    check_range(
        &mut result,
        "post_sale_coordinator_percent",
        input.global_roles.post_sale_coordinator_percent,
    );

    check_mandatory(&mut result, "sale_manager_percent", config.sale_manager_percent);
    check_mandatory(&mut result, "deal_owner_percent", config.deal_owner_percent);

    check_optional(&mut result, "customer_service", &config.customer_service);
    check_optional(&mut result, "deliveries", &config.deliveries);
    check_optional(&mut result, "bonds", &config.bonds);

    result.valid = result.violations.is_empty();
    result
}

fn check_range(result: &mut ConfigValidation, field: &str, value: Decimal) {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        result.violations.push(ConfigViolation::new(
            "PERCENT_OUT_OF_RANGE",
            field,
            format!("{field} must be between 0 and 100 (got {value})"),
        ));
    }
}

fn check_mandatory(result: &mut ConfigValidation, field: &str, value: Decimal) {
    if value <= Decimal::ZERO {
        result.violations.push(ConfigViolation::new(
            "MANDATORY_ROLE_MISSING",
            field,
            format!("{field} is a mandatory role and must be greater than 0 (got {value})"),
        ));
    }
}

fn check_optional(result: &mut ConfigValidation, role: &str, setting: &OptionalRole) {
    if setting.enabled && setting.percent <= Decimal::ZERO {
        result.violations.push(ConfigViolation::new(
            "ENABLED_ROLE_WITHOUT_PERCENT",
            role,
            format!(
                "{role} is enabled and must carry a percent greater than 0 (got {})",
                setting.percent
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{validate_commission_config, ConfigValidation, ConfigValidationInput};
    use crate::domain::commission_config::{CommissionConfig, GlobalRoles, OptionalRole};
    use crate::domain::development::DevelopmentKey;
    use crate::errors::DomainError;

    fn config() -> CommissionConfig {
        CommissionConfig {
            development: DevelopmentKey("torre norte".into()),
            phase_sale_percent: Decimal::new(70, 0),
            phase_post_sale_percent: Decimal::new(30, 0),
            sale_pool_percent: Some(Decimal::new(80, 0)),
            sale_manager_percent: Decimal::new(60, 0),
            deal_owner_percent: Decimal::new(40, 0),
            external_advisor_percent: Some(Decimal::new(10, 0)),
            customer_service: OptionalRole::enabled(Decimal::new(5, 0)),
            deliveries: OptionalRole::disabled(),
            bonds: OptionalRole::disabled(),
        }
    }

    fn validate(config: &CommissionConfig, global_roles: &GlobalRoles) -> ConfigValidation {
        validate_commission_config(ConfigValidationInput { config, global_roles })
    }

    fn globals() -> GlobalRoles {
        GlobalRoles {
            operations_coordinator_percent: Decimal::new(2, 0),
            marketing_percent: Decimal::new(3, 0),
            legal_manager_percent: Decimal::new(10, 0),
            post_sale_coordinator_percent: Decimal::new(15, 0),
        }
    }

    #[test]
    fn well_formed_configuration_is_valid() {
        let config = config();
        let globals = globals();
        let result = validate(&config, &globals);

        assert!(result.valid);
        assert!(result.violations.is_empty());
        assert_eq!(result.into_result(), Ok(()));
    }

    #[test]
    fn violations_follow_declaration_order() {
        let config = CommissionConfig {
            phase_sale_percent: Decimal::new(101, 0),
            phase_post_sale_percent: Decimal::new(-1, 0),
            sale_pool_percent: Some(Decimal::new(150, 0)),
            sale_manager_percent: Decimal::ZERO,
            deal_owner_percent: Decimal::ZERO,
            deliveries: OptionalRole::enabled(Decimal::ZERO),
            ..config()
        };
        let globals = GlobalRoles { legal_manager_percent: Decimal::new(120, 0), ..globals() };

        let result = validate(&config, &globals);

        assert!(!result.valid);
        let fields: Vec<&str> = result.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "phase_sale_percent",
                "phase_post_sale_percent",
                "sale_pool_percent",
                "legal_manager_percent",
                "sale_manager_percent",
                "deal_owner_percent",
                "deliveries",
            ]
        );
    }

    #[test]
    fn phase_sum_other_than_one_hundred_is_not_a_violation() {
        let config = CommissionConfig {
            phase_sale_percent: Decimal::new(70, 0),
            phase_post_sale_percent: Decimal::new(20, 0),
            ..config()
        };
        let globals = globals();

        let result = validate(&config, &globals);
        assert!(result.valid);
    }

    #[test]
    fn disabled_optional_role_without_percent_is_fine() {
        let config = CommissionConfig {
            bonds: OptionalRole { enabled: false, percent: Decimal::ZERO },
            ..config()
        };
        let globals = globals();

        let result = validate(&config, &globals);
        assert!(result.valid);
    }

    #[test]
    fn invalid_outcome_converts_into_validation_error_with_full_list() {
        let config = CommissionConfig { deal_owner_percent: Decimal::ZERO, ..config() };
        let globals = globals();

        let error =
            validate(&config, &globals).into_result().expect_err("deal owner is mandatory");

        assert!(matches!(error, DomainError::Validation(ref violations) if violations.len() == 1));
        assert_eq!(error.violations()[0].code, "MANDATORY_ROLE_MISSING");
    }
}
