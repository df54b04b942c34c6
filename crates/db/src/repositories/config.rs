use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use tracing::warn;

use brokerage_core::commission::validator::{validate_commission_config, ConfigValidationInput};
use brokerage_core::domain::commission_config::{CommissionConfig, GlobalRoles, OptionalRole};
use brokerage_core::domain::development::DevelopmentKey;

use super::{
    bool_column, decimal_column, optional_decimal_column, text_column, ConfigRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlConfigRepository {
    pool: DbPool,
}

impl SqlConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn optional_role(row: &SqliteRow, prefix: &str) -> Result<OptionalRole, RepositoryError> {
    Ok(OptionalRole {
        enabled: bool_column(row, &format!("{prefix}_enabled"))?,
        percent: decimal_column(row, &format!("{prefix}_percent"))?,
    })
}

fn row_to_config(row: &SqliteRow) -> Result<CommissionConfig, RepositoryError> {
    Ok(CommissionConfig {
        development: DevelopmentKey(text_column(row, "development")?),
        phase_sale_percent: decimal_column(row, "phase_sale_percent")?,
        phase_post_sale_percent: decimal_column(row, "phase_post_sale_percent")?,
        sale_pool_percent: optional_decimal_column(row, "sale_pool_percent")?,
        sale_manager_percent: decimal_column(row, "sale_manager_percent")?,
        deal_owner_percent: decimal_column(row, "deal_owner_percent")?,
        external_advisor_percent: optional_decimal_column(row, "external_advisor_percent")?,
        customer_service: optional_role(row, "customer_service")?,
        deliveries: optional_role(row, "deliveries")?,
        bonds: optional_role(row, "bonds")?,
    })
}

/// Rejects `config` with every violation when it does not validate against
/// `global_roles`.
pub(crate) fn ensure_valid(
    config: &CommissionConfig,
    global_roles: &GlobalRoles,
) -> Result<(), RepositoryError> {
    let validation = validate_commission_config(ConfigValidationInput { config, global_roles });
    if !validation.valid {
        warn!(
            event_name = "commission.config.rejected",
            development = %config.development,
            violations = validation.violations.len(),
            "commission configuration rejected"
        );
    }
    validation.into_result().map_err(RepositoryError::from)
}

#[async_trait::async_trait]
impl ConfigRepository for SqlConfigRepository {
    async fn get(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Option<CommissionConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT development, phase_sale_percent, phase_post_sale_percent, sale_pool_percent,
                    sale_manager_percent, deal_owner_percent, external_advisor_percent,
                    customer_service_enabled, customer_service_percent,
                    deliveries_enabled, deliveries_percent,
                    bonds_enabled, bonds_percent
             FROM commission_config WHERE development = ?",
        )
        .bind(development.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_config(r)?)),
            None => Ok(None),
        }
    }

    async fn global_roles(&self) -> Result<GlobalRoles, RepositoryError> {
        let row = sqlx::query(
            "SELECT operations_coordinator_percent, marketing_percent,
                    legal_manager_percent, post_sale_coordinator_percent
             FROM global_roles WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(GlobalRoles::default());
        };

        Ok(GlobalRoles {
            operations_coordinator_percent: decimal_column(&row, "operations_coordinator_percent")?,
            marketing_percent: decimal_column(&row, "marketing_percent")?,
            legal_manager_percent: decimal_column(&row, "legal_manager_percent")?,
            post_sale_coordinator_percent: decimal_column(&row, "post_sale_coordinator_percent")?,
        })
    }

    async fn save(&self, config: CommissionConfig) -> Result<(), RepositoryError> {
        let global_roles = self.global_roles().await?;
        ensure_valid(&config, &global_roles)?;

        sqlx::query(
            "INSERT INTO commission_config (development, phase_sale_percent,
                                            phase_post_sale_percent, sale_pool_percent,
                                            sale_manager_percent, deal_owner_percent,
                                            external_advisor_percent,
                                            customer_service_enabled, customer_service_percent,
                                            deliveries_enabled, deliveries_percent,
                                            bonds_enabled, bonds_percent, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(development) DO UPDATE SET
                 phase_sale_percent = excluded.phase_sale_percent,
                 phase_post_sale_percent = excluded.phase_post_sale_percent,
                 sale_pool_percent = excluded.sale_pool_percent,
                 sale_manager_percent = excluded.sale_manager_percent,
                 deal_owner_percent = excluded.deal_owner_percent,
                 external_advisor_percent = excluded.external_advisor_percent,
                 customer_service_enabled = excluded.customer_service_enabled,
                 customer_service_percent = excluded.customer_service_percent,
                 deliveries_enabled = excluded.deliveries_enabled,
                 deliveries_percent = excluded.deliveries_percent,
                 bonds_enabled = excluded.bonds_enabled,
                 bonds_percent = excluded.bonds_percent,
                 updated_at = excluded.updated_at",
        )
        .bind(config.development.as_str())
        .bind(config.phase_sale_percent.to_string())
        .bind(config.phase_post_sale_percent.to_string())
        .bind(config.sale_pool_percent.map(|value| value.to_string()))
        .bind(config.sale_manager_percent.to_string())
        .bind(config.deal_owner_percent.to_string())
        .bind(config.external_advisor_percent.map(|value| value.to_string()))
        .bind(config.customer_service.enabled)
        .bind(config.customer_service.percent.to_string())
        .bind(config.deliveries.enabled)
        .bind(config.deliveries.percent.to_string())
        .bind(config.bonds.enabled)
        .bind(config.bonds.percent.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_global_roles(&self, roles: GlobalRoles) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO global_roles (id, operations_coordinator_percent, marketing_percent,
                                       legal_manager_percent, post_sale_coordinator_percent,
                                       updated_at)
             VALUES (1, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 operations_coordinator_percent = excluded.operations_coordinator_percent,
                 marketing_percent = excluded.marketing_percent,
                 legal_manager_percent = excluded.legal_manager_percent,
                 post_sale_coordinator_percent = excluded.post_sale_coordinator_percent,
                 updated_at = excluded.updated_at",
        )
        .bind(roles.operations_coordinator_percent.to_string())
        .bind(roles.marketing_percent.to_string())
        .bind(roles.legal_manager_percent.to_string())
        .bind(roles.post_sale_coordinator_percent.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
