use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use brokerage_core::domain::development::DevelopmentKey;
use brokerage_core::domain::rule::{CommissionRule, RuleId};

use super::{bool_column, decimal_column, enum_column, text_column, RepositoryError, RuleRepository};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rule(row: &SqliteRow) -> Result<CommissionRule, RepositoryError> {
    let unit_threshold: i64 =
        row.try_get("unit_threshold").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority: i64 =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CommissionRule {
        id: RuleId(text_column(row, "id")?),
        development: DevelopmentKey(text_column(row, "development")?),
        name: text_column(row, "name")?,
        period_type: enum_column(row, "period_type")?,
        period_value: text_column(row, "period_value")?,
        operator: enum_column(row, "operator")?,
        unit_threshold: u32::try_from(unit_threshold)
            .map_err(|_| RepositoryError::Decode(format!("unit_threshold: {unit_threshold}")))?,
        commission_percent: decimal_column(row, "commission_percent")?,
        vat_percent: decimal_column(row, "vat_percent")?,
        active: bool_column(row, "active")?,
        priority: i32::try_from(priority)
            .map_err(|_| RepositoryError::Decode(format!("priority: {priority}")))?,
    })
}

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn list_active(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Vec<CommissionRule>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, development, name, period_type, period_value, operator, unit_threshold,
                    commission_percent, vat_percent, active, priority
             FROM commission_rule
             WHERE development = ? AND active = 1
             ORDER BY priority DESC, id ASC",
        )
        .bind(development.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, rule: CommissionRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO commission_rule (id, development, name, period_type, period_value,
                                          operator, unit_threshold, commission_percent,
                                          vat_percent, active, priority)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 development = excluded.development,
                 name = excluded.name,
                 period_type = excluded.period_type,
                 period_value = excluded.period_value,
                 operator = excluded.operator,
                 unit_threshold = excluded.unit_threshold,
                 commission_percent = excluded.commission_percent,
                 vat_percent = excluded.vat_percent,
                 active = excluded.active,
                 priority = excluded.priority",
        )
        .bind(&rule.id.0)
        .bind(rule.development.as_str())
        .bind(&rule.name)
        .bind(rule.period_type.as_str())
        .bind(&rule.period_value)
        .bind(rule.operator.as_str())
        .bind(i64::from(rule.unit_threshold))
        .bind(rule.commission_percent.to_string())
        .bind(rule.vat_percent.to_string())
        .bind(rule.active)
        .bind(i64::from(rule.priority))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use brokerage_core::domain::development::DevelopmentKey;
    use brokerage_core::domain::rule::{CommissionRule, PeriodType, RuleId, ThresholdOperator};

    use super::SqlRuleRepository;
    use crate::repositories::RuleRepository;
    use crate::{connect_with_settings, migrations};

    fn rule(id: &str, development: &str, active: bool, priority: i32) -> CommissionRule {
        CommissionRule {
            id: RuleId(id.to_string()),
            development: DevelopmentKey(development.to_string()),
            name: format!("bonus {id}"),
            period_type: PeriodType::Quarter,
            period_value: "2025".to_string(),
            operator: ThresholdOperator::AtLeast,
            unit_threshold: 5,
            commission_percent: Decimal::new(5, 1),
            vat_percent: Decimal::new(16, 0),
            active,
            priority,
        }
    }

    #[tokio::test]
    async fn list_active_filters_development_and_inactive_rules() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlRuleRepository::new(pool);

        repo.save(rule("R-1", "merida", true, 1)).await.expect("save R-1");
        repo.save(rule("R-2", "merida", true, 5)).await.expect("save R-2");
        repo.save(rule("R-3", "merida", false, 9)).await.expect("save R-3");
        repo.save(rule("R-4", "torre norte", true, 9)).await.expect("save R-4");

        let active =
            repo.list_active(&DevelopmentKey("merida".to_string())).await.expect("list rules");

        let ids: Vec<&str> = active.iter().map(|rule| rule.id.0.as_str()).collect();
        assert_eq!(ids, vec!["R-2", "R-1"]);
        assert_eq!(active[1], rule("R-1", "merida", true, 1));
    }
}
