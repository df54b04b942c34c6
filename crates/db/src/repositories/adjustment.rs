use sqlx::sqlite::SqliteRow;

use brokerage_core::domain::adjustment::{AdjustmentId, CommissionAdjustment};
use brokerage_core::domain::sale::SaleId;

use super::{
    decimal_column, enum_column, instant_column, text_column, AdjustmentRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlAdjustmentRepository {
    pool: DbPool,
}

impl SqlAdjustmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_adjustment(row: &SqliteRow) -> Result<CommissionAdjustment, RepositoryError> {
    Ok(CommissionAdjustment {
        id: AdjustmentId(text_column(row, "id")?),
        sale_id: SaleId(text_column(row, "sale_id")?),
        phase: enum_column(row, "phase")?,
        old_role: enum_column(row, "old_role")?,
        new_role: enum_column(row, "new_role")?,
        old_percent: decimal_column(row, "old_percent")?,
        new_percent: decimal_column(row, "new_percent")?,
        old_amount: decimal_column(row, "old_amount")?,
        new_amount: decimal_column(row, "new_amount")?,
        reason: text_column(row, "reason")?,
        adjusted_by: text_column(row, "adjusted_by")?,
        adjusted_at: instant_column(row, "adjusted_at")?,
    })
}

#[async_trait::async_trait]
impl AdjustmentRepository for SqlAdjustmentRepository {
    async fn record(&self, adjustment: CommissionAdjustment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO commission_adjustment (id, sale_id, phase, old_role, new_role,
                                                old_percent, new_percent, old_amount, new_amount,
                                                reason, adjusted_by, adjusted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&adjustment.id.0)
        .bind(&adjustment.sale_id.0)
        .bind(adjustment.phase.as_str())
        .bind(adjustment.old_role.as_str())
        .bind(adjustment.new_role.as_str())
        .bind(adjustment.old_percent.to_string())
        .bind(adjustment.new_percent.to_string())
        .bind(adjustment.old_amount.to_string())
        .bind(adjustment.new_amount.to_string())
        .bind(&adjustment.reason)
        .bind(&adjustment.adjusted_by)
        .bind(adjustment.adjusted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<CommissionAdjustment>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, sale_id, phase, old_role, new_role, old_percent, new_percent,
                    old_amount, new_amount, reason, adjusted_by, adjusted_at
             FROM commission_adjustment WHERE sale_id = ?
             ORDER BY adjusted_at ASC, id ASC",
        )
        .bind(&sale_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_adjustment).collect::<Result<Vec<_>, _>>()
    }
}
