use sqlx::sqlite::SqliteRow;

use brokerage_core::domain::distribution::CommissionDistribution;
use brokerage_core::domain::rule::RuleId;
use brokerage_core::domain::sale::SaleId;

use super::{
    decimal_column, enum_column, optional_instant_column, optional_text_column, text_column,
    DistributionWriter, RepositoryError,
};
use crate::DbPool;

pub struct SqlDistributionWriter {
    pool: DbPool,
}

impl SqlDistributionWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_distribution(row: &SqliteRow) -> Result<CommissionDistribution, RepositoryError> {
    Ok(CommissionDistribution {
        sale_id: SaleId(text_column(row, "sale_id")?),
        role: enum_column(row, "role")?,
        phase: enum_column(row, "phase")?,
        recipient: optional_text_column(row, "recipient")?,
        percent: decimal_column(row, "percent")?,
        base_amount: decimal_column(row, "base_amount")?,
        amount: decimal_column(row, "amount")?,
        vat_amount: decimal_column(row, "vat_amount")?,
        rule_id: optional_text_column(row, "rule_id")?.map(RuleId),
        payment_status: enum_column(row, "payment_status")?,
        paid_at: optional_instant_column(row, "paid_at")?,
    })
}

#[async_trait::async_trait]
impl DistributionWriter for SqlDistributionWriter {
    async fn replace_all(
        &self,
        sale_id: &SaleId,
        rows: Vec<CommissionDistribution>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM commission_distribution WHERE sale_id = ?")
            .bind(&sale_id.0)
            .execute(&mut *tx)
            .await?;

        for (position, row) in rows.iter().enumerate() {
            sqlx::query(
                "INSERT INTO commission_distribution (sale_id, position, role, phase, recipient,
                                                      percent, base_amount, amount, vat_amount,
                                                      rule_id, payment_status, paid_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&sale_id.0)
            .bind(position as i64)
            .bind(row.role.as_str())
            .bind(row.phase.as_str())
            .bind(&row.recipient)
            .bind(row.percent.to_string())
            .bind(row.base_amount.to_string())
            .bind(row.amount.to_string())
            .bind(row.vat_amount.to_string())
            .bind(row.rule_id.as_ref().map(|id| id.0.as_str()))
            .bind(row.payment_status.as_str())
            .bind(row.paid_at.map(|at| at.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<CommissionDistribution>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT sale_id, role, phase, recipient, percent, base_amount, amount, vat_amount,
                    rule_id, payment_status, paid_at
             FROM commission_distribution WHERE sale_id = ? ORDER BY position ASC",
        )
        .bind(&sale_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_distribution).collect::<Result<Vec<_>, _>>()
    }
}
