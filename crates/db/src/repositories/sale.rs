use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use brokerage_core::commission::period::PeriodKey;
use brokerage_core::domain::development::{DevelopmentCatalog, DevelopmentKey};
use brokerage_core::domain::sale::{CommissionSale, FrozenCalculation, SaleId};

use super::{
    date_column, date_text, decimal_column, optional_decimal_column, optional_instant_column,
    optional_text_column, text_column, RepositoryError, SaleRepository,
};
use crate::DbPool;

pub struct SqlSaleRepository {
    pool: DbPool,
    catalog: DevelopmentCatalog,
}

impl SqlSaleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self::with_catalog(pool, DevelopmentCatalog::default())
    }

    pub fn with_catalog(pool: DbPool, catalog: DevelopmentCatalog) -> Self {
        Self { pool, catalog }
    }
}

fn row_to_sale(row: &SqliteRow) -> Result<CommissionSale, RepositoryError> {
    let term_months: Option<i64> =
        row.try_get("term_months").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let term_months = term_months
        .map(|months| {
            u32::try_from(months)
                .map_err(|_| RepositoryError::Decode(format!("term_months: {months}")))
        })
        .transpose()?;

    let calculation = match (
        optional_decimal_column(row, "frozen_phase_sale_percent")?,
        optional_decimal_column(row, "frozen_phase_post_sale_percent")?,
        optional_decimal_column(row, "frozen_commission_percent")?,
        optional_instant_column(row, "calculated_at")?,
    ) {
        (
            Some(phase_sale_percent),
            Some(phase_post_sale_percent),
            Some(commission_percent),
            Some(calculated_at),
        ) => Some(FrozenCalculation {
            phase_sale_percent,
            phase_post_sale_percent,
            commission_percent,
            calculated_at,
        }),
        _ => None,
    };

    Ok(CommissionSale {
        id: SaleId(text_column(row, "id")?),
        development: DevelopmentKey(text_column(row, "development")?),
        total_value: decimal_column(row, "total_value")?,
        signed_on: date_column(row, "signed_on")?,
        owner: text_column(row, "owner")?,
        external_advisor: optional_text_column(row, "external_advisor")?,
        term_months,
        square_meters: optional_decimal_column(row, "square_meters")?,
        calculation,
    })
}

#[async_trait::async_trait]
impl SaleRepository for SqlSaleRepository {
    async fn find_by_id(&self, id: &SaleId) -> Result<Option<CommissionSale>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, development, total_value, signed_on, owner, external_advisor, term_months,
                    square_meters, frozen_phase_sale_percent, frozen_phase_post_sale_percent,
                    frozen_commission_percent, calculated_at
             FROM commission_sale WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_sale(r)?)),
            None => Ok(None),
        }
    }

    async fn list_ids(&self) -> Result<Vec<SaleId>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query("SELECT id FROM commission_sale ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| text_column(row, "id").map(SaleId)).collect()
    }

    async fn save(&self, sale: CommissionSale) -> Result<(), RepositoryError> {
        let frozen = sale.calculation.as_ref();
        let development = self.catalog.canonicalize(sale.development.as_str());

        sqlx::query(
            "INSERT INTO commission_sale (id, development, total_value, signed_on, owner,
                                          external_advisor, term_months, square_meters,
                                          frozen_phase_sale_percent, frozen_phase_post_sale_percent,
                                          frozen_commission_percent, calculated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 development = excluded.development,
                 total_value = excluded.total_value,
                 signed_on = excluded.signed_on,
                 owner = excluded.owner,
                 external_advisor = excluded.external_advisor,
                 term_months = excluded.term_months,
                 square_meters = excluded.square_meters,
                 frozen_phase_sale_percent = COALESCE(
                     excluded.frozen_phase_sale_percent,
                     commission_sale.frozen_phase_sale_percent),
                 frozen_phase_post_sale_percent = COALESCE(
                     excluded.frozen_phase_post_sale_percent,
                     commission_sale.frozen_phase_post_sale_percent),
                 frozen_commission_percent = COALESCE(
                     excluded.frozen_commission_percent,
                     commission_sale.frozen_commission_percent),
                 calculated_at = COALESCE(excluded.calculated_at, commission_sale.calculated_at)",
        )
        .bind(&sale.id.0)
        .bind(development.as_str())
        .bind(sale.total_value.to_string())
        .bind(date_text(sale.signed_on))
        .bind(&sale.owner)
        .bind(&sale.external_advisor)
        .bind(sale.term_months.map(i64::from))
        .bind(sale.square_meters.map(|value| value.to_string()))
        .bind(frozen.map(|calc| calc.phase_sale_percent.to_string()))
        .bind(frozen.map(|calc| calc.phase_post_sale_percent.to_string()))
        .bind(frozen.map(|calc| calc.commission_percent.to_string()))
        .bind(frozen.map(|calc| calc.calculated_at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_in_period(
        &self,
        development: &DevelopmentKey,
        period: &PeriodKey,
        as_of: NaiveDate,
    ) -> Result<u32, RepositoryError> {
        let Some((start, end)) = period.window() else {
            return Ok(0);
        };
        let end = end.min(as_of);
        if end < start {
            return Ok(0);
        }
        let development = self.catalog.canonicalize(development.as_str());

        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM commission_sale
             WHERE development = ? AND signed_on >= ? AND signed_on <= ?",
        )
        .bind(development.as_str())
        .bind(date_text(start))
        .bind(date_text(end))
        .fetch_one(&self.pool)
        .await?
        .try_get("count")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        u32::try_from(count).map_err(|_| RepositoryError::Decode(format!("count: {count}")))
    }
}
