use sqlx::sqlite::SqliteRow;

use brokerage_core::domain::development::DevelopmentKey;
use brokerage_core::domain::partner::{
    PartnerCommission, PartnerId, PhaseCollection, ProductPartner,
};
use brokerage_core::domain::sale::SaleId;

use super::{
    bool_column, decimal_column, enum_column, optional_instant_column, text_column,
    PartnerCommissionWriter, PartnerRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlPartnerRepository {
    pool: DbPool,
}

impl SqlPartnerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_partner(row: &SqliteRow) -> Result<ProductPartner, RepositoryError> {
    Ok(ProductPartner {
        id: PartnerId(text_column(row, "id")?),
        development: DevelopmentKey(text_column(row, "development")?),
        name: text_column(row, "name")?,
        participation_percent: decimal_column(row, "participation_percent")?,
        active: bool_column(row, "active")?,
    })
}

#[async_trait::async_trait]
impl PartnerRepository for SqlPartnerRepository {
    async fn list_for_development(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Vec<ProductPartner>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, development, name, participation_percent, active
             FROM product_partner WHERE development = ? ORDER BY id ASC",
        )
        .bind(development.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_partner).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, partner: ProductPartner) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product_partner (id, development, name, participation_percent, active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 development = excluded.development,
                 name = excluded.name,
                 participation_percent = excluded.participation_percent,
                 active = excluded.active",
        )
        .bind(&partner.id.0)
        .bind(partner.development.as_str())
        .bind(&partner.name)
        .bind(partner.participation_percent.to_string())
        .bind(partner.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlPartnerCommissionWriter {
    pool: DbPool,
}

impl SqlPartnerCommissionWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_partner_commission(row: &SqliteRow) -> Result<PartnerCommission, RepositoryError> {
    Ok(PartnerCommission {
        sale_id: SaleId(text_column(row, "sale_id")?),
        partner_id: PartnerId(text_column(row, "partner_id")?),
        participation_percent: decimal_column(row, "participation_percent")?,
        sale_phase_amount: decimal_column(row, "sale_phase_amount")?,
        post_sale_phase_amount: decimal_column(row, "post_sale_phase_amount")?,
        total_amount: decimal_column(row, "total_amount")?,
        vat_rate_percent: decimal_column(row, "vat_rate_percent")?,
        vat_amount: decimal_column(row, "vat_amount")?,
        total_with_vat: decimal_column(row, "total_with_vat")?,
        sale_phase: PhaseCollection {
            state: enum_column(row, "sale_phase_state")?,
            collected_at: optional_instant_column(row, "sale_phase_collected_at")?,
        },
        post_sale_phase: PhaseCollection {
            state: enum_column(row, "post_sale_phase_state")?,
            collected_at: optional_instant_column(row, "post_sale_phase_collected_at")?,
        },
    })
}

#[async_trait::async_trait]
impl PartnerCommissionWriter for SqlPartnerCommissionWriter {
    async fn upsert(
        &self,
        sale_id: &SaleId,
        rows: Vec<PartnerCommission>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<SqliteRow> =
            sqlx::query("SELECT partner_id FROM partner_commission WHERE sale_id = ?")
                .bind(&sale_id.0)
                .fetch_all(&mut *tx)
                .await?;
        for row in &existing {
            let partner_id = text_column(row, "partner_id")?;
            if rows.iter().all(|current| current.partner_id.0 != partner_id) {
                sqlx::query("DELETE FROM partner_commission WHERE sale_id = ? AND partner_id = ?")
                    .bind(&sale_id.0)
                    .bind(&partner_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        // Collection columns are only written on first insert.
        for row in &rows {
            sqlx::query(
                "INSERT INTO partner_commission (sale_id, partner_id, participation_percent,
                                                 sale_phase_amount, post_sale_phase_amount,
                                                 total_amount, vat_rate_percent, vat_amount,
                                                 total_with_vat,
                                                 sale_phase_state, sale_phase_collected_at,
                                                 post_sale_phase_state,
                                                 post_sale_phase_collected_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(sale_id, partner_id) DO UPDATE SET
                     participation_percent = excluded.participation_percent,
                     sale_phase_amount = excluded.sale_phase_amount,
                     post_sale_phase_amount = excluded.post_sale_phase_amount,
                     total_amount = excluded.total_amount,
                     vat_rate_percent = excluded.vat_rate_percent,
                     vat_amount = excluded.vat_amount,
                     total_with_vat = excluded.total_with_vat",
            )
            .bind(&sale_id.0)
            .bind(&row.partner_id.0)
            .bind(row.participation_percent.to_string())
            .bind(row.sale_phase_amount.to_string())
            .bind(row.post_sale_phase_amount.to_string())
            .bind(row.total_amount.to_string())
            .bind(row.vat_rate_percent.to_string())
            .bind(row.vat_amount.to_string())
            .bind(row.total_with_vat.to_string())
            .bind(row.sale_phase.state.as_str())
            .bind(row.sale_phase.collected_at.map(|at| at.to_rfc3339()))
            .bind(row.post_sale_phase.state.as_str())
            .bind(row.post_sale_phase.collected_at.map(|at| at.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<PartnerCommission>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT sale_id, partner_id, participation_percent, sale_phase_amount,
                    post_sale_phase_amount, total_amount, vat_rate_percent, vat_amount,
                    total_with_vat, sale_phase_state, sale_phase_collected_at,
                    post_sale_phase_state, post_sale_phase_collected_at
             FROM partner_commission WHERE sale_id = ? ORDER BY partner_id ASC",
        )
        .bind(&sale_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_partner_commission).collect::<Result<Vec<_>, _>>()
    }

    async fn update_collection(&self, row: &PartnerCommission) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE partner_commission
             SET sale_phase_state = ?, sale_phase_collected_at = ?,
                 post_sale_phase_state = ?, post_sale_phase_collected_at = ?
             WHERE sale_id = ? AND partner_id = ?",
        )
        .bind(row.sale_phase.state.as_str())
        .bind(row.sale_phase.collected_at.map(|at| at.to_rfc3339()))
        .bind(row.post_sale_phase.state.as_str())
        .bind(row.post_sale_phase.collected_at.map(|at| at.to_rfc3339()))
        .bind(&row.sale_id.0)
        .bind(&row.partner_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use brokerage_core::domain::development::DevelopmentKey;
    use brokerage_core::domain::distribution::CommissionPhase;
    use brokerage_core::domain::partner::{
        CollectionState, PartnerCommission, PartnerId, PhaseCollection, ProductPartner,
    };
    use brokerage_core::domain::sale::{CommissionSale, SaleId};

    use super::{SqlPartnerCommissionWriter, SqlPartnerRepository};
    use crate::repositories::{
        PartnerCommissionWriter, PartnerRepository, SaleRepository, SqlSaleRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlSaleRepository::new(pool.clone())
            .save(CommissionSale {
                id: SaleId("S-1".to_string()),
                development: DevelopmentKey("merida".to_string()),
                total_value: Decimal::new(1_000_000, 0),
                signed_on: NaiveDate::from_ymd_opt(2025, 8, 15).expect("valid date"),
                owner: "ana.lopez".to_string(),
                external_advisor: None,
                term_months: None,
                square_meters: None,
                calculation: None,
            })
            .await
            .expect("save sale");
        pool
    }

    fn commission(partner: &str, total: i64) -> PartnerCommission {
        let total = Decimal::new(total, 0);
        let vat = total * Decimal::new(16, 2);
        PartnerCommission {
            sale_id: SaleId("S-1".to_string()),
            partner_id: PartnerId(partner.to_string()),
            participation_percent: Decimal::new(50, 0),
            sale_phase_amount: total * Decimal::new(7, 1),
            post_sale_phase_amount: total * Decimal::new(3, 1),
            total_amount: total,
            vat_rate_percent: Decimal::new(16, 0),
            vat_amount: vat,
            total_with_vat: total + vat,
            sale_phase: PhaseCollection::default(),
            post_sale_phase: PhaseCollection::default(),
        }
    }

    #[tokio::test]
    async fn partners_are_listed_per_development() {
        let repo = SqlPartnerRepository::new(setup().await);
        for (id, development) in [("P-2", "merida"), ("P-1", "merida"), ("P-3", "playa")] {
            repo.save(ProductPartner {
                id: PartnerId(id.to_string()),
                development: DevelopmentKey(development.to_string()),
                name: format!("Partner {id}"),
                participation_percent: Decimal::new(50, 0),
                active: id != "P-2",
            })
            .await
            .expect("save partner");
        }

        let partners = repo
            .list_for_development(&DevelopmentKey("merida".to_string()))
            .await
            .expect("list partners");

        let ids: Vec<&str> = partners.iter().map(|partner| partner.id.0.as_str()).collect();
        assert_eq!(ids, vec!["P-1", "P-2"]);
        assert!(!partners[1].active);
    }

    #[tokio::test]
    async fn upsert_refreshes_amounts_and_keeps_collection_progress() {
        let writer = SqlPartnerCommissionWriter::new(setup().await);
        let sale_id = SaleId("S-1".to_string());

        writer
            .upsert(&sale_id, vec![commission("P-1", 500_000), commission("P-2", 250_000)])
            .await
            .expect("first upsert");

        let mut collected = commission("P-1", 500_000);
        let collected_at = Utc::now();
        collected
            .set_collection_state(CommissionPhase::Sale, CollectionState::Collected, collected_at)
            .expect("collect");
        writer.update_collection(&collected).await.expect("update collection");

        writer.upsert(&sale_id, vec![commission("P-1", 600_000)]).await.expect("second upsert");
        let stored = writer.list_for_sale(&sale_id).await.expect("list");

        assert_eq!(stored.len(), 1, "absent partners are dropped");
        assert_eq!(stored[0].total_amount, Decimal::new(600_000, 0));
        assert_eq!(stored[0].sale_phase.state, CollectionState::Collected);
        assert_eq!(
            stored[0].sale_phase.collected_at.map(|at| at.timestamp()),
            Some(collected_at.timestamp())
        );
        assert_eq!(stored[0].post_sale_phase, PhaseCollection::default());
    }

    #[tokio::test]
    async fn updating_collection_of_a_missing_row_fails() {
        let writer = SqlPartnerCommissionWriter::new(setup().await);
        assert!(writer.update_collection(&commission("P-9", 1)).await.is_err());
    }
}
