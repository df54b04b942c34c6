use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use brokerage_core::commission::period::PeriodKey;
use brokerage_core::domain::adjustment::CommissionAdjustment;
use brokerage_core::domain::commission_config::{CommissionConfig, GlobalRoles};
use brokerage_core::domain::development::DevelopmentKey;
use brokerage_core::domain::distribution::CommissionDistribution;
use brokerage_core::domain::partner::{PartnerCommission, ProductPartner};
use brokerage_core::domain::rule::CommissionRule;
use brokerage_core::domain::sale::{CommissionSale, SaleId};
use brokerage_core::errors::DomainError;

pub mod adjustment;
pub mod config;
pub mod distribution;
pub mod memory;
pub mod partner;
pub mod rule;
pub mod sale;

pub use adjustment::SqlAdjustmentRepository;
pub use config::SqlConfigRepository;
pub use distribution::SqlDistributionWriter;
pub use memory::{
    InMemoryAdjustmentRepository, InMemoryConfigRepository, InMemoryDistributionWriter,
    InMemoryPartnerCommissionWriter, InMemoryPartnerRepository, InMemoryRuleRepository,
    InMemorySaleRepository,
};
pub use partner::{SqlPartnerCommissionWriter, SqlPartnerRepository};
pub use rule::SqlRuleRepository;
pub use sale::SqlSaleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Rejected(#[from] DomainError),
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Option<CommissionConfig>, RepositoryError>;

    /// Zeroes when nothing has been stored yet.
    async fn global_roles(&self) -> Result<GlobalRoles, RepositoryError>;

    /// Validates against the stored global roles first; an invalid config is
    /// rejected whole with every violation.
    async fn save(&self, config: CommissionConfig) -> Result<(), RepositoryError>;

    async fn save_global_roles(&self, roles: GlobalRoles) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_active(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Vec<CommissionRule>, RepositoryError>;

    async fn save(&self, rule: CommissionRule) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SaleRepository: Send + Sync {
    async fn find_by_id(&self, id: &SaleId) -> Result<Option<CommissionSale>, RepositoryError>;
    async fn list_ids(&self) -> Result<Vec<SaleId>, RepositoryError>;
    /// Stores the sale under its canonical development. A sale saved without
    /// a calculation keeps the frozen percents already stored for it.
    async fn save(&self, sale: CommissionSale) -> Result<(), RepositoryError>;

    /// Sales of `development` (any spelling) signed inside `period` and not
    /// after `as_of`.
    async fn count_in_period(
        &self,
        development: &DevelopmentKey,
        period: &PeriodKey,
        as_of: NaiveDate,
    ) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait PartnerRepository: Send + Sync {
    async fn list_for_development(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Vec<ProductPartner>, RepositoryError>;

    async fn save(&self, partner: ProductPartner) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DistributionWriter: Send + Sync {
    /// Deletes every row of the sale and inserts `rows`, atomically.
    async fn replace_all(
        &self,
        sale_id: &SaleId,
        rows: Vec<CommissionDistribution>,
    ) -> Result<(), RepositoryError>;

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<CommissionDistribution>, RepositoryError>;
}

#[async_trait]
pub trait PartnerCommissionWriter: Send + Sync {
    /// Replaces amounts per (sale, partner), keeps collection states of rows
    /// that already exist and drops partners absent from `rows`.
    async fn upsert(
        &self,
        sale_id: &SaleId,
        rows: Vec<PartnerCommission>,
    ) -> Result<(), RepositoryError>;

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<PartnerCommission>, RepositoryError>;

    /// Persists both phase collection states of an existing row.
    async fn update_collection(&self, row: &PartnerCommission) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AdjustmentRepository: Send + Sync {
    async fn record(&self, adjustment: CommissionAdjustment) -> Result<(), RepositoryError>;

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<CommissionAdjustment>, RepositoryError>;
}

pub(crate) fn text_column(row: &SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn optional_text_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    parse_decimal(column, &text_column(row, column)?)
}

pub(crate) fn optional_decimal_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, RepositoryError> {
    optional_text_column(row, column)?.map(|value| parse_decimal(column, &value)).transpose()
}

pub(crate) fn date_column(row: &SqliteRow, column: &str) -> Result<NaiveDate, RepositoryError> {
    let value = text_column(row, column)?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("{column}: `{value}`: {e}")))
}

pub(crate) fn optional_instant_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    optional_text_column(row, column)?.map(|value| parse_instant(column, &value)).transpose()
}

pub(crate) fn instant_column(
    row: &SqliteRow,
    column: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    parse_instant(column, &text_column(row, column)?)
}

pub(crate) fn bool_column(row: &SqliteRow, column: &str) -> Result<bool, RepositoryError> {
    let value: i64 = row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(value != 0)
}

/// Columns holding an enum's storage name.
pub(crate) fn enum_column<T>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = DomainError>,
{
    text_column(row, column)?
        .parse()
        .map_err(|e: DomainError| RepositoryError::Decode(format!("{column}: {e}")))
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|e| RepositoryError::Decode(format!("{column}: `{value}`: {e}")))
}

fn parse_instant(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: `{value}`: {e}")))
}

pub(crate) fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
