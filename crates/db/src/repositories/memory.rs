use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use brokerage_core::commission::period::PeriodKey;
use brokerage_core::commission::units;
use brokerage_core::domain::adjustment::CommissionAdjustment;
use brokerage_core::domain::commission_config::{CommissionConfig, GlobalRoles};
use brokerage_core::domain::development::{DevelopmentCatalog, DevelopmentKey};
use brokerage_core::domain::distribution::CommissionDistribution;
use brokerage_core::domain::partner::{PartnerCommission, ProductPartner};
use brokerage_core::domain::rule::CommissionRule;
use brokerage_core::domain::sale::{CommissionSale, SaleId};

use super::config::ensure_valid;
use super::{
    AdjustmentRepository, ConfigRepository, DistributionWriter, PartnerCommissionWriter,
    PartnerRepository, RepositoryError, RuleRepository, SaleRepository,
};

#[derive(Default)]
pub struct InMemoryConfigRepository {
    configs: RwLock<HashMap<String, CommissionConfig>>,
    global_roles: RwLock<GlobalRoles>,
}

#[async_trait::async_trait]
impl ConfigRepository for InMemoryConfigRepository {
    async fn get(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Option<CommissionConfig>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.get(development.as_str()).cloned())
    }

    async fn global_roles(&self) -> Result<GlobalRoles, RepositoryError> {
        Ok(*self.global_roles.read().await)
    }

    async fn save(&self, config: CommissionConfig) -> Result<(), RepositoryError> {
        let global_roles = *self.global_roles.read().await;
        ensure_valid(&config, &global_roles)?;

        let mut configs = self.configs.write().await;
        configs.insert(config.development.0.clone(), config);
        Ok(())
    }

    async fn save_global_roles(&self, roles: GlobalRoles) -> Result<(), RepositoryError> {
        *self.global_roles.write().await = roles;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<HashMap<String, CommissionRule>>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_active(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Vec<CommissionRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut active: Vec<CommissionRule> = rules
            .values()
            .filter(|rule| rule.active && &rule.development == development)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn save(&self, rule: CommissionRule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySaleRepository {
    sales: RwLock<HashMap<String, CommissionSale>>,
    catalog: DevelopmentCatalog,
}

impl InMemorySaleRepository {
    pub fn new(catalog: DevelopmentCatalog) -> Self {
        Self { sales: RwLock::default(), catalog }
    }
}

#[async_trait::async_trait]
impl SaleRepository for InMemorySaleRepository {
    async fn find_by_id(&self, id: &SaleId) -> Result<Option<CommissionSale>, RepositoryError> {
        let sales = self.sales.read().await;
        Ok(sales.get(&id.0).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<SaleId>, RepositoryError> {
        let sales = self.sales.read().await;
        let mut ids: Vec<SaleId> = sales.values().map(|sale| sale.id.clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn save(&self, mut sale: CommissionSale) -> Result<(), RepositoryError> {
        sale.development = self.catalog.canonicalize(sale.development.as_str());
        let mut sales = self.sales.write().await;
        if sale.calculation.is_none() {
            sale.calculation = sales.get(&sale.id.0).and_then(|stored| stored.calculation.clone());
        }
        sales.insert(sale.id.0.clone(), sale);
        Ok(())
    }

    async fn count_in_period(
        &self,
        development: &DevelopmentKey,
        period: &PeriodKey,
        as_of: NaiveDate,
    ) -> Result<u32, RepositoryError> {
        let development = &self.catalog.canonicalize(development.as_str());
        let sales = self.sales.read().await;
        let signing_dates = sales
            .values()
            .filter(|sale| &sale.development == development)
            .map(|sale| sale.signed_on);
        Ok(units::count_in_period(signing_dates, period, as_of))
    }
}

#[derive(Default)]
pub struct InMemoryPartnerRepository {
    partners: RwLock<HashMap<String, ProductPartner>>,
}

#[async_trait::async_trait]
impl PartnerRepository for InMemoryPartnerRepository {
    async fn list_for_development(
        &self,
        development: &DevelopmentKey,
    ) -> Result<Vec<ProductPartner>, RepositoryError> {
        let partners = self.partners.read().await;
        let mut found: Vec<ProductPartner> = partners
            .values()
            .filter(|partner| &partner.development == development)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn save(&self, partner: ProductPartner) -> Result<(), RepositoryError> {
        let mut partners = self.partners.write().await;
        partners.insert(partner.id.0.clone(), partner);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDistributionWriter {
    rows: RwLock<HashMap<String, Vec<CommissionDistribution>>>,
}

#[async_trait::async_trait]
impl DistributionWriter for InMemoryDistributionWriter {
    async fn replace_all(
        &self,
        sale_id: &SaleId,
        rows: Vec<CommissionDistribution>,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.rows.write().await;
        stored.insert(sale_id.0.clone(), rows);
        Ok(())
    }

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<CommissionDistribution>, RepositoryError> {
        let stored = self.rows.read().await;
        Ok(stored.get(&sale_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryPartnerCommissionWriter {
    rows: RwLock<HashMap<String, Vec<PartnerCommission>>>,
}

#[async_trait::async_trait]
impl PartnerCommissionWriter for InMemoryPartnerCommissionWriter {
    async fn upsert(
        &self,
        sale_id: &SaleId,
        rows: Vec<PartnerCommission>,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.rows.write().await;
        let previous = stored.remove(&sale_id.0).unwrap_or_default();

        let mut next = rows;
        for row in &mut next {
            if let Some(earlier) = previous.iter().find(|p| p.partner_id == row.partner_id) {
                row.carry_collection_from(earlier);
            }
        }
        next.sort_by(|a, b| a.partner_id.cmp(&b.partner_id));

        stored.insert(sale_id.0.clone(), next);
        Ok(())
    }

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<PartnerCommission>, RepositoryError> {
        let stored = self.rows.read().await;
        Ok(stored.get(&sale_id.0).cloned().unwrap_or_default())
    }

    async fn update_collection(&self, row: &PartnerCommission) -> Result<(), RepositoryError> {
        let mut stored = self.rows.write().await;
        let existing = stored
            .get_mut(&row.sale_id.0)
            .and_then(|rows| rows.iter_mut().find(|r| r.partner_id == row.partner_id))
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))?;

        existing.carry_collection_from(row);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAdjustmentRepository {
    adjustments: RwLock<Vec<CommissionAdjustment>>,
}

#[async_trait::async_trait]
impl AdjustmentRepository for InMemoryAdjustmentRepository {
    async fn record(&self, adjustment: CommissionAdjustment) -> Result<(), RepositoryError> {
        self.adjustments.write().await.push(adjustment);
        Ok(())
    }

    async fn list_for_sale(
        &self,
        sale_id: &SaleId,
    ) -> Result<Vec<CommissionAdjustment>, RepositoryError> {
        let adjustments = self.adjustments.read().await;
        Ok(adjustments.iter().filter(|a| &a.sale_id == sale_id).cloned().collect())
    }
}
