//! Persistence-facing orchestration of the commission engine: loads every
//! collaborator for a sale, runs the pure calculator and writes the results.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use brokerage_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use brokerage_core::commission::adjustments::{apply_override, OverrideRequest};
use brokerage_core::commission::rules::required_periods;
use brokerage_core::commission::units::PrefetchedUnitCounts;
use brokerage_core::commission::{
    CalculationInput, CalculationSettings, CommissionCalculation, CommissionCalculator,
    DefaultCommissionCalculator, FreezePolicy,
};
use brokerage_core::domain::adjustment::CommissionAdjustment;
use brokerage_core::domain::commission_config::CommissionConfig;
use brokerage_core::domain::development::DevelopmentCatalog;
use brokerage_core::domain::distribution::{CommissionDistribution, CommissionPhase};
use brokerage_core::domain::partner::{CollectionState, PartnerCommission, PartnerId};
use brokerage_core::domain::sale::SaleId;
use brokerage_core::errors::{ApplicationError, DomainError};
use brokerage_core::ingest::SaleRecordMapper;

use crate::repositories::{
    AdjustmentRepository, ConfigRepository, DistributionWriter, InMemoryAdjustmentRepository,
    InMemoryConfigRepository, InMemoryDistributionWriter, InMemoryPartnerCommissionWriter,
    InMemoryPartnerRepository, InMemoryRuleRepository, InMemorySaleRepository,
    PartnerCommissionWriter, PartnerRepository, RepositoryError, RuleRepository, SaleRepository,
    SqlAdjustmentRepository, SqlConfigRepository, SqlDistributionWriter,
    SqlPartnerCommissionWriter, SqlPartnerRepository, SqlRuleRepository, SqlSaleRepository,
};
use crate::DbPool;

const ACTOR: &str = "recalculation-service";

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Rejected(domain) => Self::Domain(domain),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Repositories {
    pub configs: Arc<dyn ConfigRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub sales: Arc<dyn SaleRepository>,
    pub partners: Arc<dyn PartnerRepository>,
    pub distributions: Arc<dyn DistributionWriter>,
    pub partner_commissions: Arc<dyn PartnerCommissionWriter>,
    pub adjustments: Arc<dyn AdjustmentRepository>,
}

impl Repositories {
    /// `catalog` canonicalizes developments stored through the sale repository.
    pub fn sqlite(pool: DbPool, catalog: DevelopmentCatalog) -> Self {
        Self {
            configs: Arc::new(SqlConfigRepository::new(pool.clone())),
            rules: Arc::new(SqlRuleRepository::new(pool.clone())),
            sales: Arc::new(SqlSaleRepository::with_catalog(pool.clone(), catalog)),
            partners: Arc::new(SqlPartnerRepository::new(pool.clone())),
            distributions: Arc::new(SqlDistributionWriter::new(pool.clone())),
            partner_commissions: Arc::new(SqlPartnerCommissionWriter::new(pool.clone())),
            adjustments: Arc::new(SqlAdjustmentRepository::new(pool)),
        }
    }

    pub fn in_memory(catalog: DevelopmentCatalog) -> Self {
        Self {
            configs: Arc::new(InMemoryConfigRepository::default()),
            rules: Arc::new(InMemoryRuleRepository::default()),
            sales: Arc::new(InMemorySaleRepository::new(catalog)),
            partners: Arc::new(InMemoryPartnerRepository::default()),
            distributions: Arc::new(InMemoryDistributionWriter::default()),
            partner_commissions: Arc::new(InMemoryPartnerCommissionWriter::default()),
            adjustments: Arc::new(InMemoryAdjustmentRepository::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaleOutcome {
    Recalculated { rows: usize, bonus_rules: usize, partners: usize },
    Skipped { reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Empty means every stored sale.
    pub sale_ids: Vec<SaleId>,
    pub freeze_policy: FreezePolicy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMessage {
    pub sale_id: SaleId,
    pub outcome: AuditOutcome,
    pub error_class: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub correlation_id: String,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub messages: Vec<BatchMessage>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct RecalculationService {
    repositories: Repositories,
    catalog: DevelopmentCatalog,
    settings: CalculationSettings,
    calculator: Arc<dyn CommissionCalculator>,
    audit: Arc<dyn AuditSink>,
    sale_locks: Mutex<HashMap<SaleId, Arc<Mutex<()>>>>,
}

impl RecalculationService {
    pub fn new(
        repositories: Repositories,
        catalog: DevelopmentCatalog,
        settings: CalculationSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            repositories,
            catalog,
            settings,
            calculator: Arc::new(DefaultCommissionCalculator::default()),
            audit,
            sale_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn CommissionCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn catalog(&self) -> &DevelopmentCatalog {
        &self.catalog
    }

    async fn lock_sale(&self, sale_id: &SaleId) -> Arc<Mutex<()>> {
        let mut locks = self.sale_locks.lock().await;
        locks.entry(sale_id.clone()).or_default().clone()
    }

    /// Drops the sale's lock entry once no other caller holds or awaits it.
    /// `lock` must be the caller's handle from [`Self::lock_sale`], already
    /// unlocked.
    async fn release_sale(&self, sale_id: &SaleId, lock: Arc<Mutex<()>>) {
        let mut locks = self.sale_locks.lock().await;
        drop(lock);
        if locks.get(sale_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(sale_id);
        }
    }

    /// Saves a configuration under its canonical development key. Rejections
    /// are audited with their violation count.
    pub async fn save_config(&self, mut config: CommissionConfig) -> Result<(), ApplicationError> {
        config.development = self.catalog.canonicalize(config.development.as_str());
        let development = config.development.clone();

        match self.repositories.configs.save(config).await {
            Ok(()) => {
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        Uuid::new_v4().to_string(),
                        "commission.config.saved",
                        AuditCategory::Configuration,
                        ACTOR,
                        AuditOutcome::Success,
                    )
                    .with_metadata("development", development.as_str()),
                );
                Ok(())
            }
            Err(error) => {
                let error = ApplicationError::from(error);
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        Uuid::new_v4().to_string(),
                        "commission.config.rejected",
                        AuditCategory::Configuration,
                        ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("development", development.as_str())
                    .with_metadata("error_class", error.error_class())
                    .with_metadata("violations", violation_count(&error).to_string()),
                );
                Err(error)
            }
        }
    }

    /// Maps an upstream CRM record and stores it as a sale. A sale that was
    /// already calculated keeps its frozen percents.
    pub async fn ingest_record(
        &self,
        record: &Map<String, Value>,
    ) -> Result<SaleId, ApplicationError> {
        let sale = SaleRecordMapper::new(self.catalog.clone()).map(record)?;
        let sale_id = sale.id.clone();

        let lock = self.lock_sale(&sale_id).await;
        let saved = {
            let _guard = lock.lock().await;
            self.repositories.sales.save(sale).await
        };
        self.release_sale(&sale_id, lock).await;

        saved?;
        Ok(sale_id)
    }

    pub async fn recalculate_sale(
        &self,
        sale_id: &SaleId,
        freeze_policy: FreezePolicy,
    ) -> Result<SaleOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.recalculate_one(sale_id, freeze_policy, &correlation_id, Utc::now()).await
    }

    async fn recalculate_one(
        &self,
        sale_id: &SaleId,
        freeze_policy: FreezePolicy,
        correlation_id: &str,
        calculated_at: DateTime<Utc>,
    ) -> Result<SaleOutcome, ApplicationError> {
        let lock = self.lock_sale(sale_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.recalculate_locked(sale_id, freeze_policy, correlation_id, calculated_at).await
        };
        self.release_sale(sale_id, lock).await;
        outcome
    }

    async fn recalculate_locked(
        &self,
        sale_id: &SaleId,
        freeze_policy: FreezePolicy,
        correlation_id: &str,
        calculated_at: DateTime<Utc>,
    ) -> Result<SaleOutcome, ApplicationError> {
        let mut sale = self
            .repositories
            .sales
            .find_by_id(sale_id)
            .await?
            .ok_or_else(|| DomainError::not_found("sale", sale_id.0.clone()))?;
        sale.development = self.catalog.canonicalize(sale.development.as_str());

        if sale.total_value <= Decimal::ZERO {
            let reason = format!("total value {} is not positive", sale.total_value);
            self.audit.emit(
                AuditEvent::new(
                    Some(sale_id.clone()),
                    correlation_id,
                    "commission.sale.skipped",
                    AuditCategory::Calculation,
                    ACTOR,
                    AuditOutcome::Skipped,
                )
                .with_metadata("reason", reason.clone()),
            );
            return Ok(SaleOutcome::Skipped { reason });
        }

        let development = sale.development.clone();
        let config = self
            .repositories
            .configs
            .get(&development)
            .await?
            .ok_or_else(|| DomainError::not_found("commission config", development.as_str()))?;
        let global_roles = self.repositories.configs.global_roles().await?;
        let rules = self.repositories.rules.list_active(&development).await?;
        let partners = self.repositories.partners.list_for_development(&development).await?;

        let as_of = calculated_at.date_naive();
        let mut units = PrefetchedUnitCounts::default();
        for period in required_periods(&development, &rules, sale.signed_on) {
            let count =
                self.repositories.sales.count_in_period(&development, &period, as_of).await?;
            units.insert(development.clone(), period, count);
        }

        let calculation = self.calculator.calculate(
            CalculationInput {
                sale: &sale,
                config: &config,
                global_roles: &global_roles,
                rules: &rules,
                partners: &partners,
                settings: self.settings,
                freeze_policy,
                calculated_at,
            },
            &units,
        )?;

        let outcome = self.persist(calculation).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(sale_id.clone()),
                correlation_id,
                "commission.sale.recalculated",
                AuditCategory::Calculation,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("freeze_policy", freeze_policy_name(freeze_policy)),
        );
        Ok(outcome)
    }

    /// The sale carrying its frozen percents is written last, so a failed
    /// row write leaves the sale as it was and a retry recomputes everything.
    async fn persist(
        &self,
        calculation: CommissionCalculation,
    ) -> Result<SaleOutcome, ApplicationError> {
        let CommissionCalculation { sale, mut distributions, rule_evaluation, partner_split, .. } =
            calculation;
        let sale_id = sale.id.clone();
        let outcome = SaleOutcome::Recalculated {
            rows: distributions.len(),
            bonus_rules: rule_evaluation.applicable.len(),
            partners: partner_split.commissions.len(),
        };

        let previous = self.repositories.distributions.list_for_sale(&sale_id).await?;
        for row in &mut distributions {
            if let Some(earlier) = previous.iter().find(|earlier| earlier.same_payout(row)) {
                row.carry_payment_from(earlier);
            }
        }

        self.repositories.distributions.replace_all(&sale_id, distributions).await?;
        self.repositories.partner_commissions.upsert(&sale_id, partner_split.commissions).await?;
        self.repositories.sales.save(sale).await?;
        Ok(outcome)
    }

    /// Recalculates every requested sale independently. A failing sale is
    /// reported in the summary and never stops the batch.
    pub async fn recalculate_batch(
        &self,
        request: BatchRequest,
    ) -> Result<BatchSummary, ApplicationError> {
        let sale_ids = if request.sale_ids.is_empty() {
            self.repositories.sales.list_ids().await?
        } else {
            request.sale_ids
        };

        let correlation_id = Uuid::new_v4().to_string();
        let calculated_at = Utc::now();
        let mut summary =
            BatchSummary { correlation_id: correlation_id.clone(), ..BatchSummary::default() };

        for sale_id in sale_ids {
            match self
                .recalculate_one(&sale_id, request.freeze_policy, &correlation_id, calculated_at)
                .await
            {
                Ok(SaleOutcome::Recalculated { rows, .. }) => {
                    summary.processed += 1;
                    summary.messages.push(BatchMessage {
                        sale_id,
                        outcome: AuditOutcome::Success,
                        error_class: None,
                        message: format!("{rows} distribution rows written"),
                    });
                }
                Ok(SaleOutcome::Skipped { reason }) => {
                    summary.skipped += 1;
                    summary.messages.push(BatchMessage {
                        sale_id,
                        outcome: AuditOutcome::Skipped,
                        error_class: None,
                        message: reason,
                    });
                }
                Err(error) => {
                    warn!(
                        event_name = "commission.batch.sale_failed",
                        sale_id = %sale_id,
                        correlation_id = %correlation_id,
                        error_class = error.error_class(),
                        error = %error,
                        "sale recalculation failed"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            Some(sale_id.clone()),
                            correlation_id.as_str(),
                            "commission.sale.failed",
                            AuditCategory::Calculation,
                            ACTOR,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("error_class", error.error_class()),
                    );
                    summary.failed += 1;
                    summary.messages.push(BatchMessage {
                        sale_id,
                        outcome: AuditOutcome::Failed,
                        error_class: Some(error.error_class().to_string()),
                        message: error.to_string(),
                    });
                }
            }
        }

        info!(
            event_name = "commission.batch.completed",
            correlation_id = %correlation_id,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "commission batch completed"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id.as_str(),
                "commission.batch.completed",
                AuditCategory::Batch,
                ACTOR,
                if summary.has_failures() { AuditOutcome::Failed } else { AuditOutcome::Success },
            )
            .with_metadata("processed", summary.processed.to_string())
            .with_metadata("skipped", summary.skipped.to_string())
            .with_metadata("failed", summary.failed.to_string()),
        );

        Ok(summary)
    }

    /// Overrides the distribution row at `position` (as listed for the sale)
    /// and records the adjustment.
    pub async fn override_distribution(
        &self,
        sale_id: &SaleId,
        position: usize,
        request: OverrideRequest,
    ) -> Result<CommissionAdjustment, ApplicationError> {
        let lock = self.lock_sale(sale_id).await;
        let adjustment = {
            let _guard = lock.lock().await;
            self.override_locked(sale_id, position, request).await
        };
        self.release_sale(sale_id, lock).await;
        adjustment
    }

    async fn override_locked(
        &self,
        sale_id: &SaleId,
        position: usize,
        request: OverrideRequest,
    ) -> Result<CommissionAdjustment, ApplicationError> {
        let mut rows = self.repositories.distributions.list_for_sale(sale_id).await?;
        let current = rows.get(position).ok_or_else(|| {
            DomainError::not_found("distribution", format!("{sale_id}#{position}"))
        })?;

        let (adjusted, adjustment) = apply_override(current, &request)?;
        rows[position] = adjusted;
        self.repositories.distributions.replace_all(sale_id, rows).await?;
        self.repositories.adjustments.record(adjustment.clone()).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(sale_id.clone()),
                adjustment.id.0.as_str(),
                "commission.distribution.adjusted",
                AuditCategory::Adjustment,
                request.adjusted_by.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("phase", adjustment.phase.as_str())
            .with_metadata("old_amount", adjustment.old_amount.to_string())
            .with_metadata("new_amount", adjustment.new_amount.to_string()),
        );
        Ok(adjustment)
    }

    /// Marks the distribution row at `position` as paid. Paid rows can no
    /// longer be overridden.
    pub async fn mark_distribution_paid(
        &self,
        sale_id: &SaleId,
        position: usize,
        at: DateTime<Utc>,
    ) -> Result<CommissionDistribution, ApplicationError> {
        let lock = self.lock_sale(sale_id).await;
        let paid = {
            let _guard = lock.lock().await;
            self.mark_paid_locked(sale_id, position, at).await
        };
        self.release_sale(sale_id, lock).await;
        paid
    }

    async fn mark_paid_locked(
        &self,
        sale_id: &SaleId,
        position: usize,
        at: DateTime<Utc>,
    ) -> Result<CommissionDistribution, ApplicationError> {
        let mut rows = self.repositories.distributions.list_for_sale(sale_id).await?;
        let row = rows.get_mut(position).ok_or_else(|| {
            DomainError::not_found("distribution", format!("{sale_id}#{position}"))
        })?;
        row.mark_paid(at)?;
        let paid = row.clone();
        self.repositories.distributions.replace_all(sale_id, rows).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(sale_id.clone()),
                Uuid::new_v4().to_string(),
                "commission.distribution.paid",
                AuditCategory::Adjustment,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("position", position.to_string())
            .with_metadata("role", paid.role.as_str())
            .with_metadata("amount", paid.amount.to_string()),
        );
        Ok(paid)
    }

    pub async fn set_partner_collection_state(
        &self,
        sale_id: &SaleId,
        partner_id: &PartnerId,
        phase: CommissionPhase,
        state: CollectionState,
        at: DateTime<Utc>,
    ) -> Result<PartnerCommission, ApplicationError> {
        let lock = self.lock_sale(sale_id).await;
        let row = {
            let _guard = lock.lock().await;
            self.collection_locked(sale_id, partner_id, phase, state, at).await
        };
        self.release_sale(sale_id, lock).await;
        row
    }

    async fn collection_locked(
        &self,
        sale_id: &SaleId,
        partner_id: &PartnerId,
        phase: CommissionPhase,
        state: CollectionState,
        at: DateTime<Utc>,
    ) -> Result<PartnerCommission, ApplicationError> {
        let mut row = self
            .repositories
            .partner_commissions
            .list_for_sale(sale_id)
            .await?
            .into_iter()
            .find(|row| &row.partner_id == partner_id)
            .ok_or_else(|| {
                DomainError::not_found("partner commission", format!("{sale_id}/{partner_id}"))
            })?;

        row.set_collection_state(phase, state, at)?;
        self.repositories.partner_commissions.update_collection(&row).await?;
        Ok(row)
    }
}

fn violation_count(error: &ApplicationError) -> usize {
    match error {
        ApplicationError::Domain(domain) => domain.violations().len(),
        _ => 0,
    }
}

fn freeze_policy_name(policy: FreezePolicy) -> &'static str {
    match policy {
        FreezePolicy::KeepFrozen => "keep_frozen",
        FreezePolicy::Refresh => "refresh",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use brokerage_core::audit::{AuditOutcome, InMemoryAuditSink};
    use brokerage_core::commission::adjustments::OverrideRequest;
    use brokerage_core::commission::{CalculationSettings, FreezePolicy};
    use brokerage_core::domain::commission_config::{CommissionConfig, GlobalRoles, OptionalRole};
    use brokerage_core::domain::development::{DevelopmentCatalog, DevelopmentKey};
    use brokerage_core::domain::distribution::{
        CommissionDistribution, CommissionPhase, CommissionRole, PaymentStatus,
    };
    use brokerage_core::domain::partner::{CollectionState, PartnerId, ProductPartner};
    use brokerage_core::domain::rule::{CommissionRule, PeriodType, RuleId, ThresholdOperator};
    use brokerage_core::domain::sale::{CommissionSale, SaleId};
    use brokerage_core::errors::{ApplicationError, DomainError};

    use super::{BatchRequest, RecalculationService, Repositories, SaleOutcome};
    use crate::repositories::{
        AdjustmentRepository, ConfigRepository, DistributionWriter, PartnerCommissionWriter,
        PartnerRepository, RepositoryError, RuleRepository, SaleRepository,
    };

    struct UnavailableDistributionWriter;

    #[async_trait]
    impl DistributionWriter for UnavailableDistributionWriter {
        async fn replace_all(
            &self,
            _sale_id: &SaleId,
            _rows: Vec<CommissionDistribution>,
        ) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("distribution store unavailable".to_string()))
        }

        async fn list_for_sale(
            &self,
            _sale_id: &SaleId,
        ) -> Result<Vec<CommissionDistribution>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    fn merida() -> DevelopmentKey {
        DevelopmentKey("merida".to_string())
    }

    fn config() -> CommissionConfig {
        CommissionConfig {
            development: merida(),
            phase_sale_percent: dec("70"),
            phase_post_sale_percent: dec("30"),
            sale_pool_percent: None,
            sale_manager_percent: dec("60"),
            deal_owner_percent: dec("40"),
            external_advisor_percent: Some(dec("10")),
            customer_service: OptionalRole::disabled(),
            deliveries: OptionalRole::disabled(),
            bonds: OptionalRole::disabled(),
        }
    }

    fn sale(id: &str, development: &str, total_value: &str) -> CommissionSale {
        CommissionSale {
            id: SaleId(id.to_string()),
            development: DevelopmentKey(development.to_string()),
            total_value: dec(total_value),
            signed_on: NaiveDate::from_ymd_opt(2025, 2, 10).expect("valid date"),
            owner: "ana.lopez".to_string(),
            external_advisor: None,
            term_months: Some(12),
            square_meters: None,
            calculation: None,
        }
    }

    fn quarterly_rule(id: &str, unit_threshold: u32) -> CommissionRule {
        CommissionRule {
            id: RuleId(id.to_string()),
            development: merida(),
            name: format!("{unit_threshold} units in Q1"),
            period_type: PeriodType::Quarter,
            period_value: "2025".to_string(),
            operator: ThresholdOperator::AtLeast,
            unit_threshold,
            commission_percent: dec("1"),
            vat_percent: dec("16"),
            active: true,
            priority: 1,
        }
    }

    async fn seeded_repositories() -> Repositories {
        let repositories = Repositories::in_memory(DevelopmentCatalog::default());
        repositories.configs.save_global_roles(GlobalRoles::default()).await.expect("roles");
        repositories.configs.save(config()).await.expect("config");
        repositories
            .partners
            .save(ProductPartner {
                id: PartnerId("P-1".to_string()),
                development: merida(),
                name: "Fondo Peninsular".to_string(),
                participation_percent: dec("50"),
                active: true,
            })
            .await
            .expect("partner");
        repositories.rules.save(quarterly_rule("R-1", 2)).await.expect("rule");

        for sale in [
            sale("S-1", "merida", "1000000"),
            sale("S-2", "merida", "0"),
            sale("S-3", "playa", "500000"),
            sale("S-4", "merida yucatan", "2000000"),
        ] {
            repositories.sales.save(sale).await.expect("sale");
        }
        repositories
    }

    fn service_over(repositories: Repositories) -> (RecalculationService, InMemoryAuditSink) {
        let audit = InMemoryAuditSink::default();
        let service = RecalculationService::new(
            repositories,
            DevelopmentCatalog::default(),
            CalculationSettings::default(),
            Arc::new(audit.clone()),
        );
        (service, audit)
    }

    async fn service() -> (RecalculationService, InMemoryAuditSink) {
        service_over(seeded_repositories().await)
    }

    #[tokio::test]
    async fn batch_keeps_going_past_failures_and_reports_them() {
        let (service, audit) = service().await;

        let summary =
            service.recalculate_batch(BatchRequest::default()).await.expect("batch summary");

        assert_eq!((summary.processed, summary.skipped, summary.failed), (2, 1, 1));
        let failed = summary
            .messages
            .iter()
            .find(|message| message.outcome == AuditOutcome::Failed)
            .expect("failed message");
        assert_eq!(failed.sale_id, SaleId("S-3".to_string()));
        assert_eq!(failed.error_class.as_deref(), Some("not_found"));

        let rows = service
            .repositories()
            .distributions
            .list_for_sale(&SaleId("S-1".to_string()))
            .await
            .expect("rows");
        let owner = rows.iter().find(|row| row.role == CommissionRole::DealOwner).expect("owner");
        assert_eq!(owner.amount, dec("308000.00"));
        let bonus = rows.iter().find(|row| row.phase == CommissionPhase::Bonus).expect("bonus");
        assert_eq!(bonus.amount, dec("10000.00"));

        let stored = service
            .repositories()
            .sales
            .find_by_id(&SaleId("S-4".to_string()))
            .await
            .expect("find")
            .expect("sale");
        assert_eq!(stored.development, merida());
        assert!(stored.is_calculated());

        let events = audit.events();
        assert!(events.iter().all(|event| event.correlation_id == summary.correlation_id));
        assert_eq!(events.last().map(|event| event.outcome), Some(AuditOutcome::Failed));
    }

    #[tokio::test]
    async fn recalculating_twice_writes_identical_rows() {
        let (service, _) = service().await;
        let sale_id = SaleId("S-1".to_string());

        service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("first run");
        let first =
            service.repositories().distributions.list_for_sale(&sale_id).await.expect("rows");
        let outcome =
            service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("second run");
        let second =
            service.repositories().distributions.list_for_sale(&sale_id).await.expect("rows");

        assert!(matches!(outcome, SaleOutcome::Recalculated { partners: 1, .. }));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn overrides_are_recorded_and_paid_rows_stay_locked() {
        let (service, _) = service().await;
        let sale_id = SaleId("S-1".to_string());
        service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("recalculate");

        let request = OverrideRequest {
            new_percent: Some(dec("50")),
            new_role: None,
            reason: "manager agreement".to_string(),
            adjusted_by: "finance".to_string(),
            adjusted_at: Utc::now(),
        };
        let adjustment =
            service.override_distribution(&sale_id, 0, request.clone()).await.expect("override");

        assert_eq!(adjustment.new_percent, dec("50"));
        let rows =
            service.repositories().distributions.list_for_sale(&sale_id).await.expect("rows");
        assert_eq!(rows[0].amount, adjustment.new_amount);
        assert_eq!(
            service.repositories().adjustments.list_for_sale(&sale_id).await.expect("history"),
            vec![adjustment]
        );

        let missing = service.override_distribution(&sale_id, 99, request).await;
        assert!(matches!(missing, Err(ApplicationError::Domain(_))));
    }

    #[tokio::test]
    async fn partner_collection_survives_recalculation() {
        let (service, _) = service().await;
        let sale_id = SaleId("S-1".to_string());
        let partner_id = PartnerId("P-1".to_string());
        service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("recalculate");

        service
            .set_partner_collection_state(
                &sale_id,
                &partner_id,
                CommissionPhase::Sale,
                CollectionState::Collected,
                Utc::now(),
            )
            .await
            .expect("collect");
        service.recalculate_sale(&sale_id, FreezePolicy::Refresh).await.expect("refresh");

        let rows =
            service.repositories().partner_commissions.list_for_sale(&sale_id).await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sale_phase.state, CollectionState::Collected);
        assert_eq!(rows[0].total_amount, dec("500000.00"));
    }

    #[tokio::test]
    async fn rejected_config_saves_are_audited() {
        let (service, audit) = service().await;
        let broken = CommissionConfig { sale_manager_percent: dec("0"), ..config() };

        let error = service.save_config(broken).await.expect_err("invalid config");

        assert_eq!(error.error_class(), "validation");
        let event = audit.events().pop().expect("audit event");
        assert_eq!(event.outcome, AuditOutcome::Rejected);
        assert_eq!(event.metadata.get("violations").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn ingested_records_are_stored_under_the_canonical_development() {
        let (service, _) = service().await;
        let record = json!({
            "id": "CRM-77",
            "desarrollo": "Mérida Yucatán",
            "valor_total": "1,250,000.00",
            "fecha_firma": "2025-03-02",
            "propietario": "luis.perez",
        });
        let record = record.as_object().expect("object record");

        let sale_id = service.ingest_record(record).await.expect("ingest");
        let sale = service
            .repositories()
            .sales
            .find_by_id(&sale_id)
            .await
            .expect("find")
            .expect("stored sale");

        assert_eq!(sale.development, merida());
        assert_eq!(sale.total_value, dec("1250000.00"));
    }

    #[tokio::test]
    async fn resynced_sales_keep_frozen_percents_after_config_edits() {
        let (service, _) = service().await;
        let record = json!({
            "id": "V-1",
            "desarrollo": "Mérida",
            "valor_total": "1,000,000.00",
            "fecha_firma": "2025-03-02",
            "propietario": "luis.perez",
        });
        let record = record.as_object().expect("object record");
        let sale_id = service.ingest_record(record).await.expect("ingest");
        service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("first run");

        let edited = CommissionConfig {
            phase_sale_percent: dec("80"),
            phase_post_sale_percent: dec("20"),
            ..config()
        };
        service.save_config(edited).await.expect("edit config");
        service.ingest_record(record).await.expect("re-ingest");
        service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("second run");

        let stored = service
            .repositories()
            .sales
            .find_by_id(&sale_id)
            .await
            .expect("find")
            .expect("stored sale");
        let frozen = stored.calculation.expect("frozen percents");
        assert_eq!(frozen.phase_sale_percent, dec("70"));
        let rows =
            service.repositories().distributions.list_for_sale(&sale_id).await.expect("rows");
        let manager =
            rows.iter().find(|row| row.role == CommissionRole::SaleManager).expect("manager");
        assert_eq!(manager.base_amount, dec("700000.00"));
    }

    #[tokio::test]
    async fn alias_spelled_sales_count_toward_volume_rules_before_recalculation() {
        let repositories = seeded_repositories().await;
        repositories.rules.save(quarterly_rule("R-3", 3)).await.expect("rule");
        let (service, _) = service_over(repositories);

        let outcome = service
            .recalculate_sale(&SaleId("S-1".to_string()), FreezePolicy::KeepFrozen)
            .await
            .expect("recalculate");

        assert!(matches!(outcome, SaleOutcome::Recalculated { bonus_rules: 2, .. }));
    }

    #[tokio::test]
    async fn failed_row_writes_leave_the_sale_unfrozen() {
        let mut repositories = seeded_repositories().await;
        repositories.distributions = Arc::new(UnavailableDistributionWriter);
        let (service, _) = service_over(repositories);
        let sale_id = SaleId("S-1".to_string());

        let error = service
            .recalculate_sale(&sale_id, FreezePolicy::KeepFrozen)
            .await
            .expect_err("distribution write fails");

        assert_eq!(error.error_class(), "persistence");
        let stored = service
            .repositories()
            .sales
            .find_by_id(&sale_id)
            .await
            .expect("find")
            .expect("stored sale");
        assert!(!stored.is_calculated());
        let partners =
            service.repositories().partner_commissions.list_for_sale(&sale_id).await.expect("rows");
        assert!(partners.is_empty());
    }

    #[tokio::test]
    async fn paid_rows_survive_recalculation_and_refuse_overrides() {
        let (service, audit) = service().await;
        let sale_id = SaleId("S-1".to_string());
        service.recalculate_sale(&sale_id, FreezePolicy::KeepFrozen).await.expect("recalculate");

        let paid = service.mark_distribution_paid(&sale_id, 0, Utc::now()).await.expect("pay");
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(
            audit.events().last().map(|event| event.event_type.as_str()),
            Some("commission.distribution.paid")
        );

        let twice = service.mark_distribution_paid(&sale_id, 0, Utc::now()).await;
        assert!(matches!(
            twice,
            Err(ApplicationError::Domain(DomainError::InvalidTransition { .. }))
        ));
        let request = OverrideRequest {
            new_percent: Some(dec("50")),
            new_role: None,
            reason: "late agreement".to_string(),
            adjusted_by: "finance".to_string(),
            adjusted_at: Utc::now(),
        };
        let locked = service.override_distribution(&sale_id, 0, request).await;
        assert_eq!(locked.map_err(|error| error.error_class()).err(), Some("invalid_transition"));

        service.recalculate_sale(&sale_id, FreezePolicy::Refresh).await.expect("refresh");
        let rows =
            service.repositories().distributions.list_for_sale(&sale_id).await.expect("rows");
        let still_paid = rows.iter().find(|row| row.same_payout(&paid)).expect("same payout");
        assert_eq!(still_paid.payment_status, PaymentStatus::Paid);
        assert_eq!(still_paid.paid_at, paid.paid_at);
    }

    #[tokio::test]
    async fn sale_locks_are_released_after_each_operation() {
        let (service, _) = service().await;
        let sale_id = SaleId("S-1".to_string());

        service.recalculate_batch(BatchRequest::default()).await.expect("batch");
        service.mark_distribution_paid(&sale_id, 0, Utc::now()).await.expect("pay");
        let _ = service.mark_distribution_paid(&SaleId("missing".to_string()), 0, Utc::now()).await;

        assert!(service.sale_locks.lock().await.is_empty());
    }
}
