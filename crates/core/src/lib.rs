pub mod audit;
pub mod commission;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ingest;

pub use commission::adjustments::{apply_override, OverrideRequest};
pub use commission::distributor::{
    DeterministicPhaseDistributor, DistributionInput, PhaseDistribution, PhaseDistributor,
    SaleRolePercents,
};
pub use commission::partners::{
    DeterministicPartnerSplitter, PartnerSplit, PartnerSplitInput, PartnerSplitter, PhaseAmounts,
};
pub use commission::period::{PeriodKey, PeriodResolution};
pub use commission::rules::{
    DeterministicRuleEngine, RuleEngine, RuleEvaluation, RuleEvaluationInput, SkipReason,
};
pub use commission::units::{PrefetchedUnitCounts, SaleBook, SaleLookup, UnitCounter, UnitSource};
pub use commission::validator::{
    ConfigValidation, ConfigValidationInput, ConfigValidator, ConfigViolation,
    DeterministicConfigValidator,
};
pub use commission::{
    CalculationInput, CalculationSettings, CommissionCalculation, CommissionCalculator,
    CommissionTotals, DefaultCommissionCalculator, DeterministicCommissionCalculator, FreezePolicy,
};
pub use domain::adjustment::{AdjustmentId, CommissionAdjustment};
pub use domain::commission_config::{CommissionConfig, GlobalRoles, OptionalRole};
pub use domain::development::{DevelopmentCatalog, DevelopmentKey};
pub use domain::distribution::{
    CommissionDistribution, CommissionPhase, CommissionRole, PaymentStatus,
};
pub use domain::partner::{
    CollectionState, PartnerCommission, PartnerId, PhaseCollection, ProductPartner,
};
pub use domain::rule::{CommissionRule, PeriodType, RuleId, ThresholdOperator};
pub use domain::sale::{CommissionSale, FrozenCalculation, SaleId};
pub use errors::{ApplicationError, DomainError};
pub use ingest::SaleRecordMapper;
