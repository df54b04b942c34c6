use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::development::DevelopmentKey;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Quarter,
    Month,
    Year,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl FromStr for PeriodType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quarter" | "trimestre" => Ok(Self::Quarter),
            "month" | "mes" => Ok(Self::Month),
            "year" | "anio" | "año" => Ok(Self::Year),
            other => Err(DomainError::InvalidRecord(format!("unknown period type `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = "<=")]
    AtMost,
}

impl ThresholdOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::AtLeast => ">=",
            Self::AtMost => "<=",
        }
    }

    pub fn holds(&self, count: u32, threshold: u32) -> bool {
        match self {
            Self::Equal => count == threshold,
            Self::AtLeast => count >= threshold,
            Self::AtMost => count <= threshold,
        }
    }
}

impl FromStr for ThresholdOperator {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "=" | "==" => Ok(Self::Equal),
            ">=" => Ok(Self::AtLeast),
            "<=" => Ok(Self::AtMost),
            other => Err(DomainError::InvalidRecord(format!("unknown rule operator `{other}`"))),
        }
    }
}

/// Period-scoped bonus rule. Every rule whose threshold holds applies;
/// `priority` only orders the result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: RuleId,
    pub development: DevelopmentKey,
    pub name: String,
    pub period_type: PeriodType,
    pub period_value: String,
    pub operator: ThresholdOperator,
    pub unit_threshold: u32,
    pub commission_percent: Decimal,
    pub vat_percent: Decimal,
    pub active: bool,
    pub priority: i32,
}
