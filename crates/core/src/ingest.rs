//! Boundary mapping from untyped upstream sale records to [`CommissionSale`].
//!
//! Upstream records have used several field names for the same value over
//! time. Each field has one ordered candidate list; the first candidate that
//! is present and non-empty wins.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::domain::development::DevelopmentCatalog;
use crate::domain::sale::{CommissionSale, SaleId};
use crate::errors::DomainError;

pub const SALE_ID_FIELDS: &[&str] = &["id", "sale_id", "id_venta"];
pub const DEVELOPMENT_FIELDS: &[&str] = &["development", "desarrollo", "proyecto"];
pub const TOTAL_VALUE_FIELDS: &[&str] = &["total_value", "valor_total", "precio_total", "amount"];
pub const SIGNING_DATE_FIELDS: &[&str] =
    &["signed_on", "fecha_firma", "signing_date", "closing_date"];
pub const OWNER_FIELDS: &[&str] = &["owner", "propietario", "deal_owner"];
pub const EXTERNAL_ADVISOR_FIELDS: &[&str] = &["external_advisor", "asesor_externo"];
pub const TERM_MONTHS_FIELDS: &[&str] = &["term_months", "plazo_meses", "plazo"];
pub const SQUARE_METERS_FIELDS: &[&str] = &["square_meters", "m2", "metros_cuadrados"];

/// First candidate present with a non-null, non-blank value.
pub fn first_present<'r>(
    record: &'r Map<String, Value>,
    candidates: &[&'static str],
) -> Option<(&'static str, &'r Value)> {
    candidates.iter().find_map(|name| match record.get(*name) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(value) => Some((*name, value)),
    })
}

#[derive(Clone, Debug, Default)]
pub struct SaleRecordMapper {
    catalog: DevelopmentCatalog,
}

impl SaleRecordMapper {
    pub fn new(catalog: DevelopmentCatalog) -> Self {
        Self { catalog }
    }

    pub fn map(&self, record: &Map<String, Value>) -> Result<CommissionSale, DomainError> {
        let id = required_text(record, SALE_ID_FIELDS)?;
        let development = required_text(record, DEVELOPMENT_FIELDS)?;
        let total_value = required(record, TOTAL_VALUE_FIELDS, parse_decimal)?;
        let signed_on = required(record, SIGNING_DATE_FIELDS, parse_date)?;
        let owner = required_text(record, OWNER_FIELDS)?;

        let external_advisor = optional(record, EXTERNAL_ADVISOR_FIELDS, text_value)?;
        let term_months = optional(record, TERM_MONTHS_FIELDS, parse_months)?;
        let square_meters = optional(record, SQUARE_METERS_FIELDS, parse_decimal)?;

        Ok(CommissionSale {
            id: SaleId(id),
            development: self.catalog.canonicalize(&development),
            total_value,
            signed_on,
            owner,
            external_advisor,
            term_months,
            square_meters,
            calculation: None,
        })
    }
}

fn required<T>(
    record: &Map<String, Value>,
    candidates: &[&'static str],
    parse: fn(&Value) -> Option<T>,
) -> Result<T, DomainError> {
    let (field, value) = first_present(record, candidates).ok_or_else(|| {
        DomainError::InvalidRecord(format!("missing field, tried {}", candidates.join(", ")))
    })?;
    parse(value).ok_or_else(|| invalid(field, value))
}

fn optional<T>(
    record: &Map<String, Value>,
    candidates: &[&'static str],
    parse: fn(&Value) -> Option<T>,
) -> Result<Option<T>, DomainError> {
    match first_present(record, candidates) {
        None => Ok(None),
        Some((field, value)) => parse(value).map(Some).ok_or_else(|| invalid(field, value)),
    }
}

fn required_text(
    record: &Map<String, Value>,
    candidates: &[&'static str],
) -> Result<String, DomainError> {
    required(record, candidates, text_value)
}

fn invalid(field: &str, value: &Value) -> DomainError {
    DomainError::InvalidRecord(format!("field `{field}` has unreadable value {value}"))
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts JSON numbers and strings such as `"$1,250,000.00"` or `"18 meses"`.
fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .ok(),
        Value::String(text) => {
            let cleaned: String =
                text.trim().chars().filter(|c| !matches!(c, ',' | '$' | ' ')).collect();
            let end = cleaned
                .char_indices()
                .find(|(index, c)| !(c.is_ascii_digit() || *c == '.' || (*index == 0 && *c == '-')))
                .map(|(index, _)| index)
                .unwrap_or(cleaned.len());
            Decimal::from_str(&cleaned[..end]).ok()
        }
        _ => None,
    }
}

fn parse_months(value: &Value) -> Option<u32> {
    let months = parse_decimal(value)?;
    if months < Decimal::ZERO {
        return None;
    }
    months.trunc().to_u32()
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.date_naive());
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            text.get(..10).and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}
