//! Calendar windows for bonus rules.
//!
//! Quarterly rules store only a year; the quarter is taken from the sale's
//! signing date, so one rule covers whichever quarter the sale lands in.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::rule::{CommissionRule, PeriodType};
use crate::errors::DomainError;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 9999;

/// A concrete calendar window. Displays as `2025`, `2025-Q3` or `2025-08`
/// and parses back from the same text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeriodKey {
    Year(i32),
    Quarter { year: i32, quarter: u32 },
    Month { year: i32, month: u32 },
}

impl PeriodKey {
    pub fn year(year: i32) -> Result<Self, DomainError> {
        check_year(year)?;
        Ok(Self::Year(year))
    }

    pub fn quarter(year: i32, quarter: u32) -> Result<Self, DomainError> {
        check_year(year)?;
        if !(1..=4).contains(&quarter) {
            return Err(invalid_key(format!("quarter {quarter} is outside 1..=4")));
        }
        Ok(Self::Quarter { year, quarter })
    }

    pub fn month(year: i32, month: u32) -> Result<Self, DomainError> {
        check_year(year)?;
        if !(1..=12).contains(&month) {
            return Err(invalid_key(format!("month {month} is outside 1..=12")));
        }
        Ok(Self::Month { year, month })
    }

    /// The window of `period_type` that contains `date`.
    pub fn containing(period_type: PeriodType, date: NaiveDate) -> Self {
        match period_type {
            PeriodType::Year => Self::Year(date.year()),
            PeriodType::Quarter => Self::Quarter { year: date.year(), quarter: quarter_of(date) },
            PeriodType::Month => Self::Month { year: date.year(), month: date.month() },
        }
    }

    pub fn period_type(&self) -> PeriodType {
        match self {
            Self::Year(_) => PeriodType::Year,
            Self::Quarter { .. } => PeriodType::Quarter,
            Self::Month { .. } => PeriodType::Month,
        }
    }

    /// Inclusive first and last day of the window.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let (year, first_month, months) = match *self {
            Self::Year(year) => (year, 1, 12),
            Self::Quarter { year, quarter } => (year, (quarter - 1) * 3 + 1, 3),
            Self::Month { year, month } => (year, month, 1),
        };

        let start = NaiveDate::from_ymd_opt(year, first_month, 1)?;
        let end = start.checked_add_months(Months::new(months))?.pred_opt()?;
        Some((start, end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.window().map(|(start, end)| start <= date && date <= end).unwrap_or(false)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year:04}"),
            Self::Quarter { year, quarter } => write!(f, "{year:04}-Q{quarter}"),
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl FromStr for PeriodKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Some((year, rest)) = value.split_once('-') {
            let year = parse_year(year)?;
            return match rest.strip_prefix('Q').or_else(|| rest.strip_prefix('q')) {
                Some(quarter) => Self::quarter(year, parse_number(quarter)?),
                None => Self::month(year, parse_number(rest)?),
            };
        }

        Self::year(parse_year(value)?)
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeriodKey> for String {
    fn from(value: PeriodKey) -> Self {
        value.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeriodResolution {
    InPeriod(PeriodKey),
    OutOfPeriod(PeriodKey),
    Malformed(String),
}

impl PeriodResolution {
    pub fn in_period(&self) -> bool {
        matches!(self, Self::InPeriod(_))
    }

    pub fn period_key(&self) -> Option<PeriodKey> {
        match self {
            Self::InPeriod(key) | Self::OutOfPeriod(key) => Some(*key),
            Self::Malformed(_) => None,
        }
    }
}

pub fn ceil_quarter(month: u32) -> u32 {
    month.div_ceil(3)
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    ceil_quarter(date.month())
}

pub fn resolve_rule_period(rule: &CommissionRule, signed_on: NaiveDate) -> PeriodResolution {
    resolve_period(rule.period_type, &rule.period_value, signed_on)
}

/// Never fails: an unreadable descriptor resolves to `Malformed`, which
/// callers treat as "rule does not apply".
pub fn resolve_period(
    period_type: PeriodType,
    period_value: &str,
    signed_on: NaiveDate,
) -> PeriodResolution {
    match descriptor_window(period_type, period_value, signed_on) {
        Ok(key) if key.contains(signed_on) => PeriodResolution::InPeriod(key),
        Ok(key) => PeriodResolution::OutOfPeriod(key),
        Err(error) => PeriodResolution::Malformed(error.to_string()),
    }
}

fn descriptor_window(
    period_type: PeriodType,
    period_value: &str,
    signed_on: NaiveDate,
) -> Result<PeriodKey, DomainError> {
    let value = period_value.trim();
    if value.is_empty() {
        return Err(invalid_key("empty period descriptor".to_string()));
    }

    match period_type {
        PeriodType::Year => PeriodKey::year(parse_year(value)?),
        PeriodType::Month => {
            let (year, month) = split_year_and_part(value)?;
            PeriodKey::month(year, parse_number(month)?)
        }
        PeriodType::Quarter => {
            if value.chars().all(|ch| ch.is_ascii_digit()) {
                return PeriodKey::quarter(parse_year(value)?, quarter_of(signed_on));
            }
            let (year, quarter) = split_year_and_part(value)?;
            let quarter =
                quarter.strip_prefix('Q').or_else(|| quarter.strip_prefix('q')).unwrap_or(quarter);
            PeriodKey::quarter(year, parse_number(quarter)?)
        }
    }
}

/// Accepts `YYYY-P`, `YYYY/P`, `P-YYYY` and `P/YYYY`.
fn split_year_and_part(value: &str) -> Result<(i32, &str), DomainError> {
    let Some((left, right)) = value.split_once(['-', '/']) else {
        return Err(invalid_key(format!("`{value}` has no period part")));
    };
    let (left, right) = (left.trim(), right.trim());

    if left.len() == 4 {
        Ok((parse_year(left)?, right))
    } else if right.len() == 4 {
        Ok((parse_year(right)?, left))
    } else {
        Err(invalid_key(format!("`{value}` has no four-digit year")))
    }
}

fn parse_year(value: &str) -> Result<i32, DomainError> {
    let value = value.trim();
    if value.len() != 4 || !value.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(invalid_key(format!("`{value}` is not a four-digit year")));
    }
    let year = value.parse::<i32>().map_err(|error| invalid_key(error.to_string()))?;
    check_year(year)?;
    Ok(year)
}

fn parse_number(value: &str) -> Result<u32, DomainError> {
    let value = value.trim();
    value.parse::<u32>().map_err(|_| invalid_key(format!("`{value}` is not a number")))
}

fn check_year(year: i32) -> Result<(), DomainError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(invalid_key(format!("year {year} is outside {MIN_YEAR}..={MAX_YEAR}")))
    }
}

fn invalid_key(reason: String) -> DomainError {
    DomainError::InvalidRecord(reason)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{ceil_quarter, resolve_period, PeriodKey, PeriodResolution};
    use crate::domain::rule::PeriodType;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn quarterly_rule_resolves_to_the_sale_quarter() {
        let resolution = resolve_period(PeriodType::Quarter, "2025", date(2025, 8, 15));

        assert_eq!(
            resolution,
            PeriodResolution::InPeriod(PeriodKey::Quarter { year: 2025, quarter: 3 })
        );
        assert_eq!(resolution.period_key().map(|key| key.to_string()), Some("2025-Q3".to_string()));
    }

    #[test]
    fn quarterly_rule_for_another_year_is_out_of_period() {
        let resolution = resolve_period(PeriodType::Quarter, "2024", date(2025, 2, 1));
        assert!(!resolution.in_period());
        assert_eq!(resolution.period_key(), Some(PeriodKey::Quarter { year: 2024, quarter: 1 }));
    }

    #[test]
    fn explicit_quarter_descriptor_pins_the_quarter() {
        assert!(resolve_period(PeriodType::Quarter, "2025-Q3", date(2025, 9, 30)).in_period());
        assert!(!resolve_period(PeriodType::Quarter, "2025-Q3", date(2025, 10, 1)).in_period());
    }

    #[test]
    fn month_descriptors_accept_common_layouts() {
        for descriptor in ["2025-08", "2025-8", "2025/08", "08/2025", "8-2025"] {
            let resolution = resolve_period(PeriodType::Month, descriptor, date(2025, 8, 31));
            assert_eq!(
                resolution,
                PeriodResolution::InPeriod(PeriodKey::Month { year: 2025, month: 8 }),
                "descriptor {descriptor}"
            );
        }
        assert!(!resolve_period(PeriodType::Month, "2025-07", date(2025, 8, 1)).in_period());
    }

    #[test]
    fn yearly_rule_covers_the_whole_year() {
        assert!(resolve_period(PeriodType::Year, " 2025 ", date(2025, 12, 31)).in_period());
        assert!(!resolve_period(PeriodType::Year, "2025", date(2026, 1, 1)).in_period());
    }

    #[test]
    fn malformed_descriptors_do_not_raise() {
        for (period_type, descriptor) in [
            (PeriodType::Year, "twenty"),
            (PeriodType::Year, ""),
            (PeriodType::Month, "2025-13"),
            (PeriodType::Month, "2025"),
            (PeriodType::Quarter, "2025-Q5"),
            (PeriodType::Quarter, "25"),
        ] {
            let resolution = resolve_period(period_type, descriptor, date(2025, 8, 15));
            assert!(
                matches!(resolution, PeriodResolution::Malformed(_)),
                "descriptor `{descriptor}` should be malformed, got {resolution:?}"
            );
        }
    }

    #[test]
    fn windows_are_inclusive_calendar_ranges() {
        assert_eq!(
            PeriodKey::Quarter { year: 2024, quarter: 1 }.window(),
            Some((date(2024, 1, 1), date(2024, 3, 31)))
        );
        assert_eq!(
            PeriodKey::Month { year: 2024, month: 2 }.window(),
            Some((date(2024, 2, 1), date(2024, 2, 29)))
        );
        assert_eq!(PeriodKey::Year(2025).window(), Some((date(2025, 1, 1), date(2025, 12, 31))));
    }

    #[test]
    fn keys_parse_back_from_display() {
        for key in [
            PeriodKey::Year(2025),
            PeriodKey::Quarter { year: 2025, quarter: 4 },
            PeriodKey::Month { year: 2025, month: 2 },
        ] {
            assert_eq!(key.to_string().parse::<PeriodKey>(), Ok(key));
        }
        assert!("2025-Q0".parse::<PeriodKey>().is_err());
    }

    #[test]
    fn quarter_is_ceiling_of_month_over_three() {
        let quarters: Vec<u32> = (1..=12).map(ceil_quarter).collect();
        assert_eq!(quarters, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }
}
