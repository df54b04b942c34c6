use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::commission::period::PeriodKey;
use crate::domain::development::{DevelopmentCatalog, DevelopmentKey};
use crate::domain::sale::CommissionSale;

/// Read access to the signing dates of a development's sales.
pub trait SaleLookup: Send + Sync {
    fn signing_dates(&self, development: &DevelopmentKey) -> Vec<NaiveDate>;
}

/// Anything that can answer "how many units did this development sell in
/// this window, as of this date".
pub trait UnitSource {
    fn count_units(
        &self,
        development: &DevelopmentKey,
        period: &PeriodKey,
        as_of: NaiveDate,
    ) -> u32;
}

/// Counts over a [`SaleLookup`] on every call. No caching.
pub struct UnitCounter<'a, L> {
    lookup: &'a L,
    catalog: &'a DevelopmentCatalog,
}

impl<'a, L: SaleLookup> UnitCounter<'a, L> {
    pub fn new(lookup: &'a L, catalog: &'a DevelopmentCatalog) -> Self {
        Self { lookup, catalog }
    }
}

impl<L: SaleLookup> UnitSource for UnitCounter<'_, L> {
    fn count_units(
        &self,
        development: &DevelopmentKey,
        period: &PeriodKey,
        as_of: NaiveDate,
    ) -> u32 {
        let development = self.catalog.canonicalize(development.as_str());
        count_in_period(self.lookup.signing_dates(&development), period, as_of)
    }
}

/// Sales signed inside `period` and not after `as_of`.
pub fn count_in_period(
    signing_dates: impl IntoIterator<Item = NaiveDate>,
    period: &PeriodKey,
    as_of: NaiveDate,
) -> u32 {
    let count = signing_dates
        .into_iter()
        .filter(|signed_on| *signed_on <= as_of && period.contains(*signed_on))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// In-memory snapshot of already-loaded sales, keyed by canonical development.
#[derive(Clone, Debug, Default)]
pub struct SaleBook {
    dates: BTreeMap<DevelopmentKey, Vec<NaiveDate>>,
}

impl SaleBook {
    pub fn from_sales<'s>(
        sales: impl IntoIterator<Item = &'s CommissionSale>,
        catalog: &DevelopmentCatalog,
    ) -> Self {
        let mut book = Self::default();
        for sale in sales {
            book.insert(catalog.canonicalize(sale.development.as_str()), sale.signed_on);
        }
        book
    }

    pub fn insert(&mut self, development: DevelopmentKey, signed_on: NaiveDate) {
        self.dates.entry(development).or_default().push(signed_on);
    }
}

impl SaleLookup for SaleBook {
    fn signing_dates(&self, development: &DevelopmentKey) -> Vec<NaiveDate> {
        self.dates.get(development).cloned().unwrap_or_default()
    }
}

/// Counts fetched ahead of time, one per (development, period). Windows that
/// were never fetched count as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchedUnitCounts {
    counts: BTreeMap<(DevelopmentKey, PeriodKey), u32>,
}

impl PrefetchedUnitCounts {
    pub fn insert(&mut self, development: DevelopmentKey, period: PeriodKey, count: u32) {
        self.counts.insert((development, period), count);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl UnitSource for PrefetchedUnitCounts {
    fn count_units(
        &self,
        development: &DevelopmentKey,
        period: &PeriodKey,
        _as_of: NaiveDate,
    ) -> u32 {
        self.counts.get(&(development.clone(), *period)).copied().unwrap_or(0)
    }
}
