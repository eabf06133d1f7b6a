use crate::cascade::safe_div;
use crate::config::RateDefinition;
use crate::error::Result;
use crate::period::{validate_fiscal_year_start_month, Period};
use crate::schema::ReferenceRates;
use crate::table::PeriodTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cumulative fiscal-year-to-date rates.
///
/// For each period the window runs from its fiscal year start through the period itself.
/// The YTD rate is the ratio of the window's pooled dollars to its base total, not the
/// mean of the monthly ratios.
pub fn compute_ytd_rates(
    pools: &PeriodTable,
    bases: &PeriodTable,
    rates: &BTreeMap<String, RateDefinition>,
    fy_start_month: u32,
) -> Result<PeriodTable> {
    validate_fiscal_year_start_month(fy_start_month)?;

    let mut ytd = PeriodTable::new(pools.index().to_vec());
    for name in rates.keys() {
        ytd.ensure_column(name);
    }

    let mut current_year: Option<Period> = None;
    let mut cumulative: BTreeMap<&str, (f64, f64)> = BTreeMap::new();

    for period in pools.index() {
        let year_start = period.fiscal_year_start(fy_start_month);
        if current_year != Some(year_start) {
            current_year = Some(year_start);
            cumulative.clear();
        }

        for (name, rate) in rates {
            let (pool_sum, base_sum) = cumulative.entry(name.as_str()).or_default();
            *pool_sum += pools.sum_columns(*period, &rate.pool_names);
            *base_sum += bases.get(*period, rate.base.as_str());
            ytd.set(*period, name, safe_div(*pool_sum, *base_sum));
        }
    }

    Ok(ytd)
}

/// One period's column of the rate comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateComparisonRow {
    pub period: Period,
    pub actual: f64,
    pub ytd: f64,
    pub budget: f64,
    pub provisional: f64,
    pub threshold: f64,
    pub variance_to_budget: f64,
    pub variance_to_provisional: f64,
}

/// Per rate, per period: monthly actual, YTD, reference rates and variances.
///
/// Variances are monthly actual minus the reference rate. Missing reference entries are 0.
pub fn build_rates_comparison(
    actual: &PeriodTable,
    ytd: &PeriodTable,
    reference: &ReferenceRates,
    rate_names: &[String],
) -> BTreeMap<String, Vec<RateComparisonRow>> {
    rate_names
        .iter()
        .map(|name| {
            let rows = actual
                .index()
                .iter()
                .map(|period| {
                    let actual_rate = actual.get(*period, name);
                    let budget = reference.budget_for(name, *period);
                    let provisional = reference.provisional_for(name, *period);
                    RateComparisonRow {
                        period: *period,
                        actual: actual_rate,
                        ytd: ytd.get(*period, name),
                        budget,
                        provisional,
                        threshold: reference.threshold_for(name, *period),
                        variance_to_budget: actual_rate - budget,
                        variance_to_provisional: actual_rate - provisional,
                    }
                })
                .collect();
            (name.clone(), rows)
        })
        .collect()
}
