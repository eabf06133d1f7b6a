use crate::config::{RateConfig, RateDefinition};
use crate::error::{IndirectRateError, Result};
use crate::period::Period;
use crate::projection::Projection;
use crate::schema::DirectCostRow;
use crate::table::PeriodTable;
use crate::ytd::compute_ytd_rates;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LOADED_COST_COLUMN: &str = "LoadedCost$";

/// Ratio that is exactly zero whenever the denominator is zero (or the result is not finite).
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// One output row per (period, project): direct costs, indirect dollars per rate and the
/// fully loaded cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectImpact {
    pub period: Period,
    pub project: String,
    pub direct_labor: f64,
    pub subcontract: f64,
    pub odc: f64,
    pub travel: f64,
    /// Rate name → indirect dollars loaded onto the project.
    pub rate_dollars: BTreeMap<String, f64>,
    /// Rate names in cascade order (ascending tier, then name); drives column order.
    pub rate_order: Vec<String>,
    pub loaded_cost: f64,
    /// Same as `rate_dollars`, using cumulative fiscal-year-to-date rates.
    pub ytd_rate_dollars: Option<BTreeMap<String, f64>>,
    pub loaded_cost_ytd: Option<f64>,
}

impl ProjectImpact {
    pub fn total_cost_input(&self) -> f64 {
        self.direct_labor + self.subcontract + self.odc + self.travel
    }

    pub fn indirect_total(&self) -> f64 {
        self.rate_dollars.values().sum()
    }

    /// Named output columns in report order: `DirectLabor$`, `Subk`, `ODC`, `Travel`,
    /// `<rate>$`… in cascade order, `LoadedCost$`, then `<rate>$_ytd`… and
    /// `LoadedCost$_ytd` when present.
    pub fn columns(&self) -> Vec<(String, f64)> {
        let mut columns = vec![
            ("DirectLabor$".to_string(), self.direct_labor),
            ("Subk".to_string(), self.subcontract),
            ("ODC".to_string(), self.odc),
            ("Travel".to_string(), self.travel),
        ];
        columns.extend(self.rate_order.iter().map(|rate| {
            let dollars = self.rate_dollars.get(rate).copied().unwrap_or(0.0);
            (format!("{}$", rate), dollars)
        }));
        columns.push((LOADED_COST_COLUMN.to_string(), self.loaded_cost));

        if let (Some(ytd), Some(loaded)) = (&self.ytd_rate_dollars, self.loaded_cost_ytd) {
            columns.extend(self.rate_order.iter().map(|rate| {
                let dollars = ytd.get(rate).copied().unwrap_or(0.0);
                (format!("{}$_ytd", rate), dollars)
            }));
            columns.push((format!("{}_ytd", LOADED_COST_COLUMN), loaded));
        }
        columns
    }

    fn merge(&mut self, other: &ProjectImpact) {
        self.direct_labor += other.direct_labor;
        self.subcontract += other.subcontract;
        self.odc += other.odc;
        self.travel += other.travel;
        self.loaded_cost += other.loaded_cost;
        for (rate, dollars) in &other.rate_dollars {
            *self.rate_dollars.entry(rate.clone()).or_default() += dollars;
        }
        if let (Some(mine), Some(theirs)) = (&mut self.ytd_rate_dollars, &other.ytd_rate_dollars) {
            for (rate, dollars) in theirs {
                *mine.entry(rate.clone()).or_default() += dollars;
            }
        }
        if let (Some(mine), Some(theirs)) = (&mut self.loaded_cost_ytd, other.loaded_cost_ytd) {
            *mine += theirs;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateOutput {
    /// Period × rate name, ratio values.
    pub rates: PeriodTable,
    pub project_impacts: Vec<ProjectImpact>,
    /// Period × rate name, cumulative fiscal-year-to-date ratios.
    pub ytd_rates: Option<PeriodTable>,
}

/// Monthly rate per definition: pooled dollars over the raw base.
///
/// Fails with [`IndirectRateError::UnknownBaseKey`] when a rate's base is not in the
/// projection's base table.
pub fn compute_period_rates(projection: &Projection, config: &RateConfig) -> Result<PeriodTable> {
    let mut rates = PeriodTable::new(projection.pools.index().to_vec());

    for (name, rate) in &config.rates {
        check_base(&projection.bases, name, rate)?;
        rates.ensure_column(name);
        for period in projection.pools.index() {
            let pool_total = projection.pools.sum_columns(*period, &rate.pool_names);
            let base_total = projection.bases.get(*period, rate.base.as_str());
            rates.set(*period, name, safe_div(pool_total, base_total));
        }
    }

    Ok(rates)
}

fn check_base(bases: &PeriodTable, rate_name: &str, rate: &RateDefinition) -> Result<()> {
    if bases.has_column(rate.base.as_str()) {
        return Ok(());
    }
    Err(IndirectRateError::UnknownBaseKey {
        rate: rate_name.to_string(),
        base: rate.base.to_string(),
        known: bases
            .column_names()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Applies rates to project direct costs in ascending cascade tier order.
pub struct CascadeRateEngine<'a> {
    config: &'a RateConfig,
    tiers: BTreeMap<u32, Vec<(&'a str, &'a RateDefinition)>>,
    rate_order: Vec<String>,
}

impl<'a> CascadeRateEngine<'a> {
    pub fn new(config: &'a RateConfig) -> Self {
        let tiers = config.rates_by_tier();
        let rate_order = tiers
            .values()
            .flatten()
            .map(|(name, _)| name.to_string())
            .collect();
        Self {
            config,
            tiers,
            rate_order,
        }
    }

    /// Rates plus per-project impacts. When `fy_start` is given, cumulative YTD rates are
    /// computed (fiscal years start in `fy_start`'s month) and applied the same way.
    pub fn compute(&self, projection: &Projection, fy_start: Option<Period>) -> Result<RateOutput> {
        let rates = compute_period_rates(projection, self.config)?;

        let ytd_rates = fy_start
            .map(|start| {
                compute_ytd_rates(
                    &projection.pools,
                    &projection.bases,
                    &self.config.rates,
                    start.month(),
                )
            })
            .transpose()?;

        debug!(
            "Cascading {} rates across {} tier(s) for {} direct cost rows",
            self.config.rates.len(),
            self.tiers.len(),
            projection.direct_by_project.len()
        );

        let mut grouped: BTreeMap<(Period, String), ProjectImpact> = BTreeMap::new();
        for row in &projection.direct_by_project {
            let rate_dollars = self.apply_cascade(row, &rates);
            let loaded_cost = row.total_cost_input() + rate_dollars.values().sum::<f64>();

            let (ytd_rate_dollars, loaded_cost_ytd) = match &ytd_rates {
                Some(ytd) => {
                    let dollars = self.apply_cascade(row, ytd);
                    let loaded = row.total_cost_input() + dollars.values().sum::<f64>();
                    (Some(dollars), Some(loaded))
                }
                None => (None, None),
            };

            let impact = ProjectImpact {
                period: row.period,
                project: row.project.clone(),
                direct_labor: row.direct_labor,
                subcontract: row.subcontract,
                odc: row.odc,
                travel: row.travel,
                rate_dollars,
                rate_order: self.rate_order.clone(),
                loaded_cost,
                ytd_rate_dollars,
                loaded_cost_ytd,
            };

            match grouped.get_mut(&(row.period, row.project.clone())) {
                Some(existing) => existing.merge(&impact),
                None => {
                    grouped.insert((row.period, row.project.clone()), impact);
                }
            }
        }

        let project_impacts: Vec<ProjectImpact> = grouped.into_values().collect();

        info!(
            "Computed {} rates over {} periods, {} project impact rows",
            self.config.rates.len(),
            rates.len(),
            project_impacts.len()
        );

        Ok(RateOutput {
            rates,
            project_impacts,
            ytd_rates,
        })
    }

    /// Dollar impact of every rate on one direct-cost row.
    ///
    /// A rate's applied base is the row's raw base plus the dollars of every rate in a
    /// strictly lower tier. Rates sharing a tier all see the same applied base.
    fn apply_cascade(&self, row: &DirectCostRow, rates: &PeriodTable) -> BTreeMap<String, f64> {
        let mut dollars = BTreeMap::new();
        let mut lower_tiers = 0.0;

        for definitions in self.tiers.values() {
            let mut tier_total = 0.0;
            for (name, rate) in definitions {
                let applied_base = row.base_value(rate.base) + lower_tiers;
                let impact = applied_base * rates.get(row.period, name);
                dollars.insert(name.to_string(), impact);
                tier_total += impact;
            }
            lower_tiers += tier_total;
        }

        dollars
    }
}
