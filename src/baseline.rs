use crate::aggregate::ActualAggregates;
use crate::config::BaseKey;
use crate::error::{IndirectRateError, Result};
use crate::period::{period_range, Period};
use crate::projection::{Assumptions, Projection, RUN_RATE_METHOD};
use crate::schema::{DirectCostDelta, DirectCostRow};
use crate::table::PeriodTable;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};

/// Extends actuals forward with a flat trailing-mean run-rate.
#[derive(Debug, Clone, Copy)]
pub struct BaselineProjector {
    forecast_months: u32,
    run_rate_months: u32,
}

impl BaselineProjector {
    pub fn new(forecast_months: u32, run_rate_months: u32) -> Self {
        Self {
            forecast_months,
            run_rate_months,
        }
    }

    pub fn project(&self, actuals: &ActualAggregates) -> Result<Projection> {
        if self.run_rate_months == 0 {
            return Err(IndirectRateError::InvalidConfig(
                "run_rate_months must be at least 1".to_string(),
            ));
        }

        let (Some(first), Some(last_actual)) =
            (actuals.pools.first_period(), actuals.pools.last_period())
        else {
            return Err(IndirectRateError::NoActuals);
        };

        let horizon = months_as_offset(self.forecast_months, "forecast_months")?;
        let lookback = months_as_offset(self.run_rate_months, "run_rate_months")?;
        let end = last_actual.offset(horizon);
        let periods = period_range(first, end);
        let window = self.run_rate_months as usize;

        let actual_bases = actuals.bases.reindex(actuals.pools.index().to_vec());
        let rr_pools = actuals.pools.tail_mean(window);
        let rr_bases = actual_bases.tail_mean(window);

        let pools = fill_forecast(actuals.pools.reindex(periods.clone()), last_actual, &rr_pools);
        let bases = fill_forecast(actual_bases.reindex(periods.clone()), last_actual, &rr_bases);

        let mut warnings = Vec::new();
        if has_negative_base(&bases) {
            warnings.push("Negative base values detected; rates may be distorted.".to_string());
        }
        for warning in &warnings {
            warn!("{}", warning);
        }

        let direct_by_project = self.project_direct_costs(
            &actuals.direct_by_project,
            first,
            last_actual,
            end,
            lookback,
        );

        info!(
            "Baseline projection {}..={} (last actual {}, {} forecast months, {}-month run-rate)",
            first, end, last_actual, self.forecast_months, self.run_rate_months
        );
        debug!("Run-rate pool means: {:?}", rr_pools);
        debug!("Run-rate base means: {:?}", rr_bases);

        Ok(Projection {
            pools,
            bases,
            direct_by_project,
            assumptions: Assumptions {
                forecast_months: self.forecast_months,
                run_rate_months: self.run_rate_months,
                method: RUN_RATE_METHOD.to_string(),
                run_rate_pool_means: rr_pools,
                run_rate_base_means: rr_bases,
                last_actual_period: last_actual,
                scenario: None,
                events_applied: 0,
            },
            warnings,
        })
    }

    /// Keeps every in-range actual row and fills each forecast month with each project's
    /// own trailing mean. Projects idle throughout the window get no forecast rows.
    fn project_direct_costs(
        &self,
        rows: &[DirectCostRow],
        first: Period,
        last_actual: Period,
        end: Period,
        lookback: i32,
    ) -> Vec<DirectCostRow> {
        let window_start = last_actual.offset(1 - lookback);

        let mut kept: Vec<DirectCostRow> = rows
            .iter()
            .filter(|r| r.period >= first && r.period <= end)
            .cloned()
            .collect();

        let mut recent: BTreeMap<&str, BTreeMap<Period, DirectCostDelta>> = BTreeMap::new();
        let mut entities: BTreeMap<&str, Option<String>> = BTreeMap::new();
        for row in rows
            .iter()
            .filter(|r| r.period >= window_start && r.period <= last_actual)
        {
            recent
                .entry(row.project.as_str())
                .or_default()
                .entry(row.period)
                .or_default()
                .accumulate(&row.components());
            entities
                .entry(row.project.as_str())
                .or_insert_with(|| row.entity.clone());
        }

        let existing: HashSet<(Period, String)> = kept
            .iter()
            .map(|r| (r.period, r.project.clone()))
            .collect();

        let mut period = last_actual.next();
        while period <= end {
            for (project, by_period) in &recent {
                if existing.contains(&(period, project.to_string())) {
                    continue;
                }
                let mut mean = DirectCostDelta::default();
                for totals in by_period.values() {
                    mean.accumulate(totals);
                }
                let n = by_period.len() as f64;
                let mut row = DirectCostRow::new(period, project);
                row.direct_labor = mean.direct_labor / n;
                row.direct_labor_hours = mean.direct_labor_hours / n;
                row.subcontract = mean.subcontract / n;
                row.odc = mean.odc / n;
                row.travel = mean.travel / n;
                row.entity = entities.get(project).cloned().flatten();
                kept.push(row);
            }
            period = period.next();
        }

        kept.sort_by(|a, b| (a.period, &a.project).cmp(&(b.period, &b.project)));
        kept
    }
}

fn months_as_offset(months: u32, field: &str) -> Result<i32> {
    i32::try_from(months).map_err(|_| {
        IndirectRateError::InvalidConfig(format!("{} is too large: {}", field, months))
    })
}

fn fill_forecast(mut table: PeriodTable, last_actual: Period, run_rate: &BTreeMap<String, f64>) -> PeriodTable {
    let forecast: Vec<Period> = table
        .index()
        .iter()
        .copied()
        .filter(|p| *p > last_actual)
        .collect();
    for period in forecast {
        for (name, value) in run_rate {
            table.set(period, name, *value);
        }
    }
    table
}

fn has_negative_base(bases: &PeriodTable) -> bool {
    [BaseKey::DirectLabor, BaseKey::TotalCostInput, BaseKey::TotalLabor]
        .iter()
        .filter_map(|key| bases.column(key.as_str()))
        .any(|values| values.iter().any(|v| *v < 0.0))
}
