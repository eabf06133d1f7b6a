use crate::aggregate::Aggregator;
use crate::baseline::BaselineProjector;
use crate::cascade::{CascadeRateEngine, ProjectImpact};
use crate::config::RateConfig;
use crate::error::{IndirectRateError, Result};
use crate::ingestion::{load_inputs, RawInputs};
use crate::mapping::map_accounts_to_pools;
use crate::normalize::{normalize_inputs, NormalizedInputs};
use crate::period::Period;
use crate::projection::Assumptions;
use crate::scenario::ScenarioApplier;
use crate::schema::{ReferenceRates, ScenarioEvent, BASE_SCENARIO};
use crate::table::PeriodTable;
use crate::ytd::{build_rates_comparison, RateComparisonRow};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

pub const DEFAULT_FORECAST_MONTHS: u32 = 12;
pub const DEFAULT_RUN_RATE_MONTHS: u32 = 3;

/// Run parameters for one forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPlan {
    pub scenarios: Vec<String>,
    pub forecast_months: u32,
    pub run_rate_months: u32,
    /// Any period in the first month of the fiscal year; enables YTD output.
    pub fy_start: Option<Period>,
    pub entity: Option<String>,
}

impl Default for ForecastPlan {
    fn default() -> Self {
        Self {
            scenarios: vec![BASE_SCENARIO.to_string()],
            forecast_months: DEFAULT_FORECAST_MONTHS,
            run_rate_months: DEFAULT_RUN_RATE_MONTHS,
            fy_start: None,
            entity: None,
        }
    }
}

impl ForecastPlan {
    /// Plan covering `scenario` if given, otherwise every scenario named in `events`
    /// (sorted), otherwise just `Base`.
    pub fn for_events(events: &[ScenarioEvent], scenario: Option<&str>) -> Self {
        let scenarios = match scenario.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => vec![name.to_string()],
            None => {
                let names: BTreeSet<&str> = events.iter().map(|e| e.scenario.as_str()).collect();
                if names.is_empty() {
                    vec![BASE_SCENARIO.to_string()]
                } else {
                    names.into_iter().map(str::to_string).collect()
                }
            }
        };
        Self {
            scenarios,
            ..Self::default()
        }
    }

    pub fn with_horizon(mut self, forecast_months: u32, run_rate_months: u32) -> Self {
        self.forecast_months = forecast_months;
        self.run_rate_months = run_rate_months;
        self
    }

    pub fn with_fy_start(mut self, fy_start: Period) -> Self {
        self.fy_start = Some(fy_start);
        self
    }

    pub fn with_entity(mut self, entity: &str) -> Self {
        self.entity = Some(entity.to_string());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.run_rate_months == 0 {
            return Err(IndirectRateError::InvalidConfig(
                "run_rate_months must be at least 1".to_string(),
            ));
        }
        if self.scenarios.is_empty() {
            return Err(IndirectRateError::InvalidConfig(
                "at least one scenario is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Final output for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub scenario: String,
    pub periods: Vec<Period>,
    pub pools: PeriodTable,
    pub bases: PeriodTable,
    pub rates: PeriodTable,
    pub project_impacts: Vec<ProjectImpact>,
    pub ytd_rates: Option<PeriodTable>,
    /// Rate name → per-period comparison rows; present whenever YTD rates are.
    pub rate_comparison: Option<BTreeMap<String, Vec<RateComparisonRow>>>,
    pub reference_rates: Option<ReferenceRates>,
    pub assumptions: Assumptions,
    pub warnings: Vec<String>,
}

impl ForecastResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn rate(&self, period: Period, rate: &str) -> f64 {
        self.rates.get(period, rate)
    }

    pub fn impacts_for(&self, project: &str) -> impl Iterator<Item = &ProjectImpact> {
        let project = project.to_string();
        self.project_impacts
            .iter()
            .filter(move |impact| impact.project == project)
    }
}

pub struct ForecastEngine;

impl ForecastEngine {
    /// Maps, aggregates and projects once, then rates every planned scenario against
    /// the shared baseline.
    pub fn run(
        inputs: &NormalizedInputs,
        config: &RateConfig,
        plan: &ForecastPlan,
        reference: Option<&ReferenceRates>,
    ) -> Result<Vec<ForecastResult>> {
        plan.validate()?;
        let mut warnings = config.validate()?;
        warnings.extend(inputs.warnings.iter().cloned());

        info!(
            "Running indirect rate forecast: {} scenario(s), {} forecast months, {}-month run-rate",
            plan.scenarios.len(),
            plan.forecast_months,
            plan.run_rate_months
        );

        let (mapped, map_warnings) = map_accounts_to_pools(&inputs.ledger, &inputs.account_map);
        warnings.extend(map_warnings);

        let actuals = Aggregator::new(config)
            .with_entity(plan.entity.as_deref())
            .aggregate(&mapped, &inputs.direct_costs);
        warnings.extend(actuals.warnings.iter().cloned());

        let baseline =
            BaselineProjector::new(plan.forecast_months, plan.run_rate_months).project(&actuals)?;

        let applier = ScenarioApplier::new(&inputs.scenario_events, config.base_mode);
        let engine = CascadeRateEngine::new(config);

        let mut results = Vec::with_capacity(plan.scenarios.len());
        for scenario in &plan.scenarios {
            info!("Computing scenario '{}'", scenario);
            let projection = applier.apply(&baseline, scenario);
            let output = engine.compute(&projection, plan.fy_start)?;

            let rate_comparison = output.ytd_rates.as_ref().map(|ytd| {
                let empty = ReferenceRates::default();
                build_rates_comparison(
                    &output.rates,
                    ytd,
                    reference.unwrap_or(&empty),
                    &config.rate_names(),
                )
            });

            let mut scenario_warnings = warnings.clone();
            scenario_warnings.extend(projection.warnings.iter().cloned());
            let scenario_warnings = dedup_warnings(scenario_warnings);

            debug!(
                "Scenario '{}': {} periods, {} impact rows, {} warnings",
                scenario,
                output.rates.len(),
                output.project_impacts.len(),
                scenario_warnings.len()
            );

            results.push(ForecastResult {
                scenario: scenario.clone(),
                periods: output.rates.index().to_vec(),
                pools: projection.pools,
                bases: projection.bases,
                rates: output.rates,
                project_impacts: output.project_impacts,
                ytd_rates: output.ytd_rates,
                rate_comparison,
                reference_rates: reference.cloned(),
                assumptions: projection.assumptions,
                warnings: scenario_warnings,
            });
        }

        Ok(results)
    }
}

/// Normalizes raw tables and runs the forecast.
pub fn run_forecast(
    raw: &RawInputs,
    config: &RateConfig,
    plan: &ForecastPlan,
    reference: Option<&ReferenceRates>,
) -> Result<Vec<ForecastResult>> {
    let inputs = normalize_inputs(raw)?;
    ForecastEngine::run(&inputs, config, plan, reference)
}

/// Loads the four input CSVs from `input_dir` and runs the forecast.
pub fn forecast_from_dir(
    input_dir: impl AsRef<Path>,
    config: &RateConfig,
    plan: &ForecastPlan,
    reference: Option<&ReferenceRates>,
) -> Result<Vec<ForecastResult>> {
    let raw = load_inputs(input_dir)?;
    run_forecast(&raw, config, plan, reference)
}

/// Removes repeated warnings, keeping first-seen order.
pub fn dedup_warnings(warnings: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    warnings
        .into_iter()
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaseKey;
    use crate::schema::{AccountMapping, DirectCostDelta, DirectCostRow, LedgerEntry};

    fn p(s: &str) -> Period {
        Period::parse(s).unwrap()
    }

    fn mapping(account: &str, pool: &str) -> AccountMapping {
        AccountMapping {
            account: account.to_string(),
            pool: pool.to_string(),
            base_category: None,
            is_unallowable: false,
            notes: None,
        }
    }

    fn inputs() -> NormalizedInputs {
        let mut ledger = Vec::new();
        let mut direct = Vec::new();
        for period in crate::period::period_range(p("2025-01"), p("2025-03")) {
            for (account, amount) in [("5000", 25_000.0), ("6000", 10_000.0), ("7000", 22_500.0)] {
                ledger.push(LedgerEntry {
                    period,
                    account: account.to_string(),
                    amount,
                    entity: None,
                });
            }
            let mut row = DirectCostRow::new(period, "P-1");
            row.direct_labor = 100_000.0;
            row.direct_labor_hours = 800.0;
            row.subcontract = 50_000.0;
            direct.push(row);
        }
        NormalizedInputs {
            ledger,
            account_map: vec![
                mapping("5000", "Fringe"),
                mapping("6000", "Overhead"),
                mapping("7000", "G&A"),
            ],
            direct_costs: direct,
            scenario_events: vec![
                ScenarioEvent::new("Win", p("2025-05")).with_project_delta(
                    "P-1",
                    DirectCostDelta {
                        direct_labor: 50_000.0,
                        ..Default::default()
                    },
                ),
                ScenarioEvent::new("Hire", p("2025-04")).with_pool_delta("Fringe", 5_000.0),
            ],
            warnings: vec!["carried".to_string()],
        }
    }

    #[test]
    fn test_for_events_resolution() {
        let events = inputs().scenario_events;
        assert_eq!(
            ForecastPlan::for_events(&events, None).scenarios,
            vec!["Hire", "Win"]
        );
        assert_eq!(
            ForecastPlan::for_events(&events, Some("Win")).scenarios,
            vec!["Win"]
        );
        assert_eq!(ForecastPlan::for_events(&[], None).scenarios, vec!["Base"]);
    }

    #[test]
    fn test_multi_scenario_shares_baseline() {
        let inputs = inputs();
        let config = RateConfig::default();
        let plan = ForecastPlan {
            scenarios: vec!["Base".to_string(), "Win".to_string(), "Hire".to_string()],
            forecast_months: 3,
            ..ForecastPlan::default()
        };
        let results = ForecastEngine::run(&inputs, &config, &plan, None).unwrap();
        assert_eq!(results.len(), 3);

        let base = &results[0];
        let win = &results[1];
        let hire = &results[2];

        // Actual periods agree across scenarios
        assert_eq!(base.rate(p("2025-02"), "Fringe"), win.rate(p("2025-02"), "Fringe"));
        assert!((base.rate(p("2025-01"), "Fringe") - 0.25).abs() < 1e-9);

        // Win adds labour from May: lower overhead rate, same pools
        assert!(win.rate(p("2025-05"), "Overhead") < base.rate(p("2025-05"), "Overhead"));
        assert_eq!(win.rate(p("2025-04"), "Overhead"), base.rate(p("2025-04"), "Overhead"));

        // Hire raises fringe from April
        assert!(hire.rate(p("2025-04"), "Fringe") > base.rate(p("2025-04"), "Fringe"));

        assert!(base.warnings.contains(&"carried".to_string()));
        assert!(base.ytd_rates.is_none());
        assert!(base.rate_comparison.is_none());
    }

    #[test]
    fn test_ytd_comparison_present_with_fy_start() {
        let inputs = inputs();
        let config = RateConfig::default();
        let mut reference = ReferenceRates::default();
        reference.budget.insert(
            "Fringe".to_string(),
            BTreeMap::from([(p("2025-01"), 0.20)]),
        );
        let plan = ForecastPlan::default()
            .with_horizon(2, 3)
            .with_fy_start(p("2025-01"));

        let results = ForecastEngine::run(&inputs, &config, &plan, Some(&reference)).unwrap();
        let base = &results[0];
        let comparison = base.rate_comparison.as_ref().unwrap();

        let fringe = &comparison["Fringe"];
        assert_eq!(fringe.len(), base.periods.len());
        assert!((fringe[0].variance_to_budget - 0.05).abs() < 1e-9);
        assert_eq!(base.reference_rates.as_ref(), Some(&reference));
    }

    #[test]
    fn test_invalid_plan_and_config() {
        let inputs = inputs();
        let plan = ForecastPlan::default().with_horizon(12, 0);
        let err = ForecastEngine::run(&inputs, &RateConfig::default(), &plan, None).unwrap_err();
        assert!(matches!(err, IndirectRateError::InvalidConfig(_)));

        let mut config = RateConfig::default();
        config.rates.clear();
        let err = ForecastEngine::run(&inputs, &config, &ForecastPlan::default(), None).unwrap_err();
        assert!(matches!(err, IndirectRateError::InvalidConfig(_)));
    }

    #[test]
    fn test_ledger_mode_uses_base_accounts() {
        let mut inputs = inputs();
        for period in crate::period::period_range(p("2025-01"), p("2025-03")) {
            inputs.ledger.push(LedgerEntry {
                period,
                account: "4000".to_string(),
                amount: 100_000.0,
                entity: None,
            });
        }
        inputs.account_map.push(mapping("4000", "Direct"));

        let mut config = RateConfig::default();
        config.base_mode = crate::config::BaseMode::LedgerAccounts;
        config.base_account_map = BTreeMap::from([
            (BaseKey::DirectLabor, vec!["4000".to_string()]),
            (BaseKey::TotalCostInput, vec!["4000".to_string()]),
        ]);

        let results =
            ForecastEngine::run(&inputs, &config, &ForecastPlan::default(), None).unwrap();
        let base = &results[0];
        // TCI from the ledger is 100k, the project ledger says 150k
        assert!((base.bases.get(p("2025-01"), "TCI") - 100_000.0).abs() < 1e-9);
        assert!(base.warnings.iter().any(|w| w.contains("TCI")));
    }

    #[test]
    fn test_no_actuals_is_fatal() {
        let mut inputs = inputs();
        inputs.account_map.clear();
        let err = ForecastEngine::run(&inputs, &RateConfig::default(), &ForecastPlan::default(), None)
            .unwrap_err();
        assert!(matches!(err, IndirectRateError::NoActuals));
    }

    #[test]
    fn test_dedup_warnings_keeps_first_seen_order() {
        let out = dedup_warnings(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]);
        assert_eq!(out, vec!["b", "a"]);
    }
}
