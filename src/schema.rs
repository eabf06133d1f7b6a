use crate::config::BaseKey;
use crate::period::Period;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pool name assigned to ledger rows whose account has no mapping.
pub const UNMAPPED_POOL: &str = "Unmapped";

/// Scenario name used for events that do not name one.
pub const BASE_SCENARIO: &str = "Base";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerEntry {
    pub period: Period,

    #[schemars(description = "Ledger account code, kept as text (\"7100.10\" is not \"7100.1\")")]
    pub account: String,

    pub amount: f64,

    #[serde(default)]
    pub entity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct AccountMapping {
    pub account: String,

    #[schemars(description = "Pool (or sub-pool) the account's dollars roll into")]
    pub pool: String,

    #[serde(default)]
    pub base_category: Option<String>,

    #[serde(default)]
    #[schemars(description = "Unallowable accounts never contribute to any pool total")]
    pub is_unallowable: bool,

    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DirectCostRow {
    #[serde(rename = "Period")]
    pub period: Period,

    #[serde(rename = "Project")]
    pub project: String,

    #[serde(rename = "DirectLabor$")]
    pub direct_labor: f64,

    #[serde(rename = "DirectLaborHrs")]
    pub direct_labor_hours: f64,

    #[serde(rename = "Subk")]
    pub subcontract: f64,

    #[serde(rename = "ODC")]
    pub odc: f64,

    #[serde(rename = "Travel")]
    pub travel: f64,

    #[serde(rename = "Entity", default)]
    pub entity: Option<String>,
}

impl DirectCostRow {
    pub fn new(period: Period, project: &str) -> Self {
        Self {
            period,
            project: project.to_string(),
            direct_labor: 0.0,
            direct_labor_hours: 0.0,
            subcontract: 0.0,
            odc: 0.0,
            travel: 0.0,
            entity: None,
        }
    }

    /// Labor + subcontract + other direct costs + travel.
    pub fn total_cost_input(&self) -> f64 {
        self.direct_labor + self.subcontract + self.odc + self.travel
    }

    /// The row's own value for a base key, used when applying rates to the project.
    pub fn base_value(&self, key: BaseKey) -> f64 {
        match key {
            BaseKey::DirectLabor | BaseKey::TotalLabor => self.direct_labor,
            BaseKey::DirectLaborHours => self.direct_labor_hours,
            BaseKey::TotalCostInput => self.total_cost_input(),
        }
    }

    pub fn apply_delta(&mut self, delta: &DirectCostDelta) {
        self.direct_labor += delta.direct_labor;
        self.direct_labor_hours += delta.direct_labor_hours;
        self.subcontract += delta.subcontract;
        self.odc += delta.odc;
        self.travel += delta.travel;
    }

    pub fn components(&self) -> DirectCostDelta {
        DirectCostDelta {
            direct_labor: self.direct_labor,
            direct_labor_hours: self.direct_labor_hours,
            subcontract: self.subcontract,
            odc: self.odc,
            travel: self.travel,
        }
    }
}

/// The five direct-cost components, used both as deltas and as per-period sums.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DirectCostDelta {
    #[serde(rename = "DeltaDirectLabor$", default)]
    pub direct_labor: f64,

    #[serde(rename = "DeltaDirectLaborHrs", default)]
    pub direct_labor_hours: f64,

    #[serde(rename = "DeltaSubk", default)]
    pub subcontract: f64,

    #[serde(rename = "DeltaODC", default)]
    pub odc: f64,

    #[serde(rename = "DeltaTravel", default)]
    pub travel: f64,
}

impl DirectCostDelta {
    pub fn is_zero(&self) -> bool {
        self.direct_labor == 0.0
            && self.direct_labor_hours == 0.0
            && self.subcontract == 0.0
            && self.odc == 0.0
            && self.travel == 0.0
    }

    pub fn total_cost_input(&self) -> f64 {
        self.direct_labor + self.subcontract + self.odc + self.travel
    }

    pub fn accumulate(&mut self, other: &DirectCostDelta) {
        self.direct_labor += other.direct_labor;
        self.direct_labor_hours += other.direct_labor_hours;
        self.subcontract += other.subcontract;
        self.odc += other.odc;
        self.travel += other.travel;
    }

    pub fn minus(&self, other: &DirectCostDelta) -> DirectCostDelta {
        DirectCostDelta {
            direct_labor: self.direct_labor - other.direct_labor,
            direct_labor_hours: self.direct_labor_hours - other.direct_labor_hours,
            subcontract: self.subcontract - other.subcontract,
            odc: self.odc - other.odc,
            travel: self.travel - other.travel,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ScenarioEvent {
    pub scenario: String,

    #[schemars(description = "First period the deltas apply to. Deltas persist for every later period.")]
    pub effective_period: Period,

    pub event_type: String,

    #[serde(default)]
    #[schemars(description = "Project whose direct costs change; None for pool-only events")]
    pub project: Option<String>,

    #[serde(flatten)]
    pub direct_deltas: DirectCostDelta,

    #[serde(default)]
    #[schemars(description = "Dollar change per pool name")]
    pub pool_deltas: BTreeMap<String, f64>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl ScenarioEvent {
    pub fn new(scenario: &str, effective_period: Period) -> Self {
        Self {
            scenario: scenario.to_string(),
            effective_period,
            event_type: "ADJUST".to_string(),
            project: None,
            direct_deltas: DirectCostDelta::default(),
            pool_deltas: BTreeMap::new(),
            notes: None,
        }
    }

    pub fn with_pool_delta(mut self, pool: &str, amount: f64) -> Self {
        *self.pool_deltas.entry(pool.to_string()).or_default() += amount;
        self
    }

    pub fn with_project_delta(mut self, project: &str, delta: DirectCostDelta) -> Self {
        self.project = Some(project.to_string());
        self.direct_deltas = delta;
        self
    }
}

/// Rate name → period → ratio.
pub type RateSchedule = BTreeMap<String, BTreeMap<Period, f64>>;

/// Externally supplied reference rates, cumulative by convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReferenceRates {
    #[serde(default)]
    pub budget: RateSchedule,

    #[serde(default)]
    pub provisional: RateSchedule,

    #[serde(default)]
    pub threshold: RateSchedule,
}

impl ReferenceRates {
    pub fn is_empty(&self) -> bool {
        self.budget.is_empty() && self.provisional.is_empty() && self.threshold.is_empty()
    }

    fn lookup(schedule: &RateSchedule, rate: &str, period: Period) -> f64 {
        schedule
            .get(rate)
            .and_then(|by_period| by_period.get(&period))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn budget_for(&self, rate: &str, period: Period) -> f64 {
        Self::lookup(&self.budget, rate, period)
    }

    pub fn provisional_for(&self, rate: &str, period: Period) -> f64 {
        Self::lookup(&self.provisional, rate, period)
    }

    pub fn threshold_for(&self, rate: &str, period: Period) -> f64 {
        Self::lookup(&self.threshold, rate, period)
    }
}
