use crate::period::Period;
use crate::schema::DirectCostRow;
use crate::table::PeriodTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RUN_RATE_METHOD: &str = "rolling_mean_run_rate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumptions {
    pub forecast_months: u32,
    pub run_rate_months: u32,
    pub method: String,
    pub run_rate_pool_means: BTreeMap<String, f64>,
    pub run_rate_base_means: BTreeMap<String, f64>,
    pub last_actual_period: Period,
    pub scenario: Option<String>,
    pub events_applied: usize,
}

/// The unit of state flowing from the baseline through scenario application to rating.
///
/// Stages never mutate a projection they were handed; each returns a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Period × pool name, dollars.
    pub pools: PeriodTable,
    /// Period × base key, dollars (hours for DLH).
    pub bases: PeriodTable,
    pub direct_by_project: Vec<DirectCostRow>,
    pub assumptions: Assumptions,
    pub warnings: Vec<String>,
}

impl Projection {
    pub fn periods(&self) -> &[Period] {
        self.pools.index()
    }

    /// Periods strictly after the last actual.
    pub fn forecast_periods(&self) -> Vec<Period> {
        let last = self.assumptions.last_actual_period;
        self.periods().iter().copied().filter(|p| *p > last).collect()
    }
}
