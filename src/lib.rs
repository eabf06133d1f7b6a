//! # Indirect Rates
//!
//! A library for forecasting cascaded indirect cost rates (fringe, overhead, G&A) from
//! general-ledger actuals, a chart-of-accounts mapping, a project direct-cost ledger and
//! a set of sticky "what-if" scenario events.
//!
//! ## Core Concepts
//!
//! - **Pools**: indirect cost dollars per month, rolled up from ledger accounts
//! - **Bases**: allocation denominators per month (DL, DLH, TL, TCI)
//! - **Run-Rate**: the forecast horizon is filled with the flat mean of the last N actual months
//! - **Scenario Events**: deltas that apply from an effective period onward and never expire
//! - **Cascade**: lower tiers load their dollars onto the base of every higher tier
//! - **YTD**: cumulative pool over cumulative base, reset at each fiscal year start
//!
//! ## Example
//!
//! ```rust,ignore
//! use indirect_rates::*;
//!
//! let raw = load_inputs("data/")?;
//! let inputs = normalize_inputs(&raw)?;
//! let config = RateConfig::from_json_file("rates.json")?;
//!
//! let plan = ForecastPlan::for_events(&inputs.scenario_events, None)
//!     .with_horizon(12, 3)
//!     .with_fy_start(Period::new(2025, 1)?);
//!
//! for result in ForecastEngine::run(&inputs, &config, &plan, None)? {
//!     println!("{}: {} periods", result.scenario, result.periods.len());
//!     for warning in &result.warnings {
//!         println!("  warning: {}", warning);
//!     }
//! }
//! ```

pub mod aggregate;
pub mod baseline;
pub mod cascade;
pub mod config;
pub mod error;
pub mod forecast;
pub mod ingestion;
pub mod mapping;
pub mod normalize;
pub mod period;
pub mod projection;
pub mod scenario;
pub mod schema;
pub mod table;
pub mod ytd;

pub use aggregate::{ActualAggregates, Aggregator, RECONCILIATION_TOLERANCE};
pub use baseline::BaselineProjector;
pub use cascade::{compute_period_rates, CascadeRateEngine, ProjectImpact, RateOutput};
pub use config::{BaseDefinition, BaseKey, BaseMode, RateConfig, RateDefinition};
pub use error::{IndirectRateError, Result};
pub use forecast::{
    forecast_from_dir, run_forecast, ForecastEngine, ForecastPlan, ForecastResult,
};
pub use ingestion::{load_inputs, RawInputs, RawTable};
pub use mapping::{map_accounts_to_pools, MappedLedgerEntry};
pub use normalize::{normalize_inputs, NormalizedInputs};
pub use period::{period_range, Period};
pub use projection::{Assumptions, Projection};
pub use scenario::ScenarioApplier;
pub use schema::*;
pub use table::PeriodTable;
pub use ytd::{build_rates_comparison, compute_ytd_rates, RateComparisonRow};
