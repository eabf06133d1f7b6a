use crate::error::{IndirectRateError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub enum BaseKey {
    #[serde(rename = "DL")]
    #[schemars(description = "Direct labor dollars")]
    DirectLabor,

    #[serde(rename = "DLH")]
    #[schemars(description = "Direct labor hours (always sourced from the project direct-cost ledger)")]
    DirectLaborHours,

    #[serde(rename = "TL")]
    #[schemars(description = "Total labor dollars")]
    TotalLabor,

    #[serde(rename = "TCI")]
    #[schemars(description = "Total cost input: direct labor + subcontract + ODC + travel")]
    TotalCostInput,
}

impl BaseKey {
    pub const ALL: [BaseKey; 4] = [
        BaseKey::DirectLabor,
        BaseKey::DirectLaborHours,
        BaseKey::TotalLabor,
        BaseKey::TotalCostInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseKey::DirectLabor => "DL",
            BaseKey::DirectLaborHours => "DLH",
            BaseKey::TotalLabor => "TL",
            BaseKey::TotalCostInput => "TCI",
        }
    }
}

impl fmt::Display for BaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseKey {
    type Err = IndirectRateError;

    fn from_str(s: &str) -> Result<Self> {
        BaseKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| IndirectRateError::UnknownBaseKey {
                rate: String::new(),
                base: s.to_string(),
                known: BaseKey::ALL.map(|k| k.as_str()).join(", "),
            })
    }
}

/// Descriptive definition of a base in terms of direct-cost columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum BaseDefinition {
    #[schemars(description = "A single direct-cost column, e.g. \"DirectLabor$\"")]
    Column(String),

    #[schemars(description = "The sum of several direct-cost columns")]
    Sum { sum: Vec<String> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BaseMode {
    #[default]
    #[schemars(description = "Bases are summed from the project direct-cost ledger (legacy mode).")]
    ProjectLedger,

    #[schemars(
        description = "Bases are summed from ledger accounts listed in base_account_map (ledger-primary mode). Hours still come from the project ledger."
    )]
    LedgerAccounts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RateDefinition {
    #[serde(rename = "pool")]
    #[schemars(description = "Pool names whose dollars are summed into the rate numerator")]
    pub pool_names: Vec<String>,

    #[schemars(description = "Base key used as the rate denominator")]
    pub base: BaseKey,

    #[serde(default)]
    #[schemars(
        description = "Cascade tier. A rate's applied base includes the dollar impact of every rate at a strictly lower tier."
    )]
    pub cascade_order: u32,
}

impl RateDefinition {
    pub fn new(pool_names: &[&str], base: BaseKey, cascade_order: u32) -> Self {
        Self {
            pool_names: pool_names.iter().map(|s| s.to_string()).collect(),
            base,
            cascade_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RateConfig {
    #[serde(default)]
    pub base_definitions: BTreeMap<String, BaseDefinition>,

    pub rates: BTreeMap<String, RateDefinition>,

    #[serde(default)]
    #[schemars(description = "Pools excluded from every rate numerator")]
    pub unallowable_pool_names: BTreeSet<String>,

    #[serde(default)]
    pub base_mode: BaseMode,

    #[serde(default)]
    #[schemars(description = "Ledger accounts summed into each base key (ledger_accounts mode only)")]
    pub base_account_map: BTreeMap<BaseKey, Vec<String>>,
}

impl Default for RateConfig {
    /// Three-tier Fringe → Overhead → G&A structure.
    fn default() -> Self {
        let base_definitions = BTreeMap::from([
            ("DL".to_string(), BaseDefinition::Column("DirectLabor$".to_string())),
            ("DLH".to_string(), BaseDefinition::Column("DirectLaborHrs".to_string())),
            ("TL".to_string(), BaseDefinition::Column("DirectLabor$".to_string())),
            (
                "TCI".to_string(),
                BaseDefinition::Sum {
                    sum: ["DirectLabor$", "Subk", "ODC", "Travel"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                },
            ),
        ]);

        let rates = BTreeMap::from([
            (
                "Fringe".to_string(),
                RateDefinition::new(&["Fringe"], BaseKey::TotalLabor, 0),
            ),
            (
                "Overhead".to_string(),
                RateDefinition::new(&["Overhead"], BaseKey::DirectLabor, 1),
            ),
            (
                "G&A".to_string(),
                RateDefinition::new(&["G&A"], BaseKey::TotalCostInput, 2),
            ),
        ]);

        Self {
            base_definitions,
            rates,
            unallowable_pool_names: BTreeSet::from(["Unallowable".to_string()]),
            base_mode: BaseMode::ProjectLedger,
            base_account_map: BTreeMap::new(),
        }
    }
}

impl RateConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RateConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RateConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }

    /// Structural checks. Returns non-fatal warnings about the configuration.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.rates.is_empty() {
            return Err(IndirectRateError::InvalidConfig(
                "at least one rate definition is required".to_string(),
            ));
        }

        for (name, rate) in &self.rates {
            if rate.pool_names.is_empty() {
                return Err(IndirectRateError::InvalidConfig(format!(
                    "rate '{}' does not name any pool",
                    name
                )));
            }
        }

        match self.base_mode {
            BaseMode::LedgerAccounts => {
                if self.base_account_map.values().all(|accounts| accounts.is_empty()) {
                    return Err(IndirectRateError::InvalidConfig(
                        "base_mode 'ledger_accounts' requires a non-empty base_account_map"
                            .to_string(),
                    ));
                }
            }
            BaseMode::ProjectLedger => {
                if !self.base_account_map.is_empty() {
                    warnings.push(
                        "base_account_map is configured but base_mode is 'project_ledger'; \
                         bases come from the project ledger and the map is ignored."
                            .to_string(),
                    );
                }
            }
        }

        Ok(warnings)
    }

    /// The base-account map when running ledger-primary, `None` in legacy mode.
    pub fn ledger_base_accounts(&self) -> Option<&BTreeMap<BaseKey, Vec<String>>> {
        match self.base_mode {
            BaseMode::LedgerAccounts => Some(&self.base_account_map),
            BaseMode::ProjectLedger => None,
        }
    }

    /// Rate definitions grouped by ascending cascade tier.
    pub fn rates_by_tier(&self) -> BTreeMap<u32, Vec<(&str, &RateDefinition)>> {
        let mut tiers: BTreeMap<u32, Vec<(&str, &RateDefinition)>> = BTreeMap::new();
        for (name, rate) in &self.rates {
            tiers
                .entry(rate.cascade_order)
                .or_default()
                .push((name.as_str(), rate));
        }
        tiers
    }

    pub fn rate_names(&self) -> Vec<String> {
        self.rates.keys().cloned().collect()
    }
}
