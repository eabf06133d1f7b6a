use crate::error::{IndirectRateError, Result};
use crate::ingestion::{RawInputs, RawTable};
use crate::period::Period;
use crate::schema::{
    AccountMapping, DirectCostDelta, DirectCostRow, LedgerEntry, ScenarioEvent, BASE_SCENARIO,
};
use log::{debug, warn};
use std::collections::BTreeMap;

const POOL_DELTA_PREFIX: &str = "DeltaPool";

/// Input tables coerced into their canonical typed shape.
#[derive(Debug, Clone, Default)]
pub struct NormalizedInputs {
    pub ledger: Vec<LedgerEntry>,
    pub account_map: Vec<AccountMapping>,
    pub direct_costs: Vec<DirectCostRow>,
    pub scenario_events: Vec<ScenarioEvent>,
    pub warnings: Vec<String>,
}

pub fn normalize_inputs(raw: &RawInputs) -> Result<NormalizedInputs> {
    let mut warnings = Vec::new();

    let ledger = normalize_ledger(&raw.gl_actuals, &mut warnings)?;
    let account_map = normalize_account_map(&raw.account_map, &mut warnings)?;
    let direct_costs = normalize_direct_costs(&raw.direct_costs, &mut warnings)?;
    let scenario_events = normalize_scenario_events(&raw.scenario_events, &mut warnings)?;

    debug!(
        "Normalized {} ledger rows, {} account mappings, {} direct cost rows, {} scenario events",
        ledger.len(),
        account_map.len(),
        direct_costs.len(),
        scenario_events.len()
    );

    for warning in &warnings {
        warn!("{}", warning);
    }

    Ok(NormalizedInputs {
        ledger,
        account_map,
        direct_costs,
        scenario_events,
        warnings,
    })
}

fn require_columns(table: &RawTable, label: &str, columns: &[&str]) -> Result<()> {
    for column in columns {
        if !table.has_column(column) {
            return Err(IndirectRateError::MissingColumn {
                table: label.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Parses a money or quantity cell. Accepts `$`, thousands separators and
/// accounting-style parentheses for negatives.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body.chars().filter(|c| *c != '$' && *c != ',').collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "y" | "1"
    )
}

/// Numeric cell with zero for blanks; unparseable values are counted in `bad`.
fn numeric_cell(table: &RawTable, row: usize, column: &str, bad: &mut usize) -> f64 {
    match table.cell(row, column) {
        None => 0.0,
        Some(text) => parse_amount(text).unwrap_or_else(|| {
            *bad += 1;
            0.0
        }),
    }
}

fn period_cell(table: &RawTable, row: usize, column: &str) -> Result<Option<Period>> {
    table.cell(row, column).map(Period::parse).transpose()
}

pub fn normalize_ledger(table: &RawTable, warnings: &mut Vec<String>) -> Result<Vec<LedgerEntry>> {
    require_columns(table, "GL_Actuals", &["Period", "Account", "Amount"])?;

    let mut entries = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    let mut bad_amounts = 0usize;

    for row in 0..table.len() {
        let Some(period) = period_cell(table, row, "Period")? else {
            skipped += 1;
            continue;
        };
        let Some(account) = table.cell(row, "Account") else {
            skipped += 1;
            continue;
        };
        entries.push(LedgerEntry {
            period,
            account: account.to_string(),
            amount: numeric_cell(table, row, "Amount", &mut bad_amounts),
            entity: table.cell(row, "Entity").map(|s| s.to_string()),
        });
    }

    if skipped > 0 {
        warnings.push(format!(
            "{} GL_Actuals rows lack a Period or Account and were skipped.",
            skipped
        ));
    }
    if bad_amounts > 0 {
        warnings.push(format!(
            "{} GL_Actuals rows have a non-numeric Amount; treated as 0.",
            bad_amounts
        ));
    }

    Ok(entries)
}

pub fn normalize_account_map(
    table: &RawTable,
    warnings: &mut Vec<String>,
) -> Result<Vec<AccountMapping>> {
    require_columns(table, "Account_Map", &["Account", "Pool"])?;

    if !table.has_column("IsUnallowable") {
        warnings.push("Account_Map missing IsUnallowable; defaulting to false.".to_string());
    }

    let mut mappings = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let (Some(account), Some(pool)) = (table.cell(row, "Account"), table.cell(row, "Pool"))
        else {
            continue;
        };
        mappings.push(AccountMapping {
            account: account.to_string(),
            pool: pool.to_string(),
            base_category: table.cell(row, "BaseCategory").map(|s| s.to_string()),
            is_unallowable: table.cell(row, "IsUnallowable").is_some_and(parse_flag),
            notes: table.cell(row, "Notes").map(|s| s.to_string()),
        });
    }

    Ok(mappings)
}

const DIRECT_COST_COLUMNS: [&str; 5] = ["DirectLabor$", "DirectLaborHrs", "Subk", "ODC", "Travel"];

pub fn normalize_direct_costs(
    table: &RawTable,
    warnings: &mut Vec<String>,
) -> Result<Vec<DirectCostRow>> {
    require_columns(table, "Direct_Costs_By_Project", &["Period"])?;

    if !table.has_column("Project") {
        warnings.push("Direct_Costs_By_Project missing Project; defaulting.".to_string());
    }
    for column in DIRECT_COST_COLUMNS {
        if !table.has_column(column) {
            warnings.push(format!(
                "Direct_Costs_By_Project missing {}; defaulting.",
                column
            ));
        }
    }

    let mut rows = Vec::with_capacity(table.len());
    let mut bad = 0usize;
    for row in 0..table.len() {
        let Some(period) = period_cell(table, row, "Period")? else {
            continue;
        };
        let project = table.cell(row, "Project").unwrap_or("UNKNOWN");
        rows.push(DirectCostRow {
            period,
            project: project.to_string(),
            direct_labor: numeric_cell(table, row, "DirectLabor$", &mut bad),
            direct_labor_hours: numeric_cell(table, row, "DirectLaborHrs", &mut bad),
            subcontract: numeric_cell(table, row, "Subk", &mut bad),
            odc: numeric_cell(table, row, "ODC", &mut bad),
            travel: numeric_cell(table, row, "Travel", &mut bad),
            entity: table.cell(row, "Entity").map(|s| s.to_string()),
        });
    }

    if bad > 0 {
        warnings.push(format!(
            "{} non-numeric Direct_Costs_By_Project values treated as 0.",
            bad
        ));
    }

    Ok(rows)
}

/// Pool name addressed by a `DeltaPool<Name>` column. `GA` is the legacy spelling of `G&A`.
pub fn pool_for_delta_column(column: &str) -> Option<String> {
    let name = column.strip_prefix(POOL_DELTA_PREFIX)?.trim();
    match name {
        "" => None,
        "GA" => Some("G&A".to_string()),
        other => Some(other.to_string()),
    }
}

pub fn normalize_scenario_events(
    table: &RawTable,
    warnings: &mut Vec<String>,
) -> Result<Vec<ScenarioEvent>> {
    if table.headers().is_empty() && table.is_empty() {
        return Ok(Vec::new());
    }
    if !table.has_column("EffectivePeriod") {
        warnings.push("Scenario_Events missing EffectivePeriod; no events will apply.".to_string());
        return Ok(Vec::new());
    }

    // Decoded once here so the applier works with a typed pool → delta map.
    let pool_columns: BTreeMap<String, String> = table
        .headers()
        .iter()
        .filter_map(|h| pool_for_delta_column(h).map(|pool| (h.clone(), pool)))
        .collect();

    let mut events = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    let mut bad = 0usize;

    for row in 0..table.len() {
        let Some(effective_period) = period_cell(table, row, "EffectivePeriod")? else {
            skipped += 1;
            continue;
        };

        let mut pool_deltas = BTreeMap::new();
        for (column, pool) in &pool_columns {
            let amount = numeric_cell(table, row, column, &mut bad);
            if amount != 0.0 {
                *pool_deltas.entry(pool.clone()).or_insert(0.0) += amount;
            }
        }

        events.push(ScenarioEvent {
            scenario: table
                .cell(row, "Scenario")
                .unwrap_or(BASE_SCENARIO)
                .to_string(),
            effective_period,
            event_type: table.cell(row, "Type").unwrap_or_default().to_string(),
            project: table.cell(row, "Project").map(|s| s.to_string()),
            direct_deltas: DirectCostDelta {
                direct_labor: numeric_cell(table, row, "DeltaDirectLabor$", &mut bad),
                direct_labor_hours: numeric_cell(table, row, "DeltaDirectLaborHrs", &mut bad),
                subcontract: numeric_cell(table, row, "DeltaSubk", &mut bad),
                odc: numeric_cell(table, row, "DeltaODC", &mut bad),
                travel: numeric_cell(table, row, "DeltaTravel", &mut bad),
            },
            pool_deltas,
            notes: table.cell(row, "Notes").map(|s| s.to_string()),
        });
    }

    if skipped > 0 {
        warnings.push(format!(
            "{} Scenario_Events rows lack an EffectivePeriod and were skipped.",
            skipped
        ));
    }
    if bad > 0 {
        warnings.push(format!(
            "{} non-numeric Scenario_Events deltas treated as 0.",
            bad
        ));
    }

    Ok(events)
}
