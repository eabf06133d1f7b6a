use crate::config::{BaseKey, RateConfig};
use crate::mapping::MappedLedgerEntry;
use crate::period::Period;
use crate::schema::{DirectCostDelta, DirectCostRow};
use crate::table::PeriodTable;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};

/// Relative drift between ledger-derived and project-ledger bases that triggers a warning.
pub const RECONCILIATION_TOLERANCE: f64 = 0.05;

/// Actual (observed) pools and bases, indexed contiguously over the actual pool periods.
#[derive(Debug, Clone, Default)]
pub struct ActualAggregates {
    pub pools: PeriodTable,
    pub bases: PeriodTable,
    pub direct_by_project: Vec<DirectCostRow>,
    pub warnings: Vec<String>,
}

/// Sums the five direct-cost components per period.
pub fn direct_totals_by_period(rows: &[DirectCostRow]) -> BTreeMap<Period, DirectCostDelta> {
    let mut totals: BTreeMap<Period, DirectCostDelta> = BTreeMap::new();
    for row in rows {
        totals
            .entry(row.period)
            .or_default()
            .accumulate(&row.components());
    }
    totals
}

/// Writes the four standard base keys for one period from direct-cost totals.
pub(crate) fn set_bases_from_totals(bases: &mut PeriodTable, period: Period, totals: &DirectCostDelta) {
    bases.set(period, BaseKey::DirectLabor.as_str(), totals.direct_labor);
    bases.set(period, BaseKey::DirectLaborHours.as_str(), totals.direct_labor_hours);
    bases.set(period, BaseKey::TotalLabor.as_str(), totals.direct_labor);
    bases.set(period, BaseKey::TotalCostInput.as_str(), totals.total_cost_input());
}

/// Legacy bases: every base key summed from the project direct-cost ledger.
pub fn bases_from_direct_costs(index: Vec<Period>, rows: &[DirectCostRow]) -> PeriodTable {
    let mut bases = PeriodTable::new(index);
    for key in BaseKey::ALL {
        bases.ensure_column(key.as_str());
    }
    for (period, totals) in direct_totals_by_period(rows) {
        set_bases_from_totals(&mut bases, period, &totals);
    }
    bases
}

pub struct Aggregator<'a> {
    config: &'a RateConfig,
    entity: Option<String>,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a RateConfig) -> Self {
        Self {
            config,
            entity: None,
        }
    }

    /// Restricts aggregation to a single reporting entity.
    pub fn with_entity(mut self, entity: Option<&str>) -> Self {
        self.entity = entity.map(|e| e.to_string());
        self
    }

    pub fn aggregate(
        &self,
        gl_mapped: &[MappedLedgerEntry],
        direct_costs: &[DirectCostRow],
    ) -> ActualAggregates {
        let mut warnings = Vec::new();

        let (ledger, direct) = self.filter_entity(gl_mapped, direct_costs, &mut warnings);

        let unallowable = &self.config.unallowable_pool_names;
        let valid: Vec<&MappedLedgerEntry> = ledger
            .iter()
            .copied()
            .filter(|e| !e.is_unallowable && !unallowable.contains(&e.pool))
            .collect();

        let (Some(first), Some(last)) = (
            valid.iter().map(|e| e.period).min(),
            valid.iter().map(|e| e.period).max(),
        ) else {
            debug!("No allowable pool rows remain after mapping and exclusions");
            return ActualAggregates {
                pools: PeriodTable::default(),
                bases: PeriodTable::default(),
                direct_by_project: direct,
                warnings,
            };
        };

        let mut pools = PeriodTable::over_range(first, last);
        for entry in &valid {
            pools.add(entry.period, &entry.pool, entry.amount);
        }

        info!(
            "Aggregated {} allowable ledger rows into {} pools over {}..={}",
            valid.len(),
            pools.column_names().count(),
            first,
            last
        );

        let dc_bases = bases_from_direct_costs(pools.index().to_vec(), &direct);

        let bases = match self.config.ledger_base_accounts() {
            Some(base_map) => {
                let gl_bases = self.ledger_bases(&pools, &ledger, base_map, &dc_bases);
                warnings.extend(reconcile_bases(&gl_bases, &dc_bases));
                gl_bases
            }
            None => dc_bases,
        };

        for warning in &warnings {
            warn!("{}", warning);
        }

        ActualAggregates {
            pools,
            bases,
            direct_by_project: direct,
            warnings,
        }
    }

    fn filter_entity<'m>(
        &self,
        gl_mapped: &'m [MappedLedgerEntry],
        direct_costs: &[DirectCostRow],
        warnings: &mut Vec<String>,
    ) -> (Vec<&'m MappedLedgerEntry>, Vec<DirectCostRow>) {
        let Some(entity) = self.entity.as_deref() else {
            return (gl_mapped.iter().collect(), direct_costs.to_vec());
        };

        let ledger = if gl_mapped.iter().any(|e| e.entity.is_some()) {
            let filtered: Vec<&MappedLedgerEntry> = gl_mapped
                .iter()
                .filter(|e| e.entity.as_deref() == Some(entity))
                .collect();
            if filtered.is_empty() {
                warnings.push(format!("No GL data found for entity '{}'.", entity));
            }
            filtered
        } else {
            warnings.push("Entity filter requested but GL_Actuals has no Entity column.".to_string());
            gl_mapped.iter().collect()
        };

        // Without entity tags on the project ledger every row is kept.
        let direct = if direct_costs.iter().any(|r| r.entity.is_some()) {
            direct_costs
                .iter()
                .filter(|r| r.entity.as_deref() == Some(entity))
                .cloned()
                .collect()
        } else {
            direct_costs.to_vec()
        };

        (ledger, direct)
    }

    /// Ledger-primary bases. Every ledger row counts, whatever its pool mapping, since
    /// direct-cost accounts are usually not mapped to an indirect pool.
    fn ledger_bases(
        &self,
        pools: &PeriodTable,
        ledger: &[&MappedLedgerEntry],
        base_map: &BTreeMap<BaseKey, Vec<String>>,
        dc_bases: &PeriodTable,
    ) -> PeriodTable {
        let mut bases = PeriodTable::new(pools.index().to_vec());

        for (key, accounts) in base_map {
            let accounts: HashSet<&str> = accounts.iter().map(|a| a.trim()).collect();
            bases.ensure_column(key.as_str());
            for entry in ledger {
                if accounts.contains(entry.account.trim()) {
                    bases.add(entry.period, key.as_str(), entry.amount);
                }
            }
        }

        if bases.has_column(BaseKey::DirectLabor.as_str())
            && !bases.has_column(BaseKey::TotalLabor.as_str())
        {
            for period in pools.index() {
                let dl = bases.get(*period, BaseKey::DirectLabor.as_str());
                bases.set(*period, BaseKey::TotalLabor.as_str(), dl);
            }
        }

        // Ledger amounts carry no hours.
        bases.ensure_column(BaseKey::DirectLaborHours.as_str());
        for period in pools.index() {
            let hours = dc_bases.get(*period, BaseKey::DirectLaborHours.as_str());
            bases.set(*period, BaseKey::DirectLaborHours.as_str(), hours);
        }

        bases
    }
}

/// Warns when a ledger-derived base drifts from the project ledger by more than
/// [`RECONCILIATION_TOLERANCE`] of the ledger-derived total.
pub fn reconcile_bases(gl_bases: &PeriodTable, dc_bases: &PeriodTable) -> Vec<String> {
    let mut warnings = Vec::new();
    for key in [BaseKey::DirectLabor, BaseKey::TotalCostInput] {
        let (Some(gl), Some(dc)) = (gl_bases.column(key.as_str()), dc_bases.column(key.as_str()))
        else {
            continue;
        };
        let gl_total: f64 = gl.iter().sum();
        let dc_total: f64 = dc.iter().sum();
        if gl_total == 0.0 {
            if dc_total != 0.0 {
                warnings.push(format!(
                    "GL-derived {} base ({}) is zero while project ledger shows {}. \
                     Check base_account_map against GL account codes.",
                    key,
                    format_dollars(gl_total),
                    format_dollars(dc_total)
                ));
            }
            continue;
        }
        let pct_diff = (gl_total - dc_total).abs() / gl_total.abs();
        if pct_diff > RECONCILIATION_TOLERANCE {
            warnings.push(format!(
                "GL-derived {} base ({}) differs from project ledger ({}) by {:.1}%. \
                 Reconcile GL direct accounts with project direct costs.",
                key,
                format_dollars(gl_total),
                format_dollars(dc_total),
                pct_diff * 100.0
            ));
        }
    }
    warnings
}

fn format_dollars(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}
