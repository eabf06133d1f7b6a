use crate::aggregate::{direct_totals_by_period, set_bases_from_totals};
use crate::config::{BaseKey, BaseMode};
use crate::projection::Projection;
use crate::schema::{DirectCostRow, ScenarioEvent};
use crate::table::PeriodTable;
use log::{debug, info, warn};

/// Applies one scenario's sticky deltas to a baseline projection.
pub struct ScenarioApplier<'a> {
    events: &'a [ScenarioEvent],
    base_mode: BaseMode,
}

impl<'a> ScenarioApplier<'a> {
    pub fn new(events: &'a [ScenarioEvent], base_mode: BaseMode) -> Self {
        Self { events, base_mode }
    }

    /// Returns a new projection with every `scenario` event applied from its effective
    /// period onward. The baseline is returned unchanged when no event matches.
    pub fn apply(&self, baseline: &Projection, scenario: &str) -> Projection {
        let matching: Vec<&ScenarioEvent> = self
            .events
            .iter()
            .filter(|e| e.scenario == scenario)
            .collect();

        if matching.is_empty() {
            debug!("No events for scenario '{}'; baseline unchanged", scenario);
            let mut unchanged = baseline.clone();
            unchanged.assumptions.scenario = Some(scenario.to_string());
            return unchanged;
        }

        let mut pools = baseline.pools.clone();
        let mut direct = baseline.direct_by_project.clone();
        let mut warnings = baseline.warnings.clone();

        for event in &matching {
            let eff = event.effective_period;
            let applicable: Vec<_> = pools.index().iter().copied().filter(|p| *p >= eff).collect();
            if applicable.is_empty() {
                debug!("Event effective {} falls after the projection horizon", eff);
                continue;
            }

            for (pool, amount) in &event.pool_deltas {
                pools.ensure_column(pool);
                for period in &applicable {
                    pools.add(*period, pool, *amount);
                }
            }

            let Some(project) = event.project.as_deref().map(str::trim).filter(|p| !p.is_empty())
            else {
                continue;
            };

            let mut touched = 0usize;
            for row in direct
                .iter_mut()
                .filter(|r| r.project == project && r.period >= eff)
            {
                row.apply_delta(&event.direct_deltas);
                touched += 1;
            }

            if touched == 0 && !event.direct_deltas.is_zero() {
                let warning = format!(
                    "Scenario '{}' event for project '{}' effective {} matched no direct cost rows.",
                    scenario, project, eff
                );
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        let bases = match self.base_mode {
            BaseMode::LedgerAccounts => shift_ledger_bases(baseline, &direct),
            BaseMode::ProjectLedger => recompute_bases(&baseline.bases, &direct),
        };

        let mut assumptions = baseline.assumptions.clone();
        assumptions.scenario = Some(scenario.to_string());
        assumptions.events_applied = matching.len();

        info!(
            "Applied {} event(s) for scenario '{}'",
            matching.len(),
            scenario
        );

        Projection {
            pools,
            bases,
            direct_by_project: direct,
            assumptions,
            warnings,
        }
    }
}

/// Ledger-primary: add only the change in direct-cost components, preserving
/// whatever ledger-only content the bases already hold.
fn shift_ledger_bases(baseline: &Projection, adjusted: &[DirectCostRow]) -> PeriodTable {
    let bases = &baseline.bases;
    let mut out = bases.clone();
    let before = direct_totals_by_period(&baseline.direct_by_project);
    let after = direct_totals_by_period(adjusted);

    for period in bases.index() {
        let (Some(old), Some(new)) = (before.get(period), after.get(period)) else {
            continue;
        };
        let delta = new.minus(old);
        let shifts = [
            (BaseKey::DirectLabor, delta.direct_labor),
            (BaseKey::TotalLabor, delta.direct_labor),
            (BaseKey::DirectLaborHours, delta.direct_labor_hours),
            (BaseKey::TotalCostInput, delta.total_cost_input()),
        ];
        for (key, amount) in shifts {
            if out.has_column(key.as_str()) {
                out.add(*period, key.as_str(), amount);
            }
        }
    }
    out
}

/// Legacy: bases are rebuilt from the adjusted project ledger wherever it has rows.
fn recompute_bases(bases: &PeriodTable, adjusted: &[DirectCostRow]) -> PeriodTable {
    let mut out = bases.clone();
    for (period, totals) in direct_totals_by_period(adjusted) {
        if out.position(period).is_some() {
            set_bases_from_totals(&mut out, period, &totals);
        }
    }
    out
}
