use anyhow::Result;
use indirect_rates::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const TOLERANCE: f64 = 1e-6;

fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < TOLERANCE
}

fn p(s: &str) -> Period {
    Period::parse(s).expect("valid period")
}

fn write_inputs(name: &str, gl: &str, map: &str, direct: &str, events: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("indirect-rates-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("GL_Actuals.csv"), gl)?;
    fs::write(dir.join("Account_Map.csv"), map)?;
    fs::write(dir.join("Direct_Costs_By_Project.csv"), direct)?;
    fs::write(dir.join("Scenario_Events.csv"), events)?;
    Ok(dir)
}

/// Six months of a small contractor: two projects, fringe split into sub-pools,
/// one unallowable account and one account nobody mapped.
fn contractor_gl() -> String {
    let mut gl = String::from("Period,Account,Amount,Entity\n");
    for month in 1..=6 {
        let period = format!("2025-{:02}", month);
        for (account, amount) in [
            ("5100", 15_000.0),
            ("5200", 10_000.0),
            ("6000", 12_000.0 + month as f64 * 500.0),
            ("7000", 22_500.0),
            ("8000", 3_000.0),
            ("9999", 1_000.0),
            ("4000", 100_000.0),
            ("4100", 50_000.0),
        ] {
            gl.push_str(&format!("{},{},{},ACME\n", period, account, amount));
        }
        gl.push_str(&format!("{},6000,7777,OTHERCO\n", period));
    }
    gl
}

const CONTRACTOR_MAP: &str = "\
Account,Pool,BaseCategory,IsUnallowable,Notes
5100,Fringe1,,false,Payroll taxes
5200,Fringe2,,false,Health
6000,Overhead,,false,
7000,G&A,,false,
8000,Entertainment,,true,Unallowable
4000,Direct Labor,DL,false,
4100,Subcontracts,TCI,false,
";

fn contractor_direct() -> String {
    let mut direct = String::from(
        "Period,Project,DirectLabor$,DirectLaborHrs,Subk,ODC,Travel,Entity\n",
    );
    for month in 1..=6 {
        let period = format!("2025-{:02}", month);
        direct.push_str(&format!("{},P-100,60000,500,30000,0,0,ACME\n", period));
        direct.push_str(&format!("{},P-200,40000,300,20000,0,0,ACME\n", period));
    }
    direct
}

const CONTRACTOR_EVENTS: &str = "\
Scenario,EffectivePeriod,Type,Project,DeltaDirectLabor$,DeltaDirectLaborHrs,DeltaSubk,DeltaPoolFringe1,DeltaPoolGA,Notes
Win,2025-08,WIN,P-300,30000,,,,,New award
Win,2025-08,ADJUST,P-100,20000,150,,,,Ramp up
Hire,2025-07,HIRE,,,,,2500,,Benefits renewal
Hire,2025-09,ADJUST,,,,,,1000,Rent escalator
";

fn contractor_config() -> RateConfig {
    let mut config = RateConfig::default();
    config.rates = BTreeMap::from([
        (
            "Fringe".to_string(),
            RateDefinition::new(&["Fringe1", "Fringe2"], BaseKey::TotalLabor, 0),
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
    config
}

fn contractor_dir(name: &str) -> Result<PathBuf> {
    write_inputs(
        name,
        &contractor_gl(),
        CONTRACTOR_MAP,
        &contractor_direct(),
        CONTRACTOR_EVENTS,
    )
}

#[test]
fn test_csv_directory_pipeline() -> Result<()> {
    let dir = contractor_dir("pipeline")?;
    let raw = load_inputs(&dir)?;
    assert_eq!(raw.entities(), vec!["ACME", "OTHERCO"]);

    let inputs = normalize_inputs(&raw)?;
    let plan = ForecastPlan::for_events(&inputs.scenario_events, None)
        .with_horizon(6, 3)
        .with_entity("ACME");
    assert_eq!(plan.scenarios, vec!["Hire", "Win"]);

    let config = contractor_config();
    let results = ForecastEngine::run(&inputs, &config, &plan, None)?;
    assert_eq!(results.len(), 2);

    let hire = &results[0];
    assert_eq!(hire.scenario, "Hire");
    assert_eq!(hire.periods.first().copied(), Some(p("2025-01")));
    assert_eq!(hire.periods.last().copied(), Some(p("2025-12")));

    // Sub-pools sum into one rate; unallowable and unmapped dollars never reach a pool
    assert!(approx(hire.rate(p("2025-01"), "Fringe"), 0.25));
    assert!(!hire.pools.has_column("Entertainment"));
    assert!(!hire.pools.has_column("Unmapped"));
    assert!(hire
        .warnings
        .iter()
        .any(|w| w.contains("no Account_Map match")));

    // Entity filter drops the OTHERCO overhead line
    assert!(approx(hire.pools.get(p("2025-01"), "Overhead"), 12_500.0));

    // Hire: +2,500 fringe from July, +1,000 G&A (legacy GA column) from September
    let jun_fringe = hire.pools.get(p("2025-06"), "Fringe1");
    assert!(approx(hire.pools.get(p("2025-07"), "Fringe1"), jun_fringe + 2_500.0));
    assert!(approx(hire.pools.get(p("2025-12"), "Fringe1"), 15_000.0 + 2_500.0));
    assert!(approx(hire.pools.get(p("2025-08"), "G&A"), 22_500.0));
    assert!(approx(hire.pools.get(p("2025-09"), "G&A"), 23_500.0));

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_project_win_and_unmatched_project() -> Result<()> {
    let dir = contractor_dir("win")?;
    let config = contractor_config();
    let plan = ForecastPlan::for_events(&[], Some("Win")).with_horizon(6, 3);
    let results = forecast_from_dir(&dir, &config, &plan, None)?;
    let win = &results[0];

    let p100: Vec<&ProjectImpact> = win.impacts_for("P-100").collect();
    let jul = p100.iter().find(|i| i.period == p("2025-07")).expect("July row");
    let aug = p100.iter().find(|i| i.period == p("2025-08")).expect("August row");
    assert!(approx(jul.direct_labor, 60_000.0));
    assert!(approx(aug.direct_labor, 80_000.0));

    // Legacy mode: bases recomputed from the adjusted project ledger
    assert!(approx(win.bases.get(p("2025-08"), "DL"), 120_000.0));
    assert!(win.rate(p("2025-08"), "Overhead") < win.rate(p("2025-07"), "Overhead"));

    // P-300 has no project rows at all; the event warns instead of vanishing
    assert!(win.impacts_for("P-300").next().is_none());
    assert!(win.warnings.iter().any(|w| w.contains("P-300")));

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_loaded_cost_covers_every_rate() -> Result<()> {
    let dir = contractor_dir("loaded")?;
    let config = contractor_config();
    let plan = ForecastPlan::default().with_horizon(3, 3);
    let results = forecast_from_dir(&dir, &config, &plan, None)?;

    for impact in &results[0].project_impacts {
        let expected = impact.total_cost_input() + impact.indirect_total();
        assert!(approx(impact.loaded_cost, expected));
        assert!(impact.rate_dollars.values().all(|d| *d >= 0.0));
    }

    // Flat configuration loads strictly less for the same inputs
    let mut flat = config.clone();
    for rate in flat.rates.values_mut() {
        rate.cascade_order = 0;
    }
    let flat_results = forecast_from_dir(&dir, &flat, &plan, None)?;
    assert_eq!(flat_results[0].rates, results[0].rates);
    for (cascaded, flat) in results[0]
        .project_impacts
        .iter()
        .zip(flat_results[0].project_impacts.iter())
    {
        assert!(cascaded.loaded_cost > flat.loaded_cost);
    }

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_runs_are_deterministic() -> Result<()> {
    let dir = contractor_dir("determinism")?;
    let config = contractor_config();
    let plan = ForecastPlan::for_events(&[], None)
        .with_horizon(6, 3)
        .with_fy_start(p("2025-01"));

    let first = forecast_from_dir(&dir, &config, &plan, None)?;
    let second = forecast_from_dir(&dir, &config, &plan, None)?;
    assert_eq!(first, second);
    assert_eq!(first[0].to_json()?, second[0].to_json()?);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_ledger_primary_bases_and_reconciliation() -> Result<()> {
    let dir = contractor_dir("ledger")?;
    let mut config = contractor_config();
    config.base_mode = BaseMode::LedgerAccounts;
    config.base_account_map = BTreeMap::from([
        (BaseKey::DirectLabor, vec!["4000".to_string()]),
        (
            BaseKey::TotalCostInput,
            vec!["4000".to_string(), "4100".to_string()],
        ),
    ]);
    let plan = ForecastPlan::default().with_horizon(3, 3).with_entity("ACME");
    let results = forecast_from_dir(&dir, &config, &plan, None)?;
    let base = &results[0];

    assert!(approx(base.bases.get(p("2025-03"), "DL"), 100_000.0));
    assert!(approx(base.bases.get(p("2025-03"), "TL"), 100_000.0));
    assert!(approx(base.bases.get(p("2025-03"), "TCI"), 150_000.0));
    // Hours always come from the project ledger
    assert!(approx(base.bases.get(p("2025-03"), "DLH"), 800.0));
    // Ledger and project ledger agree, so nothing to reconcile
    assert!(!base.warnings.iter().any(|w| w.contains("Reconcile")));

    // Ledger-only content: Win's project delta shifts bases, keeping the ledger level
    let plan = ForecastPlan::for_events(&[], Some("Win")).with_horizon(3, 3);
    let win = &forecast_from_dir(&dir, &config, &plan, None)?[0];
    assert!(approx(win.bases.get(p("2025-08"), "DL"), 120_000.0));
    assert!(approx(win.bases.get(p("2025-08"), "DLH"), 950.0));

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_ledger_primary_drift_warns() -> Result<()> {
    let gl = "\
Period,Account,Amount
2025-01,6000,10000
2025-01,4000,100000
2025-02,6000,10000
2025-02,4000,100000
";
    let map = "Account,Pool,IsUnallowable\n6000,Overhead,false\n";
    let direct = "\
Period,Project,DirectLabor$,DirectLaborHrs,Subk,ODC,Travel
2025-01,P-1,80000,600,0,0,0
2025-02,P-1,80000,600,0,0,0
";
    let dir = write_inputs("drift", gl, map, direct, "Scenario,EffectivePeriod\n")?;

    let mut config = RateConfig::default();
    config.base_mode = BaseMode::LedgerAccounts;
    config.base_account_map = BTreeMap::from([
        (BaseKey::DirectLabor, vec!["4000".to_string()]),
        (BaseKey::TotalCostInput, vec!["4000".to_string()]),
    ]);

    let results = forecast_from_dir(&dir, &config, &ForecastPlan::default(), None)?;
    let warning = results[0]
        .warnings
        .iter()
        .find(|w| w.contains("GL-derived DL base"))
        .expect("reconciliation warning");
    assert!(warning.contains("$200,000"));
    assert!(warning.contains("$160,000"));
    assert!(warning.contains("20.0%"));

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_ytd_comparison_against_reference_rates() -> Result<()> {
    let dir = contractor_dir("ytd")?;
    let config = contractor_config();
    let plan = ForecastPlan::default()
        .with_horizon(3, 3)
        .with_entity("ACME")
        .with_fy_start(p("2025-04"));

    let mut reference = ReferenceRates::default();
    reference.budget.insert(
        "Overhead".to_string(),
        BTreeMap::from([(p("2025-05"), 0.12)]),
    );
    reference.provisional.insert(
        "Overhead".to_string(),
        BTreeMap::from([(p("2025-05"), 0.13)]),
    );

    let results = forecast_from_dir(&dir, &config, &plan, Some(&reference))?;
    let base = &results[0];
    let ytd = base.ytd_rates.as_ref().expect("ytd rates");

    // April opens a fiscal year: YTD equals monthly for every rate
    for rate in config.rate_names() {
        assert!(approx(ytd.get(p("2025-04"), &rate), base.rate(p("2025-04"), &rate)));
    }

    // May overhead: (14,000 + 14,500) / 200,000, not the mean of the monthly ratios
    assert!(approx(ytd.get(p("2025-05"), "Overhead"), 28_500.0 / 200_000.0));

    let rows = &base.rate_comparison.as_ref().expect("comparison")["Overhead"];
    let may = rows.iter().find(|r| r.period == p("2025-05")).expect("May row");
    assert!(approx(may.actual, 0.145));
    assert!(approx(may.variance_to_budget, 0.145 - 0.12));
    assert!(approx(may.variance_to_provisional, 0.145 - 0.13));
    assert_eq!(may.threshold, 0.0);

    let impact = &base.project_impacts[0];
    let columns: Vec<String> = impact.columns().into_iter().map(|(name, _)| name).collect();
    assert!(columns.contains(&"LoadedCost$_ytd".to_string()));
    assert!(columns.contains(&"Overhead$_ytd".to_string()));

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_missing_input_file() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("indirect-rates-missing-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("GL_Actuals.csv"), "Period,Account,Amount\n")?;

    let err = load_inputs(&dir).unwrap_err();
    assert!(matches!(err, IndirectRateError::MissingInput(_)));

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_config_json_roundtrip_and_schema() -> Result<()> {
    let json = r#"{
        "rates": {
            "Fringe": { "pool": ["Fringe1", "Fringe2"], "base": "TL", "cascade_order": 0 },
            "Overhead": { "pool": ["Overhead"], "base": "DL", "cascade_order": 1 },
            "G&A": { "pool": ["G&A"], "base": "TCI", "cascade_order": 2 }
        },
        "unallowable_pool_names": ["Unallowable"]
    }"#;
    let config = RateConfig::from_json(json)?;
    assert_eq!(config.base_mode, BaseMode::ProjectLedger);
    assert_eq!(config.rates["Fringe"].pool_names, vec!["Fringe1", "Fringe2"]);
    assert_eq!(RateConfig::from_json(&config.to_json()?)?, config);

    let bad = json.replace("\"TCI\"", "\"XYZ\"");
    assert!(RateConfig::from_json(&bad).is_err());

    let schema = RateConfig::schema_as_json()?;
    assert!(schema.contains("cascade_order"));
    Ok(())
}

#[test]
fn test_scenarios_run_in_parallel() -> Result<()> {
    let dir = contractor_dir("parallel")?;
    let inputs = normalize_inputs(&load_inputs(&dir)?)?;
    let config = contractor_config();

    let sequential = ForecastEngine::run(
        &inputs,
        &config,
        &ForecastPlan::for_events(&inputs.scenario_events, None).with_horizon(6, 3),
        None,
    )?;

    let parallel: Vec<ForecastResult> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["Hire", "Win"]
            .iter()
            .map(|scenario| {
                let inputs = &inputs;
                let config = &config;
                scope.spawn(move || {
                    let plan = ForecastPlan::for_events(&[], Some(*scenario)).with_horizon(6, 3);
                    ForecastEngine::run(inputs, config, &plan, None)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect::<indirect_rates::Result<Vec<_>>>()
    })?
    .into_iter()
    .flatten()
    .collect();

    assert_eq!(sequential, parallel);

    fs::remove_dir_all(&dir)?;
    Ok(())
}
