use crate::error::{IndirectRateError, Result};
use log::debug;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

pub const GL_ACTUALS_FILE: &str = "GL_Actuals.csv";
pub const ACCOUNT_MAP_FILE: &str = "Account_Map.csv";
pub const DIRECT_COSTS_FILE: &str = "Direct_Costs_By_Project.csv";
pub const SCENARIO_EVENTS_FILE: &str = "Scenario_Events.csv";

/// An untyped input table: a header row plus string cells, exactly as supplied.
///
/// Cells are never coerced here; the normalizer decides what each column means.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.trim().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: &[&str]) {
        self.rows.push(cells.iter().map(|c| c.to_string()).collect());
    }

    pub fn from_reader<R: io::Read>(name: &str, reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        debug!("Read {} rows from {}", rows.len(), name);

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    pub fn from_csv_str(name: &str, text: &str) -> Result<Self> {
        Self::from_reader(name, text.as_bytes())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IndirectRateError::MissingInput(path.display().to_string()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(&name, file)?;
        debug!("Loaded {} rows from {}", table.len(), table.name());
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// The trimmed cell value, or `None` when the column is absent or the cell is blank.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(idx))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    /// Sorted distinct non-blank values of a column.
    pub fn distinct(&self, column: &str) -> Vec<String> {
        (0..self.rows.len())
            .filter_map(|row| self.cell(row, column))
            .map(|c| c.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// The four input tables of a forecast request.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub gl_actuals: RawTable,
    pub account_map: RawTable,
    pub direct_costs: RawTable,
    pub scenario_events: RawTable,
}

impl RawInputs {
    /// Distinct entity names in the ledger, empty when it has no `Entity` column.
    pub fn entities(&self) -> Vec<String> {
        self.gl_actuals.distinct("Entity")
    }
}

/// Loads the four standard CSV files from `input_dir`.
pub fn load_inputs(input_dir: impl AsRef<Path>) -> Result<RawInputs> {
    let dir = input_dir.as_ref();
    Ok(RawInputs {
        gl_actuals: RawTable::from_path(dir.join(GL_ACTUALS_FILE))?,
        account_map: RawTable::from_path(dir.join(ACCOUNT_MAP_FILE))?,
        direct_costs: RawTable::from_path(dir.join(DIRECT_COSTS_FILE))?,
        scenario_events: RawTable::from_path(dir.join(SCENARIO_EVENTS_FILE))?,
    })
}
