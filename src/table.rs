use crate::period::{period_range, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dense Period × column table of dollar (or hour, or ratio) values.
///
/// The index is contiguous and ascending; every column carries one value per period.
/// Reads of an unknown column or a period outside the index yield `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableParts")]
pub struct PeriodTable {
    index: Vec<Period>,
    columns: BTreeMap<String, Vec<f64>>,
}

/// Unchecked wire shape of a [`PeriodTable`].
#[derive(Deserialize)]
struct TableParts {
    index: Vec<Period>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl TryFrom<TableParts> for PeriodTable {
    type Error = String;

    fn try_from(parts: TableParts) -> Result<Self, Self::Error> {
        if parts.index.windows(2).any(|w| w[0] >= w[1]) {
            return Err("period table index must be strictly ascending".to_string());
        }
        for (name, values) in &parts.columns {
            if values.len() != parts.index.len() {
                return Err(format!(
                    "period table column '{}' has {} values for {} periods",
                    name,
                    values.len(),
                    parts.index.len()
                ));
            }
        }
        Ok(Self {
            index: parts.index,
            columns: parts.columns,
        })
    }
}

impl PeriodTable {
    pub fn new(index: Vec<Period>) -> Self {
        Self {
            index,
            columns: BTreeMap::new(),
        }
    }

    /// An empty-column table over `start..=end`.
    pub fn over_range(start: Period, end: Period) -> Self {
        Self::new(period_range(start, end))
    }

    pub fn index(&self) -> &[Period] {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn first_period(&self) -> Option<Period> {
        self.index.first().copied()
    }

    pub fn last_period(&self) -> Option<Period> {
        self.index.last().copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn position(&self, period: Period) -> Option<usize> {
        self.index.binary_search(&period).ok()
    }

    pub fn get(&self, period: Period, column: &str) -> f64 {
        match (self.position(period), self.columns.get(column)) {
            (Some(i), Some(values)) => values[i],
            _ => 0.0,
        }
    }

    /// Adds a zero-filled column if it does not exist yet.
    pub fn ensure_column(&mut self, name: &str) {
        let len = self.index.len();
        self.columns
            .entry(name.to_string())
            .or_insert_with(|| vec![0.0; len]);
    }

    pub fn set(&mut self, period: Period, column: &str, value: f64) {
        if let Some(i) = self.position(period) {
            self.ensure_column(column);
            if let Some(values) = self.columns.get_mut(column) {
                values[i] = value;
            }
        }
    }

    pub fn add(&mut self, period: Period, column: &str, delta: f64) {
        if let Some(i) = self.position(period) {
            self.ensure_column(column);
            if let Some(values) = self.columns.get_mut(column) {
                values[i] += delta;
            }
        }
    }

    /// Sum of the named columns in one period. Missing columns count as zero.
    pub fn sum_columns(&self, period: Period, names: &[String]) -> f64 {
        names.iter().map(|name| self.get(period, name)).sum()
    }

    /// Re-indexes onto `index`, keeping values for shared periods and zero-filling the rest.
    pub fn reindex(&self, index: Vec<Period>) -> Self {
        let mut out = Self::new(index);
        for name in self.columns.keys() {
            out.ensure_column(name);
        }
        for (i, period) in out.index.clone().into_iter().enumerate() {
            if let Some(src) = self.position(period) {
                for (name, values) in &self.columns {
                    if let Some(dst) = out.columns.get_mut(name) {
                        dst[i] = values[src];
                    }
                }
            }
        }
        out
    }

    /// Per-column arithmetic mean of the last `n` rows (all rows if fewer exist).
    pub fn tail_mean(&self, n: usize) -> BTreeMap<String, f64> {
        let len = self.index.len();
        let take = n.min(len);
        self.columns
            .iter()
            .map(|(name, values)| {
                let mean = if take == 0 {
                    0.0
                } else {
                    values[len - take..].iter().sum::<f64>() / take as f64
                };
                (name.clone(), mean)
            })
            .collect()
    }
}
