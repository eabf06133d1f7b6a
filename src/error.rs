use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndirectRateError {
    #[error("No pool actuals found after mapping/unallowables; cannot forecast")]
    NoActuals,

    #[error("Rate '{rate}' references base '{base}' which is not available. Known: [{known}]")]
    UnknownBaseKey {
        rate: String,
        base: String,
        known: String,
    },

    #[error("Invalid period '{0}': expected YYYY-MM")]
    InvalidPeriod(String),

    #[error("{table} is missing required column: {column}")]
    MissingColumn { table: String, column: String },

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid fiscal year start month {0}: must be between 1 and 12")]
    InvalidFiscalYearStartMonth(u32),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndirectRateError>;
