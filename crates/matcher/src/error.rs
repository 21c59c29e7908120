use thiserror::Error;

/// Structural failures that abort a jurisdiction's run.
///
/// Ambiguous or incomplete records are never errors; they surface as
/// selection-flow outcomes instead.
#[derive(Debug, Error)]
pub enum MatchError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad stage setup, missing crosswalk, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Jurisdiction code not present in the configured list.
    #[error("unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),
    /// Missing required column in input data.
    #[error("{source_name}: missing column '{column}'")]
    MissingColumn { source_name: String, column: String },
    /// Non-empty date field that cannot be parsed.
    #[error("{source_name}, record '{record_id}': cannot parse date '{value}' in '{column}'")]
    DateParse {
        source_name: String,
        record_id: String,
        column: String,
        value: String,
    },
    /// Non-empty numeric field that cannot be parsed.
    #[error("{source_name}, record '{record_id}': cannot parse number '{value}' in '{column}'")]
    NumberParse {
        source_name: String,
        record_id: String,
        column: String,
        value: String,
    },
    /// The same record identifier appears twice in one jurisdiction.
    #[error("{source_name}: duplicate record id '{record_id}'")]
    DuplicateId { source_name: String, record_id: String },
    /// Crosswalk row with a vintage outside {2000, 2010, 2020}.
    #[error("crosswalk: unsupported vintage {vintage} for area '{area_id}'")]
    BadVintage { area_id: String, vintage: u16 },
    /// Outcome sets do not partition the record universe.
    #[error("selection flow for {stage}: {detail}")]
    SelectionFlow { stage: String, detail: String },
    /// CSV reader failure (malformed quoting, ragged rows, ...).
    #[error("{source_name}: {message}")]
    Csv { source_name: String, message: String },
    /// IO error (file read / artifact write).
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MatchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
