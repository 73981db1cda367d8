//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context, and `Stage` wrapping via `Aborted` so callers
//! know where a run stopped.

use thiserror::Error;

use crate::pipeline::Stage;
use crate::types::SourceName;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Date specification is not a well-formed calendar date (or lies in the future).
    #[error("Invalid date format: '{0}'. Expected YYYY-MM-DD (e.g., 2024-01-31)")]
    InvalidDateFormat(String),

    /// Negative day offset.
    #[error("Invalid day offset: {0}. Expected a non-negative number of days")]
    InvalidOffset(i64),

    /// Resume requested but no previous run was recorded.
    #[error("No previous run recorded in {0}; use --date, --offset or --full instead")]
    NoPriorRunState(String),

    /// None or several of the date modes were supplied.
    #[error("Exactly one of --date, --offset, --continue or --full must be given")]
    MissingDateSpec,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a client error (4xx).
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Transient failures persisted past the retry ceiling.
    #[error("Retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// A registry could not be reached.
    #[error("Source {source_name} unavailable: {message}")]
    SourceUnavailable {
        source_name: SourceName,
        message: String,
    },

    /// XML parsing failed.
    #[error("XML parsing failed: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// XML writing failed.
    #[error("XML writing failed: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    /// JSON decoding failed.
    #[error("JSON decoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Registry response did not have the expected shape.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The identifier of a record could not be extracted.
    #[error("Unmappable {source_name} record: {reason}")]
    UnmappableRecord {
        source_name: SourceName,
        reason: String,
    },

    /// The record's entity type has no field mapping in the output format.
    #[error("Unsupported record {identifier}: no field mapping for entity type '{entity_type}'")]
    UnsupportedRecord {
        identifier: String,
        entity_type: String,
    },

    /// MARC structure could not be encoded or decoded.
    #[error("Invalid MARC data: {0}")]
    InvalidMarc(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline stage failed; the run state was left untouched.
    #[error("Harvest aborted during {stage}: {source}")]
    Aborted {
        stage: Stage,
        #[source]
        source: Box<HarvesterError>,
    },
}

impl HarvesterError {
    /// Short, stable name of the error kind, printed by the CLI.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDateFormat(_)
            | Self::InvalidOffset(_)
            | Self::NoPriorRunState(_)
            | Self::MissingDateSpec => "ConfigurationError",
            Self::Http(_)
            | Self::HttpStatus { .. }
            | Self::RetriesExhausted { .. }
            | Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::XmlParse(_) | Self::Json(_) | Self::MalformedResponse { .. } => {
                "MalformedResponse"
            }
            Self::UnmappableRecord { .. } => "UnmappableRecord",
            Self::UnsupportedRecord { .. } => "UnsupportedRecord",
            Self::XmlWrite(_) | Self::InvalidMarc(_) => "SerializationError",
            Self::Io(_) => "IoError",
            Self::Aborted { source, .. } => source.kind(),
        }
    }

    /// Stage at which the run was aborted, if this error came out of the pipeline.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Aborted { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether the registry rejected a single request with a 4xx status.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::HttpStatus { status, .. } if (400..500).contains(status))
    }

    /// Whether this error is a configuration problem detected before any I/O.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind() == "ConfigurationError"
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
