//! Registry adapters behind one fetch contract.
//!
//! Each adapter owns its pagination and the mapping of the registry's
//! "last changed" metadata to a date. Streams are single pass: they page
//! lazily and stop for good after the first hard error.

mod gazetteer;
mod loc;
mod thesauri;

use std::rc::Rc;

use chrono::{DateTime, NaiveDate};

pub use gazetteer::GazetteerSource;
pub use loc::LocSource;
pub use thesauri::ThesauriSource;

use crate::config::HarvestConfig;
use crate::date::Cutoff;
use crate::error::{HarvesterError, Result};
use crate::http::{HttpTransport, Transport};
use crate::types::{RawSourceRecord, SourceName};

/// One item of a fetch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// A record changed at or after the cutoff.
    Record(RawSourceRecord),

    /// A record the registry returned but that cannot be used.
    Malformed { reason: String },
}

/// Lazy, finite sequence of fetched records.
pub type FetchStream<'a> = Box<dyn Iterator<Item = Result<Fetched>> + 'a>;

/// The fetch contract shared by every registry.
pub trait AuthoritySource {
    fn name(&self) -> SourceName;

    /// Stream every record changed at or after `cutoff`.
    fn fetch_since(&self, cutoff: Cutoff) -> FetchStream<'_>;
}

/// The closed set of supported registries.
pub enum SourceAdapter {
    Gazetteer(GazetteerSource),
    LibraryOfCongress(LocSource),
    Thesauri(ThesauriSource),
}

impl SourceAdapter {
    /// Adapter for `name`, sharing `transport` with its siblings.
    pub fn new(name: SourceName, config: &HarvestConfig, transport: Rc<dyn Transport>) -> Self {
        match name {
            SourceName::Gazetteer => Self::Gazetteer(GazetteerSource::new(config, transport)),
            SourceName::Loc => Self::LibraryOfCongress(LocSource::new(config, transport)),
            SourceName::Thesauri => Self::Thesauri(ThesauriSource::new(config, transport)),
        }
    }

    /// Adapters for `names`, all talking HTTP through one client.
    pub fn over_http(names: &[SourceName], config: &HarvestConfig) -> Result<Vec<Self>> {
        let transport: Rc<dyn Transport> = Rc::new(HttpTransport::new(config)?);
        Ok(names
            .iter()
            .map(|name| Self::new(*name, config, Rc::clone(&transport)))
            .collect())
    }
}

impl AuthoritySource for SourceAdapter {
    fn name(&self) -> SourceName {
        match self {
            Self::Gazetteer(source) => source.name(),
            Self::LibraryOfCongress(source) => source.name(),
            Self::Thesauri(source) => source.name(),
        }
    }

    fn fetch_since(&self, cutoff: Cutoff) -> FetchStream<'_> {
        match self {
            Self::Gazetteer(source) => source.fetch_since(cutoff),
            Self::LibraryOfCongress(source) => source.fetch_since(cutoff),
            Self::Thesauri(source) => source.fetch_since(cutoff),
        }
    }
}

/// Attribute transport failures to the registry.
fn unavailable(source_name: SourceName, err: HarvesterError) -> HarvesterError {
    match err {
        HarvesterError::Http(_)
        | HarvesterError::HttpStatus { .. }
        | HarvesterError::RetriesExhausted { .. } => HarvesterError::SourceUnavailable {
            source_name,
            message: err.to_string(),
        },
        other => other,
    }
}

/// GET a page the harvest cannot do without.
fn get_page(
    transport: &dyn Transport,
    source_name: SourceName,
    url: &str,
    accept: &str,
) -> Result<Vec<u8>> {
    tracing::debug!(source = %source_name, %url, "Fetching page");
    transport
        .get(url, accept)
        .map_err(|e| unavailable(source_name, e))
}

/// GET a single record. A 4xx answer means the record is gone, not the
/// registry, and yields `None`.
fn get_record(
    transport: &dyn Transport,
    source_name: SourceName,
    url: &str,
    accept: &str,
) -> Result<Option<Vec<u8>>> {
    match transport.get(url, accept) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.is_client_error() => {
            tracing::warn!(source = %source_name, %url, error = %e, "Record not retrievable");
            Ok(None)
        }
        Err(e) => Err(unavailable(source_name, e)),
    }
}

fn malformed_response(url: &str, reason: impl ToString) -> HarvesterError {
    HarvesterError::MalformedResponse {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Calendar date of a registry timestamp.
///
/// Accepts RFC 3339 timestamps (date taken in the timestamp's own offset)
/// and anything starting with `YYYY-MM-DD`.
///
/// # Examples
/// ```
/// use authority_harvester::sources::parse_change_date;
/// use chrono::NaiveDate;
///
/// let expected = NaiveDate::from_ymd_opt(2024, 1, 5);
/// assert_eq!(parse_change_date("2024-01-05T10:22:11-05:00"), expected);
/// assert_eq!(parse_change_date("2024-01-05 10:22"), expected);
/// assert_eq!(parse_change_date("yesterday"), None);
/// ```
pub fn parse_change_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

/// Move a URI minted under `canonical` onto the configured `base`, and
/// resolve root-relative links against it.
fn rebase(uri: &str, canonical: &str, base: &str) -> String {
    if let Some(rest) = uri.strip_prefix(canonical) {
        format!("{base}{rest}")
    } else if uri.starts_with('/') {
        format!("{base}{uri}")
    } else {
        uri.to_string()
    }
}
