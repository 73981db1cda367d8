//! Authority Harvester - Incremental harvesting of authority records.
//!
//! This crate pulls authority records changed since a cutoff date from the
//! iDAI.gazetteer, the Library of Congress (id.loc.gov) and the iDAI.thesauri,
//! maps them into one internal record form and writes them as MARC 21
//! authority records, either ISO 2709 binary or MARCXML.
//!
//! # Example
//!
//! ```
//! use authority_harvester::date::{resolve_at, Cutoff, DateSpec};
//! use authority_harvester::state::InMemoryRunStateStore;
//! use chrono::NaiveDate;
//!
//! let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
//! let store = InMemoryRunStateStore::default();
//!
//! let cutoff = resolve_at(&DateSpec::Offset(9), &store, today).unwrap();
//! assert_eq!(cutoff, Cutoff::Since(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Constants, [`HarvestConfig`] and date validation
//! - [`date`]: Resolution of the date selection into a cutoff
//! - [`state`]: Persisted run state (`last_run_date.log`)
//! - [`http`]: HTTP transport with bounded retries
//! - [`sources`]: One adapter per registry behind a single fetch contract
//! - [`normalize`]: Mapping of registry records into [`AuthorityRecord`]
//! - [`marc`]: MARC 21 record model, ISO 2709 and MARCXML codecs
//! - [`serialize`]: Field mapping and output formats
//! - [`output`]: Atomic writing of output documents
//! - [`pipeline`]: The harvest state machine
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod date;
pub mod error;
pub mod http;
pub mod marc;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod serialize;
pub mod sources;
pub mod state;
pub mod types;
pub mod xml;

// Re-export commonly used items
pub use config::{validate_date, HarvestConfig};
pub use date::{Cutoff, DateSpec};
pub use error::{HarvesterError, Result};
pub use pipeline::{HarvestPipeline, HarvestReport, Stage};
pub use types::{AuthorityRecord, EntityType, Label, RawSourceRecord, SourceName};
