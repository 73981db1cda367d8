//! The harvest state machine.
//!
//! `Idle → ResolvingDate → Fetching ⇄ Normalizing → Serializing → Writing → Done`,
//! with `Aborted` reachable from every stage after `Idle`. Nothing outside
//! the process changes before `Writing`, and the run state is written last.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::date::{self, Cutoff, DateSpec};
use crate::error::{HarvesterError, Result};
use crate::normalize::normalize;
use crate::output::OutputWriter;
use crate::serialize::{OutputDocument, OutputFormat};
use crate::sources::{AuthoritySource, Fetched};
use crate::state::RunStateStore;
use crate::types::{AuthorityRecord, SourceName};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    ResolvingDate,
    Fetching,
    Normalizing,
    Serializing,
    Writing,
    Done,
    Aborted,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ResolvingDate => "resolving date",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Serializing => "serializing",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestWarning {
    pub source: SourceName,
    pub message: String,
}

impl fmt::Display for HarvestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}

/// A document that reached the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDocument {
    pub source: SourceName,
    pub path: PathBuf,
    pub record_count: usize,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub cutoff: Cutoff,
    /// Date persisted as the next resume point.
    pub recorded: NaiveDate,
    pub documents: Vec<WrittenDocument>,
    pub warnings: Vec<HarvestWarning>,
}

impl HarvestReport {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.documents.iter().map(|d| d.record_count).sum()
    }
}

/// Drives one harvest from date resolution to the run-state update.
pub struct HarvestPipeline<'a> {
    store: &'a dyn RunStateStore,
    writer: &'a dyn OutputWriter,
    format: OutputFormat,
    stage: Stage,
    observer: Option<Box<dyn FnMut(Stage, &str) + 'a>>,
}

impl<'a> HarvestPipeline<'a> {
    pub fn new(store: &'a dyn RunStateStore, writer: &'a dyn OutputWriter, format: OutputFormat) -> Self {
        Self {
            store,
            writer,
            format,
            stage: Stage::Idle,
            observer: None,
        }
    }

    /// Call `observer` with the stage and a short detail on every transition.
    pub fn with_observer(mut self, observer: impl FnMut(Stage, &str) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run against the local calendar date.
    pub fn run(&mut self, spec: &DateSpec, sources: &[&dyn AuthoritySource]) -> Result<HarvestReport> {
        self.run_at(spec, sources, chrono::Local::now().date_naive())
    }

    /// Run with an explicit `today`.
    ///
    /// On failure the error is `Aborted` with the failing stage, and the run
    /// state is left as it was.
    pub fn run_at(
        &mut self,
        spec: &DateSpec,
        sources: &[&dyn AuthoritySource],
        today: NaiveDate,
    ) -> Result<HarvestReport> {
        self.enter(Stage::ResolvingDate, "");
        let store = self.store;
        let cutoff = date::resolve_at(spec, store, today).map_err(|e| self.abort(e))?;
        tracing::info!(%cutoff, sources = sources.len(), format = %self.format, "Harvest started");

        let mut warnings = Vec::new();
        let mut batches = Vec::with_capacity(sources.len());
        for source in sources {
            let records = self
                .harvest(*source, cutoff, &mut warnings)
                .map_err(|e| self.abort(e))?;
            batches.push((source.name(), records));
        }

        self.enter(Stage::Serializing, "");
        let documents = self
            .serialize(&batches)
            .map_err(|e| self.abort(e))?;

        self.enter(Stage::Writing, "");
        let mut written = Vec::with_capacity(documents.len());
        for (source, document) in &documents {
            let path = self
                .writer
                .write(*source, document)
                .map_err(|e| self.abort(e))?;
            written.push(WrittenDocument {
                source: *source,
                path,
                record_count: document.record_count,
            });
        }

        let recorded = cutoff.date().unwrap_or(today);
        store
            .write_last_cutoff(recorded)
            .map_err(|e| self.abort(e))?;

        self.enter(Stage::Done, "");
        tracing::info!(
            records = written.iter().map(|d| d.record_count).sum::<usize>(),
            warnings = warnings.len(),
            %recorded,
            "Harvest finished"
        );

        Ok(HarvestReport {
            cutoff,
            recorded,
            documents: written,
            warnings,
        })
    }

    /// Fetch and normalize every record of one source, in source order.
    fn harvest(
        &mut self,
        source: &dyn AuthoritySource,
        cutoff: Cutoff,
        warnings: &mut Vec<HarvestWarning>,
    ) -> Result<Vec<AuthorityRecord>> {
        let name = source.name();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut warn = |message: String| {
            tracing::warn!(source = %name, %message, "Record skipped");
            warnings.push(HarvestWarning {
                source: name,
                message,
            });
        };

        self.enter(Stage::Fetching, name.as_str());
        for fetched in source.fetch_since(cutoff) {
            let raw = match fetched? {
                Fetched::Record(raw) => raw,
                Fetched::Malformed { reason } => {
                    warn(reason);
                    continue;
                }
            };

            if !cutoff.includes(raw.changed) {
                tracing::debug!(source = %name, changed = ?raw.changed, "Dropping record before cutoff");
                continue;
            }

            self.enter(Stage::Normalizing, name.as_str());
            match normalize(raw) {
                Ok(record) if !seen.insert(record.identifier.clone()) => {
                    warn(format!("duplicate record {}", record.identifier));
                }
                Ok(record) => records.push(record),
                Err(e @ HarvesterError::UnmappableRecord { .. }) => warn(e.to_string()),
                Err(e) => return Err(e),
            }
            self.enter(Stage::Fetching, name.as_str());
        }

        tracing::info!(source = %name, records = records.len(), "Source harvested");
        Ok(records)
    }

    fn serialize(
        &self,
        batches: &[(SourceName, Vec<AuthorityRecord>)],
    ) -> Result<Vec<(SourceName, OutputDocument)>> {
        let serializer = self.format.serializer();
        batches
            .iter()
            .map(|(source, records)| Ok((*source, serializer.serialize(records)?)))
            .collect()
    }

    fn enter(&mut self, stage: Stage, detail: &str) {
        if self.stage != stage {
            tracing::debug!(from = %self.stage, to = %stage, detail, "Stage transition");
        }
        self.stage = stage;
        if let Some(observer) = self.observer.as_mut() {
            observer(stage, detail);
        }
    }

    fn abort(&mut self, err: HarvesterError) -> HarvesterError {
        let stage = self.stage;
        self.enter(Stage::Aborted, "");
        tracing::error!(%stage, error = %err, "Harvest aborted");
        HarvesterError::Aborted {
            stage,
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::FileOutputWriter;
    use crate::sources::FetchStream;
    use crate::state::InMemoryRunStateStore;
    use crate::types::{RawPayload, RawSourceRecord, SkosConcept};
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    struct Canned(Vec<Result<Fetched>>);

    impl AuthoritySource for Canned {
        fn name(&self) -> SourceName {
            SourceName::Thesauri
        }

        fn fetch_since(&self, _cutoff: Cutoff) -> FetchStream<'_> {
            let items: Vec<Result<Fetched>> = self
                .0
                .iter()
                .map(|item| match item {
                    Ok(fetched) => Ok(fetched.clone()),
                    Err(e) => Err(HarvesterError::SourceUnavailable {
                        source_name: SourceName::Thesauri,
                        message: e.to_string(),
                    }),
                })
                .collect();
            Box::new(items.into_iter())
        }
    }

    fn concept(id: &str) -> Fetched {
        Fetched::Record(RawSourceRecord {
            source: SourceName::Thesauri,
            changed: None,
            payload: RawPayload::Skos(SkosConcept {
                about: format!("http://thesauri.dainst.org/{id}"),
                ..SkosConcept::default()
            }),
        })
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::ResolvingDate.to_string(), "resolving date");
        assert_eq!(Stage::Done.to_string(), "done");
    }

    #[test]
    fn test_duplicates_and_unmappable_become_warnings() {
        let dir = tempdir().unwrap();
        let store = InMemoryRunStateStore::default();
        let writer = FileOutputWriter::new(dir.path());
        let source = Canned(vec![Ok(concept("_a")), Ok(concept("_a")), Ok(concept(""))]);

        let mut pipeline = HarvestPipeline::new(&store, &writer, OutputFormat::Marc);
        let report = pipeline
            .run_at(&DateSpec::FullDump, &[&source], date("2024-05-01"))
            .unwrap();

        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(report.record_count(), 1);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.recorded, date("2024-05-01"));
        assert_eq!(store.read_last_cutoff(), Some(date("2024-05-01")));
    }

    #[test]
    fn test_configuration_error_aborts_before_fetching() {
        let dir = tempdir().unwrap();
        let store = InMemoryRunStateStore::default();
        let writer = FileOutputWriter::new(dir.path());
        let source = Canned(vec![Ok(concept("_a"))]);

        let mut stages = Vec::new();
        let err = {
            let mut pipeline = HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
                .with_observer(|stage, _| stages.push(stage));
            pipeline
                .run_at(&DateSpec::Resume, &[&source], date("2024-05-01"))
                .unwrap_err()
        };

        assert_eq!(err.stage(), Some(Stage::ResolvingDate));
        assert!(matches!(
            err,
            HarvesterError::Aborted { ref source, .. } if matches!(**source, HarvesterError::NoPriorRunState(_))
        ));
        assert_eq!(stages, vec![Stage::ResolvingDate, Stage::Aborted]);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
