//! End-to-end pipeline tests over in-process fixture sources.
//!
//! The fixture sources return their records unfiltered, so these tests also
//! cover the pipeline's own cutoff enforcement.

use std::fs;

use authority_harvester::date::Cutoff;
use authority_harvester::marc::{binary, xml};
use authority_harvester::output::FileOutputWriter;
use authority_harvester::serialize::{MarcSerializer, MarcXmlSerializer, OutputFormat, RecordSerializer};
use authority_harvester::sources::{AuthoritySource, FetchStream, Fetched};
use authority_harvester::state::{FileRunStateStore, InMemoryRunStateStore, RunStateStore};
use authority_harvester::types::{Label, RawPayload, RawSourceRecord, SkosConcept};
use authority_harvester::{normalize, DateSpec, HarvestPipeline, HarvesterError, SourceName, Stage};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn today() -> NaiveDate {
    date("2024-02-01")
}

#[derive(Clone)]
enum Item {
    Concept { id: &'static str, changed: &'static str },
    NoIdentifier,
    Marc(&'static str),
    Unavailable,
}

/// A thesauri-like source serving canned items in order.
struct FixtureSource(Vec<Item>);

impl FixtureSource {
    fn dated() -> Self {
        Self(vec![
            Item::Concept { id: "_a", changed: "2023-01-01" },
            Item::Concept { id: "_b", changed: "2023-06-01" },
            Item::Concept { id: "_c", changed: "2024-01-01" },
        ])
    }
}

fn concept(id: &str, changed: &str) -> RawSourceRecord {
    RawSourceRecord {
        source: SourceName::Thesauri,
        changed: Some(date(changed)),
        payload: RawPayload::Skos(SkosConcept {
            about: format!("http://thesauri.dainst.org/{id}"),
            pref_labels: vec![Label::new(format!("Begriff {id}")).with_language("de")],
            alt_labels: vec![Label::new(format!("Synonym {id}")).with_language("de")],
            ..SkosConcept::default()
        }),
    }
}

impl AuthoritySource for FixtureSource {
    fn name(&self) -> SourceName {
        SourceName::Thesauri
    }

    fn fetch_since(&self, _cutoff: Cutoff) -> FetchStream<'_> {
        Box::new(self.0.iter().map(|item| match item {
            Item::Concept { id, changed } => Ok(Fetched::Record(concept(id, changed))),
            Item::NoIdentifier => Ok(Fetched::Record(RawSourceRecord {
                source: SourceName::Thesauri,
                changed: Some(date("2023-07-01")),
                payload: RawPayload::Skos(SkosConcept::default()),
            })),
            Item::Marc(xml) => Ok(Fetched::Record(RawSourceRecord {
                source: SourceName::Loc,
                changed: None,
                payload: RawPayload::MarcXml(xml.to_string()),
            })),
            Item::Unavailable => Err(HarvesterError::SourceUnavailable {
                source_name: SourceName::Thesauri,
                message: "connection refused".to_string(),
            }),
        }))
    }
}

fn identifiers(bytes: &[u8]) -> Vec<String> {
    binary::decode(bytes)
        .unwrap()
        .iter()
        .filter_map(|r| r.control_value("001").map(String::from))
        .collect()
}

#[test]
fn test_incremental_selects_records_since_cutoff_in_order() {
    let dir = tempdir().unwrap();
    let store = InMemoryRunStateStore::default();
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource::dated();

    let mut pipeline = HarvestPipeline::new(&store, &writer, OutputFormat::Marc);
    let report = pipeline
        .run_at(&DateSpec::Date("2023-06-01".to_string()), &[&source], today())
        .unwrap();

    assert_eq!(pipeline.stage(), Stage::Done);
    assert_eq!(report.cutoff, Cutoff::Since(date("2023-06-01")));
    let bytes = fs::read(dir.path().join("thesauri_authority.mrc")).unwrap();
    assert_eq!(identifiers(&bytes), ["thesauri:_b", "thesauri:_c"]);
    assert_eq!(store.read_last_cutoff(), Some(date("2023-06-01")));
}

#[test]
fn test_full_dump_selects_everything() {
    let dir = tempdir().unwrap();
    let store = InMemoryRunStateStore::default();
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource::dated();

    let report = HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
        .run_at(&DateSpec::FullDump, &[&source], today())
        .unwrap();

    assert_eq!(report.cutoff, Cutoff::FullDump);
    let bytes = fs::read(&report.documents[0].path).unwrap();
    assert_eq!(identifiers(&bytes), ["thesauri:_a", "thesauri:_b", "thesauri:_c"]);
    assert_eq!(store.read_last_cutoff(), Some(today()));
}

#[test]
fn test_offset_selects_relative_to_today() {
    let dir = tempdir().unwrap();
    let store = InMemoryRunStateStore::default();
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource::dated();

    let report = HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
        .run_at(&DateSpec::Offset(31), &[&source], today())
        .unwrap();

    assert_eq!(report.cutoff, Cutoff::Since(date("2024-01-01")));
    assert_eq!(report.record_count(), 1);
}

#[test]
fn test_record_without_identifier_is_a_warning() {
    let dir = tempdir().unwrap();
    let store = InMemoryRunStateStore::default();
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource(vec![
        Item::Concept { id: "_a", changed: "2023-06-01" },
        Item::NoIdentifier,
        Item::Concept { id: "_c", changed: "2024-01-01" },
    ]);

    let mut pipeline = HarvestPipeline::new(&store, &writer, OutputFormat::Marc);
    let report = pipeline
        .run_at(&DateSpec::Date("2023-01-01".to_string()), &[&source], today())
        .unwrap();

    assert_eq!(pipeline.stage(), Stage::Done);
    assert_eq!(report.record_count(), 2);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].source, SourceName::Thesauri);
    let bytes = fs::read(&report.documents[0].path).unwrap();
    assert_eq!(identifiers(&bytes), ["thesauri:_a", "thesauri:_c"]);
}

#[test]
fn test_fetch_failure_leaves_run_state_unchanged() {
    let dir = tempdir().unwrap();
    let store = FileRunStateStore::in_dir(dir.path());
    store.write_last_cutoff(date("2023-05-01")).unwrap();
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource(vec![
        Item::Concept { id: "_a", changed: "2023-06-01" },
        Item::Unavailable,
    ]);

    let mut pipeline = HarvestPipeline::new(&store, &writer, OutputFormat::MarcXml);
    let err = pipeline
        .run_at(&DateSpec::Resume, &[&source], today())
        .unwrap_err();

    assert_eq!(pipeline.stage(), Stage::Aborted);
    assert_eq!(err.stage(), Some(Stage::Fetching));
    assert_eq!(err.kind(), "SourceUnavailable");
    assert_eq!(fs::read_to_string(store.path()).unwrap(), "2023-05-01");
    assert!(!dir.path().join("thesauri_authority.marcxml").exists());
}

#[test]
fn test_resume_continues_from_recorded_cutoff() {
    let dir = tempdir().unwrap();
    let store = FileRunStateStore::in_dir(dir.path());
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource::dated();

    HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
        .run_at(&DateSpec::Date("2023-06-01".to_string()), &[&source], today())
        .unwrap();
    let report = HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
        .run_at(&DateSpec::Resume, &[&source], today())
        .unwrap();

    assert_eq!(report.cutoff, Cutoff::Since(date("2023-06-01")));
    assert_eq!(report.record_count(), 2);
}

#[test]
fn test_resume_without_state_aborts_before_fetching() {
    let dir = tempdir().unwrap();
    let store = FileRunStateStore::in_dir(dir.path());
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource(vec![Item::Unavailable]);

    let err = HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
        .run_at(&DateSpec::Resume, &[&source], today())
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ResolvingDate));
    assert!(err.is_configuration());
}

#[test]
fn test_unsupported_record_fails_serialization() {
    let dir = tempdir().unwrap();
    let store = InMemoryRunStateStore::new(Some(date("2020-01-01")));
    let writer = FileOutputWriter::new(dir.path());
    let source = FixtureSource(vec![Item::Marc(
        r#"<record><controlfield tag="001">sh85000001</controlfield><datafield tag="199" ind1=" " ind2=" "><subfield code="a">?</subfield></datafield></record>"#,
    )]);

    let err = HarvestPipeline::new(&store, &writer, OutputFormat::Marc)
        .run_at(&DateSpec::FullDump, &[&source], today())
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Serializing));
    assert_eq!(err.kind(), "UnsupportedRecord");
    assert_eq!(store.read_last_cutoff(), Some(date("2020-01-01")));
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn test_serialization_is_deterministic() {
    let records: Vec<_> = ["_a", "_b", "_c"]
        .iter()
        .map(|id| normalize::normalize(concept(id, "2023-06-01")).unwrap())
        .collect();

    for serializer in [&MarcSerializer as &dyn RecordSerializer, &MarcXmlSerializer] {
        let first = serializer.serialize(&records).unwrap();
        let second = serializer.serialize(&records).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.record_count, 3);
    }
}

#[test]
fn test_marc_and_marcxml_carry_the_same_fields() {
    let mut records: Vec<_> = ["_a", "_b"]
        .iter()
        .map(|id| normalize::normalize(concept(id, "2023-06-01")).unwrap())
        .collect();
    records.push(
        normalize::normalize(RawSourceRecord {
            source: SourceName::Loc,
            changed: None,
            payload: RawPayload::MarcXml(
                r#"<record xmlns="http://www.loc.gov/MARC21/slim"><leader>00000cz  a2200000n  4500</leader><controlfield tag="001">n 79021164</controlfield><datafield tag="100" ind1="1" ind2=" "><subfield code="a">Twain, Mark,</subfield><subfield code="d">1835-1910</subfield></datafield></record>"#
                    .to_string(),
            ),
        })
        .unwrap(),
    );

    let marc = MarcSerializer.serialize(&records).unwrap();
    let marcxml = MarcXmlSerializer.serialize(&records).unwrap();

    let from_marc = binary::decode(&marc.bytes).unwrap();
    let from_xml = xml::parse_collection(std::str::from_utf8(&marcxml.bytes).unwrap()).unwrap();
    assert_eq!(from_marc, from_xml);
    assert_eq!(from_marc.len(), 3);
}

#[test]
fn test_control_characters_do_not_split_subfields() {
    let raw = RawSourceRecord {
        source: SourceName::Gazetteer,
        changed: Some(date("2024-01-05")),
        payload: RawPayload::Gazetteer {
            place: serde_json::json!({
                "gazId": "2078206",
                "prefName": {"title": "Rom\u{1f}xStadt", "language": "ita"},
                "names": [{"title": "Roma\u{1e}\u{1d}antica"}]
            }),
            ancestors: Vec::new(),
        },
    };
    let records = vec![normalize::normalize(raw).unwrap()];

    let marc = MarcSerializer.serialize(&records).unwrap();
    let marcxml = MarcXmlSerializer.serialize(&records).unwrap();

    let from_marc = binary::decode(&marc.bytes).unwrap();
    let from_xml = xml::parse_collection(std::str::from_utf8(&marcxml.bytes).unwrap()).unwrap();
    assert_eq!(from_marc, from_xml);

    let heading = from_marc[0].heading().unwrap();
    assert_eq!(heading.subfield('a'), Some("RomxStadt"));
    assert_eq!(heading.subfield('x'), None);
    let alternates: Vec<&str> = from_marc[0]
        .fields_with_tag("451")
        .filter_map(|f| f.subfield('a'))
        .collect();
    assert_eq!(alternates, ["Romaantica"]);
}

#[test]
fn test_unclean_values_are_rejected_by_both_serializers() {
    let mut record = normalize::normalize(concept("_a", "2023-06-01")).unwrap();
    record.preferred_label.text = "Begriff\u{1f}xEingeschmuggelt".to_string();
    let records = vec![record];

    for serializer in [&MarcSerializer as &dyn RecordSerializer, &MarcXmlSerializer] {
        let err = serializer.serialize(&records).unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidMarc(_)));
    }
}
