//! Mapping of registry-native records into [`AuthorityRecord`].
//!
//! Pure functions, no I/O. Only a missing identifier is an error; everything
//! else degrades to defaults.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::error::{HarvesterError, Result};
use crate::marc::{is_forbidden_char, xml, Field, MarcRecord};
use crate::types::{
    qualified_id, AuthorityRecord, EntityType, Label, PlaceAncestor, RawPayload, RawSourceRecord,
    Relation, RelationKind, SkosConcept, SourceName,
};

/// Gazetteer place URI, capturing the numeric id.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static GAZETTEER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/place/(\d+)/?$").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Preferred heading language of the thesauri.
const THESAURI_HEADING_LANGUAGE: &str = "de";

/// Normalize a label: Unicode NFC, control characters dropped, collapsed
/// whitespace, trimmed.
///
/// # Examples
/// ```
/// use authority_harvester::normalize::clean_label;
///
/// assert_eq!(clean_label("  Rom \n (Stadt) "), "Rom (Stadt)");
/// assert_eq!(clean_label("Ko\u{308}ln"), "Köln");
/// assert_eq!(clean_label("Rom\u{1f}\u{0} Stadt"), "Rom Stadt");
/// ```
pub fn clean_label(text: &str) -> String {
    let composed: String = text.nfc().filter(|c| !is_forbidden_char(*c)).collect();
    WHITESPACE.replace_all(composed.trim(), " ").into_owned()
}

fn clean(label: &Label) -> Label {
    Label {
        text: clean_label(&label.text),
        language: label.language.clone(),
        qualifier: label.qualifier.clone(),
    }
}

fn unmappable(source_name: SourceName, reason: impl Into<String>) -> HarvesterError {
    HarvesterError::UnmappableRecord {
        source_name,
        reason: reason.into(),
    }
}

/// Map a raw record into the internal form.
pub fn normalize(raw: RawSourceRecord) -> Result<AuthorityRecord> {
    let RawSourceRecord {
        source,
        changed,
        payload,
    } = raw;

    let mut record = match &payload {
        RawPayload::Gazetteer { place, ancestors } => normalize_place(place, ancestors)?,
        RawPayload::MarcXml(xml) => normalize_marcxml(xml)?,
        RawPayload::Skos(concept) => normalize_concept(concept)?,
    };

    record.source = source;
    record.last_modified = changed.or(record.last_modified);
    record.raw_payload = payload;
    Ok(record)
}

fn empty_record(source: SourceName, identifier: String, entity_type: EntityType) -> AuthorityRecord {
    AuthorityRecord {
        identifier,
        source,
        preferred_label: Label::default(),
        alternate_labels: Vec::new(),
        entity_type,
        last_modified: None,
        relations: Vec::new(),
        notes: Vec::new(),
        raw_payload: RawPayload::MarcXml(String::new()),
    }
}

/// Gazetteer id from `gazId`, falling back to the place URI in `@id`.
pub fn gazetteer_id(place: &Value) -> Option<String> {
    match place.get("gazId") {
        Some(Value::String(id)) if !id.trim().is_empty() => return Some(id.trim().to_string()),
        Some(Value::Number(id)) => return Some(id.to_string()),
        _ => {}
    }
    place
        .get("@id")
        .and_then(Value::as_str)
        .and_then(gazetteer_id_from_uri)
}

/// Numeric id at the end of a gazetteer place URI.
pub fn gazetteer_id_from_uri(uri: &str) -> Option<String> {
    GAZETTEER_ID_PATTERN
        .captures(uri)
        .map(|caps| caps[1].to_string())
}

fn gazetteer_label(name: &Value) -> Option<Label> {
    let title = name.get("title").and_then(Value::as_str)?;
    let label = Label::new(clean_label(title));
    Some(match name.get("language").and_then(Value::as_str) {
        Some(language) => label.with_language(language),
        None => label,
    })
}

fn normalize_place(place: &Value, ancestors: &[PlaceAncestor]) -> Result<AuthorityRecord> {
    let id = gazetteer_id(place)
        .ok_or_else(|| unmappable(SourceName::Gazetteer, "place has neither gazId nor @id"))?;
    let mut record = empty_record(
        SourceName::Gazetteer,
        qualified_id(SourceName::Gazetteer, &id),
        EntityType::Place,
    );

    if let Some(label) = place.get("prefName").and_then(gazetteer_label) {
        record.preferred_label = label;
    }

    record.alternate_labels = place
        .get("names")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(gazetteer_label).collect())
        .unwrap_or_default();

    for (order, ancestor) in (1u32..).zip(ancestors) {
        let Some(label) = ancestor.pref_name.as_ref().and_then(gazetteer_label) else {
            tracing::debug!(place = %id, order, "Ancestor without prefName");
            continue;
        };
        record.relations.push(Relation {
            kind: RelationKind::Ancestor(order),
            label,
            target_id: Some(qualified_id(SourceName::Gazetteer, &ancestor.id)),
            target_uri: ancestor.uri.clone(),
        });
    }

    Ok(record)
}

/// Heading text: all alphabetic subfields of a field, space separated.
fn field_text(field: &Field) -> String {
    match field {
        Field::Control { value, .. } => clean_label(value),
        Field::Data { subfields, .. } => {
            let parts: Vec<&str> = subfields
                .iter()
                .filter(|s| s.code.is_ascii_alphabetic())
                .map(|s| s.value.as_str())
                .collect();
            clean_label(&parts.join(" "))
        }
    }
}

/// Identifier of a LoC record: 001, else the LCCN in 010 $a.
pub fn loc_id(marc: &MarcRecord) -> Option<String> {
    marc.control_value("001")
        .map(|id| id.trim().replace(' ', ""))
        .filter(|id| !id.is_empty())
        .or_else(|| {
            marc.fields_with_tag("010")
                .find_map(|f| f.subfield('a'))
                .map(|lccn| lccn.replace(' ', ""))
                .filter(|id| !id.is_empty())
        })
}

/// Date part of a 005 "date and time of latest transaction".
fn latest_transaction(marc: &MarcRecord) -> Option<NaiveDate> {
    let value = marc.control_value("005")?;
    NaiveDate::parse_from_str(value.get(..8)?, "%Y%m%d").ok()
}

fn normalize_marcxml(xml_text: &str) -> Result<AuthorityRecord> {
    let marc = xml::parse_record_str(xml_text)
        .map_err(|e| unmappable(SourceName::Loc, format!("unreadable MARCXML: {e}")))?;
    let id = loc_id(&marc).ok_or_else(|| unmappable(SourceName::Loc, "record has no 001 or 010"))?;

    let heading = marc.heading();
    let entity_type = heading
        .map(|f| EntityType::from_heading_tag(f.tag()))
        .unwrap_or(EntityType::Unknown);
    let mut record = empty_record(SourceName::Loc, qualified_id(SourceName::Loc, &id), entity_type);

    if let Some(heading) = heading {
        record.preferred_label = Label::new(field_text(heading));
    }

    record.alternate_labels = marc
        .fields
        .iter()
        .filter(|f| f.tag().starts_with('4'))
        .map(|f| Label::new(field_text(f)))
        .filter(|l| !l.is_empty())
        .collect();

    record.notes = marc
        .fields_with_tag("680")
        .map(|f| Label::new(field_text(f)))
        .collect();
    record.last_modified = latest_transaction(&marc);

    Ok(record)
}

/// Last path segment of a thesauri URI.
pub fn thesauri_id(uri: &str) -> Option<&str> {
    let id = uri.rsplit_once('/').map_or(uri, |(_, id)| id);
    (!id.is_empty() && !id.contains(':')).then_some(id)
}

fn preferred_of(labels: &[Label]) -> Option<&Label> {
    labels
        .iter()
        .find(|l| l.language.as_deref() == Some(THESAURI_HEADING_LANGUAGE))
        .or_else(|| labels.first())
}

fn normalize_concept(concept: &SkosConcept) -> Result<AuthorityRecord> {
    let id = thesauri_id(&concept.about)
        .ok_or_else(|| unmappable(SourceName::Thesauri, format!("no id in '{}'", concept.about)))?;
    let mut record = empty_record(
        SourceName::Thesauri,
        qualified_id(SourceName::Thesauri, id),
        EntityType::Subject,
    );

    let preferred = preferred_of(&concept.pref_labels);
    if let Some(label) = preferred {
        record.preferred_label = clean(label);
    }

    for label in &concept.pref_labels {
        if Some(label) != preferred {
            record.alternate_labels.push(clean(label).with_qualifier("pref label"));
        }
    }
    for label in &concept.alt_labels {
        record.alternate_labels.push(clean(label).with_qualifier("alt label"));
    }

    for broader in &concept.broader {
        let Some(label) = preferred_of(&broader.pref_labels) else {
            tracing::debug!(concept = %concept.about, broader = %broader.uri, "Broader concept without label");
            continue;
        };
        record.relations.push(Relation {
            kind: RelationKind::Broader,
            label: clean(label),
            target_id: thesauri_id(&broader.uri).map(|b| qualified_id(SourceName::Thesauri, b)),
            target_uri: Some(broader.uri.clone()),
        });
    }

    record.notes = concept.definitions.iter().map(clean).collect();
    Ok(record)
}
