//! Field mapping from [`AuthorityRecord`] to MARC 21 authority fields.

use crate::config::DAI_ORGANIZATION_CODE;
use crate::error::{HarvesterError, Result};
use crate::marc::{xml, Field, MarcRecord, Subfield};
use crate::types::{AuthorityRecord, EntityType, Label, RawPayload, Relation, RelationKind, SourceName};

/// 008 positions 06-39 of a generated record (everything after "date entered").
const FIXED_DATA_TAIL: &str = "|n|azznnaabn           | a|a     d";

/// Heading tag and its indicators for an entity type.
struct HeadingSpec {
    tag: u16,
    ind1: char,
    ind2: char,
}

fn heading_spec(entity_type: EntityType) -> Option<HeadingSpec> {
    let (tag, ind1, ind2) = match entity_type {
        EntityType::Person => (100, '1', ' '),
        EntityType::CorporateBody => (110, '2', ' '),
        EntityType::Meeting => (111, '2', ' '),
        EntityType::UniformTitle => (130, ' ', '0'),
        EntityType::Subject => (150, ' ', ' '),
        EntityType::Place => (151, ' ', ' '),
        EntityType::Unknown => return None,
    };
    Some(HeadingSpec { tag, ind1, ind2 })
}

fn organization_code(source: SourceName) -> &'static str {
    match source {
        SourceName::Loc => "DLC",
        SourceName::Gazetteer | SourceName::Thesauri => DAI_ORGANIZATION_CODE,
    }
}

fn cataloging_agency(source: SourceName) -> &'static str {
    match source {
        SourceName::Gazetteer => "iDAI.gazetteer",
        SourceName::Loc => "DLC",
        SourceName::Thesauri => "Deutsches Archäologisches Institut",
    }
}

fn label_subfields(label: &Label) -> Vec<Subfield> {
    let mut subfields = vec![Subfield::new('a', label.text.as_str())];
    if let Some(language) = &label.language {
        subfields.push(Subfield::new('l', language.as_str()));
    }
    if let Some(qualifier) = &label.qualifier {
        subfields.push(Subfield::new('i', qualifier.as_str()));
    }
    subfields
}

fn relation_subfields(relation: &Relation) -> Vec<Subfield> {
    let mut subfields = vec![Subfield::new('a', relation.label.text.as_str())];
    if let Some(language) = &relation.label.language {
        subfields.push(Subfield::new('l', language.as_str()));
    }
    if let Some(id) = &relation.target_id {
        subfields.push(Subfield::new('0', id.as_str()));
    }
    if let Some(uri) = &relation.target_uri {
        subfields.push(Subfield::new('1', uri.as_str()));
    }
    match relation.kind {
        RelationKind::Broader => subfields.push(Subfield::new('i', "broader concept")),
        RelationKind::Ancestor(order) => {
            subfields.push(Subfield::new('x', "part of"));
            subfields.push(Subfield::new('i', format!("ancestor of order {order}")));
        }
    }
    subfields
}

/// Map a record to MARC fields.
///
/// Records carrying MARCXML from the registry are passed through unchanged.
/// Fails with `UnsupportedRecord` when the entity type has no heading.
pub fn to_marc(record: &AuthorityRecord) -> Result<MarcRecord> {
    let spec = heading_spec(record.entity_type).ok_or_else(|| {
        HarvesterError::UnsupportedRecord {
            identifier: record.identifier.clone(),
            entity_type: record.entity_type.to_string(),
        }
    })?;

    if let RawPayload::MarcXml(xml) = &record.raw_payload {
        return xml::parse_record_str(xml);
    }

    let mut marc = MarcRecord::new();
    marc.push(Field::control("001", record.identifier.as_str()));
    marc.push(Field::control("003", organization_code(record.source)));

    let entered = match record.last_modified {
        Some(date) => {
            marc.push(Field::control("005", date.format("%Y%m%d000000.0").to_string()));
            date.format("%y%m%d").to_string()
        }
        None => "||||||".to_string(),
    };
    marc.push(Field::control("008", format!("{entered}{FIXED_DATA_TAIL}")));

    marc.push(Field::data(
        "024",
        '7',
        ' ',
        vec![
            Subfield::new('a', record.native_id()),
            Subfield::new('2', record.source.catalog_code()),
        ],
    ));
    marc.push(Field::data(
        "040",
        ' ',
        ' ',
        vec![Subfield::new('a', cataloging_agency(record.source))],
    ));

    if !record.preferred_label.is_empty() {
        marc.push(Field::data(
            spec.tag.to_string(),
            spec.ind1,
            spec.ind2,
            label_subfields(&record.preferred_label),
        ));
    }

    let tracing_tag = (spec.tag + 300).to_string();
    for label in &record.alternate_labels {
        marc.push(Field::data(
            tracing_tag.as_str(),
            spec.ind1,
            spec.ind2,
            label_subfields(label),
        ));
    }

    let see_also_tag = (spec.tag + 400).to_string();
    for relation in &record.relations {
        marc.push(Field::data(
            see_also_tag.as_str(),
            ' ',
            ' ',
            relation_subfields(relation),
        ));
    }

    for note in &record.notes {
        let mut subfields = vec![Subfield::new('a', note.text.as_str())];
        if let Some(language) = &note.language {
            subfields.push(Subfield::new('l', language.as_str()));
        }
        subfields.push(Subfield::new('v', record.source.catalog_code()));
        marc.push(Field::data("677", ' ', ' ', subfields));
    }

    Ok(marc)
}
