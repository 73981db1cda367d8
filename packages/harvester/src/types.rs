//! Core data types for the harvester.
//!
//! Raw records keep each registry's native shape; [`AuthorityRecord`] is the
//! single internal form every serializer consumes.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Registries the harvester knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    /// iDAI.gazetteer places.
    Gazetteer,

    /// Library of Congress name and subject authorities.
    Loc,

    /// iDAI.world thesauri concepts.
    Thesauri,
}

impl SourceName {
    /// Every source, in harvesting order.
    pub const ALL: [SourceName; 3] = [Self::Gazetteer, Self::Loc, Self::Thesauri];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gazetteer => "gazetteer",
            Self::Loc => "loc",
            Self::Thesauri => "thesauri",
        }
    }

    /// Value for MARC 024 $2 and 040 $a.
    #[must_use]
    pub fn catalog_code(&self) -> &'static str {
        match self {
            Self::Gazetteer => "iDAI.gazetteer",
            Self::Loc => "DLC",
            Self::Thesauri => "iDAI.thesauri",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity an authority record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    CorporateBody,
    Meeting,
    UniformTitle,
    Place,
    Subject,
    Unknown,
}

impl EntityType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::CorporateBody => "corporate_body",
            Self::Meeting => "meeting",
            Self::UniformTitle => "uniform_title",
            Self::Place => "place",
            Self::Subject => "subject",
            Self::Unknown => "unknown",
        }
    }

    /// Derive the entity type from a MARC authority heading tag (1XX).
    #[must_use]
    pub fn from_heading_tag(tag: &str) -> Self {
        match tag {
            "100" => Self::Person,
            "110" => Self::CorporateBody,
            "111" => Self::Meeting,
            "130" => Self::UniformTitle,
            "151" => Self::Place,
            "148" | "150" | "155" | "180" | "181" | "182" | "185" => Self::Subject,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label, optionally tagged with its language and a qualifier
/// (e.g. "alt label").
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub language: Option<String>,
    pub qualifier: Option<String>,
}

impl Label {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            qualifier: None,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = (!language.is_empty()).then_some(language);
        self
    }

    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// How a related entity relates to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Broader concept in a thesaurus.
    Broader,

    /// Enclosing place; the order counts hops from the record (1 = parent).
    Ancestor(u32),
}

/// Link to another authority (broader concept, enclosing place).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub label: Label,
    /// Source-qualified identifier of the target, when known.
    pub target_id: Option<String>,
    pub target_uri: Option<String>,
}

/// A SKOS concept as delivered by the thesauri RDF endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkosConcept {
    /// `rdf:about` URI.
    pub about: String,
    pub pref_labels: Vec<Label>,
    pub alt_labels: Vec<Label>,
    pub broader: Vec<BroaderConcept>,
    pub definitions: Vec<Label>,
}

/// A broader concept reference with its resolved labels.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BroaderConcept {
    pub uri: String,
    pub pref_labels: Vec<Label>,
}

/// An enclosing place, reduced to what a relation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceAncestor {
    /// Native gazId.
    pub id: String,
    /// `@id` URI.
    pub uri: Option<String>,
    /// The raw `prefName` object.
    pub pref_name: Option<serde_json::Value>,
}

/// Registry-native payload of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Gazetteer place document plus the resolved parent chain (parent first).
    Gazetteer {
        place: serde_json::Value,
        ancestors: Vec<PlaceAncestor>,
    },

    /// A single MARCXML `<record>` from id.loc.gov.
    MarcXml(String),

    /// A thesauri concept.
    Skos(SkosConcept),
}

/// A record as fetched, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSourceRecord {
    pub source: SourceName,
    /// Change date reported by the registry; `None` when it reports none.
    pub changed: Option<NaiveDate>,
    pub payload: RawPayload,
}

/// The internal, source-independent authority record.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityRecord {
    /// Source-qualified identifier, e.g. `gazetteer:2072406`.
    pub identifier: String,
    pub source: SourceName,
    pub preferred_label: Label,
    pub alternate_labels: Vec<Label>,
    pub entity_type: EntityType,
    pub last_modified: Option<NaiveDate>,
    pub relations: Vec<Relation>,
    /// Scope notes and definitions.
    pub notes: Vec<Label>,
    pub raw_payload: RawPayload,
}

impl AuthorityRecord {
    /// Identifier without the `<source>:` prefix.
    #[must_use]
    pub fn native_id(&self) -> &str {
        self.identifier
            .split_once(':')
            .map_or(self.identifier.as_str(), |(_, id)| id)
    }
}

/// Build a source-qualified identifier.
///
/// # Examples
/// ```
/// use authority_harvester::types::{qualified_id, SourceName};
///
/// assert_eq!(qualified_id(SourceName::Gazetteer, "2072406"), "gazetteer:2072406");
/// ```
#[must_use]
pub fn qualified_id(source: SourceName, native_id: &str) -> String {
    format!("{source}:{native_id}")
}
