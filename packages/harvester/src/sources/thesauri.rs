//! iDAI.thesauri: paged RDF search with broader concepts resolved per URI.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use chrono::NaiveDate;
use roxmltree::{Document, Node};

use super::{
    get_page, get_record, malformed_response, parse_change_date, rebase, AuthoritySource,
    FetchStream, Fetched,
};
use crate::config::{HarvestConfig, THESAURI_URL};
use crate::date::Cutoff;
use crate::error::Result;
use crate::http::{bytes_to_string, Transport};
use crate::types::{BroaderConcept, Label, RawPayload, RawSourceRecord, SkosConcept, SourceName};
use crate::xml::{find_child, find_children, get_lang, get_text, has_tag, rdf_attribute};

const ACCEPT_RDF: &str = "application/rdf+xml";

const SKOS_CONCEPT: &str = "http://www.w3.org/2004/02/skos/core#Concept";

/// Pref labels of broader concepts, keyed by URI.
type LabelCache = HashMap<String, Vec<Label>>;

/// A concept read from a search page, broader labels not yet resolved.
#[derive(Debug, Clone, PartialEq)]
enum PageItem {
    Concept {
        concept: SkosConcept,
        changed: Option<NaiveDate>,
    },
    Malformed(String),
}

/// One parsed search page.
#[derive(Debug, Default)]
struct SearchPage {
    items: Vec<PageItem>,
    /// Described resources on the page, concepts or not. Drives the offset.
    descriptions: usize,
}

fn labels(node: Node<'_, '_>, tag: &str) -> Vec<Label> {
    find_children(node, tag)
        .filter_map(|n| {
            let text = get_text(n);
            (!text.is_empty()).then(|| Label::new(text).with_language(get_lang(n).unwrap_or_default()))
        })
        .collect()
}

fn is_concept(description: Node<'_, '_>) -> bool {
    find_children(description, "type").any(|t| rdf_attribute(t, "resource") == Some(SKOS_CONCEPT))
}

/// Latest `dct:modified`, falling back to the latest `dct:created`.
///
/// Both may sit directly on the description or inside a change note.
fn change_date(description: Node<'_, '_>) -> std::result::Result<Option<NaiveDate>, String> {
    for tag in ["modified", "created"] {
        let values: Vec<String> = description
            .descendants()
            .filter(|n| has_tag(*n, tag))
            .map(get_text)
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }

        let mut latest = None;
        for value in values {
            let date = parse_change_date(&value).ok_or_else(|| format!("unparseable {tag} '{value}'"))?;
            latest = latest.max(Some(date));
        }
        return Ok(latest);
    }
    Ok(None)
}

fn parse_concept(description: Node<'_, '_>, about: &str) -> PageItem {
    let changed = match change_date(description) {
        Ok(changed) => changed,
        Err(reason) => return PageItem::Malformed(format!("concept {about}: {reason}")),
    };

    let broader = find_children(description, "broader")
        .filter_map(|b| rdf_attribute(b, "resource"))
        .map(|uri| BroaderConcept {
            uri: uri.to_string(),
            pref_labels: Vec::new(),
        })
        .collect();

    PageItem::Concept {
        concept: SkosConcept {
            about: about.to_string(),
            pref_labels: labels(description, "prefLabel"),
            alt_labels: labels(description, "altLabel"),
            broader,
            definitions: labels(description, "definition"),
        },
        changed,
    }
}

pub struct ThesauriSource {
    base_url: String,
    transport: Rc<dyn Transport>,
}

impl ThesauriSource {
    pub fn new(config: &HarvestConfig, transport: Rc<dyn Transport>) -> Self {
        Self {
            base_url: config.thesauri_url.clone(),
            transport,
        }
    }

    /// Search URL; an empty `date` asks for every concept.
    fn search_url(&self, cutoff: Cutoff, offset: usize) -> String {
        let date = cutoff
            .date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        format!("{}/de/koha_search.html?date={date}&offset={offset}", self.base_url)
    }

    fn search(&self, cutoff: Cutoff, offset: usize) -> Result<SearchPage> {
        let url = self.search_url(cutoff, offset);
        let bytes = get_page(self.transport.as_ref(), SourceName::Thesauri, &url, ACCEPT_RDF)?;
        let text = bytes_to_string(&bytes, &url);
        let doc = Document::parse(&text).map_err(|e| malformed_response(&url, e))?;

        let mut page = SearchPage::default();
        for description in doc.descendants().filter(|n| has_tag(*n, "Description")) {
            let Some(about) = rdf_attribute(description, "about") else {
                continue;
            };
            page.descriptions += 1;

            if !is_concept(description) {
                continue;
            }
            if find_child(description, "topConceptOf").is_some() {
                tracing::debug!(concept = %about, "Skipping top concept");
                continue;
            }
            page.items.push(parse_concept(description, about));
        }

        tracing::info!(offset, descriptions = page.descriptions, "Thesauri search page");
        Ok(page)
    }

    /// Pref labels of a broader concept from its own RDF document.
    fn broader_labels(&self, uri: &str) -> Result<Vec<Label>> {
        let url = format!("{}.rdf", rebase(uri, THESAURI_URL, &self.base_url));
        let Some(bytes) = get_record(self.transport.as_ref(), SourceName::Thesauri, &url, ACCEPT_RDF)?
        else {
            return Ok(Vec::new());
        };

        let text = bytes_to_string(&bytes, &url);
        let doc = match Document::parse(&text) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Broader concept is not valid RDF");
                return Ok(Vec::new());
            }
        };

        Ok(doc
            .descendants()
            .find(|n| has_tag(*n, "Description") && rdf_attribute(*n, "about") == Some(uri))
            .map(|description| labels(description, "prefLabel"))
            .unwrap_or_default())
    }

    fn resolve(&self, item: PageItem, cutoff: Cutoff, cache: &mut LabelCache) -> Result<Option<Fetched>> {
        let (mut concept, changed) = match item {
            PageItem::Malformed(reason) => return Ok(Some(Fetched::Malformed { reason })),
            PageItem::Concept { concept, changed } => (concept, changed),
        };

        if !cutoff.includes(changed) {
            tracing::debug!(concept = %concept.about, ?changed, "Concept changed before cutoff");
            return Ok(None);
        }

        for broader in &mut concept.broader {
            broader.pref_labels = match cache.get(&broader.uri) {
                Some(labels) => labels.clone(),
                None => {
                    let labels = self.broader_labels(&broader.uri)?;
                    cache.insert(broader.uri.clone(), labels.clone());
                    labels
                }
            };
        }

        Ok(Some(Fetched::Record(RawSourceRecord {
            source: SourceName::Thesauri,
            changed,
            payload: RawPayload::Skos(concept),
        })))
    }
}

impl AuthoritySource for ThesauriSource {
    fn name(&self) -> SourceName {
        SourceName::Thesauri
    }

    fn fetch_since(&self, cutoff: Cutoff) -> FetchStream<'_> {
        let mut offset = 0;
        let mut pending: VecDeque<PageItem> = VecDeque::new();
        let mut exhausted = false;
        let mut cache = LabelCache::new();

        Box::new(std::iter::from_fn(move || loop {
            if let Some(item) = pending.pop_front() {
                match self.resolve(item, cutoff, &mut cache) {
                    Ok(Some(fetched)) => return Some(Ok(fetched)),
                    Ok(None) => continue,
                    Err(e) => {
                        pending.clear();
                        exhausted = true;
                        return Some(Err(e));
                    }
                }
            }
            if exhausted {
                return None;
            }

            match self.search(cutoff, offset) {
                Ok(page) => {
                    offset += page.descriptions;
                    exhausted = page.descriptions == 0;
                    pending.extend(page.items);
                }
                Err(e) => {
                    exhausted = true;
                    return Some(Err(e));
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvesterError;
    use crate::sources::fixtures::MapTransport;
    use pretty_assertions::assert_eq;

    const BASE: &str = "http://thesauri.test";

    fn rdf(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:skos="http://www.w3.org/2004/02/skos/core#"
         xmlns:dct="http://purl.org/dc/terms/">{body}</rdf:RDF>"#
        )
    }

    fn concept(id: &str, extra: &str) -> String {
        format!(
            r#"<rdf:Description rdf:about="http://thesauri.dainst.org/{id}">
  <rdf:type rdf:resource="http://www.w3.org/2004/02/skos/core#Concept"/>
  <skos:prefLabel xml:lang="de">Begriff {id}</skos:prefLabel>
  {extra}
</rdf:Description>"#
        )
    }

    fn search(date: &str, offset: usize) -> String {
        format!("{BASE}/de/koha_search.html?date={date}&offset={offset}")
    }

    fn source(transport: &Rc<MapTransport>) -> ThesauriSource {
        let config = HarvestConfig::default().with_base_url(BASE);
        ThesauriSource::new(&config, Rc::clone(transport) as Rc<dyn Transport>)
    }

    #[test]
    fn test_pages_by_description_count() {
        let first = rdf(&format!(
            "{}{}{}",
            concept("_a", r#"<skos:broader rdf:resource="http://thesauri.dainst.org/_top"/>
  <skos:changeNote><rdf:Description><dct:created>2023-01-01</dct:created><dct:modified>2024-02-01T12:00:00</dct:modified></rdf:Description></skos:changeNote>"#),
            concept("_b", r#"<skos:broader rdf:resource="http://thesauri.dainst.org/_top"/><skos:altLabel xml:lang="en">b</skos:altLabel>"#),
            r#"<rdf:Description rdf:about="http://thesauri.dainst.org/scheme"><rdf:type rdf:resource="http://www.w3.org/2004/02/skos/core#ConceptScheme"/></rdf:Description>"#,
        ));
        let top = rdf(&concept("_top", r#"<skos:topConceptOf rdf:resource="http://thesauri.dainst.org/scheme"/>"#));

        let transport = Rc::new(
            MapTransport::default()
                .with(&search("", 0), first)
                .with(&search("", 3), rdf(&concept("_top", "<skos:topConceptOf/>")))
                .with(&search("", 4), rdf(""))
                .with(&format!("{BASE}/_top.rdf"), top),
        );

        let items: Vec<Fetched> = source(&transport)
            .fetch_since(Cutoff::FullDump)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(items.len(), 2);
        let Fetched::Record(first) = &items[0] else {
            panic!("expected a record");
        };
        assert_eq!(first.changed, NaiveDate::from_ymd_opt(2024, 2, 1));
        let RawPayload::Skos(concept) = &first.payload else {
            panic!("expected a SKOS payload");
        };
        assert_eq!(concept.pref_labels, vec![Label::new("Begriff _a").with_language("de")]);
        assert_eq!(
            concept.broader[0].pref_labels,
            vec![Label::new("Begriff _top").with_language("de")]
        );
        assert_eq!(transport.count(&format!("{BASE}/_top.rdf")), 1);
    }

    #[test]
    fn test_cutoff_goes_into_query() {
        let cutoff = Cutoff::Since(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let transport = Rc::new(
            MapTransport::default()
                .with(
                    &search("2024-01-01", 0),
                    rdf(&format!(
                        "{}{}",
                        concept("_old", "<dct:modified>2023-05-01</dct:modified>"),
                        concept("_bad", "<dct:modified>im Mai</dct:modified>"),
                    )),
                )
                .with(&search("2024-01-01", 2), rdf("")),
        );

        let items: Vec<Fetched> = source(&transport)
            .fetch_since(cutoff)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Fetched::Malformed { reason } if reason.contains("im Mai")));
    }

    #[test]
    fn test_unresolvable_broader_keeps_concept() {
        let transport = Rc::new(
            MapTransport::default()
                .with(
                    &search("", 0),
                    rdf(&concept("_c", r#"<skos:broader rdf:resource="http://thesauri.dainst.org/_gone"/>"#)),
                )
                .with(&search("", 1), rdf("")),
        );

        let items: Vec<Fetched> = source(&transport)
            .fetch_since(Cutoff::FullDump)
            .collect::<Result<_>>()
            .unwrap();
        let Fetched::Record(record) = &items[0] else {
            panic!("expected a record");
        };
        let RawPayload::Skos(concept) = &record.payload else {
            panic!("expected a SKOS payload");
        };
        assert!(concept.broader[0].pref_labels.is_empty());
    }

    #[test]
    fn test_search_failure_is_source_unavailable() {
        let transport = Rc::new(MapTransport::default().with_status(&search("", 0), 500));
        let err = source(&transport)
            .fetch_since(Cutoff::FullDump)
            .next()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), "SourceUnavailable");
        assert!(matches!(err, HarvesterError::SourceUnavailable { .. }));
    }
}
