//! iDAI.gazetteer: paged JSON search plus one document per place.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::{
    get_page, get_record, malformed_response, parse_change_date, AuthoritySource, FetchStream,
    Fetched,
};
use crate::config::{HarvestConfig, GAZETTEER_MAX_ANCESTORS};
use crate::date::Cutoff;
use crate::error::Result;
use crate::http::Transport;
use crate::normalize::{gazetteer_id, gazetteer_id_from_uri};
use crate::types::{PlaceAncestor, RawPayload, RawSourceRecord, SourceName};

const ACCEPT_JSON: &str = "application/json";

/// One page of `search.json`.
#[derive(Debug, Deserialize)]
struct SearchPage {
    total: usize,
    #[serde(default)]
    result: Vec<Value>,
}

/// An ancestor document reduced to the relation data and the link upwards.
#[derive(Debug, Clone)]
struct AncestorEntry {
    ancestor: PlaceAncestor,
    parent: Option<String>,
    access_denied: bool,
}

impl AncestorEntry {
    fn from_doc(id: &str, doc: &Value) -> Self {
        Self {
            ancestor: PlaceAncestor {
                id: id.to_string(),
                uri: doc.get("@id").and_then(Value::as_str).map(String::from),
                pref_name: doc.get("prefName").cloned(),
            },
            parent: parent_uri(doc),
            access_denied: doc.get("accessDenied").and_then(Value::as_bool) == Some(true),
        }
    }
}

/// Ancestors fetched during one stream, keyed by gazId.
type AncestorCache = HashMap<String, AncestorEntry>;

fn parent_uri(doc: &Value) -> Option<String> {
    doc.get("parent").and_then(Value::as_str).map(String::from)
}

pub struct GazetteerSource {
    base_url: String,
    page_size: usize,
    transport: Rc<dyn Transport>,
}

impl GazetteerSource {
    pub fn new(config: &HarvestConfig, transport: Rc<dyn Transport>) -> Self {
        Self {
            base_url: config.gazetteer_url.clone(),
            page_size: config.gazetteer_page_size,
            transport,
        }
    }

    /// Search URL; the change-date range is evaluated by the registry.
    fn search_url(&self, cutoff: Cutoff, today: NaiveDate, offset: usize) -> String {
        let query = match cutoff {
            Cutoff::Since(date) => format!(
                "lastChangeDate:[{}%20TO%20{}]",
                date.format("%Y-%m-%d"),
                today.format("%Y-%m-%d")
            ),
            Cutoff::FullDump => "*".to_string(),
        };
        format!(
            "{}/search.json?limit={}&offset={offset}&q={query}",
            self.base_url, self.page_size
        )
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/doc/{id}.json", self.base_url)
    }

    fn search(&self, cutoff: Cutoff, today: NaiveDate, offset: usize) -> Result<SearchPage> {
        let url = self.search_url(cutoff, today, offset);
        let bytes = get_page(self.transport.as_ref(), SourceName::Gazetteer, &url, ACCEPT_JSON)?;
        serde_json::from_slice(&bytes).map_err(|e| malformed_response(&url, e))
    }

    /// Fetch a place document. `Ok(None)` when it is gone or not JSON.
    fn fetch_doc(&self, id: &str) -> Result<Option<Value>> {
        let url = self.doc_url(id);
        let Some(bytes) =
            get_record(self.transport.as_ref(), SourceName::Gazetteer, &url, ACCEPT_JSON)?
        else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(place) => Ok(Some(place)),
            Err(e) => {
                tracing::warn!(%url, error = %e, "Place document is not valid JSON");
                Ok(None)
            }
        }
    }

    /// Fetch one search hit. `Ok(None)` when it falls before the cutoff.
    fn fetch_place(
        &self,
        hit: &Value,
        cutoff: Cutoff,
        cache: &mut AncestorCache,
    ) -> Result<Option<Fetched>> {
        let Some(id) = gazetteer_id(hit) else {
            return Ok(Some(Fetched::Malformed {
                reason: "search hit without gazId".to_string(),
            }));
        };

        let Some(place) = self.fetch_doc(&id)? else {
            return Ok(Some(Fetched::Malformed {
                reason: format!("place {id} could not be read"),
            }));
        };

        let changed = match place.get("lastChangeDate").and_then(Value::as_str) {
            None => None,
            Some(value) => match parse_change_date(value) {
                Some(date) => Some(date),
                None => {
                    return Ok(Some(Fetched::Malformed {
                        reason: format!("place {id} has unparseable lastChangeDate '{value}'"),
                    }))
                }
            },
        };

        if !cutoff.includes(changed) {
            tracing::debug!(place = %id, ?changed, "Place changed before cutoff");
            return Ok(None);
        }

        let ancestors = self.resolve_ancestors(&id, &place, cache)?;

        Ok(Some(Fetched::Record(RawSourceRecord {
            source: SourceName::Gazetteer,
            changed,
            payload: RawPayload::Gazetteer { place, ancestors },
        })))
    }

    /// Walk the `parent` chain, parent first.
    fn resolve_ancestors(
        &self,
        id: &str,
        place: &Value,
        cache: &mut AncestorCache,
    ) -> Result<Vec<PlaceAncestor>> {
        let mut ancestors = Vec::new();
        let mut parent = parent_uri(place);

        while let Some(uri) = parent.take() {
            if ancestors.len() >= GAZETTEER_MAX_ANCESTORS {
                tracing::warn!(place = %id, "Place hierarchy too deep, truncated");
                break;
            }
            let Some(parent_id) = gazetteer_id_from_uri(&uri) else {
                tracing::warn!(place = %id, parent = %uri, "Unrecognised parent URI");
                break;
            };
            if parent_id == id {
                break;
            }

            let entry = match cache.get(&parent_id) {
                Some(cached) => cached.clone(),
                None => match self.fetch_doc(&parent_id)? {
                    Some(doc) => {
                        let entry = AncestorEntry::from_doc(&parent_id, &doc);
                        cache.insert(parent_id.clone(), entry.clone());
                        entry
                    }
                    None => break,
                },
            };

            if entry.access_denied {
                tracing::debug!(place = %id, ancestor = %parent_id, "Ancestor access denied");
                break;
            }

            parent = entry.parent;
            ancestors.push(entry.ancestor);
        }

        Ok(ancestors)
    }
}

impl AuthoritySource for GazetteerSource {
    fn name(&self) -> SourceName {
        SourceName::Gazetteer
    }

    fn fetch_since(&self, cutoff: Cutoff) -> FetchStream<'_> {
        let today = chrono::Local::now().date_naive();
        let mut offset = 0;
        let mut pending: VecDeque<Value> = VecDeque::new();
        let mut exhausted = false;
        let mut cache = AncestorCache::new();

        Box::new(std::iter::from_fn(move || loop {
            if let Some(hit) = pending.pop_front() {
                match self.fetch_place(&hit, cutoff, &mut cache) {
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

            match self.search(cutoff, today, offset) {
                Ok(page) => {
                    offset += page.result.len();
                    exhausted = page.result.is_empty() || offset >= page.total;
                    tracing::info!(total = page.total, offset, "Gazetteer search page");
                    pending.extend(page.result);
                }
                Err(e) => {
                    exhausted = true;
                    return Some(Err(e));
                }
            }
        }))
    }
}
