//! id.loc.gov: Atom change feeds pointing at MARCXML records.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use chrono::NaiveDate;
use roxmltree::Document;

use super::{
    get_page, get_record, malformed_response, parse_change_date, rebase, AuthoritySource,
    FetchStream, Fetched,
};
use crate::config::{HarvestConfig, LOC_FEEDS, LOC_URL};
use crate::date::Cutoff;
use crate::error::Result;
use crate::http::{bytes_to_string, Transport};
use crate::marc::xml::parse_record_str;
use crate::types::{RawPayload, RawSourceRecord, SourceName};
use crate::xml::{child_text, find_children, has_tag};

const ACCEPT_FEED: &str = "application/xml";
const ACCEPT_MARCXML: &str = "application/marc+xml";

/// A feed entry still to be fetched.
#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Entry { link: String, updated: Option<NaiveDate> },
    Malformed(String),
}

/// One parsed feed page.
#[derive(Debug, Default)]
struct FeedPage {
    items: Vec<Pending>,
    /// Entries on the page, in range or not.
    entries: usize,
}

pub struct LocSource {
    base_url: String,
    feeds: Vec<String>,
    transport: Rc<dyn Transport>,
}

impl LocSource {
    pub fn new(config: &HarvestConfig, transport: Rc<dyn Transport>) -> Self {
        Self {
            base_url: config.loc_url.clone(),
            feeds: LOC_FEEDS.iter().map(|feed| feed.to_string()).collect(),
            transport,
        }
    }

    fn page_url(&self, feed: &str, page: usize) -> String {
        format!("{}{feed}{page}", self.base_url)
    }

    /// Read every page of `feed` down to the cutoff, dropping repeated links.
    ///
    /// Feeds are newest first, so paging stops at the first page without
    /// in-range entries.
    fn collect_feed(&self, feed: &str, cutoff: Cutoff) -> Result<Vec<Pending>> {
        let mut seen = HashSet::new();
        let mut collected = Vec::new();

        for page in 1.. {
            let url = self.page_url(feed, page);
            let bytes = get_page(self.transport.as_ref(), SourceName::Loc, &url, ACCEPT_FEED)?;
            let text = bytes_to_string(&bytes, &url);
            let parsed = self.parse_feed_page(&url, &text, cutoff)?;

            tracing::debug!(%url, entries = parsed.entries, in_range = parsed.items.len(), "Feed page");
            if parsed.items.is_empty() || parsed.entries == 0 {
                break;
            }

            for item in parsed.items {
                match &item {
                    Pending::Entry { link, .. } if !seen.insert(link.clone()) => {
                        tracing::debug!(%link, "Duplicate feed entry");
                    }
                    _ => collected.push(item),
                }
            }
        }

        tracing::info!(%feed, entries = collected.len(), "Feed collected");
        Ok(collected)
    }

    fn parse_feed_page(&self, url: &str, text: &str, cutoff: Cutoff) -> Result<FeedPage> {
        let doc = Document::parse(text).map_err(|e| malformed_response(url, e))?;
        let mut page = FeedPage::default();

        for entry in doc.descendants().filter(|n| has_tag(*n, "entry")) {
            page.entries += 1;

            let updated = match child_text(entry, "updated") {
                None => None,
                Some(value) => match parse_change_date(&value) {
                    Some(date) => Some(date),
                    None => {
                        page.items.push(Pending::Malformed(format!(
                            "feed entry has unparseable updated '{value}'"
                        )));
                        continue;
                    }
                },
            };
            if !cutoff.includes(updated) {
                continue;
            }

            let link = find_children(entry, "link").find(|link| {
                link.attribute("rel") == Some("alternate")
                    && link.attribute("type") == Some(ACCEPT_MARCXML)
            });
            match link.and_then(|l| l.attribute("href")) {
                Some(href) => page.items.push(Pending::Entry {
                    link: rebase(href, LOC_URL, &self.base_url),
                    updated,
                }),
                None => page.items.push(Pending::Malformed(
                    "feed entry without MARCXML link".to_string(),
                )),
            }
        }

        Ok(page)
    }

    fn fetch_entry(&self, link: &str, updated: Option<NaiveDate>) -> Result<Fetched> {
        let Some(bytes) = get_record(self.transport.as_ref(), SourceName::Loc, link, ACCEPT_MARCXML)?
        else {
            return Ok(Fetched::Malformed {
                reason: format!("{link} could not be read"),
            });
        };

        let xml = bytes_to_string(&bytes, link);
        if let Err(e) = parse_record_str(&xml) {
            return Ok(Fetched::Malformed {
                reason: format!("{link} is not a MARCXML record: {e}"),
            });
        }

        Ok(Fetched::Record(RawSourceRecord {
            source: SourceName::Loc,
            changed: updated,
            payload: RawPayload::MarcXml(xml),
        }))
    }
}

impl AuthoritySource for LocSource {
    fn name(&self) -> SourceName {
        SourceName::Loc
    }

    fn fetch_since(&self, cutoff: Cutoff) -> FetchStream<'_> {
        let mut feeds: VecDeque<&str> = self.feeds.iter().map(String::as_str).collect();
        let mut pending: VecDeque<Pending> = VecDeque::new();
        let mut failed = false;

        Box::new(std::iter::from_fn(move || loop {
            if failed {
                return None;
            }

            match pending.pop_front() {
                Some(Pending::Malformed(reason)) => return Some(Ok(Fetched::Malformed { reason })),
                Some(Pending::Entry { link, updated }) => {
                    let fetched = self.fetch_entry(&link, updated);
                    failed = fetched.is_err();
                    return Some(fetched);
                }
                None => {}
            }

            let feed = feeds.pop_front()?;
            match self.collect_feed(feed, cutoff) {
                Ok(items) => pending.extend(items),
                Err(e) => {
                    failed = true;
                    return Some(Err(e));
                }
            }
        }))
    }
}
