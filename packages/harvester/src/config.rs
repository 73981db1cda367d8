//! Configuration constants and validation functions for the harvester.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{HarvesterError, Result};

/// Base URL of the iDAI.gazetteer.
pub const GAZETTEER_URL: &str = "https://gazetteer.dainst.org";

/// Base URL of id.loc.gov authorities.
pub const LOC_URL: &str = "http://id.loc.gov";

/// Base URL (and RDF namespace) of the iDAI.world thesauri.
pub const THESAURI_URL: &str = "http://thesauri.dainst.org";

/// Atom feeds subscribed on id.loc.gov, relative to [`LOC_URL`].
pub const LOC_FEEDS: [&str; 2] = ["/authorities/names/feed/", "/authorities/subjects/feed/"];

/// Gazetteer search page size.
pub const GAZETTEER_PAGE_SIZE: usize = 250;

/// Maximum number of parent hops followed when resolving a place hierarchy.
pub const GAZETTEER_MAX_ANCESTORS: usize = 32;

/// HTTP timeout in seconds.
///
/// Thesauri search pages can take long to render on the server side.
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Maximum number of attempts for an idempotent GET.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Name of the run-state file kept in each output directory.
pub const RUN_STATE_FILE: &str = "last_run_date.log";

/// MARC organization code of the Deutsches Archäologisches Institut.
pub const DAI_ORGANIZATION_CODE: &str = "DE-2553";

/// Date pattern: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Runtime settings shared by every source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    pub gazetteer_url: String,
    pub loc_url: String,
    pub thesauri_url: String,
    pub gazetteer_page_size: usize,
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            gazetteer_url: GAZETTEER_URL.to_string(),
            loc_url: LOC_URL.to_string(),
            thesauri_url: THESAURI_URL.to_string(),
            gazetteer_page_size: GAZETTEER_PAGE_SIZE,
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }
}

impl HarvestConfig {
    /// Defaults, overridden by `AUTHORITY_*` environment variables where set.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let gazetteer_url =
            std::env::var("AUTHORITY_GAZETTEER_URL").unwrap_or(defaults.gazetteer_url);
        let loc_url = std::env::var("AUTHORITY_LOC_URL").unwrap_or(defaults.loc_url);
        let thesauri_url =
            std::env::var("AUTHORITY_THESAURI_URL").unwrap_or(defaults.thesauri_url);

        let http_timeout = std::env::var("AUTHORITY_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        let max_retries = std::env::var("AUTHORITY_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.max_retries);

        Self {
            gazetteer_url: trim_base(gazetteer_url),
            loc_url: trim_base(loc_url),
            thesauri_url: trim_base(thesauri_url),
            http_timeout,
            max_retries,
            ..defaults
        }
    }

    /// Point every registry at the same base URL (used against mock servers).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = trim_base(base.into());
        self.gazetteer_url = base.clone();
        self.loc_url = base.clone();
        self.thesauri_url = base;
        self
    }

    pub fn with_gazetteer_page_size(mut self, size: usize) -> Self {
        self.gazetteer_page_size = size.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Parse and validate a cutoff date (YYYY-MM-DD).
///
/// Rejects dates after `today`: a cutoff in the future would select nothing
/// and advance the resume point past records not yet harvested.
///
/// # Examples
/// ```
/// use authority_harvester::config::parse_cutoff_date;
/// use chrono::NaiveDate;
///
/// let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// assert!(parse_cutoff_date("2024-06-01", today).is_ok());
/// assert!(parse_cutoff_date("2024-13-01", today).is_err()); // Invalid month
/// assert!(parse_cutoff_date("2025-01-02", today).is_err()); // Future
/// ```
pub fn parse_cutoff_date(date_str: &str, today: NaiveDate) -> Result<NaiveDate> {
    if !DATE_PATTERN.is_match(date_str) {
        return Err(HarvesterError::InvalidDateFormat(date_str.to_string()));
    }

    let parsed_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| HarvesterError::InvalidDateFormat(date_str.to_string()))?;

    if parsed_date > today {
        return Err(HarvesterError::InvalidDateFormat(format!(
            "{date_str} is in the future (today is {today})"
        )));
    }

    Ok(parsed_date)
}

/// Validate date format against the local calendar date.
///
/// # Examples
/// ```
/// use authority_harvester::config::validate_date;
///
/// assert!(validate_date("2024-01-01").is_ok());
/// assert!(validate_date("invalid").is_err());
/// ```
pub fn validate_date(date_str: &str) -> Result<()> {
    parse_cutoff_date(date_str, chrono::Local::now().date_naive()).map(|_| ())
}
