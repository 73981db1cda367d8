//! Resolution of the user's date specification into a harvest cutoff.

use std::fmt;

use chrono::{Days, NaiveDate};

use crate::config::parse_cutoff_date;
use crate::error::{HarvesterError, Result};
use crate::state::RunStateStore;

/// How the user asked to select records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSpec {
    /// Everything changed since an ISO date.
    Date(String),

    /// Everything changed in the last `n` days.
    Offset(i64),

    /// Continue from the cutoff of the last successful run.
    Resume,

    /// Every record, regardless of change date.
    FullDump,
}

impl DateSpec {
    /// Build a spec from the mutually exclusive CLI options.
    ///
    /// Exactly one option must be set.
    pub fn from_options(
        date: Option<String>,
        offset: Option<i64>,
        resume: bool,
        full_dump: bool,
    ) -> Result<Self> {
        let mut specs = Vec::with_capacity(1);
        if let Some(date) = date {
            specs.push(Self::Date(date));
        }
        if let Some(offset) = offset {
            specs.push(Self::Offset(offset));
        }
        if resume {
            specs.push(Self::Resume);
        }
        if full_dump {
            specs.push(Self::FullDump);
        }

        match specs.len() {
            1 => Ok(specs.remove(0)),
            _ => Err(HarvesterError::MissingDateSpec),
        }
    }
}

/// The earliest change date of interest, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    Since(NaiveDate),
    FullDump,
}

impl Cutoff {
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Since(date) => Some(*date),
            Self::FullDump => None,
        }
    }

    /// Whether a record with the given change date passes the cutoff.
    ///
    /// Records without a change date are always included.
    #[must_use]
    pub fn includes(&self, changed: Option<NaiveDate>) -> bool {
        match (self, changed) {
            (Self::FullDump, _) | (Self::Since(_), None) => true,
            (Self::Since(cutoff), Some(changed)) => changed >= *cutoff,
        }
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Since(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::FullDump => f.write_str("full dump"),
        }
    }
}

/// Resolve `spec` against the local calendar date.
pub fn resolve(spec: &DateSpec, store: &dyn RunStateStore) -> Result<Cutoff> {
    resolve_at(spec, store, chrono::Local::now().date_naive())
}

/// Resolve `spec` with an explicit `today`.
pub fn resolve_at(spec: &DateSpec, store: &dyn RunStateStore, today: NaiveDate) -> Result<Cutoff> {
    match spec {
        DateSpec::Date(s) => parse_cutoff_date(s.trim(), today).map(Cutoff::Since),
        DateSpec::Offset(days) => {
            let days = u64::try_from(*days).map_err(|_| HarvesterError::InvalidOffset(*days))?;
            today
                .checked_sub_days(Days::new(days))
                .map(Cutoff::Since)
                .ok_or(HarvesterError::InvalidOffset(days as i64))
        }
        DateSpec::Resume => match store.read_last_cutoff() {
            Some(recorded) if recorded > today => {
                tracing::warn!(
                    location = %store.location(),
                    %recorded,
                    %today,
                    "Run state lies in the future, ignoring"
                );
                Err(HarvesterError::NoPriorRunState(store.location()))
            }
            Some(recorded) => Ok(Cutoff::Since(recorded)),
            None => Err(HarvesterError::NoPriorRunState(store.location())),
        },
        DateSpec::FullDump => Ok(Cutoff::FullDump),
    }
}
