use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two external services watch history moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Plex,
    Simkl,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plex => write!(f, "plex"),
            Self::Simkl => write!(f, "simkl"),
        }
    }
}

/// Media categories the activity endpoints are partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movies,
    Shows,
    Anime,
}

impl MediaKind {
    pub const ALL: &[MediaKind] = &[Self::Movies, Self::Shows, Self::Anime];

    /// Wire name used in endpoint paths and storage keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Shows => "shows",
            Self::Anime => "anime",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness of a persisted OAuth token.
///
/// `Absent` and `Invalid` are distinct states but render identically to
/// the UI; `is_valid()` is the only question most callers should ask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// No token stored at all.
    Absent,
    /// A token exists but the service rejected it.
    Invalid,
    /// A token exists and the service accepted it.
    Valid(String),
}

impl TokenState {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Valid(t) => Some(t),
            _ => None,
        }
    }
}

/// Per-category lower bounds for an activity fetch.
///
/// A `Full` window requests every category with no date filter. An
/// `Incremental` window requests only the categories it names; a `None`
/// bound inside it means "everything for that category".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityWindow {
    Full,
    Incremental(BTreeMap<MediaKind, Option<DateTime<Utc>>>),
}

impl ActivityWindow {
    /// Categories this window asks for, in stable order.
    pub fn categories(&self) -> Vec<MediaKind> {
        match self {
            Self::Full => MediaKind::ALL.to_vec(),
            Self::Incremental(map) => map.keys().copied().collect(),
        }
    }

    /// Lower bound for one category, if any.
    pub fn since(&self, kind: MediaKind) -> Option<DateTime<Utc>> {
        match self {
            Self::Full => None,
            Self::Incremental(map) => map.get(&kind).copied().flatten(),
        }
    }
}

/// Where a [`ServerTime`] came from, best source first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// `date` header on an activity response.
    ResponseHeader,
    /// `date` header on a dedicated zero-payload probe.
    Probe,
    /// Local clock, when the service clock was unreachable.
    LocalClock,
}

/// The trusted "now" used as the next incremental sync boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTime {
    pub at: DateTime<Utc>,
    pub source: ClockSource,
}

impl ServerTime {
    pub fn local() -> Self {
        Self {
            at: Utc::now(),
            source: ClockSource::LocalClock,
        }
    }
}
