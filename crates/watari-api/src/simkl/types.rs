use serde::{Deserialize, Serialize};

use watari_core::models::MediaKind;

/// Token-endpoint response. Simkl answers with either an `access_token`
/// or an `error` field; anything else is treated as a failure.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub error: Option<String>,
}

/// One watched item from the all-items endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityItem {
    pub status: Option<String>,
    pub last_watched_at: Option<String>,
    pub watched_episodes_count: Option<u32>,
    pub movie: Option<MediaSummary>,
    pub show: Option<MediaSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSummary {
    pub title: Option<String>,
    pub year: Option<u32>,
    pub ids: Option<MediaIds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaIds {
    pub simkl: Option<u64>,
    pub slug: Option<String>,
    pub imdb: Option<String>,
    pub tvdb: Option<String>,
    pub tmdb: Option<String>,
}

/// Body of `/sync/all-items/{category}`; keyed by category, others null.
#[derive(Debug, Default, Deserialize)]
pub struct AllItemsResponse {
    pub movies: Option<Vec<ActivityItem>>,
    pub shows: Option<Vec<ActivityItem>>,
    pub anime: Option<Vec<ActivityItem>>,
}

impl AllItemsResponse {
    pub fn take(&mut self, kind: MediaKind) -> Vec<ActivityItem> {
        match kind {
            MediaKind::Movies => self.movies.take(),
            MediaKind::Shows => self.shows.take(),
            MediaKind::Anime => self.anime.take(),
        }
        .unwrap_or_default()
    }
}

/// Body of `/sync/activities`; per-category change markers.
#[derive(Debug, Clone, Deserialize)]
pub struct LastActivity {
    pub all: Option<String>,
    pub tv_shows: Option<ActivityMarkers>,
    pub anime: Option<ActivityMarkers>,
    pub movies: Option<ActivityMarkers>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityMarkers {
    pub all: Option<String>,
    pub completed: Option<String>,
    pub removed_from_list: Option<String>,
}

/// Body of `/users/settings`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSettings {
    pub user: Option<UserProfile>,
    pub account: Option<UserAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAccount {
    pub id: Option<u64>,
}

/// One episode from `/tv/episodes/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeInfo {
    pub title: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub ids: Option<MediaIds>,
    pub aired: Option<bool>,
}
