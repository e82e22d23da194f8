use std::collections::BTreeMap;

use chrono::SecondsFormat;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use reqwest::Client;

use watari_core::models::{ActivityWindow, MediaKind, ServerTime};

use super::error::SimklError;
use super::types::{ActivityItem, AllItemsResponse, EpisodeInfo, LastActivity, UserSettings};
use crate::cancel::CancelSignal;
use crate::clock;

/// Result of one activity fetch across all requested categories.
///
/// `success` is true only when every requested category came back with
/// data; a category that failed is simply absent from `data`, which is
/// the explicit partial-failure signal the orchestrator keys off.
/// `server_time` is always resolved, even on total failure.
#[derive(Debug)]
pub struct ActivityFetch {
    pub success: bool,
    pub data: BTreeMap<MediaKind, Vec<ActivityItem>>,
    pub server_time: ServerTime,
    pub error: Option<SimklError>,
}

/// Outcome of a token-validation probe.
#[derive(Debug, Clone)]
pub struct TokenCheck {
    pub valid: bool,
    pub status: u16,
    pub activity: Option<LastActivity>,
}

/// Simkl API v1 client.
pub struct SimklClient {
    http: Client,
    base_url: String,
    client_id: String,
}

impl SimklClient {
    pub fn new(client_id: String) -> Self {
        Self::with_base_url(client_id, super::auth::BASE_URL.to_string())
    }

    /// Point the client at a different API root (tests).
    pub fn with_base_url(client_id: String, base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            client_id,
        }
    }

    fn authed(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header("simkl-api-key", &self.client_id)
            .header("Content-Type", "application/json")
    }

    /// Fetch all changed items for every category the window names.
    ///
    /// Category requests run concurrently. A non-200 status for one
    /// category is tolerated (that category is just absent from the
    /// result); a network failure or a triggered cancellation fails the
    /// whole fetch. Server time is resolved exactly once either way.
    pub async fn get_all_items(
        &self,
        window: &ActivityWindow,
        token: &str,
        cancel: Option<CancelSignal>,
    ) -> ActivityFetch {
        let categories = window.categories();
        tracing::debug!(?categories, "fetching all items");

        let fetches = join_all(
            categories
                .iter()
                .map(|&kind| self.fetch_category(kind, window, token)),
        );

        let outcome = match cancel {
            Some(mut signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(SimklError::Cancelled),
                    results = fetches => Ok(results),
                }
            }
            None => Ok(fetches.await),
        };

        let mut data = BTreeMap::new();
        let mut first_headers: Option<HeaderMap> = None;
        let mut error = None;

        match outcome {
            Ok(results) => {
                for (kind, result) in categories.iter().copied().zip(results) {
                    match result {
                        Ok((headers, items)) => {
                            if first_headers.is_none() {
                                first_headers = Some(headers);
                            }
                            if let Some(items) = items {
                                tracing::debug!(%kind, count = items.len(), "got items");
                                data.insert(kind, items);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%kind, error = %e, "category fetch failed");
                            error = Some(e);
                        }
                    }
                }
            }
            Err(e) => error = Some(e),
        }

        let probe_url = format!("{}/invalid_url_route", self.base_url);
        let server_time =
            clock::resolve_server_time(&self.http, &probe_url, first_headers.as_ref()).await;

        let success = error.is_none() && data.len() == categories.len();
        ActivityFetch {
            success,
            data,
            server_time,
            error,
        }
    }

    /// One category request. `Ok((headers, None))` is a tolerated
    /// non-200; only transport errors surface as `Err`.
    async fn fetch_category(
        &self,
        kind: MediaKind,
        window: &ActivityWindow,
        token: &str,
    ) -> Result<(HeaderMap, Option<Vec<ActivityItem>>), SimklError> {
        let mut req = self
            .authed(&format!("/sync/all-items/{kind}"), token)
            .query(&[("episode_watched_at", "yes")]);
        if let Some(since) = window.since(kind) {
            req = req.query(&[(
                "date_from",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            )]);
        }
        if kind != MediaKind::Movies {
            req = req.query(&[("extended", "full")]);
        }

        let resp = req.send().await?;
        let headers = resp.headers().clone();
        if resp.status().as_u16() != 200 {
            tracing::warn!(%kind, status = resp.status().as_u16(), "all-items non-200");
            return Ok((headers, None));
        }

        // Simkl answers a bare `null` body when there is nothing new.
        let body: Option<AllItemsResponse> = resp
            .json()
            .await
            .map_err(|e| SimklError::Parse(e.to_string()))?;
        let items = body.unwrap_or_default().take(kind);
        Ok((headers, Some(items)))
    }

    /// GET /sync/activities — doubles as the token liveness probe.
    pub async fn get_last_activity(&self, token: &str) -> Result<TokenCheck, SimklError> {
        let resp = self.authed("/sync/activities", token).send().await?;
        let status = resp.status().as_u16();
        if status == 200 {
            let activity: LastActivity = resp
                .json()
                .await
                .map_err(|e| SimklError::Parse(e.to_string()))?;
            Ok(TokenCheck {
                valid: true,
                status,
                activity: Some(activity),
            })
        } else {
            tracing::warn!(status, "token rejected by activities endpoint");
            Ok(TokenCheck {
                valid: false,
                status,
                activity: None,
            })
        }
    }

    /// GET /users/settings — profile info for the signed-in account.
    pub async fn get_user_settings(&self, token: &str) -> Result<UserSettings, SimklError> {
        let resp = self.authed("/users/settings", token).send().await?;
        let status = resp.status().as_u16();
        if status != 200 {
            let message = resp.text().await.unwrap_or_default();
            return Err(SimklError::Api { status, message });
        }
        resp.json()
            .await
            .map_err(|e| SimklError::Parse(e.to_string()))
    }

    /// GET /tv/episodes/{id} — episode list for one show.
    pub async fn get_show_episodes(
        &self,
        token: &str,
        show_id: u64,
    ) -> Result<Vec<EpisodeInfo>, SimklError> {
        let resp = self
            .authed(&format!("/tv/episodes/{show_id}"), token)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status != 200 {
            let message = resp.text().await.unwrap_or_default();
            return Err(SimklError::Api { status, message });
        }
        resp.json()
            .await
            .map_err(|e| SimklError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use mockito::Matcher;

    use watari_core::models::ClockSource;

    use super::*;
    use crate::cancel::cancel_pair;

    const MOVIES_BODY: &str = r#"{"movies":[
        {"status":"completed","last_watched_at":"2024-01-01T00:00:00Z",
         "movie":{"title":"Perfect Blue","year":1997,"ids":{"simkl":1}}}
    ]}"#;

    fn incremental(kinds: &[(MediaKind, Option<&str>)]) -> ActivityWindow {
        let map: BTreeMap<_, _> = kinds
            .iter()
            .map(|&(k, since)| {
                (
                    k,
                    since.map(|s| s.parse::<DateTime<Utc>>().unwrap()),
                )
            })
            .collect();
        ActivityWindow::Incremental(map)
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_good_category_and_server_time() {
        let mut server = mockito::Server::new_async().await;
        let _movies = server
            .mock("GET", "/sync/all-items/movies")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("date", "Mon, 01 Jan 2024 00:00:00 GMT")
            .with_body(MOVIES_BODY)
            .create_async()
            .await;
        let _shows = server
            .mock("GET", "/sync/all-items/shows")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = SimklClient::with_base_url("cid".into(), server.url());
        let window = incremental(&[(MediaKind::Movies, None), (MediaKind::Shows, None)]);
        let fetch = client.get_all_items(&window, "tok", None).await;

        assert!(!fetch.success);
        assert_eq!(fetch.data[&MediaKind::Movies].len(), 1);
        assert!(!fetch.data.contains_key(&MediaKind::Shows));
        assert!(fetch.error.is_none());
        assert_eq!(
            fetch.server_time.at,
            "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_full_window_requests_all_three_categories() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for kind in ["movies", "shows", "anime"] {
            mocks.push(
                server
                    .mock("GET", format!("/sync/all-items/{kind}").as_str())
                    .match_query(Matcher::Any)
                    .with_status(200)
                    .with_header("date", "Mon, 01 Jan 2024 00:00:00 GMT")
                    .with_body(format!(r#"{{"{kind}":[]}}"#))
                    .create_async()
                    .await,
            );
        }

        let client = SimklClient::with_base_url("cid".into(), server.url());
        let fetch = client.get_all_items(&ActivityWindow::Full, "tok", None).await;

        assert!(fetch.success);
        assert_eq!(fetch.data.len(), 3);
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_incremental_sends_date_from_filter() {
        let mut server = mockito::Server::new_async().await;
        let movies = server
            .mock("GET", "/sync/all-items/movies")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("episode_watched_at".into(), "yes".into()),
                Matcher::UrlEncoded("date_from".into(), "2024-01-01T00:00:00Z".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"movies":[]}"#)
            .create_async()
            .await;

        let client = SimklClient::with_base_url("cid".into(), server.url());
        let window = incremental(&[(MediaKind::Movies, Some("2024-01-01T00:00:00Z"))]);
        let fetch = client.get_all_items(&window, "tok", None).await;

        assert!(fetch.success);
        movies.assert_async().await;
    }

    #[tokio::test]
    async fn test_null_body_counts_as_empty_data() {
        let mut server = mockito::Server::new_async().await;
        let _movies = server
            .mock("GET", "/sync/all-items/movies")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let client = SimklClient::with_base_url("cid".into(), server.url());
        let window = incremental(&[(MediaKind::Movies, None)]);
        let fetch = client.get_all_items(&window, "tok", None).await;

        // category answered, so the key is present and success holds
        assert!(fetch.success);
        assert!(fetch.data[&MediaKind::Movies].is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_reports_failure_with_server_time() {
        // unroutable API root: requests would fail, but the pre-triggered
        // signal wins first
        let client =
            SimklClient::with_base_url("cid".into(), "http://127.0.0.1:1".into());
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let fetch = client
            .get_all_items(&ActivityWindow::Full, "tok", Some(signal))
            .await;

        assert!(!fetch.success);
        assert!(matches!(fetch.error, Some(SimklError::Cancelled)));
        assert!(fetch.data.is_empty());
        assert_eq!(fetch.server_time.source, ClockSource::LocalClock);
    }

    #[tokio::test]
    async fn test_total_network_failure_still_resolves_server_time() {
        let client =
            SimklClient::with_base_url("cid".into(), "http://127.0.0.1:1".into());
        let window = incremental(&[(MediaKind::Movies, None)]);
        let fetch = client.get_all_items(&window, "tok", None).await;

        assert!(!fetch.success);
        assert!(matches!(fetch.error, Some(SimklError::Http(_))));
        assert_eq!(fetch.server_time.source, ClockSource::LocalClock);
    }

    #[tokio::test]
    async fn test_last_activity_valid_and_invalid() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/sync/activities")
            .match_header("authorization", "Bearer good")
            .with_status(200)
            .with_body(r#"{"all":"2024-01-01T00:00:00Z"}"#)
            .create_async()
            .await;
        let _bad = server
            .mock("GET", "/sync/activities")
            .match_header("authorization", "Bearer bad")
            .with_status(401)
            .with_body(r#"{"error":"unauthorized"}"#)
            .create_async()
            .await;

        let client = SimklClient::with_base_url("cid".into(), server.url());

        let check = client.get_last_activity("good").await.unwrap();
        assert!(check.valid);
        assert_eq!(check.status, 200);
        assert_eq!(
            check.activity.unwrap().all.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );

        let check = client.get_last_activity("bad").await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.status, 401);
    }

    #[tokio::test]
    async fn test_user_settings_and_episode_list() {
        let mut server = mockito::Server::new_async().await;
        let _settings = server
            .mock("GET", "/users/settings")
            .with_status(200)
            .with_body(r#"{"user":{"name":"umaru"},"account":{"id":42}}"#)
            .create_async()
            .await;
        let _episodes = server
            .mock("GET", "/tv/episodes/7")
            .with_status(200)
            .with_body(r#"[{"title":"Pilot","season":1,"episode":1,"aired":true}]"#)
            .create_async()
            .await;

        let client = SimklClient::with_base_url("cid".into(), server.url());

        let settings = client.get_user_settings("tok").await.unwrap();
        assert_eq!(settings.user.unwrap().name.as_deref(), Some("umaru"));
        assert_eq!(settings.account.unwrap().id, Some(42));

        let episodes = client.get_show_episodes("tok", 7).await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].episode, Some(1));
    }
}
