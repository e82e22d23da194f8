//! Trusted "current server time" resolution for incremental sync windows.
//!
//! Fallback chain, best first: `date` header on an activity response →
//! `date` header on a dedicated zero-payload probe → local clock. The
//! chain is total; callers always get a timestamp, though the orchestrator
//! only advances the stored window when the fetch itself succeeded.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use watari_core::models::{ClockSource, ServerTime};

/// Parse the RFC 2822 `date` header from a response, if present.
pub fn server_time_from_headers(headers: &HeaderMap) -> Option<ServerTime> {
    let raw = headers.get(reqwest::header::DATE)?.to_str().ok()?;
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some(ServerTime {
        at,
        source: ClockSource::ResponseHeader,
    })
}

/// Resolve server time, starting from headers already in hand.
///
/// When no response carried a `date` header (or none arrived at all), a
/// HEAD probe is issued against `probe_url` purely to read its `date`
/// header; if that also fails the local clock is used.
pub async fn resolve_server_time(
    http: &reqwest::Client,
    probe_url: &str,
    first_response: Option<&HeaderMap>,
) -> ServerTime {
    if let Some(st) = first_response.and_then(server_time_from_headers) {
        tracing::debug!(at = %st.at, "server time from response date header");
        return st;
    }

    match http.head(probe_url).send().await {
        Ok(resp) => {
            if let Some(st) = server_time_from_headers(resp.headers()) {
                tracing::debug!(at = %st.at, "server time from probe date header");
                return ServerTime {
                    at: st.at,
                    source: ClockSource::Probe,
                };
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "server time probe failed");
        }
    }

    let st = ServerTime::local();
    tracing::debug!(at = %st.at, "falling back to local clock for server time");
    st
}
