use super::error::PlexError;
use super::types::{PinCheckResponse, PinResponse};

pub const BASE_URL: &str = "https://plex.tv";
const CONSENT_URL: &str = "https://app.plex.tv/auth";

/// Fixed redirect stub; the fragment selects which provider's flow is
/// resuming when the callback surface reopens.
pub const REDIRECT_URI: &str = "https://watari.app/callback/popup#plex-oauth";

const PRODUCT: &str = "watari";

/// Request a new one-time PIN to authorize.
pub async fn request_pin(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
) -> Result<PinResponse, PlexError> {
    let resp = http
        .post(format!("{base_url}/api/v2/pins"))
        .header("accept", "application/json")
        .form(&[
            ("strong", "true"),
            ("X-Plex-Product", PRODUCT),
            ("X-Plex-Client-Identifier", client_id),
        ])
        .send()
        .await?;

    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        let message = resp.text().await.unwrap_or_default();
        return Err(PlexError::Api { status, message });
    }
    resp.json()
        .await
        .map_err(|e| PlexError::Parse(e.to_string()))
}

/// Consent-page URL the user approves the PIN on.
pub fn consent_url(client_id: &str, pin_code: &str) -> String {
    let fragment = format!(
        "?clientID={client_id}&code={pin_code}\
         &context%5Bdevice%5D%5Bproduct%5D={PRODUCT}\
         &forwardUrl={}",
        urlencode(REDIRECT_URI)
    );
    format!("{CONSENT_URL}#{fragment}")
}

/// Exchange an approved PIN for an auth token. A PIN the user has not
/// (yet) approved yields no token and is reported as an auth failure;
/// the caller discards the PIN after one attempt either way.
pub async fn exchange_pin(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    pin_id: i64,
    pin_code: &str,
) -> Result<String, PlexError> {
    let resp = http
        .get(format!("{base_url}/api/v2/pins/{pin_id}"))
        .header("accept", "application/json")
        .query(&[("code", pin_code), ("X-Plex-Client-Identifier", client_id)])
        .send()
        .await?;

    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        let message = resp.text().await.unwrap_or_default();
        return Err(PlexError::Api { status, message });
    }

    let check: PinCheckResponse = resp
        .json()
        .await
        .map_err(|e| PlexError::Parse(e.to_string()))?;
    match check.auth_token {
        Some(token) => Ok(token),
        None => Err(PlexError::Auth("PIN not authorized".into())),
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
