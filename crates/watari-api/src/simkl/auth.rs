use super::error::SimklError;
use super::types::TokenResponse;

pub const BASE_URL: &str = "https://api.simkl.com";
const CONSENT_URL: &str = "https://simkl.com/oauth/authorize";

/// Fixed redirect stub; the fragment selects which provider's flow is
/// resuming when the callback surface reopens.
pub const REDIRECT_URI: &str = "https://watari.app/callback/popup#simkl-oauth";

/// Consent-page URL the user is navigated to.
pub fn authorize_url(client_id: &str) -> String {
    let mut url = url::Url::parse(CONSENT_URL).expect("consent URL is valid");
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", REDIRECT_URI);
    url.into()
}

/// Exchange a one-time authorization code for an access token.
///
/// A response with an `error` field, or with neither `error` nor
/// `access_token`, is a failure; the caller discards the code either way.
pub async fn exchange_code(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<String, SimklError> {
    let resp = http
        .post(format!("{base_url}/oauth/token"))
        .json(&serde_json::json!({
            "code": code,
            "client_id": client_id,
            "client_secret": client_secret,
            "redirect_uri": REDIRECT_URI,
            "grant_type": "authorization_code",
        }))
        .send()
        .await?;

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| SimklError::Parse(e.to_string()))?;

    if let Some(error) = token.error {
        tracing::warn!(%error, "Simkl token exchange rejected");
        return Err(SimklError::Auth(error));
    }
    match token.access_token {
        Some(access_token) => Ok(access_token),
        None => Err(SimklError::Auth(
            "token response had neither access_token nor error".into(),
        )),
    }
}
