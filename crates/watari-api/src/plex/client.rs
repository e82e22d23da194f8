use reqwest::Client;
use url::Url;

use super::error::PlexError;
use super::types::PlexUser;

/// Plex API v2 client (plex.tv account endpoints plus per-instance art).
pub struct PlexClient {
    http: Client,
    base_url: String,
    client_id: String,
}

impl PlexClient {
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

    /// Validate a token against the account endpoint. Non-200 means the
    /// token is dead, not an error.
    pub async fn check_token(&self, token: &str) -> Result<bool, PlexError> {
        let resp = self
            .http
            .get(format!("{}/api/v2/user", self.base_url))
            .header("accept", "application/json")
            .header("X-Plex-Token", token)
            .header("X-Plex-Client-Identifier", &self.client_id)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status != 200 {
            tracing::warn!(status, "token rejected by user endpoint");
        }
        Ok(status == 200)
    }

    /// Fetch the signed-in account's profile.
    pub async fn get_user(&self, token: &str) -> Result<PlexUser, PlexError> {
        let resp = self
            .http
            .get(format!("{}/api/v2/user", self.base_url))
            .header("accept", "application/json")
            .header("X-Plex-Token", token)
            .header("X-Plex-Client-Identifier", &self.client_id)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status != 200 {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlexError::Api { status, message });
        }
        resp.json()
            .await
            .map_err(|e| PlexError::Parse(e.to_string()))
    }

    /// Build the transcoded background-art URL for a library item on the
    /// user's own instance. Pure URL construction, no request.
    pub fn art_url(
        instance_url: &Url,
        rating_key: &str,
        token: &str,
        portrait: bool,
    ) -> Result<String, PlexError> {
        let (width, height) = if portrait { (600, 900) } else { (1920, 1080) };
        let mut url = instance_url
            .join("photo/:/transcode")
            .map_err(|e| PlexError::Parse(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("width", &width.to_string())
            .append_pair("height", &height.to_string())
            .append_pair("minSize", "1")
            .append_pair("upscale", "1")
            .append_pair("url", &format!("/library/metadata/{rating_key}/art"))
            .append_pair("X-Plex-Token", token);
        Ok(url.into())
    }
}
