use serde::Deserialize;

/// Body of `POST /api/v2/pins` — a one-time PIN to authorize.
#[derive(Debug, Clone, Deserialize)]
pub struct PinResponse {
    pub id: i64,
    pub code: String,
}

/// Body of `GET /api/v2/pins/{id}` — `auth_token` appears once the user
/// has approved the PIN on the consent page.
#[derive(Debug, Clone, Deserialize)]
pub struct PinCheckResponse {
    #[serde(rename = "authToken")]
    pub auth_token: Option<String>,
}

/// Body of `GET /api/v2/user`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlexUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub thumb: Option<String>,
}
