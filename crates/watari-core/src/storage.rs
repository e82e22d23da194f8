use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::WatariError;
use crate::models::{MediaKind, ServiceKind};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    scope TEXT NOT NULL,
    key   TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (scope, key)
)";

/// Storage scope, mirroring the two browser storage areas the state was
/// originally partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Replicated across the user's devices. Tokens only.
    Synced,
    /// This device only. Everything else.
    Local,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Local => "local",
        }
    }
}

/// SQLite-backed two-scope key-value store.
///
/// Both contexts (UI surface and background worker) read and write this
/// store; there is no cross-key transaction guarantee beyond the explicit
/// multi-key setters, and interleaved access is last-write-wins.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, WatariError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, WatariError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    // ── Raw key-value access ────────────────────────────────────

    pub fn get(&self, scope: Scope, key: &str) -> Result<Option<String>, WatariError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                params![scope.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, scope: Scope, key: &str, value: &str) -> Result<(), WatariError> {
        self.conn.execute(
            "INSERT INTO kv (scope, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (scope, key) DO UPDATE SET value = excluded.value",
            params![scope.as_str(), key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, scope: Scope, key: &str) -> Result<(), WatariError> {
        self.conn.execute(
            "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
            params![scope.as_str(), key],
        )?;
        Ok(())
    }

    // ── OAuth tokens ────────────────────────────────────────────

    fn token_key(service: ServiceKind) -> String {
        format!("{service}_oauth_token")
    }

    pub fn oauth_token(&self, service: ServiceKind) -> Result<Option<String>, WatariError> {
        self.get(Scope::Synced, &Self::token_key(service))
    }

    pub fn set_oauth_token(&self, service: ServiceKind, token: &str) -> Result<(), WatariError> {
        self.set(Scope::Synced, &Self::token_key(service), token)
    }

    pub fn delete_oauth_token(&self, service: ServiceKind) -> Result<(), WatariError> {
        self.delete(Scope::Synced, &Self::token_key(service))
    }

    // ── One-time authorization codes ────────────────────────────

    fn code_key(service: ServiceKind) -> String {
        format!("{service}_pin_code")
    }

    pub fn one_time_code(&self, service: ServiceKind) -> Result<Option<String>, WatariError> {
        self.get(Scope::Local, &Self::code_key(service))
    }

    pub fn set_one_time_code(&self, service: ServiceKind, code: &str) -> Result<(), WatariError> {
        self.set(Scope::Local, &Self::code_key(service), code)
    }

    pub fn delete_one_time_code(&self, service: ServiceKind) -> Result<(), WatariError> {
        self.delete(Scope::Local, &Self::code_key(service))
    }

    // ── Sync settings ───────────────────────────────────────────

    pub fn instance_url(&self) -> Result<Option<String>, WatariError> {
        self.get(Scope::Local, "plex_instance_url")
    }

    pub fn sync_period_hours(&self) -> Result<Option<f64>, WatariError> {
        Ok(self
            .get(Scope::Local, "sync_period")?
            .and_then(|v| v.parse().ok()))
    }

    /// Write instance URL and sync period together. These two settings are
    /// always committed by the UI as a pair, so they go in one transaction.
    pub fn set_instance_url_and_period(
        &mut self,
        url: &str,
        period_hours: f64,
    ) -> Result<(), WatariError> {
        let tx = self.conn.transaction()?;
        for (key, value) in [
            ("plex_instance_url", url.to_string()),
            ("sync_period", period_hours.to_string()),
        ] {
            tx.execute(
                "INSERT INTO kv (scope, key, value) VALUES ('local', ?1, ?2)
                 ON CONFLICT (scope, key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Incremental sync window ─────────────────────────────────

    fn last_synced_key(kind: MediaKind) -> String {
        format!("last_synced_{kind}")
    }

    pub fn last_synced(&self, kind: MediaKind) -> Result<Option<DateTime<Utc>>, WatariError> {
        Ok(self
            .get(Scope::Local, &Self::last_synced_key(kind))?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    /// Advance the boundary for one category. Called only after a fetch for
    /// that category fully succeeded.
    pub fn set_last_synced(&self, kind: MediaKind, at: DateTime<Utc>) -> Result<(), WatariError> {
        self.set(Scope::Local, &Self::last_synced_key(kind), &at.to_rfc3339())
    }

    pub fn last_synced_all(
        &self,
    ) -> Result<BTreeMap<MediaKind, Option<DateTime<Utc>>>, WatariError> {
        let mut map = BTreeMap::new();
        for &kind in MediaKind::ALL {
            map.insert(kind, self.last_synced(kind)?);
        }
        Ok(map)
    }

    // ── Full-sync flag ──────────────────────────────────────────

    pub fn set_full_sync_flag(&self) -> Result<(), WatariError> {
        self.set(Scope::Local, "do_full_sync", "true")
    }

    /// Read and clear the one-shot full-sync flag in one transaction.
    pub fn take_full_sync_flag(&mut self) -> Result<bool, WatariError> {
        let tx = self.conn.transaction()?;
        let set: Option<String> = tx
            .query_row(
                "SELECT value FROM kv WHERE scope = 'local' AND key = 'do_full_sync'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "DELETE FROM kv WHERE scope = 'local' AND key = 'do_full_sync'",
            [],
        )?;
        tx.commit()?;
        Ok(set.is_some())
    }

    // ── Allowed origins ─────────────────────────────────────────

    pub fn allowed_origins(&self) -> Result<Vec<String>, WatariError> {
        match self.get(Scope::Local, "allowed_origins")? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn add_allowed_origin(&self, origin: &str) -> Result<(), WatariError> {
        let mut origins = self.allowed_origins()?;
        if !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
        self.set(
            Scope::Local,
            "allowed_origins",
            &serde_json::to_string(&origins)?,
        )
    }

    pub fn remove_allowed_origin(&self, origin: &str) -> Result<(), WatariError> {
        let mut origins = self.allowed_origins()?;
        origins.retain(|o| o != origin);
        self.set(
            Scope::Local,
            "allowed_origins",
            &serde_json::to_string(&origins)?,
        )
    }

    // ── Pending permission prompt ───────────────────────────────

    pub fn set_pending_permission_url(&self, url: &str) -> Result<(), WatariError> {
        self.set(Scope::Local, "pending_permission_url", url)
    }

    /// Consume the URL stashed before a permission prompt closed the
    /// surface it was issued from.
    pub fn take_pending_permission_url(&mut self) -> Result<Option<String>, WatariError> {
        let tx = self.conn.transaction()?;
        let url: Option<String> = tx
            .query_row(
                "SELECT value FROM kv WHERE scope = 'local' AND key = 'pending_permission_url'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "DELETE FROM kv WHERE scope = 'local' AND key = 'pending_permission_url'",
            [],
        )?;
        tx.commit()?;
        Ok(url)
    }

    // ── Background images ───────────────────────────────────────

    pub fn set_background_urls(
        &self,
        landscape: Option<&str>,
        portrait: Option<&str>,
    ) -> Result<(), WatariError> {
        if let Some(url) = landscape {
            self.set(Scope::Local, "landscape_url", url)?;
        }
        if let Some(url) = portrait {
            self.set(Scope::Local, "portrait_url", url)?;
        }
        Ok(())
    }

    pub fn background_urls(&self) -> Result<(Option<String>, Option<String>), WatariError> {
        Ok((
            self.get(Scope::Local, "landscape_url")?,
            self.get(Scope::Local, "portrait_url")?,
        ))
    }
}
