//! Profile store backends behind the `fetch_profiles_by_role` read contract.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::fs;
use tracing::{info_span, Instrument};
use ugig_core::ProfileRole;

pub const CRATE_NAME: &str = "ugig-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected payload: {0}")]
    Payload(String),
}

/// Read contract of the external profile store.
///
/// Implementations return raw, untrusted rows whose `role` is one of `roles`,
/// newest first. The full result set is returned; there is no paging.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn fetch_profiles_by_role(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError>;
}

fn role_names(roles: &[ProfileRole]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

/// Role predicate for backends that cannot push it down to a query.
pub fn record_has_role(record: &JsonValue, roles: &[ProfileRole]) -> bool {
    record
        .get("role")
        .and_then(|v| v.as_str())
        .map(|role| {
            let role = role.trim();
            roles.iter().any(|r| role.eq_ignore_ascii_case(r.as_str()))
        })
        .unwrap_or(false)
}

fn record_created_at(record: &JsonValue) -> Option<DateTime<Utc>> {
    let raw = record
        .get("created_at")
        .or_else(|| record.get("createdAt"))?
        .as_str()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Newest first; rows without a parseable timestamp sink to the end in input order.
pub fn sort_newest_first(records: &mut [JsonValue]) {
    records.sort_by(|a, b| match (record_created_at(a), record_created_at(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to profile database")?;
        Ok(Self::new(pool))
    }

    async fn query_rows(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT to_jsonb(p) AS record
              FROM profiles p
             WHERE p.role::text = ANY($1)
             ORDER BY p.created_at DESC
            "#,
        )
        .bind(role_names(roles))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: JsonValue = row.try_get("record")?;
            out.push(record);
        }
        tracing::debug!(rows = out.len(), "profile rows fetched");
        Ok(out)
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_profiles_by_role(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        let span = info_span!("profile_fetch", backend = "postgres", roles = ?roles);
        self.query_rows(roles).instrument(span).await
    }
}

/// PostgREST-style HTTP endpoint (`/rest/v1/profiles`).
#[derive(Debug, Clone)]
pub struct RestProfileStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestProfileStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn profiles_url(&self) -> String {
        format!("{}/rest/v1/profiles", self.base_url)
    }

    pub fn role_filter(roles: &[ProfileRole]) -> String {
        format!("in.({})", role_names(roles).join(","))
    }

    async fn request_rows(&self, url: &str, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        let resp = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[
                ("select", "*".to_string()),
                ("role", Self::role_filter(roles)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }

        match resp.json::<JsonValue>().await? {
            JsonValue::Array(rows) => Ok(rows),
            other => Err(StoreError::Payload(format!(
                "expected a JSON array of profiles, got {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    fn backend_name(&self) -> &'static str {
        "rest"
    }

    async fn fetch_profiles_by_role(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        let url = self.profiles_url();
        let span = info_span!("profile_fetch", backend = "rest", url = %url, roles = ?roles);
        self.request_rows(&url, roles).instrument(span).await
    }
}

/// JSON array on disk. Re-read on every fetch.
#[derive(Debug, Clone)]
pub struct FixtureProfileStore {
    path: PathBuf,
}

impl FixtureProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_rows(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        let text = fs::read_to_string(&self.path).await.map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let value: JsonValue = serde_json::from_str(&text)
            .map_err(|e| StoreError::Payload(format!("parsing {}: {e}", self.path.display())))?;
        let JsonValue::Array(rows) = value else {
            return Err(StoreError::Payload(format!(
                "{} must hold a JSON array of profiles",
                self.path.display()
            )));
        };
        let mut rows = rows
            .into_iter()
            .filter(|r| record_has_role(r, roles))
            .collect::<Vec<_>>();
        sort_newest_first(&mut rows);
        Ok(rows)
    }
}

#[async_trait]
impl ProfileStore for FixtureProfileStore {
    fn backend_name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_profiles_by_role(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        let span = info_span!("profile_fetch", backend = "fixture", path = %self.path.display());
        self.read_rows(roles).instrument(span).await
    }
}

/// In-memory rows, assumed already newest first. Stands in for a real store in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProfileStore {
    records: Vec<JsonValue>,
}

impl StaticProfileStore {
    pub fn new(records: Vec<JsonValue>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ProfileStore for StaticProfileStore {
    fn backend_name(&self) -> &'static str {
        "static"
    }

    async fn fetch_profiles_by_role(&self, roles: &[ProfileRole]) -> Result<Vec<JsonValue>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| record_has_role(r, roles))
            .cloned()
            .collect())
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Rest { base_url: String, api_key: String },
    Fixture { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub http_timeout: Duration,
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Explicit `UGIG_STORE` wins; otherwise the first configured backend is used.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let http_timeout = Duration::from_secs(
            var("UGIG_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        );
        let database_url = var("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let rest_url = var("UGIG_REST_URL").filter(|v| !v.trim().is_empty());
        let rest_key = var("UGIG_REST_KEY").unwrap_or_default();
        let fixture_path = var("UGIG_FIXTURE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("fixtures/profiles.json"));

        let backend = match var("UGIG_STORE").map(|v| v.trim().to_ascii_lowercase()) {
            Some(kind) if kind == "postgres" => StoreBackend::Postgres {
                database_url: database_url.context("UGIG_STORE=postgres requires DATABASE_URL")?,
            },
            Some(kind) if kind == "rest" => StoreBackend::Rest {
                base_url: rest_url.context("UGIG_STORE=rest requires UGIG_REST_URL")?,
                api_key: rest_key,
            },
            Some(kind) if kind == "fixture" => StoreBackend::Fixture { path: fixture_path },
            Some(kind) => bail!("unknown UGIG_STORE `{kind}` (expected postgres, rest or fixture)"),
            None => match (database_url, rest_url) {
                (Some(database_url), _) => StoreBackend::Postgres { database_url },
                (None, Some(base_url)) => StoreBackend::Rest {
                    base_url,
                    api_key: rest_key,
                },
                (None, None) => StoreBackend::Fixture { path: fixture_path },
            },
        };

        Ok(Self {
            backend,
            http_timeout,
        })
    }
}

/// Builds the process-wide store once at startup; callers hand the result to the loader.
pub struct StoreProvider;

impl StoreProvider {
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Arc<dyn ProfileStore>> {
        let store: Arc<dyn ProfileStore> = match &config.backend {
            StoreBackend::Postgres { database_url } => Arc::new(PgProfileStore::connect(database_url).await?),
            StoreBackend::Rest { base_url, api_key } => {
                Arc::new(RestProfileStore::new(base_url.clone(), api_key.clone(), config.http_timeout)?)
            }
            StoreBackend::Fixture { path } => Arc::new(FixtureProfileStore::new(path.clone())),
        };
        tracing::info!(backend = store.backend_name(), "profile store ready");
        Ok(store)
    }
}
