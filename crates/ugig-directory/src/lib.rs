//! Profile directory loading, normalization, and per-page browse sessions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use ugig_core::{Catalog, FilterCriteria, NormalizedProfile, RoleScope};
use ugig_search::{derive_skill_facet, filter, filter_facet_values};
use ugig_storage::ProfileStore;

pub const CRATE_NAME: &str = "ugig-directory";

/// Message shown to people browsing when a load fails.
pub const LOAD_FAILURE_MESSAGE: &str = "could not load profiles, try again";

/// The store could not be queried. Distinct from a load that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("loading {scope} profiles failed: {reason}")]
pub struct LoadFailure {
    pub scope: RoleScope,
    pub reason: String,
}

impl LoadFailure {
    pub fn user_message(&self) -> &'static str {
        LOAD_FAILURE_MESSAGE
    }
}

/// Project an untrusted row onto [`NormalizedProfile`].
///
/// Returns `None` only when the row is not a JSON object. Every field is
/// coerced independently and falls back to its default; this never panics.
pub fn normalize_profile(raw: &JsonValue) -> Option<NormalizedProfile> {
    let row = raw.as_object()?;
    Some(NormalizedProfile {
        id: scalar_text(field(row, &["id"])),
        first_name: scalar_text(field(row, &["first_name", "firstName"])),
        last_name: scalar_text(field(row, &["last_name", "lastName"])),
        major: scalar_text(field(row, &["major"])),
        academic_year: scalar_text(field(row, &["academic_year", "academicYear", "year"])),
        bio: scalar_text(field(row, &["bio"])),
        hourly_rate: rate(field(row, &["hourly_rate", "hourlyRate", "rate"])),
        avatar_url: field(row, &["avatar_url", "avatarUrl"])
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string()),
        skills: string_list(field(row, &["skills"])),
        payment_methods: string_list(field(row, &["payment_methods", "paymentMethods"])),
    })
}

// First non-null value under any of the accepted spellings.
fn field<'a>(row: &'a Map<String, JsonValue>, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_null())
}

fn scalar_text(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn rate(value: Option<&JsonValue>) -> f64 {
    let parsed = match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => 0.0,
    }
}

fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    let Some(JsonValue::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Fetches and normalizes the profiles one browse page shows.
#[derive(Clone)]
pub struct ProfileDirectoryLoader {
    store: Arc<dyn ProfileStore>,
}

impl ProfileDirectoryLoader {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Every call hits the store. Store order is kept.
    pub async fn load_profiles(&self, scope: RoleScope) -> Result<Vec<NormalizedProfile>, LoadFailure> {
        let span = info_span!("load_profiles", %scope, backend = self.store.backend_name());
        async {
            let raw = match self.store.fetch_profiles_by_role(&scope.roles()).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(error = %err, "profile store query failed");
                    return Err(LoadFailure {
                        scope,
                        reason: err.to_string(),
                    });
                }
            };

            let fetched = raw.len();
            let profiles = raw
                .iter()
                .enumerate()
                .filter_map(|(idx, record)| {
                    let Some(profile) = normalize_profile(record) else {
                        debug!(idx, "dropping non-object profile row");
                        return None;
                    };
                    if !profile.has_name() {
                        debug!(idx, id = %profile.id, "dropping profile without a name");
                        return None;
                    }
                    Some(profile)
                })
                .collect::<Vec<_>>();
            info!(fetched, kept = profiles.len(), "profiles loaded");
            Ok::<_, LoadFailure>(profiles)
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Handle for one in-flight load. Only the newest ticket may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    scope: RoleScope,
}

impl LoadTicket {
    pub fn scope(&self) -> RoleScope {
        self.scope
    }
}

/// State of one browse page view: scope, load phase, base collection, criteria.
#[derive(Debug, Clone)]
pub struct BrowseSession {
    scope: RoleScope,
    phase: LoadPhase,
    generation: u64,
    profiles: Vec<NormalizedProfile>,
    skill_facet: Vec<String>,
    criteria: FilterCriteria,
}

impl BrowseSession {
    pub fn new(scope: RoleScope) -> Self {
        Self {
            scope,
            phase: LoadPhase::Idle,
            generation: 0,
            profiles: Vec::new(),
            skill_facet: Vec::new(),
            criteria: FilterCriteria::default(),
        }
    }

    pub fn scope(&self) -> RoleScope {
        self.scope
    }

    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    pub fn profiles(&self) -> &[NormalizedProfile] {
        &self.profiles
    }

    pub fn skill_facet(&self) -> &[String] {
        &self.skill_facet
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn criteria_mut(&mut self) -> &mut FilterCriteria {
        &mut self.criteria
    }

    /// Start a load, superseding any outstanding one. Drops the current collection.
    pub fn begin_load(&mut self, scope: RoleScope) -> LoadTicket {
        self.generation += 1;
        if scope != self.scope {
            self.scope = scope;
            self.criteria = self.criteria.for_scope(scope);
        }
        self.phase = LoadPhase::Loading;
        self.profiles.clear();
        self.skill_facet.clear();
        LoadTicket {
            generation: self.generation,
            scope,
        }
    }

    /// Apply a finished load. Returns false and changes nothing when a newer load started since.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<NormalizedProfile>, LoadFailure>,
    ) -> bool {
        if ticket.generation != self.generation {
            warn!(
                stale = ticket.generation,
                current = self.generation,
                scope = %ticket.scope,
                "discarding superseded profile load"
            );
            return false;
        }
        match result {
            Ok(profiles) => {
                self.skill_facet = derive_skill_facet(&profiles);
                self.profiles = profiles;
                self.phase = LoadPhase::Loaded;
            }
            Err(failure) => {
                self.phase = LoadPhase::Failed(failure.user_message().to_string());
            }
        }
        true
    }

    pub async fn refresh(&mut self, loader: &ProfileDirectoryLoader, scope: RoleScope) -> &LoadPhase {
        let ticket = self.begin_load(scope);
        let result = loader.load_profiles(scope).await;
        self.complete_load(ticket, result);
        &self.phase
    }

    /// Filtered view of the loaded collection; empty unless a load has completed.
    pub fn view(&self) -> Vec<NormalizedProfile> {
        if self.phase != LoadPhase::Loaded {
            return Vec::new();
        }
        filter(&self.profiles, &self.criteria.for_scope(self.scope))
    }

    /// Skill facet narrowed by the skill search box.
    pub fn skill_options(&self, query: &str) -> Vec<String> {
        filter_facet_values(&self.skill_facet, query)
    }

    pub fn clear_filters(&mut self) {
        self.criteria.clear_all();
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub fn catalog_path_from_env() -> PathBuf {
    std::env::var("UGIG_CATALOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("catalog.yaml"))
}

/// Parse a catalog file. Blank entries are dropped, order is kept.
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut catalog: Catalog = serde_yaml::from_str(&text).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    for list in [&mut catalog.majors, &mut catalog.payment_methods] {
        list.retain(|v| !v.trim().is_empty());
        for v in list.iter_mut() {
            *v = v.trim().to_string();
        }
    }
    Ok(catalog)
}

/// Like [`load_catalog`], but a missing file means the built-in catalog.
pub fn load_catalog_or_builtin(path: &Path) -> Result<Catalog, CatalogError> {
    if !path.exists() {
        info!(path = %path.display(), "no catalog file; using built-in catalog");
        return Ok(Catalog::builtin());
    }
    load_catalog(path)
}
