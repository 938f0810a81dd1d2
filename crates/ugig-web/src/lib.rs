//! Axum JSON API over the profile directory.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};
use ugig_core::{Catalog, FilterCriteria, NormalizedProfile, PriceRange, RoleScope};
use ugig_directory::{
    catalog_path_from_env, load_catalog_or_builtin, LoadFailure, ProfileDirectoryLoader,
};
use ugig_search::{derive_skill_facet, filter, filter_facet_values};
use ugig_storage::{StoreConfig, StoreProvider};

pub const CRATE_NAME: &str = "ugig-web";

#[derive(Clone)]
pub struct AppState {
    pub loader: ProfileDirectoryLoader,
    pub catalog: Catalog,
}

impl AppState {
    pub fn new(loader: ProfileDirectoryLoader, catalog: Catalog) -> Self {
        Self { loader, catalog }
    }
}

/// Browse page query. List-valued params are comma separated.
#[derive(Debug, Deserialize, Default)]
pub struct BrowseQuery {
    pub q: Option<String>,
    pub majors: Option<String>,
    pub skills: Option<String>,
    pub payment_methods: Option<String>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub min_rating: Option<f64>,
}

impl BrowseQuery {
    pub fn criteria(&self, scope: RoleScope) -> FilterCriteria {
        let mut criteria = FilterCriteria::default();
        criteria.set_search_term(self.q.clone().unwrap_or_default());
        criteria.selected_majors = split_list(self.majors.as_deref()).collect();
        criteria.selected_skills = split_list(self.skills.as_deref()).collect();
        criteria.selected_payment_methods = split_list(self.payment_methods.as_deref()).collect();
        if self.min_rate.is_some() || self.max_rate.is_some() {
            criteria.set_price_range(Some(PriceRange::new(
                self.min_rate.unwrap_or(0.0),
                self.max_rate.unwrap_or(f64::MAX),
            )));
        }
        criteria.set_min_rating(self.min_rating);
        criteria.for_scope(scope)
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = String> + '_ {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[derive(Debug, Deserialize, Default)]
struct FacetQuery {
    scope: Option<String>,
    q: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub scope: RoleScope,
    pub total: usize,
    pub profiles: Vec<NormalizedProfile>,
    pub skill_facet: Vec<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/freelancers", get(freelancers_handler))
        .route("/api/clients", get(clients_handler))
        .route("/api/facets/skills", get(skill_facet_handler))
        .route("/api/catalog/majors", get(majors_handler))
        .route("/api/catalog/payment-methods", get(payment_methods_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("UGIG_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let store = StoreProvider::connect(&StoreConfig::from_env()?).await?;
    let catalog = load_catalog_or_builtin(&catalog_path_from_env())?;
    let state = AppState::new(ProfileDirectoryLoader::new(store), catalog);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving profile directory api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn freelancers_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Response {
    browse(&state, RoleScope::Freelancer, &query).await
}

async fn clients_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Response {
    browse(&state, RoleScope::Client, &query).await
}

async fn browse(state: &AppState, scope: RoleScope, query: &BrowseQuery) -> Response {
    match state.loader.load_profiles(scope).await {
        Ok(profiles) => {
            let criteria = query.criteria(scope);
            let matched = contained_filter(&profiles, &criteria);
            Json(BrowseResponse {
                scope,
                total: matched.len(),
                profiles: matched,
                skill_facet: derive_skill_facet(&profiles),
            })
            .into_response()
        }
        Err(failure) => load_failed(failure),
    }
}

// A panicking filter pass degrades to an empty page instead of a dropped connection.
fn contained_filter(profiles: &[NormalizedProfile], criteria: &FilterCriteria) -> Vec<NormalizedProfile> {
    match catch_unwind(AssertUnwindSafe(|| filter(profiles, criteria))) {
        Ok(matched) => matched,
        Err(_) => {
            error!("filter pass panicked; serving an empty result set");
            Vec::new()
        }
    }
}

async fn skill_facet_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FacetQuery>,
) -> Response {
    let scope = match query.scope.as_deref().unwrap_or("freelancer").parse::<RoleScope>() {
        Ok(scope) => scope,
        Err(err) => return bad_request(err.to_string()),
    };
    match state.loader.load_profiles(scope).await {
        Ok(profiles) => {
            let facet = derive_skill_facet(&profiles);
            Json(filter_facet_values(&facet, query.q.as_deref().unwrap_or_default())).into_response()
        }
        Err(failure) => load_failed(failure),
    }
}

async fn majors_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    Json(state.catalog.search_majors(query.q.as_deref().unwrap_or_default())).into_response()
}

async fn payment_methods_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.catalog.payment_methods.clone()).into_response()
}

fn load_failed(failure: LoadFailure) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": failure.user_message() })),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use ugig_storage::{FixtureProfileStore, StaticProfileStore};

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": "f1", "role": "freelancer", "first_name": "Ann", "last_name": "Lee", "major": "CS", "skills": ["React"], "hourly_rate": 50, "payment_methods": ["Venmo"]}),
            json!({"id": "f2", "role": "freelancer", "first_name": "Bo", "last_name": "Kim", "major": "Art", "skills": ["Logo Design"], "hourly_rate": 20}),
            json!({"id": "c1", "role": "client", "first_name": "Cy", "last_name": "Park", "major": "Computer Science"}),
        ]
    }

    fn test_app() -> Router {
        let loader = ProfileDirectoryLoader::new(Arc::new(StaticProfileStore::new(rows())));
        app(AppState::new(loader, Catalog::builtin()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn ids(body: &Value) -> Vec<&str> {
        body["profiles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn query_builds_scoped_criteria() {
        let query = BrowseQuery {
            q: Some("react".into()),
            skills: Some("React, Figma,,".into()),
            max_rate: Some(30.0),
            min_rating: Some(4.0),
            ..Default::default()
        };
        let freelancer = query.criteria(RoleScope::Freelancer);
        assert_eq!(freelancer.selected_skills.len(), 2);
        assert_eq!(freelancer.price_range, Some(PriceRange::new(0.0, 30.0)));
        assert_eq!(freelancer.min_rating, Some(4.0));
        assert!(query.criteria(RoleScope::Client).price_range.is_none());
    }

    #[tokio::test]
    async fn freelancers_endpoint_filters_and_reports_full_facet() {
        let (status, body) = get_json(test_app(), "/api/freelancers?skills=React").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec!["f1"]);
        assert_eq!(body["total"], 1);
        assert_eq!(body["scope"], "freelancer");
        assert_eq!(body["skill_facet"], json!(["Logo Design", "React"]));
    }

    #[tokio::test]
    async fn freelancers_price_range_is_inclusive() {
        let (_, body) = get_json(test_app(), "/api/freelancers?min_rate=20&max_rate=20").await;
        assert_eq!(ids(&body), vec!["f2"]);
    }

    #[tokio::test]
    async fn clients_endpoint_ignores_rate_params() {
        let (status, body) = get_json(test_app(), "/api/clients?max_rate=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec!["c1"]);
    }

    #[tokio::test]
    async fn load_failure_maps_to_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureProfileStore::new(dir.path().join("missing.json"));
        let app = app(AppState::new(
            ProfileDirectoryLoader::new(Arc::new(store)),
            Catalog::builtin(),
        ));
        let (status, body) = get_json(app, "/api/freelancers").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "could not load profiles, try again");
    }

    #[tokio::test]
    async fn skill_facet_search_and_scope_validation() {
        let (status, body) = get_json(test_app(), "/api/facets/skills?scope=freelancers&q=des").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["Logo Design"]));

        let (status, _) = get_json(test_app(), "/api/facets/skills?scope=admins").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn catalog_endpoints_serve_static_lists() {
        let (status, body) = get_json(test_app(), "/api/catalog/majors?q=science").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["Computer Science", "Political Science"]));

        let (_, body) = get_json(test_app(), "/api/catalog/payment-methods").await;
        assert_eq!(body, json!(Catalog::builtin().payment_methods));
    }
}
