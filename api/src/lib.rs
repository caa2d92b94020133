//! HTTP API serving the lemma atlas data and views

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

use admin::JobRegistry;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{middleware, Router};
use config::Config;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lemmario_lib::{Dataset, FilterCache};
use std::num::NonZeroU32;
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

pub struct AppState {
    pub config: Config,
    dataset: RwLock<Arc<Dataset>>,
    pub cache: Arc<FilterCache>,
    pub jobs: JobRegistry,
    upload_limiter: DefaultDirectRateLimiter,
    /// Held while a processed upload is written to disk and installed, so
    /// `lemmi.json` and the in-memory dataset always come from the same upload.
    pub(crate) publish_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    /// Load `lemmi.json` from the data directory, or start empty if absent.
    pub fn load(config: Config) -> anyhow::Result<Self> {
        let path = config.lemmi_path();
        let dataset = if path.exists() {
            Dataset::open(&path)?
        } else {
            tracing::warn!(path = %path.display(), "no lemma data found, starting with an empty dataset");
            Dataset::new(Vec::new())?
        };
        Ok(Self::with_dataset(config, dataset))
    }

    pub fn with_dataset(config: Config, dataset: Dataset) -> Self {
        let per_hour = NonZeroU32::new(config.upload_limit_per_hour).unwrap_or(NonZeroU32::MIN);
        Self {
            cache: Arc::new(FilterCache::new(config.cache_capacity)),
            dataset: RwLock::new(Arc::new(dataset)),
            jobs: JobRegistry::default(),
            upload_limiter: RateLimiter::direct(Quota::per_hour(per_hour)),
            publish_lock: tokio::sync::Mutex::new(()),
            config,
        }
    }

    /// The current dataset snapshot. Readers keep their snapshot across a swap.
    pub fn dataset(&self) -> Arc<Dataset> {
        self.dataset.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Install a new dataset and drop memoized results for the old one.
    pub fn replace_dataset(&self, dataset: Dataset) {
        let generation = dataset.generation();
        *self.dataset.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(dataset);
        self.cache.clear();
        tracing::info!(generation, "dataset replaced");
    }

    pub fn allow_upload(&self) -> bool {
        self.upload_limiter.check().is_ok()
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origin = match &config.allowed_origins {
        None => AllowOrigin::from(Any),
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok())),
    };
    CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any)
}

/// All routes with auth, CORS and body limits applied. Per-IP rate limiting
/// needs peer addresses and is layered on in `main`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let data = Router::new()
        .route("/lemmi", get(handlers::get_lemmi))
        .route("/lemmi/:lemma_id", get(handlers::get_lemma))
        .route("/geojson", get(handlers::get_geojson))
        .route("/regions", get(handlers::get_regions))
        .route("/search", get(handlers::search))
        .route("/suggest", get(handlers::suggest))
        .route("/facets", get(handlers::get_facets))
        .route("/view", post(handlers::view))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), auth::require_api_key));

    // Uploads replace axum's default body cap with the configured one.
    let upload = Router::new()
        .route("/upload", post(admin::upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

    let admin = Router::new()
        .route("/status/:job_id", get(admin::status))
        .merge(upload)
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), auth::require_admin));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", data)
        .nest("/api/admin", admin)
        .fallback(handlers::not_found)
        .layer(cors_layer(&state.config))
        .with_state(state)
}
