use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::catalog::{
    BRANDS, CATEGORIES, DEFAULT_CATALOG_SIZE, MAX_RESULTS, PRODUCTS_PER_SEARCH, Product,
    ProductCatalog,
};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Runtime options for the search target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "TargetConfig::default_listen")]
    pub listen: String,
    #[serde(default = "TargetConfig::default_catalog_size")]
    pub catalog_size: usize,
    /// Seed for catalog generation; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Expose Prometheus counters on `/metrics`.
    #[serde(default = "bool_true")]
    pub metrics: bool,
}

impl TargetConfig {
    fn default_listen() -> String {
        "127.0.0.1:8080".into()
    }

    const fn default_catalog_size() -> usize {
        DEFAULT_CATALOG_SIZE
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            catalog_size: Self::default_catalog_size(),
            seed: None,
            metrics: true,
        }
    }
}

fn bool_true() -> bool {
    true
}

pub struct TargetMetrics {
    registry: Registry,
    search_requests_total: IntCounter,
    search_rejected_total: IntCounter,
    search_matches_total: IntCounter,
    stats_requests_total: IntCounter,
}

impl TargetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            IntCounter::with_opts(Opts::new(name, help))
        };

        let search_requests_total = counter(
            "searchload_target_search_requests_total",
            "Total number of search requests received",
        )?;
        let search_rejected_total = counter(
            "searchload_target_search_rejected_total",
            "Number of search requests rejected for a missing query",
        )?;
        let search_matches_total = counter(
            "searchload_target_search_matches_total",
            "Number of products matched across all searches",
        )?;
        let stats_requests_total = counter(
            "searchload_target_stats_requests_total",
            "Total number of stats requests received",
        )?;

        registry.register(Box::new(search_requests_total.clone()))?;
        registry.register(Box::new(search_rejected_total.clone()))?;
        registry.register(Box::new(search_matches_total.clone()))?;
        registry.register(Box::new(stats_requests_total.clone()))?;

        Ok(Self {
            registry,
            search_requests_total,
            search_rejected_total,
            search_matches_total,
            stats_requests_total,
        })
    }

    pub fn search_requests(&self) -> u64 {
        self.search_requests_total.get()
    }

    pub fn search_rejected(&self) -> u64 {
        self.search_rejected_total.get()
    }

    fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Clone)]
struct TargetState {
    catalog: Arc<ProductCatalog>,
    metrics: Arc<TargetMetrics>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    products: Vec<Product>,
    total_found: usize,
    search_time: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    total_products: usize,
    products_per_search: usize,
    max_results: usize,
    categories: &'static [&'static str],
    brands: &'static [&'static str],
}

struct SearchError {
    status: StatusCode,
    message: String,
}

impl SearchError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "error": self.message }))).into_response();
        allow_any_origin(&mut response);
        response
    }
}

fn allow_any_origin(response: &mut Response) {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

/// Build the HTTP surface over a shared catalog.
pub fn router(
    catalog: Arc<ProductCatalog>,
    metrics: Arc<TargetMetrics>,
    expose_metrics: bool,
) -> Router {
    let mut router = Router::new()
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler));
    if expose_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }
    router
        .fallback(not_found)
        .with_state(TargetState { catalog, metrics })
}

async fn search_handler(
    State(state): State<TargetState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, SearchError> {
    state.metrics.search_requests_total.inc();

    // Repeated `q` parameters resolve to the first one.
    let query = params
        .into_iter()
        .find_map(|(key, value)| (key == "q").then_some(value))
        .unwrap_or_default();
    if query.is_empty() {
        state.metrics.search_rejected_total.inc();
        return Err(SearchError::bad_request("query parameter 'q' is required"));
    }

    let result = state
        .catalog
        .bounded_search(&query, &mut rand::thread_rng());
    state
        .metrics
        .search_matches_total
        .inc_by(result.total_found as u64);

    let body = SearchResponse {
        products: result.products,
        total_found: result.total_found,
        search_time: format!("{:.3}s", result.elapsed.as_secs_f64()),
    };
    let mut response = Json(body).into_response();
    allow_any_origin(&mut response);
    Ok(response)
}

async fn stats_handler(State(state): State<TargetState>) -> Json<StatsResponse> {
    state.metrics.stats_requests_total.inc();
    Json(StatsResponse {
        total_products: state.catalog.len(),
        products_per_search: PRODUCTS_PER_SEARCH,
        max_results: MAX_RESULTS,
        categories: &CATEGORIES,
        brands: &BRANDS,
    })
}

async fn metrics_handler(State(state): State<TargetState>) -> Response {
    match state.metrics.render() {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
            );
            response
        }
        Err(err) => {
            error!(error = %err, "Failed to render target metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Bound search target, ready to serve.
pub struct TargetServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    metrics: Arc<TargetMetrics>,
}

impl TargetServer {
    /// Generate the catalog and bind the listener described by `config`.
    pub async fn bind(config: &TargetConfig) -> Result<Self> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .with_context(|| format!("Invalid target listener address: {}", config.listen))?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let catalog = Arc::new(ProductCatalog::generate(config.catalog_size, &mut rng));
        info!(products = catalog.len(), "Generated product catalog");

        let metrics = Arc::new(TargetMetrics::new().context("Failed to register target metrics")?);
        let router = router(catalog, Arc::clone(&metrics), config.metrics);

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind target listener at {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read target listener address")?;

        Ok(Self {
            listener,
            router,
            local_addr,
            metrics,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> Arc<TargetMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(listener = %self.local_addr, "Starting search target");
        info!("  GET /search?q=<query> - bounded search over {PRODUCTS_PER_SEARCH} products");
        info!("  GET /stats - catalog statistics");

        axum::serve(self.listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Search target terminated unexpectedly")
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received; stopping search target");
}
