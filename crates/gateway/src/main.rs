//! Casedesk API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Owner session authentication and plan checks
//! - Client portal token validation
//! - AI relay
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

#[cfg(test)]
mod tests;

use axum::{
    error_handling::HandleErrorLayer,
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    BoxError, Router,
};
use casedesk_common::{
    auth::JwtManager,
    clock::{Clock, SystemClock},
    config::{AppConfig, ObservabilityConfig},
    db::{CaseStore, DbPool, EntitlementStore, IntakeStore, PortalStore, Repository},
    errors::{AppError, Result},
    metrics,
    portal::GrantSettings,
    relay::{ChatRelay, HttpRelay},
    EntitlementResolver, PortalTokenGate,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtManager>,
    pub entitlements: EntitlementResolver,
    pub portal: PortalTokenGate,
    pub cases: Arc<dyn CaseStore>,
    pub intake: Arc<dyn IntakeStore>,
    /// None when no upstream API key is configured
    pub relay: Option<Arc<dyn ChatRelay>>,
    /// None when running over the in-memory store
    pub db: Option<DbPool>,
}

impl AppState {
    /// Wire the evaluators over one store
    pub fn new<S>(
        config: Arc<AppConfig>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        relay: Option<Arc<dyn ChatRelay>>,
    ) -> Result<Self>
    where
        S: EntitlementStore + PortalStore + CaseStore + IntakeStore + 'static,
    {
        let secret = config
            .auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret is not configured".to_string(),
            })?;
        let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

        Ok(Self {
            jwt,
            entitlements: EntitlementResolver::new(store.clone(), clock.clone()),
            portal: PortalTokenGate::new(
                store.clone(),
                clock,
                GrantSettings::from(&config.portal),
            ),
            cases: store.clone(),
            intake: store,
            relay,
            db: None,
            config,
        })
    }

    pub fn with_db(mut self, db: DbPool) -> Self {
        self.db = Some(db);
        self
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(match std::env::var("CASEDESK_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::load()?,
    });

    init_tracing(&config.observability);
    info!("Starting Casedesk API Gateway v{}", casedesk_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    let repository = Arc::new(Repository::new(db.clone()));

    let relay: Option<Arc<dyn ChatRelay>> = match HttpRelay::new(&config.relay) {
        Ok(relay) => Some(Arc::new(relay)),
        Err(e) => {
            warn!(error = %e, "AI relay disabled");
            None
        }
    };

    // Create app state
    let state = AppState::new(config.clone(), repository, Arc::new(SystemClock), relay)?.with_db(db);

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .install()?;
    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Owner entitlements
        .route("/me/entitlements", get(handlers::entitlements::get_entitlements))
        .route("/me/tier", put(handlers::entitlements::update_tier))

        // Cases
        .route("/cases", post(handlers::cases::create_case))
        .route("/cases/{id}/status", patch(handlers::cases::update_case_status))

        // Portal grants (owner side)
        .route(
            "/clients/{id}/portal-grants",
            post(handlers::portal::issue_grant).get(handlers::portal::list_grants),
        )
        .route("/portal-grants/{id}", delete(handlers::portal::deactivate_grant))

        // Portal (token holder side)
        .route("/portal", get(handlers::portal::portal_view))
        .route("/portal/intake", post(handlers::intake::submit_form))
        .route(
            "/portal/intake/conversations",
            post(handlers::intake::start_conversation),
        )
        .route(
            "/portal/intake/conversations/{id}/messages",
            post(handlers::intake::append_message),
        )
        .route(
            "/portal/intake/conversations/{id}/complete",
            post(handlers::intake::complete_conversation),
        )

        // AI relay
        .route("/ai/chat", post(handlers::ai::chat));

    let mut app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes);

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            limits.requests_per_second,
            limits.burst,
        );
        app = app.layer(from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Requests running past the configured timeout are cut off
    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_timeout))
        .timeout(state.config.request_timeout());

    // Compose the app
    app.layer(timeout)
        .layer(from_fn(middleware::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

async fn handle_timeout(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::ServiceUnavailable {
            message: "Request timed out".to_string(),
        }
    } else {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
