//! HTTP API Layer
//!
//! A thin Axum trigger over `domain_bonus::BonusService`.
//!
//! # Routes
//!
//! - `GET /health`, `GET /health/ready`
//! - `POST /api/v1/visits/:id/bonuses/calculate`
//! - `GET /api/v1/visits/:id/bonuses`
//! - `PUT /api/v1/bonus-history/:id/billing-link`
//! - `GET /api/v1/bonus-definitions/:id`
//! - `POST /api/v1/bonuses/recalculate`
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::postgres(pool, &config)?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{HealthCheckable, TemporalError};
use domain_bonus::BonusService;
use infra_db::{
    PostgresBillingCodeAdapter, PostgresDefinitionAdapter, PostgresHistoryAdapter,
    PostgresVisitAdapter,
};

use crate::config::ApiConfig;
use crate::handlers::{bonus, health};
use crate::middleware::audit_middleware;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BonusService>,
    /// Adapters probed by the readiness check
    pub health: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    pub fn new(service: BonusService) -> Self {
        Self {
            service: Arc::new(service),
            health: Vec::new(),
        }
    }

    pub fn with_health_check(mut self, adapter: Arc<dyn HealthCheckable>) -> Self {
        self.health.push(adapter);
        self
    }

    /// Wires the service to the PostgreSQL adapters
    pub fn postgres(pool: PgPool, config: &ApiConfig) -> Result<Self, TemporalError> {
        let definitions = Arc::new(PostgresDefinitionAdapter::new(pool.clone()));
        let visits = Arc::new(PostgresVisitAdapter::new(pool.clone()));
        let history = Arc::new(PostgresHistoryAdapter::new(pool.clone()));
        let billing = Arc::new(PostgresBillingCodeAdapter::new(pool));

        let service = BonusService::new(
            definitions,
            visits.clone(),
            history.clone(),
            billing,
            config.engine_settings()?,
        );

        Ok(Self::new(service)
            .with_health_check(visits)
            .with_health_check(history))
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let api_routes = Router::new()
        .route("/visits/:id/bonuses/calculate", post(bonus::calculate_visit))
        .route("/visits/:id/bonuses", get(bonus::list_visit_bonuses))
        .route("/bonus-history/:id/billing-link", put(bonus::set_billing_link))
        .route("/bonus-definitions/:id", get(bonus::get_definition))
        .route("/bonuses/recalculate", post(bonus::recalculate_period))
        .layer(axum_middleware::from_fn(audit_middleware));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
