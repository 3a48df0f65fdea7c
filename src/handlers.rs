use crate::automation::{Automation, TickMode};
use crate::config::Config;
use crate::errors::AppError;
use crate::matching::{self, GENERIC_QUERY_LIMIT};
use crate::messaging::WhatsAppClient;
use crate::models::{CarPreferences, Intent, Lead, LeadStatus, Vehicle};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// WhatsApp Cloud API client.
    pub whatsapp: WhatsAppClient,
    /// Orchestrator for per-message and periodic automation.
    pub automation: Arc<Automation>,
    /// Dedup cache for webhook message ids, preventing double processing of
    /// platform redeliveries within the TTL window.
    pub processed_messages_cache: Cache<String, i64>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-dealer-crm",
            "version": "0.1.0"
        })),
    )
}

/// Query parameters for lead listing.
#[derive(Debug, Deserialize)]
pub struct LeadQueryParams {
    pub status: Option<String>,
    pub intent: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/v1/leads
///
/// Operational listing of leads, optionally filtered by status and intent.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadQueryParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    tracing::info!("GET /leads - params: {:?}", params);

    let status = params.status.as_deref().map(LeadStatus::from_wire);
    let intent = params.intent.as_deref().map(Intent::from_wire);
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let leads = state.automation.leads().list(status, intent, limit).await?;
    Ok(Json(leads))
}

/// GET /api/v1/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    tracing::info!("GET /leads/{}", id);

    let lead = state
        .automation
        .leads()
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;

    Ok(Json(lead))
}

/// Query parameters for the generic vehicle-match endpoint.
#[derive(Debug, Deserialize)]
pub struct MatchQueryParams {
    pub make: Option<String>,
    pub max_budget: Option<i64>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
}

/// GET /api/v1/vehicles/matches
///
/// Generic recommendation query: preference-filtered showroom search ranked
/// by demand and stock freshness. An empty result is a valid outcome.
pub async fn vehicle_matches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MatchQueryParams>,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    tracing::info!("GET /vehicles/matches - params: {:?}", params);

    let preferences = CarPreferences {
        make: params.make,
        max_budget: params.max_budget,
        fuel: params.fuel,
        transmission: params.transmission,
        body_type: None,
    };

    let matches = matching::match_inventory(
        state.automation.inventory(),
        &preferences,
        GENERIC_QUERY_LIMIT,
    )
    .await?;

    Ok(Json(matches))
}

/// Query parameters for the periodic trigger.
#[derive(Debug, Deserialize)]
pub struct AutomationRunParams {
    pub mode: Option<String>,
}

/// POST /api/v1/automation/run?mode=hourly|daily
///
/// Periodic trigger boundary. Any mode other than "hourly" or "daily" is a
/// caller error, reported as 400 and never retried.
pub async fn run_automation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AutomationRunParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mode = TickMode::parse(params.mode.as_deref().unwrap_or(""))?;
    let now = Utc::now();

    let processed = match mode {
        TickMode::Daily => {
            let report = state.automation.run_daily(now).await;
            serde_json::to_value(report)?
        }
        TickMode::Hourly => {
            let report = state.automation.run_hourly(now).await;
            serde_json::to_value(report)?
        }
    };

    Ok(Json(json!({
        "success": true,
        "mode": match mode {
            TickMode::Hourly => "hourly",
            TickMode::Daily => "daily",
        },
        "processed": processed,
    })))
}
