use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::error::{AppError, Result};
use crate::identity::{is_valid_ticket_number, PrintPayload};
use crate::qr::QrRendererSelector;
use crate::ratelimit::{RateLimitStore, RateLimiter};
use crate::settlement::{DrawSettler, ExpiryReport, SettlementReport};
use crate::state::TicketStore;
use crate::types::{
    Actor, Agent, ClaimAuditRecord, Draw, DrawTime, NewWager, ReprintRecord, Role, Ticket, Wager,
};
use crate::workflow::{ClaimWorkflow, TicketDetails, TicketIssuer};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub struct ApiState<S, R> {
    pub store: Arc<S>,
    pub claims: ClaimWorkflow<S>,
    pub issuer: TicketIssuer<S>,
    pub settler: DrawSettler<S>,
    pub claim_limiter: RateLimiter<R>,
    pub reprint_limiter: RateLimiter<R>,
    pub qr: Arc<QrRendererSelector>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

impl<S, R> Clone for ApiState<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            claims: self.claims.clone(),
            issuer: self.issuer.clone(),
            settler: self.settler.clone(),
            claim_limiter: self.claim_limiter.clone(),
            reprint_limiter: self.reprint_limiter.clone(),
            qr: Arc::clone(&self.qr),
            health: Arc::clone(&self.health),
            latency: Arc::clone(&self.latency),
        }
    }
}

pub fn router<S: TicketStore, R: RateLimitStore>(state: ApiState<S, R>) -> Router {
    Router::new()
        .route("/health", get(get_health::<S, R>))
        .route("/stats/latency", get(get_stats_latency::<S, R>))
        .route("/draws", post(create_draw::<S, R>))
        .route("/draws/:id/close", post(close_draw::<S, R>))
        .route("/draws/:id/result", post(record_result::<S, R>))
        .route("/draws/:id/expire", post(expire_draw::<S, R>))
        .route("/agents/:id", put(upsert_agent::<S, R>))
        .route("/tickets", post(issue_ticket::<S, R>))
        .route("/tickets/verify", post(verify_ticket::<S, R>))
        .route("/tickets/:number", get(get_ticket::<S, R>))
        .route("/tickets/:number/claim", post(request_claim::<S, R>))
        .route("/tickets/:number/approve", post(approve_claim::<S, R>))
        .route("/tickets/:number/reject", post(reject_claim::<S, R>))
        .route("/tickets/:number/reprint", post(reprint_ticket::<S, R>))
        .route("/tickets/:number/audit", get(get_audit::<S, R>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// Caller identity as forwarded by the authenticating gateway.
pub struct Caller(pub Actor);

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Authorization(format!("missing {name} header")))
    };
    let id = header(ACTOR_ID_HEADER)?
        .parse::<i64>()
        .map_err(|_| AppError::Authorization(format!("{ACTOR_ID_HEADER} must be an integer")))?;
    let role = header(ACTOR_ROLE_HEADER)?
        .to_ascii_lowercase()
        .parse::<Role>()
        .map_err(|e| AppError::Authorization(e.to_string()))?;
    Ok(Actor::new(id, role))
}

#[axum::async_trait]
impl<St: Send + Sync> FromRequestParts<St> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self> {
        actor_from_headers(&parts.headers).map(Caller)
    }
}

/// Ticket numbers in paths must be 17 digits before they reach the core.
pub struct TicketNumber(pub String);

#[axum::async_trait]
impl<St: Send + Sync> FromRequestParts<St> for TicketNumber {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self> {
        let Path(number) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        if !is_valid_ticket_number(&number) {
            return Err(AppError::Validation(format!(
                "ticket number '{number}' must be 17 digits"
            )));
        }
        Ok(TicketNumber(number))
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateDrawRequest {
    pub draw_date: NaiveDate,
    pub draw_time: DrawTime,
}

#[derive(Deserialize)]
pub struct RecordResultRequest {
    pub winning_number: String,
}

/// Profile fields only. Roles arrive with each request from the gateway and are
/// never stored, so a `role` key in the body is ignored.
#[derive(Deserialize)]
pub struct AgentRequest {
    pub username: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct IssueTicketRequest {
    pub draw_id: i64,
    pub wagers: Vec<NewWager>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub payload: String,
}

#[derive(Deserialize, Default)]
pub struct ApproveRequest {
    #[serde(default)]
    pub prize_amount: Option<f64>,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub qr_renderer: &'static str,
    pub qr_fallback_active: bool,
    pub last_settlement_at_ms: Option<u64>,
    pub notifications_pending: u64,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
}

#[derive(Serialize)]
pub struct PrintResponse {
    pub ticket: Ticket,
    pub wagers: Vec<Wager>,
    pub print: PrintPayload,
    pub qr_image_url: String,
}

#[derive(Serialize)]
pub struct ReprintResponse {
    pub print: PrintPayload,
    pub qr_image_url: String,
}

#[derive(Serialize)]
pub struct AuditResponse {
    pub ticket_number: String,
    pub audit: Vec<ClaimAuditRecord>,
    pub reprints: Vec<ReprintRecord>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
) -> Json<HealthResponse> {
    let last = state.health.last_settlement_at_ms();
    Json(HealthResponse {
        status: "ok",
        qr_renderer: state.qr.current().name(),
        qr_fallback_active: state.health.qr_fallback_active(),
        last_settlement_at_ms: (last > 0).then_some(last),
        notifications_pending: state.health.notifications_pending(),
    })
}

async fn get_stats_latency<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
) -> Json<LatencyResponse> {
    let (p50_us, p95_us, p99_us) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_us,
        p95_us,
        p99_us,
    })
}

async fn create_draw<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    Json(body): Json<CreateDrawRequest>,
) -> Result<Json<Draw>> {
    let draw = state
        .settler
        .create_draw(&actor, body.draw_date, body.draw_time)
        .await?;
    Ok(Json(draw))
}

async fn close_draw<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    Path(draw_id): Path<i64>,
) -> Result<Json<Draw>> {
    Ok(Json(state.settler.close_draw(&actor, draw_id).await?))
}

async fn record_result<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    Path(draw_id): Path<i64>,
    Json(body): Json<RecordResultRequest>,
) -> Result<Json<SettlementReport>> {
    let report = state
        .settler
        .record_result(&actor, draw_id, body.winning_number.trim())
        .await?;
    Ok(Json(report))
}

async fn expire_draw<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    Path(draw_id): Path<i64>,
) -> Result<Json<ExpiryReport>> {
    Ok(Json(state.settler.expire_unclaimed(&actor, draw_id).await?))
}

async fn upsert_agent<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    Path(agent_id): Path<i64>,
    Json(body): Json<AgentRequest>,
) -> Result<Json<Agent>> {
    if actor.id != agent_id && !actor.role.can_manage_draws() {
        return Err(AppError::Authorization(format!(
            "{} {} may not edit agent {agent_id}",
            actor.role, actor.id
        )));
    }
    let agent = Agent {
        id: agent_id,
        username: body.username,
        full_name: body.full_name,
        phone: body.phone,
        address: body.address,
    };
    state.store.upsert_agent(agent.clone()).await?;
    Ok(Json(agent))
}

async fn issue_ticket<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    Json(body): Json<IssueTicketRequest>,
) -> Result<Json<PrintResponse>> {
    let issued = state.issuer.issue(&actor, body.draw_id, body.wagers).await?;
    let qr_image_url = state.qr.image_url(&issued.print.qr_payload)?;
    Ok(Json(PrintResponse {
        ticket: issued.ticket,
        wagers: issued.wagers,
        print: issued.print,
        qr_image_url,
    }))
}

async fn verify_ticket<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<Ticket>> {
    Ok(Json(state.claims.verify_presentation(&body.payload).await?))
}

async fn get_ticket<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    TicketNumber(number): TicketNumber,
) -> Result<Json<TicketDetails>> {
    Ok(Json(state.claims.search(&number).await?))
}

async fn request_claim<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    TicketNumber(number): TicketNumber,
) -> Result<Json<Ticket>> {
    state.claim_limiter.check(&actor.id.to_string()).await?;
    Ok(Json(state.claims.request_claim(&number, &actor).await?))
}

async fn approve_claim<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    TicketNumber(number): TicketNumber,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<Ticket>> {
    let ticket = state
        .claims
        .approve_claim(&number, &actor, body.prize_amount)
        .await?;
    Ok(Json(ticket))
}

async fn reject_claim<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    TicketNumber(number): TicketNumber,
    Json(body): Json<RejectRequest>,
) -> Result<Json<Ticket>> {
    Ok(Json(
        state.claims.reject_claim(&number, &actor, &body.reason).await?,
    ))
}

async fn reprint_ticket<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    Caller(actor): Caller,
    TicketNumber(number): TicketNumber,
) -> Result<Json<ReprintResponse>> {
    state.reprint_limiter.check(&actor.id.to_string()).await?;
    let print = state.claims.reprint(&number, &actor).await?;
    let qr_image_url = state.qr.image_url(&print.qr_payload)?;
    Ok(Json(ReprintResponse {
        print,
        qr_image_url,
    }))
}

async fn get_audit<S: TicketStore, R: RateLimitStore>(
    State(state): State<ApiState<S, R>>,
    TicketNumber(number): TicketNumber,
) -> Result<Json<AuditResponse>> {
    let audit = state.claims.audit_trail(&number).await?;
    let reprints = state.claims.reprint_history(&number).await?;
    Ok(Json(AuditResponse {
        ticket_number: number,
        audit,
        reprints,
    }))
}
