//! Brain HTTP server: tenant-scoped chat, booking and inventory endpoints.

pub mod booking;
pub mod chat;
pub mod llm;
pub mod sessions;
pub mod tenant;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::brain::types::{
    BookingChatRequest, BookingChatResponse, ChatRequest, ChatResponse, ErrorBody, HealthResponse,
    RoomDto, RoomsResponse, TenantDto, TenantResponse,
};
use crate::config::KioskConfig;
use crate::error::{KioskError, Result};
use crate::server::llm::LlmClient;
use crate::server::sessions::SessionStore;
use crate::server::tenant::resolve_tenant;
use crate::store::{BookingStore, Room, Tenant};

/// Shared state for all brain handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BookingStore>,
    pub sessions: Arc<SessionStore>,
    pub llm: Arc<LlmClient>,
}

impl AppState {
    /// Build state from configuration and an opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if the LLM client cannot be constructed.
    pub fn new(config: &KioskConfig, store: Arc<BookingStore>) -> Result<Self> {
        Ok(Self {
            store,
            sessions: Arc::new(SessionStore::new(config.brain.history_cap)),
            llm: Arc::new(LlmClient::new(&config.brain)?),
        })
    }
}

/// Build the brain router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_by_header))
        .route("/api/{tenant_slug}/chat", post(chat_by_path))
        .route("/api/{tenant_slug}/chat/booking", post(booking_chat))
        .route("/api/{tenant_slug}/rooms", get(rooms))
        .route("/api/{tenant_slug}/tenant", get(tenant_info))
        .with_state(state)
}

/// Bind and serve the brain until the process exits.
///
/// # Errors
///
/// Returns an error if the listener cannot bind.
pub async fn run_server(config: &KioskConfig, store: Arc<BookingStore>) -> Result<()> {
    let state = AppState::new(config, store)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!("brain listening on http://{local_addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| KioskError::Brain(format!("server error: {e}")))
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Map a typed error to the wire status/code contract.
fn api_error(err: KioskError) -> ApiError {
    let (status, code) = match &err {
        KioskError::TenantNotFound(_) => (StatusCode::NOT_FOUND, "TENANT_NOT_FOUND"),
        KioskError::BookingConflict(_) => (StatusCode::CONFLICT, "BOOKING_DATE_CONFLICT"),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "BOOKING_CHAT_INTERNAL_ERROR",
        ),
    };
    (
        status,
        Json(ErrorBody {
            error: code.to_owned(),
            message: err.to_string(),
        }),
    )
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_owned(),
        service: "atrium-brain".to_owned(),
    })
}

async fn chat_by_header(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let tenant = resolve_tenant(&state.store, None, &headers).map_err(api_error)?;
    Ok(Json(run_chat(&state, &tenant, &req).await))
}

async fn chat_by_path(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let tenant =
        resolve_tenant(&state.store, Some(&tenant_slug), &headers).map_err(api_error)?;
    Ok(Json(run_chat(&state, &tenant, &req).await))
}

async fn run_chat(state: &AppState, tenant: &Tenant, req: &ChatRequest) -> ChatResponse {
    chat::chat_turn(&state.llm, &state.sessions, tenant, req).await
}

async fn booking_chat(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BookingChatRequest>,
) -> std::result::Result<Json<BookingChatResponse>, ApiError> {
    let tenant =
        resolve_tenant(&state.store, Some(&tenant_slug), &headers).map_err(api_error)?;
    booking::booking_turn(&state.llm, &state.sessions, &state.store, &tenant, &req)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn rooms(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<RoomsResponse>, ApiError> {
    let tenant =
        resolve_tenant(&state.store, Some(&tenant_slug), &headers).map_err(api_error)?;
    let rooms = state
        .store
        .rooms_for_tenant(tenant.id)
        .map_err(api_error)?
        .into_iter()
        .map(room_dto)
        .collect();
    Ok(Json(RoomsResponse { rooms }))
}

async fn tenant_info(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<TenantResponse>, ApiError> {
    let tenant =
        resolve_tenant(&state.store, Some(&tenant_slug), &headers).map_err(api_error)?;
    Ok(Json(TenantResponse {
        tenant: tenant_dto(tenant),
    }))
}

fn room_dto(room: Room) -> RoomDto {
    RoomDto {
        id: room.id,
        code: room.code,
        name: room.name,
        price: room.price_cents as f64 / 100.0,
        amenities: room.amenities,
    }
}

fn tenant_dto(tenant: Tenant) -> TenantDto {
    TenantDto {
        id: tenant.id,
        slug: tenant.slug,
        name: tenant.name,
        timezone: tenant.timezone,
        check_in_time: tenant.check_in_time,
        check_out_time: tenant.check_out_time,
        amenities: tenant.amenities,
    }
}
