//! HTTP client for the brain endpoints, used by the intent mediator.
//!
//! Tenant-scoped: every request carries the tenant slug in the path, which
//! always outranks any header on the server side. HTTP status codes map
//! back to the typed errors the mediator branches on — a 409 is a date
//! conflict, not a failure.

use async_trait::async_trait;
use reqwest::StatusCode;

use super::types::{
    BookingChatRequest, BookingChatResponse, ChatRequest, ChatResponse, RoomsResponse,
    TenantDto, TenantResponse,
};
use crate::config::BrainConfig;
use crate::error::{KioskError, Result};
use crate::events::RoomSummary;
use crate::mediator::BrainApi;

/// Client for one tenant's brain endpoints.
#[derive(Debug, Clone)]
pub struct HttpBrainClient {
    http: reqwest::Client,
    base_url: String,
    tenant_slug: String,
}

impl HttpBrainClient {
    /// Build a client against `config.base_url` for `tenant_slug`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &BrainConfig, tenant_slug: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.llm_timeout_ms.saturating_add(5_000)))
            .build()
            .map_err(|e| KioskError::Brain(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            tenant_slug: tenant_slug.into(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/api/{}/{suffix}", self.base_url, self.tenant_slug)
    }

    /// Fetch the tenant row (name, timezone, policies).
    ///
    /// # Errors
    ///
    /// `KioskError::TenantNotFound` for an unknown slug.
    pub async fn tenant(&self) -> Result<TenantDto> {
        let response = self
            .http
            .get(self.url("tenant"))
            .send()
            .await
            .map_err(|e| KioskError::Brain(format!("tenant fetch failed: {e}")))?;
        let response = map_status(response, &self.tenant_slug).await?;
        let body: TenantResponse = response
            .json()
            .await
            .map_err(|e| KioskError::Brain(format!("malformed tenant reply: {e}")))?;
        Ok(body.tenant)
    }
}

/// Convert error statuses to typed errors, passing success through.
async fn map_status(response: reqwest::Response, tenant: &str) -> Result<reqwest::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(KioskError::TenantNotFound(tenant.to_owned())),
        StatusCode::CONFLICT => {
            let message = response.text().await.unwrap_or_default();
            Err(KioskError::BookingConflict(message))
        }
        status => {
            let message = response.text().await.unwrap_or_default();
            Err(KioskError::Brain(format!("brain returned {status}: {message}")))
        }
    }
}

#[async_trait]
impl BrainApi for HttpBrainClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let response = self
            .http
            .post(self.url("chat"))
            .json(&req)
            .send()
            .await
            .map_err(|e| KioskError::Brain(format!("chat request failed: {e}")))?;
        let response = map_status(response, &self.tenant_slug).await?;
        response
            .json()
            .await
            .map_err(|e| KioskError::Brain(format!("malformed chat reply: {e}")))
    }

    async fn booking_chat(&self, req: BookingChatRequest) -> Result<BookingChatResponse> {
        let response = self
            .http
            .post(self.url("chat/booking"))
            .json(&req)
            .send()
            .await
            .map_err(|e| KioskError::Brain(format!("booking request failed: {e}")))?;
        let response = map_status(response, &self.tenant_slug).await?;
        response
            .json()
            .await
            .map_err(|e| KioskError::Brain(format!("malformed booking reply: {e}")))
    }

    async fn rooms(&self) -> Result<Vec<RoomSummary>> {
        let response = self
            .http
            .get(self.url("rooms"))
            .send()
            .await
            .map_err(|e| KioskError::Brain(format!("rooms fetch failed: {e}")))?;
        let response = map_status(response, &self.tenant_slug).await?;
        let body: RoomsResponse = response
            .json()
            .await
            .map_err(|e| KioskError::Brain(format!("malformed rooms reply: {e}")))?;

        Ok(body
            .rooms
            .into_iter()
            .map(|r| RoomSummary {
                code: r.code,
                name: r.name,
                price_cents: (r.price * 100.0).round() as i64,
                amenities: r.amenities,
            })
            .collect())
    }
}
