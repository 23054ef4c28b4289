//! # Remote API
//!
//! The seam between the sync engine and the server that owns the data.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Replay → HTTP Mapping                              │
//! │                                                                         │
//! │  Sale              POST  /api/sales                  + clientSaleId    │
//! │  ProductUpdate     PUT   /api/products/{id}          + clientId        │
//! │  StockAdjustment   PATCH /api/products/{id}/quantity + clientId        │
//! │                                                                         │
//! │  Every request:  Idempotency-Key: <queue item id>                      │
//! │                  Authorization: Bearer <token>   (if configured)       │
//! │                                                                         │
//! │  2xx + {"id": ..} or {"_id": ..}  → Ok(ServerRecord)                   │
//! │  connect error                    → RemoteError::Unreachable           │
//! │  client timeout                   → RemoteError::Timeout               │
//! │  non-2xx                          → RemoteError::Rejected              │
//! │  2xx without an id                → RemoteError::InvalidResponse       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The idempotency key is the queue item id, so a replay that reached the
//! server but whose acknowledgement was lost is recognized on retry.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use tally_core::{ProductUpdatePayload, SalePayload, StockAdjustmentPayload};

/// Header carrying the queue item id.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// =============================================================================
// Seam
// =============================================================================

/// What the server returns for an accepted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub server_id: String,
}

/// A failed remote call. Every variant counts as one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Remote request timed out")]
    Timeout,

    #[error("Remote rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// True when the same request may succeed later without changes.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) | RemoteError::Timeout => true,
            RemoteError::Rejected { status, .. } => *status >= 500 || *status == 429,
            RemoteError::InvalidResponse(_) => false,
        }
    }
}

/// Server-side counterpart of each queued operation.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_sale(&self, idempotency_key: &str, sale: &SalePayload) -> Result<ServerRecord, RemoteError>;

    async fn update_product(
        &self,
        idempotency_key: &str,
        update: &ProductUpdatePayload,
    ) -> Result<ServerRecord, RemoteError>;

    async fn adjust_stock(
        &self,
        idempotency_key: &str,
        adjustment: &StockAdjustmentPayload,
    ) -> Result<ServerRecord, RemoteError>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// `RemoteApi` over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    client: Client,
    base: Url,
    api_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaleBody<'a> {
    #[serde(flatten)]
    sale: &'a SalePayload,
    client_sale_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductBody<'a, T: Serialize> {
    #[serde(flatten)]
    payload: &'a T,
    client_id: &'a str,
}

#[derive(Deserialize)]
struct IdBody {
    #[serde(alias = "_id")]
    id: Option<Value>,
}

impl HttpRemoteApi {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> SyncResult<Self> {
        let base = Url::parse(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpRemoteApi {
            client,
            base,
            api_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn send(&self, request: RequestBuilder, idempotency_key: &str) -> Result<ServerRecord, RemoteError> {
        let request = request.header(IDEMPOTENCY_HEADER, idempotency_key);
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| transport_error(&self.base, &e))?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), key = idempotency_key, "Remote rejected replay");
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &message),
            });
        }

        let body: IdBody = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        let server_id = match body.id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RemoteError::InvalidResponse("response has no id".into())),
        };

        debug!(key = idempotency_key, server_id = %server_id, "Remote accepted replay");
        Ok(ServerRecord { server_id })
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_sale(&self, idempotency_key: &str, sale: &SalePayload) -> Result<ServerRecord, RemoteError> {
        let url = endpoint(&self.base, &["api", "sales"])?;
        let body = SaleBody {
            sale,
            client_sale_id: idempotency_key,
        };
        self.send(self.client.post(url).json(&body), idempotency_key).await
    }

    async fn update_product(
        &self,
        idempotency_key: &str,
        update: &ProductUpdatePayload,
    ) -> Result<ServerRecord, RemoteError> {
        let url = endpoint(&self.base, &["api", "products", update.product_id.as_str()])?;
        let body = ProductBody {
            payload: update,
            client_id: idempotency_key,
        };
        self.send(self.client.put(url).json(&body), idempotency_key).await
    }

    async fn adjust_stock(
        &self,
        idempotency_key: &str,
        adjustment: &StockAdjustmentPayload,
    ) -> Result<ServerRecord, RemoteError> {
        let url = endpoint(&self.base, &["api", "products", adjustment.product_id.as_str(), "quantity"])?;
        let body = ProductBody {
            payload: adjustment,
            client_id: idempotency_key,
        };
        self.send(self.client.patch(url).json(&body), idempotency_key).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Appends percent-encoded path segments to the base URL.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RemoteError::InvalidResponse(format!("cannot add a path to {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Maps a transport failure.
pub(crate) fn transport_error(base: &Url, err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        return RemoteError::Timeout;
    }
    if err.is_connect() {
        return RemoteError::Unreachable(format!("cannot reach {}", base));
    }
    RemoteError::Unreachable(format!("network error communicating with {}: {}", base, err))
}

fn rejection_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if !body.is_empty() {
        return body.chars().take(200).collect();
    }
    match status.as_u16() {
        401 => "API token is invalid or expired".to_string(),
        403 => "Terminal not authorized".to_string(),
        404 => "Endpoint not found".to_string(),
        s if s >= 500 => format!("Server error (HTTP {})", s),
        s => format!("Unexpected response (HTTP {})", s),
    }
}
