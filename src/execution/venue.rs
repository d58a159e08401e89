//! Venue API
//!
//! [`Venue`] is the narrow surface the live backend needs from an exchange.
//! [`RestVenue`] speaks a plain JSON-over-HTTP dialect of it.

use super::{ExecutionError, OrderRequest};
use crate::signal::Side;
use crate::state::{OrderIntent, OrderKind, OrderState, OrderStatus, PositionState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An order as the venue reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrder {
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub market_id: String,
    pub intent: OrderIntent,
    pub price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub filled_quantity: Decimal,
    #[serde(default)]
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl VenueOrder {
    pub fn into_order_state(self) -> OrderState {
        let mut order = OrderState::new(
            self.order_id,
            self.market_id,
            self.intent,
            OrderKind::Limit,
            self.price,
            self.quantity,
        );
        order.filled_quantity = self.filled_quantity;
        order.avg_fill_price = self.avg_fill_price;
        order.status = self.status;
        order.created_at = self.created_at;
        order
    }
}

/// A position as the venue reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub market_id: String,
    pub side: Side,
    pub quantity: Decimal,
    pub avg_price: Decimal,
}

impl VenuePosition {
    pub fn into_position_state(self, at: DateTime<Utc>) -> PositionState {
        PositionState {
            market_id: self.market_id,
            side: self.side,
            quantity: self.quantity,
            avg_price: self.avg_price,
            mark_price: self.avg_price,
            opened_at: at,
            updated_at: at,
        }
    }
}

/// Exchange operations used by live execution
#[async_trait]
pub trait Venue: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrder, ExecutionError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutionError>;
    async fn amend_order(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<VenueOrder, ExecutionError>;
    async fn fetch_balance(&self) -> Result<Decimal, ExecutionError>;
    async fn fetch_positions(&self) -> Result<Vec<VenuePosition>, ExecutionError>;
    async fn fetch_open_orders(&self) -> Result<Vec<VenueOrder>, ExecutionError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    balance: Decimal,
}

#[derive(Debug, Serialize)]
struct AmendBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<Decimal>,
}

/// Map a non-success HTTP response to an execution error
pub fn classify_response(status: u16, body: &str) -> ExecutionError {
    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
        return ExecutionError::RateLimited;
    }
    if status >= 500 {
        return ExecutionError::Server { status };
    }

    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = parsed
        .map(|b| (b.code, b.message))
        .unwrap_or_else(|| (String::new(), body.to_string()));
    match code.as_str() {
        "MARKET_CLOSED" => ExecutionError::MarketClosed(message),
        "ORDER_NOT_FOUND" => ExecutionError::UnknownOrder(message),
        _ if status == StatusCode::NOT_FOUND.as_u16() => ExecutionError::UnknownOrder(message),
        _ => ExecutionError::Rejected {
            reason: if code.is_empty() {
                format!("HTTP {}: {}", status, message)
            } else {
                format!("{}: {}", code, message)
            },
        },
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::Timeout(timeout)
    } else {
        ExecutionError::Network(err.to_string())
    }
}

/// JSON REST venue client
pub struct RestVenue {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl RestVenue {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(&self, response: Response) -> Result<Response, ExecutionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %body, "Venue returned error");
        Err(classify_response(status.as_u16(), &body))
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, response: Response) -> Result<T, ExecutionError> {
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| ExecutionError::Network(format!("malformed venue response: {}", e)))
    }
}

#[async_trait]
impl Venue for RestVenue {
    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrder, ExecutionError> {
        let response = self
            .client
            .post(self.url("/orders"))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        self.json(response).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutionError> {
        let response = self
            .client
            .delete(self.url(&format!("/orders/{}", order_id)))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        self.check(response).await.map(|_| ())
    }

    async fn amend_order(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<VenueOrder, ExecutionError> {
        let response = self
            .client
            .patch(self.url(&format!("/orders/{}", order_id)))
            .json(&AmendBody { price, quantity })
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        self.json(response).await
    }

    async fn fetch_balance(&self) -> Result<Decimal, ExecutionError> {
        let response = self
            .client
            .get(self.url("/balance"))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let body: BalanceBody = self.json(response).await?;
        Ok(body.balance)
    }

    async fn fetch_positions(&self) -> Result<Vec<VenuePosition>, ExecutionError> {
        let response = self
            .client
            .get(self.url("/positions"))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        self.json(response).await
    }

    async fn fetch_open_orders(&self) -> Result<Vec<VenueOrder>, ExecutionError> {
        let response = self
            .client
            .get(self.url("/orders"))
            .query(&[("status", "open")])
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        self.json(response).await
    }
}
