//! Razorpay client configuration and orders API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{Order, OrderRequest, PaymentGateway};

const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Retries after the first attempt for idempotent reads
const FETCH_RETRIES: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 200;
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Configuration for the Razorpay gateway
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    /// Publishable key id (also the basic-auth username)
    pub key_id: String,
    /// Secret key: basic-auth password and callback signing secret
    pub key_secret: String,
    /// API base URL, overridable for tests
    pub base_url: String,
    /// Currency for new orders
    pub currency: String,
    /// Upper bound on each gateway call
    pub timeout: Duration,
}

impl RazorpayConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            key_id: std::env::var("RAZORPAY_KEY_ID")
                .map_err(|_| BillingError::Config("RAZORPAY_KEY_ID not set".to_string()))?,
            key_secret: std::env::var("RAZORPAY_KEY_SECRET")
                .map_err(|_| BillingError::Config("RAZORPAY_KEY_SECRET not set".to_string()))?,
            base_url: std::env::var("RAZORPAY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            currency: std::env::var("RAZORPAY_CURRENCY")
                .unwrap_or_else(|_| DEFAULT_CURRENCY.to_string()),
            timeout: Duration::from_secs(
                std::env::var("RAZORPAY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }

    /// Config pointing at an arbitrary base URL with default currency and timeout
    pub fn new(key_id: &str, key_secret: &str, base_url: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            base_url: base_url.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Razorpay orders API client
#[derive(Clone)]
pub struct RazorpayClient {
    http: Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    /// Create a new Razorpay client from config
    pub fn new(config: RazorpayConfig) -> BillingResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BillingError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Create a new Razorpay client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Self::new(RazorpayConfig::from_env()?)
    }

    /// Get the config
    pub fn config(&self) -> &RazorpayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_order_once(&self, order_id: &str) -> BillingResult<Order> {
        let response = self
            .http
            .get(self.url(&format!("/v1/orders/{}", order_id)))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        read_order(response).await
    }
}

/// Turn a gateway response into an order, classifying failures by status
async fn read_order(response: Response) -> BillingResult<Order> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<Order>().await?);
    }

    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() || status.as_u16() == 429 {
        Err(BillingError::Gateway(format!("{}: {}", status, message)))
    } else {
        Err(BillingError::GatewayRejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, request: &OrderRequest) -> BillingResult<Order> {
        // Not retried: a repeated create can open a second order at the gateway.
        let response = self
            .http
            .post(self.url("/v1/orders"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(request)
            .send()
            .await?;

        let order = read_order(response).await?;
        debug!(order_id = %order.id, receipt = %request.receipt, "Gateway order created");
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> BillingResult<Order> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY_MS)
            .max_delay(RETRY_MAX_DELAY)
            .take(FETCH_RETRIES)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.fetch_order_once(order_id).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_retryable() => {
                    warn!(order_id = %order_id, error = %e, "Transient gateway error - will retry");
                    Err(result)
                }
                Err(_) => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn key_secret(&self) -> &str {
        &self.config.key_secret
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> RazorpayClient {
        RazorpayClient::new(RazorpayConfig::new("rzp_test_key", "test_secret", &server.url()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_order_posts_minor_units_and_receipt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/orders")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::Json(serde_json::json!({
                "amount": 49999,
                "currency": "INR",
                "receipt": "inv-1"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"order_1","entity":"order","amount":49999,"currency":"INR","receipt":"inv-1","status":"created"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let order = client
            .create_order(&OrderRequest {
                amount: 49999,
                currency: "INR".to_string(),
                receipt: "inv-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(order.id, "order_1");
        assert_eq!(order.receipt.as_deref(), Some("inv-1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_order_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/v1/orders/order_1")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.fetch_order("order_1").await.unwrap_err();

        assert!(matches!(err, BillingError::Gateway(_)));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_order_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let missing = server
            .mock("GET", "/v1/orders/order_missing")
            .with_status(400)
            .with_body(r#"{"error":{"code":"BAD_REQUEST_ERROR"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.fetch_order("order_missing").await.unwrap_err();

        assert!(matches!(err, BillingError::GatewayRejected { status: 400, .. }));
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_timeout_maps_to_gateway_timeout() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = RazorpayConfig::new("k", "s", &format!("http://{}", addr));
        config.timeout = Duration::from_millis(200);
        let client = RazorpayClient::new(config).unwrap();

        let err = client
            .create_order(&OrderRequest {
                amount: 100,
                currency: "INR".to_string(),
                receipt: "inv".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::GatewayTimeout(_)), "{:?}", err);
        assert!(err.is_retryable());
    }
}
