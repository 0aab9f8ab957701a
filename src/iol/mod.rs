//! IOL (InvertirOnline) REST API Client
//!
//! OAuth password grant with refresh, sliding-window rate limiting and
//! exponential backoff on transient failures.
//! Endpoints documented at: https://api.invertironline.com/

pub mod rate_limit;
pub mod types;

pub use rate_limit::RateLimiter;
pub use types::{AccountBalance, Holding, Operacion, PanelTitulo};

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Credentials, IolConfig};
use crate::error::{IolError, IolResult};
use crate::types::{local_now, normalize_symbol, Candle, Market, OrderResult, OrderSide, Quote};
use types::{
    serie_to_candles, Cotizacion, EstadoCuenta, OrderRequest, PanelGeneral, Portafolio,
    SerieHistoricaRow, TokenResponse,
};

/// Tokens are treated as expired this many seconds early
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: chrono::DateTime<Utc>,
}

impl TokenState {
    fn from_response(resp: TokenResponse) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(resp.expires_in),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// Backoff for retry `attempt` (0-based): 1s, 2s, 4s... capped at 5s, plus up to 20% jitter
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = (1000u64 << attempt.min(6)).min(5000);
    let jitter_cap = base_ms / 5;
    let jitter = if jitter_cap > 0 {
        rand::thread_rng().gen_range(0..=jitter_cap)
    } else {
        0
    };
    Duration::from_millis(base_ms + jitter)
}

/// REST client for the IOL API
pub struct IolClient {
    http: Client,
    config: IolConfig,
    username: Option<String>,
    password: Option<String>,
    token: RwLock<Option<TokenState>>,
    rate_limiter: RateLimiter,
}

impl IolClient {
    /// Create a new client. Credentials are only checked on first authenticated call.
    pub fn new(config: IolConfig, creds: &Credentials) -> IolResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let rate_limiter = RateLimiter::new(
            config.rate_limit_calls,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Ok(Self {
            http,
            username: creds.iol_username.clone(),
            password: creds.iol_password.clone(),
            config,
            token: RwLock::new(None),
            rate_limiter,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> IolResult<TokenState> {
        self.rate_limiter.acquire().await;
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IolError::Auth(format!("{}: {}", status, body)));
        }
        let token: TokenResponse = resp.json().await?;
        Ok(TokenState::from_response(token))
    }

    /// Password grant login
    pub async fn login(&self) -> IolResult<()> {
        let username = self
            .username
            .as_deref()
            .ok_or(IolError::MissingCredentials("IOL_USERNAME"))?;
        let password = self
            .password
            .as_deref()
            .ok_or(IolError::MissingCredentials("IOL_PASSWORD"))?;

        let state = self
            .request_token(&[
                ("username", username),
                ("password", password),
                ("grant_type", "password"),
            ])
            .await?;
        info!(expires_at = %state.expires_at, "🔑 [IOL] Logged in");
        *self.token.write().await = Some(state);
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> IolResult<()> {
        let state = self
            .request_token(&[
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        debug!(expires_at = %state.expires_at, "🔑 [IOL] Token refreshed");
        *self.token.write().await = Some(state);
        Ok(())
    }

    /// Valid bearer token, refreshing or logging in as needed
    async fn access_token(&self) -> IolResult<String> {
        let current = self.token.read().await.clone();
        match current {
            Some(t) if !t.is_expired() => return Ok(t.access_token),
            Some(TokenState {
                refresh_token: Some(rt),
                ..
            }) => {
                if let Err(e) = self.refresh(&rt).await {
                    warn!(error = %e, "🔑 [IOL] Refresh failed, logging in again");
                    self.login().await?;
                }
            }
            _ => self.login().await?,
        }
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| IolError::Auth("no token after login".to_string()))
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Authenticated request with rate limiting, one re-login on 401 and retries on transient errors
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        retry: bool,
    ) -> IolResult<T> {
        let max_attempts = if retry { self.config.max_retries.max(1) } else { 1 };
        let mut reauthenticated = false;
        let mut attempt = 0u32;

        loop {
            let result = self.send_once(method.clone(), path, query, body).await;
            match result {
                Ok(value) => return Ok(value),
                Err(e) if !reauthenticated && e.status() == Some(401) => {
                    reauthenticated = true;
                    self.invalidate_token().await;
                    continue;
                }
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        path = path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "🔁 [IOL] Request failed, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> IolResult<T> {
        let token = self.access_token().await?;
        self.rate_limiter.acquire().await;

        let mut req = self
            .http
            .request(method, self.url(path))
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            let text = resp.text().await?;
            return Ok(serde_json::from_str(&text)?);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => IolError::Unauthorized,
            StatusCode::NOT_FOUND => IolError::NotFound(path.to_string()),
            StatusCode::TOO_MANY_REQUESTS => IolError::RateLimited(body),
            _ => IolError::Api {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> IolResult<T> {
        self.request(Method::GET, path, query, None, true).await
    }

    // ── Market data ─────────────────────────────────────────────

    /// Current quote. `market` defaults to the detected listing market.
    pub async fn get_quote(&self, symbol: &str, market: Option<Market>) -> IolResult<Quote> {
        let simbolo = normalize_symbol(symbol);
        let market = market.unwrap_or_else(|| Market::detect(&simbolo));
        let path = format!("{}/Titulos/{}/Cotizacion", market.iol_code(), simbolo);

        let cotizacion: Cotizacion = self.get(&path, &[]).await.map_err(|e| match e {
            IolError::NotFound(_) => IolError::NotFound(simbolo.clone()),
            other => other,
        })?;
        if cotizacion.ultimo_precio <= 0.0 {
            return Err(IolError::InvalidMarketData(format!(
                "{} sin ultimoPrecio",
                simbolo
            )));
        }
        Ok(cotizacion.into_quote(&simbolo))
    }

    /// Adjusted daily history between two dates (oldest first)
    pub async fn get_history(
        &self,
        symbol: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> IolResult<Vec<Candle>> {
        let simbolo = normalize_symbol(symbol);
        let market = Market::detect(&simbolo);
        let path = format!(
            "{}/Titulos/{}/Cotizacion/seriehistorica/{}/{}/ajustada",
            market.iol_code(),
            simbolo,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let rows: Vec<SerieHistoricaRow> = self.get(&path, &[]).await?;
        Ok(serie_to_candles(rows))
    }

    /// Panel general of the BCBA (leading stocks)
    pub async fn get_panel_general(&self) -> IolResult<Vec<PanelTitulo>> {
        let panel: PanelGeneral = self.get("bCBA/Titulos/Cotizacion/PanelGeneral", &[]).await?;
        Ok(panel.titulos)
    }

    // ── Account ─────────────────────────────────────────────────

    pub async fn get_account_status(&self) -> IolResult<EstadoCuenta> {
        self.get("estadocuenta", &[]).await
    }

    /// Balance available to operate in ARS
    pub async fn get_available_balance(&self) -> IolResult<f64> {
        let estado = self.get_account_status().await?;
        Ok(estado.available_balance(self.config.prefer_immediate_balance))
    }

    /// Every settlement bucket of the ARS account
    pub async fn get_all_balances(&self) -> IolResult<Vec<AccountBalance>> {
        Ok(self.get_account_status().await?.all_balances())
    }

    pub async fn get_portfolio(&self, country: Option<&str>) -> IolResult<Vec<Holding>> {
        let country = country.unwrap_or(&self.config.portfolio_country);
        let portafolio: Portafolio = self.get(&format!("portafolio/{}", country), &[]).await?;
        Ok(portafolio.holdings())
    }

    /// Operations between two dates (defaults to the last 30 days)
    pub async fn get_operations(
        &self,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) -> IolResult<Vec<Operacion>> {
        let (from, to) = default_range(from, to);
        self.get(
            "operaciones",
            &[
                ("filtro.fechaDesde", from.format("%Y-%m-%d").to_string()),
                ("filtro.fechaHasta", to.format("%Y-%m-%d").to_string()),
            ],
        )
        .await
    }

    pub async fn get_operation(&self, id: &str) -> IolResult<Value> {
        self.get(&format!("operaciones/{}", id), &[]).await
    }

    /// Account movements (raw JSON, shape varies by movement type)
    pub async fn get_movements(
        &self,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) -> IolResult<Value> {
        let (from, to) = default_range(from, to);
        self.get(
            "movimientos",
            &[
                ("fechaDesde", from.format("%Y-%m-%d").to_string()),
                ("fechaHasta", to.format("%Y-%m-%d").to_string()),
            ],
        )
        .await
    }

    // ── Orders ──────────────────────────────────────────────────

    /// Limit order, settlement t1, valid for today. Not retried on failure.
    pub async fn place_order(
        &self,
        symbol: &str,
        quantity: u64,
        price: f64,
        side: OrderSide,
        market: Option<Market>,
    ) -> IolResult<OrderResult> {
        let simbolo = normalize_symbol(symbol);
        let market = market.unwrap_or_else(|| Market::detect(&simbolo));
        let order = OrderRequest {
            mercado: market.iol_code().to_string(),
            simbolo: simbolo.clone(),
            cantidad: quantity,
            precio: (price * 100.0).round() / 100.0,
            plazo: "t1".to_string(),
            validez: local_now().format("%Y-%m-%d").to_string(),
        };
        let path = match side {
            OrderSide::Buy => "operar/Comprar",
            OrderSide::Sell => "operar/Vender",
        };
        let body = serde_json::to_value(&order)?;

        info!(
            symbol = %simbolo,
            side = %side,
            quantity = quantity,
            price = order.precio,
            market = %market,
            "📤 [IOL] Sending order"
        );

        let response: Value = self
            .request(Method::POST, path, &[], Some(&body), false)
            .await
            .map_err(order_error)?;

        let mut result = parse_order_response(&response)?;
        result.quantity = quantity;
        result.fill_price = order.precio;
        info!(
            symbol = %simbolo,
            operation_id = ?result.operation_id,
            "✅ [IOL] Order accepted"
        );
        Ok(result)
    }
}

/// Any non-2xx answer to an order POST is a rejection; transport and
/// credential errors pass through
fn order_error(e: IolError) -> IolError {
    match e.status() {
        Some(status) => match e {
            IolError::Api { body, .. } | IolError::RateLimited(body) => {
                IolError::OrderRejected(format!("HTTP {}: {}", status, body))
            }
            other => IolError::OrderRejected(format!("HTTP {}: {}", status, other)),
        },
        None => e,
    }
}

fn default_range(
    from: Option<chrono::NaiveDate>,
    to: Option<chrono::NaiveDate>,
) -> (chrono::NaiveDate, chrono::NaiveDate) {
    let today = local_now().date_naive();
    let to = to.unwrap_or(today);
    let from = from.unwrap_or(to - ChronoDuration::days(30));
    (from, to)
}

/// Interpret a 2xx order response: success only when `numeroOperacion` is present
pub fn parse_order_response(value: &Value) -> IolResult<OrderResult> {
    let operation_id = match value.get("numeroOperacion") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };

    if let Some(id) = operation_id {
        return Ok(OrderResult {
            success: true,
            operation_id: Some(id),
            message: "Orden enviada".to_string(),
            ..Default::default()
        });
    }

    let message = value
        .get("messages")
        .and_then(|m| m.as_array())
        .and_then(|m| m.first())
        .and_then(|m| m.get("description").or_else(|| m.get("title")))
        .or_else(|| value.get("error"))
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "respuesta sin numeroOperacion".to_string());
    Err(IolError::OrderRejected(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_response_with_operation_number() {
        let r = parse_order_response(&json!({"ok": true, "numeroOperacion": 123456})).unwrap();
        assert!(r.success);
        assert_eq!(r.operation_id.as_deref(), Some("123456"));
    }

    #[test]
    fn test_order_response_rejected() {
        let err = parse_order_response(&json!({
            "ok": false,
            "messages": [{"title": "Error", "description": "Saldo insuficiente"}]
        }))
        .unwrap_err();
        match err {
            IolError::OrderRejected(msg) => assert_eq!(msg, "Saldo insuficiente"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_order_response_without_id_is_rejected() {
        assert!(matches!(
            parse_order_response(&json!({"ok": true})),
            Err(IolError::OrderRejected(_))
        ));
    }

    #[test]
    fn test_order_post_errors_become_rejections() {
        for err in [
            IolError::Unauthorized,
            IolError::NotFound("operar/Comprar".into()),
            IolError::RateLimited("slow down".into()),
            IolError::Api {
                status: 400,
                body: "Saldo insuficiente".into(),
            },
        ] {
            let status = err.status().unwrap();
            match order_error(err) {
                IolError::OrderRejected(msg) => assert!(msg.starts_with(&format!("HTTP {}", status))),
                other => panic!("unexpected error {other:?}"),
            }
        }
        assert!(matches!(
            order_error(IolError::MissingCredentials("IOL_USERNAME")),
            IolError::MissingCredentials(_)
        ));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let d0 = backoff_delay(0).as_millis();
        let d1 = backoff_delay(1).as_millis();
        let d5 = backoff_delay(5).as_millis();
        assert!((1000..=1200).contains(&d0));
        assert!((2000..=2400).contains(&d1));
        assert!((5000..=6000).contains(&d5));
    }

    #[test]
    fn test_token_expiry_margin() {
        let fresh = TokenState {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: Utc::now() + ChronoDuration::seconds(600),
        };
        let almost = TokenState {
            expires_at: Utc::now() + ChronoDuration::seconds(30),
            ..fresh.clone()
        };
        assert!(!fresh.is_expired());
        assert!(almost.is_expired());
    }

    #[test]
    fn test_login_without_credentials_fails() {
        let client = IolClient::new(IolConfig::default(), &Credentials::default()).unwrap();
        assert!(!client.has_credentials());
        let err = tokio_test::block_on(client.login()).unwrap_err();
        assert!(matches!(err, IolError::MissingCredentials("IOL_USERNAME")));
    }

    #[test]
    fn test_default_range_is_thirty_days() {
        let (from, to) = default_range(None, None);
        assert_eq!((to - from).num_days(), 30);
    }
}
