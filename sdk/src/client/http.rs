//! HTTP client implementation.
//!
//! Provides [`TerminalClient`], the REST collaborator used for initial
//! snapshots, order entry, login and listen-key management.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::auth::{AuthState, LoginRequest, Session, SessionHolder};
use super::config::ClientConfig;
use super::error::ClientError;
use crate::types::balance::BalancePayload;
use crate::types::{
    BalanceMap, Candle, MarketType, Order, OrderBookSnapshot, PlaceOrderRequest, RawLevel,
    SymbolInfo, Ticker, Trade,
};
use crate::ws::error::WsError;
use crate::ws::listen_key::{ListenKeyApi, ListenKeyGrant};

/// Path of the listen-key resource.
pub const LISTEN_KEY_PATH: &str = "/user-sessions/listen-key";

/// API error response format.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorResponse {
    Nested { error: ApiError },
    Flat(ApiError),
}

/// API error details.
#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(alias = "msg", alias = "error")]
    message: String,
}

/// Responses arrive either bare or wrapped in a named field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Wrapped {
        #[serde(
            alias = "result",
            alias = "symbols",
            alias = "tickers",
            alias = "trades",
            alias = "candles",
            alias = "orders",
            alias = "order",
            alias = "balances"
        )]
        data: T,
    },
    Bare(T),
}

impl<T> Payload<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Order book response.
#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

/// Listen-key validation response.
#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(alias = "isValid")]
    valid: bool,
}

/// One logical request; rebuilt on every retry.
struct Call<'a> {
    method: Method,
    path: &'a str,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    authenticated: bool,
}

impl<'a> Call<'a> {
    fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
            authenticated: false,
        }
    }

    fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    fn query(mut self, name: &'static str, value: impl ToString) -> Self {
        self.query.push((name, value.to_string()));
        self
    }

    fn query_opt(self, name: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    // Only idempotent methods retry on timeout.
    fn retries_timeouts(&self) -> bool {
        self.method != Method::POST
    }
}

/// HTTP client for the Tickstream REST API.
///
/// Clones share the session, so a refresh performed by one clone is seen
/// by all of them.
#[derive(Debug, Clone)]
pub struct TerminalClient {
    config: ClientConfig,
    http: reqwest::Client,
    session: SessionHolder,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TerminalClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()
            .map_err(ClientError::Request)?;

        let session = SessionHolder::new(config.session.clone());
        Ok(Self {
            config,
            http,
            session,
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, ClientError> {
        Self::new(ClientConfig::default())
    }

    /// Creates a new client with the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(ClientConfig::new(base_url))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.get()
    }

    /// Installs a session obtained elsewhere.
    pub fn set_session(&self, session: Session) {
        self.session.set(session);
    }

    /// Returns the login state.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.session.state()
    }

    /// Returns a receiver for login state changes.
    #[must_use]
    pub fn watch_auth(&self) -> watch::Receiver<AuthState> {
        self.session.subscribe()
    }

    fn url(&self, call: &Call<'_>) -> Result<Url, ClientError> {
        let raw = format!("{}{}", self.config.base_url.trim_end_matches('/'), call.path);
        let mut url = Url::parse(&raw)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid url {}: {}", raw, e)))?;
        if !call.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(call.query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Executes a call, refreshing the session once on 401.
    async fn execute<T: DeserializeOwned>(&self, call: Call<'_>) -> Result<T, ClientError> {
        if !call.authenticated {
            return self.request_with_retry(&call, None).await;
        }

        let Some(token) = self.session.access_token() else {
            return Err(ClientError::Unauthorized);
        };

        match self.request_with_retry(&call, Some(&token)).await {
            Err(ClientError::Unauthorized) => {
                debug!(path = call.path, "access token rejected, refreshing session");
                let token = self.refresh_session(&token).await?;
                match self.request_with_retry(&call, Some(&token)).await {
                    Err(ClientError::Unauthorized) => {
                        warn!(path = call.path, "refreshed token rejected, logging out");
                        self.session.clear();
                        Err(ClientError::SessionExpired)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Exchanges the refresh token for a new session and returns the new
    /// access token. Callers that lost the race reuse the winner's token.
    async fn refresh_session(&self, stale: &str) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = match self.session.get() {
            Some(current) if current.access_token != stale => return Ok(current.access_token),
            Some(Session {
                refresh_token: Some(token),
                ..
            }) => token,
            _ => {
                self.session.clear();
                return Err(ClientError::SessionExpired);
            }
        };

        let call = Call::new(Method::POST, "/auth/refresh")
            .json(serde_json::json!({ "refreshToken": refresh_token }));
        match self.request_with_retry::<Payload<Session>>(&call, None).await {
            Ok(payload) => {
                let mut session = payload.into_inner();
                if session.refresh_token.is_none() {
                    session.refresh_token = Some(refresh_token);
                }
                let token = session.access_token.clone();
                self.session.set(session);
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed");
                self.session.clear();
                Err(ClientError::SessionExpired)
            }
        }
    }

    /// Makes a request with retry logic.
    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        call: &Call<'_>,
        token: Option<&str>,
    ) -> Result<T, ClientError> {
        let url = self.url(call)?;
        let mut retry_count = 0;

        loop {
            let mut request = self.http.request(call.method.clone(), url.clone());
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &call.body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let body = resp
                            .text()
                            .await
                            .map_err(|e| ClientError::Deserialization(e.to_string()))?;
                        let body = if body.trim().is_empty() { "null" } else { body.as_str() };

                        return serde_json::from_str(body)
                            .map_err(|e| ClientError::Deserialization(e.to_string()));
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse().ok());

                        if retry_count < self.config.max_retries {
                            let wait_time = retry_after.unwrap_or(1);
                            warn!(path = call.path, wait_secs = wait_time, "rate limited, retrying");
                            tokio::time::sleep(Duration::from_secs(wait_time)).await;
                            retry_count += 1;
                            continue;
                        }

                        return Err(ClientError::RateLimited { retry_after });
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Err(ClientError::NotFound(call.path.to_string()));
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        return Err(ClientError::Unauthorized);
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(api_error(status, body));
                }
                Err(e) => {
                    if e.is_timeout()
                        && call.retries_timeouts()
                        && retry_count < self.config.max_retries
                    {
                        retry_count += 1;
                        let delay = Duration::from_millis(100 * (1 << retry_count));
                        warn!(path = call.path, attempt = retry_count, "request timed out, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ClientError::from(e));
                }
            }
        }
    }

    /// Gets all tradable symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_symbols(&self) -> Result<Vec<SymbolInfo>, ClientError> {
        let payload: Payload<Vec<SymbolInfo>> = self.execute(Call::get("/symbols")).await?;
        Ok(payload.into_inner())
    }

    /// Gets the order book of a symbol.
    ///
    /// # Arguments
    ///
    /// * `symbol` - Trading symbol (e.g. `BTCUSDT`)
    /// * `market_type` - Spot or futures book
    /// * `depth` - Optional number of levels per side
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_orderbook(
        &self,
        symbol: &str,
        market_type: MarketType,
        depth: Option<usize>,
    ) -> Result<OrderBookSnapshot, ClientError> {
        let call = Call::get("/orderbook")
            .query("symbol", symbol.trim().to_ascii_uppercase())
            .query("type", market_type.as_str())
            .query_opt("limit", depth);
        let book: Payload<BookResponse> = self.execute(call).await?;
        let book = book.into_inner();
        Ok(OrderBookSnapshot::from_levels(&book.bids, &book.asks, depth))
    }

    /// Gets 24h tickers, optionally for one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_tickers(&self, symbol: Option<&str>) -> Result<Vec<Ticker>, ClientError> {
        let call = Call::get("/tickers")
            .query_opt("symbol", symbol.map(|s| s.trim().to_ascii_uppercase()));
        let payload: Payload<OneOrMany<Ticker>> = self.execute(call).await?;
        Ok(payload.into_inner().into_vec())
    }

    /// Gets recent trades of a symbol, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Trade>, ClientError> {
        let call = Call::get("/trades/recent")
            .query("symbol", symbol.trim().to_ascii_uppercase())
            .query_opt("limit", limit);
        let payload: Payload<Vec<Trade>> = self.execute(call).await?;
        let mut trades = payload.into_inner();
        trades.sort_by(|a, b| b.time.cmp(&a.time));
        Ok(trades)
    }

    /// Gets candles of a symbol, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, ClientError> {
        let call = Call::get("/candles")
            .query("symbol", symbol.trim().to_ascii_uppercase())
            .query("interval", interval)
            .query_opt("limit", limit);
        let payload: Payload<Vec<Candle>> = self.execute(call).await?;
        let mut candles = payload.into_inner();
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    /// Gets the user's orders, optionally for one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no session is held.
    pub async fn get_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, ClientError> {
        let call = Call::get("/orders")
            .query_opt("symbol", symbol.map(|s| s.trim().to_ascii_uppercase()))
            .authenticated();
        let payload: Payload<Vec<Order>> = self.execute(call).await?;
        Ok(payload.into_inner())
    }

    /// Places an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, the request fails or no
    /// session is held.
    pub async fn place_order(&self, request: &PlaceOrderRequest) -> Result<Order, ClientError> {
        request.validate()?;
        let body = serde_json::to_value(request)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let call = Call::new(Method::POST, "/orders").json(body).authenticated();
        let payload: Payload<Order> = self.execute(call).await?;
        Ok(payload.into_inner())
    }

    /// Cancels an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no session is held.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), ClientError> {
        let path = format!("/orders/{}", order_id);
        let _: serde_json::Value = self
            .execute(Call::new(Method::DELETE, &path).authenticated())
            .await?;
        Ok(())
    }

    /// Gets the user's balances keyed by asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no session is held.
    pub async fn get_balances(&self) -> Result<BalanceMap, ClientError> {
        let payload: Payload<BalancePayload> =
            self.execute(Call::get("/balance").authenticated()).await?;
        Ok(payload.into_inner().into_map())
    }

    /// Logs in and stores the returned session.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the request fails.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let call = Call::new(Method::POST, "/auth/login").json(body);
        let payload: Payload<Session> = self.execute(call).await?;
        self.session.set(payload.into_inner());
        Ok(())
    }

    /// Logs out. The local session is dropped even if the server call fails.
    pub async fn logout(&self) {
        if self.session.get().is_some() {
            let call = Call::new(Method::POST, "/auth/logout").authenticated();
            if let Err(e) = self.execute::<serde_json::Value>(call).await {
                debug!(error = %e, "logout request failed");
            }
        }
        self.session.clear();
    }

    /// Issues a new listen key.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no session is held.
    pub async fn issue_listen_key(&self) -> Result<ListenKeyGrant, ClientError> {
        let call = Call::new(Method::POST, LISTEN_KEY_PATH).authenticated();
        let payload: Payload<ListenKeyGrant> = self.execute(call).await?;
        let grant = payload.into_inner();
        if grant.listen_key.is_empty() {
            return Err(ClientError::Deserialization(
                "listen key response carries no key".to_string(),
            ));
        }
        Ok(grant)
    }

    /// Extends the lifetime of a listen key.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no session is held.
    pub async fn refresh_listen_key(&self, key: &str) -> Result<ListenKeyGrant, ClientError> {
        let call = Call::new(Method::PUT, LISTEN_KEY_PATH)
            .json(serde_json::json!({ "listenKey": key }))
            .authenticated();
        let payload: Payload<ListenKeyGrant> = self.execute(call).await?;
        let mut grant = payload.into_inner();
        if grant.listen_key.is_empty() {
            grant.listen_key = key.to_string();
        }
        Ok(grant)
    }

    /// Asks the server whether a listen key is still valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for a reason other than the
    /// key being unknown.
    pub async fn validate_listen_key(&self, key: &str) -> Result<bool, ClientError> {
        let call = Call::get(LISTEN_KEY_PATH)
            .query("listenKey", key)
            .authenticated();
        match self.execute::<Payload<ValidateResponse>>(call).await {
            Ok(payload) => Ok(payload.into_inner().valid),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn api_error(status: StatusCode, body: String) -> ClientError {
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(ApiErrorResponse::Nested { error } | ApiErrorResponse::Flat(error)) => {
            let code = match error.code {
                Some(serde_json::Value::String(code)) => code,
                Some(other) => other.to_string(),
                None => status.as_str().to_string(),
            };
            ClientError::Api {
                code,
                message: error.message,
            }
        }
        Err(_) => ClientError::Api {
            code: status.as_str().to_string(),
            message: body,
        },
    }
}

fn listen_key_error(err: ClientError) -> WsError {
    WsError::ListenKey(err.to_string())
}

#[async_trait]
impl ListenKeyApi for TerminalClient {
    async fn issue(&self) -> Result<ListenKeyGrant, WsError> {
        self.issue_listen_key().await.map_err(listen_key_error)
    }

    async fn refresh(&self, key: &str) -> Result<ListenKeyGrant, WsError> {
        self.refresh_listen_key(key).await.map_err(listen_key_error)
    }

    async fn validate(&self, key: &str) -> Result<bool, WsError> {
        self.validate_listen_key(key).await.map_err(listen_key_error)
    }
}
