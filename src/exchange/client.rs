//! Betfair JSON-RPC client.
//!
//! Wraps the Sports and Accounts APIs with session-token auth, a
//! bounded retry for transient transport failures, and one reactive
//! re-login when the exchange reports an invalid session.

use crate::config::BetfairConfig;
use crate::exchange::error::ExchangeError;
use crate::exchange::traits::ExchangeApi;
use crate::exchange::types::*;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const BETTING_URL: &str = "https://api.betfair.com/exchange/betting/json-rpc/v1";
const ACCOUNT_URL: &str = "https://api.betfair.com/exchange/account/json-rpc/v1";
const LOGIN_URL: &str = "https://identitysso.betfair.com/api/login";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSIENT_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// JSON-RPC envelope for a single call.
#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u32,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcError {
    /// Pull the APING error code out of the nested error payload.
    fn aping_code(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .get("APINGException")?
            .get("errorCode")?
            .as_str()
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default, alias = "sessionToken")]
    token: Option<String>,
    #[serde(default, alias = "loginStatus")]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Live Betfair client.
pub struct BetfairClient {
    http: reqwest::Client,
    app_key: String,
    username: String,
    password: String,
    betting_url: String,
    account_url: String,
    login_url: String,
    session_token: RwLock<Option<String>>,
}

impl BetfairClient {
    /// Create a new client from configuration.
    pub fn new(config: &BetfairConfig) -> anyhow::Result<Self> {
        Self::with_endpoints(config, BETTING_URL, ACCOUNT_URL, LOGIN_URL)
    }

    /// Create a client against alternate endpoints (tests).
    pub fn with_endpoints(
        config: &BetfairConfig,
        betting_url: &str,
        account_url: &str,
        login_url: &str,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            http,
            app_key: config.app_key.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            betting_url: betting_url.to_string(),
            account_url: account_url.to_string(),
            login_url: login_url.to_string(),
            session_token: RwLock::new(None),
        })
    }

    /// Issue one JSON-RPC call without retry policy.
    async fn rpc_once<P: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: &P,
    ) -> Result<R, ExchangeError> {
        let token = self
            .session_token
            .read()
            .await
            .clone()
            .ok_or(ExchangeError::SessionExpired)?;

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .http
            .post(url)
            .header("X-Application", &self.app_key)
            .header("X-Authentication", token)
            .json(&request)
            .send()
            .await?;

        let body: RpcResponse<R> = response.json().await.map_err(classify_body_error)?;

        if let Some(error) = body.error {
            let code = error
                .aping_code()
                .map(str::to_string)
                .unwrap_or_else(|| error.code.to_string());
            if code.contains("INVALID_SESSION") || code.contains("NO_SESSION") {
                return Err(ExchangeError::SessionExpired);
            }
            return Err(ExchangeError::Api {
                code,
                message: error.message,
            });
        }

        body.result
            .ok_or_else(|| ExchangeError::Malformed("missing result field".to_string()))
    }

    /// JSON-RPC call with bounded transient retry and one reactive
    /// re-login on session loss.
    async fn rpc<P: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: P,
    ) -> Result<R, ExchangeError> {
        let mut relogged_in = false;
        let mut attempt = 0u32;

        loop {
            match self.rpc_once(url, method, &params).await {
                Ok(result) => return Ok(result),
                Err(ExchangeError::SessionExpired) if !relogged_in => {
                    warn!(method, "session invalid, attempting re-login");
                    self.login().await?;
                    relogged_in = true;
                }
                Err(ExchangeError::Transport(e)) if attempt < TRANSIENT_RETRIES => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    debug!(method, attempt, error = %e, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A body-read failure is only Malformed when the bytes arrived but
/// would not decode; a connection dropped mid-body is transport and
/// stays eligible for the transient retry.
fn classify_body_error(e: reqwest::Error) -> ExchangeError {
    if e.is_decode() {
        ExchangeError::Malformed(e.to_string())
    } else {
        ExchangeError::Transport(e)
    }
}

#[async_trait]
impl ExchangeApi for BetfairClient {
    async fn login(&self) -> Result<(), ExchangeError> {
        let response = self
            .http
            .post(&self.login_url)
            .header("X-Application", &self.app_key)
            .header("Accept", "application/json")
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;

        let body: LoginResponse = response.json().await.map_err(classify_body_error)?;

        let status = body.status.unwrap_or_default();
        match body.token {
            Some(token) if status == "SUCCESS" && !token.is_empty() => {
                *self.session_token.write().await = Some(token);
                debug!("login succeeded, session token refreshed");
                Ok(())
            }
            _ => Err(ExchangeError::LoginFailed(
                body.error.unwrap_or(status),
            )),
        }
    }

    async fn is_authenticated(&self) -> bool {
        self.session_token.read().await.is_some()
    }

    async fn list_market_catalogue(
        &self,
        filter: &MarketFilter,
        max_results: u32,
    ) -> Result<Vec<MarketCatalogue>, ExchangeError> {
        self.rpc(
            &self.betting_url,
            "SportsAPING/v1.0/listMarketCatalogue",
            json!({
                "filter": filter,
                "marketProjection": ["MARKET_START_TIME", "RUNNER_DESCRIPTION", "EVENT"],
                "maxResults": max_results,
            }),
        )
        .await
    }

    async fn list_market_book(
        &self,
        market_ids: &[String],
    ) -> Result<Vec<MarketBook>, ExchangeError> {
        self.rpc(
            &self.betting_url,
            "SportsAPING/v1.0/listMarketBook",
            json!({
                "marketIds": market_ids,
                "priceProjection": {"priceData": ["EX_BEST_OFFERS"]},
            }),
        )
        .await
    }

    async fn place_order(
        &self,
        market_id: &str,
        instruction: PlaceInstruction,
        customer_ref: &str,
    ) -> Result<PlaceExecutionReport, ExchangeError> {
        self.rpc(
            &self.betting_url,
            "SportsAPING/v1.0/placeOrders",
            json!({
                "marketId": market_id,
                "instructions": [instruction],
                "customerRef": customer_ref,
            }),
        )
        .await
    }

    async fn cancel_orders(
        &self,
        market_id: &str,
        bet_ids: &[String],
    ) -> Result<CancelExecutionReport, ExchangeError> {
        let instructions: Vec<Value> = bet_ids
            .iter()
            .map(|bet_id| json!({"betId": bet_id}))
            .collect();

        self.rpc(
            &self.betting_url,
            "SportsAPING/v1.0/cancelOrders",
            json!({
                "marketId": market_id,
                "instructions": instructions,
            }),
        )
        .await
    }

    async fn account_funds(&self) -> Result<AccountFunds, ExchangeError> {
        self.rpc(
            &self.account_url,
            "AccountAPING/v1.0/getAccountFunds",
            json!({}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> BetfairConfig {
        BetfairConfig {
            app_key: "test-app-key".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    async fn client_against(server: &MockServer) -> BetfairClient {
        let base = server.uri();
        BetfairClient::with_endpoints(
            &test_config(),
            &format!("{base}/betting"),
            &format!("{base}/account"),
            &format!("{base}/login"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn login_stores_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc123",
                "status": "SUCCESS"
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        assert!(!client.is_authenticated().await);
        client.login().await.unwrap();
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn login_failure_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "FAILED",
                "error": "INVALID_USERNAME_OR_PASSWORD"
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let err = client.login().await.unwrap_err();
        assert!(matches!(err, ExchangeError::LoginFailed(_)));
    }

    #[tokio::test]
    async fn market_book_call_parses_typed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc123",
                "status": "SUCCESS"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/betting"))
            .and(body_partial_json(serde_json::json!({
                "method": "SportsAPING/v1.0/listMarketBook"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [{
                    "marketId": "1.234",
                    "status": "OPEN",
                    "runners": [{
                        "selectionId": 101,
                        "ex": {"availableToBack": [{"price": 1.25, "size": 120.0}]}
                    }]
                }],
                "id": 1
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        client.login().await.unwrap();
        let books = client
            .list_market_book(&["1.234".to_string()])
            .await
            .unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].status, MarketStatus::Open);
    }

    #[tokio::test]
    async fn invalid_session_triggers_one_relogin_and_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "fresh-token",
                "status": "SUCCESS"
            })))
            .expect(2)
            .mount(&server)
            .await;
        // First betting call rejects the session, the retry succeeds.
        Mock::given(method("POST"))
            .and(path("/betting"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32099,
                    "message": "ANGX-0003",
                    "data": {"APINGException": {"errorCode": "INVALID_SESSION_INFORMATION"}}
                },
                "id": 1
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/betting"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [],
                "id": 1
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        client.login().await.unwrap();
        let books = client
            .list_market_book(&["1.234".to_string()])
            .await
            .unwrap();
        assert!(books.is_empty());
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc123",
                "status": "SUCCESS"
            })))
            .mount(&server)
            .await;
        // The bytes arrive fine but are not the typed contract.
        Mock::given(method("POST"))
            .and(path("/betting"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        client.login().await.unwrap();
        let err = client
            .list_market_book(&["1.234".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Malformed(_)));
    }

    #[tokio::test]
    async fn api_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc123",
                "status": "SUCCESS"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/betting"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32099,
                    "message": "DSC-0018",
                    "data": {"APINGException": {"errorCode": "INVALID_INPUT_DATA"}}
                },
                "id": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        client.login().await.unwrap();
        let err = client
            .list_market_book(&["1.234".to_string()])
            .await
            .unwrap_err();
        match err {
            ExchangeError::Api { code, .. } => assert_eq!(code, "INVALID_INPUT_DATA"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
