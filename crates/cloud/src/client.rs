//! Cloud account client
//!
//! Every account API response is wrapped as `{code, msg, data}`; a `code`
//! other than 200 is a rejection even when the HTTP status is 200. The
//! regional home API answers `{success, result}` instead.

use crate::http::{HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor};
use crate::models::{HomeData, UserData};
use crate::AuthError;
use rockwire_crypto::{client_id_header, random_token, HmacAuthenticator};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Endpoint asked for the account's regional base URL
pub const DEFAULT_CLOUD_URL: &str = "https://euiot.roborock.com";

/// Application code of a successful account API call
const CODE_OK: i64 = 200;

/// Length in bytes of the request-signing nonce before encoding
const SIGNING_NONCE_LEN: usize = 6;

/// Length in bytes of a generated installation id before encoding
const INSTALLATION_ID_LEN: usize = 16;

/// Configuration for the cloud client
#[derive(Debug, Clone)]
pub struct CloudClientConfig {
    /// Account e-mail
    pub username: String,

    /// Endpoint used for region resolution
    pub default_url: String,

    /// Pre-resolved regional base URL
    pub base_url: Option<String>,

    /// Stable identifier of this installation; random when absent
    pub installation_id: Option<String>,

    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl CloudClientConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            default_url: DEFAULT_CLOUD_URL.to_string(),
            base_url: None,
            installation_id: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the vendor cloud
pub struct CloudAuthClient {
    username: String,
    default_url: String,
    installation_id: String,
    base_url: OnceCell<String>,
    executor: Arc<dyn HttpExecutor>,
}

impl CloudAuthClient {
    /// Create a client backed by reqwest
    pub fn new(config: CloudClientConfig) -> Result<Self, AuthError> {
        let executor = ReqwestExecutor::new(config.request_timeout)?;
        Ok(Self::with_executor(config, Arc::new(executor)))
    }

    /// Create a client over a custom executor
    pub fn with_executor(config: CloudClientConfig, executor: Arc<dyn HttpExecutor>) -> Self {
        let installation_id = config
            .installation_id
            .unwrap_or_else(|| random_token(INSTALLATION_ID_LEN));

        Self {
            username: config.username,
            default_url: trim_url(&config.default_url),
            installation_id,
            base_url: OnceCell::new_with(config.base_url.as_deref().map(trim_url)),
            executor,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn installation_id(&self) -> &str {
        &self.installation_id
    }

    /// `header_clientid` value sent with every account API call
    pub fn client_id(&self) -> String {
        client_id_header(&self.username, &self.installation_id)
    }

    /// Learn the account's regional base URL; cached after the first success
    pub async fn resolve_base_url(&self) -> Result<String, AuthError> {
        self.base_url
            .get_or_try_init(|| self.fetch_base_url())
            .await
            .cloned()
    }

    async fn fetch_base_url(&self) -> Result<String, AuthError> {
        let request = HttpRequest::post(format!("{}/api/v1/getUrlByEmail", self.default_url))
            .query("email", self.username.as_str())
            .query("needtwostepauth", "false");

        let data = self
            .execute(request)
            .await
            .and_then(account_data)
            .map_err(|e| AuthError::RegionResolutionFailed(e.to_string()))?;

        let url = data
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AuthError::RegionResolutionFailed("response carries no url".into()))?;

        info!("Resolved cloud region: {}", url);
        Ok(trim_url(url))
    }

    /// Ask the cloud to e-mail a one-time login code
    pub async fn request_verification_code(&self) -> Result<(), AuthError> {
        let base_url = self.resolve_base_url().await?;
        let request = HttpRequest::post(format!("{base_url}/api/v1/sendEmailCode"))
            .header("header_clientid", self.client_id())
            .query("username", self.username.as_str())
            .query("type", "auth");

        account_data(self.execute(request).await?)?;
        debug!("Verification code requested");
        Ok(())
    }

    /// Log in with the account password
    pub async fn password_login(&self, password: &str) -> Result<UserData, AuthError> {
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let base_url = self.resolve_base_url().await?;
        let request = HttpRequest::post(format!("{base_url}/api/v1/login"))
            .header("header_clientid", self.client_id())
            .query("username", self.username.as_str())
            .query("password", password)
            .query("needtwostepauth", "false");

        self.login(request).await
    }

    /// Log in with an e-mailed one-time code
    pub async fn code_login(&self, code: &str) -> Result<UserData, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let base_url = self.resolve_base_url().await?;
        let request = HttpRequest::post(format!("{base_url}/api/v1/loginWithCode"))
            .header("header_clientid", self.client_id())
            .query("username", self.username.as_str())
            .query("verifycode", code.trim())
            .query("verifycodetype", "AUTH_EMAIL_CODE");

        self.login(request).await
    }

    async fn login(&self, request: HttpRequest) -> Result<UserData, AuthError> {
        let data = account_data(self.execute(request).await?)?;
        if data.get("rriot").is_none_or(Value::is_null) {
            warn!("Login response carries no regional credentials");
            return Err(AuthError::InvalidCredentials);
        }

        let user: UserData =
            serde_json::from_value(data).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        info!("Logged in as {}", self.username);
        Ok(user)
    }

    /// Fetch the home and its devices
    pub async fn get_home_data(&self, user_data: &UserData) -> Result<HomeData, AuthError> {
        let home_id = self.home_id(user_data).await?;

        let rriot = &user_data.rriot;
        let path = format!("/user/homes/{home_id}");
        let signed = HmacAuthenticator::new(&rriot.user, &rriot.password, &rriot.hmac_key).sign(
            &random_token(SIGNING_NONCE_LEN),
            unix_timestamp(),
            &path,
        );

        let request = HttpRequest::get(format!("{}{}", trim_url(&rriot.reference.api), path))
            .header("Authorization", signed.authorization);
        let response = self.execute(request).await?;
        check_status(&response)?;

        if response.body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = response
                .body
                .get("msg")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| response.body.to_string());
            warn!("Home data request rejected: {}", message);
            return Err(AuthError::ServerRejected(message));
        }

        let result = response
            .body
            .get("result")
            .cloned()
            .ok_or_else(|| AuthError::MalformedResponse("home response carries no result".into()))?;
        let home: HomeData =
            serde_json::from_value(result).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        info!("Home {} has {} device(s)", home.id, home.all_devices().count());
        Ok(home)
    }

    async fn home_id(&self, user_data: &UserData) -> Result<u64, AuthError> {
        let base_url = self.resolve_base_url().await?;
        let request = HttpRequest::get(format!("{base_url}/api/v1/getHomeDetail"))
            .header("header_clientid", self.client_id())
            .header("Authorization", user_data.token.as_str());

        let data = account_data(self.execute(request).await?)?;
        data.get("rrHomeId")
            .and_then(Value::as_u64)
            .ok_or_else(|| AuthError::MalformedResponse("home detail carries no rrHomeId".into()))
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.executor.execute(request).await
    }
}

fn check_status(response: &HttpResponse) -> Result<(), AuthError> {
    match response.status {
        200..=299 => Ok(()),
        401 | 403 => Err(AuthError::InvalidCredentials),
        status => Err(AuthError::ServerRejected(format!("HTTP {status}"))),
    }
}

/// Unwrap the `{code, msg, data}` envelope
fn account_data(response: HttpResponse) -> Result<Value, AuthError> {
    check_status(&response)?;

    let mut body = response.body;
    let code = body.get("code").and_then(Value::as_i64);
    if code != Some(CODE_OK) {
        let message = body
            .get("msg")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("code {}", code.map_or("missing".to_string(), |c| c.to_string())));
        warn!("Cloud rejected request: {}", message);
        return Err(AuthError::ServerRejected(message));
    }

    Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Answers requests from a queue and records what it was asked
    #[derive(Default)]
    struct ScriptedExecutor {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<(u16, Value)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| HttpResponse { status, body })
                        .collect(),
                ),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl HttpExecutor for ScriptedExecutor {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| AuthError::Transport("no scripted response".into()))
        }
    }

    fn config() -> CloudClientConfig {
        CloudClientConfig {
            installation_id: Some("installation-0001".into()),
            ..CloudClientConfig::new("user@example.com")
        }
    }

    fn region_ok() -> (u16, Value) {
        (200, json!({ "code": 200, "data": { "url": "https://usiot.roborock.com/" } }))
    }

    fn login_ok() -> (u16, Value) {
        (
            200,
            json!({ "code": 200, "data": {
                "token": "tok",
                "rriot": { "u": "ru", "s": "rs", "h": "rh", "k": "rk",
                           "r": { "r": "US", "a": "https://api-us.roborock.com", "m": "", "l": "" } }
            }}),
        )
    }

    #[tokio::test]
    async fn test_region_is_resolved_once() {
        let executor = ScriptedExecutor::new(vec![
            region_ok(),
            (200, json!({ "code": 200, "data": null })),
            (200, json!({ "code": 200, "data": null })),
        ]);
        let client = CloudAuthClient::with_executor(config(), executor.clone());

        client.request_verification_code().await.unwrap();
        client.request_verification_code().await.unwrap();

        let requests = executor.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, "https://euiot.roborock.com/api/v1/getUrlByEmail");
        assert_eq!(requests[0].query_value("email"), Some("user@example.com"));
        assert_eq!(requests[1].url, "https://usiot.roborock.com/api/v1/sendEmailCode");
        assert_eq!(requests[1].query_value("type"), Some("auth"));
        assert_eq!(requests[2].url, "https://usiot.roborock.com/api/v1/sendEmailCode");
    }

    #[tokio::test]
    async fn test_preconfigured_region_skips_lookup() {
        let executor = ScriptedExecutor::new(vec![login_ok()]);
        let client = CloudAuthClient::with_executor(
            CloudClientConfig {
                base_url: Some("https://deiot.roborock.com".into()),
                ..config()
            },
            executor.clone(),
        );

        client.password_login("secret").await.unwrap();
        assert_eq!(executor.requests()[0].url, "https://deiot.roborock.com/api/v1/login");
    }

    #[tokio::test]
    async fn test_region_resolution_failure() {
        let executor = ScriptedExecutor::new(vec![(200, json!({ "code": 2008, "msg": "account not exist" }))]);
        let client = CloudAuthClient::with_executor(config(), executor);

        assert!(matches!(
            client.resolve_base_url().await,
            Err(AuthError::RegionResolutionFailed(msg)) if msg.contains("account not exist")
        ));
    }

    #[tokio::test]
    async fn test_failed_region_lookup_is_retried() {
        let executor = ScriptedExecutor::new(vec![(503, Value::Null), region_ok()]);
        let client = CloudAuthClient::with_executor(config(), executor.clone());

        assert!(matches!(
            client.resolve_base_url().await,
            Err(AuthError::RegionResolutionFailed(_))
        ));
        assert_eq!(client.resolve_base_url().await.unwrap(), "https://usiot.roborock.com");
        assert_eq!(client.resolve_base_url().await.unwrap(), "https://usiot.roborock.com");
        assert_eq!(executor.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_password_login_sends_client_id() {
        let executor = ScriptedExecutor::new(vec![region_ok(), login_ok()]);
        let client = CloudAuthClient::with_executor(config(), executor.clone());

        let user = client.password_login("secret").await.unwrap();
        assert_eq!(user.token, "tok");

        let login = &executor.requests()[1];
        assert_eq!(login.header_value("header_clientid"), Some("32ICm4faq37SG91vLQFDJQ=="));
        assert_eq!(login.query_value("password"), Some("secret"));
        assert_eq!(login.query_value("needtwostepauth"), Some("false"));
    }

    #[tokio::test]
    async fn test_code_login() {
        let executor = ScriptedExecutor::new(vec![region_ok(), login_ok()]);
        let client = CloudAuthClient::with_executor(config(), executor.clone());

        client.code_login(" 123456 ").await.unwrap();
        let login = &executor.requests()[1];
        assert!(login.url.ends_with("/api/v1/loginWithCode"));
        assert_eq!(login.query_value("verifycode"), Some("123456"));
        assert_eq!(login.query_value("verifycodetype"), Some("AUTH_EMAIL_CODE"));
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected_locally() {
        let executor = ScriptedExecutor::new(vec![]);
        let client = CloudAuthClient::with_executor(config(), executor.clone());

        assert_eq!(client.password_login("").await, Err(AuthError::InvalidCredentials));
        assert_eq!(client.code_login("  ").await, Err(AuthError::InvalidCredentials));
        assert!(executor.requests().is_empty());
    }

    #[tokio::test]
    async fn test_application_code_rejection() {
        let executor = ScriptedExecutor::new(vec![
            region_ok(),
            (200, json!({ "code": 2012, "msg": "incorrect password" })),
        ]);
        let client = CloudAuthClient::with_executor(config(), executor);

        assert_eq!(
            client.password_login("wrong").await,
            Err(AuthError::ServerRejected("incorrect password".into()))
        );
    }

    #[tokio::test]
    async fn test_http_unauthorized_is_invalid_credentials() {
        let executor = ScriptedExecutor::new(vec![region_ok(), (401, Value::Null)]);
        let client = CloudAuthClient::with_executor(config(), executor);

        assert_eq!(client.password_login("pw").await, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_without_rriot() {
        let executor = ScriptedExecutor::new(vec![
            region_ok(),
            (200, json!({ "code": 200, "data": { "token": "tok" } })),
        ]);
        let client = CloudAuthClient::with_executor(config(), executor);

        assert_eq!(client.password_login("pw").await, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_get_home_data_signs_request() {
        let executor = ScriptedExecutor::new(vec![
            region_ok(),
            login_ok(),
            (200, json!({ "code": 200, "data": { "rrHomeId": 1234 } })),
            (200, json!({ "success": true, "result": {
                "id": 1234, "name": "Home",
                "devices": [{ "duid": "d1", "name": "Vac", "localKey": "abcdef0123456789" }]
            }})),
        ]);
        let client = CloudAuthClient::with_executor(config(), executor.clone());

        let user = client.password_login("pw").await.unwrap();
        let home = client.get_home_data(&user).await.unwrap();
        assert_eq!(home.id, 1234);
        assert_eq!(home.local_keys()["d1"], "abcdef0123456789");

        let requests = executor.requests();
        assert_eq!(requests[2].header_value("Authorization"), Some("tok"));

        let signed = &requests[3];
        assert_eq!(signed.url, "https://api-us.roborock.com/user/homes/1234");
        let auth = signed.header_value("Authorization").unwrap();
        assert!(auth.starts_with("Hawk id=\"ru\", s=\"rs\", ts=\""));

        // Recompute the mac from the transmitted nonce and timestamp
        let field = |name: &str| {
            let start = auth.find(&format!("{name}=\"")).unwrap() + name.len() + 2;
            let end = start + auth[start..].find('"').unwrap();
            auth[start..end].to_string()
        };
        let expected = HmacAuthenticator::new("ru", "rs", "rh").sign(
            &field("nonce"),
            field("ts").parse().unwrap(),
            "/user/homes/1234",
        );
        assert_eq!(field("mac"), expected.mac);
    }

    #[tokio::test]
    async fn test_home_api_failure() {
        let executor = ScriptedExecutor::new(vec![
            region_ok(),
            (200, json!({ "code": 200, "data": { "rrHomeId": 1 } })),
            (200, json!({ "success": false, "msg": "signature mismatch" })),
        ]);
        let client = CloudAuthClient::with_executor(config(), executor);
        let user: UserData = serde_json::from_value(login_ok().1["data"].clone()).unwrap();

        assert_eq!(
            client.get_home_data(&user).await,
            Err(AuthError::ServerRejected("signature mismatch".into()))
        );
    }

    #[test]
    fn test_generated_installation_id() {
        let executor = ScriptedExecutor::new(vec![]);
        let a = CloudAuthClient::with_executor(CloudClientConfig::new("u"), executor.clone());
        let b = CloudAuthClient::with_executor(CloudClientConfig::new("u"), executor);

        assert!(!a.installation_id().is_empty());
        assert_ne!(a.installation_id(), b.installation_id());
        assert_ne!(a.client_id(), b.client_id());
    }
}
