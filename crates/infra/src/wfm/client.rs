use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use stockyard_jobs::ExternalJobId;

use super::error::SyncError;
use super::types::{WfmCreateResponse, WfmJob, WfmJobList, WfmJobRequest};
use super::JobSyncClient;
use crate::config::TokenProvider;
use crate::retry::RetryPolicy;

const ACCOUNT_HEADER: &str = "account_id";
const MAX_DETAIL_LEN: usize = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-token HTTP client for the WFM job API.
///
/// ## Failure handling
///
/// - 401/403: the token is re-read from the provider and the call retried
///   exactly once; a second auth failure is [`SyncError::AuthExpired`].
/// - 429, 5xx and transport errors: retried per [`RetryPolicy`], honouring a
///   `Retry-After` header (seconds), then [`SyncError::RateLimited`] or
///   [`SyncError::ExternalUnavailable`].
/// - Any other 4xx: [`SyncError::ExternalRejected`] with the response body.
pub struct WfmClient {
    http: reqwest::Client,
    base_url: Url,
    account_id: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for WfmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WfmClient")
            .field("base_url", &self.base_url.as_str())
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl WfmClient {
    pub fn new(
        base_url: &str,
        account_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, SyncError> {
        // Url::join drops the last segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| SyncError::NotConfigured(format!("WFM base url {normalized:?}: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::NotConfigured(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            account_id: account_id.into(),
            tokens,
            retry: RetryPolicy::external_api(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::NotConfigured(format!("endpoint {path}: {e}")))
    }

    /// Perform one logical call, returning the successful response body.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, SyncError> {
        if self.account_id.trim().is_empty() {
            return Err(SyncError::NotConfigured("WFM account id is empty".to_string()));
        }
        let url = self.endpoint(path)?;

        let mut token = self.tokens.current_token().await?;
        let mut auth_retried = false;
        let mut failures = 0u32;

        loop {
            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&token)
                .header(ACCOUNT_HEADER, &self.account_id);
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    failures += 1;
                    if self.retry.should_retry(failures) {
                        let delay = self.retry.delay_for_attempt(failures);
                        debug!(path, failures, delay_ms = delay.as_millis() as u64, error = %e, "transport error, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SyncError::ExternalUnavailable(format!("transport: {e}")));
                }
            };

            let status = resp.status();
            if status.is_success() {
                return resp
                    .text()
                    .await
                    .map_err(|e| SyncError::InvalidResponse(format!("reading body: {e}")));
            }

            let retry_after = retry_after(&resp);
            let detail = truncate(resp.text().await.unwrap_or_default());

            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    if auth_retried {
                        warn!(path, status = status.as_u16(), "WFM auth failed after token re-read");
                        return Err(SyncError::AuthExpired(format!("{status}: {detail}")));
                    }
                    auth_retried = true;
                    info!(path, status = status.as_u16(), "WFM auth failed, re-reading token");
                    token = self.tokens.current_token().await?;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    failures += 1;
                    if !self.retry.should_retry(failures) {
                        return Err(SyncError::RateLimited(format!("{status}: {detail}")));
                    }
                    let delay = self.retry.delay_with_hint(failures, retry_after);
                    debug!(path, failures, delay_ms = delay.as_millis() as u64, "rate limited, retrying");
                    tokio::time::sleep(delay).await;
                }
                s if s.is_server_error() => {
                    failures += 1;
                    if !self.retry.should_retry(failures) {
                        return Err(SyncError::ExternalUnavailable(format!("{status}: {detail}")));
                    }
                    let delay = self.retry.delay_with_hint(failures, retry_after);
                    debug!(path, failures, delay_ms = delay.as_millis() as u64, "server error, retrying");
                    tokio::time::sleep(delay).await;
                }
                s => {
                    return Err(SyncError::ExternalRejected {
                        status: s.as_u16(),
                        detail,
                    });
                }
            }
        }
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(mut s: String) -> String {
    if s.len() > MAX_DETAIL_LEN {
        let mut cut = MAX_DETAIL_LEN;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

#[async_trait]
impl JobSyncClient for WfmClient {
    #[instrument(skip(self, request), fields(client_reference = %request.client_reference), err)]
    async fn create_job(&self, request: &WfmJobRequest) -> Result<ExternalJobId, SyncError> {
        let body = serde_json::to_value(request)
            .map_err(|e| SyncError::InvalidResponse(format!("encoding request: {e}")))?;
        let text = self.call(Method::POST, "job.api/add", Some(&body)).await?;

        let parsed: WfmCreateResponse = serde_json::from_str(&text)
            .map_err(|e| SyncError::InvalidResponse(format!("create response: {e}")))?;
        ExternalJobId::parse(&parsed.id)
            .map_err(|e| SyncError::InvalidResponse(format!("create response id: {e}")))
    }

    #[instrument(skip(self), err)]
    async fn list_current_jobs(&self) -> Result<Vec<WfmJob>, SyncError> {
        let text = self.call(Method::GET, "job.api/current", None).await?;
        let parsed: WfmJobList = serde_json::from_str(&text)
            .map_err(|e| SyncError::InvalidResponse(format!("job list: {e}")))?;
        Ok(parsed.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{CredentialError, StaticTokenProvider};

    /// Hands out tokens in order, repeating the last one.
    struct SequenceTokens(Mutex<VecDeque<&'static str>>);

    impl SequenceTokens {
        fn new(tokens: &[&'static str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(tokens.iter().copied().collect())))
        }
    }

    #[async_trait]
    impl TokenProvider for SequenceTokens {
        async fn current_token(&self) -> Result<String, CredentialError> {
            let mut q = self.0.lock().unwrap();
            let t = if q.len() > 1 { q.pop_front().unwrap() } else { q[0] };
            Ok(t.to_string())
        }
    }

    fn request() -> WfmJobRequest {
        WfmJobRequest {
            name: "Replace boiler".into(),
            description: None,
            client_id: Some("C-1".into()),
            category: None,
            start_date: None,
            due_date: None,
            client_reference: "job-1".into(),
        }
    }

    fn client(server: &MockServer, tokens: Arc<dyn TokenProvider>) -> WfmClient {
        WfmClient::new(&format!("{}/v2", server.uri()), "acct-1", tokens)
            .unwrap()
            .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn create_job_sends_bearer_and_account_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/job.api/add"))
            .and(header("authorization", "Bearer tok-1"))
            .and(header("account_id", "acct-1"))
            .and(body_partial_json(serde_json::json!({"Name": "Replace boiler", "ClientReference": "job-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ID": "J000123"})))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("tok-1")));
        let id = c.create_job(&request()).await.unwrap();
        assert_eq!(id.as_str(), "J000123");
    }

    #[tokio::test]
    async fn auth_failure_rereads_token_once_and_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ID": 77})))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server, SequenceTokens::new(&["stale", "fresh"]));
        assert_eq!(c.create_job(&request()).await.unwrap().as_str(), "77");
    }

    #[tokio::test]
    async fn second_auth_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("token revoked"))
            .expect(2)
            .mount(&server)
            .await;

        let c = client(&server, SequenceTokens::new(&["stale", "still-stale"]));
        let err = c.create_job(&request()).await.unwrap_err();
        assert!(matches!(err, SyncError::AuthExpired(ref d) if d.contains("token revoked")));
    }

    #[tokio::test]
    async fn server_errors_retry_then_give_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("t")));
        assert!(matches!(
            c.create_job(&request()).await,
            Err(SyncError::ExternalUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ID": "J9"})))
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("t")));
        assert_eq!(c.create_job(&request()).await.unwrap().as_str(), "J9");
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_reports_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("t")));
        assert!(matches!(c.list_current_jobs().await, Err(SyncError::RateLimited(_))));
    }

    #[tokio::test]
    async fn client_errors_are_rejected_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("ClientID unknown"))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("t")));
        let err = c.create_job(&request()).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::ExternalRejected {
                status: 422,
                detail: "ClientID unknown".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_ids_are_invalid_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ID": "  "})))
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("t")));
        assert!(matches!(
            c.create_job(&request()).await,
            Err(SyncError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn lists_current_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/job.api/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Jobs": [{"ID": "J1", "Name": "A", "ClientReference": "job-1"}]
            })))
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(StaticTokenProvider::new("t")));
        let jobs = c.list_current_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].client_reference.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn missing_account_id_is_not_configured() {
        let c = WfmClient::new("http://127.0.0.1:9", "", Arc::new(StaticTokenProvider::new("t"))).unwrap();
        assert!(matches!(
            c.list_current_jobs().await,
            Err(SyncError::NotConfigured(_))
        ));
    }
}
