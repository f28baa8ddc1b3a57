//! Single-request executor with bounded retries and rate-limit backoff.
//!
//! Every remote call in the crate goes through [`RequestExecutor::execute`].
//! A call is retried until it succeeds or `max_attempts` consecutive attempts
//! have failed:
//!
//! - 2xx: the decoded JSON body is returned (an empty body decodes to `null`)
//! - 429: the pause named by `Retry-After` is honored exactly; without the
//!   header a fixed default pause is applied
//! - anything else (network error, timeout, other status): logged, then
//!   retried after an exponential backoff delay
//!
//! Retries resend the identical request. For the bulk-create endpoint this
//! means delivery is at-least-once: an attempt that timed out after the server
//! accepted it will create the batch twice.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::{Backoff, Sleeper, TokioSleeper, retry_after};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// HTTP method of an [`ApiRequest`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    /// Idempotent read
    Get,
    /// Non-idempotent write
    Post,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/// Basic authentication credentials (account email + API token)
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// API token
    pub api_token: String,
}

impl Credentials {
    /// Create credentials from an email and API token
    pub fn new(email: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_token: api_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// One remote call, built once and resent unchanged on every attempt
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: HttpMethod,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Value>,
    auth: Option<Credentials>,
    max_attempts: u32,
    timeout: Duration,
}

impl ApiRequest {
    /// Start a request with JSON accept/content-type headers, one attempt and a 15s timeout
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            method,
            url: url.into(),
            headers,
            query: Vec::new(),
            body: None,
            auth: None,
            max_attempts: 1,
            timeout: Duration::from_secs(15),
        }
    }

    /// Start a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Start a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Add or replace a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Append a query-string parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Authenticate with Basic auth
    pub fn auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    /// Cap consecutive attempts (values below 1 are raised to 1)
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Bound each individual attempt
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// HTTP method
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Why one attempt failed
enum AttemptFailure {
    /// HTTP 429, with the server-requested pause if it sent one
    RateLimited {
        retry_after: Option<Duration>,
        error: Error,
    },
    /// Any other failure
    Failed(Error),
}

/// Executes [`ApiRequest`]s with bounded retries
///
/// Cheap to clone; clones share the connection pool and the sleeper.
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl RequestExecutor {
    /// Create an executor that sleeps on the tokio timer
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("issue-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used for backoff pauses
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Retry policy this executor was built with
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run the request until it succeeds or its attempts are exhausted
    ///
    /// # Errors
    /// Returns [`Error::ExhaustedRetries`] carrying the last observed failure
    /// after `max_attempts` consecutive failed attempts.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value> {
        let max_attempts = request.max_attempts;
        let mut backoff = Backoff::new(&self.retry);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let delay = match self.attempt(request).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::info!(
                            url = %request.url,
                            attempts = attempt,
                            "request succeeded after retry"
                        );
                    }
                    return Ok(body);
                }
                Err(AttemptFailure::RateLimited { retry_after, error }) => {
                    let delay = retry_after.unwrap_or(self.retry.rate_limit_delay);
                    tracing::warn!(
                        url = %request.url,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        server_supplied = retry_after.is_some(),
                        "rate limit exceeded"
                    );
                    last_error = Some(error);
                    delay
                }
                Err(AttemptFailure::Failed(error)) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        url = %request.url,
                        attempt,
                        max_attempts,
                        status = ?error.status(),
                        error = %error,
                        "request failed"
                    );
                    last_error = Some(error);
                    delay
                }
            };

            if attempt < max_attempts {
                self.sleeper.sleep(delay).await;
            }
        }

        let last_error = last_error.unwrap_or_else(|| Error::Other("no attempt was made".into()));
        tracing::error!(
            url = %request.url,
            attempts = max_attempts,
            error = %last_error,
            "request failed too many times in a row"
        );
        Err(Error::ExhaustedRetries {
            attempts: max_attempts,
            last_error: Box::new(last_error),
        })
    }

    async fn attempt(&self, request: &ApiRequest) -> std::result::Result<Value, AttemptFailure> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(auth) = &request.auth {
            builder = builder.basic_auth(&auth.email, Some(&auth.api_token));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AttemptFailure::Failed(Error::Network(e)))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::RateLimited {
                retry_after,
                error: Error::Http {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Failed(Error::Http {
                status: status.as_u16(),
                body,
            }));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptFailure::Failed(Error::Network(e)))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| AttemptFailure::Failed(Error::Serialization(e)))
    }
}
