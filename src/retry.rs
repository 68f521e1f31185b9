//! Bounded, fixed-delay request execution shared by the upstream and downstream clients.

use crate::error::Error;
use http::{Method, StatusCode};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Data and API calls.
    pub const DATA: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_secs(5),
    };

    /// Token acquisition and inverter settings writes.
    pub const AUTH: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_secs(30),
    };

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Run `attempt` until it succeeds or `policy.max_attempts` is spent, sleeping `policy.delay`
/// between attempts. Only the last error is returned.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut attempt: F) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(e) if attempts >= max_attempts => {
                log::error!("{} failed after {} attempts: {}", what, attempts, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!(
                    "{} failed, attempt {}/{}: {}. Retrying in {:?}",
                    what,
                    attempts,
                    max_attempts,
                    e,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    /// Treat a non-2xx status as a failed attempt.
    pub check_status: bool,
    /// Treat an empty response body as a failed attempt.
    pub require_body: bool,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            bearer: None,
            body: None,
            check_status: true,
            require_body: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Request::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Request::new(Method::POST, url).json(body)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_owned());
        self
    }

    /// Hand every HTTP response back to the caller, whatever its status.
    pub fn any_status(mut self) -> Self {
        self.check_status = false;
        self
    }

    pub fn require_body(mut self) -> Self {
        self.require_body = true;
        self
    }

    fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

impl Response {
    pub fn json(&self) -> Result<Value, Error> {
        serde_json::from_str(&self.body)
            .map_err(|e| Error::InvalidResponse(format!("{}: {}", e, self.body)))
    }
}

/// Single attempt, no retry.
pub async fn execute_once(client: &Client, request: &Request) -> Result<Response, Error> {
    let mut builder = client
        .request(request.method.clone(), &request.url)
        .header(http::header::ACCEPT, "application/json");

    if let Some(token) = &request.bearer {
        builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| Error::RequestFailure(format!("{}: {}", request.describe(), e)))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        Error::RequestFailure(format!("{}: error reading body: {}", request.describe(), e))
    })?;

    log::trace!("{} -> {}: {}", request.describe(), status, body);

    if request.check_status && !status.is_success() {
        return Err(Error::RequestFailure(format!(
            "{} returned {}: {}",
            request.describe(),
            status,
            body
        )));
    }
    if request.require_body && body.trim().is_empty() {
        return Err(Error::RequestFailure(format!(
            "{} returned an empty body",
            request.describe()
        )));
    }

    Ok(Response { status, body })
}

pub async fn execute(
    client: &Client,
    policy: &RetryPolicy,
    request: &Request,
) -> Result<Response, Error> {
    retry(policy, &request.describe(), |_| execute_once(client, request)).await
}
