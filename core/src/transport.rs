//! The network capability consumed by the request executor.
//!
//! A [`Transport`] turns one [`HttpRequest`] into one [`HttpResponse`].
//! Redirects, TLS, pooling and cookies all live behind it. Cancellation
//! works by dropping the future returned from [`Transport::send`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Executes HTTP requests.
///
/// Implementations must return non-2xx responses as `Ok` and reserve `Err`
/// for failures where no response was received.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

/// Builder for a [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    default_headers: HeaderMap,
}

impl ReqwestTransportBuilder {
    fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_headers: HeaderMap::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request.
    ///
    /// ## Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, TransportError> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| TransportError::with_source("invalid header name", e))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| TransportError::with_source("invalid header value", e))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    pub fn build(self) -> Result<ReqwestTransport, TransportError> {
        let jar = Arc::new(Jar::default());
        let credentialed = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.default_headers.clone())
            .cookie_provider(jar)
            .build()?;
        let anonymous = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.default_headers)
            .build()?;

        Ok(ReqwestTransport {
            credentialed,
            anonymous,
        })
    }
}

/// [`Transport`] backed by `reqwest`.
///
/// Requests with `with_credentials` set go through a client with a cookie
/// jar, so they send and keep the session cookies the server hands out.
/// Requests without it neither send nor store cookies.
#[derive(Clone)]
pub struct ReqwestTransport {
    credentialed: reqwest::Client,
    anonymous: reqwest::Client,
}

impl ReqwestTransport {
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = if request.with_credentials {
            &self.credentialed
        } else {
            &self.anonymous
        };
        let mut builder = client.request(request.method.to_reqwest(), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        self.execute(request).boxed()
    }
}
