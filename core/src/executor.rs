//! Executes one HTTP call for a bound (base URL, endpoint, method).
//!
//! A call runs in two phases. [`RequestExecutor::execute`] renders the path,
//! builds the request and arms the abort slot before it returns, so the
//! slot holds the call's token from the moment the fetcher is invoked. The
//! returned future then sends the request and races it against that token.

use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, instrument, warn, Span};
use url::Url;

use crate::error::ApiError;
use crate::fetcher::{AbortHandle, ArmedCall, FetchResult, Request};
use crate::http::{HttpMethod, HttpRequest};
use crate::template::PathTemplate;
use crate::transport::Transport;

pub(crate) struct RequestExecutor {
    transport: Arc<dyn Transport>,
    base_url: String,
    template: PathTemplate,
    method: HttpMethod,
    abort: AbortHandle,
}

/// A request rendered and armed at invocation, not yet sent.
struct PreparedCall {
    request: HttpRequest,
    armed: ArmedCall,
}

impl RequestExecutor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        base_url: &Url,
        template: PathTemplate,
        method: HttpMethod,
        abort: AbortHandle,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            template,
            method,
            abort,
        }
    }

    /// Starts one call.
    ///
    /// A template error is decided here and the returned future resolves to
    /// it without touching the transport. Otherwise the abort slot is armed
    /// before returning; the future resolves to `Ok(None)` when aborted, and
    /// non-2xx statuses and transport failures become an [`ApiError`].
    pub(crate) fn execute(self: &Arc<Self>, request: Request) -> BoxFuture<'static, FetchResult> {
        match self.prepare(request) {
            Ok(call) => {
                let executor = Arc::clone(self);
                async move { executor.send(call).await }.boxed()
            }
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    fn prepare(&self, request: Request) -> Result<PreparedCall, ApiError> {
        let path = self.template.render(request.params.as_ref())?;

        let request = HttpRequest {
            method: self.method,
            url: resolve_url(&self.base_url, &path),
            query: request
                .querystring
                .as_ref()
                .map(query_pairs)
                .unwrap_or_default(),
            headers: request.headers,
            body: request.body,
            with_credentials: true,
        };

        Ok(PreparedCall {
            request,
            armed: self.abort.arm(),
        })
    }

    #[instrument(
        name = "api_request",
        skip(self, call),
        fields(
            http.method = %self.method,
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
        )
    )]
    async fn send(&self, call: PreparedCall) -> FetchResult {
        let PreparedCall { request, mut armed } = call;
        Span::current().record("http.url", request.url.as_str());

        let outcome = tokio::select! {
            biased;
            Ok(()) = &mut armed.cancelled => None,
            result = self.transport.send(request) => Some(result),
        };

        let response = match outcome {
            None => {
                debug!("request aborted");
                return Ok(None);
            }
            Some(Err(err)) => {
                warn!(error = %err, "transport failed");
                return Err(ApiError::normalize(None, None, err.message()));
            }
            Some(Ok(response)) => response,
        };

        let status = response.status;
        Span::current().record("http.status_code", status);
        let body = response.json();

        if response.is_success() {
            return Ok(Some(body));
        }

        let err = ApiError::normalize(
            Some(status),
            Some(&body),
            &format!("Request failed with status code {status}"),
        );
        warn!(status, error = %err, "request failed");
        Err(err)
    }
}

/// Joins `path` to `base_url` the way axios does.
///
/// A path with a scheme (`https://...`) is used as is. A protocol-relative
/// path (`//host/...`) takes the base URL's scheme.
pub(crate) fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("//") {
        let scheme = base_url.split_once("://").map_or("http", |(scheme, _)| scheme);
        return format!("{scheme}:{path}");
    }
    if has_scheme(path) {
        return path.to_string();
    }
    if path.is_empty() {
        return base_url.to_string();
    }
    format!("{}/{}", base_url, path.trim_start_matches('/'))
}

/// `true` when `path` starts with `scheme://`.
fn has_scheme(path: &str) -> bool {
    let Some((scheme, rest)) = path.split_once(':') else {
        return false;
    };
    rest.starts_with("//")
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Flattens a querystring object into ordered pairs.
///
/// `null` values are skipped, arrays repeat as `key[]`, nested values are
/// JSON-encoded. Anything other than an object yields no pairs.
pub(crate) fn query_pairs(query: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = query else {
        return Vec::new();
    };

    let mut pairs = Vec::new();
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                let key = format!("{key}[]");
                pairs.extend(items.iter().filter_map(scalar).map(|v| (key.clone(), v)));
            }
            other => pairs.extend(scalar(other).map(|v| (key.clone(), v))),
        }
    }
    pairs
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
