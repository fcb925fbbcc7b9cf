//! Fetchers: callables bound to one (base URL, endpoint, method) with an
//! abort control.
//!
//! # Design
//! A fetcher and its [`AbortHandle`] share one slot. Each call arms the
//! slot with a fresh token when the fetcher is invoked, before the returned
//! future is first polled, and disarms it when it settles or is dropped.
//! `abort()` fires
//! whatever is armed at that moment. A second call made before the first
//! settles re-arms the slot, so `abort()` only reaches the most recent call
//! on a fetcher. Callers that need to cancel overlapping calls one by one
//! should build separate fetchers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::oneshot;
use url::Url;

use crate::error::{ApiError, TemplateError};
use crate::executor::RequestExecutor;
use crate::http::HttpMethod;
use crate::template::PathTemplate;
use crate::transport::Transport;

/// Result of one fetcher call. `Ok(None)` means the call was aborted.
pub type FetchResult = Result<Option<Value>, ApiError>;

type CallFn = dyn Fn(Request) -> BoxFuture<'static, FetchResult> + Send + Sync;

/// Payload of one call. Every facet is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub body: Option<Value>,
    pub querystring: Option<Value>,
    pub params: Option<HashMap<String, String>>,
    /// Extra request headers. Nothing in the generated surface sets these;
    /// they are there for effects such as authentication.
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn querystring(mut self, querystring: Value) -> Self {
        self.querystring = Some(querystring);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Default)]
struct Slot {
    next_id: u64,
    armed: Option<(u64, oneshot::Sender<()>)>,
}

/// Cancels the in-flight call of the fetcher it belongs to.
#[derive(Clone, Default)]
pub struct AbortHandle {
    slot: Arc<Mutex<Slot>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the call currently in flight, if any. Never fails.
    pub fn abort(&self) {
        if let Some((_, token)) = self.lock().armed.take() {
            // The receiver is gone when the call settled in the meantime.
            let _ = token.send(());
        }
    }

    /// `true` while a call is in flight.
    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    /// Arms the slot for a new call, replacing any earlier arm.
    pub(crate) fn arm(&self) -> ArmedCall {
        let (token, cancelled) = oneshot::channel();
        let mut slot = self.lock();
        let id = slot.next_id;
        slot.next_id += 1;
        slot.armed = Some((id, token));

        ArmedCall {
            handle: self.clone(),
            id,
            cancelled,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// The cancellation side of one armed call. Disarms the slot on drop unless
/// a newer call has re-armed it.
pub(crate) struct ArmedCall {
    handle: AbortHandle,
    id: u64,
    pub(crate) cancelled: oneshot::Receiver<()>,
}

impl Drop for ArmedCall {
    fn drop(&mut self) {
        let mut slot = self.handle.lock();
        if matches!(slot.armed, Some((id, _)) if id == self.id) {
            slot.armed = None;
        }
    }
}

/// A callable unit for one (endpoint, method) pair.
///
/// Cloning is cheap and clones share the abort slot.
#[derive(Clone)]
pub struct Fetcher {
    call: Arc<CallFn>,
    abort: AbortHandle,
}

impl Fetcher {
    /// Builds a fetcher from an async closure.
    ///
    /// The fetcher gets its own abort handle, which nothing arms. Effects
    /// use this to return wrapped fetchers; the builder then re-attaches
    /// the original fetcher's handle. A wrapper that invokes the inner
    /// fetcher inside its returned future only arms the slot once polled,
    /// so call it before building the future where possible.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        Self {
            call: Arc::new(move |request| f(request).boxed()),
            abort: AbortHandle::new(),
        }
    }

    pub fn call(&self, request: Request) -> BoxFuture<'static, FetchResult> {
        (self.call)(request)
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Replaces the abort handle, keeping the call behaviour.
    pub fn with_abort(self, abort: AbortHandle) -> Self {
        Self {
            call: self.call,
            abort,
        }
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("abort", &self.abort)
            .finish_non_exhaustive()
    }
}

/// Builds the fetcher for `method` on `endpoint`, resolved against
/// `base_url`.
///
/// The endpoint pattern is compiled here, once; rendering happens per call.
pub fn fetcher(
    transport: Arc<dyn Transport>,
    base_url: &Url,
    endpoint: &str,
    method: HttpMethod,
) -> Result<Fetcher, TemplateError> {
    let template = PathTemplate::compile(endpoint)?;
    let abort = AbortHandle::new();
    let executor = Arc::new(RequestExecutor::new(
        transport,
        base_url,
        template,
        method,
        abort.clone(),
    ));

    let call = move |request: Request| executor.execute(request);

    Ok(Fetcher {
        call: Arc::new(call),
        abort,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::{HttpRequest, HttpResponse};
    use serde_json::json;
    use std::time::Duration;

    /// Answers `{"ok": true}` after `delay`.
    struct Delayed(Duration);

    impl Transport for Delayed {
        fn send(&self, _request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
            async move {
                tokio::time::sleep(self.0).await;
                Ok(HttpResponse::new(200, r#"{"ok":true}"#))
            }
            .boxed()
        }
    }

    fn delayed_fetcher(pattern: &str, delay: Duration) -> Fetcher {
        let base_url = Url::parse("http://api.test").unwrap();
        fetcher(Arc::new(Delayed(delay)), &base_url, pattern, HttpMethod::Get).unwrap()
    }

    #[tokio::test]
    async fn call_arms_the_slot_before_it_is_awaited() {
        let f = delayed_fetcher("/slow", Duration::from_millis(200));

        let pending = f.call(Request::new());
        assert!(f.abort_handle().is_armed());
        f.abort();

        assert_eq!(pending.await.unwrap(), None);
        assert!(!f.abort_handle().is_armed());
    }

    #[tokio::test]
    async fn unaborted_call_completes_and_disarms() {
        let f = delayed_fetcher("/fast", Duration::from_millis(1));

        let reply = f.call(Request::new()).await.unwrap();
        assert_eq!(reply, Some(json!({"ok": true})));
        assert!(!f.abort_handle().is_armed());
    }

    #[tokio::test]
    async fn abort_targets_the_newest_call_only() {
        let f = delayed_fetcher("/slow", Duration::from_millis(50));

        let older = f.call(Request::new());
        let newer = f.call(Request::new());
        f.abort();

        assert_eq!(newer.await.unwrap(), None);
        assert_eq!(older.await.unwrap(), Some(json!({"ok": true})));
    }

    #[test]
    fn abort_without_call_is_noop() {
        let handle = AbortHandle::new();
        assert!(!handle.is_armed());
        handle.abort();
        handle.abort();
        assert!(!handle.is_armed());
    }

    #[test]
    fn arming_and_settling_disarms() {
        let handle = AbortHandle::new();
        let armed = handle.arm();
        assert!(handle.is_armed());
        drop(armed);
        assert!(!handle.is_armed());
    }

    #[test]
    fn newer_arm_survives_older_settling() {
        let handle = AbortHandle::new();
        let first = handle.arm();
        let mut second = handle.arm();
        drop(first);
        assert!(handle.is_armed());

        handle.abort();
        assert!(second.cancelled.try_recv().is_ok());
    }

    #[test]
    fn abort_signals_armed_call() {
        let handle = AbortHandle::new();
        let mut armed = handle.arm();
        handle.abort();
        assert!(armed.cancelled.try_recv().is_ok());
        assert!(!handle.is_armed());
    }

    #[test]
    fn request_builder_collects_facets() {
        let request = Request::new()
            .body(json!({"title": "x"}))
            .querystring(json!({"page": 2}))
            .param("id", "42")
            .header("x-trace", "1");

        assert_eq!(request.body, Some(json!({"title": "x"})));
        assert_eq!(request.params.unwrap()["id"], "42");
        assert_eq!(request.headers, vec![("x-trace".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn from_fn_fetcher_is_callable_and_abortable() {
        let fetcher = Fetcher::from_fn(|request: Request| async move { Ok(request.body) });
        let reply = fetcher.call(Request::new().body(json!(1))).await.unwrap();
        assert_eq!(reply, Some(json!(1)));
        fetcher.abort();
    }

    #[test]
    fn with_abort_shares_the_given_slot() {
        let original = AbortHandle::new();
        let fetcher = Fetcher::from_fn(|_| async { Ok(None) }).with_abort(original.clone());
        let _armed = original.arm();
        assert!(fetcher.abort_handle().is_armed());
        fetcher.abort();
        assert!(!original.is_armed());
    }
}
