//! Typed views over generated fetchers.
//!
//! A [`Route`] names one (endpoint, method) pair together with the shape of
//! each payload facet. [`Endpoints::route`] turns the matching fetcher into
//! a [`TypedFetcher`] that serializes the typed request and deserializes
//! the reply, so the compiler checks the shapes the schema only names.
//!
//! [`Endpoints::route`]: crate::Endpoints::route

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::fetcher::{Fetcher, Request};
use crate::http::HttpMethod;

/// Payload shapes for one (endpoint, method) pair. Use `()` for facets the
/// endpoint does not take.
pub trait Route {
    const ENDPOINT: &'static str;
    const METHOD: HttpMethod;

    type Body: Serialize;
    type Querystring: Serialize;
    /// Serializes to an object of path parameter values.
    type Params: Serialize;
    /// Declared for documentation; fetchers never send these.
    type Headers;
    type Reply: DeserializeOwned;
}

/// The typed payload of one call.
pub struct Call<R: Route> {
    pub body: Option<R::Body>,
    pub querystring: Option<R::Querystring>,
    pub params: Option<R::Params>,
}

impl<R: Route> Default for Call<R> {
    fn default() -> Self {
        Self {
            body: None,
            querystring: None,
            params: None,
        }
    }
}

impl<R: Route> Call<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: R::Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn querystring(mut self, querystring: R::Querystring) -> Self {
        self.querystring = Some(querystring);
        self
    }

    pub fn params(mut self, params: R::Params) -> Self {
        self.params = Some(params);
        self
    }

    fn into_request(self) -> Result<Request, ApiError> {
        Ok(Request {
            body: self.body.as_ref().map(to_value).transpose()?,
            querystring: self.querystring.as_ref().map(to_value).transpose()?,
            params: self.params.as_ref().map(params_map).transpose()?,
            headers: Vec::new(),
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Serialization(e.to_string()))
}

fn params_map<T: Serialize>(params: &T) -> Result<HashMap<String, String>, ApiError> {
    match to_value(params)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect()),
        Value::Null => Ok(HashMap::new()),
        other => Err(ApiError::Serialization(format!(
            "path params must serialize to an object, got {other}"
        ))),
    }
}

/// A fetcher with the request and reply shapes of route `R`.
pub struct TypedFetcher<R> {
    fetcher: Fetcher,
    route: PhantomData<fn() -> R>,
}

impl<R: Route> TypedFetcher<R> {
    pub(crate) fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            route: PhantomData,
        }
    }

    /// Performs the call. `Ok(None)` means it was aborted.
    pub async fn call(&self, call: Call<R>) -> Result<Option<R::Reply>, ApiError> {
        let request = call.into_request()?;
        match self.fetcher.call(request).await? {
            Some(reply) => serde_json::from_value(reply)
                .map(Some)
                .map_err(|e| ApiError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn abort(&self) {
        self.fetcher.abort();
    }

    /// The untyped fetcher behind this view.
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }
}

impl<R> Clone for TypedFetcher<R> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            route: PhantomData,
        }
    }
}

impl<R: Route> fmt::Debug for TypedFetcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedFetcher")
            .field("endpoint", &R::ENDPOINT)
            .field("method", &R::METHOD)
            .finish()
    }
}

/// Declares unit structs implementing [`Route`].
///
/// Facets are listed in the order `body`, `querystring`, `params`,
/// `headers`, `reply`; all but `reply` may be left out and default to `()`.
///
/// ```
/// use std::collections::HashMap;
/// use typed_api::{route, HttpMethod, Route};
///
/// #[derive(serde::Deserialize)]
/// pub struct User {
///     pub id: String,
/// }
///
/// route! {
///     pub GetUser: Get "/users/:id" {
///         params: HashMap<String, String>,
///         reply: User,
///     }
/// }
///
/// assert_eq!(GetUser::ENDPOINT, "/users/:id");
/// assert_eq!(GetUser::METHOD, HttpMethod::Get);
/// ```
#[macro_export]
macro_rules! route {
    ($(
        $(#[$meta:meta])*
        $vis:vis $name:ident: $method:ident $endpoint:literal {
            $(body: $body:ty,)?
            $(querystring: $querystring:ty,)?
            $(params: $params:ty,)?
            $(headers: $headers:ty,)?
            reply: $reply:ty $(,)?
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::Route for $name {
            const ENDPOINT: &'static str = $endpoint;
            const METHOD: $crate::HttpMethod = $crate::HttpMethod::$method;

            type Body = $crate::__route_facet!($($body)?);
            type Querystring = $crate::__route_facet!($($querystring)?);
            type Params = $crate::__route_facet!($($params)?);
            type Headers = $crate::__route_facet!($($headers)?);
            type Reply = $reply;
        }
    )*};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __route_facet {
    () => { () };
    ($ty:ty) => { $ty };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct UserParams {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    }

    #[derive(Serialize)]
    struct Page {
        page: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    crate::route! {
        GetUser: Get "/users/:id" {
            querystring: Page,
            params: UserParams,
            reply: User,
        }

        DeleteUser: Delete "/users/:id" {
            params: UserParams,
            reply: (),
        }
    }

    #[test]
    fn macro_declares_endpoint_and_method() {
        assert_eq!(GetUser::ENDPOINT, "/users/:id");
        assert_eq!(GetUser::METHOD, HttpMethod::Get);
        assert_eq!(DeleteUser::METHOD, HttpMethod::Delete);
    }

    #[test]
    fn call_serializes_facets() {
        let request = Call::<GetUser>::new()
            .querystring(Page { page: 3 })
            .params(UserParams { id: 42, tab: None })
            .into_request()
            .unwrap();

        assert_eq!(request.body, None);
        assert_eq!(request.querystring, Some(json!({"page": 3})));
        let params = request.params.unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["id"], "42");
    }

    #[test]
    fn non_object_params_are_rejected() {
        let err = params_map(&"42").unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[tokio::test]
    async fn typed_call_deserializes_reply() {
        let fetcher = Fetcher::from_fn(|request: Request| async move {
            let id: u64 = request.params.unwrap()["id"].parse().unwrap();
            Ok(Some(json!({"id": id, "name": "Ada"})))
        });
        let typed = TypedFetcher::<GetUser>::new(fetcher);

        let user = typed
            .call(Call::new().params(UserParams { id: 7, tab: None }))
            .await
            .unwrap();
        assert_eq!(user, Some(User { id: 7, name: "Ada".into() }));
    }

    #[tokio::test]
    async fn typed_call_reports_reply_mismatch() {
        let fetcher = Fetcher::from_fn(|_| async { Ok(Some(json!({"unexpected": true}))) });
        let typed = TypedFetcher::<GetUser>::new(fetcher);

        let err = typed.call(Call::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[tokio::test]
    async fn aborted_typed_call_is_none() {
        let fetcher = Fetcher::from_fn(|_| async { Ok(None) });
        let typed = TypedFetcher::<DeleteUser>::new(fetcher);
        assert_eq!(typed.call(Call::new()).await.unwrap(), None);
    }
}
