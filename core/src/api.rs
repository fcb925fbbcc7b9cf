//! Builds the endpoint → method → fetcher map from a schema.

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::effect::{Effect, EffectContext};
use crate::error::SchemaError;
use crate::fetcher::{fetcher, Fetcher};
use crate::http::HttpMethod;
use crate::route::{Route, TypedFetcher};
use crate::schema::Schema;
use crate::transport::Transport;

/// Options for [`make_api`].
#[derive(Clone)]
pub struct ApiOptions {
    base_url: Url,
    transport: Arc<dyn Transport>,
    effect: Option<Arc<dyn Effect>>,
}

impl ApiOptions {
    pub fn new(base_url: Url, transport: impl Transport + 'static) -> Self {
        Self::with_shared_transport(base_url, Arc::new(transport))
    }

    /// Like [`ApiOptions::new`] for a transport that is already shared.
    pub fn with_shared_transport(base_url: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url,
            transport,
            effect: None,
        }
    }

    /// Wraps every generated fetcher with `effect`.
    pub fn effect(mut self, effect: impl Effect + 'static) -> Self {
        self.effect = Some(Arc::new(effect));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl fmt::Debug for ApiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiOptions")
            .field("base_url", &self.base_url.as_str())
            .field("effect", &self.effect.is_some())
            .finish_non_exhaustive()
    }
}

/// Generates one fetcher per declared (endpoint, method) pair.
///
/// The schema is validated first, so a malformed schema fails here rather
/// than on first call. No network I/O happens while building. When an
/// effect is configured, each fetcher is passed through it and the
/// original fetcher's abort handle is attached to the result.
///
/// ```
/// use typed_api::{make_api, schema, ApiOptions, HttpMethod, ReqwestTransport};
/// use url::Url;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schema = schema! {
///     "/todos" => [Get, Post],
///     "/todos/:id" => [Get, Put, Delete],
/// };
/// let options = ApiOptions::new(Url::parse("http://localhost:3000")?, ReqwestTransport::new()?);
/// let api = make_api(&schema, options)?;
///
/// assert_eq!(api.len(), 2);
/// assert_eq!(api["/todos/:id"].len(), 3);
/// api["/todos"][HttpMethod::Get].abort();
/// # Ok(())
/// # }
/// ```
pub fn make_api(schema: &Schema, options: ApiOptions) -> Result<Endpoints, SchemaError> {
    schema.validate()?;

    let ApiOptions {
        base_url,
        transport,
        effect,
    } = options;
    let mut endpoints = HashMap::with_capacity(schema.len());

    for (endpoint, methods) in schema.iter() {
        let mut fetchers = HashMap::with_capacity(methods.len());

        for &method in methods {
            let raw = fetcher(Arc::clone(&transport), &base_url, endpoint, method).map_err(
                |source| SchemaError::InvalidPattern {
                    endpoint: endpoint.to_string(),
                    source,
                },
            )?;

            let installed = match &effect {
                Some(effect) => {
                    let abort = raw.abort_handle();
                    let context = EffectContext {
                        base_url: base_url.clone(),
                        endpoint: endpoint.to_string(),
                        method,
                        abort: abort.clone(),
                    };
                    effect.apply(raw, &context).with_abort(abort)
                }
                None => raw,
            };
            fetchers.insert(method, installed);
        }

        endpoints.insert(endpoint.to_string(), Methods { fetchers });
    }

    debug!(
        base_url = %base_url,
        endpoints = endpoints.len(),
        effect = effect.is_some(),
        "api built"
    );
    Ok(Endpoints { endpoints })
}

/// The generated client: endpoint pattern → [`Methods`].
#[derive(Debug, Clone)]
pub struct Endpoints {
    endpoints: HashMap<String, Methods>,
}

impl Endpoints {
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, endpoint: &str) -> Option<&Methods> {
        self.endpoints.get(endpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Methods)> {
        self.endpoints
            .iter()
            .map(|(endpoint, methods)| (endpoint.as_str(), methods))
    }

    /// The typed fetcher for route `R`, or `None` when the schema does not
    /// declare it.
    pub fn route<R: Route>(&self) -> Option<TypedFetcher<R>> {
        self.get(R::ENDPOINT)?
            .get(R::METHOD)
            .cloned()
            .map(TypedFetcher::new)
    }
}

impl Index<&str> for Endpoints {
    type Output = Methods;

    /// ## Panics
    ///
    /// Panics if the endpoint is not in the schema.
    fn index(&self, endpoint: &str) -> &Methods {
        self.get(endpoint)
            .unwrap_or_else(|| panic!("endpoint {endpoint} is not declared in the schema"))
    }
}

/// The fetchers of one endpoint, keyed by method.
#[derive(Debug, Clone)]
pub struct Methods {
    fetchers: HashMap<HttpMethod, Fetcher>,
}

impl Methods {
    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    pub fn get(&self, method: HttpMethod) -> Option<&Fetcher> {
        self.fetchers.get(&method)
    }

    /// Declared methods, sorted.
    pub fn methods(&self) -> Vec<HttpMethod> {
        let mut methods: Vec<_> = self.fetchers.keys().copied().collect();
        methods.sort();
        methods
    }
}

impl Index<HttpMethod> for Methods {
    type Output = Fetcher;

    /// ## Panics
    ///
    /// Panics if the method is not declared for this endpoint.
    fn index(&self, method: HttpMethod) -> &Fetcher {
        self.get(method)
            .unwrap_or_else(|| panic!("method {method} is not declared for this endpoint"))
    }
}
