//! Typed HTTP client generation from a declarative endpoint schema.
//!
//! # Overview
//! A [`Schema`] maps endpoint path patterns to the HTTP methods they
//! support. [`make_api`] turns it into an [`Endpoints`] map holding one
//! [`Fetcher`] per (endpoint, method). Each fetcher is an async callable
//! with an `abort()` control, and can be viewed through a [`Route`] for
//! typed requests and replies.
//!
//! # Design
//! - Building validates the schema and allocates closures; it never does I/O.
//! - A fetcher renders its path template, sends one request through the
//!   configured [`Transport`], and normalizes failures into one
//!   [`ApiError`]. An aborted call resolves to `Ok(None)`, not an error.
//! - An [`Effect`] wraps every fetcher at build time (auth, retries,
//!   logging). The builder re-attaches the original abort handle to
//!   whatever the effect returns, so cancellation does not depend on the
//!   effect preserving it.
//! - Only the abort slot inside a fetcher is mutable after building.

pub mod api;
pub mod effect;
pub mod error;
mod executor;
pub mod fetcher;
pub mod http;
pub mod route;
pub mod schema;
pub mod template;
pub mod transport;

pub use api::{make_api, ApiOptions, Endpoints, Methods};
pub use effect::{
    bearer_auth, retry, trace_calls, BearerAuth, Chain, Effect, EffectContext, EffectExt, Retry,
    RetryPolicy, TraceCalls,
};
pub use error::{ApiError, SchemaError, TemplateError, TransportError};
pub use fetcher::{fetcher, AbortHandle, FetchResult, Fetcher, Request};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use route::{Call, Route, TypedFetcher};
pub use schema::Schema;
pub use template::PathTemplate;
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport};
