//! HTTP transport types exchanged between the executor and a [`Transport`].
//!
//! # Design
//! Requests and responses are plain data. The executor builds an
//! `HttpRequest` with the URL already resolved and the query already
//! flattened, and the transport hands back an `HttpResponse` whatever the
//! status code. Interpreting the status is the executor's job, which keeps
//! every transport implementation small and keeps error normalization in one
//! place.
//!
//! [`Transport`]: crate::transport::Transport

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

/// HTTP method for a schema entry and for a request.
///
/// Parsing is case-insensitive so schema documents may use `get` or `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        method.to_reqwest()
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown HTTP method: {raw}")))
    }
}

/// An HTTP request described as plain data.
///
/// Built by the request executor. `url` is absolute and carries no query
/// string; `query` holds the flattened pairs in order.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Send and accept cookies for this request. Always `true` for requests
    /// built by the executor.
    pub with_credentials: bool,
}

/// An HTTP response described as plain data.
///
/// Transports return this for every status code; only network-level
/// failures are reported as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as JSON.
    ///
    /// An empty body is `Null` and a body that is not JSON is returned as a
    /// JSON string, so a successful response always has a value.
    pub fn json(&self) -> Value {
        if self.body.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn method_displays_uppercase() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }

    #[test]
    fn method_parses_any_case() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("FETCH".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn method_deserializes_from_string() {
        let methods: Vec<HttpMethod> = serde_json::from_str(r#"["post","PUT"]"#).unwrap();
        assert_eq!(methods, vec![HttpMethod::Post, HttpMethod::Put]);

        let err = serde_json::from_str::<HttpMethod>(r#""brew""#).unwrap_err();
        assert!(err.to_string().contains("unknown HTTP method: brew"));
    }

    #[test]
    fn every_method_maps_to_reqwest() {
        for method in HttpMethod::iter() {
            assert_eq!(method.to_reqwest().as_str(), method.to_string());
        }
    }

    #[test]
    fn response_json_handles_empty_and_plain_text() {
        assert_eq!(HttpResponse::new(204, "").json(), Value::Null);
        assert_eq!(
            HttpResponse::new(200, "plain text").json(),
            Value::String("plain text".to_string())
        );
        assert_eq!(HttpResponse::new(200, r#"{"a":1}"#).json()["a"], 1);
    }

    #[test]
    fn success_is_2xx_only() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(299, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }
}
