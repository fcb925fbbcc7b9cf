//! The declarative endpoint schema.
//!
//! A schema lists, for each endpoint path pattern, the HTTP methods it
//! supports. Entries are kept in declaration order, duplicates included,
//! so that [`Schema::validate`] can report a repeated endpoint or method
//! instead of silently merging it.

use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::SchemaError;
use crate::http::HttpMethod;
use crate::template::PathTemplate;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    endpoints: Vec<(String, Vec<HttpMethod>)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `methods` for the endpoint `pattern`.
    pub fn endpoint(
        mut self,
        pattern: impl Into<String>,
        methods: impl IntoIterator<Item = HttpMethod>,
    ) -> Self {
        self.endpoints
            .push((pattern.into(), methods.into_iter().collect()));
        self
    }

    /// Reads a schema from a JSON object mapping endpoint patterns to
    /// method lists, e.g. `{"/users/:id": ["GET", "DELETE"]}`.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[HttpMethod])> {
        self.endpoints
            .iter()
            .map(|(endpoint, methods)| (endpoint.as_str(), methods.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Checks every entry and returns the first problem found.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen_endpoints = HashSet::new();

        for (endpoint, methods) in &self.endpoints {
            if !seen_endpoints.insert(endpoint.as_str()) {
                return Err(SchemaError::DuplicateEndpoint {
                    endpoint: endpoint.clone(),
                });
            }
            if methods.is_empty() {
                return Err(SchemaError::EmptyMethods {
                    endpoint: endpoint.clone(),
                });
            }

            let mut seen_methods = HashSet::new();
            for method in methods {
                if !seen_methods.insert(*method) {
                    return Err(SchemaError::DuplicateMethod {
                        endpoint: endpoint.clone(),
                        method: *method,
                    });
                }
            }

            PathTemplate::compile(endpoint).map_err(|source| SchemaError::InvalidPattern {
                endpoint: endpoint.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of endpoint patterns to lists of HTTP methods")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Schema, A::Error> {
                let mut endpoints = Vec::new();
                while let Some((endpoint, methods)) = map.next_entry::<String, Vec<HttpMethod>>()? {
                    endpoints.push((endpoint, methods));
                }
                Ok(Schema { endpoints })
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

/// Builds a [`Schema`] from `pattern => [Method, ...]` entries.
///
/// ```
/// use typed_api::{schema, HttpMethod};
///
/// let schema = schema! {
///     "/todos" => [Get, Post],
///     "/todos/:id" => [Get, Put, Delete],
/// };
/// assert_eq!(schema.len(), 2);
/// assert!(schema.validate().is_ok());
/// ```
#[macro_export]
macro_rules! schema {
    ($($endpoint:expr => [$($method:ident),* $(,)?]),* $(,)?) => {
        $crate::Schema::new()
            $(.endpoint($endpoint, {
                let methods: ::std::vec::Vec<$crate::HttpMethod> =
                    ::std::vec![$($crate::HttpMethod::$method),*];
                methods
            }))*
    };
}
