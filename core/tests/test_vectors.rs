//! Verify path rendering and error normalization against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Normalization vectors run through a generated fetcher backed by a canned
//! transport, so they cover the same path a real call takes. Comparing parsed
//! JSON (not raw strings) avoids false negatives from field ordering.

use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use typed_api::{
    make_api, schema, ApiOptions, HttpMethod, HttpRequest, HttpResponse, PathTemplate, Request,
    TemplateError, Transport, TransportError,
};
use url::Url;

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[test]
fn template_test_vectors() {
    for case in load(include_str!("../../test-vectors/templates.json")) {
        let name = case["name"].as_str().unwrap();
        let pattern = case["pattern"].as_str().unwrap();
        let params: Option<HashMap<String, String>> =
            serde_json::from_value(case["params"].clone()).unwrap();

        let template = PathTemplate::compile(pattern).unwrap();
        let rendered = template.render(params.as_ref());

        match case["expected_error"].as_str() {
            None => assert_eq!(
                rendered.unwrap(),
                case["expected_path"].as_str().unwrap(),
                "{name}: path"
            ),
            Some(kind) => {
                let err = rendered.unwrap_err();
                let matched = match kind {
                    "MissingParam" => matches!(err, TemplateError::MissingParam { .. }),
                    "EmptyParam" => matches!(err, TemplateError::EmptyParam { .. }),
                    other => panic!("{name}: unknown error kind {other}"),
                };
                assert!(matched, "{name}: expected {kind}, got {err:?}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Answers every request with the outcome described by one vector.
struct Canned(Value);

impl Transport for Canned {
    fn send(&self, _request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let outcome = match self.0["transport_error"].as_str() {
            Some(message) => Err(TransportError::new(message)),
            None => {
                let response = &self.0["simulated_response"];
                Ok(HttpResponse::new(
                    response["status"].as_u64().unwrap() as u16,
                    response["body"].as_str().unwrap(),
                ))
            }
        };
        async move { outcome }.boxed()
    }
}

#[tokio::test]
async fn normalize_test_vectors() {
    for case in load(include_str!("../../test-vectors/normalize.json")) {
        let name = case["name"].as_str().unwrap().to_string();
        let options = ApiOptions::new(Url::parse("http://localhost:3000").unwrap(), Canned(case.clone()));
        let api = make_api(&schema! { "/resource" => [Get] }, options).unwrap();

        let outcome = api["/resource"][HttpMethod::Get]
            .call(Request::new())
            .await;

        if let Some(expected) = case.get("expected_reply") {
            assert_eq!(outcome.unwrap().as_ref(), Some(expected), "{name}: reply");
            continue;
        }

        let err = outcome.unwrap_err();
        assert_eq!(err.value(), case["expected_value"], "{name}: value");
        let expected_status = case["expected_status"].as_u64().map(|s| s as u16);
        assert_eq!(err.status(), expected_status, "{name}: status");
    }
}
