//! Adapter for the promise-based transport.

use super::Scope;
use crate::hook::RequestInfo;
use crate::pipeline;
use crate::response::{body_text, parse_body};
use crate::transport::{FetchRequest, FetchResponse, FetchTransport, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Wrapped call-and-await entry point of the fetch transport.
///
/// Pre-send overrides can only replace the whole URL or the whole body.
/// Pre-response hooks are not applied on this transport.
pub struct FetchAdapter {
    original: Arc<dyn FetchTransport>,
    scope: Arc<Scope>,
}

impl FetchAdapter {
    pub(crate) fn new(original: Arc<dyn FetchTransport>, scope: Arc<Scope>) -> Self {
        Self { original, scope }
    }

    async fn apply_before_send(&self, request: &mut FetchRequest) -> Result<(), TransportError> {
        let url = self.scope.origin.absolutize(&request.url);
        let Some(rule) = self
            .scope
            .find_rule(&url, &request.method)
            .filter(|rule| rule.has_before_send())
        else {
            return Ok(());
        };

        let info = RequestInfo::new(url, request.body.clone());
        if let Some(overrides) = pipeline::before_send(&rule, info).await? {
            if let Some(url) = overrides.url {
                debug!(rule = %rule.name, from = %request.url, to = %url, "Overriding fetch URL");
                request.url = url;
            }
            if let Some(data) = overrides.data {
                request.body = Some(data);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FetchTransport for FetchAdapter {
    async fn fetch(&self, mut request: FetchRequest) -> Result<FetchResponse, TransportError> {
        self.apply_before_send(&mut request).await?;

        let method = request.method.clone();
        let body = request.body.clone();
        let response = self.original.fetch(request).await?;

        let Some(rule) = self.scope.find_rule(&response.url, &method) else {
            return Ok(response);
        };

        if rule.observe.is_none() && rule.post_response.is_none() {
            if rule.pre_response.is_some() {
                debug!(rule = %rule.name, "Pre-response hooks are not applied to fetch calls");
            }
            return Ok(response);
        }

        let data = parse_body(&response.text());
        pipeline::observe(&rule, &data).await;

        let info = RequestInfo::new(response.url.as_str(), body);
        match pipeline::post_response(&rule, data, info).await? {
            Some(data) => Ok(response.with_body(body_text(&data))),
            None => {
                trace!(rule = %rule.name, "Returning original fetch response");
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusRange;
    use crate::hook::{PreResponseDecision, Replacement, RequestOverride};
    use crate::matcher::PageOrigin;
    use crate::rule::{InterceptionRule, RuleRegistry};
    use crate::transport::{StaticResponse, StaticTransport};
    use serde_json::json;

    fn setup(rules: Vec<InterceptionRule>) -> (StaticTransport, FetchAdapter) {
        let origin = PageOrigin::parse("https://app.example.com").unwrap();
        let backend = StaticTransport::new(origin.clone());
        let registry = Arc::new(RuleRegistry::new());
        registry.register(rules);

        let scope = Arc::new(Scope {
            rules: registry,
            origin,
            success: StatusRange::default(),
        });
        let adapter = FetchAdapter::new(Arc::new(backend.clone()), scope);
        (backend, adapter)
    }

    #[tokio::test]
    async fn test_body_override() {
        let rule = InterceptionRule::new("/api/echo", "POST").on_before_send(|_req| async {
            Ok(Some(RequestOverride::data("replaced")))
        });
        let (backend, adapter) = setup(vec![rule]);

        adapter
            .fetch(FetchRequest::new("POST", "/api/echo").with_body("original"))
            .await
            .unwrap();
        assert_eq!(
            backend.requests()[0].body_text().as_deref(),
            Some("replaced")
        );
    }

    #[tokio::test]
    async fn test_matches_redirected_response_url() {
        let rule = InterceptionRule::new("/api/new", "GET").on_post_response(|_data, req| async move {
            Ok(json!({ "seen": req.url }))
        });
        let (backend, adapter) = setup(vec![rule]);
        backend.route(
            "GET",
            "/api/old",
            StaticResponse::json(&json!({})).redirected_to("/api/new"),
        );

        let response = adapter.fetch(FetchRequest::get("/api/old")).await.unwrap();
        assert_eq!(
            response.json().unwrap(),
            json!({"seen": "https://app.example.com/api/new"})
        );
    }

    #[tokio::test]
    async fn test_pre_response_only_rule_is_inert() {
        let rule = InterceptionRule::new("/api/x", "GET").on_pre_response(|_data, _req| async {
            Ok(PreResponseDecision::Replace(Replacement::to("/api/y")))
        });
        let (backend, adapter) = setup(vec![rule]);
        backend.route("GET", "/api/x", StaticResponse::text("x"));

        let response = adapter.fetch(FetchRequest::get("/api/x")).await.unwrap();
        assert_eq!(response.text(), "x");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_post_response_error_is_returned() {
        let rule = InterceptionRule::new("/api/x", "GET")
            .on_post_response(|_data, _req| async { Err(anyhow::anyhow!("bad body")) });
        let (backend, adapter) = setup(vec![rule]);
        backend.route("GET", "/api/x", StaticResponse::text("x"));

        let err = adapter.fetch(FetchRequest::get("/api/x")).await.unwrap_err();
        assert!(matches!(err, TransportError::Hook { .. }));
    }
}
