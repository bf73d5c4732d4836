//! Adapter for the callback-based transport.
//!
//! Per call the adapter walks `open -> headers -> send -> completed` or
//! `-> superseded`. Headers are recorded as they are set so the call can be
//! re-opened under a new URL; the caller's ready handler is wrapped so that a
//! successful completion passes through the response stages before the
//! caller sees it.

use super::Scope;
use crate::context::CallContext;
use crate::hook::{PreResponseDecision, Replacement, RequestInfo, RequestOverride};
use crate::pipeline;
use crate::response::ResponseKind;
use crate::rule::InterceptionRule;
use crate::transport::{
    Completion, LegacyCall, LegacyTransport, ReadyEvent, ReadyHandler, TransportError,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Wrapped call-initiation entry point of the legacy transport.
///
/// Hooks run on the tokio runtime, so one must be running whenever a call
/// that matches a rule is sent or completes.
pub struct LegacyAdapter {
    original: Arc<dyn LegacyTransport>,
    scope: Arc<Scope>,
}

impl LegacyAdapter {
    pub(crate) fn new(original: Arc<dyn LegacyTransport>, scope: Arc<Scope>) -> Self {
        Self { original, scope }
    }
}

impl LegacyTransport for LegacyAdapter {
    fn open(&self, method: &str, url: &str) -> Result<Box<dyn LegacyCall>, TransportError> {
        let inner = self.original.open(method, url)?;

        Ok(Box::new(InterceptedCall {
            inner,
            context: CallContext::new(method, url),
            original: Arc::clone(&self.original),
            scope: Arc::clone(&self.scope),
        }))
    }
}

/// A legacy call opened through the adapter.
struct InterceptedCall {
    inner: Box<dyn LegacyCall>,
    context: CallContext,
    original: Arc<dyn LegacyTransport>,
    scope: Arc<Scope>,
}

impl LegacyCall for InterceptedCall {
    fn set_request_header(&mut self, name: &str, value: &str) {
        self.context.headers.record(name, value);
        self.inner.set_request_header(name, value);
    }

    fn set_response_type(&mut self, kind: ResponseKind) {
        self.context.response_kind = kind;
        self.inner.set_response_type(kind);
    }

    fn send(self: Box<Self>, body: Option<Bytes>, mut on_ready: ReadyHandler) {
        let mut call = *self;
        call.context.body = body;

        let url = call.scope.origin.absolutize(&call.context.url);
        let rule = call
            .scope
            .find_rule(&url, &call.context.method)
            .filter(|rule| rule.has_before_send());

        let Some(rule) = rule else {
            call.dispatch(None, on_ready);
            return;
        };

        tokio::spawn(async move {
            let request = call.context.request_info(url);
            match pipeline::before_send(&rule, request).await {
                Ok(overrides) => call.dispatch(overrides, on_ready),
                Err(e) => on_ready(ReadyEvent::Failed(e)),
            }
        });
    }
}

impl InterceptedCall {
    /// Apply pre-send overrides and hand the call to the native transport.
    fn dispatch(self, overrides: Option<RequestOverride>, mut on_ready: ReadyHandler) {
        let InterceptedCall {
            mut inner,
            mut context,
            original,
            scope,
        } = self;

        if let Some(overrides) = overrides {
            if let Some(data) = overrides.data {
                context.body = Some(data);
            }
            if let Some(url) = overrides.url {
                inner = match reopen(original.as_ref(), &context, &url) {
                    Ok(call) => call,
                    Err(e) => {
                        on_ready(ReadyEvent::Failed(e));
                        return;
                    }
                };
                context.url = url;
            }
        }

        let body = context.body.clone();
        let handler = completion_handler(Arc::new(context), original, scope, on_ready);
        inner.send(body, handler);
    }
}

/// Open a replacement call under a new URL and re-apply the captured state.
fn reopen(
    transport: &dyn LegacyTransport,
    context: &CallContext,
    url: &str,
) -> Result<Box<dyn LegacyCall>, TransportError> {
    let mut call = transport.open(&context.method, url)?;
    for (name, value) in context.headers.replay() {
        call.set_request_header(name, value);
    }
    call.set_response_type(context.response_kind);

    debug!(
        from = %context.url,
        to = %url,
        headers = context.headers.len(),
        "Re-opened call with overridden URL"
    );
    Ok(call)
}

/// Wrap the caller's ready handler.
///
/// Progress, failures and unsuccessful completions pass straight through.
/// A successful completion addressed by a rule with response hooks takes the
/// caller's handler with it into the completion pipeline, which delivers the
/// terminal event exactly once.
fn completion_handler(
    context: Arc<CallContext>,
    original: Arc<dyn LegacyTransport>,
    scope: Arc<Scope>,
    on_ready: ReadyHandler,
) -> ReadyHandler {
    let mut caller = Some(on_ready);

    Box::new(move |event| {
        let rule = match event {
            ReadyEvent::Done(ref completion) if scope.success.contains(completion.status()) => {
                scope
                    .find_rule(completion.url(), &context.method)
                    .filter(|rule| rule.has_response_hooks())
            }
            _ => None,
        };

        match (rule, event) {
            (Some(rule), ReadyEvent::Done(completion)) => {
                let Some(mut handler) = caller.take() else {
                    return;
                };
                let job = CompletionPipeline {
                    rule,
                    context: Arc::clone(&context),
                    original: Arc::clone(&original),
                    scope: Arc::clone(&scope),
                };
                tokio::spawn(async move {
                    let event = job.run(completion).await;
                    handler(event);
                });
            }
            (_, event) => {
                trace!(url = %context.url, "Passing ready event through");
                if let Some(handler) = caller.as_mut() {
                    handler(event);
                }
            }
        }
    })
}

/// Response stages for one successful completion.
struct CompletionPipeline {
    rule: Arc<InterceptionRule>,
    context: Arc<CallContext>,
    original: Arc<dyn LegacyTransport>,
    scope: Arc<Scope>,
}

impl CompletionPipeline {
    async fn run(self, completion: Completion) -> ReadyEvent {
        let request = self
            .context
            .request_info(self.scope.origin.absolutize(&self.context.url));
        let data = completion.data();

        match pipeline::pre_response(&self.rule, data.clone(), request.clone()).await {
            Ok(PreResponseDecision::Accept) => {}
            Ok(PreResponseDecision::Replace(replacement)) => {
                return self.supersede(completion, replacement, request).await;
            }
            Err(e) => return ReadyEvent::Failed(e),
        }

        pipeline::observe(&self.rule, &data).await;

        let response_info = RequestInfo::new(completion.url(), request.data);
        match pipeline::post_response(&self.rule, data, response_info).await {
            Ok(Some(body)) => {
                let mut view = completion.view().clone();
                view.override_body(body);
                ReadyEvent::Done(completion.with_view(view))
            }
            Ok(None) => ReadyEvent::Done(completion),
            Err(e) => ReadyEvent::Failed(e),
        }
    }

    /// Answer the caller with a second call instead of the real completion.
    async fn supersede(
        &self,
        completion: Completion,
        replacement: Replacement,
        request: RequestInfo,
    ) -> ReadyEvent {
        let uri = replacement.uri.unwrap_or_else(|| request.url.clone());
        debug!(
            rule = %self.rule.name,
            from = %completion.url(),
            to = %uri,
            "Superseding call"
        );

        let superseding = match self.call(&uri, replacement.data).await {
            Ok(superseding) => superseding,
            Err(e) => return ReadyEvent::Failed(e),
        };

        let mut view = completion.view().clone();
        view.replace_with(superseding.view());

        match pipeline::post_response(&self.rule, superseding.data(), request).await {
            Ok(Some(body)) => view.override_body(body),
            Ok(None) => {}
            Err(e) => return ReadyEvent::Failed(e),
        }

        ReadyEvent::Done(completion.with_view(view))
    }

    /// Issue a call through the original transport and await its terminal
    /// event.
    async fn call(&self, url: &str, body: Option<Bytes>) -> Result<Completion, TransportError> {
        let mut call = self.original.open(&self.context.method, url)?;
        call.set_response_type(self.context.response_kind);

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        call.send(
            body,
            Box::new(move |event| {
                if matches!(event, ReadyEvent::Progress(_)) {
                    return;
                }
                if let Some(tx) = tx.take() {
                    let _ = tx.send(event);
                }
            }),
        );

        match rx.await {
            Ok(ReadyEvent::Done(completion)) => Ok(completion),
            Ok(ReadyEvent::Failed(e)) => Err(e),
            Ok(ReadyEvent::Progress(_)) | Err(_) => Err(TransportError::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusRange;
    use crate::matcher::PageOrigin;
    use crate::rule::RuleRegistry;
    use crate::transport::{StaticResponse, StaticTransport};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn setup(rules: Vec<InterceptionRule>) -> (StaticTransport, LegacyAdapter) {
        let origin = PageOrigin::parse("https://app.example.com").unwrap();
        let backend = StaticTransport::new(origin.clone());
        let registry = Arc::new(RuleRegistry::new());
        registry.register(rules);

        let scope = Arc::new(Scope {
            rules: registry,
            origin,
            success: StatusRange::default(),
        });
        let adapter = LegacyAdapter::new(Arc::new(backend.clone()), scope);
        (backend, adapter)
    }

    async fn send(
        adapter: &LegacyAdapter,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&'static str>,
    ) -> Vec<ReadyEvent> {
        let mut call = adapter.open(method, url).unwrap();
        for (name, value) in headers {
            call.set_request_header(name, value);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        call.send(
            body.map(|body| Bytes::from_static(body.as_bytes())),
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        );

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let terminal = !matches!(event, ReadyEvent::Progress(_));
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    fn completion(events: &[ReadyEvent]) -> &Completion {
        match events.last() {
            Some(ReadyEvent::Done(completion)) => completion,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reopen_replays_headers_without_content_length() {
        let rule = InterceptionRule::new("/api/old", "POST").on_before_send(|_req| async {
            Ok(Some(RequestOverride::url("/api/new")))
        });
        let (backend, adapter) = setup(vec![rule]);
        backend.route("POST", "/api/new", StaticResponse::text("moved"));

        let events = send(
            &adapter,
            "POST",
            "/api/old",
            &[("X-Token", "abc"), ("Content-Length", "3")],
            Some("abc"),
        )
        .await;
        assert_eq!(completion(&events).response_text(), "moved");

        // the native call opened first is never sent
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://app.example.com/api/new");
        assert_eq!(
            requests[0].headers,
            vec![("X-Token".to_string(), "abc".to_string())]
        );
        assert_eq!(requests[0].body_text().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_unsuccessful_status_skips_hooks() {
        let rule = InterceptionRule::new("/api/x", "GET").on_post_response(|_data, _req| async {
            Ok(json!("rewritten"))
        });
        let (_backend, adapter) = setup(vec![rule]);

        let events = send(&adapter, "GET", "/api/x", &[], None).await;
        let completion = completion(&events);
        assert_eq!(completion.status(), 404);
        assert_eq!(completion.response_text(), "");
    }

    #[tokio::test]
    async fn test_before_send_failure_is_delivered() {
        let rule = InterceptionRule::new("/api/x", "GET")
            .on_before_send(|_req| async { Err(anyhow::anyhow!("denied")) });
        let (backend, adapter) = setup(vec![rule]);

        let events = send(&adapter, "GET", "/api/x", &[], None).await;
        assert!(matches!(
            events.last(),
            Some(ReadyEvent::Failed(TransportError::Hook { .. }))
        ));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_superseding_failure_is_delivered() {
        let rule = InterceptionRule::new("/api/x", "GET").on_pre_response(|_data, _req| async {
            Ok(PreResponseDecision::Replace(Replacement::to("/api/down")))
        });
        let (backend, adapter) = setup(vec![rule]);
        backend.route("GET", "/api/x", StaticResponse::text("first"));
        backend.route(
            "GET",
            "/api/down",
            StaticResponse::failure(TransportError::Network("reset".to_string())),
        );

        let events = send(&adapter, "GET", "/api/x", &[], None).await;
        assert!(matches!(
            events.last(),
            Some(ReadyEvent::Failed(TransportError::Network(_)))
        ));
    }
}
