//! In-memory transport with a canned route table.

use super::{
    Completion, FetchRequest, FetchResponse, FetchTransport, LegacyCall, LegacyTransport,
    ReadyEvent, ReadyHandler, ReadyState, TransportError,
};
use crate::context::status_text;
use crate::matcher::PageOrigin;
use crate::response::{ResponseKind, ResponseView};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Canned answer for one route.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    /// Final URL reported after a redirect
    redirect: Option<String>,
    /// Native failure delivered instead of a response
    failure: Option<TransportError>,
}

impl StaticResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text(status),
            headers: Vec::new(),
            body: body.into(),
            redirect: None,
            failure: None,
        }
    }

    /// `200 OK` with a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string()).with_header("Content-Type", "application/json")
    }

    /// `200 OK` with a plain-text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(200, text.into()).with_header("Content-Type", "text/plain")
    }

    /// A call that fails natively instead of producing a response.
    pub fn failure(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(0, Bytes::new())
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Report a different final URL, as a followed redirect would.
    pub fn redirected_to(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(url.into());
        self
    }

    fn header_map(&self) -> HashMap<String, Vec<String>> {
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in &self.headers {
            headers
                .entry(name.to_lowercase())
                .or_default()
                .push(value.clone());
        }
        headers
    }

    fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// A request as it reached the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Headers in the order they were set
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl RecordedRequest {
    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body as text (lossy).
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }
}

/// Transport answering from a `(method, url)` route table.
///
/// Implements both transport contracts. Routes ignore the query and fragment
/// of a call URL; unknown routes answer `404`. Legacy completions are
/// delivered from a spawned task, so a tokio runtime must be running when a
/// legacy call is sent.
#[derive(Clone, Default)]
pub struct StaticTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    origin: PageOrigin,
    routes: RwLock<HashMap<(String, String), StaticResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

struct Answer {
    url: String,
    response: StaticResponse,
}

impl StaticTransport {
    pub fn new(origin: PageOrigin) -> Self {
        Self {
            inner: Arc::new(Inner {
                origin,
                routes: RwLock::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Add or replace a route. `url` may be origin-relative.
    pub fn route(&self, method: &str, url: &str, response: StaticResponse) {
        let path = match self.inner.origin.resolve(url) {
            Some(url) => route_path(url),
            None => url.to_string(),
        };
        self.inner
            .routes
            .write()
            .insert((method.to_uppercase(), path), response);
    }

    /// Every request dispatched so far, in dispatch order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    pub fn origin(&self) -> &PageOrigin {
        &self.inner.origin
    }

    fn normalize(&self, url: &str) -> String {
        self.inner
            .origin
            .resolve(url)
            .map(String::from)
            .unwrap_or_else(|| url.to_string())
    }

    fn dispatch(
        &self,
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
    ) -> Result<Answer, TransportError> {
        let resolved = self
            .inner
            .origin
            .resolve(url)
            .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
        let url = resolved.to_string();
        let key = (method.to_uppercase(), route_path(resolved));

        self.inner.requests.lock().push(RecordedRequest {
            method: key.0.clone(),
            url: url.clone(),
            headers,
            body,
        });

        let route = self.inner.routes.read().get(&key).cloned();
        let response = match route {
            Some(response) => response,
            None => {
                trace!(url = %url, "No static route, answering 404");
                StaticResponse::new(404, Bytes::new())
            }
        };

        if let Some(ref failure) = response.failure {
            return Err(failure.clone());
        }

        let url = match response.redirect {
            Some(ref target) => self.normalize(target),
            None => url,
        };
        Ok(Answer { url, response })
    }
}

/// Route key of a URL: everything but query and fragment.
fn route_path(mut url: Url) -> String {
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

impl LegacyTransport for StaticTransport {
    fn open(&self, method: &str, url: &str) -> Result<Box<dyn LegacyCall>, TransportError> {
        if self.inner.origin.resolve(url).is_none() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        Ok(Box::new(StaticCall {
            transport: self.clone(),
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            kind: ResponseKind::default(),
        }))
    }
}

#[async_trait]
impl FetchTransport for StaticTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        let Answer { url, response } =
            self.dispatch(&request.method, &request.url, request.headers, request.body)?;

        Ok(FetchResponse {
            url,
            status: response.status,
            headers: response.header_map(),
            status_text: response.status_text,
            body: response.body,
        })
    }
}

/// One opened call on a [`StaticTransport`].
struct StaticCall {
    transport: StaticTransport,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    kind: ResponseKind,
}

impl LegacyCall for StaticCall {
    fn set_request_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn set_response_type(&mut self, kind: ResponseKind) {
        self.kind = kind;
    }

    fn send(self: Box<Self>, body: Option<Bytes>, mut on_ready: ReadyHandler) {
        let StaticCall {
            transport,
            method,
            url,
            headers,
            kind,
        } = *self;

        tokio::spawn(async move {
            on_ready(ReadyEvent::Progress(ReadyState::Opened));

            let Answer { url, response } = match transport.dispatch(&method, &url, headers, body)
            {
                Ok(answer) => answer,
                Err(e) => {
                    on_ready(ReadyEvent::Failed(e));
                    return;
                }
            };

            on_ready(ReadyEvent::Progress(ReadyState::HeadersReceived));
            on_ready(ReadyEvent::Progress(ReadyState::Loading));

            let view = ResponseView::from_bytes(
                response.status,
                response.status_text.as_str(),
                kind,
                response.content_type(),
                &response.body,
            );
            on_ready(ReadyEvent::Done(Completion::new(
                url,
                response.header_map(),
                view,
            )));
        });
    }
}
