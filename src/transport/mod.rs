//! Transport contracts the interception layer wraps.
//!
//! Two transports are covered:
//!
//! - **Legacy**: callback based. A call is opened, headers are set one by one,
//!   and `send` hands over a ready handler that receives progress, completion
//!   and failure events.
//! - **Fetch**: a single async call taking a request value and yielding a
//!   buffered response value.
//!
//! Page code reaches both through [`TransportSlot`]s, the replaceable live
//! entry points that an interception session swaps out and restores.

mod memory;

pub use memory::{RecordedRequest, StaticResponse, StaticTransport};

use crate::hook::{HookStage, ResponseData};
use crate::response::{ResponseBody, ResponseKind, ResponseView};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Intermediate ready states of a legacy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Opened,
    HeadersReceived,
    Loading,
}

/// Event delivered to a legacy call's ready handler.
#[derive(Debug)]
pub enum ReadyEvent {
    /// Non-terminal state change
    Progress(ReadyState),
    /// Terminal state; the call produced a response (of any status)
    Done(Completion),
    /// Terminal state; the call failed without a response
    Failed(TransportError),
}

/// Completion-notification slot of a legacy call.
pub type ReadyHandler = Box<dyn FnMut(ReadyEvent) + Send + 'static>;

/// Caller-visible result of a finished legacy call.
///
/// All observable fields are read through accessors backed by a
/// [`ResponseView`], so an interception session can substitute them.
#[derive(Debug, Clone)]
pub struct Completion {
    url: String,
    headers: HashMap<String, Vec<String>>,
    view: ResponseView,
}

impl Completion {
    /// Build a completion. Header names are lowercased.
    pub fn new(
        url: impl Into<String>,
        headers: HashMap<String, Vec<String>>,
        view: ResponseView,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            url: url.into(),
            headers,
            view,
        }
    }

    /// Final response URL (after redirects).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.view.status
    }

    pub fn status_text(&self) -> &str {
        &self.view.status_text
    }

    pub fn response_type(&self) -> ResponseKind {
        self.view.kind
    }

    pub fn response(&self) -> &ResponseBody {
        &self.view.body
    }

    pub fn response_text(&self) -> &str {
        &self.view.text
    }

    pub fn response_xml(&self) -> Option<&str> {
        self.view.xml.as_deref()
    }

    /// Get a single response header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Response data as hooks see it.
    pub fn data(&self) -> ResponseData {
        self.view.data()
    }

    pub(crate) fn view(&self) -> &ResponseView {
        &self.view
    }

    pub(crate) fn with_view(mut self, view: ResponseView) -> Self {
        self.view = view;
        self
    }
}

/// Callback-based transport: the call-initiation entry point.
pub trait LegacyTransport: Send + Sync {
    /// Initiate a call.
    fn open(&self, method: &str, url: &str) -> Result<Box<dyn LegacyCall>, TransportError>;
}

/// One opened legacy call.
pub trait LegacyCall: Send {
    /// Set a request header.
    fn set_request_header(&mut self, name: &str, value: &str);

    /// Choose how the response body is exposed.
    fn set_response_type(&mut self, kind: ResponseKind);

    /// Dispatch the call. Events are delivered to `on_ready`; the terminal
    /// event is either `Done` or `Failed`, and is delivered once.
    fn send(self: Box<Self>, body: Option<Bytes>, on_ready: ReadyHandler);
}

/// Request value of the fetch transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// `GET` request for a URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Buffered response value of the fetch transport. Cloning is cheap and the
/// body can be read any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Final response URL (after redirects)
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Response headers (lowercase names)
    pub headers: HashMap<String, Vec<String>>,
    pub body: Bytes,
}

impl FetchResponse {
    /// Get a single header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    pub fn ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Body as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// A new response with the same URL, status and headers and a different
    /// body.
    pub fn with_body(&self, body: impl Into<Bytes>) -> Self {
        Self {
            url: self.url.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: body.into(),
        }
    }
}

/// Promise-based transport: a single call-and-await entry point.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError>;
}

/// Replaceable live entry point of a transport.
pub struct TransportSlot<T: ?Sized> {
    current: RwLock<Arc<T>>,
}

impl<T: ?Sized> TransportSlot<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            current: RwLock::new(transport),
        }
    }

    /// The entry point currently in place.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Put a new entry point in place, returning the previous one.
    pub fn replace(&self, transport: Arc<T>) -> Arc<T> {
        std::mem::replace(&mut *self.current.write(), transport)
    }

    /// Whether the slot currently holds exactly this transport.
    pub fn holds(&self, transport: &Arc<T>) -> bool {
        Arc::ptr_eq(&self.current.read(), transport)
    }
}

/// Transport failures, as seen by the caller of an intercepted call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request aborted")]
    Aborted,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{stage} hook failed: {message}")]
    Hook { stage: HookStage, message: String },
}

impl TransportError {
    pub(crate) fn hook(stage: HookStage, error: anyhow::Error) -> Self {
        Self::Hook {
            stage,
            message: format!("{:#}", error),
        }
    }
}
