//! Hook contracts for the four interception stages.
//!
//! Every hook is async. Closures returning a future implement the hook traits
//! directly, so most rules are written as
//! `rule.on_post_response(|data, _req| async move { Ok(data) })`.

use async_trait::async_trait;
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;

/// Response data handed to hooks: the parsed JSON body, or the raw text as a
/// JSON string when the body is not JSON.
pub type ResponseData = serde_json::Value;

/// Outgoing request as seen by hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Absolute request URL
    pub url: String,
    /// Request body
    pub data: Option<Bytes>,
}

impl RequestInfo {
    pub fn new(url: impl Into<String>, data: Option<Bytes>) -> Self {
        Self {
            url: url.into(),
            data,
        }
    }

    /// Request body as text (lossy).
    pub fn data_text(&self) -> Option<Cow<'_, str>> {
        self.data.as_deref().map(String::from_utf8_lossy)
    }
}

/// Overrides returned by a pre-send hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverride {
    /// Replacement request URL
    pub url: Option<String>,
    /// Replacement request body
    pub data: Option<Bytes>,
}

impl RequestOverride {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            data: None,
        }
    }

    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            data: Some(data.into()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.data.is_none()
    }
}

/// Decision of a pre-response hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreResponseDecision {
    /// Keep the response; later stages run as usual
    Accept,
    /// Discard the response and answer the caller with a second call
    Replace(Replacement),
}

/// Target of a superseding call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacement {
    /// URL of the second call (the original request URL when absent)
    pub uri: Option<String>,
    /// Body of the second call
    pub data: Option<Bytes>,
}

impl Replacement {
    pub fn to(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Pipeline stage a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeSend,
    PreResponse,
    Observe,
    PostResponse,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeforeSend => "before_send",
            Self::PreResponse => "pre_response",
            Self::Observe => "observe",
            Self::PostResponse => "post_response",
        })
    }
}

/// Pre-send hook: may replace the outgoing URL and/or body.
#[async_trait]
pub trait BeforeSend: Send + Sync {
    async fn before_send(&self, request: RequestInfo) -> anyhow::Result<Option<RequestOverride>>;
}

/// Primary observation hook. Its result is ignored.
#[async_trait]
pub trait Observe: Send + Sync {
    async fn observe(&self, data: ResponseData) -> anyhow::Result<()>;
}

/// Pre-response hook: accepts the response or redirects the call.
#[async_trait]
pub trait PreResponse: Send + Sync {
    async fn pre_response(
        &self,
        data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<PreResponseDecision>;
}

/// Post-response hook: its return value becomes the visible response body.
#[async_trait]
pub trait PostResponse: Send + Sync {
    async fn post_response(
        &self,
        data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<ResponseData>;
}

#[async_trait]
impl<F, Fut> BeforeSend for F
where
    F: Fn(RequestInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<RequestOverride>>> + Send + 'static,
{
    async fn before_send(&self, request: RequestInfo) -> anyhow::Result<Option<RequestOverride>> {
        (self)(request).await
    }
}

#[async_trait]
impl<F, Fut> Observe for F
where
    F: Fn(ResponseData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn observe(&self, data: ResponseData) -> anyhow::Result<()> {
        (self)(data).await
    }
}

#[async_trait]
impl<F, Fut> PreResponse for F
where
    F: Fn(ResponseData, RequestInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<PreResponseDecision>> + Send + 'static,
{
    async fn pre_response(
        &self,
        data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<PreResponseDecision> {
        (self)(data, request).await
    }
}

#[async_trait]
impl<F, Fut> PostResponse for F
where
    F: Fn(ResponseData, RequestInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ResponseData>> + Send + 'static,
{
    async fn post_response(
        &self,
        data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<ResponseData> {
        (self)(data, request).await
    }
}
