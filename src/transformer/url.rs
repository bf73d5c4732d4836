//! Pre-send URL and body rewriting.

use crate::config::BeforeSendConfig;
use crate::context::interpolate;
use crate::hook::{BeforeSend, RequestInfo, RequestOverride};
use async_trait::async_trait;
use bytes::Bytes;

/// Pre-send hook that replaces the outgoing URL and/or body.
pub struct RequestRewriter {
    /// New URL pattern with variable placeholders
    url: Option<String>,
    /// New body pattern with variable placeholders
    data: Option<String>,
}

impl RequestRewriter {
    /// Create a new rewriter from configuration.
    pub fn new(config: &BeforeSendConfig) -> Self {
        Self {
            url: config.url.clone(),
            data: config.data.clone(),
        }
    }
}

#[async_trait]
impl BeforeSend for RequestRewriter {
    async fn before_send(&self, request: RequestInfo) -> anyhow::Result<Option<RequestOverride>> {
        let overrides = RequestOverride {
            url: self.url.as_ref().map(|url| interpolate(&request, url)),
            data: self
                .data
                .as_ref()
                .map(|data| Bytes::from(interpolate(&request, data))),
        };

        Ok((!overrides.is_empty()).then_some(overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request() -> RequestInfo {
        RequestInfo::new(
            "https://app.example.com/api/v1/users?page=2",
            Some(Bytes::from_static(b"{\"q\":1}")),
        )
    }

    #[tokio::test]
    async fn test_rewrite_url_with_variables() {
        let rewriter = RequestRewriter::new(&BeforeSendConfig {
            url: Some("/api/v2/users?page=${request.query_param.page}".to_string()),
            data: None,
        });

        let result = rewriter.before_send(make_request()).await.unwrap().unwrap();
        assert_eq!(result.url.as_deref(), Some("/api/v2/users?page=2"));
        assert_eq!(result.data, None);
    }

    #[tokio::test]
    async fn test_rewrite_body() {
        let rewriter = RequestRewriter::new(&BeforeSendConfig {
            url: None,
            data: Some("{\"wrapped\":${request.body}}".to_string()),
        });

        let result = rewriter.before_send(make_request()).await.unwrap().unwrap();
        assert_eq!(result.url, None);
        assert_eq!(
            result.data,
            Some(Bytes::from_static(b"{\"wrapped\":{\"q\":1}}"))
        );
    }

    #[tokio::test]
    async fn test_empty_config_is_noop() {
        let rewriter = RequestRewriter::new(&BeforeSendConfig::default());
        assert!(rewriter.before_send(make_request()).await.unwrap().is_none());
    }
}
