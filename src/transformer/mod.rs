//! Declarative hooks built from rule configuration.

mod json;
mod redirect;
mod url;

pub use json::JsonTransformer;
pub use redirect::Redirect;
pub use url::RequestRewriter;

use crate::hook::{Observe, PostResponse, RequestInfo, ResponseData};
use async_trait::async_trait;
use tracing::info;

/// Primary hook that logs every observed body.
pub struct LogObserver {
    rule: String,
}

impl LogObserver {
    pub fn new(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
        }
    }
}

#[async_trait]
impl Observe for LogObserver {
    async fn observe(&self, data: ResponseData) -> anyhow::Result<()> {
        info!(rule = %self.rule, body = %data, "Observed response");
        Ok(())
    }
}

/// Post-response hook that replaces the body with fixed text.
pub struct ReplaceBody {
    text: String,
}

impl ReplaceBody {
    pub fn new(text: String) -> Self {
        Self { text }
    }
}

#[async_trait]
impl PostResponse for ReplaceBody {
    async fn post_response(
        &self,
        _data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<ResponseData> {
        Ok(ResponseData::String(crate::context::interpolate(
            &request, &self.text,
        )))
    }
}

/// Errors that can occur while transforming a body.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("JSON path error: {0}")]
    JsonPath(String),

    #[error("Response body is not JSON")]
    NotJson,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_body_interpolates() {
        let hook = ReplaceBody::new("mocked ${request.path}".to_string());
        let request = RequestInfo::new("https://app.example.com/api/x?y=1", None);

        let result = hook
            .post_response(serde_json::json!({"v": 1}), request)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("mocked /api/x"));
    }

    #[tokio::test]
    async fn test_log_observer() {
        let hook = LogObserver::new("observe");
        assert!(hook.observe(serde_json::json!({"v": 1})).await.is_ok());
    }
}
