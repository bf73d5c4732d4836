//! Pre-response redirection to a superseding call.

use crate::config::RedirectConfig;
use crate::context::interpolate;
use crate::hook::{PreResponse, PreResponseDecision, Replacement, RequestInfo, ResponseData};
use async_trait::async_trait;
use bytes::Bytes;

/// Pre-response hook that always replaces the response with a second call.
pub struct Redirect {
    uri: Option<String>,
    data: Option<String>,
}

impl Redirect {
    pub fn new(config: &RedirectConfig) -> Self {
        Self {
            uri: config.uri.clone(),
            data: config.data.clone(),
        }
    }
}

#[async_trait]
impl PreResponse for Redirect {
    async fn pre_response(
        &self,
        _data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<PreResponseDecision> {
        Ok(PreResponseDecision::Replace(Replacement {
            uri: self.uri.as_ref().map(|uri| interpolate(&request, uri)),
            data: self
                .data
                .as_ref()
                .map(|data| Bytes::from(interpolate(&request, data))),
        }))
    }
}
