//! Stage runners shared by both transport adapters.
//!
//! Each runner invokes one hook of a matched rule and turns a hook failure
//! into a [`TransportError::Hook`], logged once here.

use crate::hook::{HookStage, PreResponseDecision, RequestInfo, RequestOverride, ResponseData};
use crate::rule::InterceptionRule;
use crate::transport::TransportError;
use tracing::{trace, warn};

fn hook_failed(rule: &InterceptionRule, stage: HookStage, error: anyhow::Error) -> TransportError {
    let error = TransportError::hook(stage, error);
    warn!(rule = %rule.name, stage = %stage, error = %error, "Interception hook failed");
    error
}

/// Run the pre-send hook. `None` when the rule has none or it changed nothing.
pub(crate) async fn before_send(
    rule: &InterceptionRule,
    request: RequestInfo,
) -> Result<Option<RequestOverride>, TransportError> {
    let Some(ref hook) = rule.before_send else {
        return Ok(None);
    };

    let overrides = hook
        .before_send(request)
        .await
        .map_err(|e| hook_failed(rule, HookStage::BeforeSend, e))?;

    Ok(overrides.filter(|o| !o.is_empty()))
}

/// Run the pre-response hook. Rules without one accept every response.
pub(crate) async fn pre_response(
    rule: &InterceptionRule,
    data: ResponseData,
    request: RequestInfo,
) -> Result<PreResponseDecision, TransportError> {
    let Some(ref hook) = rule.pre_response else {
        return Ok(PreResponseDecision::Accept);
    };

    hook.pre_response(data, request)
        .await
        .map_err(|e| hook_failed(rule, HookStage::PreResponse, e))
}

/// Run the primary observation hook. Its result is discarded, so a failure
/// is logged and the call carries on.
pub(crate) async fn observe(rule: &InterceptionRule, data: &ResponseData) {
    let Some(ref hook) = rule.observe else {
        return;
    };

    trace!(rule = %rule.name, "Running primary hook");
    if let Err(e) = hook.observe(data.clone()).await {
        hook_failed(rule, HookStage::Observe, e);
    }
}

/// Run the post-response hook. `None` when the rule has none.
pub(crate) async fn post_response(
    rule: &InterceptionRule,
    data: ResponseData,
    request: RequestInfo,
) -> Result<Option<ResponseData>, TransportError> {
    let Some(ref hook) = rule.post_response else {
        return Ok(None);
    };

    hook.post_response(data, request)
        .await
        .map(Some)
        .map_err(|e| hook_failed(rule, HookStage::PostResponse, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> RequestInfo {
        RequestInfo::new("https://app.example.com/api/x", None)
    }

    #[tokio::test]
    async fn test_rule_without_hooks_is_inert() {
        let rule = InterceptionRule::new("/api/x", "GET");

        assert_eq!(before_send(&rule, request()).await.unwrap(), None);
        assert_eq!(
            pre_response(&rule, json!(null), request()).await.unwrap(),
            PreResponseDecision::Accept
        );
        observe(&rule, &json!(null)).await;
        assert_eq!(
            post_response(&rule, json!({"v": 1}), request()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_empty_override_is_dropped() {
        let rule = InterceptionRule::new("/api/x", "GET")
            .on_before_send(|_req| async { Ok(Some(RequestOverride::default())) });

        assert_eq!(before_send(&rule, request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hook_error_maps_to_transport_error() {
        let rule = InterceptionRule::new("/api/x", "GET").on_post_response(|_data, _req| async {
            Err(anyhow::anyhow!("boom"))
        });

        let err = post_response(&rule, json!({}), request()).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Hook {
                stage: HookStage::PostResponse,
                message: "boom".to_string(),
            }
        );
    }
}
