//! Interception rules and the ordered rule registry.

use crate::config::{RuleConfig, TargetType};
use crate::hook::{
    BeforeSend, Observe, PostResponse, PreResponse, PreResponseDecision, RequestInfo,
    RequestOverride, ResponseData,
};
use crate::matcher::{self, MatcherError, PageOrigin, UrlTarget};
use crate::transformer::{JsonTransformer, LogObserver, Redirect, ReplaceBody, RequestRewriter};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A URL/method target plus up to four stage hooks.
#[derive(Clone)]
pub struct InterceptionRule {
    /// Rule name (for logging)
    pub name: String,
    /// Target URL
    pub target: UrlTarget,
    /// Target HTTP method (case-insensitive)
    pub method: String,
    pub(crate) before_send: Option<Arc<dyn BeforeSend>>,
    pub(crate) observe: Option<Arc<dyn Observe>>,
    pub(crate) pre_response: Option<Arc<dyn PreResponse>>,
    pub(crate) post_response: Option<Arc<dyn PostResponse>>,
}

impl InterceptionRule {
    /// Create a rule without hooks.
    pub fn new(target: impl Into<UrlTarget>, method: impl Into<String>) -> Self {
        let target = target.into();
        let method = method.into();
        Self {
            name: format!("{} {}", method.to_uppercase(), target),
            target,
            method,
            before_send: None,
            observe: None,
            pre_response: None,
            post_response: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a pre-send hook.
    pub fn on_before_send<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(RequestInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<RequestOverride>>> + Send + 'static,
    {
        self.with_before_send(Arc::new(hook))
    }

    /// Attach a primary observation hook.
    pub fn on_primary<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(ResponseData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_observe(Arc::new(hook))
    }

    /// Attach a pre-response hook.
    pub fn on_pre_response<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(ResponseData, RequestInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PreResponseDecision>> + Send + 'static,
    {
        self.with_pre_response(Arc::new(hook))
    }

    /// Attach a post-response hook.
    pub fn on_post_response<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(ResponseData, RequestInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ResponseData>> + Send + 'static,
    {
        self.with_post_response(Arc::new(hook))
    }

    pub fn with_before_send(mut self, hook: Arc<dyn BeforeSend>) -> Self {
        self.before_send = Some(hook);
        self
    }

    pub fn with_observe(mut self, hook: Arc<dyn Observe>) -> Self {
        self.observe = Some(hook);
        self
    }

    pub fn with_pre_response(mut self, hook: Arc<dyn PreResponse>) -> Self {
        self.pre_response = Some(hook);
        self
    }

    pub fn with_post_response(mut self, hook: Arc<dyn PostResponse>) -> Self {
        self.post_response = Some(hook);
        self
    }

    /// Compile a rule from configuration.
    pub fn from_config(config: &RuleConfig) -> Result<Self, RuleError> {
        if config.target.url.is_empty() {
            return Err(RuleError::EmptyTarget(config.name.clone()));
        }
        if config.method.is_empty() || !config.method.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RuleError::InvalidMethod {
                rule: config.name.clone(),
                method: config.method.clone(),
            });
        }
        if let Some(ref post_response) = config.post_response {
            if post_response.json.is_some() && post_response.replace.is_some() {
                return Err(RuleError::ConflictingPostResponse(config.name.clone()));
            }
        }

        let target = match config.target.target_type {
            TargetType::Exact => UrlTarget::from(config.target.url.as_str()),
            TargetType::Regex => {
                UrlTarget::regex(&config.target.url).map_err(|source| RuleError::Matcher {
                    rule: config.name.clone(),
                    source,
                })?
            }
        };

        let mut rule = Self::new(target, config.method.as_str()).with_name(config.name.as_str());

        if let Some(ref before_send) = config.before_send {
            rule = rule.with_before_send(Arc::new(RequestRewriter::new(before_send)));
        }
        if let Some(ref observe) = config.observe {
            if observe.log {
                rule = rule.with_observe(Arc::new(LogObserver::new(&config.name)));
            }
        }
        if let Some(ref pre_response) = config.pre_response {
            rule = rule.with_pre_response(Arc::new(Redirect::new(&pre_response.redirect)));
        }
        if let Some(ref post_response) = config.post_response {
            if let Some(ref json) = post_response.json {
                rule = rule.with_post_response(Arc::new(JsonTransformer::new(json)));
            } else if let Some(ref text) = post_response.replace {
                rule = rule.with_post_response(Arc::new(ReplaceBody::new(text.clone())));
            }
        }

        Ok(rule)
    }

    /// Check whether this rule addresses a call.
    pub fn matches(&self, url: &str, method: Option<&str>, origin: &PageOrigin) -> bool {
        matcher::matches(url, method, &self.target, &self.method, origin)
    }

    /// Identity used for duplicate suppression.
    pub fn same_identity(&self, other: &InterceptionRule) -> bool {
        self.target.same_target(&other.target) && self.method == other.method
    }

    pub fn has_before_send(&self) -> bool {
        self.before_send.is_some()
    }

    /// Whether any stage after the response arrives has a hook.
    pub fn has_response_hooks(&self) -> bool {
        self.pre_response.is_some() || self.observe.is_some() || self.post_response.is_some()
    }
}

impl fmt::Debug for InterceptionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionRule")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("method", &self.method)
            .field("before_send", &self.before_send.is_some())
            .field("observe", &self.observe.is_some())
            .field("pre_response", &self.pre_response.is_some())
            .field("post_response", &self.post_response.is_some())
            .finish()
    }
}

/// One rule or a list of rules, as accepted by `register`.
#[derive(Debug, Clone, Default)]
pub struct RuleBatch(Vec<InterceptionRule>);

impl RuleBatch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<InterceptionRule> for RuleBatch {
    fn from(rule: InterceptionRule) -> Self {
        Self(vec![rule])
    }
}

impl From<Vec<InterceptionRule>> for RuleBatch {
    fn from(rules: Vec<InterceptionRule>) -> Self {
        Self(rules)
    }
}

impl<const N: usize> From<[InterceptionRule; N]> for RuleBatch {
    fn from(rules: [InterceptionRule; N]) -> Self {
        Self(rules.into())
    }
}

impl FromIterator<InterceptionRule> for RuleBatch {
    fn from_iter<I: IntoIterator<Item = InterceptionRule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered collection of rules shared by every intercepted call.
///
/// Registration order is the tie-break order: the first matching rule wins.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: RwLock<Arc<Vec<Arc<InterceptionRule>>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rules, skipping any whose target and method duplicate an
    /// existing rule. Returns the number of rules inserted.
    pub fn register(&self, batch: impl Into<RuleBatch>) -> usize {
        let RuleBatch(batch) = batch.into();
        let mut guard = self.rules.write();
        let rules = Arc::make_mut(&mut guard);
        let before = rules.len();

        for rule in batch {
            if rules.iter().any(|existing| existing.same_identity(&rule)) {
                tracing::trace!(rule = %rule.name, "Skipping duplicate rule");
                continue;
            }
            rules.push(Arc::new(rule));
        }

        rules.len() - before
    }

    /// Snapshot of the registered rules in registration order.
    pub fn all(&self) -> Rules {
        Rules(Arc::clone(&self.rules.read()))
    }

    /// First rule matching a call, if any.
    pub fn first_match(
        &self,
        url: &str,
        method: Option<&str>,
        origin: &PageOrigin,
    ) -> Option<Arc<InterceptionRule>> {
        self.all()
            .iter()
            .find(|rule| rule.matches(url, method, origin))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

/// Immutable, restartable view of the registry.
#[derive(Debug, Clone)]
pub struct Rules(Arc<Vec<Arc<InterceptionRule>>>);

impl Rules {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<InterceptionRule>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Rules {
    type Item = &'a Arc<InterceptionRule>;
    type IntoIter = std::slice::Iter<'a, Arc<InterceptionRule>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Errors that can occur while compiling rules from configuration.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule '{0}' has an empty target URL")]
    EmptyTarget(String),

    #[error("Rule '{rule}' has an invalid method '{method}'")]
    InvalidMethod { rule: String, method: String },

    #[error("Rule '{0}' sets both json and replace in post_response")]
    ConflictingPostResponse(String),

    #[error("Rule '{rule}': {source}")]
    Matcher {
        rule: String,
        #[source]
        source: MatcherError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JsonOperation, JsonTransform, PostResponseConfig, TargetConfig};

    fn origin() -> PageOrigin {
        PageOrigin::parse("https://app.example.com").unwrap()
    }

    #[test]
    fn test_duplicate_literal_suppressed() {
        let registry = RuleRegistry::new();
        let inserted = registry.register(vec![
            InterceptionRule::new("/api/x", "GET"),
            InterceptionRule::new("/api/x", "GET").with_name("second"),
        ]);

        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all().iter().next().unwrap().name, "GET /api/x");

        assert_eq!(registry.register(InterceptionRule::new("/api/x", "GET")), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_url_different_method_kept() {
        let registry = RuleRegistry::new();
        registry.register([
            InterceptionRule::new("/api/x", "GET"),
            InterceptionRule::new("/api/x", "POST"),
        ]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_patterns_deduplicated_by_reference() {
        let registry = RuleRegistry::new();
        let shared = UrlTarget::regex("^/api").unwrap();

        registry.register(InterceptionRule::new(shared.clone(), "GET"));
        registry.register(InterceptionRule::new(shared, "GET"));
        assert_eq!(registry.len(), 1);

        registry.register(InterceptionRule::new(UrlTarget::regex("^/api").unwrap(), "GET"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_first_match_in_registration_order() {
        let registry = RuleRegistry::new();
        registry.register([
            InterceptionRule::new(UrlTarget::regex("/api/").unwrap(), "GET").with_name("broad"),
            InterceptionRule::new("/api/x", "GET").with_name("exact"),
        ]);

        let rule = registry
            .first_match("https://app.example.com/api/x", Some("GET"), &origin())
            .unwrap();
        assert_eq!(rule.name, "broad");

        assert!(registry
            .first_match("https://app.example.com/other", Some("GET"), &origin())
            .is_none());
    }

    #[test]
    fn test_snapshot_is_restartable() {
        let registry = RuleRegistry::new();
        registry.register([
            InterceptionRule::new("/a", "GET"),
            InterceptionRule::new("/b", "GET"),
        ]);

        let rules = registry.all();
        registry.register(InterceptionRule::new("/c", "GET"));

        let first: Vec<_> = rules.iter().map(|r| r.name.clone()).collect();
        let second: Vec<_> = (&rules).into_iter().map(|r| r.name.clone()).collect();
        assert_eq!(first, vec!["GET /a", "GET /b"]);
        assert_eq!(first, second);
        assert_eq!(registry.all().len(), 3);
    }

    #[test]
    fn test_from_config() {
        let config = RuleConfig {
            name: "tag-data".to_string(),
            description: String::new(),
            enabled: true,
            target: TargetConfig {
                url: "^/api/(data|items)$".to_string(),
                target_type: TargetType::Regex,
            },
            method: "get".to_string(),
            before_send: None,
            observe: None,
            pre_response: None,
            post_response: Some(PostResponseConfig {
                json: Some(JsonTransform {
                    operations: vec![JsonOperation::Delete(vec!["$.secret".to_string()])],
                }),
                replace: None,
            }),
        };

        let rule = InterceptionRule::from_config(&config).unwrap();
        assert_eq!(rule.name, "tag-data");
        assert!(rule.has_response_hooks());
        assert!(!rule.has_before_send());
        assert!(rule.matches("/api/items", Some("GET"), &origin()));
    }

    #[test]
    fn test_from_config_errors() {
        let mut config = RuleConfig {
            name: "bad".to_string(),
            description: String::new(),
            enabled: true,
            target: TargetConfig {
                url: "(".to_string(),
                target_type: TargetType::Regex,
            },
            method: "GET".to_string(),
            before_send: None,
            observe: None,
            pre_response: None,
            post_response: None,
        };
        assert!(matches!(
            InterceptionRule::from_config(&config),
            Err(RuleError::Matcher { .. })
        ));

        config.target.url = "/ok".to_string();
        config.method = "GE T".to_string();
        assert!(matches!(
            InterceptionRule::from_config(&config),
            Err(RuleError::InvalidMethod { .. })
        ));

        config.target.url = String::new();
        assert!(matches!(
            InterceptionRule::from_config(&config),
            Err(RuleError::EmptyTarget(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_json_with_replace() {
        let config = RuleConfig {
            name: "both".to_string(),
            description: String::new(),
            enabled: true,
            target: TargetConfig {
                url: "/api/data".to_string(),
                target_type: TargetType::Exact,
            },
            method: "GET".to_string(),
            before_send: None,
            observe: None,
            pre_response: None,
            post_response: Some(PostResponseConfig {
                json: Some(JsonTransform {
                    operations: vec![JsonOperation::Delete(vec!["$.secret".to_string()])],
                }),
                replace: Some("static".to_string()),
            }),
        };

        let err = InterceptionRule::from_config(&config).unwrap_err();
        assert!(matches!(err, RuleError::ConflictingPostResponse(ref name) if name == "both"));
        assert_eq!(
            err.to_string(),
            "Rule 'both' sets both json and replace in post_response"
        );
    }
}
