//! Configuration types for declarative interception rules.

use serde::{Deserialize, Serialize};

/// Annotated example configuration, as printed by `--example-config`.
pub const EXAMPLE_CONFIG: &str = r#"# Interception Configuration Example
version: "1"

settings:
  # Page origin used to resolve URLs that start with "/"
  origin: "https://app.example.com"
  # Statuses the legacy transport treats as a successful completion
  success_statuses: { min: 200, max: 299 }

rules:
  # Tag every data response
  - name: "tag-data"
    description: "Add a marker field to /api/data responses"
    target:
      url: "/api/data"
    method: GET
    post_response:
      json:
        operations:
          - set: { path: "$.tag", value: 1 }

  # Send v1 item calls to v2, keeping the query
  - name: "api-v1-upgrade"
    target:
      url: "^https://app\\.example\\.com/api/v1/items"
      type: regex
    method: POST
    before_send:
      url: "/api/v2/items?${request.query}"

  # Answer profile calls from a fallback endpoint
  - name: "profile-fallback"
    enabled: false
    target:
      url: "/api/profile"
    method: GET
    pre_response:
      redirect:
        uri: "/api/profile/cached"
    observe:
      log: true
"#;

/// Main configuration for an interception session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Interception rules (first match in this order wins)
    pub rules: Vec<RuleConfig>,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            rules: vec![],
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Page origin used to resolve URLs that start with `/`
    pub origin: String,
    /// Statuses the legacy transport treats as a successful completion
    pub success_statuses: StatusRange,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            success_statuses: StatusRange::default(),
        }
    }
}

/// Inclusive range of HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub fn contains(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl Default for StatusRange {
    fn default() -> Self {
        Self { min: 200, max: 299 }
    }
}

/// An interception rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name (for logging/debugging)
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    /// Whether the rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Target URL
    pub target: TargetConfig,
    /// HTTP method (case-insensitive)
    pub method: String,
    /// Pre-send overrides
    #[serde(default)]
    pub before_send: Option<BeforeSendConfig>,
    /// Primary observation
    #[serde(default)]
    pub observe: Option<ObserveConfig>,
    /// Pre-response redirection
    #[serde(default)]
    pub pre_response: Option<PreResponseConfig>,
    /// Post-response body rewriting
    #[serde(default)]
    pub post_response: Option<PostResponseConfig>,
}

fn default_true() -> bool {
    true
}

/// Rule target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// URL, origin-relative path, or regular expression
    pub url: String,
    /// Target type: exact or regex
    #[serde(default, rename = "type")]
    pub target_type: TargetType,
}

/// How a target URL is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Scheme, host and path equality
    #[default]
    Exact,
    /// Regular expression tested against the raw URL
    Regex,
}

/// Pre-send overrides. Both values support `${request.*}` variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BeforeSendConfig {
    /// Replacement URL
    #[serde(default)]
    pub url: Option<String>,
    /// Replacement body
    #[serde(default)]
    pub data: Option<String>,
}

/// Primary observation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObserveConfig {
    /// Log every observed response body
    #[serde(default)]
    pub log: bool,
}

/// Pre-response configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreResponseConfig {
    /// Call that supersedes the original response
    pub redirect: RedirectConfig,
}

/// Superseding call. Both values support `${request.*}` variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedirectConfig {
    /// URL of the second call (original URL when absent)
    #[serde(default)]
    pub uri: Option<String>,
    /// Body of the second call
    #[serde(default)]
    pub data: Option<String>,
}

/// Post-response configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostResponseConfig {
    /// JSON transformations
    #[serde(default)]
    pub json: Option<JsonTransform>,
    /// Replace with static content
    #[serde(default)]
    pub replace: Option<String>,
}

/// JSON body transformation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonTransform {
    /// List of operations to apply in order, each a single-key map such as
    /// `- set: { path: "$.tag", value: 1 }`
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub operations: Vec<JsonOperation>,
}

/// JSON transformation operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonOperation {
    /// Set a value at a JSON path
    Set {
        path: String,
        value: serde_json::Value,
    },
    /// Delete values at JSON paths
    Delete(Vec<String>),
    /// Rename a field
    Rename {
        from: String,
        to: String,
    },
    /// Wrap a value in an object with a key
    Wrap {
        path: String,
        key: String,
    },
    /// Merge additional fields into an object
    Merge {
        path: String,
        with: serde_json::Value,
    },
    /// Copy a value from one path to another
    Copy {
        from: String,
        to: String,
    },
    /// Move a value from one path to another
    Move {
        from: String,
        to: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InterceptConfig::default();
        assert_eq!(config.version, "1");
        assert!(config.rules.is_empty());
        assert_eq!(config.settings.origin, "http://localhost");
        assert!(config.settings.success_statuses.contains(204));
        assert!(!config.settings.success_statuses.contains(304));
    }

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
version: "1"
settings:
  origin: "https://app.example.com"
rules:
  - name: "tag-data"
    target:
      url: "/api/data"
    method: GET
    post_response:
      json:
        operations:
          - set: { path: "$.tag", value: 1 }
"#;
        let config: InterceptConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "tag-data");
        assert!(config.rules[0].enabled);
        assert_eq!(config.rules[0].target.target_type, TargetType::Exact);
        assert_eq!(config.settings.origin, "https://app.example.com");
    }

    #[test]
    fn test_json_operation_parsing() {
        let json = r#"{
            "operations": [
                {"set": {"path": "$.name", "value": "test"}},
                {"delete": ["$.internal", "$.debug"]},
                {"rename": {"from": "$.old_name", "to": "$.new_name"}},
                {"wrap": {"path": "$", "key": "data"}}
            ]
        }"#;
        let transform: JsonTransform = serde_json::from_str(json).unwrap();
        assert_eq!(transform.operations.len(), 4);
        assert!(matches!(transform.operations[1], JsonOperation::Delete(ref paths) if paths.len() == 2));
    }

    #[test]
    fn test_yaml_operations_map_form() {
        let yaml = r#"
operations:
  - set: { path: "$.tag", value: 1 }
  - delete: ["$.secret"]
  - rename: { from: "$.old", to: "$.new" }
  - merge: { path: "$", with: { source: "cache" } }
"#;
        let transform: JsonTransform = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transform.operations.len(), 4);
        assert!(matches!(
            transform.operations[0],
            JsonOperation::Set { ref path, ref value } if path == "$.tag" && *value == serde_json::json!(1)
        ));
        assert!(matches!(
            transform.operations[3],
            JsonOperation::Merge { ref with, .. } if *with == serde_json::json!({"source": "cache"})
        ));

        // Serialized operations load back from YAML
        let written = serde_yaml::to_string(&transform).unwrap();
        let reloaded: JsonTransform = serde_yaml::from_str(&written).unwrap();
        assert_eq!(reloaded.operations.len(), 4);
    }

    #[test]
    fn test_example_config_loads() {
        let config: InterceptConfig = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.settings.origin, "https://app.example.com");
        assert_eq!(config.rules[1].target.target_type, TargetType::Regex);
        assert!(!config.rules[2].enabled);

        let operations = &config.rules[0]
            .post_response
            .as_ref()
            .unwrap()
            .json
            .as_ref()
            .unwrap()
            .operations;
        assert_eq!(operations.len(), 1);
    }
}
