//! URL and method matching for interception rules.
//!
//! Matching is a pure function of the candidate call, the rule target and the
//! page origin. A literal target compares scheme, host (with port) and path of
//! both URLs after resolving leading-`/` paths against the origin; query and
//! fragment never participate. A pattern target is tested against the
//! candidate URL exactly as given.

mod origin;

pub use origin::PageOrigin;

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Target URL of an interception rule.
#[derive(Clone)]
pub enum UrlTarget {
    /// Absolute URL or origin-relative path
    Literal(String),
    /// Regular expression tested against the raw candidate URL
    Pattern(Arc<Regex>),
}

impl UrlTarget {
    /// Compile a pattern target from a regular expression source.
    pub fn regex(pattern: &str) -> Result<Self, MatcherError> {
        Ok(Self::Pattern(Arc::new(Regex::new(pattern)?)))
    }

    /// Check whether a candidate URL is addressed by this target.
    pub fn matches(&self, candidate: &str, origin: &PageOrigin) -> bool {
        match self {
            Self::Pattern(regex) => regex.is_match(candidate),
            Self::Literal(target) => {
                let (Some(candidate), Some(target)) =
                    (origin.resolve(candidate), origin.resolve(target))
                else {
                    return false;
                };

                candidate.scheme() == target.scheme()
                    && candidate.host_str() == target.host_str()
                    && candidate.port_or_known_default() == target.port_or_known_default()
                    && candidate.path() == target.path()
            }
        }
    }

    /// Identity used for duplicate suppression.
    ///
    /// Literals compare by value, patterns by reference: two separately
    /// compiled but identical expressions are distinct targets.
    pub fn same_target(&self, other: &UrlTarget) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for UrlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(url) => f.debug_tuple("Literal").field(url).finish(),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
        }
    }
}

impl fmt::Display for UrlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(url) => f.write_str(url),
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for UrlTarget {
    fn from(url: &str) -> Self {
        Self::Literal(url.to_string())
    }
}

impl From<String> for UrlTarget {
    fn from(url: String) -> Self {
        Self::Literal(url)
    }
}

impl From<Regex> for UrlTarget {
    fn from(regex: Regex) -> Self {
        Self::Pattern(Arc::new(regex))
    }
}

impl From<Arc<Regex>> for UrlTarget {
    fn from(regex: Arc<Regex>) -> Self {
        Self::Pattern(regex)
    }
}

/// Case-insensitive method comparison. A call without a method never matches.
pub fn method_matches(candidate: Option<&str>, target: &str) -> bool {
    candidate.is_some_and(|method| method.eq_ignore_ascii_case(target))
}

/// Full match of a call against a rule target and method.
pub fn matches(
    candidate_url: &str,
    candidate_method: Option<&str>,
    target: &UrlTarget,
    target_method: &str,
    origin: &PageOrigin,
) -> bool {
    method_matches(candidate_method, target_method) && target.matches(candidate_url, origin)
}

/// Errors that can occur while building matchers.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Invalid page origin '{origin}': {source}")]
    InvalidOrigin {
        origin: String,
        #[source]
        source: url::ParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> PageOrigin {
        PageOrigin::parse("https://app.example.com").unwrap()
    }

    #[test]
    fn test_literal_ignores_query_and_fragment() {
        let target = UrlTarget::from("https://app.example.com/api/users");
        assert!(target.matches("https://app.example.com/api/users?page=2#top", &origin()));
        assert!(!target.matches("https://app.example.com/api/users/1", &origin()));
    }

    #[test]
    fn test_relative_target_matches_absolute_candidate() {
        let target = UrlTarget::from("/api/x");
        assert!(target.matches("https://app.example.com/api/x", &origin()));

        let target = UrlTarget::from("https://app.example.com/api/x");
        assert!(target.matches("/api/x", &origin()));
    }

    #[test]
    fn test_literal_compares_scheme_and_host() {
        let target = UrlTarget::from("/api/x");
        assert!(!target.matches("http://app.example.com/api/x", &origin()));
        assert!(!target.matches("https://other.example.com/api/x", &origin()));
        assert!(!target.matches("https://app.example.com:8443/api/x", &origin()));
        assert!(target.matches("https://app.example.com:443/api/x", &origin()));
    }

    #[test]
    fn test_unparseable_urls_fail_closed() {
        let target = UrlTarget::from("/api/x");
        assert!(!target.matches("not a url", &origin()));

        let target = UrlTarget::from("::bad::");
        assert!(!target.matches("https://app.example.com/api/x", &origin()));
    }

    #[test]
    fn test_pattern_uses_raw_candidate() {
        let target = UrlTarget::regex(r"/api/v\d+/items$").unwrap();
        assert!(target.matches("https://app.example.com/api/v2/items", &origin()));
        assert!(target.matches("/api/v1/items", &origin()));
        assert!(!target.matches("/api/v1/items?x=1", &origin()));
    }

    #[test]
    fn test_method_matching() {
        assert!(method_matches(Some("get"), "GET"));
        assert!(method_matches(Some("POST"), "post"));
        assert!(!method_matches(Some("PUT"), "POST"));
        assert!(!method_matches(None, "GET"));
    }

    #[test]
    fn test_same_target_identity() {
        let a = UrlTarget::from("/api/x");
        let b = UrlTarget::from("/api/x".to_string());
        assert!(a.same_target(&b));

        let p1 = UrlTarget::regex("^/api").unwrap();
        let p2 = UrlTarget::regex("^/api").unwrap();
        assert!(!p1.same_target(&p2));
        assert!(p1.same_target(&p1.clone()));
        assert!(!a.same_target(&p1));
    }

    #[test]
    fn test_full_match() {
        let target = UrlTarget::from("/api/data");
        assert!(matches(
            "https://app.example.com/api/data",
            Some("get"),
            &target,
            "GET",
            &origin()
        ));
        assert!(!matches(
            "https://app.example.com/api/data",
            Some("DELETE"),
            &target,
            "GET",
            &origin()
        ));
    }
}
