//! Page origin used to resolve origin-relative URLs.

use super::MatcherError;
use url::Url;

/// Origin of the page whose calls are intercepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin(Url);

impl PageOrigin {
    /// Parse an origin such as `https://app.example.com`.
    pub fn parse(origin: &str) -> Result<Self, MatcherError> {
        Url::parse(origin)
            .map(Self)
            .map_err(|source| MatcherError::InvalidOrigin {
                origin: origin.to_string(),
                source,
            })
    }

    /// Resolve a URL, joining leading-`/` paths onto the origin.
    ///
    /// Returns `None` when the result is not a valid absolute URL.
    pub fn resolve(&self, raw: &str) -> Option<Url> {
        if raw.starts_with('/') {
            self.0.join(raw).ok()
        } else {
            Url::parse(raw).ok()
        }
    }

    /// Absolute form of a call URL, or the input unchanged when it cannot be
    /// resolved.
    pub fn absolutize(&self, raw: &str) -> String {
        if raw.starts_with('/') {
            self.resolve(raw)
                .map(String::from)
                .unwrap_or_else(|| raw.to_string())
        } else {
            raw.to_string()
        }
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl Default for PageOrigin {
    fn default() -> Self {
        Self(Url::parse("http://localhost").expect("static origin is valid"))
    }
}
