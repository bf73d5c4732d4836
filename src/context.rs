//! Per-call state and variable interpolation.

use crate::hook::RequestInfo;
use crate::response::ResponseKind;
use bytes::Bytes;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Regex for matching variable expressions like ${...}
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Transient record of one legacy call.
///
/// Owned by the adapter handling the call and dropped once the call completes
/// or is superseded.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Target URL as given to `open` (possibly origin-relative)
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Request body
    pub body: Option<Bytes>,
    /// Headers set so far
    pub headers: CapturedHeaders,
    /// Body kind the caller asked for
    pub response_kind: ResponseKind,
}

impl CallContext {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            body: None,
            headers: CapturedHeaders::default(),
            response_kind: ResponseKind::default(),
        }
    }

    /// Request view handed to hooks.
    pub fn request_info(&self, absolute_url: String) -> RequestInfo {
        RequestInfo::new(absolute_url, self.body.clone())
    }
}

/// Request headers keyed case-insensitively, remembering the first spelling
/// of each name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedHeaders {
    entries: Vec<(String, String)>,
}

impl CapturedHeaders {
    /// Record a header. Repeated names are combined with `", "`.
    pub fn record(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Get a header value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Headers to re-apply after the call is re-opened. `content-length` is
    /// left out because the body may have changed.
    pub fn replay(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("content-length"))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve a variable expression against a request.
///
/// Supports:
/// - `${request.url}` - Full request URL
/// - `${request.scheme}` - URL scheme
/// - `${request.host}` - Host (with port when not default)
/// - `${request.path}` - Path
/// - `${request.query}` - Query string
/// - `${request.query_param.name}` - First value of a query parameter
/// - `${request.body}` - Request body text
pub fn resolve(request: &RequestInfo, expr: &str) -> Option<String> {
    let path = expr.strip_prefix("request.")?;
    let parts: Vec<&str> = path.splitn(2, '.').collect();

    if parts[0] == "url" {
        return Some(request.url.clone());
    }
    if parts[0] == "body" {
        return request.data_text().map(|text| text.into_owned());
    }

    let url = Url::parse(&request.url).ok()?;
    match parts[0] {
        "scheme" => Some(url.scheme().to_string()),
        "host" => {
            let host = url.host_str()?;
            Some(match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            })
        }
        "path" => Some(url.path().to_string()),
        "query" => url.query().map(str::to_string),
        "query_param" => {
            let name = parts.get(1)?;
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        }
        _ => None,
    }
}

/// Interpolate all ${...} variables in a string. Unknown variables become
/// empty.
pub fn interpolate(request: &RequestInfo, template: &str) -> String {
    VAR_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            resolve(request, &caps[1]).unwrap_or_default()
        })
        .to_string()
}

/// Get status text for a status code.
pub fn status_text(code: u16) -> String {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request() -> RequestInfo {
        RequestInfo::new(
            "https://app.example.com:8443/api/users?page=1&sort=name",
            Some(Bytes::from_static(b"{\"id\":7}")),
        )
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = CapturedHeaders::default();
        headers.record("X-Token", "abc");
        headers.record("x-token", "def");
        headers.record("Accept", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-TOKEN"), Some("abc, def"));

        let replayed: Vec<_> = headers.replay().collect();
        assert_eq!(replayed[0], ("X-Token", "abc, def"));
    }

    #[test]
    fn test_replay_skips_content_length() {
        let mut headers = CapturedHeaders::default();
        headers.record("Content-Type", "application/json");
        headers.record("Content-Length", "12");
        headers.record("X-Trace", "t-1");

        let replayed: Vec<_> = headers.replay().collect();
        assert_eq!(
            replayed,
            vec![("Content-Type", "application/json"), ("X-Trace", "t-1")]
        );
    }

    #[test]
    fn test_resolve_request() {
        let request = make_request();

        assert_eq!(resolve(&request, "request.scheme"), Some("https".to_string()));
        assert_eq!(
            resolve(&request, "request.host"),
            Some("app.example.com:8443".to_string())
        );
        assert_eq!(resolve(&request, "request.path"), Some("/api/users".to_string()));
        assert_eq!(
            resolve(&request, "request.query"),
            Some("page=1&sort=name".to_string())
        );
        assert_eq!(
            resolve(&request, "request.query_param.sort"),
            Some("name".to_string())
        );
        assert_eq!(
            resolve(&request, "request.body"),
            Some("{\"id\":7}".to_string())
        );
        assert_eq!(resolve(&request, "response.status"), None);
    }

    #[test]
    fn test_interpolate() {
        let request = make_request();

        let result = interpolate(&request, "/mirror${request.path}?from=${request.host}");
        assert_eq!(result, "/mirror/api/users?from=app.example.com:8443");

        let result = interpolate(&request, "x${unknown}y");
        assert_eq!(result, "xy");
    }
}
