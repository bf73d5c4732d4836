//! Request/response interception for callback and promise style HTTP
//! transports.
//!
//! An interception session replaces the live entry points of both transports
//! with adapters that run every matching call through a pipeline of hooks:
//!
//! - Pre-send overrides of the request URL and body
//! - Pre-response redirection to a superseding call (legacy transport only)
//! - Primary observation of the response body
//! - Post-response rewriting of the body the caller sees
//!
//! Rules are matched by URL (exact scheme, host and path, or a regular
//! expression) and HTTP method; the first registered match wins.
//!
//! ## Configuration Example
//!
//! ```yaml
//! settings:
//!   origin: "https://app.example.com"
//! rules:
//!   - name: "tag-data"
//!     target: { url: "/api/data" }
//!     method: GET
//!     post_response:
//!       json:
//!         operations:
//!           - set: { path: "$.tag", value: 1 }
//! ```

pub mod adapter;
pub mod config;
pub mod context;
pub mod hook;
pub mod matcher;
mod pipeline;
pub mod response;
pub mod rule;
pub mod session;
pub mod transformer;
pub mod transport;

pub use config::InterceptConfig;
pub use hook::{PreResponseDecision, Replacement, RequestInfo, RequestOverride, ResponseData};
pub use matcher::{PageOrigin, UrlTarget};
pub use rule::{InterceptionRule, RuleError, RuleRegistry};
pub use session::{Host, InterceptError, Interceptor, Session};
pub use transport::{
    Completion, FetchRequest, FetchResponse, FetchTransport, LegacyCall, LegacyTransport,
    ReadyEvent, ReadyHandler, ReadyState, StaticResponse, StaticTransport, TransportError,
    TransportSlot,
};
