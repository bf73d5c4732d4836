//! Transport adapters: wrapped entry points that drive matched calls through
//! the interception pipeline.

mod fetch;
mod legacy;

pub use fetch::FetchAdapter;
pub use legacy::LegacyAdapter;

use crate::config::StatusRange;
use crate::matcher::PageOrigin;
use crate::rule::{InterceptionRule, RuleRegistry};
use std::sync::Arc;
use tracing::{debug, trace};

/// State every intercepted call reads: the live registry and how URLs and
/// statuses are interpreted.
#[derive(Debug)]
pub(crate) struct Scope {
    pub rules: Arc<RuleRegistry>,
    pub origin: PageOrigin,
    pub success: StatusRange,
}

impl Scope {
    /// First rule addressing a call, logged either way.
    pub fn find_rule(&self, url: &str, method: &str) -> Option<Arc<InterceptionRule>> {
        let rule = self.rules.first_match(url, Some(method), &self.origin);
        match rule {
            Some(ref rule) => debug!(url = %url, method = %method, rule = %rule.name, "Rule matched"),
            None => trace!(url = %url, method = %method, "No rule matched"),
        }
        rule
    }
}
