//! Interception session lifecycle.
//!
//! A [`Host`] is the composition root: it owns the live entry points of both
//! transports and at most one interception [`Session`]. The first
//! [`Interceptor::install`] on a host swaps both entry points for adapters;
//! later installs only add rules to the session already in place.

use crate::adapter::{FetchAdapter, LegacyAdapter, Scope};
use crate::config::{InterceptConfig, Settings, StatusRange};
use crate::matcher::{MatcherError, PageOrigin};
use crate::rule::{InterceptionRule, RuleBatch, RuleError, RuleRegistry, Rules};
use crate::transport::{
    FetchRequest, FetchResponse, FetchTransport, LegacyCall, LegacyTransport, TransportError,
    TransportSlot,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Live transports of one page, plus its interception state.
pub struct Host {
    /// Call-initiation entry point of the legacy transport
    pub legacy: TransportSlot<dyn LegacyTransport>,
    /// Call-and-await entry point of the fetch transport
    pub fetch: TransportSlot<dyn FetchTransport>,
    origin: PageOrigin,
    /// Set by the first install and never cleared
    active: AtomicBool,
    session: Mutex<Option<Arc<Session>>>,
}

impl Host {
    pub fn new(
        legacy: Arc<dyn LegacyTransport>,
        fetch: Arc<dyn FetchTransport>,
        origin: PageOrigin,
    ) -> Self {
        Self {
            legacy: TransportSlot::new(legacy),
            fetch: TransportSlot::new(fetch),
            origin,
            active: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    /// Host whose two transports are served by the same backend.
    pub fn with_transport<T>(transport: T, origin: PageOrigin) -> Self
    where
        T: LegacyTransport + FetchTransport + 'static,
    {
        let transport = Arc::new(transport);
        Self::new(transport.clone(), transport, origin)
    }

    /// Host for the page origin named in configuration settings.
    pub fn from_settings<T>(transport: T, settings: &Settings) -> Result<Self, InterceptError>
    where
        T: LegacyTransport + FetchTransport + 'static,
    {
        let origin = PageOrigin::parse(&settings.origin)?;
        Ok(Self::with_transport(transport, origin))
    }

    /// Open a legacy call through whatever entry point is in place.
    pub fn open(&self, method: &str, url: &str) -> Result<Box<dyn LegacyCall>, TransportError> {
        self.legacy.get().open(method, url)
    }

    /// Issue a fetch call through whatever entry point is in place.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        let transport = self.fetch.get();
        transport.fetch(request).await
    }

    pub fn origin(&self) -> &PageOrigin {
        &self.origin
    }

    /// Whether an interception session was ever installed on this host.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The published session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn forget_session(&self) {
        self.session.lock().take();
    }
}

/// Entry points captured when a session was installed.
struct Originals {
    legacy: Arc<dyn LegacyTransport>,
    fetch: Arc<dyn FetchTransport>,
}

/// Rule registry plus the entry points it replaced.
pub struct Session {
    rules: Arc<RuleRegistry>,
    originals: Option<Originals>,
}

impl Session {
    fn detached() -> Self {
        Self {
            rules: Arc::new(RuleRegistry::new()),
            originals: None,
        }
    }

    /// Add rules, skipping duplicates. Returns the number inserted.
    pub fn register(&self, rules: impl Into<RuleBatch>) -> usize {
        let inserted = self.rules.register(rules);
        debug!(inserted, total = self.rules.len(), "Registered interception rules");
        inserted
    }

    /// Rules in registration order.
    pub fn rules(&self) -> Rules {
        self.rules.all()
    }

    /// Whether this session replaced the host's entry points.
    pub fn is_installed(&self) -> bool {
        self.originals.is_some()
    }

    fn restore(&self, host: &Host) {
        let Some(ref originals) = self.originals else {
            debug!("Session never installed, nothing to restore");
            return;
        };

        host.legacy.replace(Arc::clone(&originals.legacy));
        host.fetch.replace(Arc::clone(&originals.fetch));
        info!(rules = self.rules.len(), "Original transports restored");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("rules", &self.rules.len())
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Handle to the interception session of a host.
#[derive(Clone)]
pub struct Interceptor {
    host: Arc<Host>,
    session: Arc<Session>,
}

impl Interceptor {
    /// Install interception on a host, treating `2xx` as success.
    pub fn install(host: &Arc<Host>, rules: impl Into<RuleBatch>) -> Self {
        Self::install_with(host, StatusRange::default(), rules)
    }

    /// Install interception on a host.
    ///
    /// When the host already has a session the rules are registered on it and
    /// a handle to it is returned; `success` is then ignored.
    pub fn install_with(
        host: &Arc<Host>,
        success: StatusRange,
        rules: impl Into<RuleBatch>,
    ) -> Self {
        let mut published = host.session.lock();

        if host.active.load(Ordering::SeqCst) {
            let session = match published.as_ref() {
                Some(session) => {
                    warn!("Interception session already active, registering rules on it");
                    Arc::clone(session)
                }
                None => {
                    warn!("Interception flagged active without a session, not intercepting");
                    Arc::new(Session::detached())
                }
            };
            session.register(rules);
            return Self {
                host: Arc::clone(host),
                session,
            };
        }

        let registry = Arc::new(RuleRegistry::new());
        registry.register(rules);
        let scope = Arc::new(Scope {
            rules: Arc::clone(&registry),
            origin: host.origin.clone(),
            success,
        });

        let legacy = host.legacy.get();
        let fetch = host.fetch.get();
        host.legacy.replace(Arc::new(LegacyAdapter::new(
            Arc::clone(&legacy),
            Arc::clone(&scope),
        )));
        host.fetch
            .replace(Arc::new(FetchAdapter::new(Arc::clone(&fetch), scope)));

        let session = Arc::new(Session {
            rules: registry,
            originals: Some(Originals { legacy, fetch }),
        });
        host.active.store(true, Ordering::SeqCst);
        *published = Some(Arc::clone(&session));

        info!(
            rules = session.rules.len(),
            origin = %host.origin.as_url(),
            "Interception session installed"
        );

        Self {
            host: Arc::clone(host),
            session,
        }
    }

    /// Install interception from configuration.
    pub fn from_config(host: &Arc<Host>, config: &InterceptConfig) -> Result<Self, InterceptError> {
        let rules = compile_rules(config)?;
        Ok(Self::install_with(
            host,
            config.settings.success_statuses,
            rules,
        ))
    }

    /// Install interception from a YAML configuration string.
    pub fn from_yaml(host: &Arc<Host>, yaml: &str) -> Result<Self, InterceptError> {
        let config: InterceptConfig = serde_yaml::from_str(yaml)?;
        Self::from_config(host, &config)
    }

    /// Install interception from a JSON configuration string.
    pub fn from_json(host: &Arc<Host>, json: &str) -> Result<Self, InterceptError> {
        let config: InterceptConfig = serde_json::from_str(json)?;
        Self::from_config(host, &config)
    }

    /// Add rules to the session, skipping duplicates. Returns the number
    /// inserted.
    pub fn register(&self, rules: impl Into<RuleBatch>) -> usize {
        self.session.register(rules)
    }

    /// Put the original entry points back.
    ///
    /// The host stays flagged active, so later installs keep registering on
    /// this (now inert) session instead of intercepting again.
    pub fn restore(&self) {
        self.session.restore(&self.host);
    }

    /// Rules in registration order.
    pub fn rules(&self) -> Rules {
        self.session.rules()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }
}

/// Compile the enabled rules of a configuration, in order.
pub fn compile_rules(config: &InterceptConfig) -> Result<Vec<InterceptionRule>, RuleError> {
    config
        .rules
        .iter()
        .filter(|rule| {
            if !rule.enabled {
                debug!(rule = %rule.name, "Skipping disabled rule");
            }
            rule.enabled
        })
        .map(InterceptionRule::from_config)
        .collect()
}

/// Load a configuration file, YAML or JSON by extension.
pub fn load_config(path: &Path) -> Result<InterceptConfig, InterceptError> {
    let content = std::fs::read_to_string(path)?;
    if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Errors that can occur while setting up interception from configuration.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Matcher error: {0}")]
    Matcher(#[from] MatcherError),
}
