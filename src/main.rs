//! Zentinel Intercept CLI entry point.
//!
//! Validates interception configuration and reports which rule would handle a
//! given call.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zentinel_intercept::config::EXAMPLE_CONFIG;
use zentinel_intercept::session::{compile_rules, load_config};
use zentinel_intercept::{InterceptConfig, InterceptionRule, PageOrigin, RuleRegistry};

#[derive(Parser, Debug)]
#[command(name = "zentinel-intercept")]
#[command(
    author,
    version,
    about = "Request/response interception rules for HTTP transports"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Page origin used to resolve URLs starting with "/".
    /// Overrides settings.origin from the configuration file.
    #[arg(long, env = "INTERCEPT_ORIGIN")]
    origin: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,

    /// Report which rule would intercept a call to this URL.
    #[arg(long)]
    check_url: Option<String>,

    /// HTTP method used with --check-url
    #[arg(long, default_value = "GET")]
    method: String,
}

fn print_example_config() {
    println!("{}", EXAMPLE_CONFIG);
}

fn describe(rule: &InterceptionRule) -> String {
    let mut stages = Vec::new();
    if rule.has_before_send() {
        stages.push("before_send");
    }
    if rule.has_response_hooks() {
        stages.push("response");
    }
    format!(
        "{} ({} {}) [{}]",
        rule.name,
        rule.method.to_uppercase(),
        rule.target,
        stages.join(", ")
    )
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    if args.example_config {
        print_example_config();
        return Ok(());
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => InterceptConfig::default(),
    };

    if let Some(origin) = args.origin {
        config.settings.origin = origin;
    }

    let origin = PageOrigin::parse(&config.settings.origin).context("Invalid page origin")?;
    let rules = compile_rules(&config).context("Invalid interception rule")?;

    if args.validate {
        info!(rules = rules.len(), "Configuration is valid");
        return Ok(());
    }

    let registry = RuleRegistry::new();
    let inserted = registry.register(rules);
    if inserted < config.rules.iter().filter(|r| r.enabled).count() {
        warn!("Configuration contains duplicate rules, later duplicates are ignored");
    }

    let Some(url) = args.check_url else {
        info!(
            rules = registry.len(),
            origin = %origin.as_url(),
            "Interception rules loaded"
        );
        for rule in &registry.all() {
            println!("{}", describe(rule));
        }
        return Ok(());
    };

    let absolute = origin.absolutize(&url);
    match registry.first_match(&absolute, Some(&args.method), &origin) {
        Some(rule) => println!("{} {} -> {}", args.method, absolute, describe(&rule)),
        None => println!("{} {} -> not intercepted", args.method, absolute),
    }

    Ok(())
}
