//! Resolution knobs and the command-line interface that populates them.

use crate::scoring::ScoringPolicy;
use crate::services::{builtin_service, default_services, IconService};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Browser-like user agent; many sites serve bots a stripped page.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// What to do with a fetched candidate that cannot be decoded or whose
/// content type has no decoder.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum UndecodablePolicy {
    /// Reject the candidate and move on to the next ranked one.
    #[default]
    Skip,
    /// Serve the original bytes with their original content type.
    PassThrough,
}

/// Tunable knobs that bound a single resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveControls {
    icon_size: u32,
    candidate_timeout: Duration,
    resolve_budget: Duration,
    max_page_bytes: usize,
    max_icon_bytes: usize,
    min_icon_bytes: u64,
    user_agent: String,
    placeholder: bool,
    undecodable: UndecodablePolicy,
    scoring: ScoringPolicy,
    services: Vec<IconService>,
}

impl ResolveControls {
    /// Edge length of the square output icon.
    pub fn icon_size(&self) -> u32 {
        self.icon_size
    }

    /// Upper bound for a single fetch including its body.
    pub fn candidate_timeout(&self) -> Duration {
        self.candidate_timeout
    }

    /// Upper bound for the whole resolution.
    pub fn resolve_budget(&self) -> Duration {
        self.resolve_budget
    }

    /// Bytes of page markup scanned for icon links.
    pub fn max_page_bytes(&self) -> usize {
        self.max_page_bytes
    }

    /// Largest icon or manifest body accepted.
    pub fn max_icon_bytes(&self) -> usize {
        self.max_icon_bytes
    }

    /// Payloads at or below this size are treated as placeholders and rejected.
    pub fn min_icon_bytes(&self) -> u64 {
        self.min_icon_bytes
    }

    /// User agent sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether exhaustion produces a monogram instead of an error.
    pub fn placeholder(&self) -> bool {
        self.placeholder
    }

    /// Policy for candidates the normalizer cannot handle.
    pub fn undecodable(&self) -> UndecodablePolicy {
        self.undecodable
    }

    /// Candidate weights.
    pub fn scoring(&self) -> &ScoringPolicy {
        &self.scoring
    }

    /// Third-party lookup services, tried in ranked order.
    pub fn services(&self) -> &[IconService] {
        &self.services
    }

    /// Overrides the output size.
    pub fn with_icon_size(mut self, size: u32) -> Self {
        self.icon_size = size.max(1);
        self
    }

    /// Overrides the per-candidate timeout.
    pub fn with_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = timeout;
        self
    }

    /// Overrides the total resolution budget.
    pub fn with_resolve_budget(mut self, budget: Duration) -> Self {
        self.resolve_budget = budget;
        self
    }

    /// Overrides the scanned page prefix.
    pub fn with_max_page_bytes(mut self, bytes: usize) -> Self {
        self.max_page_bytes = bytes;
        self
    }

    /// Overrides the icon body cap.
    pub fn with_max_icon_bytes(mut self, bytes: usize) -> Self {
        self.max_icon_bytes = bytes;
        self
    }

    /// Overrides the plausibility threshold.
    pub fn with_min_icon_bytes(mut self, bytes: u64) -> Self {
        self.min_icon_bytes = bytes;
        self
    }

    /// Overrides the user agent.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Enables or disables the monogram placeholder.
    pub fn with_placeholder(mut self, enabled: bool) -> Self {
        self.placeholder = enabled;
        self
    }

    /// Overrides the undecodable-candidate policy.
    pub fn with_undecodable(mut self, policy: UndecodablePolicy) -> Self {
        self.undecodable = policy;
        self
    }

    /// Replaces the scoring weights.
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    /// Replaces the lookup services.
    pub fn with_services(mut self, services: Vec<IconService>) -> Self {
        self.services = services;
        self
    }
}

impl Default for ResolveControls {
    fn default() -> Self {
        Self {
            icon_size: 64,
            candidate_timeout: Duration::from_secs(5),
            resolve_budget: Duration::from_secs(20),
            max_page_bytes: 1024 * 1024,
            max_icon_bytes: 5 * 1024 * 1024,
            min_icon_bytes: 64,
            user_agent: BROWSER_USER_AGENT.to_string(),
            placeholder: true,
            undecodable: UndecodablePolicy::default(),
            scoring: ScoringPolicy::default(),
            services: default_services(),
        }
    }
}

/// Command-line interface for the icon API server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "icon_api",
    about = "HTTP API that resolves and normalizes site icons"
)]
pub struct Cli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "FASTICON_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Edge length in pixels of the normalized PNG output.
    #[arg(long, env = "FASTICON_ICON_SIZE", default_value_t = 64)]
    pub icon_size: u32,

    /// Milliseconds allowed for a single candidate fetch.
    #[arg(long, env = "FASTICON_CANDIDATE_TIMEOUT_MS", default_value_t = 5000)]
    pub candidate_timeout_ms: u64,

    /// Milliseconds allowed for a whole resolution.
    #[arg(long, env = "FASTICON_RESOLVE_BUDGET_MS", default_value_t = 20_000)]
    pub resolve_budget_ms: u64,

    /// Bytes of page markup scanned for icon links.
    #[arg(long, env = "FASTICON_MAX_PAGE_BYTES", default_value_t = 1024 * 1024)]
    pub max_page_bytes: usize,

    /// Largest icon body accepted.
    #[arg(long, env = "FASTICON_MAX_ICON_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub max_icon_bytes: usize,

    /// Icon bodies at or below this size are rejected as placeholders.
    #[arg(long, env = "FASTICON_MIN_ICON_BYTES", default_value_t = 64)]
    pub min_icon_bytes: u64,

    /// Disable the monogram placeholder; exhaustion then answers 404 or 502.
    #[arg(long, env = "FASTICON_NO_PLACEHOLDER", default_value_t = false)]
    pub no_placeholder: bool,

    /// Handling of candidates that cannot be decoded.
    #[arg(long, env = "FASTICON_UNDECODABLE", value_enum, default_value = "skip")]
    pub undecodable: UndecodablePolicy,

    /// JSON file overriding scoring weights.
    #[arg(long, env = "FASTICON_SCORING")]
    pub scoring: Option<PathBuf>,

    /// Lookup services by name, comma separated (empty disables them).
    #[arg(long, env = "FASTICON_SERVICES")]
    pub services: Option<String>,

    /// User agent sent with discovery and icon requests.
    #[arg(long, env = "FASTICON_USER_AGENT", default_value = BROWSER_USER_AGENT)]
    pub user_agent: String,
}

impl Cli {
    /// Converts the parsed CLI into `ResolveControls`.
    pub fn build_controls(&self) -> Result<ResolveControls> {
        let scoring = match &self.scoring {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read scoring policy {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid scoring policy {}", path.display()))?
            }
            None => ScoringPolicy::default(),
        };
        let services = match &self.services {
            Some(names) => self.services_vec(names)?,
            None => default_services(),
        };
        Ok(ResolveControls::default()
            .with_icon_size(self.icon_size)
            .with_candidate_timeout(Duration::from_millis(self.candidate_timeout_ms.max(1)))
            .with_resolve_budget(Duration::from_millis(self.resolve_budget_ms.max(1)))
            .with_max_page_bytes(self.max_page_bytes)
            .with_max_icon_bytes(self.max_icon_bytes)
            .with_min_icon_bytes(self.min_icon_bytes)
            .with_user_agent(self.user_agent.clone())
            .with_placeholder(!self.no_placeholder)
            .with_undecodable(self.undecodable)
            .with_scoring(scoring)
            .with_services(services))
    }

    fn services_vec(&self, names: &str) -> Result<Vec<IconService>> {
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                builtin_service(name).with_context(|| format!("unknown lookup service `{name}`"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_controls() {
        let cli = Cli::parse_from(["icon_api"]);
        let controls = cli.build_controls().unwrap();
        assert_eq!(controls, ResolveControls::default());
    }

    #[test]
    fn cli_selects_services_by_name() {
        let cli = Cli::parse_from(["icon_api", "--services", "google, duckduckgo"]);
        let controls = cli.build_controls().unwrap();
        let names: Vec<&str> = controls.services().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["google", "duckduckgo"]);

        let cli = Cli::parse_from(["icon_api", "--services", ""]);
        assert!(cli.build_controls().unwrap().services().is_empty());

        let cli = Cli::parse_from(["icon_api", "--services", "nope"]);
        assert!(cli.build_controls().is_err());
    }

    #[test]
    fn cli_maps_flags() {
        let cli = Cli::parse_from([
            "icon_api",
            "--icon-size",
            "128",
            "--no-placeholder",
            "--undecodable",
            "pass-through",
        ]);
        let controls = cli.build_controls().unwrap();
        assert_eq!(controls.icon_size(), 128);
        assert!(!controls.placeholder());
        assert_eq!(controls.undecodable(), UndecodablePolicy::PassThrough);
    }
}
