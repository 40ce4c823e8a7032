//! Third-party icon lookup services and the monogram placeholder.

use crate::candidate::{CandidateDescriptor, DeclaredSize, Role};
use crate::scoring::Reputation;
use url::Url;

/// Placeholder substituted with the target domain in service templates.
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// A lookup service that maps a domain to an icon URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconService {
    name: String,
    template: String,
    reputation: Reputation,
    declared_size: Option<u32>,
}

impl IconService {
    /// Builds a service from a URL template containing `{domain}`.
    pub fn new(name: impl Into<String>, template: impl Into<String>, reputation: Reputation) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            reputation,
            declared_size: None,
        }
    }

    /// Records the size the service is asked to return.
    pub fn with_declared_size(mut self, size: u32) -> Self {
        self.declared_size = Some(size);
        self
    }

    /// Short service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host reputation used by fallback scoring.
    pub fn reputation(&self) -> Reputation {
        self.reputation
    }

    /// Lookup URL for `domain`.
    pub fn lookup_url(&self, domain: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.template.replace(DOMAIN_PLACEHOLDER, domain))
    }

    /// Candidate describing this service's answer for `domain`.
    pub fn candidate(&self, domain: &str) -> Result<CandidateDescriptor, url::ParseError> {
        let size = self
            .declared_size
            .map_or(DeclaredSize::Unknown, DeclaredSize::square);
        Ok(CandidateDescriptor::new(self.lookup_url(domain)?, Role::Unknown).with_size(size))
    }
}

/// Services queried when page discovery finds nothing usable.
pub fn default_services() -> Vec<IconService> {
    ["duckduckgo", "google", "iconhorse"]
        .into_iter()
        .filter_map(builtin_service)
        .collect()
}

/// Looks up a built-in service by name.
pub fn builtin_service(name: &str) -> Option<IconService> {
    let service = match name.to_ascii_lowercase().as_str() {
        "duckduckgo" => IconService::new(
            "duckduckgo",
            "https://icons.duckduckgo.com/ip3/{domain}.ico",
            Reputation::High,
        ),
        "google" => IconService::new(
            "google",
            "https://www.google.com/s2/favicons?domain={domain}&sz=128",
            Reputation::High,
        )
        .with_declared_size(128),
        "iconhorse" => IconService::new(
            "iconhorse",
            "https://icon.horse/icon/{domain}",
            Reputation::Low,
        ),
        _ => return None,
    };
    Some(service)
}

const MONOGRAM_PALETTE: &[&str] = &[
    "#e53935", "#d81b60", "#8e24aa", "#5e35b1", "#3949ab", "#1e88e5", "#00897b", "#43a047",
    "#f4511e", "#6d4c41", "#546e7a", "#c0ca33",
];

/// Renders a single-letter monogram for `host` as SVG markup.
///
/// The letter is the first alphanumeric character after a leading `www.`;
/// the background color is stable per host.
pub fn monogram_svg(host: &str, size: u32) -> String {
    let host = host.trim().to_lowercase();
    let name = host.strip_prefix("www.").unwrap_or(&host);
    let letter = name
        .chars()
        .find(|c| c.is_alphanumeric())
        .map(|c| c.to_uppercase().collect::<String>())
        .unwrap_or_else(|| "?".to_string());
    let color = MONOGRAM_PALETTE[crc32fast::hash(name.as_bytes()) as usize % MONOGRAM_PALETTE.len()];
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 100 100">"#,
            r#"<rect width="100" height="100" rx="20" fill="{color}"/>"#,
            r##"<text x="50" y="50" dy=".35em" text-anchor="middle" font-family="system-ui, sans-serif" font-size="60" fill="#ffffff">{letter}</text>"##,
            "</svg>"
        ),
        size = size,
        color = color,
        letter = letter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_domain_template() {
        let service = builtin_service("duckduckgo").unwrap();
        assert_eq!(
            service.lookup_url("example.com").unwrap().as_str(),
            "https://icons.duckduckgo.com/ip3/example.com.ico"
        );
        let google = builtin_service("Google").unwrap();
        let candidate = google.candidate("example.com").unwrap();
        assert_eq!(candidate.declared_size, DeclaredSize::square(128));
        assert_eq!(candidate.role, Role::Unknown);
    }

    #[test]
    fn default_services_are_all_builtin() {
        let names: Vec<String> = default_services()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["duckduckgo", "google", "iconhorse"]);
        assert!(builtin_service("unknown").is_none());
    }

    #[test]
    fn monogram_uses_first_letter() {
        let svg = monogram_svg("www.rust-lang.org", 64);
        assert!(svg.contains(">R</text>"));
        assert!(svg.contains(r#"width="64" height="64""#));
        assert_eq!(svg, monogram_svg("WWW.Rust-Lang.org", 64));

        let fallback = monogram_svg("---", 32);
        assert!(fallback.contains(">?</text>"));
    }
}
