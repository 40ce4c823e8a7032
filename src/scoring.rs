//! Candidate scoring.
//!
//! Two rule sets share one weight table. Page-declared candidates (markup and
//! manifest) are scored from their declared attributes; lookup-service
//! candidates are scored from the shape of the href itself.

use crate::candidate::{CandidateDescriptor, DeclaredSize, Role};
use serde::{Deserialize, Serialize};

/// Trust level of a third-party lookup service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reputation {
    /// Well-known service with consistently good results.
    High,
    /// No adjustment.
    #[default]
    Neutral,
    /// Service known to return placeholders or low-fidelity art.
    Low,
}

/// Weights for page-declared candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Bonus for SVG candidates.
    pub vector: i64,
    /// Bonus for `apple-touch-icon` links.
    pub apple_touch_icon: i64,
    /// Bonus for manifest entries.
    pub manifest_icon: i64,
    /// Bonus for generic `icon` links.
    pub icon: i64,
    /// Flat score assigned to `og:image` candidates, replacing every other term.
    pub social_preview: i64,
    /// Bonus for `sizes="any"`.
    pub any_size: i64,
    /// Weights for lookup-service candidates.
    pub fallback: FallbackWeights,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            vector: 1000,
            apple_touch_icon: 650,
            manifest_icon: 650,
            icon: 100,
            social_preview: 50,
            any_size: 500,
            fallback: FallbackWeights::default(),
        }
    }
}

/// Weights for candidates produced by third-party lookup services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackWeights {
    /// Applied to inline `data:` payloads.
    pub data_uri: i64,
    /// `.svg` extension.
    pub svg: i64,
    /// `.png` extension.
    pub png: i64,
    /// `.ico` extension.
    pub ico: i64,
    /// Other raster extensions (`.jpg`, `.gif`, `.webp`, ...).
    pub other_raster: i64,
    /// Href mentions `apple-touch-icon`.
    pub apple_touch_hint: i64,
    /// Host is a high-reputation service.
    pub high_reputation: i64,
    /// Host is a low-reputation service.
    pub low_reputation: i64,
}

impl Default for FallbackWeights {
    fn default() -> Self {
        Self {
            data_uri: -1000,
            svg: 1000,
            png: 500,
            ico: 200,
            other_raster: 100,
            apple_touch_hint: 50,
            high_reputation: 30,
            low_reputation: -20,
        }
    }
}

const OTHER_RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "webp", "bmp", "avif"];

impl ScoringPolicy {
    /// Scores a candidate discovered in page markup or a manifest.
    pub fn score(&self, candidate: &CandidateDescriptor) -> i64 {
        let mut score = 0;
        if candidate.is_vector() {
            score += self.vector;
        }
        score += match candidate.role {
            Role::AppleTouchIcon => self.apple_touch_icon,
            Role::ManifestIcon => self.manifest_icon,
            Role::Icon => self.icon,
            Role::SocialPreview | Role::Unknown => 0,
        };
        score += match candidate.declared_size {
            DeclaredSize::Any => self.any_size,
            DeclaredSize::Pixels { width, .. } => i64::from(width),
            DeclaredSize::Unknown => 0,
        };
        if candidate.role == Role::SocialPreview {
            score = self.social_preview;
        }
        score
    }

    /// Scores a lookup-service candidate from its href.
    pub fn score_fallback(&self, candidate: &CandidateDescriptor, reputation: Reputation) -> i64 {
        let weights = &self.fallback;
        let mut score = 0;
        if candidate.is_data_uri() {
            score += weights.data_uri;
        }
        score += match candidate.path_extension().as_deref() {
            Some("svg") => weights.svg,
            Some("png") => weights.png,
            Some("ico") => weights.ico,
            Some(ext) if OTHER_RASTER_EXTENSIONS.contains(&ext) => weights.other_raster,
            _ => 0,
        };
        if candidate
            .url
            .as_str()
            .to_ascii_lowercase()
            .contains("apple-touch-icon")
        {
            score += weights.apple_touch_hint;
        }
        score += match reputation {
            Reputation::High => weights.high_reputation,
            Reputation::Low => weights.low_reputation,
            Reputation::Neutral => 0,
        };
        if let Some(width) = candidate.declared_size.width() {
            score += i64::from(width);
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn candidate(href: &str, role: Role, sizes: Option<&str>) -> CandidateDescriptor {
        CandidateDescriptor::new(Url::parse(href).unwrap(), role)
            .with_size(DeclaredSize::parse(sizes))
    }

    #[test]
    fn scoring_is_deterministic() {
        let policy = ScoringPolicy::default();
        let c = candidate("https://a.test/icon.png", Role::Icon, Some("32x32"));
        assert_eq!(policy.score(&c), policy.score(&c));
        assert_eq!(policy.score(&c), 132);
    }

    #[test]
    fn apple_touch_outranks_small_icon() {
        let policy = ScoringPolicy::default();
        let icon = candidate("https://a.test/a.png", Role::Icon, Some("32x32"));
        let apple = candidate("https://a.test/b.png", Role::AppleTouchIcon, Some("180x180"));
        assert_eq!(policy.score(&apple), 830);
        assert!(policy.score(&apple) > policy.score(&icon));
    }

    #[test]
    fn manifest_and_apple_share_role_weight() {
        let policy = ScoringPolicy::default();
        let manifest = candidate("https://a.test/m.png", Role::ManifestIcon, Some("192x192"));
        let apple = candidate("https://a.test/m.png", Role::AppleTouchIcon, Some("192x192"));
        assert_eq!(policy.score(&manifest), policy.score(&apple));
    }

    #[test]
    fn vector_beats_raster_of_equal_or_smaller_size() {
        let policy = ScoringPolicy::default();
        for size in [0u32, 16, 512, 4096, 999_999] {
            let sizes = format!("{size}x{size}");
            let vector = candidate("https://a.test/v.svg", Role::Icon, Some(&sizes));
            let raster = candidate("https://a.test/r.png", Role::Icon, Some(&sizes));
            assert!(policy.score(&vector) > policy.score(&raster), "size {size}");
        }
    }

    #[test]
    fn social_preview_is_fixed() {
        let policy = ScoringPolicy::default();
        let og = candidate("https://a.test/og.svg", Role::SocialPreview, Some("any"));
        assert_eq!(policy.score(&og), 50);

        let custom = ScoringPolicy {
            social_preview: 150,
            ..ScoringPolicy::default()
        };
        assert_eq!(custom.score(&og), 150);
    }

    #[test]
    fn any_size_bonus_applies() {
        let policy = ScoringPolicy::default();
        let c = candidate("https://a.test/i", Role::Icon, Some("any"));
        assert_eq!(policy.score(&c), 600);
    }

    #[test]
    fn fallback_rules_key_off_href() {
        let policy = ScoringPolicy::default();
        let ico = candidate("https://icons.example/a.test.ico", Role::Unknown, None);
        assert_eq!(policy.score_fallback(&ico, Reputation::High), 230);

        let png = candidate("https://svc.example/apple-touch-icon.png", Role::Unknown, None);
        assert_eq!(policy.score_fallback(&png, Reputation::Low), 530);

        let sized = candidate("https://svc.example/icon", Role::Unknown, Some("128x128"));
        assert_eq!(policy.score_fallback(&sized, Reputation::Neutral), 128);

        let gif = candidate("https://svc.example/icon.gif", Role::Unknown, None);
        assert_eq!(policy.score_fallback(&gif, Reputation::Neutral), 100);

        let data = CandidateDescriptor::new(
            Url::parse("data:image/png;base64,AAAA").unwrap(),
            Role::Unknown,
        );
        assert_eq!(policy.score_fallback(&data, Reputation::Neutral), -1000);
    }

    #[test]
    fn policy_deserializes_partial_overrides() {
        let policy: ScoringPolicy =
            serde_json::from_str(r#"{"social_preview": 150, "fallback": {"png": 400}}"#).unwrap();
        assert_eq!(policy.social_preview, 150);
        assert_eq!(policy.fallback.png, 400);
        assert_eq!(policy.vector, 1000);
        assert_eq!(policy.fallback.ico, 200);
    }
}
