//! Candidate aggregation and the resolution state machine.
//!
//! One resolution walks: discover (markup, then manifest) → rank → fetch the
//! ranked candidates one at a time → conventional `/favicon.ico` → lookup
//! services → monogram placeholder. The first candidate that fetches,
//! validates and normalizes wins.

use crate::candidate::{rank_by, CandidateDescriptor, RankedCandidate, Role};
use crate::controls::{ResolveControls, UndecodablePolicy};
use crate::error::{CandidateRejection, ResolveError};
use crate::fetch::{self, FetchError, Fetcher};
use crate::html::scan_markup;
use crate::manifest::fetch_manifest_icons;
use crate::normalize::{is_image_content_type, NormalizedIcon, Normalizer, SVG_CONTENT_TYPE};
use crate::services::monogram_svg;
use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

/// Where the winning icon came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOrigin {
    /// A candidate declared by the page or its manifest.
    Discovered(Role),
    /// The conventional `/favicon.ico` path.
    ConventionalPath,
    /// A third-party lookup service.
    Service(String),
    /// Synthesized monogram.
    Placeholder,
}

impl fmt::Display for IconOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered(role) => write!(f, "discovered:{role:?}"),
            Self::ConventionalPath => write!(f, "favicon.ico"),
            Self::Service(name) => write!(f, "service:{name}"),
            Self::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Fetched payload of an accepted candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIcon {
    /// Final URL after redirects.
    pub url: Url,
    /// Content type reported by the response; authoritative for decoding.
    pub content_type: String,
    /// Raw body.
    pub bytes: Bytes,
}

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Source URL, `None` for the placeholder.
    pub source: Option<Url>,
    /// How the source was found.
    pub origin: IconOrigin,
    /// Normalized payload, or the original bytes under pass-through.
    pub icon: NormalizedIcon,
}

/// Candidates gathered from the target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// URL the page was served from; the target itself when the page failed.
    pub base: Url,
    /// Markup candidates followed by manifest candidates.
    pub candidates: Vec<CandidateDescriptor>,
    /// Manifest link found in the markup.
    pub manifest: Option<Url>,
}

/// Why discovery produced no candidates. Logged, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The page could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Non-success status.
    #[error("page answered with status {0}")]
    Status(u16),
    /// The response was not HTML.
    #[error("page content type `{0}` is not html")]
    NotHtml(String),
}

#[derive(Default)]
struct ServiceOutcome {
    attempted: usize,
    unreachable: usize,
    last_error: Option<String>,
}

impl ServiceOutcome {
    fn all_unreachable(&self) -> bool {
        self.attempted > 0 && self.attempted == self.unreachable
    }
}

/// Resolves the best icon for a target and normalizes it.
pub struct IconResolver<F> {
    fetcher: F,
    controls: ResolveControls,
    normalizer: Normalizer,
}

impl<F: Fetcher> IconResolver<F> {
    /// Builds a resolver over `fetcher`.
    pub fn new(fetcher: F, controls: ResolveControls) -> Self {
        let normalizer = Normalizer::new(controls.icon_size());
        Self {
            fetcher,
            controls,
            normalizer,
        }
    }

    /// Active controls.
    pub fn controls(&self) -> &ResolveControls {
        &self.controls
    }

    /// Underlying fetch capability.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Scans the target page and its manifest for icon candidates.
    ///
    /// Failures degrade to an empty candidate list.
    pub async fn discover(&self, target: &Url) -> Discovery {
        let page = self
            .bounded(self.controls.candidate_timeout(), self.fetch_page(target))
            .await;
        let (base, chunks) = match page {
            Ok(page) => page,
            Err(err) => {
                warn!(%target, %err, "page discovery failed");
                return Discovery {
                    base: target.clone(),
                    candidates: Vec::new(),
                    manifest: None,
                };
            }
        };

        let scan = scan_markup(&base, &chunks);
        let mut candidates = scan.candidates;
        if let Some(manifest_url) = &scan.manifest {
            let from_manifest = self
                .bounded(self.controls.candidate_timeout(), async {
                    Ok::<_, FetchError>(
                        fetch_manifest_icons(
                            &self.fetcher,
                            manifest_url,
                            self.controls.max_icon_bytes(),
                        )
                        .await,
                    )
                })
                .await
                .unwrap_or_else(|err| {
                    debug!(manifest = %manifest_url, %err, "manifest fetch abandoned");
                    Vec::new()
                });
            candidates.extend(from_manifest);
        }
        debug!(%base, count = candidates.len(), "discovery complete");
        Discovery {
            base,
            candidates,
            manifest: scan.manifest,
        }
    }

    /// Orders page-declared candidates by descending score.
    pub fn rank(&self, candidates: Vec<CandidateDescriptor>) -> Vec<RankedCandidate> {
        let policy = self.controls.scoring();
        rank_by(candidates, |candidate| policy.score(candidate))
    }

    /// Runs the full resolution for `target`.
    pub async fn resolve(&self, target: &Url) -> Result<Resolution, ResolveError> {
        let span = info_span!("resolve", target = %target);
        self.resolve_inner(target).instrument(span).await
    }

    async fn resolve_inner(&self, target: &Url) -> Result<Resolution, ResolveError> {
        let deadline = Instant::now() + self.controls.resolve_budget();

        let mut attempted = HashSet::new();

        let discovery = self.discover(target).await;
        for candidate in self.rank(discovery.candidates) {
            if Instant::now() >= deadline {
                warn!("resolution budget exhausted during ranked candidates");
                return self.exhausted(target, ServiceOutcome::default());
            }
            if !attempted.insert(candidate.url().clone()) {
                debug!(url = %candidate.url(), "skipping repeated candidate");
                continue;
            }
            let origin = IconOrigin::Discovered(candidate.descriptor().role);
            match self.try_candidate(candidate.url(), origin, deadline).await {
                Ok(resolution) => {
                    info!(url = %candidate.url(), score = candidate.score(), "accepted candidate");
                    return Ok(resolution);
                }
                Err(reason) => {
                    debug!(url = %candidate.url(), score = candidate.score(), %reason, "rejected candidate")
                }
            }
        }

        if Instant::now() < deadline {
            if let Some(resolution) = self
                .try_conventional(&discovery.base, deadline, &mut attempted)
                .await
            {
                return Ok(resolution);
            }
        }

        let outcome = match target.host_str() {
            Some(host) if Instant::now() < deadline => match self
                .try_services(host, deadline, &mut attempted)
                .await
            {
                Ok(resolution) => return Ok(resolution),
                Err(outcome) => outcome,
            },
            _ => ServiceOutcome::default(),
        };

        self.exhausted(target, outcome)
    }

    async fn fetch_page(&self, target: &Url) -> Result<(Url, Vec<Bytes>), DiscoveryError> {
        let response = fetch::open(&self.fetcher, target).await?;
        if !response.head.is_success() {
            return Err(DiscoveryError::Status(response.head.status));
        }
        if let Some(content_type) = &response.head.content_type {
            if !content_type.to_ascii_lowercase().contains("html") {
                return Err(DiscoveryError::NotHtml(content_type.clone()));
            }
        }
        let base = response.head.url.clone();
        let chunks = response.prefix_chunks(self.controls.max_page_bytes()).await?;
        Ok((base, chunks))
    }

    async fn try_conventional(
        &self,
        base: &Url,
        deadline: Instant,
        attempted: &mut HashSet<Url>,
    ) -> Option<Resolution> {
        let url = base.join("/favicon.ico").ok()?;
        if !attempted.insert(url.clone()) {
            debug!(%url, "conventional path already tried");
            return None;
        }
        let head = self
            .bounded(self.time_left(deadline), self.fetcher.head(&url))
            .await;
        match head {
            Ok(head) if head.is_success() => {}
            Ok(head) => {
                debug!(%url, status = head.status, "conventional path missing");
                return None;
            }
            Err(err) => {
                debug!(%url, %err, "conventional path unreachable");
                return None;
            }
        }
        match self.try_candidate(&url, IconOrigin::ConventionalPath, deadline).await {
            Ok(resolution) => {
                info!(%url, "accepted conventional favicon");
                Some(resolution)
            }
            Err(reason) => {
                debug!(%url, %reason, "rejected conventional favicon");
                None
            }
        }
    }

    async fn try_services(
        &self,
        host: &str,
        deadline: Instant,
        attempted: &mut HashSet<Url>,
    ) -> Result<Resolution, ServiceOutcome> {
        let policy = self.controls.scoring();
        let mut ranked: Vec<(i64, CandidateDescriptor, &str)> = Vec::new();
        for service in self.controls.services() {
            match service.candidate(host) {
                Ok(candidate) => {
                    let score = policy.score_fallback(&candidate, service.reputation());
                    ranked.push((score, candidate, service.name()));
                }
                Err(err) => warn!(service = service.name(), %err, "invalid service template"),
            }
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let mut outcome = ServiceOutcome::default();
        for (score, candidate, name) in ranked {
            if Instant::now() >= deadline {
                warn!("resolution budget exhausted during lookup services");
                break;
            }
            if !attempted.insert(candidate.url.clone()) {
                debug!(service = name, url = %candidate.url, "lookup url already tried");
                continue;
            }
            outcome.attempted += 1;
            let origin = IconOrigin::Service(name.to_string());
            match self.try_candidate(&candidate.url, origin, deadline).await {
                Ok(resolution) => {
                    info!(service = name, url = %candidate.url, score, "accepted lookup service icon");
                    return Ok(resolution);
                }
                Err(reason) => {
                    if reason.is_unreachable() {
                        outcome.unreachable += 1;
                    }
                    debug!(service = name, url = %candidate.url, %reason, "rejected lookup service icon");
                    outcome.last_error = Some(reason.to_string());
                }
            }
        }
        Err(outcome)
    }

    fn exhausted(&self, target: &Url, outcome: ServiceOutcome) -> Result<Resolution, ResolveError> {
        if self.controls.placeholder() {
            let host = target.host_str().unwrap_or_default();
            let svg = monogram_svg(host, self.controls.icon_size());
            info!("serving monogram placeholder");
            return Ok(Resolution {
                source: None,
                origin: IconOrigin::Placeholder,
                icon: NormalizedIcon {
                    bytes: svg.into_bytes(),
                    content_type: SVG_CONTENT_TYPE.to_string(),
                },
            });
        }
        if outcome.all_unreachable() {
            return Err(ResolveError::Upstream {
                target: target.to_string(),
                message: outcome.last_error.unwrap_or_default(),
            });
        }
        Err(ResolveError::NotFound {
            target: target.to_string(),
        })
    }

    /// Fetches, validates and normalizes one candidate.
    pub async fn try_candidate(
        &self,
        url: &Url,
        origin: IconOrigin,
        deadline: Instant,
    ) -> Result<Resolution, CandidateRejection> {
        let fetched = self
            .bounded(self.time_left(deadline), self.fetch_icon(url))
            .await
            .map_err(|err| match err {
                Bounded::Elapsed => CandidateRejection::Fetch(FetchError::Timeout),
                Bounded::Inner(reason) => reason,
            })?;
        self.finish(fetched, origin, deadline).await
    }

    /// Fetches one candidate and checks it against the validity rules.
    pub async fn fetch_icon(&self, url: &Url) -> Result<ResolvedIcon, CandidateRejection> {
        let response = fetch::open(&self.fetcher, url).await?;
        let head = &response.head;
        if !head.is_success() {
            return Err(CandidateRejection::Status(head.status));
        }
        let content_type = match &head.content_type {
            Some(value) if is_image_content_type(value) => value.clone(),
            other => return Err(CandidateRejection::NotAnImage(other.clone())),
        };
        let minimum = self.controls.min_icon_bytes();
        if let Some(length) = head.content_length {
            if length <= minimum {
                return Err(CandidateRejection::TooSmall {
                    bytes: length,
                    minimum,
                });
            }
        }
        let url = head.url.clone();
        let bytes = response.bytes(self.controls.max_icon_bytes()).await?;
        if bytes.len() as u64 <= minimum {
            return Err(CandidateRejection::TooSmall {
                bytes: bytes.len() as u64,
                minimum,
            });
        }
        Ok(ResolvedIcon {
            url,
            content_type,
            bytes,
        })
    }

    /// Normalizes off the async workers, within the time left for the candidate.
    async fn finish(
        &self,
        fetched: ResolvedIcon,
        origin: IconOrigin,
        deadline: Instant,
    ) -> Result<Resolution, CandidateRejection> {
        let normalizer = self.normalizer;
        let bytes = fetched.bytes.clone();
        let content_type = fetched.content_type.clone();
        let task = tokio::task::spawn_blocking(move || normalizer.normalize(&bytes, &content_type));
        let normalized = match timeout(self.time_left(deadline), task).await {
            Ok(Ok(normalized)) => normalized,
            Ok(Err(err)) => return Err(CandidateRejection::NormalizeAborted(err.to_string())),
            Err(_) => {
                warn!(url = %fetched.url, "normalization abandoned at deadline");
                return Err(CandidateRejection::NormalizeTimeout);
            }
        };
        match normalized {
            Ok(icon) => Ok(Resolution {
                source: Some(fetched.url),
                origin,
                icon,
            }),
            Err(err) => match self.controls.undecodable() {
                UndecodablePolicy::Skip => Err(err.into()),
                UndecodablePolicy::PassThrough => {
                    warn!(url = %fetched.url, %err, "serving undecoded original bytes");
                    Ok(Resolution {
                        source: Some(fetched.url),
                        origin,
                        icon: NormalizedIcon {
                            bytes: fetched.bytes.to_vec(),
                            content_type: fetched.content_type,
                        },
                    })
                }
            },
        }
    }

    fn time_left(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .min(self.controls.candidate_timeout())
    }

    async fn bounded<T, E, Fut>(&self, limit: Duration, future: Fut) -> Result<T, Bounded<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match timeout(limit, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Bounded::Inner(err)),
            Err(_) => Err(Bounded::Elapsed),
        }
    }
}

enum Bounded<E> {
    Elapsed,
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for Bounded<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elapsed => write!(f, "timed out"),
            Self::Inner(err) => err.fmt(f),
        }
    }
}
