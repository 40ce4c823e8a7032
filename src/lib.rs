#![warn(missing_docs)]
//! Core library entry points for the fasticon icon resolver.
//!
//! Given a site, discover the icons it declares, rank them, fetch the best
//! one that validates, and hand back a fixed-size normalized image. When the
//! site declares nothing usable, fall back to `/favicon.ico`, then to public
//! lookup services, then to a synthesized monogram.

pub mod candidate;
pub mod controls;
pub mod error;
pub mod fetch;
pub mod html;
pub mod manifest;
pub mod normalize;
pub mod resolver;
pub mod scoring;
pub mod services;
pub mod target;

pub use candidate::{rank_by, CandidateDescriptor, DeclaredSize, RankedCandidate, Role};
pub use controls::{Cli, ResolveControls, UndecodablePolicy};
pub use error::{CandidateRejection, ResolveError, TargetError};
pub use fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher, ResponseHead};
pub use html::{scan_markup, ScanResult};
pub use manifest::{fetch_manifest_icons, parse_manifest};
pub use normalize::{NormalizeError, NormalizedIcon, Normalizer};
pub use resolver::{Discovery, IconOrigin, IconResolver, Resolution, ResolvedIcon};
pub use scoring::{Reputation, ScoringPolicy};
pub use services::{default_services, monogram_svg, IconService};
pub use target::normalize_target;
