//! Errors visible to callers of the resolver.

use crate::fetch::FetchError;
use crate::normalize::NormalizeError;

/// Terminal outcome of a resolution that produced no icon.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Every candidate and fallback was rejected.
    #[error("no usable icon found for {target}")]
    NotFound {
        /// Requested target.
        target: String,
    },
    /// The lookup services needed to finish were unreachable.
    #[error("icon lookup services unreachable for {target}: {message}")]
    Upstream {
        /// Requested target.
        target: String,
        /// Last transport failure.
        message: String,
    },
}

/// Problem with the requested target identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    /// Nothing was supplied.
    #[error("missing target domain or url")]
    Missing,
    /// The value could not be turned into an http(s) URL with a host.
    #[error("invalid target `{0}`")]
    Invalid(String),
}

/// Reason a fetched candidate was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum CandidateRejection {
    /// The fetch itself failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Non-success status.
    #[error("status {0}")]
    Status(u16),
    /// Missing or non-image content type.
    #[error("content type {0:?} is not an image")]
    NotAnImage(Option<String>),
    /// Payload too small to be a real icon.
    #[error("payload of {bytes} bytes is below the {minimum} byte minimum")]
    TooSmall {
        /// Observed length.
        bytes: u64,
        /// Configured minimum.
        minimum: u64,
    },
    /// The normalizer could not handle the payload.
    #[error(transparent)]
    Undecodable(#[from] NormalizeError),
    /// Normalization outlived the time left for this candidate.
    #[error("normalization did not finish in time")]
    NormalizeTimeout,
    /// The normalization task panicked or was cancelled.
    #[error("normalization task failed: {0}")]
    NormalizeAborted(String),
}

impl CandidateRejection {
    /// True when the candidate's host could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_unreachable())
    }
}
