//! Discovered icon references and the attributes they were declared with.

use url::Url;

/// Semantic origin of a discovered icon reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// `<link rel="icon">`, `rel="shortcut icon"` and similar.
    Icon,
    /// `<link rel="apple-touch-icon">` and its `-precomposed` variant.
    AppleTouchIcon,
    /// Entry of a web-app manifest `icons` array.
    ManifestIcon,
    /// `<meta property="og:image">` preview image.
    SocialPreview,
    /// Reference without a declared role (conventional paths, lookup services).
    Unknown,
}

/// Icon-like relations that point at something other than a site icon.
///
/// `mask-icon` is Safari's monochrome pinned-tab silhouette.
pub const EXCLUDED_ICON_RELS: &[&str] = &["mask-icon"];

impl Role {
    /// Maps a link relation to an icon role when it mentions `icon`.
    ///
    /// Relations listed in [`EXCLUDED_ICON_RELS`] are never icons, whatever
    /// else the attribute says.
    pub fn from_rel(rel: &str) -> Option<Self> {
        let rel = rel.to_ascii_lowercase();
        if !rel.contains("icon") {
            return None;
        }
        if rel
            .split_ascii_whitespace()
            .any(|token| EXCLUDED_ICON_RELS.contains(&token))
        {
            return None;
        }
        if rel.contains("apple-touch-icon") {
            Some(Self::AppleTouchIcon)
        } else {
            Some(Self::Icon)
        }
    }
}

/// Size hint attached to a candidate by its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredSize {
    /// The `any` sentinel used for scalable assets.
    Any,
    /// Explicit pixel dimensions.
    Pixels {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },
    /// No size, or a value that could not be parsed.
    Unknown,
}

impl DeclaredSize {
    /// Parses a `sizes` attribute.
    ///
    /// Lists such as `"16x16 32x32"` keep the widest pair; `any` anywhere in
    /// the list wins over explicit pairs.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Unknown;
        };
        let mut best: Option<(u32, u32)> = None;
        for token in raw.split_whitespace() {
            let token = token.to_ascii_lowercase();
            if token == "any" {
                return Self::Any;
            }
            let Some((w, h)) = token.split_once('x') else {
                continue;
            };
            let (Ok(width), Ok(height)) = (w.parse::<u32>(), h.parse::<u32>()) else {
                continue;
            };
            if best.map_or(true, |(current, _)| width > current) {
                best = Some((width, height));
            }
        }
        match best {
            Some((width, height)) => Self::Pixels { width, height },
            None => Self::Unknown,
        }
    }

    /// Square size shorthand.
    pub fn square(size: u32) -> Self {
        Self::Pixels {
            width: size,
            height: size,
        }
    }

    /// Declared width, when one was given.
    pub fn width(&self) -> Option<u32> {
        match self {
            Self::Pixels { width, .. } => Some(*width),
            Self::Any | Self::Unknown => None,
        }
    }
}

/// MIME type for SVG documents.
pub const SVG_MIME: &str = "image/svg+xml";

/// One discovered, not-yet-fetched icon reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDescriptor {
    /// Absolute location, already resolved against the page or manifest URL.
    pub url: Url,
    /// Where the reference came from.
    pub role: Role,
    /// Size hint from the source.
    pub declared_size: DeclaredSize,
    /// MIME type hint from the source; never used to pick a decoder.
    pub declared_type: Option<String>,
}

impl CandidateDescriptor {
    /// Builds a descriptor with no size or type hints.
    pub fn new(url: Url, role: Role) -> Self {
        Self {
            url,
            role,
            declared_size: DeclaredSize::Unknown,
            declared_type: None,
        }
    }

    /// Attaches a size hint.
    pub fn with_size(mut self, size: DeclaredSize) -> Self {
        self.declared_size = size;
        self
    }

    /// Attaches a MIME type hint, ignoring blank values.
    pub fn with_type(mut self, declared_type: Option<String>) -> Self {
        self.declared_type = declared_type
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());
        self
    }

    /// True when the href or the declared type point at SVG content.
    pub fn is_vector(&self) -> bool {
        self.path_extension().as_deref() == Some("svg")
            || self.declared_type.as_deref() == Some(SVG_MIME)
    }

    /// True for inline `data:` payloads.
    pub fn is_data_uri(&self) -> bool {
        self.url.scheme() == "data"
    }

    /// Lowercased extension of the last path segment, if any.
    pub fn path_extension(&self) -> Option<String> {
        if self.is_data_uri() {
            return None;
        }
        let segment = self.url.path().rsplit('/').next()?;
        let (_, ext) = segment.rsplit_once('.')?;
        (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }
}

/// A descriptor paired with the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCandidate {
    descriptor: CandidateDescriptor,
    score: i64,
}

impl RankedCandidate {
    /// Freezes a descriptor with its computed score.
    pub fn new(descriptor: CandidateDescriptor, score: i64) -> Self {
        Self { descriptor, score }
    }

    /// Underlying descriptor.
    pub fn descriptor(&self) -> &CandidateDescriptor {
        &self.descriptor
    }

    /// Absolute candidate URL.
    pub fn url(&self) -> &Url {
        &self.descriptor.url
    }

    /// Score assigned at ranking time.
    pub fn score(&self) -> i64 {
        self.score
    }
}

/// Scores every descriptor and orders them by descending score.
///
/// The sort is stable, so equal scores keep discovery order.
pub fn rank_by<F>(candidates: Vec<CandidateDescriptor>, mut score: F) -> Vec<RankedCandidate>
where
    F: FnMut(&CandidateDescriptor) -> i64,
{
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|descriptor| {
            let value = score(&descriptor);
            RankedCandidate::new(descriptor, value)
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}
