//! HTTP fetch capability used by discovery and resolution.

use crate::controls::ResolveControls;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::fmt;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Streamed response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Errors produced by a [`Fetcher`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The remote host could not be reached or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// The body exceeded the configured byte limit.
    #[error("body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// A `data:` URI could not be decoded.
    #[error("invalid data uri: {0}")]
    InvalidDataUrl(String),
    /// The URL scheme is neither http(s) nor data.
    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),
}

impl FetchError {
    /// True when the failure means the host was unreachable rather than
    /// answering with something unusable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Raw `Content-Type` header.
    pub content_type: Option<String>,
    /// `Content-Length` header, when present.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response whose body has not been read yet.
pub struct FetchResponse {
    /// Status line and headers.
    pub head: ResponseHead,
    /// Body chunks.
    pub body: BodyStream,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// Wraps an in-memory body.
    pub fn from_bytes(head: ResponseHead, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            head,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// Reads the whole body, failing once it grows past `limit` bytes.
    pub async fn bytes(self, limit: usize) -> Result<Bytes, FetchError> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.try_next().await? {
            if buffer.len() + chunk.len() > limit {
                return Err(FetchError::BodyTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Reads body chunks until roughly `limit` bytes are buffered, then stops.
    ///
    /// Truncation is silent; callers scanning a document prefix use this.
    pub async fn prefix_chunks(self, limit: usize) -> Result<Vec<Bytes>, FetchError> {
        let mut chunks = Vec::new();
        let mut total = 0usize;
        let mut body = self.body;
        while let Some(chunk) = body.try_next().await? {
            let remaining = limit.saturating_sub(total);
            if chunk.len() >= remaining {
                chunks.push(chunk.slice(..remaining));
                break;
            }
            total += chunk.len();
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

/// Network capability consumed by the resolver.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issues a GET, following redirects.
    async fn get(&self, url: &Url) -> Result<FetchResponse, FetchError>;

    /// Issues a HEAD, following redirects.
    async fn head(&self, url: &Url) -> Result<ResponseHead, FetchError>;
}

/// Fetches `url`, decoding `data:` URIs locally instead of touching the network.
pub async fn open<F>(fetcher: &F, url: &Url) -> Result<FetchResponse, FetchError>
where
    F: Fetcher + ?Sized,
{
    match url.scheme() {
        "data" => decode_data_url(url),
        "http" | "https" => fetcher.get(url).await,
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

/// Decodes a `data:[<media type>][;base64],<payload>` URI into a response.
pub fn decode_data_url(url: &Url) -> Result<FetchResponse, FetchError> {
    let raw = url
        .as_str()
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::InvalidDataUrl("missing data: prefix".to_string()))?;
    let (meta, payload) = raw
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidDataUrl("missing `,` separator".to_string()))?;

    let mut params = meta.split(';');
    let media_type = params
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("text/plain")
        .to_string();
    let is_base64 = params.any(|param| param.trim().eq_ignore_ascii_case("base64"));

    let decoded: Vec<u8> = percent_decode_str(payload).collect();
    let body = if is_base64 {
        let compact: Vec<u8> = decoded
            .into_iter()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect();
        BASE64
            .decode(compact)
            .map_err(|err| FetchError::InvalidDataUrl(err.to_string()))?
    } else {
        decoded
    };

    let head = ResponseHead {
        url: url.clone(),
        status: 200,
        content_type: Some(media_type),
        content_length: Some(body.len() as u64),
    };
    Ok(FetchResponse::from_bytes(head, body))
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a client with the configured user agent and request timeout.
    pub fn new(controls: &ResolveControls) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(controls.user_agent())
            .timeout(controls.candidate_timeout())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn head_from(url: &Url, status: u16, headers: &HeaderMap) -> ResponseHead {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    ResponseHead {
        url: url.clone(),
        status,
        content_type,
        content_length,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let head = head_from(response.url(), response.status().as_u16(), response.headers());
        let body = response.bytes_stream().map_err(FetchError::from).boxed();
        Ok(FetchResponse { head, body })
    }

    async fn head(&self, url: &Url) -> Result<ResponseHead, FetchError> {
        let response = self.client.head(url.clone()).send().await?;
        Ok(head_from(
            response.url(),
            response.status().as_u16(),
            response.headers(),
        ))
    }
}
