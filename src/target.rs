//! Request target normalization.

use crate::error::TargetError;
use percent_encoding::percent_decode_str;
use url::Url;

/// Turns a bare domain, full URL or path-encoded URL into an absolute URL.
///
/// Values without a scheme default to `https`. Path captures that lost one
/// slash of the scheme separator (`https:/example.com`) are repaired, and a
/// fully percent-encoded URL is decoded first.
pub fn normalize_target(raw: &str) -> Result<Url, TargetError> {
    let mut value = raw.trim().trim_start_matches('/').to_string();
    if value.is_empty() {
        return Err(TargetError::Missing);
    }
    if value.to_ascii_lowercase().contains("%3a%2f%2f") {
        value = percent_decode_str(&value)
            .decode_utf8()
            .map_err(|_| TargetError::Invalid(raw.to_string()))?
            .into_owned();
    }

    let lower = value.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        value
    } else if let Some(rest) = strip_scheme_prefix(&value, &lower) {
        rest
    } else if value.contains("://") {
        return Err(TargetError::Invalid(raw.to_string()));
    } else {
        format!("https://{value}")
    };

    let url = Url::parse(&candidate).map_err(|_| TargetError::Invalid(raw.to_string()))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(TargetError::Invalid(raw.to_string())),
    }
}

fn strip_scheme_prefix(value: &str, lower: &str) -> Option<String> {
    for scheme in ["https:/", "http:/"] {
        if lower.starts_with(scheme) {
            let rest = value[scheme.len()..].trim_start_matches('/');
            return Some(format!("{scheme}/{rest}"));
        }
    }
    None
}
