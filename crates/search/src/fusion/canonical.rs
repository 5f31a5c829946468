//! Canonical evidence keys
//!
//! Precedence: normalized URL, then explicit id, then a SHA-256 content
//! hash of `title || snippet`.

use sha2::{Digest, Sha256};
use url::Url;

use crate::types::SearchHit;

/// Query parameters that only track the visitor
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "igshid", "yclid", "_hsenc", "_hsmi",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Scheme-less normalized form of a URL, or `None` if it cannot be parsed
///
/// Drops scheme, `www.`, fragment and tracking parameters; sorts the rest
/// and trims a trailing slash from non-root paths.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", raw)).ok())?;

    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }

    let mut out = String::from(host);
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{}", port));
    }

    let path = parsed.path();
    if path.len() > 1 {
        out.push_str(path.strip_suffix('/').unwrap_or(path));
    }

    if let Some(query) = parsed.query() {
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .filter(|p| !is_tracking_param(p.split('=').next().unwrap_or_default()))
            .collect();
        if !params.is_empty() {
            params.sort_unstable();
            out.push('?');
            out.push_str(&params.join("&"));
        }
    }

    Some(out)
}

/// Hex SHA-256 of `title || snippet`
pub fn content_hash(title: &str, snippet: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"||");
    hasher.update(snippet.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity of a hit within one fusion pass
pub fn canonical_key(hit: &SearchHit) -> String {
    if let Some(url) = hit.url.as_deref().and_then(normalize_url) {
        return format!("url:{}", url);
    }
    if let Some(id) = hit.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        return format!("id:{}", id);
    }
    format!("hash:{}", content_hash(&hit.title, &hit.snippet))
}
