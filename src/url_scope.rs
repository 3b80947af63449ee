//! URL normalization and scope admission.
//!
//! `canonicalize` turns a raw URL (optionally relative to a base) into
//! the canonical form URL equality is defined over. `ScopePolicy`
//! decides whether a canonical URL belongs to a Job's crawl scope.

use std::collections::HashSet;

use percent_encoding::percent_decode_str;
use url::Url;

const TRACKING_PREFIXES: &[&str] = &["utm_"];
const TRACKING_EXACT: &[&str] = &["fbclid", "gclid"];

/// Canonicalize a raw URL, optionally resolving it against `base`.
///
/// Returns `None` for non-http(s) schemes, empty hosts, and obvious
/// traps (`mailto:`, `javascript:`, `tel:`, `data:`, bare fragments).
pub fn canonicalize(raw: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    for trap in ["javascript:", "mailto:", "tel:", "data:"] {
        if trimmed
            .get(..trap.len())
            .map(|p| p.eq_ignore_ascii_case(trap))
            .unwrap_or(false)
        {
            return None;
        }
    }

    let parsed = match base {
        Some(b) => b.join(trimmed).ok()?,
        None => Url::parse(trimmed).ok()?,
    };

    normalize(parsed)
}

/// Idempotent re-canonicalization of an already-canonical URL.
pub fn recanonicalize(u: &Url) -> Option<Url> {
    normalize(u.clone())
}

fn normalize(mut u: Url) -> Option<Url> {
    if u.scheme() != "http" && u.scheme() != "https" {
        return None;
    }
    if u.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return None;
    }

    let scheme = u.scheme().to_ascii_lowercase();
    let host = u.host_str()?.to_ascii_lowercase();
    let _ = u.set_scheme(&scheme);
    let _ = u.set_host(Some(&host));

    // Strip default ports.
    let default_port = match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if u.port() == default_port {
        let _ = u.set_port(None);
    }

    u.set_fragment(None);

    // Percent-decode unreserved characters in the path; the
    // structural/reserved ones are left percent-encoded untouched.
    {
        let decoded = decode_unreserved_percent(u.path());
        u.set_path(&decoded);
    }

    // Strip trailing slash except at root.
    {
        let path = u.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            u.set_path(path.trim_end_matches('/'));
        }
    }

    // Remove tracking query keys, sort remaining keys lexicographically.
    if u.query().is_some() {
        let mut pairs: Vec<(String, String)> = u
            .query_pairs()
            .filter(|(k, _)| !is_tracking_key(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if pairs.is_empty() {
            u.set_query(None);
        } else {
            let mut out = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                out.append_pair(k, v);
            }
            u.set_query(Some(&out.finish()));
        }
    }

    Some(u)
}

/// Decode `%XX` triples that encode an RFC 3986 unreserved character
/// (`A-Za-z0-9-._~`); leave every other percent-triple as-is, just
/// upper-casing its hex digits for a stable canonical form.
fn decode_unreserved_percent(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(byte) = percent_decode_str(&path[i..i + 3]).next() {
                let is_unreserved =
                    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~');
                if is_unreserved {
                    out.push(byte as char);
                } else {
                    out.push_str(&path[i..i + 3].to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        let ch_len = path[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&path[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn is_tracking_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p))
        || TRACKING_EXACT.iter().any(|e| lower == *e)
}

/// Host/path scope constraints for one Job. Immutable for the Job's
/// lifetime.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    pub primary_host: String,
    pub allow_subdomains: bool,
    pub additional_hosts: HashSet<String>,
    pub allowed_path_prefixes: Vec<String>,
    pub include_child_pages: bool,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl ScopePolicy {
    pub fn new(primary_host: impl Into<String>) -> Self {
        Self {
            primary_host: primary_host.into().to_ascii_lowercase(),
            allow_subdomains: false,
            additional_hosts: HashSet::new(),
            allowed_path_prefixes: Vec::new(),
            include_child_pages: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Default non-content exclude list: auth/checkout paths and
    /// common binary/media extensions.
    pub fn default_excludes() -> Vec<String> {
        vec![
            "/login", "/logout", "/signup", "/register", "/cart", "/checkout", "/admin",
            "/api/", ".pdf", ".zip", ".exe", ".dmg", ".tar", ".gz", ".mp4", ".mp3", ".wav",
            ".avi", ".mov", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Admission gate: scheme, host, path-prefix, and include/exclude checks.
    pub fn admits(&self, u: &Url) -> bool {
        if u.scheme() != "http" && u.scheme() != "https" {
            return false;
        }
        let host = match u.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };
        let host_ok = host == self.primary_host
            || (self.allow_subdomains && is_dns_suffix(&host, &self.primary_host))
            || self.additional_hosts.contains(&host);
        if !host_ok {
            return false;
        }

        let path = u.path();
        if !self.allowed_path_prefixes.is_empty()
            && !self
                .allowed_path_prefixes
                .iter()
                .any(|p| path_has_prefix(path, p))
        {
            return false;
        }

        let path_lower = path.to_ascii_lowercase();
        if self
            .exclude_patterns
            .iter()
            .any(|p| path_lower.contains(&p.to_ascii_lowercase()))
        {
            return false;
        }
        if !self.include_patterns.is_empty()
            && !self
                .include_patterns
                .iter()
                .any(|p| path_lower.contains(&p.to_ascii_lowercase()))
        {
            return false;
        }

        true
    }

    /// Longest matching prefix, ties broken lexicographically. Used
    /// to tag which scope a URL belongs to in the multi-scope case.
    pub fn match_prefix(&self, u: &Url) -> Option<&str> {
        let path = u.path();
        self.allowed_path_prefixes
            .iter()
            .filter(|p| path_has_prefix(path, p))
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .map(|s| s.as_str())
    }

    /// Whether `u`'s host is the primary host exactly.
    pub fn is_same_domain(&self, u: &Url) -> bool {
        u.host_str()
            .map(|h| h.eq_ignore_ascii_case(&self.primary_host))
            .unwrap_or(false)
    }

    /// Whether `u`'s host is a strict subdomain of the primary host.
    pub fn is_subdomain(&self, u: &Url) -> bool {
        match u.host_str() {
            Some(h) => {
                let h = h.to_ascii_lowercase();
                h != self.primary_host && is_dns_suffix(&h, &self.primary_host)
            }
            None => false,
        }
    }
}

fn is_dns_suffix(host: &str, suffix: &str) -> bool {
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    // `/a/b` matches prefix `/a` but `/ab` must not match prefix `/a`.
    path.len() == prefix.len()
        || prefix.ends_with('/')
        || path.as_bytes()[prefix.len()] == b'/'
}

/// Derive the directory-component prefix set from a set of entry URLs.
/// Computed once up front and frozen, not re-invoked mid-crawl.
pub fn directory_prefixes<'a>(urls: impl Iterator<Item = &'a Url>) -> Vec<String> {
    let mut set: HashSet<String> = HashSet::new();
    for u in urls {
        set.insert(directory_component(u.path()));
    }
    let mut out: Vec<String> = set.into_iter().collect();
    out.sort();
    out
}

fn directory_component(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}
