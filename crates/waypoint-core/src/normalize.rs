use crate::error::CoreError;
use url::{Host, Url};

const MAX_URL_LENGTH: usize = 2000;
const MAX_HOST_LABELS: usize = 5;
const MAX_PUNYCODE_LABEL_LENGTH: usize = 34;

/// Canonicalizes a URL string into the key used for duplicate detection.
///
/// This is a total function: if the input does not parse as a URL it falls
/// back to a lowercased, trimmed copy. For parseable URLs it lowercases the
/// host, strips the scheme's default port, drops the fragment, sorts query
/// parameters lexicographically by their serialized `key=value` form, and
/// strips one trailing slash from the end of the URL string (a bare `/`
/// path is restored by serialization, so `https://example.com/` is stable).
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();

    // The trailing slash is a suffix of the whole URL string, so it is
    // removed before parsing: it may terminate the path or the last
    // query value, and after parsing it would be stuck inside the pair.
    let stripped = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let Ok(mut url) = Url::parse(stripped).or_else(|_| Url::parse(trimmed)) else {
        return trimmed.to_lowercase();
    };

    // The parser already lowercases the scheme and host and omits the
    // default port for http/https/ftp when serializing.
    url.set_fragment(None);

    match url.query() {
        Some("") => url.set_query(None),
        Some(query) => {
            let mut pairs: Vec<&str> = query.split('&').collect();
            pairs.sort_unstable();
            let sorted = pairs.join("&");
            url.set_query(Some(&sorted));
        }
        None => {}
    }

    url.to_string()
}

/// Pluggable best-effort heuristic for flagging suspicious URLs.
///
/// Returns a human-readable reason when the URL looks suspicious, `None`
/// otherwise. This is a defensive filter, not a security boundary; the
/// default keyword list makes no claim of completeness.
pub trait SuspicionFilter: Send + Sync {
    fn check(&self, url: &Url) -> Option<String>;
}

/// Default filter: a small substring blocklist plus a check for overlong
/// punycode host labels (a cheap homograph heuristic).
#[derive(Debug, Clone)]
pub struct DefaultSuspicionFilter {
    keywords: Vec<String>,
}

impl DefaultSuspicionFilter {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for DefaultSuspicionFilter {
    fn default() -> Self {
        Self::new([
            "phish",
            "verify-account",
            "account-verify",
            "login-secure",
            "secure-login",
            "wallet-connect",
        ])
    }
}

impl SuspicionFilter for DefaultSuspicionFilter {
    fn check(&self, url: &Url) -> Option<String> {
        let serialized = url.as_str().to_lowercase();
        for keyword in &self.keywords {
            if serialized.contains(keyword.as_str()) {
                return Some(format!("contains blocklisted substring '{}'", keyword));
            }
        }

        if let Some(Host::Domain(domain)) = url.host() {
            for label in domain.split('.') {
                if label.starts_with("xn--") && label.len() > MAX_PUNYCODE_LABEL_LENGTH {
                    return Some(format!("overlong punycode label '{}'", label));
                }
            }
        }

        None
    }
}

/// Validation gate applied to creation requests before normalization.
///
/// Best-effort filtering of inputs that are syntactically URLs but that a
/// shortener has no business pointing at.
pub fn validate_url(input: &str, filter: &dyn SuspicionFilter) -> Result<(), CoreError> {
    if input.len() > MAX_URL_LENGTH {
        return Err(CoreError::InvalidUrl(format!(
            "length {} exceeds the maximum of {}",
            input.len(),
            MAX_URL_LENGTH
        )));
    }

    let url = Url::parse(input.trim())
        .map_err(|e| CoreError::InvalidUrl(format!("not a parseable URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" | "ftp" => {}
        other => {
            return Err(CoreError::InvalidUrl(format!(
                "scheme must be http, https or ftp, got '{}'",
                other
            )));
        }
    }

    match url.host() {
        None => {
            return Err(CoreError::InvalidUrl("missing host".to_string()));
        }
        Some(Host::Domain(domain)) => {
            if !domain.contains('.') && domain != "localhost" {
                return Err(CoreError::InvalidUrl(format!(
                    "host '{}' must contain a dot or be 'localhost'",
                    domain
                )));
            }
            if domain.split('.').count() > MAX_HOST_LABELS {
                return Err(CoreError::InvalidUrl(format!(
                    "host '{}' has more than {} labels",
                    domain, MAX_HOST_LABELS
                )));
            }
        }
        Some(Host::Ipv4(ip)) => {
            if !(ip.is_loopback() || ip.is_private()) {
                return Err(CoreError::InvalidUrl(format!(
                    "bare public IP host '{}' is not allowed",
                    ip
                )));
            }
        }
        Some(Host::Ipv6(ip)) => {
            if !ip.is_loopback() {
                return Err(CoreError::InvalidUrl(format!(
                    "bare IPv6 host '{}' is not allowed",
                    ip
                )));
            }
        }
    }

    if let Some(reason) = filter.check(&url) {
        return Err(CoreError::InvalidUrl(format!("suspicious URL: {}", reason)));
    }

    Ok(())
}
