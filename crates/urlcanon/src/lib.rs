//! URL normalization and scope checking (registered-domain equality).

use crawlbot_core::CrawlError;
use url::Url;

const REJECTED_SCHEMES: &[&str] = &["javascript", "mailto", "data"];

/// Parse and normalize a raw URL string.
///
/// - Requires scheme http/https and a non-empty host.
/// - Lowercases the host, preserves path case.
/// - Strips a trailing slash from a non-empty path.
/// - Drops the fragment; preserves query.
pub fn normalize(raw: &str) -> Result<Url, CrawlError> {
    let lower_scheme_check = raw.trim().to_lowercase();
    for scheme in REJECTED_SCHEMES {
        if lower_scheme_check.starts_with(&format!("{scheme}:")) {
            return Err(CrawlError::InvalidUrl(format!("rejected scheme: {scheme}")));
        }
    }

    let mut url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(CrawlError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }

    let host = url
        .host_str()
        .ok_or_else(|| CrawlError::InvalidUrl("missing host".to_string()))?
        .to_lowercase();
    url.set_host(Some(&host))?;

    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    } else if path.is_empty() {
        url.set_path("/");
    }

    Ok(url)
}

/// Effective-TLD+1 ("registered domain") of a URL's host, for scope checks.
fn registered_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    psl::domain(host.as_bytes()).map(|d| String::from_utf8_lossy(d.as_bytes()).to_lowercase())
}

/// True if `candidate` shares a registered domain with `seed`. This is the
/// sole scope predicate used by the crawl engine; subdomain boundaries do
/// not stop traversal.
pub fn same_registered_domain(candidate: &Url, seed: &Url) -> bool {
    match (registered_domain(candidate), registered_domain(seed)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_trailing_slash() {
        let u = normalize("https://Example.com/Path/?q=1#frag").unwrap();
        assert_eq!(u.as_str(), "https://example.com/Path?q=1");
    }

    #[test]
    fn empty_path_becomes_slash() {
        let u = normalize("https://example.com").unwrap();
        assert_eq!(u.path(), "/");
    }

    #[test]
    fn rejects_javascript_scheme() {
        assert!(normalize("javascript:alert(1)").is_err());
    }

    #[test]
    fn rejects_mailto_scheme() {
        assert!(normalize("mailto:someone@example.com").is_err());
    }

    #[test]
    fn rejects_missing_host() {
        assert!(normalize("https:///path").is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("https://Example.com/Foo/").unwrap();
        let twice = normalize(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn same_registered_domain_ignores_subdomain() {
        let seed = normalize("https://www.example.com/").unwrap();
        let candidate = normalize("https://blog.example.com/post").unwrap();
        assert!(same_registered_domain(&candidate, &seed));
    }

    #[test]
    fn different_registered_domain_is_out_of_scope() {
        let seed = normalize("https://example.com/").unwrap();
        let candidate = normalize("https://example.org/").unwrap();
        assert!(!same_registered_domain(&candidate, &seed));
    }
}
