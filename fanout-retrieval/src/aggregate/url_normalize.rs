//! URL canonicalisation for cross-lane document identity.
//!
//! Two documents whose URLs differ only in case, a `www.` prefix, a
//! default port, a trailing slash, tracking parameters, parameter order
//! or a fragment are treated as the same document.

use url::Url;

/// Query parameters dropped before comparison.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "ref",
    "si",
    "feature",
];

/// Canonicalise `raw` for identity comparison.
///
/// Unparseable input is returned trimmed but otherwise unchanged.
///
/// ```
/// use fanout_retrieval::aggregate::url_normalize::normalize_url;
///
/// let a = normalize_url("https://WWW.Example.com/path/?b=2&a=1&utm_source=x#top");
/// let b = normalize_url("https://example.com/path?a=1&b=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    parsed.set_fragment(None);

    if matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    ) {
        let _ = parsed.set_port(None);
    }

    if let Some(bare) = parsed
        .host_str()
        .and_then(|h| h.strip_prefix("www."))
        .map(str::to_owned)
    {
        let _ = parsed.set_host(Some(&bare));
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(&params);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Path"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn strips_www_prefix() {
        assert_eq!(
            normalize_url("https://www.rust-lang.org/learn"),
            "https://rust-lang.org/learn"
        );
    }

    #[test]
    fn removes_trailing_slash_but_keeps_root() {
        assert_eq!(normalize_url("https://example.com/path/"), "https://example.com/path");
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn removes_default_ports_only() {
        assert_eq!(normalize_url("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(normalize_url("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(
            normalize_url("https://example.com:8080/a"),
            "https://example.com:8080/a"
        );
    }

    #[test]
    fn sorts_params_and_drops_tracking() {
        assert_eq!(
            normalize_url("https://example.com/s?z=1&utm_medium=x&a=2&gclid=y"),
            "https://example.com/s?a=2&z=1"
        );
    }

    #[test]
    fn tracking_param_match_ignores_case() {
        assert_eq!(
            normalize_url("https://example.com/p?q=t&UTM_Source=feed"),
            "https://example.com/p?q=t"
        );
    }

    #[test]
    fn removes_fragment() {
        assert_eq!(normalize_url("https://example.com/p#s"), "https://example.com/p");
    }

    #[test]
    fn unparseable_input_is_trimmed_only() {
        assert_eq!(normalize_url("  not a url "), "not a url");
        assert_eq!(normalize_url(""), "");
    }
}
