use crate::config::ParamPolicy;
use crate::UrlError;
use url::Url;

/// Default tracking-parameter block list, mirrored from
/// `config::DiscoveryConfig`'s default so callers that don't have a loaded
/// `Config` handy (e.g. doctests) still get sane behavior.
pub const DEFAULT_BLOCK_LIST: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
];

/// Normalizes a URL to its canonical, deduplication-identity form using the
/// default tracking-parameter block list and the `strip` query policy.
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let block_list: Vec<String> = DEFAULT_BLOCK_LIST.iter().map(|s| s.to_string()).collect();
    normalize_url_with_policy(url_str, &block_list, ParamPolicy::Strip)
}

/// Normalizes a URL under an explicit tracking-parameter block list and
/// query-parameter policy, as configured by `discovery.blockList` /
/// `discovery.paramPolicy`.
///
/// Normalization: lowercase scheme, lowercase + punycode host (handled by
/// the underlying URL parser), elide the default port for the scheme,
/// remove `.`/`..` path segments, remove the fragment, then apply the query
/// policy:
/// - `strip`: drop the query string entirely.
/// - `keep`: retain every parameter, sorted for determinism.
/// - `sample`: drop parameters in the block list, sort what remains.
pub fn normalize_url_with_policy(
    url_str: &str,
    block_list: &[String],
    param_policy: ParamPolicy,
) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "only http and https schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }
    // `Url::parse` already lowercases and IDNA-encodes the host.

    if let Some(port) = url.port() {
        let is_default = (url.scheme() == "http" && port == 80) || (url.scheme() == "https" && port == 443);
        if is_default {
            url.set_port(None)
                .map_err(|_| UrlError::Malformed("failed to elide default port".to_string()))?;
        }
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    match param_policy {
        ParamPolicy::Strip => {
            url.set_query(None);
        }
        ParamPolicy::Keep => {
            let mut params: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            params.sort();
            set_query_params(&mut url, params);
        }
        ParamPolicy::Sample => {
            let mut params: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !is_tracking_param(key, block_list))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            params.sort();
            set_query_params(&mut url, params);
        }
    }

    Ok(url)
}

fn set_query_params(url: &mut Url, params: Vec<(String, String)>) {
    if params.is_empty() {
        url.set_query(None);
        return;
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    url.set_query(Some(&query));
}

/// Removes `.`/`..` path segments (RFC 3986 §5.2.4), preserving a trailing
/// slash if the input path had one.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let ends_with_slash = path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut result = format!("/{}", segments.join("/"));
    if ends_with_slash && !result.ends_with('/') {
        result.push('/');
    }
    result
}

fn is_tracking_param(key: &str, block_list: &[String]) -> bool {
    block_list.iter().any(|p| p == key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(u: &str) -> String {
        normalize_url(u).unwrap().to_string()
    }

    #[test]
    fn test_lowercases_scheme_and_host() {
        assert_eq!(strip("HTTPS://EXAMPLE.COM/Page"), "https://example.com/Page");
    }

    #[test]
    fn test_preserves_path_case() {
        assert_eq!(strip("https://example.com/MixedCase"), "https://example.com/MixedCase");
    }

    #[test]
    fn test_elides_default_port() {
        assert_eq!(strip("https://example.com:443/p"), "https://example.com/p");
        assert_eq!(strip("http://example.com:80/p"), "http://example.com/p");
    }

    #[test]
    fn test_keeps_non_default_port() {
        assert_eq!(strip("https://example.com:8443/p"), "https://example.com:8443/p");
    }

    #[test]
    fn test_removes_fragment() {
        assert_eq!(strip("https://example.com/page#section"), "https://example.com/page");
    }

    #[test]
    fn test_strip_policy_drops_all_query_params() {
        assert_eq!(
            strip("https://example.com/page?keep=yes&utm_medium=x"),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_sample_policy_filters_block_list_and_sorts() {
        let block: Vec<String> = DEFAULT_BLOCK_LIST.iter().map(|s| s.to_string()).collect();
        let url = normalize_url_with_policy(
            "https://example.com/page?b=2&utm_source=a&a=1",
            &block,
            ParamPolicy::Sample,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_keep_policy_retains_everything_sorted() {
        let url = normalize_url_with_policy(
            "https://example.com/page?b=2&utm_source=a",
            &[],
            ParamPolicy::Keep,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?b=2&utm_source=a");
    }

    #[test]
    fn test_normalize_path_removes_dot_segments() {
        assert_eq!(strip("https://example.com/a/../b/./c"), "https://example.com/b/c");
    }

    #[test]
    fn test_preserves_trailing_slash() {
        assert_eq!(strip("https://example.com/page/"), "https://example.com/page/");
        assert_eq!(strip("https://example.com/page"), "https://example.com/page");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        assert_eq!(strip("https://example.com"), "https://example.com/");
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url_rejected() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_idempotence_property() {
        let cases = [
            "http://EXAMPLE.com:80/a/../b/?utm_source=x#frag",
            "https://example.com/",
            "https://example.com/page?z=1&a=2",
        ];
        for c in cases {
            let once = strip(c);
            let twice = normalize_url(&once).unwrap().to_string();
            assert_eq!(once, twice, "normalize(normalize(U)) != normalize(U) for {}", c);
        }
    }
}
