use url::Url;

/// Extracts the lowercase host from a URL.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use atlas_crawl_core::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the request origin (scheme + host + explicit non-default port)
/// from a URL. This is the key the rate limiter and robots cache key their
/// per-origin state on.
pub fn extract_origin(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}
