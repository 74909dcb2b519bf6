use url::Url;

/// Extracts the lowercase host from a URL
///
/// Returns `None` for URLs without a host, which canonical URLs never are.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawl_queue::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8080/post").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
