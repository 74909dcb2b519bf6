//! HTML parser for extracting links and page content
//!
//! This module handles parsing HTML content to extract:
//! - Page title
//! - Visible text (script and style content removed)
//! - Links to submit back to the scheduler (from <a> tags and canonical links)

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose text is never part of the page content
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Visible text with whitespace collapsed
    pub text: String,

    /// Links found on the page (absolute URLs, first occurrence order)
    pub links: Vec<String>,
}

/// Parses HTML content and extracts title, text and links
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
/// - Links to other hosts when `same_domain_only` is set
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
/// * `same_domain_only` - Keep only links on the host of `base_url`
///
/// # Example
///
/// ```
/// use crawl_queue::processor::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url, false);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url, same_domain_only: bool) -> ParsedPage {
    let document = Html::parse_document(html);
    extract_page(&document, base_url, same_domain_only)
}

/// Extracts title, text and links from an already parsed document
pub fn extract_page(document: &Html, base_url: &Url, same_domain_only: bool) -> ParsedPage {
    let mut links = extract_links(document, base_url);
    if same_domain_only {
        links.retain(|link| is_same_host(link, base_url));
    }

    ParsedPage {
        title: extract_title(document),
        text: extract_text(document),
        links,
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts the visible text of the document
fn extract_text(document: &Html) -> String {
    let mut words: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|element| HIDDEN_ELEMENTS.contains(&element.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        words.extend(text.split_whitespace());
    }

    words.join(" ")
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |href: &str| {
        if let Some(absolute_url) = resolve_link(href, base_url) {
            if seen.insert(absolute_url.clone()) {
                links.push(absolute_url);
            }
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}

fn is_same_host(link: &str, base_url: &Url) -> bool {
    Url::parse(link)
        .map(|url| url.host_str() == base_url.host_str())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn parse(html: &str) -> ParsedPage {
        parse_html(html, &base_url(), false)
    }

    #[test]
    fn test_extract_title() {
        let parsed = parse(r#"<html><head><title>  Test Page  </title></head><body></body></html>"#);
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let parsed = parse(r#"<html><head></head><body></body></html>"#);
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_extract_text_skips_scripts_and_styles() {
        let html = r#"
            <html>
            <head><style>body { color: red; }</style></head>
            <body>
                <h1>Hello</h1>
                <script>var x = 1;</script>
                <p>   crawl
                   world </p>
            </body>
            </html>
        "#;
        let parsed = parse(html);
        assert_eq!(parsed.text, "Hello crawl world");
    }

    #[test]
    fn test_extract_relative_link() {
        let parsed = parse(r#"<html><body><a href="/other">Link</a></body></html>"#);
        assert_eq!(parsed.links, vec!["https://example.com/other".to_string()]);
    }

    #[test]
    fn test_skip_special_links() {
        let html = r##"
            <html><body>
                <a href="javascript:void(0)">js</a>
                <a href="mailto:test@example.com">mail</a>
                <a href="tel:+1234567890">call</a>
                <a href="data:text/html,hi">data</a>
                <a href="#section">jump</a>
                <a href="/file.pdf" download>file</a>
                <a href="ftp://example.com/file">ftp</a>
            </body></html>
        "##;
        assert!(parse(html).links.is_empty());
    }

    #[test]
    fn test_extract_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head><body></body></html>"#;
        let parsed = parse(html);
        assert!(parsed
            .links
            .contains(&"https://example.com/canonical".to_string()));
    }

    #[test]
    fn test_links_are_deduplicated_in_order() {
        let html = r#"
            <html><body>
                <a href="/b">B</a>
                <a href="/a">A</a>
                <a href="https://example.com/b">B again</a>
            </body></html>
        "#;
        assert_eq!(
            parse(html).links,
            vec![
                "https://example.com/b".to_string(),
                "https://example.com/a".to_string(),
            ]
        );
    }

    #[test]
    fn test_same_domain_only() {
        let html = r#"
            <html><body>
                <a href="/local">Local</a>
                <a href="https://other.com/page">Other</a>
            </body></html>
        "#;
        let parsed = parse_html(html, &base_url(), true);
        assert_eq!(parsed.links, vec!["https://example.com/local".to_string()]);
    }
}
