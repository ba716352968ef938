//! RSS link discovery in HTML pages.
//!
//! Some feed URLs actually point at the site's HTML; the page usually
//! advertises its feed through a `<link type="application/rss+xml">` tag.

use scraper::{Html, Selector};
use url::Url;

/// Find the advertised RSS feed URL in an HTML page.
///
/// Returns `None` when the body doesn't look like HTML, carries no feed
/// link, or the href can't be resolved. Relative hrefs resolve against
/// the page URL's origin.
pub fn extract_rss_from_html(body: &str, page_url: &str) -> Option<String> {
    if !looks_like_html(body) {
        return None;
    }

    let document = Html::parse_document(body);
    let selector = Selector::parse(r#"link[type="application/rss+xml"]"#).ok()?;
    let href = document
        .select(&selector)
        .find_map(|el| el.value().attr("href"))?;

    resolve_href(href, page_url)
}

/// Cheap sniff for an HTML document.
fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<html")
}

/// Resolve a possibly-relative href against the page URL.
fn resolve_href(href: &str, page_url: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base = Url::parse(page_url).ok()?;
    if let Some(path) = href.strip_prefix('/') {
        return Some(format!("{}/{}", base.origin().ascii_serialization(), path));
    }
    base.join(href).ok().map(|u| u.to_string())
}
