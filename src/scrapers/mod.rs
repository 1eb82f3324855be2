use crate::error::{Result, ScrapeError};
use scraper::{ElementRef, Selector};

pub(crate) mod news;
pub(crate) mod roster;
pub(crate) mod schedule;
pub(crate) mod transfers;

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector(e.to_string()))
}

/// Text of an element with nested nodes joined and whitespace collapsed.
pub fn element_text(element: &ElementRef) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a possibly relative `href` against a base URL. Upstream pages mix
/// absolute links, root-relative paths and bare page names.
pub fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if let Some(path) = href.strip_prefix('/') {
        let root = base
            .find("://")
            .and_then(|scheme_end| {
                base[scheme_end + 3..]
                    .find('/')
                    .map(|host_end| &base[..scheme_end + 3 + host_end])
            })
            .unwrap_or(base);
        return format!("{root}/{path}");
    }
    match base.rfind('/') {
        Some(idx) if idx > base.find("://").map(|i| i + 2).unwrap_or(0) => {
            format!("{}/{}", &base[..idx], href)
        }
        _ => format!("{}/{}", base.trim_end_matches('/'), href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolutizes_relative_links() {
        assert_eq!(
            absolutize("https://example.com/cms/news.xhtml", "/popup/match.xhtml"),
            "https://example.com/popup/match.xhtml"
        );
        assert_eq!(
            absolutize("https://example.com/cms/news.xhtml", "article-1.html"),
            "https://example.com/cms/article-1.html"
        );
        assert_eq!(
            absolutize("https://example.com/", "https://other.org/x"),
            "https://other.org/x"
        );
        assert_eq!(
            absolutize("https://example.com/a", "//cdn.example.com/img.png"),
            "https://cdn.example.com/img.png"
        );
    }
}
