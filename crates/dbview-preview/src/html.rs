use regex::Regex;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPreview {
    pub url: String,
    pub title: String,
    pub favicon: String,
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"))
}

fn link_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>").expect("valid link regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attribute regex")
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    attr_re().captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
    })
}

/// Favicon service URL used when the page declares no icon.
pub fn fallback_favicon(page_url: &Url) -> String {
    format!(
        "https://www.google.com/s2/favicons?domain={}",
        page_url.host_str().unwrap_or_default()
    )
}

/// Extract the title and first `rel*=icon` link from a page.
///
/// Missing titles fall back to the URL itself; relative icon hrefs resolve
/// against the page URL.
pub fn parse_preview(page_url: &Url, html: &str) -> LinkPreview {
    let title = title_re()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| page_url.to_string());

    let favicon = link_tag_re()
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| {
            attribute(tag, "rel")
                .map(|rel| rel.to_ascii_lowercase().contains("icon"))
                .unwrap_or(false)
        })
        .find_map(|tag| attribute(tag, "href"))
        .and_then(|href| page_url.join(&decode_entities(href)).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| fallback_favicon(page_url));

    LinkPreview {
        url: page_url.to_string(),
        title,
        favicon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/docs/page.html").unwrap()
    }

    #[test]
    fn extracts_title_and_relative_icon() {
        let html = r#"
            <html><head>
              <title>
                Rust &amp; SQLite
              </title>
              <link rel="stylesheet" href="/style.css">
              <link REL='shortcut icon' href='../favicon.ico'>
            </head></html>
        "#;
        let preview = parse_preview(&page(), html);
        assert_eq!(preview.title, "Rust & SQLite");
        assert_eq!(preview.favicon, "https://example.com/favicon.ico");
    }

    #[test]
    fn falls_back_to_url_and_favicon_service() {
        let preview = parse_preview(&page(), "<html><body>no head</body></html>");
        assert_eq!(preview.title, "https://example.com/docs/page.html");
        assert_eq!(
            preview.favicon,
            "https://www.google.com/s2/favicons?domain=example.com"
        );
    }

    #[test]
    fn href_before_rel_is_found() {
        let html = r#"<link href="https://cdn.example.net/i.png" rel=icon>"#;
        let preview = parse_preview(&page(), html);
        assert_eq!(preview.favicon, "https://cdn.example.net/i.png");
    }
}
