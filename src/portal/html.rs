//! Scraping helpers for the portal's HTML fragments
//!
//! The portal answers catalog requests with bare `<option>` lists and resource
//! requests with markup whose `onclick` handlers carry the download targets.
//! Nothing here needs a DOM; a handful of precompiled patterns is enough.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::model::ResourceSource;

/// `<option ...>text` (closing tag optional)
static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<option\b([^>]*)>([^<]*)").unwrap());
/// Any opening tag with its attribute block and the text right after it
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>([^<]*)").unwrap());
/// `name="value"`, `name='value'` or `name=value`
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});
static LOAD_IFRAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"loadIframe\('([^']+)'").unwrap());
static DOWNLOAD_DOC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"downloadcoursedoc\('([^']+)'").unwrap());
static DISPOSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\*?=["']?(?:UTF-8'')?([^"';\n]+)"#).unwrap());

/// A `value`/label pair from an `<option>` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub value: String,
    pub label: String,
}

/// A download target scraped from a resource page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedLink {
    pub title: Option<String>,
    pub source: ResourceSource,
}

/// Parse every `<option>` with both a non-empty value and label
pub fn parse_options(html: &str) -> Vec<OptionEntry> {
    OPTION_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let value = attribute(&caps[1], "value").map(|v| clean_id(&v))?;
            let label = decode_entities(caps[2].trim());
            if value.is_empty() || label.is_empty() {
                return None;
            }
            Some(OptionEntry { value, label })
        })
        .collect()
}

/// Whether the body contains an option list at all
pub fn has_option_list(html: &str) -> bool {
    html.to_ascii_lowercase().contains("<option")
}

/// Strip the escaped quotes and backslashes the portal wraps ids in
pub fn clean_id(raw: &str) -> String {
    raw.trim()
        .replace('\\', "")
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Value of the hidden `_csrf` input on the login page
pub fn extract_csrf(html: &str) -> Option<String> {
    TAG_RE
        .captures_iter(html)
        .filter(|caps| caps[1].eq_ignore_ascii_case("input"))
        .find(|caps| attribute(&caps[2], "name").as_deref() == Some("_csrf"))
        .and_then(|caps| attribute(&caps[2], "value"))
        .filter(|token| !token.is_empty())
}

/// Whether a response is the login form, meaning the session is gone
pub fn looks_like_login_page(html: &str) -> bool {
    html.contains("j_spring_security_check") || html.contains("name=\"j_password\"")
}

/// Find download targets in `onclick` handlers
///
/// Two handler shapes are known: `loadIframe('/Academy/...downloadslidecoursedoc...#...')`
/// for slides, and `downloadcoursedoc('<doc id>')` for everything else.
pub fn parse_download_links(html: &str, base_url: &str) -> Vec<ListedLink> {
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).ok();
    let mut links = Vec::new();

    for caps in TAG_RE.captures_iter(html) {
        let Some(onclick) = attribute(&caps[2], "onclick") else {
            continue;
        };
        let text = decode_entities(caps[3].trim());
        let title = (!text.is_empty()).then_some(text);

        let url = if onclick.contains("downloadslidecoursedoc") {
            LOAD_IFRAME_RE
                .captures(&onclick)
                .map(|m| m[1].split('#').next().unwrap_or_default().to_string())
                .filter(|path| path.starts_with("/Academy"))
                .and_then(|path| base.as_ref()?.join(&path).ok())
                .map(|url| url.to_string())
        } else if onclick.contains("downloadcoursedoc") {
            DOWNLOAD_DOC_RE.captures(&onclick).map(|m| {
                format!(
                    "{}/s/referenceMeterials/downloadcoursedoc/{}",
                    base_url.trim_end_matches('/'),
                    &m[1]
                )
            })
        } else {
            None
        };

        if let Some(url) = url {
            links.push(ListedLink {
                title,
                source: ResourceSource::Link(url),
            });
        }
    }

    links
}

/// File name from a `Content-Disposition` header
pub fn filename_from_disposition(header: &str) -> Option<String> {
    DISPOSITION_RE
        .captures(header)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Some endpoints wrap their HTML in a JSON string
pub fn unwrap_json_string(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(trimmed) {
            return inner;
        }
    }
    body.to_string()
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTR_RE
        .captures_iter(attrs)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .and_then(|caps| caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)))
        .map(|m| decode_entities(m.as_str()))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.pesuacademy.com/Academy";

    #[test]
    fn test_parse_options_skips_placeholders() {
        let html = r#"
            <option value="">Select</option>
            <option value=\"20967\">UE23CS341A - Software Engineering</option>
            <option value='20968'>UE23CS342A - Compilers &amp; Tools</option>
        "#;
        let options = parse_options(html);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].value, "20967");
        assert_eq!(options[0].label, "UE23CS341A - Software Engineering");
        assert_eq!(options[1].label, "UE23CS342A - Compilers & Tools");
    }

    #[test]
    fn test_parse_options_without_closing_tags() {
        let html = "<select><option value=1>Unit 1: Basics<option value=2>Unit 2: Trees</select>";
        let options = parse_options(html);
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].value, "2");
        assert_eq!(options[1].label, "Unit 2: Trees");
    }

    #[test]
    fn test_clean_id() {
        assert_eq!(clean_id(r#"\"123\""#), "123");
        assert_eq!(clean_id(" '45' "), "45");
    }

    #[test]
    fn test_extract_csrf() {
        let html = r#"<form><input type="hidden" name="_csrf" value="abc-123"/><input name="j_username"></form>"#;
        assert_eq!(extract_csrf(html).as_deref(), Some("abc-123"));
        assert_eq!(extract_csrf("<form></form>"), None);
    }

    #[test]
    fn test_login_page_detection() {
        assert!(looks_like_login_page(r#"<form action="j_spring_security_check">"#));
        assert!(!looks_like_login_page("<option value=1>Unit</option>"));
    }

    #[test]
    fn test_parse_download_links() {
        let html = r##"
            <div onclick="loadIframe('/Academy/s/referenceMeterials/downloadslidecoursedoc/abc#view=FitH', 'x')">Slide 1</div>
            <a href="#" onclick="downloadcoursedoc('9f8e7d')">Notes.pdf</a>
            <span onclick="somethingElse()">ignored</span>
        "##;
        let links = parse_download_links(html, BASE);
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].source,
            ResourceSource::Link(
                "https://www.pesuacademy.com/Academy/s/referenceMeterials/downloadslidecoursedoc/abc".to_string()
            )
        );
        assert_eq!(links[0].title.as_deref(), Some("Slide 1"));
        assert_eq!(
            links[1].source,
            ResourceSource::Link(format!("{}/s/referenceMeterials/downloadcoursedoc/9f8e7d", BASE))
        );
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="Unit 1.pptx""#).as_deref(),
            Some("Unit 1.pptx")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename*=UTF-8''notes.pdf").as_deref(),
            Some("notes.pdf")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn test_unwrap_json_string() {
        let body = r#""<option value=\"1\">Class 1</option>""#;
        let html = unwrap_json_string(body);
        assert_eq!(parse_options(&html)[0].label, "Class 1");
        assert_eq!(unwrap_json_string("<option>"), "<option>");
    }
}
