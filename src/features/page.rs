//! Features read from the fetched page. Tags are picked out with regular
//! expressions; the heuristics only need attribute values, not a DOM.

use super::FeatureValue;
use crate::domain_age::registrable_domain;
use crate::page_fetch::PageSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(a|img|audio|embed|iframe|video|source|link|script|form)\b([^>]*)>").unwrap()
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

static INFO_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)mailto:|\bmail\s*\(").unwrap());

static SCRIPT_MOUSEOVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?onmouseover.*?</script>").unwrap());

static STATUS_BAR_HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)onmouseover\s*=\s*["'][^"']*window\.status"#).unwrap()
});

static RIGHT_CLICK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)event\.button\s*===?\s*2").unwrap());

static POPUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\balert\s*\(|window\.open\s*\(").unwrap());

static HIDDEN_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?i)frameborder\s*=\s*["']?0\b|display\s*:\s*none|visibility\s*:\s*hidden"#,
        r#"|\b(?:width|height)\s*=\s*["']?0\b"#,
    ))
    .unwrap()
});

const EMBEDDED_OBJECT_TAGS: [&str; 6] = ["img", "audio", "embed", "iframe", "video", "source"];

#[derive(Debug, Clone)]
struct Tag<'a> {
    name: String,
    attrs: &'a str,
}

impl Tag<'_> {
    fn attr(&self, name: &str) -> Option<&str> {
        ATTRIBUTE
            .captures_iter(self.attrs)
            .find(|c| c[1].eq_ignore_ascii_case(name))
            .and_then(|c| c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4)))
            .map(|m| m.as_str().trim())
    }
}

/// A fetched page prepared for feature scanning.
pub struct PageView<'a> {
    snapshot: &'a PageSnapshot,
    site: String,
    tags: Vec<Tag<'a>>,
}

impl<'a> PageView<'a> {
    /// `site` is the registrable domain the URL claims to belong to
    pub fn new(snapshot: &'a PageSnapshot, site: &str) -> Self {
        let tags = TAG
            .captures_iter(&snapshot.body)
            .filter_map(|c| {
                let name = c.get(1)?.as_str().to_ascii_lowercase();
                let attrs = c.get(2)?.as_str();
                Some(Tag { name, attrs })
            })
            .collect();

        Self {
            snapshot,
            site: site.to_lowercase(),
            tags,
        }
    }

    fn tags<'s>(&'s self, names: &'s [&'s str]) -> impl Iterator<Item = &'s Tag<'a>> + 's {
        self.tags.iter().filter(move |t| names.contains(&t.name.as_str()))
    }

    /// `Some(true)` when `link` leaves the site, `None` when it cannot be resolved
    fn is_external(&self, link: &str) -> Option<bool> {
        let resolved = self.snapshot.final_url.join(link.trim()).ok()?;
        Some(match resolved.host_str() {
            Some(host) => registrable_domain(host) != self.site,
            None => false,
        })
    }

    fn external_share<'l>(&self, links: impl Iterator<Item = &'l str>) -> f64 {
        let mut total = 0usize;
        let mut external = 0usize;
        for link in links {
            if let Some(is_external) = self.is_external(link) {
                total += 1;
                if is_external {
                    external += 1;
                }
            }
        }
        percentage(external, total)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn bucket(share: f64, low: f64, high: f64) -> FeatureValue {
    if share < low {
        FeatureValue::LEGITIMATE
    } else if share < high {
        FeatureValue::SUSPICIOUS
    } else {
        FeatureValue::PHISHING
    }
}

/// Favicon served from a foreign domain
pub fn favicon(page: &PageView) -> FeatureValue {
    let foreign = page
        .tags(&["link"])
        .filter(|t| t.attr("rel").is_some_and(|rel| rel.to_ascii_lowercase().contains("icon")))
        .filter_map(|t| t.attr("href"))
        .any(|href| page.is_external(href) == Some(true));
    FeatureValue::flag(foreign)
}

/// Share of embedded objects loaded from other domains
pub fn request_url(page: &PageView) -> FeatureValue {
    let share = page.external_share(
        page.tags(&EMBEDDED_OBJECT_TAGS)
            .filter_map(|t| t.attr("src")),
    );
    bucket(share, 22.0, 61.0)
}

/// Share of anchors that go nowhere or leave the site
pub fn anchor_url(page: &PageView) -> FeatureValue {
    let mut total = 0usize;
    let mut unsafe_anchors = 0usize;
    for href in page.tags(&["a"]).filter_map(|t| t.attr("href")) {
        total += 1;
        let lower = href.to_ascii_lowercase();
        if lower.is_empty()
            || lower.starts_with('#')
            || lower.starts_with("javascript")
            || lower.starts_with("mailto")
            || page.is_external(href) != Some(false)
        {
            unsafe_anchors += 1;
        }
    }
    bucket(percentage(unsafe_anchors, total), 31.0, 67.0)
}

/// Share of `<link>` and `<script>` resources from other domains
pub fn links_in_script_tags(page: &PageView) -> FeatureValue {
    let links = page.tags(&["link"]).filter_map(|t| t.attr("href"));
    let scripts = page.tags(&["script"]).filter_map(|t| t.attr("src"));
    bucket(page.external_share(links.chain(scripts)), 17.0, 81.0)
}

/// Where the page's forms submit to
pub fn server_form_handler(page: &PageView) -> FeatureValue {
    let mut result = FeatureValue::LEGITIMATE;
    for form in page.tags(&["form"]) {
        let Some(action) = form.attr("action") else {
            continue;
        };
        if action.is_empty() || action.eq_ignore_ascii_case("about:blank") {
            return FeatureValue::PHISHING;
        }
        if page.is_external(action) == Some(true) {
            result = FeatureValue::SUSPICIOUS;
        }
    }
    result
}

/// Page submits information by mail
pub fn info_email(page: &PageView) -> FeatureValue {
    FeatureValue::flag(INFO_EMAIL.is_match(&page.snapshot.body))
}

pub fn website_forwarding(page: &PageView) -> FeatureValue {
    match page.snapshot.redirects {
        0 | 1 => FeatureValue::LEGITIMATE,
        2..=4 => FeatureValue::SUSPICIOUS,
        _ => FeatureValue::PHISHING,
    }
}

/// Scripts that rewrite the status bar on mouseover
pub fn status_bar_cust(page: &PageView) -> FeatureValue {
    let body = &page.snapshot.body;
    FeatureValue::flag(SCRIPT_MOUSEOVER.is_match(body) || STATUS_BAR_HANDLER.is_match(body))
}

pub fn disable_right_click(page: &PageView) -> FeatureValue {
    FeatureValue::flag(RIGHT_CLICK.is_match(&page.snapshot.body))
}

pub fn using_popup_window(page: &PageView) -> FeatureValue {
    FeatureValue::flag(POPUP.is_match(&page.snapshot.body))
}

/// Invisible frames
pub fn iframe_redirection(page: &PageView) -> FeatureValue {
    let hidden = page
        .tags(&["iframe"])
        .any(|t| HIDDEN_FRAME.is_match(t.attrs));
    FeatureValue::flag(hidden)
}

pub fn links_pointing_to_page(page: &PageView) -> FeatureValue {
    match page.tags(&["a"]).filter(|t| t.attr("href").is_some()).count() {
        0 => FeatureValue::LEGITIMATE,
        1 | 2 => FeatureValue::SUSPICIOUS,
        _ => FeatureValue::PHISHING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn snapshot(body: &str, redirects: usize) -> PageSnapshot {
        let url = Url::parse("https://www.example.com/login").unwrap();
        PageSnapshot {
            final_url: url,
            redirects,
            status: 200,
            body: body.to_string(),
        }
    }

    fn check(body: &str, feature: fn(&PageView) -> FeatureValue) -> FeatureValue {
        let snapshot = snapshot(body, 0);
        let view = PageView::new(&snapshot, "example.com");
        feature(&view)
    }

    #[test]
    fn test_tag_attributes() {
        let snapshot = snapshot(
            r#"<A HREF="/a" class=x>one</A><img src='https://cdn.other.net/p.png' alt=logo>"#,
            0,
        );
        let view = PageView::new(&snapshot, "example.com");
        assert_eq!(view.tags.len(), 2);
        assert_eq!(view.tags[0].name, "a");
        assert_eq!(view.tags[0].attr("href"), Some("/a"));
        assert_eq!(view.tags[0].attr("class"), Some("x"));
        assert_eq!(view.tags[1].attr("src"), Some("https://cdn.other.net/p.png"));
        assert_eq!(view.tags[1].attr("alt"), Some("logo"));
        assert_eq!(view.tags[1].attr("width"), None);
    }

    #[test]
    fn test_is_external() {
        let snapshot = snapshot("", 0);
        let view = PageView::new(&snapshot, "example.com");
        assert_eq!(view.is_external("/relative/path"), Some(false));
        assert_eq!(view.is_external("https://static.example.com/x.js"), Some(false));
        assert_eq!(view.is_external("//evil.example.net/x.js"), Some(true));
        assert_eq!(view.is_external("data:image/png;base64,AAAA"), Some(false));
    }

    #[test]
    fn test_favicon() {
        let local = r#"<link rel="icon" href="/favicon.ico">"#;
        let foreign = r#"<link rel="shortcut icon" href="https://evil.example.net/favicon.ico">"#;
        assert_eq!(check(local, favicon), FeatureValue::LEGITIMATE);
        assert_eq!(check(foreign, favicon), FeatureValue::PHISHING);
        assert_eq!(check("<html></html>", favicon), FeatureValue::LEGITIMATE);
        let stylesheet = r#"<link rel="stylesheet" href="https://cdn.other.net/s.css">"#;
        assert_eq!(check(stylesheet, favicon), FeatureValue::LEGITIMATE);
    }

    #[test]
    fn test_request_url() {
        let local = r#"<img src="/a.png"><img src="/b.png"><video src="/c.mp4"></video>"#;
        assert_eq!(check(local, request_url), FeatureValue::LEGITIMATE);

        let mixed = r#"<img src="/a.png"><img src="https://cdn.other.net/b.png">"#;
        assert_eq!(check(mixed, request_url), FeatureValue::SUSPICIOUS);

        let foreign = r#"<img src="https://cdn.other.net/a.png"><embed src="https://x.net/e">"#;
        assert_eq!(check(foreign, request_url), FeatureValue::PHISHING);

        assert_eq!(check("<p>no objects</p>", request_url), FeatureValue::LEGITIMATE);
    }

    #[test]
    fn test_anchor_url() {
        let local = concat!(
            r#"<a href="/one">1</a><a href="/two">2</a>"#,
            r#"<a href="https://www.example.com/3">3</a>"#,
        );
        assert_eq!(check(local, anchor_url), FeatureValue::LEGITIMATE);

        let mixed = r##"<a href="#">x</a><a href="/ok">ok</a>"##;
        assert_eq!(check(mixed, anchor_url), FeatureValue::SUSPICIOUS);

        let bad = concat!(
            r##"<a href="#">x</a><a href="javascript:void(0)">y</a>"##,
            r#"<a href="https://other.net/">z</a>"#,
        );
        assert_eq!(check(bad, anchor_url), FeatureValue::PHISHING);
    }

    #[test]
    fn test_links_in_script_tags() {
        let local = r#"<link rel="stylesheet" href="/s.css"><script src="/app.js"></script>"#;
        assert_eq!(check(local, links_in_script_tags), FeatureValue::LEGITIMATE);

        let mixed = r#"<link href="/s.css"><script src="https://cdn.other.net/lib.js"></script>"#;
        assert_eq!(check(mixed, links_in_script_tags), FeatureValue::SUSPICIOUS);

        let foreign = r#"<script src="https://cdn.other.net/lib.js"></script>"#;
        assert_eq!(check(foreign, links_in_script_tags), FeatureValue::PHISHING);
    }

    #[test]
    fn test_server_form_handler() {
        assert_eq!(check("<p>no forms</p>", server_form_handler), FeatureValue::LEGITIMATE);
        assert_eq!(
            check(r#"<form method="post">"#, server_form_handler),
            FeatureValue::LEGITIMATE
        );
        assert_eq!(
            check(r#"<form action="/session">"#, server_form_handler),
            FeatureValue::LEGITIMATE
        );
        assert_eq!(
            check(r#"<form action="https://collector.evil.net/p.php">"#, server_form_handler),
            FeatureValue::SUSPICIOUS
        );
        assert_eq!(
            check(r#"<form action="about:blank">"#, server_form_handler),
            FeatureValue::PHISHING
        );
        assert_eq!(check(r#"<form action="">"#, server_form_handler), FeatureValue::PHISHING);
    }

    #[test]
    fn test_script_heuristics() {
        assert_eq!(check(r#"<a href="mailto:x@y.z">mail</a>"#, info_email), FeatureValue::PHISHING);
        assert_eq!(check("<p>hello</p>", info_email), FeatureValue::LEGITIMATE);

        let status = "<script>document.onmouseover = function() { window.status = 'x'; }</script>";
        assert_eq!(check(status, status_bar_cust), FeatureValue::PHISHING);
        let inline = r#"<a href="/" onmouseover="window.status='https://bank.example'">x</a>"#;
        assert_eq!(check(inline, status_bar_cust), FeatureValue::PHISHING);
        assert_eq!(check("<script>init();</script>", status_bar_cust), FeatureValue::LEGITIMATE);

        let right_click = "<script>if (event.button == 2) { return false; }</script>";
        assert_eq!(check(right_click, disable_right_click), FeatureValue::PHISHING);
        assert_eq!(check("<script></script>", disable_right_click), FeatureValue::LEGITIMATE);

        assert_eq!(
            check("<script>alert('win')</script>", using_popup_window),
            FeatureValue::PHISHING
        );
        assert_eq!(
            check("<script>window.open('https://x')</script>", using_popup_window),
            FeatureValue::PHISHING
        );
        assert_eq!(check("<p>calm</p>", using_popup_window), FeatureValue::LEGITIMATE);
    }

    #[test]
    fn test_iframe_redirection() {
        let hidden =
            r#"<iframe src="https://x.net" frameborder="0" width="0" height="0"></iframe>"#;
        assert_eq!(check(hidden, iframe_redirection), FeatureValue::PHISHING);
        let styled = r#"<iframe src="/inner" style="display:none"></iframe>"#;
        assert_eq!(check(styled, iframe_redirection), FeatureValue::PHISHING);
        let visible = r#"<iframe src="/inner" width="600" height="400"></iframe>"#;
        assert_eq!(check(visible, iframe_redirection), FeatureValue::LEGITIMATE);
    }

    #[test]
    fn test_forwarding_and_link_count() {
        let forwarding = |hops| {
            let snap = snapshot("", hops);
            website_forwarding(&PageView::new(&snap, "example.com"))
        };
        assert_eq!(forwarding(1), FeatureValue::LEGITIMATE);
        assert_eq!(forwarding(3), FeatureValue::SUSPICIOUS);
        assert_eq!(forwarding(6), FeatureValue::PHISHING);

        assert_eq!(check("<p></p>", links_pointing_to_page), FeatureValue::LEGITIMATE);
        let one = r#"<a href="/x">x</a>"#;
        assert_eq!(check(one, links_pointing_to_page), FeatureValue::SUSPICIOUS);
        let many = r#"<a href="/1"></a><a href="/2"></a><a href="/3"></a>"#;
        assert_eq!(check(many, links_pointing_to_page), FeatureValue::PHISHING);
    }
}
