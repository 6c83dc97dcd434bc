//! HTML → [`PageContext`] extraction.
//!
//! Works on a parsed copy of the document, never the live page, and never
//! fails: any stage error degrades to a minimal context carrying raw body
//! text only.

use pagelens_common::{Error, Heading, PageContext, PageImage, PageLink, PageText, Result};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

const MAX_BODY_CHARS: usize = 50_000;
const MAX_HEADINGS: usize = 30;
const MAX_PARAGRAPHS: usize = 60;
const MIN_PARAGRAPH_CHARS: usize = 20;
const MAX_LINKS: usize = 25;
const MAX_LINK_TEXT_CHARS: usize = 100;
const MAX_HREF_CHARS: usize = 500;
const MAX_IMAGES: usize = 15;
const MAX_IMAGE_SRC_CHARS: usize = 500;
const MAX_IMAGE_ALT_CHARS: usize = 200;
const MIN_IMAGE_DIMENSION: u32 = 50;
/// Inline-encoded (`data:`) sources longer than this are dropped entirely.
const MAX_INLINE_SRC_CHARS: usize = 1_000;
/// Minimum visible text for a block to win main-content selection.
const MIN_MAIN_CONTENT_CHARS: usize = 500;
const FALLBACK_BODY_CHARS: usize = 10_000;

/// Class/id tokens that mark a subtree as advertising chrome.
const AD_MARKERS: &[&str] = &["ad", "ads", "advert", "advertisement", "sponsored"];

/// Semantic containers tried first when picking the main content node.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    r#"[role="main"]"#,
    "#content",
    "#main-content",
    ".main-content",
    ".post-content",
    ".article-body",
    ".content",
];

/// Extract a structured snapshot from `html`. Never fails; if any stage
/// errors, a minimal context (raw body text only) is returned instead.
pub fn extract(html: &str, url: &str) -> PageContext {
    match extract_full(html, url) {
        Ok(context) => context,
        Err(e) => {
            warn!("page extraction failed, falling back to minimal context: {e}");
            minimal_context(html, url)
        }
    }
}

fn extract_full(html: &str, url: &str) -> Result<PageContext> {
    let document = Html::parse_document(html);
    let main = select_main_content(&document)?;

    Ok(PageContext {
        url: url.to_string(),
        title: extract_title(&document)?,
        text: PageText {
            body: truncate_chars(visible_text(main).trim(), MAX_BODY_CHARS),
            headings: extract_headings(&document)?,
            paragraphs: extract_paragraphs(main)?,
        },
        links: extract_links(&document, url)?,
        images: extract_images(&document)?,
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

fn minimal_context(html: &str, url: &str) -> PageContext {
    let document = Html::parse_document(html);
    let body = document
        .select(&Selector::parse("body").expect("static selector"))
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    PageContext {
        url: url.to_string(),
        title: extract_title(&document).unwrap_or_default(),
        text: PageText {
            body: truncate_chars(&normalize_whitespace(&body), FALLBACK_BODY_CHARS),
            headings: Vec::new(),
            paragraphs: Vec::new(),
        },
        links: Vec::new(),
        images: Vec::new(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector '{css}': {e}")))
}

fn extract_title(document: &Html) -> Result<String> {
    Ok(document
        .select(&sel("title")?)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default())
}

/// Pick the node the body text comes from: semantic containers first, then
/// the block descendant with the most visible text, then `<body>` itself.
fn select_main_content(document: &Html) -> Result<ElementRef<'_>> {
    for css in MAIN_CONTENT_SELECTORS {
        if let Some(el) = document.select(&sel(css)?).find(|el| !is_excluded(el)) {
            return Ok(el);
        }
    }

    let mut best: Option<(usize, ElementRef)> = None;
    for el in document.select(&sel("div, section")?) {
        if is_excluded(&el) || has_excluded_ancestor(&el) {
            continue;
        }
        let len = visible_text(el).trim().chars().count();
        if len >= MIN_MAIN_CONTENT_CHARS && best.map_or(true, |(b, _)| len > b) {
            best = Some((len, el));
        }
    }
    if let Some((_, el)) = best {
        return Ok(el);
    }

    document
        .select(&sel("body")?)
        .next()
        .ok_or_else(|| Error::Parse("document has no body".to_string()))
}

fn extract_headings(document: &Html) -> Result<Vec<Heading>> {
    let mut headings = Vec::new();
    for el in document.select(&sel("h1, h2, h3, h4")?) {
        if headings.len() >= MAX_HEADINGS {
            break;
        }
        if is_excluded(&el) || has_excluded_ancestor(&el) {
            continue;
        }
        let text = normalize_whitespace(&visible_text(el));
        if text.is_empty() {
            continue;
        }
        let level = match el.value().name() {
            "h1" => 1,
            "h2" => 2,
            "h3" => 3,
            _ => 4,
        };
        headings.push(Heading { level, text });
    }
    Ok(headings)
}

fn extract_paragraphs(main: ElementRef<'_>) -> Result<Vec<String>> {
    let selector = sel("p, li")?;
    let mut paragraphs = Vec::new();
    for el in main.select(&selector) {
        if paragraphs.len() >= MAX_PARAGRAPHS {
            break;
        }
        if is_excluded(&el) || has_excluded_ancestor(&el) {
            continue;
        }
        let text = normalize_whitespace(&visible_text(el));
        if text.chars().count() > MIN_PARAGRAPH_CHARS {
            paragraphs.push(text);
        }
    }
    Ok(paragraphs)
}

fn extract_links(document: &Html, page_url: &str) -> Result<Vec<PageLink>> {
    let base = Url::parse(page_url).ok();
    let mut links = Vec::new();

    for el in document.select(&sel("a[href]")?) {
        if links.len() >= MAX_LINKS {
            break;
        }
        let text = normalize_whitespace(&visible_text(el));
        if text.is_empty() {
            continue;
        }
        let Some(raw_href) = el.value().attr("href") else {
            continue;
        };
        let trimmed = raw_href.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.to_ascii_lowercase().starts_with("javascript:")
        {
            continue;
        }

        let href = match &base {
            Some(base) => base
                .join(trimmed)
                .map(String::from)
                .unwrap_or_else(|_| trimmed.to_string()),
            None => trimmed.to_string(),
        };
        if href.chars().count() >= MAX_HREF_CHARS {
            continue;
        }

        links.push(PageLink {
            text: truncate_chars(&text, MAX_LINK_TEXT_CHARS),
            href,
        });
    }
    Ok(links)
}

fn extract_images(document: &Html) -> Result<Vec<PageImage>> {
    let mut images = Vec::new();
    for el in document.select(&sel("img[src]")?) {
        if images.len() >= MAX_IMAGES {
            break;
        }
        let Some(src) = el.value().attr("src") else {
            continue;
        };
        if src.starts_with("data:") && src.chars().count() > MAX_INLINE_SRC_CHARS {
            continue;
        }

        let width = parse_dimension(el.value().attr("width"));
        let height = parse_dimension(el.value().attr("height"));
        // Declared tiny dimensions mean icons and tracking pixels. Images
        // without declared dimensions are kept; their natural size is
        // unknown without rendering.
        if width.is_some_and(|w| w <= MIN_IMAGE_DIMENSION)
            || height.is_some_and(|h| h <= MIN_IMAGE_DIMENSION)
        {
            continue;
        }

        images.push(PageImage {
            src: truncate_chars(src, MAX_IMAGE_SRC_CHARS),
            alt: truncate_chars(el.value().attr("alt").unwrap_or(""), MAX_IMAGE_ALT_CHARS),
            width: width.unwrap_or(0),
            height: height.unwrap_or(0),
        });
    }
    Ok(images)
}

fn parse_dimension(attr: Option<&str>) -> Option<u32> {
    attr.and_then(|v| v.trim().trim_end_matches("px").parse().ok())
}

/// Non-content subtrees: scripts, styles, hidden nodes, page chrome, ads.
fn is_excluded(el: &ElementRef) -> bool {
    let value = el.value();
    if matches!(
        value.name(),
        "script" | "style" | "noscript" | "template" | "nav" | "header" | "footer" | "aside"
    ) {
        return true;
    }
    if value.attr("hidden").is_some() || value.attr("aria-hidden") == Some("true") {
        return true;
    }

    let id = value.attr("id").unwrap_or("").to_ascii_lowercase();
    if AD_MARKERS.contains(&id.as_str()) {
        return true;
    }
    value
        .attr("class")
        .unwrap_or("")
        .to_ascii_lowercase()
        .split_whitespace()
        .any(|token| AD_MARKERS.contains(&token))
}

fn has_excluded_ancestor(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_excluded(&ancestor))
}

/// Text of `el` and its descendants, skipping excluded subtrees, collapsed
/// to single spaces.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_visible_text(el, &mut out);
    normalize_whitespace(&out)
}

fn collect_visible_text(el: ElementRef<'_>, out: &mut String) {
    // Collecting beyond the largest cap is wasted work on huge documents.
    if out.len() > MAX_BODY_CHARS * 4 {
        return;
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child)
                    && !is_excluded(&child_el)
                {
                    collect_visible_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
