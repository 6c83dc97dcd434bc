//! Deterministic prompt assembly from a [`PageContext`] snapshot.
//!
//! Section order is fixed: URL, title, headings, main content, links, image
//! summaries. A missing context produces a sentinel prompt instead of an
//! error; formatting never fails.

use pagelens_common::PageContext;

const NO_CONTEXT_PROMPT: &str = "No page context available.";

const QUESTION_SUFFIX: &str = "Please answer the user's question based on the page context \
provided above. If the context doesn't contain the answer, say so clearly.";

const SUMMARY_SUFFIX: &str = "Please provide a concise summary of this page, highlighting the \
main points and key takeaways.";

const MAX_PROMPT_HEADINGS: usize = 20;
const MAX_PROMPT_PARAGRAPHS: usize = 20;
const MAX_PROMPT_BODY_CHARS: usize = 5_000;
const MAX_PROMPT_LINKS: usize = 10;
const MAX_PROMPT_IMAGES: usize = 5;
const MAX_PROMPT_IMAGE_SRC_CHARS: usize = 100;

/// A provider-ready prompt: the text block plus the screenshot payload
/// (base64, data-URL prefix stripped) when one was supplied.
#[derive(Debug, Clone)]
pub struct FormattedPrompt {
    pub text_prompt: String,
    pub image_data: Option<String>,
}

/// Build the context block. `None` yields the fixed sentinel prompt.
pub fn format_context(context: Option<&PageContext>, screenshot: Option<&str>) -> FormattedPrompt {
    let Some(context) = context else {
        return FormattedPrompt {
            text_prompt: NO_CONTEXT_PROMPT.to_string(),
            image_data: None,
        };
    };

    let mut prompt = String::from("You are analyzing a web page. Here's the context:\n\n");

    let url = if context.url.is_empty() { "Unknown" } else { &context.url };
    let title = if context.title.is_empty() { "Untitled" } else { &context.title };
    prompt.push_str(&format!("URL: {url}\n"));
    prompt.push_str(&format!("Title: {title}\n\n"));

    if !context.text.headings.is_empty() {
        prompt.push_str("Page Structure (Headings):\n");
        for heading in context.text.headings.iter().take(MAX_PROMPT_HEADINGS) {
            prompt.push_str(&format!("  h{}: {}\n", heading.level, heading.text));
        }
        prompt.push('\n');
    }

    if !context.text.paragraphs.is_empty() {
        prompt.push_str("Main Content:\n");
        for (idx, paragraph) in context
            .text
            .paragraphs
            .iter()
            .take(MAX_PROMPT_PARAGRAPHS)
            .enumerate()
        {
            prompt.push_str(&format!("{}. {paragraph}\n\n", idx + 1));
        }
    } else if !context.text.body.is_empty() {
        let body = truncate_chars(&context.text.body, MAX_PROMPT_BODY_CHARS);
        prompt.push_str(&format!("Page Content:\n{body}\n\n"));
    }

    if !context.links.is_empty() {
        prompt.push_str("Relevant Links on Page:\n");
        for link in context.links.iter().take(MAX_PROMPT_LINKS) {
            let text = if link.text.is_empty() { "Link" } else { &link.text };
            prompt.push_str(&format!("  - {text}: {}\n", link.href));
        }
        prompt.push('\n');
    }

    if !context.images.is_empty() {
        prompt.push_str("Images on Page:\n");
        for image in context.images.iter().take(MAX_PROMPT_IMAGES) {
            let alt = if image.alt.is_empty() { "Image" } else { &image.alt };
            let src = truncate_chars(&image.src, MAX_PROMPT_IMAGE_SRC_CHARS);
            prompt.push_str(&format!("  - {alt}: {src}...\n"));
        }
    }

    FormattedPrompt {
        text_prompt: prompt.trim().to_string(),
        image_data: screenshot.and_then(data_url_to_base64),
    }
}

/// Question prompt: the context block plus the user's question and the fixed
/// answer-only-from-context instruction.
pub fn create_question_prompt(question: &str, context: Option<&PageContext>) -> String {
    let formatted = format_context(context, None);
    format!(
        "{}\n\nUser Question: {question}\n\n{QUESTION_SUFFIX}",
        formatted.text_prompt
    )
}

/// Summary prompt: the context block plus the fixed summary instruction.
pub fn create_summary_prompt(context: Option<&PageContext>) -> String {
    let formatted = format_context(context, None);
    format!("{}\n\n{SUMMARY_SUFFIX}", formatted.text_prompt)
}

/// Strip the `data:<mime>;base64,` prefix from a data URL. Returns `None`
/// for malformed input so callers can degrade to text-only.
pub fn data_url_to_base64(data_url: &str) -> Option<String> {
    data_url
        .split_once(',')
        .map(|(_, payload)| payload.to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagelens_common::{Heading, PageImage, PageLink, PageText};

    fn context() -> PageContext {
        PageContext {
            url: "https://example.com/tea".to_string(),
            title: "All About Tea".to_string(),
            text: PageText {
                body: "Tea is an aromatic beverage.".to_string(),
                headings: vec![
                    Heading { level: 1, text: "Tea".to_string() },
                    Heading { level: 2, text: "Brewing".to_string() },
                ],
                paragraphs: vec![
                    "Tea is prepared by pouring hot water over cured leaves.".to_string(),
                ],
            },
            links: vec![PageLink {
                text: "Green tea".to_string(),
                href: "https://example.com/green".to_string(),
            }],
            images: vec![PageImage {
                src: "https://example.com/tea.jpg".to_string(),
                alt: "A cup of tea".to_string(),
                width: 640,
                height: 480,
            }],
            timestamp: 0,
        }
    }

    #[test]
    fn missing_context_returns_sentinel() {
        let formatted = format_context(None, None);
        assert_eq!(formatted.text_prompt, "No page context available.");
        assert!(formatted.image_data.is_none());
    }

    #[test]
    fn missing_context_ignores_screenshot() {
        let formatted = format_context(None, Some("data:image/png;base64,AAAA"));
        assert_eq!(formatted.text_prompt, "No page context available.");
        assert!(formatted.image_data.is_none());
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let formatted = format_context(Some(&context()), None);
        let prompt = &formatted.text_prompt;

        let url_pos = prompt.find("URL: https://example.com/tea").unwrap();
        let title_pos = prompt.find("Title: All About Tea").unwrap();
        let headings_pos = prompt.find("Page Structure (Headings):").unwrap();
        let content_pos = prompt.find("Main Content:").unwrap();
        let links_pos = prompt.find("Relevant Links on Page:").unwrap();
        let images_pos = prompt.find("Images on Page:").unwrap();

        assert!(url_pos < title_pos);
        assert!(title_pos < headings_pos);
        assert!(headings_pos < content_pos);
        assert!(content_pos < links_pos);
        assert!(links_pos < images_pos);

        assert!(prompt.contains("  h1: Tea\n"));
        assert!(prompt.contains("1. Tea is prepared"));
        assert!(prompt.contains("  - Green tea: https://example.com/green"));
        assert!(prompt.contains("  - A cup of tea: https://example.com/tea.jpg..."));
    }

    #[test]
    fn body_text_is_fallback_when_no_paragraphs() {
        let mut ctx = context();
        ctx.text.paragraphs.clear();
        ctx.text.body = "plain body text ".repeat(400); // > 5000 chars

        let formatted = format_context(Some(&ctx), None);
        assert!(formatted.text_prompt.contains("Page Content:"));
        assert!(!formatted.text_prompt.contains("Main Content:"));

        // Body excerpt is capped at 5000 chars.
        let excerpt_start = formatted.text_prompt.find("Page Content:\n").unwrap() + 14;
        let excerpt = &formatted.text_prompt[excerpt_start..];
        let excerpt_end = excerpt.find("\n\n").unwrap_or(excerpt.len());
        assert!(excerpt[..excerpt_end].chars().count() <= 5000);
    }

    #[test]
    fn prompt_caps_are_enforced() {
        let mut ctx = context();
        ctx.text.headings = (0..30)
            .map(|i| Heading { level: 2, text: format!("Heading {i}") })
            .collect();
        ctx.links = (0..20)
            .map(|i| PageLink { text: format!("Link {i}"), href: format!("https://e.com/{i}") })
            .collect();
        ctx.images = (0..10)
            .map(|i| PageImage {
                src: format!("https://e.com/{i}.jpg"),
                alt: format!("Image {i}"),
                width: 100,
                height: 100,
            })
            .collect();

        let formatted = format_context(Some(&ctx), None);
        let prompt = &formatted.text_prompt;

        assert!(prompt.contains("Heading 19"));
        assert!(!prompt.contains("Heading 20"));
        assert!(prompt.contains("Link 9:"));
        assert!(!prompt.contains("Link 10:"));
        assert!(prompt.contains("Image 4:"));
        assert!(!prompt.contains("Image 5:"));
    }

    #[test]
    fn screenshot_prefix_is_stripped() {
        let formatted = format_context(Some(&context()), Some("data:image/png;base64,SGVsbG8="));
        assert_eq!(formatted.image_data.as_deref(), Some("SGVsbG8="));
    }

    #[test]
    fn malformed_screenshot_yields_none() {
        let formatted = format_context(Some(&context()), Some("not-a-data-url"));
        assert!(formatted.image_data.is_none());
    }

    #[test]
    fn question_prompt_carries_question_and_instruction() {
        let prompt = create_question_prompt("What is tea?", Some(&context()));
        assert!(prompt.contains("User Question: What is tea?"));
        assert!(prompt.contains("If the context doesn't contain the answer, say so clearly."));
        assert!(prompt.starts_with("You are analyzing a web page."));
    }

    #[test]
    fn question_prompt_without_context_uses_sentinel() {
        let prompt = create_question_prompt("What is tea?", None);
        assert!(prompt.starts_with("No page context available."));
        assert!(prompt.contains("User Question: What is tea?"));
    }

    #[test]
    fn summary_prompt_carries_instruction() {
        let prompt = create_summary_prompt(Some(&context()));
        assert!(prompt.contains("concise summary of this page"));
    }
}
