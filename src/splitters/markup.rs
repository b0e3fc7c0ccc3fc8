//! Markup splitter for HTML and Markdown.
//!
//! Both formats go through the same two phases: break the document into
//! readable fragments (HTML block elements, Markdown header sections),
//! then merge small fragments forward so no emitted segment except the
//! last falls below the minimum word count.

use scraper::{ElementRef, Html, Selector};

use super::word_count;

/// Containers whose text is never readable content.
const EXCLUDED_ANCESTORS: &[&str] = &["script", "style", "nav", "header", "footer", "aside"];

/// Split an HTML document into merged readable-text segments.
pub fn split_html(html: &str, min_words: usize, target_words: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    merge_forward(html_fragments(&document), min_words, target_words)
}

/// Split a Markdown document on header levels 1 through 5, then merge.
pub fn split_markdown(markdown: &str, min_words: usize, target_words: usize) -> Vec<String> {
    merge_forward(markdown_sections(markdown), min_words, target_words)
}

fn html_fragments(document: &Html) -> Vec<String> {
    let root = content_root(document);

    // Selectors are compile-time constants; parse failures are programmer
    // errors, so unwrap via expect-free fallback to an empty list.
    let block_selector =
        match Selector::parse("h1, h2, h3, h4, h5, h6, p, li, pre, blockquote, td, th") {
            Ok(sel) => sel,
            Err(_) => return Vec::new(),
        };

    let mut fragments = Vec::new();
    for element in root.select(&block_selector) {
        if has_excluded_ancestor(&element) {
            continue;
        }
        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            fragments.push(text);
        }
    }

    // Documents without block markup still carry text nodes.
    if fragments.is_empty() {
        let text = root.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            fragments.push(text);
        }
    }

    fragments
}

/// Prefer a main-content container over the whole body.
fn content_root(document: &Html) -> ElementRef<'_> {
    for candidate in ["main", "article", "#content", "body"] {
        if let Ok(selector) = Selector::parse(candidate) {
            if let Some(element) = document.select(&selector).next() {
                return element;
            }
        }
    }
    document.root_element()
}

fn has_excluded_ancestor(element: &ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        ElementRef::wrap(node)
            .map(|el| EXCLUDED_ANCESTORS.contains(&el.value().name()))
            .unwrap_or(false)
    })
}

/// One section per header of level 1..=5; the header line stays with its
/// body. Text before the first header forms the leading section.
fn markdown_sections(markdown: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut in_code_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_code_fence = !in_code_fence;
        }
        if !in_code_fence && is_header_line(line) && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }

    sections
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_header_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    (1..=5).contains(&hashes) && trimmed[hashes..].starts_with(' ')
}

/// Merge fragments forward until each emitted segment reaches `min_words`,
/// aiming for `target_words`. Only the terminal segment may fall short.
fn merge_forward(fragments: Vec<String>, min_words: usize, target_words: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut buffer_words = 0;

    for fragment in fragments {
        let words = word_count(&fragment);
        if words == 0 {
            continue;
        }
        if buffer_words >= min_words && buffer_words + words > target_words {
            segments.push(std::mem::take(&mut buffer));
            buffer_words = 0;
        }
        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(&fragment);
        buffer_words += words;
    }
    if !buffer.is_empty() {
        segments.push(buffer);
    }

    segments
}
