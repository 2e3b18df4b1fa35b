use scraper::{ElementRef, Html, Node, Selector};

/// Containers whose text never counts as content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "template", "svg",
];

/// Elements that become text blocks.
const BLOCK_TAGS: &[&str] = &["p", "article", "section", "div", "main", "h1", "h2", "h3"];

/// Title and ordered paragraph texts of an HTML page.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlContent {
    pub title: Option<String>,
    pub blocks: Vec<String>,
}

/// Pull the title and readable paragraphs out of `html`.
///
/// Paragraphs come from the innermost block elements of the readable root
/// (`article`, else `main`, else `body`). Blocks shorter than `min_len`
/// characters and repeated blocks are dropped.
pub fn parse_html(html: &str, min_len: usize) -> HtmlContent {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = pick_root(&document);
    let mut raw = Vec::new();
    collect_blocks(root, &mut raw);
    if raw.is_empty() {
        raw.push(visible_text(root));
    }

    let mut blocks: Vec<String> = Vec::new();
    for text in raw {
        if text.chars().count() < min_len || blocks.contains(&text) {
            continue;
        }
        blocks.push(text);
    }

    HtmlContent { title, blocks }
}

fn pick_root(document: &Html) -> ElementRef<'_> {
    for tag in ["article", "main", "body"] {
        if let Some(el) = Selector::parse(tag)
            .ok()
            .and_then(|sel| document.select(&sel).next())
        {
            return el;
        }
    }
    document.root_element()
}

fn is_skipped(el: &ElementRef<'_>) -> bool {
    SKIP_TAGS.contains(&el.value().name())
}

fn is_block(el: &ElementRef<'_>) -> bool {
    BLOCK_TAGS.contains(&el.value().name())
}

/// Depth-first walk recording innermost block elements.
fn collect_blocks(el: ElementRef<'_>, out: &mut Vec<String>) {
    if is_skipped(&el) {
        return;
    }

    let has_nested_block = el
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|d| is_block(&d));

    if is_block(&el) && !has_nested_block {
        let text = visible_text(el);
        if !text.is_empty() {
            out.push(text);
        }
        return;
    }

    for child in el.children().filter_map(ElementRef::wrap) {
        collect_blocks(child, out);
    }
}

/// Element text with skipped containers left out and whitespace collapsed.
fn visible_text(el: ElementRef<'_>) -> String {
    fn push_text(el: ElementRef<'_>, buf: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    buf.push_str(text);
                    buf.push(' ');
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        if !is_skipped(&child_el) {
                            push_text(child_el, buf);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    let mut raw = String::new();
    push_text(el, &mut raw);
    collapse_whitespace(&raw)
}

pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}
