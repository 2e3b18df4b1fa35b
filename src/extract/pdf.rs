use anyhow::{anyhow, Result};

use super::html::collapse_whitespace;

/// Extract text from PDF bytes and split it into paragraphs.
pub fn parse_pdf(bytes: &[u8], min_len: usize) -> Result<Vec<String>> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow!("PDF text extraction failed: {e}"))?;
    Ok(split_paragraphs(&text, min_len))
}

/// Paragraphs are separated by blank lines; short and repeated ones are dropped.
pub fn split_paragraphs(text: &str, min_len: usize) -> Vec<String> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut paragraphs, min_len);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    flush(&mut current, &mut paragraphs, min_len);
    paragraphs
}

fn flush(current: &mut String, paragraphs: &mut Vec<String>, min_len: usize) {
    let para = collapse_whitespace(current);
    current.clear();
    if para.chars().count() >= min_len && !paragraphs.contains(&para) {
        paragraphs.push(para);
    }
}
