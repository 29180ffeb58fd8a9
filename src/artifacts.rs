//! Failure artifacts and output filenames
//!
//! When a queue entry exhausts its retries and the escalation probe yields
//! no usable wait, the run still produces two files in the entry's slot: a
//! placeholder error card (SVG) and a plain-text log of what happened. Both
//! are emitted as percent-encoded `data:` URLs so they travel through the
//! same [`DownloadHandler`](crate::download::DownloadHandler) path as real
//! images, and the numbering gap stays visible in the output folder.

use crate::types::FilePrefix;
use std::fmt::Write as _;

/// Card canvas size, 16:9 to sit alongside generated images
const CARD_WIDTH: u32 = 1920;
const CARD_HEIGHT: u32 = 1080;

/// Approximate character budget of one 36px text row across the card
const LINE_CHARS: usize = 80;

/// Vertical distance between text rows, in pixels
const LINE_HEIGHT: u32 = 48;

/// Longest message the card renders before cutting off
const CARD_MESSAGE_LIMIT: usize = 1500;

const TRUNCATION_MARKER: &str = "... [Truncated]";

/// Relative path for a successful generation's image
pub fn image_filename(folder: &str, prefix: FilePrefix) -> String {
    format!("{folder}/{prefix}.png")
}

/// Relative path for a failed entry's placeholder card
pub fn error_card_filename(folder: &str, prefix: FilePrefix) -> String {
    format!("{folder}/{prefix}-ERROR.svg")
}

/// Relative path for a failed entry's text log
pub fn error_log_filename(folder: &str, prefix: FilePrefix) -> String {
    format!("{folder}/{prefix}-ERROR-log.txt")
}

/// Render the failure card and wrap it in a `data:image/svg+xml` URL.
///
/// Dark slate card with a red title naming the prefix and folder, the
/// prompt in monospace, and the failure message word-wrapped below. The
/// message is cut at 1500 characters; the full text belongs in the log
/// artifact, not the image.
pub fn error_card_data_url(
    prefix: FilePrefix,
    folder: &str,
    prompt_text: &str,
    message: &str,
) -> String {
    let svg = error_card_svg(prefix, folder, prompt_text, message);
    format!("data:image/svg+xml;charset=utf-8,{}", urlencoding::encode(&svg))
}

/// Render the failure log and wrap it in a `data:text/plain` URL.
///
/// Carries the full, untruncated failure message.
pub fn error_log_data_url(
    prefix: FilePrefix,
    folder: &str,
    prompt_text: &str,
    message: &str,
) -> String {
    let body = format!(
        "Failed to generate image [{prefix}] of project [{folder}]\n\
         Prompt: '{prompt_text}'\n\
         Response: {message}"
    );
    format!("data:text/plain;charset=utf-8,{}", urlencoding::encode(&body))
}

fn error_card_svg(prefix: FilePrefix, folder: &str, prompt_text: &str, message: &str) -> String {
    let title = format!("Failed to generate image [{prefix}] of project [{folder}]");
    let prompt_lines = wrap_lines(&format!("Prompt: '{prompt_text}'"), LINE_CHARS);
    let message_lines = wrap_lines(&truncate_chars(message, CARD_MESSAGE_LIMIT), LINE_CHARS);

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{CARD_WIDTH}\" height=\"{CARD_HEIGHT}\" \
         viewBox=\"0 0 {CARD_WIDTH} {CARD_HEIGHT}\">\
         <rect width=\"{CARD_WIDTH}\" height=\"{CARD_HEIGHT}\" fill=\"#0f172a\"/>"
    );

    let _ = write!(
        svg,
        "<text x=\"60\" y=\"120\" fill=\"#ef4444\" font-family=\"sans-serif\" \
         font-size=\"48\" font-weight=\"bold\">{}</text>",
        xml_escape(&title)
    );

    let mut y = 220;
    for line in prompt_lines.iter().take(3) {
        let _ = write!(
            svg,
            "<text x=\"60\" y=\"{y}\" fill=\"#e2e8f0\" font-family=\"monospace\" \
             font-size=\"36\">{}</text>",
            xml_escape(line)
        );
        y += LINE_HEIGHT;
    }

    y += LINE_HEIGHT / 2;
    for line in message_lines {
        if y > CARD_HEIGHT - LINE_HEIGHT {
            break;
        }
        let _ = write!(
            svg,
            "<text x=\"60\" y=\"{y}\" fill=\"#94a3b8\" font-family=\"sans-serif\" \
             font-size=\"36\">{}</text>",
            xml_escape(&line)
        );
        y += LINE_HEIGHT;
    }

    svg.push_str("</svg>");
    svg
}

/// Cut `text` to at most `limit` characters, marking the cut
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Word-wrap `text` to rows of at most `max_chars` characters.
///
/// Blank input lines are preserved as empty rows; words longer than a row
/// (URLs, mostly) are hard-broken.
fn wrap_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        if raw.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in raw.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();

            if current.is_empty() && word_len <= max_chars {
                current.push_str(word);
            } else if !current.is_empty() && current_len + 1 + word_len <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let mut rest = word.to_string();
                while rest.chars().count() > max_chars {
                    lines.push(rest.chars().take(max_chars).collect());
                    rest = rest.chars().skip(max_chars).collect();
                }
                current = rest;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
