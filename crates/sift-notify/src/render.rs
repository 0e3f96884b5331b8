//! Digest rendering for each channel format.
//!
//! Plain text and HTML for email, Telegram's HTML subset in 4096-unit
//! messages, and Slack `mrkdwn` for webhooks.

use std::fmt::Write as _;

use sift_core::text::truncate_chars;
use sift_core::{DigestEntry, DigestPayload};

/// Telegram's per-message limit in UTF-16 code units.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const DIGEST_TITLE: &str = "ArXiv Research Digest";
const TELEGRAM_TITLE_CHARS: usize = 300;
const TELEGRAM_SYNOPSIS_CHARS: usize = 1000;

/// Escape `&`, `<`, `>` and quotes for HTML bodies and attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Slack only needs the three control characters escaped.
fn escape_slack(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn digest_date(payload: &DigestPayload) -> String {
    payload.generated_at.format("%B %d, %Y").to_string()
}

fn summary_label(entry: &DigestEntry) -> &'static str {
    if entry.summary.success { "Summary" } else { "Excerpt" }
}

/// Email subject line.
pub fn subject(prefix: &str, payload: &DigestPayload) -> String {
    let count = payload.len();
    let noun = if count == 1 { "Paper" } else { "Papers" };
    format!(
        "{prefix} {count} New {noun} - {}",
        payload.generated_at.format("%Y-%m-%d")
    )
    .trim_start()
    .to_string()
}

/// Plain-text digest.
pub fn render_text(payload: &DigestPayload) -> String {
    let mut out = format!(
        "{DIGEST_TITLE}\nDate: {}\nPapers: {}\n\n",
        digest_date(payload),
        payload.len()
    );
    for (i, entry) in payload.entries.iter().enumerate() {
        let paper = &entry.paper;
        let _ = writeln!(out, "{}. {}", i + 1, paper.title);
        if !paper.authors.is_empty() {
            let _ = writeln!(out, "   Authors: {}", paper.author_line());
        }
        let _ = writeln!(out, "   Categories: {}", paper.categories.join(", "));
        let _ = writeln!(out, "   {}: {}", summary_label(entry), entry.summary.synopsis);
        let _ = writeln!(out, "   {}", paper.url);
        if let Some(pdf) = &paper.pdf_url {
            let _ = writeln!(out, "   PDF: {pdf}");
        }
        out.push('\n');
    }
    out
}

/// HTML digest for the email alternative part.
pub fn render_html(payload: &DigestPayload) -> String {
    let mut out = format!(
        "<html><body>\n<h2>{DIGEST_TITLE}</h2>\n<p><strong>Date:</strong> {}</p>\n\
         <p><strong>Papers:</strong> {}</p>\n<hr>\n",
        digest_date(payload),
        payload.len()
    );
    for (i, entry) in payload.entries.iter().enumerate() {
        let paper = &entry.paper;
        let _ = writeln!(out, "<div>");
        let _ = writeln!(out, "<h3>{}. {}</h3>", i + 1, escape_html(&paper.title));
        if !paper.authors.is_empty() {
            let _ = writeln!(
                out,
                "<p><strong>Authors:</strong> {}</p>",
                escape_html(&paper.author_line())
            );
        }
        let _ = writeln!(
            out,
            "<p><strong>Categories:</strong> {}</p>",
            escape_html(&paper.categories.join(", "))
        );
        let _ = writeln!(
            out,
            "<p><strong>{}:</strong> {}</p>",
            summary_label(entry),
            escape_html(&entry.summary.synopsis)
        );
        let _ = write!(out, "<p><a href=\"{}\">arXiv</a>", escape_html(&paper.url));
        if let Some(pdf) = &paper.pdf_url {
            let _ = write!(out, " | <a href=\"{}\">PDF</a>", escape_html(pdf));
        }
        let _ = writeln!(out, "</p>\n</div>");
    }
    out.push_str("<hr>\n<p><small>Generated by sift</small></p>\n</body></html>\n");
    out
}

/// Telegram messages in HTML parse mode, each within [`TELEGRAM_MESSAGE_LIMIT`].
pub fn render_telegram(payload: &DigestPayload) -> Vec<String> {
    let mut blocks = vec![format!(
        "<b>{DIGEST_TITLE}</b>\n{}\n{} new papers",
        digest_date(payload),
        payload.len()
    )];
    for (i, entry) in payload.entries.iter().enumerate() {
        let paper = &entry.paper;
        let mut block = format!(
            "<b>{}. {}</b>\n",
            i + 1,
            escape_html(&truncate_chars(&paper.title, TELEGRAM_TITLE_CHARS))
        );
        if !paper.authors.is_empty() {
            let _ = writeln!(block, "<i>{}</i>", escape_html(&paper.author_line()));
        }
        let _ = writeln!(
            block,
            "{}",
            escape_html(&truncate_chars(&entry.summary.synopsis, TELEGRAM_SYNOPSIS_CHARS))
        );
        let _ = write!(block, "<a href=\"{}\">arXiv</a>", escape_html(&paper.url));
        if let Some(pdf) = &paper.pdf_url {
            let _ = write!(block, " | <a href=\"{}\">PDF</a>", escape_html(pdf));
        }
        blocks.push(block);
    }
    chunk_blocks(&blocks, TELEGRAM_MESSAGE_LIMIT)
}

/// Slack-compatible `mrkdwn` text listing at most `max_items` papers.
pub fn render_slack(payload: &DigestPayload, max_items: usize) -> String {
    let mut out = format!(
        "*{DIGEST_TITLE}*\n{} | {} new papers\n\n",
        digest_date(payload),
        payload.len()
    );
    for (i, entry) in payload.entries.iter().take(max_items).enumerate() {
        let paper = &entry.paper;
        let _ = writeln!(out, "*{}. {}*", i + 1, escape_slack(&paper.title));
        if !paper.authors.is_empty() {
            let _ = writeln!(out, "_{}_", escape_slack(&paper.author_line()));
        }
        let _ = writeln!(out, "{}", escape_slack(&entry.summary.synopsis));
        let _ = write!(out, "<{}|arXiv>", paper.url);
        if let Some(pdf) = &paper.pdf_url {
            let _ = write!(out, " | <{pdf}|PDF>");
        }
        out.push_str("\n\n");
    }
    let hidden = payload.len().saturating_sub(max_items);
    if hidden > 0 {
        let _ = writeln!(out, "+{hidden} more");
    }
    out.trim_end().to_string()
}

/// Length as Telegram counts it: UTF-16 code units.
pub fn telegram_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Pack blocks into messages of at most `limit` UTF-16 code units, joined by
/// blank lines. A block longer than `limit` is split on character boundaries.
pub fn chunk_blocks(blocks: &[String], limit: usize) -> Vec<String> {
    let limit = limit.max(2);
    let mut messages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for block in blocks {
        let block_len = telegram_len(block);
        if block_len > limit {
            if !current.is_empty() {
                messages.push(std::mem::take(&mut current));
                current_len = 0;
            }
            messages.extend(split_units(block, limit));
            continue;
        }
        let needed = if current.is_empty() { block_len } else { current_len + 2 + block_len };
        if needed > limit {
            messages.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(block);
        current_len += block_len;
    }
    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

fn split_units(block: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut units = 0usize;
    for c in block.chars() {
        let width = c.len_utf16();
        if units + width > limit {
            pieces.push(std::mem::take(&mut piece));
            units = 0;
        }
        piece.push(c);
        units += width;
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
