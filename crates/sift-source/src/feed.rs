//! Atom feed parsing for the arXiv query API.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sift_core::PaperRecord;
use sift_core::text::clean_text;

use crate::errors::{Result, SourceError};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    primary: Option<String>,
    url: Option<String>,
    pdf: Option<String>,
}

impl EntryBuilder {
    fn attributes(&mut self, e: &BytesStart<'_>) {
        let mut rel = None;
        let mut href = None;
        let mut title = None;
        let mut kind = None;
        let mut term = None;
        for attr in e.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match attr.key.local_name().as_ref() {
                b"rel" => rel = Some(value),
                b"href" => href = Some(value),
                b"title" => title = Some(value),
                b"type" => kind = Some(value),
                b"term" => term = Some(value),
                _ => {}
            }
        }
        match e.local_name().as_ref() {
            b"category" => {
                if let Some(t) = term.filter(|t| !self.categories.contains(t)) {
                    self.categories.push(t);
                }
            }
            b"primary_category" => self.primary = term,
            b"link" => {
                let Some(href) = href else { return };
                let is_pdf = title.as_deref() == Some("pdf")
                    || kind.as_deref().is_some_and(|k| k.contains("pdf"));
                if is_pdf {
                    if self.pdf.is_none() {
                        self.pdf = Some(href);
                    }
                } else if rel.as_deref() == Some("alternate") && self.url.is_none() {
                    self.url = Some(href);
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Id => self.id.push_str(text),
            Field::Title => self.title.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::AuthorName => match self.authors.last_mut() {
                Some(last) if last.is_empty() => last.push_str(text),
                _ => self.authors.push(text.to_string()),
            },
        }
    }

    fn build(self) -> Option<PaperRecord> {
        let id = normalize_id(&self.id)?;
        let published = DateTime::parse_from_rfc3339(self.published.trim())
            .ok()?
            .with_timezone(&Utc);
        let mut categories = self.categories;
        if let Some(primary) = &self.primary {
            if let Some(pos) = categories.iter().position(|c| c == primary) {
                let p = categories.remove(pos);
                categories.insert(0, p);
            } else {
                categories.insert(0, primary.clone());
            }
        }
        let url = self
            .url
            .unwrap_or_else(|| format!("https://arxiv.org/abs/{id}"));
        Some(PaperRecord {
            title: clean_text(&self.title),
            abstract_text: clean_text(&self.summary),
            authors: self
                .authors
                .iter()
                .map(|a| clean_text(a))
                .filter(|a| !a.is_empty())
                .collect(),
            categories,
            primary_category: self.primary,
            published,
            url,
            pdf_url: self.pdf,
            id,
        })
    }
}

/// Strip URL prefix, `arXiv:` prefix and version suffix from an entry id.
///
/// `http://arxiv.org/abs/2401.01234v2` becomes `2401.01234`; old-style ids
/// such as `hep-th/9901001v1` keep their archive prefix.
pub fn normalize_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let tail = raw.split_once("/abs/").map_or(raw, |(_, t)| t);
    let tail = tail.strip_prefix("arXiv:").unwrap_or(tail);
    let core = match tail.rfind('v') {
        Some(pos)
            if pos > 0
                && pos + 1 < tail.len()
                && tail[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &tail[..pos]
        }
        _ => tail,
    };
    (!core.is_empty() && core.bytes().any(|b| b.is_ascii_digit())).then(|| core.to_string())
}

/// Parse an Atom feed body into paper records.
///
/// Entries without a usable id or publication date are skipped; the arXiv
/// API reports query errors as such an entry.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    let _ = reader.trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    entry = Some(EntryBuilder::default());
                    field = None;
                } else if let Some(b) = entry.as_mut() {
                    match name.as_ref() {
                        b"id" => field = Some(Field::Id),
                        b"title" => field = Some(Field::Title),
                        b"summary" => field = Some(Field::Summary),
                        b"published" => field = Some(Field::Published),
                        b"name" => {
                            b.authors.push(String::new());
                            field = Some(Field::AuthorName);
                        }
                        _ => b.attributes(&e),
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(b) = entry.as_mut() {
                    b.attributes(&e);
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(f), Some(b)) = (field, entry.as_mut()) {
                    let text = t
                        .unescape()
                        .map_err(|e| SourceError::Parse(e.to_string()))?;
                    b.push_text(f, &text);
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(f), Some(b)) = (field, entry.as_mut()) {
                    b.push_text(f, &String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.local_name().as_ref() == b"entry" {
                    if let Some(record) = entry.take().and_then(EntryBuilder::build) {
                        out.push(record);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SourceError::Parse(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
