use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use thiserror::Error;

/// Maximum element nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("Document nesting exceeds maximum of {0} levels")]
    TooDeep(usize),
    #[error("Document is not an RSS feed (no <rss><channel> element)")]
    NotRss,
}

/// Channel-level metadata and items of an RSS 2.0 document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    /// Raw `pubDate` text, resolved later by [`crate::feed::dates::parse`].
    pub pub_date: Option<String>,
}

/// Parse an `rss/channel/item*` document.
///
/// Only un-prefixed element names are recognised, so `atom:link` and friends
/// never shadow the RSS fields. Titles and descriptions are HTML-unescaped
/// after XML unescaping, which decodes the double-escaped entities
/// (`&amp;amp;`) many feeds emit.
pub fn parse_document(bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut doc = ParsedDocument::default();
    let mut saw_channel = false;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut item: Option<ParsedItem> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if path.len() >= MAX_DEPTH {
                    return Err(ParseError::TooDeep(MAX_DEPTH));
                }
                path.push(e.name().as_ref().to_vec());
                text.clear();

                match names(&path).as_slice() {
                    [b"rss", b"channel"] => saw_channel = true,
                    [b"rss", b"channel", b"item"] => item = Some(ParsedItem::default()),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let raw = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| ParseError::Xml(e.to_string()))?;
                text.push_str(&unescape_entities(&raw));
            }
            Ok(Event::CData(e)) => {
                let raw = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| ParseError::Xml(e.to_string()))?;
                text.push_str(&raw);
            }
            Ok(Event::End(_)) => {
                let value = std::mem::take(&mut text);
                let value = value.trim();

                match names(&path).as_slice() {
                    [b"rss", b"channel", b"title"] => doc.title = unescape_entities(value).into(),
                    [b"rss", b"channel", b"link"] => doc.link = value.to_string(),
                    [b"rss", b"channel", b"description"] => {
                        doc.description = unescape_entities(value).into()
                    }
                    [b"rss", b"channel", b"item"] => {
                        if let Some(finished) = item.take() {
                            doc.items.push(finished);
                        }
                    }
                    [b"rss", b"channel", b"item", field] => {
                        if let Some(current) = item.as_mut() {
                            set_item_field(current, field, value);
                        }
                    }
                    _ => {}
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }
    if !saw_channel {
        return Err(ParseError::NotRss);
    }
    Ok(doc)
}

fn names(path: &[Vec<u8>]) -> Vec<&[u8]> {
    path.iter().map(Vec::as_slice).collect()
}

fn set_item_field(item: &mut ParsedItem, field: &[u8], value: &str) {
    let non_empty = || (!value.is_empty()).then(|| value.to_string());
    match field {
        b"title" => item.title = unescape_entities(value).into(),
        b"link" => item.link = non_empty(),
        b"description" => {
            item.description = (!value.is_empty()).then(|| unescape_entities(value).into())
        }
        b"pubDate" => item.pub_date = non_empty(),
        _ => {}
    }
}

/// Longest HTML5 entity name (`CounterClockwiseContourIntegral`) plus its `;`.
const MAX_ENTITY_LEN: usize = 32;

/// Resolve XML and HTML5 named/numeric entities one at a time.
///
/// Anything that is not a resolvable entity (a bare `&` in "AT&T", an
/// unknown `&bogus;`) is copied through unchanged and does not stop the
/// entities around it from being decoded.
pub fn unescape_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match resolve_entity(tail) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode the entity at the start of `tail` (which begins with `&`).
/// Returns the replacement text and the number of bytes it replaces.
fn resolve_entity(tail: &str) -> Option<(Cow<'static, str>, usize)> {
    let end = tail[1..]
        .char_indices()
        .take(MAX_ENTITY_LEN)
        .find(|&(_, c)| c == ';' || c == '&' || c.is_whitespace())
        .map(|(i, _)| i + 1)?;
    if !tail[end..].starts_with(';') {
        return None;
    }

    let name = &tail[1..end];
    let decoded = match name.strip_prefix('#') {
        Some(number) => {
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            let c = char::from_u32(code).filter(|&c| c != '\0')?;
            Cow::Owned(c.to_string())
        }
        None => Cow::Borrowed(resolve_html5_entity(name)?),
    };
    Some((decoded, end + 1))
}
