//! RSS title extraction and in-place replacement.
//!
//! The document is scanned once with a pull parser to locate the inner byte
//! range of the first `<title>` of every `rss > channel > item`. Rewriting
//! splices new text into those ranges and copies every other byte of the
//! source unchanged.

use std::ops::Range;

use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use thiserror::Error;

const RSS: &[u8] = b"rss";
const CHANNEL: &[u8] = b"channel";
const ITEM: &[u8] = b"item";
const TITLE: &[u8] = b"title";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("invalid feed structure: channel not found")]
    MissingChannel,
    #[error("invalid feed structure: items not found")]
    MissingItems,
    #[error("invalid feed structure: no item titles found")]
    MissingTitles,
    #[error("malformed xml near byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

#[derive(Debug, Clone)]
struct TitleSlot {
    inner: Range<usize>,
    text: String,
    cdata: bool,
}

struct OpenTitle {
    start: usize,
    text: String,
    cdata: bool,
}

/// A parsed RSS document with the location of every eligible item title.
#[derive(Debug, Clone)]
pub struct RssDocument {
    source: String,
    titles: Vec<TitleSlot>,
}

impl RssDocument {
    pub fn parse(source: String) -> Result<Self, StructureError> {
        let titles = locate_titles(&source)?;
        Ok(Self { source, titles })
    }

    /// Item titles in document order, entity-decoded and trimmed.
    pub fn titles(&self) -> Vec<String> {
        self.titles.iter().map(|slot| slot.text.clone()).collect()
    }

    /// Replace titles positionally with `translations`.
    ///
    /// When fewer translations than titles are supplied, the remaining titles
    /// keep their original text. Extra translations are ignored.
    pub fn into_translated(self, translations: &[String]) -> String {
        let mut output = String::with_capacity(self.source.len());
        let mut cursor = 0;

        for (slot, translated) in self.titles.iter().zip(translations) {
            output.push_str(&self.source[cursor..slot.inner.start]);
            push_encoded(&mut output, translated, slot.cdata);
            cursor = slot.inner.end;
        }

        output.push_str(&self.source[cursor..]);
        output
    }
}

fn push_encoded(output: &mut String, text: &str, cdata: bool) {
    if cdata {
        output.push_str("<![CDATA[");
        output.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
        output.push_str("]]>");
    } else {
        output.push_str(&escape(text));
    }
}

fn at(path: &[Vec<u8>], expected: &[&[u8]]) -> bool {
    path.len() == expected.len()
        && path
            .iter()
            .zip(expected)
            .all(|(segment, name)| segment.as_slice() == *name)
}

fn malformed(position: u64, message: impl Into<String>) -> StructureError {
    StructureError::Malformed {
        position,
        message: message.into(),
    }
}

fn locate_titles(source: &str) -> Result<Vec<TitleSlot>, StructureError> {
    let mut reader = Reader::from_str(source);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut titles = Vec::new();
    let mut saw_channel = false;
    let mut item_count = 0usize;
    let mut item_has_title = false;
    let mut open_title: Option<OpenTitle> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| malformed(reader.buffer_position() as u64, err.to_string()))?;

        match event {
            Event::Start(start) => {
                let name = start.name().as_ref().to_vec();
                if at(&path, &[RSS]) && name == CHANNEL {
                    saw_channel = true;
                } else if at(&path, &[RSS, CHANNEL]) && name == ITEM {
                    item_count += 1;
                    item_has_title = false;
                } else if at(&path, &[RSS, CHANNEL, ITEM]) && name == TITLE && !item_has_title {
                    item_has_title = true;
                    open_title = Some(OpenTitle {
                        start: reader.buffer_position() as usize,
                        text: String::new(),
                        cdata: false,
                    });
                }
                path.push(name);
            }
            Event::Empty(empty) => {
                let name = empty.name();
                if at(&path, &[RSS]) && name.as_ref() == CHANNEL {
                    saw_channel = true;
                } else if at(&path, &[RSS, CHANNEL]) && name.as_ref() == ITEM {
                    item_count += 1;
                } else if at(&path, &[RSS, CHANNEL, ITEM]) && name.as_ref() == TITLE {
                    item_has_title = true;
                }
            }
            Event::Text(text) => {
                if let Some(open) = open_title.as_mut() {
                    let raw = std::str::from_utf8(&text).map_err(|err| {
                        malformed(reader.buffer_position() as u64, err.to_string())
                    })?;
                    // Entities outside the XML predefined set stay as written.
                    match unescape(raw) {
                        Ok(decoded) => open.text.push_str(&decoded),
                        Err(_) => open.text.push_str(raw),
                    }
                }
            }
            Event::CData(cdata) => {
                if let Some(open) = open_title.as_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&cdata));
                    open.cdata = true;
                }
            }
            Event::End(end) => {
                let closes_title =
                    at(&path, &[RSS, CHANNEL, ITEM, TITLE]) && end.name().as_ref() == TITLE;
                if closes_title && let Some(open) = open_title.take() {
                    let after_end = reader.buffer_position() as usize;
                    let inner_end = source[open.start..after_end]
                        .rfind("</")
                        .map(|offset| open.start + offset)
                        .ok_or_else(|| malformed(after_end as u64, "unterminated title"))?;
                    let text = open.text.trim();
                    if !text.is_empty() {
                        titles.push(TitleSlot {
                            inner: open.start..inner_end,
                            text: text.to_string(),
                            cdata: open.cdata,
                        });
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(StructureError::MissingChannel);
    }
    if item_count == 0 {
        return Err(StructureError::MissingItems);
    }
    if titles.is_empty() {
        return Err(StructureError::MissingTitles);
    }
    Ok(titles)
}
