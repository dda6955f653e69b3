use std::io::Cursor;

use anyhow::{Context, Result};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesCData, BytesText, Event};
use quick_xml::{Reader, Writer};

/// One manifest document, held as its raw event sequence.
///
/// Keeping the events instead of a typed tree lets serialization reproduce
/// the upstream bytes (insignificant whitespace included) everywhere the run
/// did not touch, so diffs against upstream stay limited to the rewritten
/// links.
pub struct LinksDocument {
    events: Vec<Event<'static>>,
}

/// Handle to one link value inside a [`LinksDocument`].
///
/// A slot spans the contiguous events that carry the value: a single CDATA
/// block in the common case, or a text run interleaved with entity
/// references. Slots index into the owned event list, so they stay valid
/// for the life of the document and two distinct slots never overlap. Slots
/// are only meaningful for the document that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSlot {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl LinksDocument {
    /// Parse a manifest from its XML text, keeping every event as-is.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut events = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => events.push(event.into_owned()),
                Err(e) => return Err(e).context("Malformed manifest XML"),
            }
        }

        Ok(Self { events })
    }

    /// Serialize back to XML text, byte-identical to the parsed input except
    /// for links replaced through [`set_link`](Self::set_link).
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        for event in &self.events {
            writer
                .write_event(event.clone())
                .context("Failed to serialize manifest XML")?;
        }

        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).context("Manifest serialized to invalid UTF-8")
    }

    /// Replace the value a slot points at with a new URL.
    ///
    /// The first event of the span keeps its kind: a CDATA slot stays CDATA
    /// with the URL embedded verbatim, a text slot gets the URL as escaped
    /// text. Any further events in the span are blanked so no fragment of
    /// the old value survives serialization.
    pub fn set_link(&mut self, slot: LinkSlot, url: &str) {
        self.events[slot.start] = match self.events[slot.start] {
            Event::CData(_) => Event::CData(BytesCData::new(url.to_string())),
            _ => Event::Text(BytesText::new(url).into_owned()),
        };
        for event in &mut self.events[slot.start + 1..slot.end] {
            *event = Event::Text(BytesText::new("").into_owned());
        }
    }

    pub(crate) fn events(&self) -> &[Event<'static>] {
        &self.events
    }
}

/// Decode the value of a text event, resolving entity references.
fn text_value(text: &BytesText) -> Result<String> {
    let raw = text.decode().context("Bad manifest text encoding")?;
    let value = unescape(&raw).context("Bad entity reference in manifest text")?;
    Ok(value.into_owned())
}

/// Decode the value of a CDATA event.
fn cdata_value(cdata: &BytesCData) -> Result<String> {
    String::from_utf8(cdata.to_vec()).context("Manifest CDATA is not valid UTF-8")
}

/// Resolve one general entity reference to its text value, leaving unknown
/// references as their literal `&name;` form.
fn general_ref_value(raw: &str) -> String {
    let literal = format!("&{};", raw);
    match unescape(&literal) {
        Ok(value) => value.into_owned(),
        Err(_) => literal,
    }
}

/// Accumulates the text content of one element the way a DOM `InnerText`
/// would, across text, CDATA, and entity-reference events.
#[derive(Default)]
pub(crate) struct TextAccumulator {
    value: String,
}

impl TextAccumulator {
    pub(crate) fn push_event(&mut self, event: &Event<'_>) -> Result<()> {
        match event {
            Event::Text(t) => self.value.push_str(&text_value(t)?),
            Event::CData(c) => self.value.push_str(&cdata_value(c)?),
            Event::GeneralRef(r) => {
                let raw = String::from_utf8(r.to_vec())
                    .context("Manifest entity reference is not valid UTF-8")?;
                self.value.push_str(&general_ref_value(&raw));
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn take_trimmed(&mut self) -> String {
        let value = self.value.trim().to_string();
        self.value.clear();
        value
    }
}

/// Collects one link value while walking an element's content: the decoded
/// text across text, CDATA, and entity-reference events, plus the span of
/// events carrying it so the value can later be replaced in place.
#[derive(Default)]
pub(crate) struct LinkValue {
    text: TextAccumulator,
    span: Option<(usize, usize)>,
}

impl LinkValue {
    pub(crate) fn push_event(&mut self, index: usize, event: &Event<'_>) -> Result<()> {
        // Whitespace-only text around a CDATA block is layout, not value;
        // it stays outside the span so rewrites leave it untouched.
        let carries_value = match event {
            Event::CData(_) | Event::GeneralRef(_) => true,
            Event::Text(t) => !text_value(t)?.trim().is_empty(),
            _ => false,
        };

        self.text.push_event(event)?;

        if carries_value {
            let (start, _) = self.span.unwrap_or((index, index));
            self.span = Some((start, index));
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Option<(LinkSlot, String)> {
        let (start, last) = self.span?;
        let slot = LinkSlot {
            start,
            end: last + 1,
        };
        Some((slot, self.text.take_trimmed()))
    }
}
