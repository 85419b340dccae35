//! Thin element writer over `quick_xml::Writer`.
//!
//! Text and attribute values are escaped by quick-xml; [`XmlWriter::raw`]
//! inserts an already-serialized fragment (a signed event) untouched.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::EventError;

pub(crate) struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), EventError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(name, Event::Start(start))
    }

    pub(crate) fn close(&mut self, name: &str) -> Result<(), EventError> {
        self.write(name, Event::End(BytesEnd::new(name)))
    }

    /// `<name>text</name>`
    pub(crate) fn leaf(&mut self, name: &str, text: &str) -> Result<(), EventError> {
        self.open(name, &[])?;
        self.write(name, Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    pub(crate) fn raw(&mut self, fragment: &str) -> Result<(), EventError> {
        self.write("fragment", Event::Text(BytesText::from_escaped(fragment)))
    }

    pub(crate) fn finish(self) -> Result<String, EventError> {
        String::from_utf8(self.inner.into_inner()).map_err(|e| EventError::Render {
            element: "document".into(),
            reason: e.to_string(),
        })
    }

    fn write(&mut self, element: &str, event: Event<'_>) -> Result<(), EventError> {
        self.inner.write_event(event).map_err(|e| EventError::Render {
            element: element.to_string(),
            reason: e.to_string(),
        })
    }
}
