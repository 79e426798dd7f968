//! Forward-only pull decoder over an XML byte stream.
//!
//! [`TokenStream`] turns a document into a sequence of start and end events.
//! For the current event it exposes the element name, the parent name,
//! attributes and the character data collected since the element started.
//! Self-closing elements produce a start event immediately followed by an
//! end event. Comments, processing instructions and declarations are skipped.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use smol_str::SmolStr;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncBufRead;

use crate::XmlError;

/// Kind of the event the stream is positioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// An element was opened
    Start,
    /// An element was closed
    End,
}

#[derive(Debug)]
struct Frame {
    name: SmolStr,
    attributes: Vec<(SmolStr, String)>,
    text: Option<String>,
}

impl Frame {
    fn from_start(start: &BytesStart<'_>, position: u64) -> Result<Self, XmlError> {
        let utf8 = |bytes: &[u8]| {
            std::str::from_utf8(bytes)
                .map(SmolStr::new)
                .map_err(|e| XmlError::Malformed {
                    message: format!("name is not valid UTF-8: {e}"),
                    position,
                })
        };
        let name = utf8(start.name().as_ref())?;
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Malformed {
                message: e.to_string(),
                position,
            })?;
            let key = utf8(attr.key.as_ref())?;
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::from_reader(e, position))?;
            attributes.push((key, value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            text: None,
        })
    }
}

enum Step {
    Open { frame: Frame, empty: bool },
    Close,
    Eof,
}

/// Single-pass XML event reader.
///
/// One instance drives exactly one pass over one stream and is not meant to
/// be shared. Awaiting [`TokenStream::next`] only suspends the calling task.
pub struct TokenStream<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    open: Vec<Frame>,
    closed: Option<Frame>,
    current: Option<Token>,
    // set after a self-closing element was reported as a start event
    pending_end: bool,
}

impl<R> std::fmt::Debug for TokenStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("current", &self.current)
            .field("name", &self.name())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl<R: AsyncBufRead + Unpin> TokenStream<R> {
    /// Start decoding the given stream.
    pub fn new(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::with_capacity(1024),
            open: Vec::new(),
            closed: None,
            current: None,
            pending_end: false,
        }
    }

    /// Advance to the next start or end event.
    ///
    /// Returns `Ok(None)` once the document is complete. Reading fails with
    /// [`XmlError::Io`] when the underlying stream fails and with
    /// [`XmlError::Malformed`] when the document is not well-formed.
    pub async fn next(&mut self) -> Result<Option<Token>, XmlError> {
        if self.current == Some(Token::End) {
            self.closed = None;
        }
        if self.pending_end {
            self.pending_end = false;
            return Ok(Some(self.close()));
        }

        loop {
            self.buf.clear();
            // the event borrows the buffer, so it must be gone before `self` is touched again
            let step = {
                let event = match self.reader.read_event_into_async(&mut self.buf).await {
                    Ok(event) => event,
                    Err(e) => {
                        let position = self.reader.buffer_position() as u64;
                        return Err(XmlError::from_reader(e, position));
                    }
                };
                let position = self.reader.buffer_position() as u64;

                match event {
                    Event::Start(start) => Step::Open {
                        frame: Frame::from_start(&start, position)?,
                        empty: false,
                    },
                    Event::Empty(start) => Step::Open {
                        frame: Frame::from_start(&start, position)?,
                        empty: true,
                    },
                    Event::End(_) => Step::Close,
                    Event::Text(text) => {
                        let text = text
                            .unescape()
                            .map_err(|e| XmlError::from_reader(e, position))?;
                        append_text(&mut self.open, &text);
                        continue;
                    }
                    Event::CData(cdata) => {
                        let text =
                            std::str::from_utf8(&cdata).map_err(|e| XmlError::Malformed {
                                message: format!("CDATA section is not valid UTF-8: {e}"),
                                position,
                            })?;
                        append_text(&mut self.open, text);
                        continue;
                    }
                    Event::Eof => Step::Eof,
                    // declarations, comments, processing instructions, doctypes
                    _ => continue,
                }
            };

            return match step {
                Step::Open { frame, empty } => {
                    self.open.push(frame);
                    self.pending_end = empty;
                    self.current = Some(Token::Start);
                    Ok(Some(Token::Start))
                }
                Step::Close if self.open.is_empty() => {
                    Err(self.malformed("closing tag without an open element"))
                }
                Step::Close => Ok(Some(self.close())),
                Step::Eof if !self.open.is_empty() => {
                    Err(self.malformed("document ended inside an element"))
                }
                Step::Eof => {
                    self.current = None;
                    Ok(None)
                }
            };
        }
    }

    fn close(&mut self) -> Token {
        self.closed = self.open.pop();
        self.current = Some(Token::End);
        Token::End
    }

    fn malformed(&self, message: &str) -> XmlError {
        XmlError::Malformed {
            message: message.to_owned(),
            position: self.position(),
        }
    }
}

fn append_text(open: &mut [Frame], text: &str) {
    // character data outside of the root element carries no meaning
    if let Some(frame) = open.last_mut() {
        frame.text.get_or_insert_with(String::new).push_str(text);
    }
}

impl<R> TokenStream<R> {
    fn frame(&self) -> Option<&Frame> {
        match self.current? {
            Token::Start => self.open.last(),
            Token::End => self.closed.as_ref(),
        }
    }

    /// Byte offset of the reader in the document
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Kind of the current event, `None` before the first and after the last.
    pub fn token(&self) -> Option<Token> {
        self.current
    }

    /// Name of the element the current event belongs to.
    pub fn name(&self) -> Option<&str> {
        self.frame().map(|f| f.name.as_str())
    }

    /// Name of the element enclosing the current one.
    ///
    /// Absent for the root element, before the root opens and after it closes.
    pub fn parent_name(&self) -> Option<&str> {
        let parent = match self.current? {
            Token::Start => self.open.len().checked_sub(2).map(|i| &self.open[i]),
            Token::End => self.open.last(),
        };
        parent.map(|f| f.name.as_str())
    }

    /// Nesting depth of the current element, 1 for the root.
    pub fn depth(&self) -> usize {
        match self.current {
            Some(Token::Start) => self.open.len(),
            Some(Token::End) => self.open.len() + 1,
            None => 0,
        }
    }

    /// Character data seen since the current element started, with entities
    /// and CDATA sections decoded. `None` if there was none at all.
    ///
    /// On a start event this is always `None`; read it on the end event.
    pub fn text(&self) -> Option<&str> {
        self.frame()?.text.as_deref()
    }

    /// Raw value of an attribute of the current element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.frame()?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Typed value of an attribute.
    ///
    /// Returns `Ok(None)` if the attribute is absent, but fails with
    /// [`XmlError::InvalidAttribute`] if it is present and does not convert.
    pub fn attribute_as<T: AttributeValue>(&self, name: &str) -> Result<Option<T>, XmlError> {
        let Some(raw) = self.attribute(name) else {
            return Ok(None);
        };
        T::parse(raw).map(Some).ok_or_else(|| XmlError::InvalidAttribute {
            element: self.element_name(),
            name: SmolStr::new(name),
            value: raw.to_owned(),
            expected: T::EXPECTED,
        })
    }

    /// Like [`TokenStream::attribute_as`], with absence being an error too.
    pub fn required<T: AttributeValue>(&self, name: &str) -> Result<T, XmlError> {
        self.attribute_as(name)?
            .ok_or_else(|| XmlError::MissingAttribute {
                element: self.element_name(),
                name: SmolStr::new(name),
            })
    }

    /// Raw value of an attribute that must be present.
    pub fn required_str(&self, name: &str) -> Result<&str, XmlError> {
        self.attribute(name).ok_or_else(|| XmlError::MissingAttribute {
            element: self.element_name(),
            name: SmolStr::new(name),
        })
    }

    /// Integer attribute
    pub fn attribute_i64(&self, name: &str) -> Result<Option<i64>, XmlError> {
        self.attribute_as(name)
    }

    /// 32-bit integer attribute, as used for versions
    pub fn attribute_i32(&self, name: &str) -> Result<Option<i32>, XmlError> {
        self.attribute_as(name)
    }

    /// Floating point attribute
    pub fn attribute_f64(&self, name: &str) -> Result<Option<f64>, XmlError> {
        self.attribute_as(name)
    }

    /// Boolean attribute, `true` or `false`
    pub fn attribute_bool(&self, name: &str) -> Result<Option<bool>, XmlError> {
        self.attribute_as(name)
    }

    /// RFC 3339 timestamp attribute
    pub fn attribute_datetime(&self, name: &str) -> Result<Option<DateTime<Utc>>, XmlError> {
        self.attribute_as(name)
    }

    pub(crate) fn element_name(&self) -> SmolStr {
        self.frame().map(|f| f.name.clone()).unwrap_or_default()
    }
}

/// Types an attribute value can be converted to.
pub trait AttributeValue: Sized {
    /// Description of the expected format, used in error messages
    const EXPECTED: &'static str;

    /// Convert the raw attribute text, `None` if it is malformed.
    fn parse(raw: &str) -> Option<Self>;
}

macro_rules! integer_attribute {
    ($($ty:ty),*) => {
        $(
            impl AttributeValue for $ty {
                const EXPECTED: &'static str = stringify!($ty);

                fn parse(raw: &str) -> Option<Self> {
                    raw.parse().ok()
                }
            }
        )*
    };
}

integer_attribute!(i32, i64, u32, u64);

impl AttributeValue for f64 {
    const EXPECTED: &'static str = "finite decimal number";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl AttributeValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

impl AttributeValue for DateTime<Utc> {
    const EXPECTED: &'static str = "RFC 3339 timestamp";

    fn parse(raw: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl AttributeValue for String {
    const EXPECTED: &'static str = "string";

    fn parse(raw: &str) -> Option<Self> {
        Some(raw.to_owned())
    }
}

impl XmlError {
    pub(crate) fn from_reader(error: quick_xml::Error, position: u64) -> Self {
        match error {
            quick_xml::Error::Io(e) => XmlError::Io(e),
            other => XmlError::Malformed {
                message: other.to_string(),
                position,
            },
        }
    }

    /// Unwrap the I/O error behind [`XmlError::Io`].
    pub fn into_io(self) -> Option<io::Error> {
        match self {
            XmlError::Io(e) => Some(unshare_io(e)),
            _ => None,
        }
    }
}

pub(crate) fn unshare_io(error: Arc<io::Error>) -> io::Error {
    Arc::try_unwrap(error).unwrap_or_else(|shared| io::Error::new(shared.kind(), shared.to_string()))
}
