//! Transport-level MIME headers and header-aware streams.

use std::io::{self, BufRead, Read, Write};

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_SOAP_ACTION: &str = "SOAPAction";

/// SOAPAction value meaning "no action".
pub const EMPTY_SOAP_ACTION: &str = "\"\"";

/// Multi-valued MIME headers in insertion order.
///
/// Names compare case-insensitively; the first spelling seen is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeHeaders {
    entries: Vec<(String, Vec<String>)>,
}

impl MimeHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Append a value to `name`.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        match self.position(name) {
            Some(index) => self.entries[index].1.push(value.into()),
            None => self.entries.push((name.to_string(), vec![value.into()])),
        }
    }

    /// Replace all values of `name` with `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.position(name) {
            Some(index) => self.entries[index].1 = vec![value.into()],
            None => self.entries.push((name.to_string(), vec![value.into()])),
        }
    }

    pub fn get(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(index) => &self.entries[index].1,
            None => &[],
        }
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Vec<String> {
        match self.position(name) {
            Some(index) => self.entries.remove(index).1,
            None => Vec::new(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Every `(name, value)` pair, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Input stream that carries transport headers ahead of its content.
pub trait TransportInput: BufRead {
    fn header_names(&self) -> Vec<String>;

    fn headers(&self, name: &str) -> Vec<String>;
}

/// Output stream accepting transport headers before its content.
pub trait TransportOutput: Write {
    fn add_header(&mut self, name: &str, value: &str) -> io::Result<()>;
}

/// In-memory [`TransportInput`]: fixed headers in front of a reader.
#[derive(Debug)]
pub struct HeaderedInput<R> {
    headers: MimeHeaders,
    inner: R,
}

impl<R: BufRead> HeaderedInput<R> {
    pub fn new(headers: MimeHeaders, inner: R) -> Self {
        Self { headers, inner }
    }
}

impl<R: BufRead> Read for HeaderedInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for HeaderedInput<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

impl<R: BufRead> TransportInput for HeaderedInput<R> {
    fn header_names(&self) -> Vec<String> {
        self.headers.names().map(str::to_string).collect()
    }

    fn headers(&self, name: &str) -> Vec<String> {
        self.headers.get(name).to_vec()
    }
}

/// In-memory [`TransportOutput`] collecting headers next to a writer.
#[derive(Debug)]
pub struct HeaderedOutput<W> {
    headers: MimeHeaders,
    inner: W,
}

impl<W: Write> HeaderedOutput<W> {
    pub fn new(inner: W) -> Self {
        Self {
            headers: MimeHeaders::new(),
            inner,
        }
    }

    pub fn headers(&self) -> &MimeHeaders {
        &self.headers
    }

    pub fn into_parts(self) -> (MimeHeaders, W) {
        (self.headers, self.inner)
    }
}

impl<W: Write> Write for HeaderedOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> TransportOutput for HeaderedOutput<W> {
    fn add_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.headers.add(name, value);
        Ok(())
    }
}
