//! Decoding of Flux query responses.
//!
//! InfluxDB answers a Flux query with annotated CSV: every table starts with
//! `#datatype`, `#group` and `#default` annotation rows, followed by a header
//! row and the data rows. Tables are separated by a blank line. Rows are
//! decoded lazily as the body arrives, so a caller that only wants the first
//! row never reads the rest of the response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::{QueryError, Result};

/// A source of raw response body chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// The next chunk of the body, or `None` once the body is exhausted
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

/// A body that is already fully in memory
#[derive(Debug, Clone)]
pub struct StaticBody(Option<Vec<u8>>);

impl StaticBody {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self(Some(body.into()))
    }
}

#[async_trait]
impl ChunkSource for StaticBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.0.take())
    }
}

/// A single typed cell of a Flux table
#[derive(Debug, Clone, PartialEq)]
pub enum FluxValue {
    Null,
    Long(i64),
    UnsignedLong(u64),
    Double(f64),
    Boolean(bool),
    String(String),
    DateTime(DateTime<Utc>),
    Duration(String),
    Base64Binary(String),
}

impl FluxValue {
    /// The Flux datatype name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            FluxValue::Null => "null",
            FluxValue::Long(_) => "long",
            FluxValue::UnsignedLong(_) => "unsignedLong",
            FluxValue::Double(_) => "double",
            FluxValue::Boolean(_) => "boolean",
            FluxValue::String(_) => "string",
            FluxValue::DateTime(_) => "dateTime",
            FluxValue::Duration(_) => "duration",
            FluxValue::Base64Binary(_) => "base64Binary",
        }
    }

    /// Decode `raw` as the annotated `datatype`
    fn parse(datatype: &str, raw: &str) -> std::result::Result<Self, QueryError> {
        if raw.is_empty() && datatype != "string" {
            return Ok(FluxValue::Null);
        }
        let invalid = |e: &dyn fmt::Display| {
            QueryError::Malformed(format!("invalid {} value {:?}: {}", datatype, raw, e))
        };
        let value = match datatype {
            "long" => FluxValue::Long(raw.parse().map_err(|e| invalid(&e))?),
            "unsignedLong" => FluxValue::UnsignedLong(raw.parse().map_err(|e| invalid(&e))?),
            "double" => FluxValue::Double(raw.parse().map_err(|e| invalid(&e))?),
            "boolean" => match raw {
                "true" => FluxValue::Boolean(true),
                "false" => FluxValue::Boolean(false),
                _ => return Err(invalid(&"expected true or false")),
            },
            "string" => FluxValue::String(raw.to_string()),
            "dateTime:RFC3339" | "dateTime:RFC3339Nano" => FluxValue::DateTime(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| invalid(&e))?
                    .with_timezone(&Utc),
            ),
            "duration" => FluxValue::Duration(raw.to_string()),
            "base64Binary" => FluxValue::Base64Binary(raw.to_string()),
            other => {
                return Err(QueryError::Malformed(format!(
                    "unknown datatype {:?}",
                    other
                )));
            }
        };
        Ok(value)
    }
}

/// One row of a Flux result table
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRecord {
    values: Vec<(String, FluxValue)>,
}

impl FluxRecord {
    /// Look up a cell by column name
    pub fn get(&self, column: &str) -> Option<&FluxValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// The `_value` cell, or [`FluxValue::Null`] when the table has none
    pub fn value(&self) -> &FluxValue {
        self.get("_value").unwrap_or(&FluxValue::Null)
    }
}

/// Layout of the table currently being read
#[derive(Debug, Default)]
struct TableLayout {
    datatypes: Vec<String>,
    defaults: Vec<String>,
    columns: Vec<String>,
    error_column: Option<usize>,
}

impl TableLayout {
    fn has_header(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Lazy cursor over the rows of a Flux query response
pub struct FluxRecords {
    source: Box<dyn ChunkSource>,
    buf: Vec<u8>,
    eof: bool,
    scan: LineScan,
    layout: TableLayout,
}

impl FluxRecords {
    /// Read records from `source`
    pub fn new(source: impl ChunkSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            buf: Vec::new(),
            eof: false,
            scan: LineScan::default(),
            layout: TableLayout::default(),
        }
    }

    /// Read records from an in-memory annotated CSV document
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(StaticBody::new(text.into()))
    }

    /// Advance to the next data row, decoding more of the body as needed
    pub async fn next(&mut self) -> Result<Option<FluxRecord>> {
        while let Some(line) = self.next_line().await? {
            if line.trim().is_empty() {
                self.end_table();
                continue;
            }

            let fields = split_csv_line(&line)?;

            if line.starts_with('#') {
                if self.layout.has_header() {
                    self.end_table();
                }
                let annotation = fields[0].clone();
                match annotation.as_str() {
                    "#datatype" => self.layout.datatypes = fields,
                    "#default" => self.layout.defaults = fields,
                    // #group and any unknown annotation carry nothing we use
                    _ => {}
                }
                continue;
            }

            if !self.layout.has_header() {
                self.layout.error_column = fields.iter().position(|c| c == "error");
                let is_error_table =
                    self.layout.error_column.is_some() && fields.iter().any(|c| c == "reference");
                if !is_error_table {
                    self.layout.error_column = None;
                }
                self.layout.columns = fields;
                continue;
            }

            if let Some(idx) = self.layout.error_column {
                let message = fields.get(idx).cloned().unwrap_or_default();
                return Err(QueryError::Execution {
                    status: "flux".to_string(),
                    message,
                }
                .into());
            }

            return self.decode_row(fields).map(Some);
        }
        Ok(None)
    }

    fn end_table(&mut self) {
        self.layout = TableLayout::default();
    }

    fn decode_row(&self, fields: Vec<String>) -> Result<FluxRecord> {
        let columns = &self.layout.columns;
        if fields.len() > columns.len() {
            return Err(QueryError::Malformed(format!(
                "row has {} cells but header has {} columns",
                fields.len(),
                columns.len()
            ))
            .into());
        }

        let mut values = Vec::with_capacity(columns.len().saturating_sub(1));
        // Column 0 is the annotation column and never holds data.
        for (idx, column) in columns.iter().enumerate().skip(1) {
            let raw = match fields.get(idx).map(String::as_str) {
                Some(cell) if !cell.is_empty() => cell,
                _ => self
                    .layout
                    .defaults
                    .get(idx)
                    .map(String::as_str)
                    .unwrap_or(""),
            };
            let datatype = self
                .layout
                .datatypes
                .get(idx)
                .map(String::as_str)
                .unwrap_or("string");
            values.push((column.clone(), FluxValue::parse(datatype, raw)?));
        }

        Ok(FluxRecord { values })
    }

    /// Pull the next complete CSV line out of the body
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(end) = self.scan.find(&self.buf) {
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return decode_utf8(line).map(Some);
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                self.scan = LineScan::default();
                let line = std::mem::take(&mut self.buf);
                return decode_utf8(line).map(Some);
            }

            if self.buf.len() > MAX_LINE_BYTES {
                return Err(QueryError::Malformed(format!(
                    "response line exceeds {} bytes",
                    MAX_LINE_BYTES
                ))
                .into());
            }

            match self.source.next_chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => self.eof = true,
            }
        }
    }
}

fn decode_utf8(line: Vec<u8>) -> Result<String> {
    String::from_utf8(line)
        .map_err(|e| QueryError::Malformed(format!("response is not valid UTF-8: {}", e)).into())
}

/// Longest line the decoder will buffer before giving up
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Incremental search for the end of the current CSV line.
///
/// Bytes already scanned are not revisited when more of the body arrives.
#[derive(Debug, Default)]
struct LineScan {
    pos: usize,
    quoted: bool,
}

impl LineScan {
    /// Position in `buf` of the first newline outside a quoted field
    fn find(&mut self, buf: &[u8]) -> Option<usize> {
        while let Some(&byte) = buf.get(self.pos) {
            let idx = self.pos;
            self.pos += 1;
            match byte {
                b'"' => self.quoted = !self.quoted,
                b'\n' if !self.quoted => {
                    // The caller drains through `idx`; the next line starts fresh.
                    *self = Self::default();
                    return Some(idx);
                }
                _ => {}
            }
        }
        None
    }
}

/// Split one CSV line into fields, honouring `"` quoting and `""` escapes
fn split_csv_line(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(QueryError::Malformed(format!("unterminated quote in line {:?}", line)).into());
    }
    fields.push(field);
    Ok(fields)
}
