//! Fixed five-slot header codec for [`DocumentRecord`].
//!
//! Slots are matched by position, never by name: `url, pubDate, fetchTime,
//! text, firstFetchTime`. Integers are 8-byte big-endian, strings raw UTF-8.

use thiserror::Error;

use crate::{DocumentRecord, ErrorKind};

pub const FIELD_NAMES: [&str; 5] = ["url", "pubDate", "fetchTime", "text", "firstFetchTime"];
pub const FIELD_COUNT: usize = FIELD_NAMES.len();

const URL: usize = 0;
const PUB_DATE: usize = 1;
const FETCH_TIME: usize = 2;
const TEXT: usize = 3;
const FIRST_FETCH_TIME: usize = 4;

/// One named binary field of a message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Transport envelope. Document content travels in `headers`; the body is unused.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub key: Vec<u8>,
    pub headers: Vec<Header>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected 5 header fields, found {found}")]
    FieldCount { found: usize },
    #[error("integer field `{field}` must be 8 bytes, found {found}")]
    IntegerWidth { field: &'static str, found: usize },
    #[error("string field `{field}` is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedMessage
    }
}

pub fn encode(record: &DocumentRecord) -> Vec<Header> {
    vec![
        Header::new(FIELD_NAMES[URL], record.url.as_bytes()),
        Header::new(FIELD_NAMES[PUB_DATE], record.pub_date.to_be_bytes()),
        Header::new(FIELD_NAMES[FETCH_TIME], record.fetch_time.to_be_bytes()),
        Header::new(FIELD_NAMES[TEXT], record.text.as_bytes()),
        Header::new(FIELD_NAMES[FIRST_FETCH_TIME], record.first_fetch_time.to_be_bytes()),
    ]
}

pub fn decode(headers: &[Header]) -> Result<DocumentRecord, CodecError> {
    if headers.len() != FIELD_COUNT {
        return Err(CodecError::FieldCount {
            found: headers.len(),
        });
    }

    Ok(DocumentRecord {
        url: read_string(headers, URL)?,
        pub_date: read_u64(headers, PUB_DATE)?,
        fetch_time: read_u64(headers, FETCH_TIME)?,
        text: read_string(headers, TEXT)?,
        first_fetch_time: read_u64(headers, FIRST_FETCH_TIME)?,
    })
}

/// Outbound envelope for a canonical record, keyed by its url.
pub fn to_message(record: &DocumentRecord) -> Message {
    Message {
        key: record.url.as_bytes().to_vec(),
        headers: encode(record),
    }
}

pub fn from_message(message: &Message) -> Result<DocumentRecord, CodecError> {
    decode(&message.headers)
}

fn read_u64(headers: &[Header], slot: usize) -> Result<u64, CodecError> {
    let value = &headers[slot].value;
    let bytes: [u8; 8] = value
        .as_slice()
        .try_into()
        .map_err(|_| CodecError::IntegerWidth {
            field: FIELD_NAMES[slot],
            found: value.len(),
        })?;
    Ok(u64::from_be_bytes(bytes))
}

fn read_string(headers: &[Header], slot: usize) -> Result<String, CodecError> {
    String::from_utf8(headers[slot].value.clone()).map_err(|_| CodecError::InvalidUtf8 {
        field: FIELD_NAMES[slot],
    })
}
