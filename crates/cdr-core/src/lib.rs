//! Core document model, reconciliation outcomes and error kinds for CDR.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{CodecError, Header, Message};

pub const CRATE_NAME: &str = "cdr-core";

/// Canonical unit of state, keyed by `url`.
///
/// The same shape carries an inbound observation; in that role
/// `first_fetch_time` is ignored and derived during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub url: String,
    #[serde(rename = "pubdate")]
    pub pub_date: u64,
    #[serde(rename = "fetchtime")]
    pub fetch_time: u64,
    pub text: String,
    #[serde(rename = "firstfetchtime", default)]
    pub first_fetch_time: u64,
}

impl DocumentRecord {
    pub fn new(url: impl Into<String>, pub_date: u64, fetch_time: u64, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pub_date,
            fetch_time,
            text: text.into(),
            first_fetch_time: fetch_time,
        }
    }

    /// The record as first stored: the observed fetch is both first and latest.
    pub fn first_observation(&self) -> Self {
        Self {
            first_fetch_time: self.fetch_time,
            ..self.clone()
        }
    }

    pub fn is_monotonic(&self) -> bool {
        self.first_fetch_time <= self.fetch_time
    }
}

/// What reconciliation did with one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Duplicate,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
            Outcome::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged failure classes shared by every CDR crate.
///
/// Callers branch on the kind; error values are never rebuilt for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedMessage,
    StoreUnavailable,
    DuplicateKey,
    NotFound,
    /// The backend refuses the observation's values; retrying cannot succeed.
    Unstorable,
    TransportUnavailable,
}

impl ErrorKind {
    /// Infrastructure failures: the message must be left uncommitted for redelivery.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::StoreUnavailable | ErrorKind::TransportUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MalformedMessage => "malformed_message",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unstorable => "unstorable",
            ErrorKind::TransportUnavailable => "transport_unavailable",
        };
        f.write_str(name)
    }
}
