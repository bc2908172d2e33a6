//! Turns raw transport frames into candidate JSON documents.
//!
//! The venue interleaves keep-alive and diagnostic frames with protocol
//! traffic, so anything that does not look like a JSON object or array is
//! dropped here as noise rather than surfaced as a decode failure.

use std::fmt;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl RawFrame {
    /// Data-bearing frames only; control frames are the transport's concern.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text)),
            Message::Binary(bytes) => Some(Self::Binary(bytes)),
            _ => None,
        }
    }

    fn into_text(self) -> Result<String, DiscardReason> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Binary(bytes) => {
                String::from_utf8(bytes).map_err(|error| DiscardReason::Undecodable {
                    valid_up_to: error.utf8_error().valid_up_to(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Empty,
    NotJson { first: char },
    Undecodable { valid_up_to: usize },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty frame"),
            Self::NotJson { first } => write!(f, "non-json frame starting with {first:?}"),
            Self::Undecodable { valid_up_to } => {
                write!(f, "binary frame is not utf-8 (valid up to byte {valid_up_to})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedFrame {
    Candidate(String),
    Discard(DiscardReason),
}

pub fn normalize_frame(frame: RawFrame) -> NormalizedFrame {
    let text = match frame.into_text() {
        Ok(text) => text,
        Err(reason) => return NormalizedFrame::Discard(reason),
    };

    let trimmed = text.trim();
    match trimmed.chars().next() {
        None => NormalizedFrame::Discard(DiscardReason::Empty),
        Some('{') | Some('[') if trimmed.len() == text.len() => NormalizedFrame::Candidate(text),
        Some('{') | Some('[') => NormalizedFrame::Candidate(trimmed.to_string()),
        Some(first) => NormalizedFrame::Discard(DiscardReason::NotJson { first }),
    }
}
