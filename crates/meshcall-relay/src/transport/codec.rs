//! Frame classification for the transport layer.
//!
//! - Text frames carry envelopes; they are handed to the relay as-is (the
//!   relay parses them once).
//! - Binary frames are not part of the protocol and are dropped.
//! - Ping/Pong/Close are surfaced for lifecycle management.

use axum::extract::ws::Message;

use meshcall_core::error::{MeshError, Result};

#[derive(Debug)]
pub enum Inbound {
    Text(String),
    Binary { bytes_len: usize },
    Ping(Vec<u8>),
    Pong,
    Close,
}

/// Cheap length of a frame, checked before any parsing.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) => v.len(),
        Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message, max_frame_bytes: usize) -> Result<Inbound> {
    let len = frame_len(&msg);
    if len > max_frame_bytes {
        return Err(MeshError::BadRequest(format!(
            "frame of {len} bytes exceeds limit of {max_frame_bytes}"
        )));
    }

    Ok(match msg {
        Message::Text(s) => Inbound::Text(s),
        Message::Binary(b) => Inbound::Binary { bytes_len: b.len() },
        Message::Ping(v) => Inbound::Ping(v),
        Message::Pong(_) => Inbound::Pong,
        Message::Close(_) => Inbound::Close,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn oversized_text_is_rejected() {
        let err = decode(Message::Text("x".repeat(2048)), 1024).unwrap_err();
        assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
    }

    #[test]
    fn text_passes_through() {
        match decode(Message::Text("{}".into()), 1024).unwrap() {
            Inbound::Text(s) => assert_eq!(s, "{}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn binary_is_classified() {
        assert!(matches!(
            decode(Message::Binary(vec![1, 2, 3]), 1024).unwrap(),
            Inbound::Binary { bytes_len: 3 }
        ));
    }
}
