//! Server-sent event framing for payment status streams.
//!
//! Each status is sent as a single `data:` line holding the JSON [`StatusEvent`](shop_payment_engine::StatusEvent).
//! Keepalives are comment lines, which `EventSource` clients ignore.
use bytes::Bytes;
use futures::{Stream, StreamExt};
use shop_payment_engine::{StatusStream, StreamMessage};

use crate::errors::ServerError;

pub const KEEPALIVE_FRAME: &str = ": keepalive\n\n";

pub fn encode_message(message: &StreamMessage) -> Result<Bytes, ServerError> {
    match message {
        StreamMessage::Status(event) => {
            let json = serde_json::to_string(event)?;
            Ok(Bytes::from(format!("data: {json}\n\n")))
        },
        StreamMessage::KeepAlive => Ok(Bytes::from_static(KEEPALIVE_FRAME.as_bytes())),
    }
}

/// Turns a status stream into an HTTP body stream. The body ends when the status stream does.
pub fn event_stream(stream: StatusStream) -> impl Stream<Item = Result<Bytes, ServerError>> {
    stream.map(|message| encode_message(&message))
}
