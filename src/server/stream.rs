use std::io::Read;

use tokio::sync::mpsc;

use crate::common::{ChatMessage, StreamEvent};

/// Reconnect delay advertised to EventSource clients, in milliseconds.
const RETRY_MS: u32 = 5000;

/// Comment frame written on idle poll cycles. EventSource clients ignore
/// comments; the write itself is what surfaces a broken socket.
const KEEPALIVE_FRAME: &str = ": keepalive\n\n";

/// Encode one message as a server-sent event.
pub fn encode_event(message: &ChatMessage) -> serde_json::Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(message)?))
}

/// Response body of one stream connection.
///
/// Reads SSE frames out of the poll loop's channel; a closed channel is EOF,
/// which ends the chunked response. tiny_http drops the reader when the peer
/// disconnects, which in turn closes the channel for the poll loop.
pub struct EventStreamReader {
    receiver: mpsc::Receiver<StreamEvent>,
    pending: Vec<u8>,
    pos: usize,
}

impl EventStreamReader {
    pub fn new(receiver: mpsc::Receiver<StreamEvent>) -> Self {
        Self {
            receiver,
            pending: format!("retry: {RETRY_MS}\n\n").into_bytes(),
            pos: 0,
        }
    }
}

impl Read for EventStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pos >= self.pending.len() {
            let Some(event) = self.receiver.blocking_recv() else {
                // Poll loop exited.
                return Ok(0);
            };
            match event {
                StreamEvent::Message(message) => match encode_event(&message) {
                    Ok(frame) => {
                        self.pending = frame.into_bytes();
                        self.pos = 0;
                    }
                    Err(err) => {
                        log::warn!("Failed to serialize message: {err}");
                    }
                },
                StreamEvent::Keepalive => {
                    self.pending = KEEPALIVE_FRAME.as_bytes().to_vec();
                    self.pos = 0;
                }
            }
        }

        let n = (self.pending.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
