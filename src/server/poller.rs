use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::common::StreamEvent;
use crate::storage::{MessageStore, Watermark};

/// Poll loop driving one stream connection.
///
/// Each connection owns its own poller and watermark; nothing is shared
/// between connections except the store handle.
pub struct ChangePoller {
    store: Arc<MessageStore>,
    watermark: Watermark,
    interval: Duration,
    event_sender: mpsc::Sender<StreamEvent>,
}

impl ChangePoller {
    pub fn new(
        store: Arc<MessageStore>,
        watermark: Watermark,
        interval: Duration,
        event_sender: mpsc::Sender<StreamEvent>,
    ) -> Self {
        Self {
            store,
            watermark,
            interval,
            event_sender,
        }
    }

    /// Query-and-advance cycle. Runs until a store query fails or the
    /// receiving side of the stream is gone.
    pub async fn run(mut self) {
        loop {
            let batch = match self.store.messages_after(&self.watermark) {
                Ok(batch) => batch,
                Err(err) => {
                    log::error!("Polling error: {err}");
                    break;
                }
            };

            if batch.is_empty() {
                // Idle cycle: a keepalive write is how a disconnected peer
                // gets detected when nobody is posting.
                if !self.forward(StreamEvent::Keepalive).await {
                    return;
                }
            }

            for message in batch {
                // Advance to the observed message, never to "now": rows
                // written between the query and this point stay past the
                // watermark and are picked up on the next cycle.
                self.watermark.observe(&message);
                if !self.forward(StreamEvent::Message(message)).await {
                    return;
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    async fn forward(&self, event: StreamEvent) -> bool {
        if self.event_sender.send(event).await.is_err() {
            log::debug!("Stream client gone, stopping poll loop");
            return false;
        }
        true
    }
}
