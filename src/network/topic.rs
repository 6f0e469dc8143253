// Publish/subscribe seam between the gossip channel and a transport.
// `GossipTransport` implements it over TCP; `MemoryHub` keeps every
// subscriber in one process and is what the channel tests run against.

use crate::error::{BlockchainError, Result};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One message delivered on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    /// Id of the node that first published the message
    pub origin: String,
    /// Id of the peer that handed it to us
    pub received_from: String,
    pub data: Vec<u8>,
}

pub trait Topic: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, data: Vec<u8>) -> Result<()>;

    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout, an
    /// error once the subscription is gone.
    fn next_message(&self, timeout: Duration) -> Result<Option<TopicMessage>>;
}

type Subscribers = HashMap<String, Vec<(String, Sender<TopicMessage>)>>;

/// In-process topic hub. Publishers also receive their own messages.
#[derive(Clone, Default)]
pub struct MemoryHub {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl MemoryHub {
    pub fn new() -> MemoryHub {
        MemoryHub::default()
    }

    pub fn join(&self, topic: &str, local_id: &str) -> Result<MemoryTopic> {
        let (sender, receiver) = channel();
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| BlockchainError::Network("hub lock poisoned".to_string()))?;
        subscribers
            .entry(topic.to_string())
            .or_default()
            .push((local_id.to_string(), sender));
        Ok(MemoryTopic {
            name: topic.to_string(),
            local_id: local_id.to_string(),
            hub: self.clone(),
            receiver: Mutex::new(receiver),
        })
    }

    fn deliver(&self, topic: &str, message: TopicMessage) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| BlockchainError::Network("hub lock poisoned".to_string()))?;
        if let Some(list) = subscribers.get_mut(topic) {
            list.retain(|(_, sender)| sender.send(message.clone()).is_ok());
        }
        Ok(())
    }
}

pub struct MemoryTopic {
    name: String,
    local_id: String,
    hub: MemoryHub,
    receiver: Mutex<Receiver<TopicMessage>>,
}

impl Topic for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, data: Vec<u8>) -> Result<()> {
        self.hub.deliver(
            &self.name,
            TopicMessage {
                origin: self.local_id.clone(),
                received_from: self.local_id.clone(),
                data,
            },
        )
    }

    fn next_message(&self, timeout: Duration) -> Result<Option<TopicMessage>> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| BlockchainError::Network("topic receiver lock poisoned".to_string()))?;
        match receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BlockchainError::Network(format!(
                "subscription to '{}' closed",
                self.name
            ))),
        }
    }
}
