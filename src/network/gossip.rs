//! GossipChannel: one topic, the envelope codec and the ledger behind it

use crate::core::{BlockAcceptance, Ledger};
use crate::error::Result;
use crate::network::message::GossipEnvelope;
use crate::network::topic::{Topic, TopicMessage};
use crate::runtime::ShutdownSignal;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Topic blocks and transactions propagate on
pub const BLOCKS_TOPIC: &str = "blocks";

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What the channel did with one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    SelfOriginated,
    Undecodable,
    Block {
        height: u64,
        acceptance: BlockAcceptance,
    },
    Transactions {
        stored: usize,
    },
}

pub struct GossipChannel {
    topic: Box<dyn Topic>,
    local_id: String,
    ledger: Arc<Ledger>,
}

impl GossipChannel {
    pub fn new(topic: Box<dyn Topic>, local_id: &str, ledger: Arc<Ledger>) -> GossipChannel {
        GossipChannel {
            topic,
            local_id: local_id.to_string(),
            ledger,
        }
    }

    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }

    /// Encode and hand to the topic. Failures are returned, never retried.
    pub fn publish(&self, envelope: &GossipEnvelope) -> Result<()> {
        let data = envelope.encode()?;
        self.topic.publish(data)?;
        debug!("Published {} on '{}'", envelope.kind(), self.topic.name());
        Ok(())
    }

    /// Decode one message and persist what it carries
    pub fn handle(&self, message: TopicMessage) -> Result<Delivery> {
        if message.origin == self.local_id {
            debug!("Ignoring our own message relayed by {}", message.received_from);
            return Ok(Delivery::SelfOriginated);
        }

        let envelope = match GossipEnvelope::decode(&message.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    "Dropping undecodable message from {} (origin {}): {e}",
                    message.received_from, message.origin
                );
                return Ok(Delivery::Undecodable);
            }
        };

        match envelope {
            GossipEnvelope::NewBlock(new_block) => {
                let height = new_block.block.height;
                info!(
                    "Received block {} {} from {}",
                    height, new_block.block.hash, message.origin
                );
                let acceptance = self
                    .ledger
                    .accept_block(&new_block.block, &new_block.transactions)?;
                Ok(Delivery::Block { height, acceptance })
            }
            GossipEnvelope::NewTransactions(new_transactions) => {
                let stored = self
                    .ledger
                    .accept_transactions(&new_transactions.transactions)?;
                info!(
                    "Received {} transactions from {}, stored {stored}",
                    new_transactions.transactions.len(),
                    message.origin
                );
                Ok(Delivery::Transactions { stored })
            }
        }
    }

    /// Receive until `shutdown` fires. Returns an error only when the
    /// subscription itself fails.
    pub fn run(&self, shutdown: &ShutdownSignal) -> Result<()> {
        info!("Receiving on '{}'", self.topic.name());
        while !shutdown.is_triggered() {
            let Some(message) = self.topic.next_message(RECEIVE_POLL_INTERVAL)? else {
                continue;
            };
            if let Err(e) = self.handle(message) {
                error!("Failed to persist gossip message: {e}");
            }
        }
        info!("Stopped receiving on '{}'", self.topic.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Status;
    use crate::network::topic::MemoryHub;
    use crate::storage::transaction_key;
    use crate::testnet::test_utils::{linked_chain, temp_ledger};
    use std::thread;

    fn ledger() -> (tempfile::TempDir, Arc<Ledger>) {
        let (dir, ledger) = temp_ledger();
        ledger.initialize_genesis().unwrap();
        (dir, Arc::new(ledger))
    }

    fn message(origin: &str, data: Vec<u8>) -> TopicMessage {
        TopicMessage {
            origin: origin.to_string(),
            received_from: origin.to_string(),
            data,
        }
    }

    #[test]
    fn test_self_originated_messages_are_ignored() {
        let (_dir, ledger) = ledger();
        let hub = MemoryHub::new();
        let channel = GossipChannel::new(
            Box::new(hub.join(BLOCKS_TOPIC, "me").unwrap()),
            "me",
            ledger.clone(),
        );

        let chain = linked_chain(2);
        let data = GossipEnvelope::new_block(chain[1].clone(), chain[1].transactions.clone())
            .encode()
            .unwrap();
        let delivery = channel.handle(message("me", data)).unwrap();

        assert_eq!(delivery, Delivery::SelfOriginated);
        assert_eq!(ledger.storage().blocks().count().unwrap(), 1);
        assert_eq!(ledger.status().unwrap().last_block, 0);
    }

    #[test]
    fn test_garbage_is_dropped() {
        let (_dir, ledger) = ledger();
        let hub = MemoryHub::new();
        let channel = GossipChannel::new(
            Box::new(hub.join(BLOCKS_TOPIC, "me").unwrap()),
            "me",
            ledger,
        );
        let delivery = channel.handle(message("peer", vec![9, 9, 9])).unwrap();
        assert_eq!(delivery, Delivery::Undecodable);
    }

    #[test]
    fn test_new_block_persists_block_and_transactions() {
        let (_dir, ledger) = ledger();
        let hub = MemoryHub::new();
        let channel = GossipChannel::new(
            Box::new(hub.join(BLOCKS_TOPIC, "me").unwrap()),
            "me",
            ledger.clone(),
        );

        let chain = linked_chain(2);
        let data = GossipEnvelope::new_block(chain[1].clone(), chain[1].transactions.clone())
            .encode()
            .unwrap();
        let delivery = channel.handle(message("peer", data)).unwrap();

        assert_eq!(
            delivery,
            Delivery::Block {
                height: 1,
                acceptance: BlockAcceptance::Extended(Status::at(&chain[1])),
            }
        );
        let tx = &chain[1].transactions[0];
        assert!(ledger
            .storage()
            .transactions()
            .has(&transaction_key(1, &tx.hash))
            .unwrap());
    }

    #[test]
    fn test_new_transactions_go_to_pending_or_confirmed() {
        let (_dir, ledger) = ledger();
        let hub = MemoryHub::new();
        let channel = GossipChannel::new(
            Box::new(hub.join(BLOCKS_TOPIC, "me").unwrap()),
            "me",
            ledger.clone(),
        );

        let chain = linked_chain(2);
        ledger.append_block(&chain[1]).unwrap();
        let confirmed = chain[1].transactions[0].clone();
        let mut pending = confirmed.clone();
        pending.block_height = 0;
        pending.set_hash();

        let data = GossipEnvelope::new_transactions(vec![confirmed, pending])
            .encode()
            .unwrap();
        let delivery = channel.handle(message("peer", data)).unwrap();

        assert_eq!(delivery, Delivery::Transactions { stored: 2 });
        assert_eq!(ledger.storage().pending_transactions().count().unwrap(), 1);
        assert_eq!(ledger.storage().transactions().count().unwrap(), 1);
    }

    #[test]
    fn test_run_routes_between_two_channels_until_shutdown() {
        let hub = MemoryHub::new();
        let (_dir_a, ledger_a) = ledger();
        let (_dir_b, ledger_b) = ledger();

        let sender = GossipChannel::new(
            Box::new(hub.join(BLOCKS_TOPIC, "a").unwrap()),
            "a",
            ledger_a.clone(),
        );
        let receiver = Arc::new(GossipChannel::new(
            Box::new(hub.join(BLOCKS_TOPIC, "b").unwrap()),
            "b",
            ledger_b.clone(),
        ));

        let shutdown = ShutdownSignal::new();
        let worker = {
            let receiver = receiver.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || receiver.run(&shutdown))
        };

        let chain = linked_chain(2);
        ledger_a.append_block(&chain[1]).unwrap();
        sender
            .publish(&GossipEnvelope::new_block(
                chain[1].clone(),
                chain[1].transactions.clone(),
            ))
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ledger_b.status().unwrap().last_block != 1 {
            assert!(std::time::Instant::now() < deadline, "block never arrived");
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(ledger_b.status().unwrap(), ledger_a.status().unwrap());

        shutdown.trigger();
        worker.join().unwrap().unwrap();
    }
}
