//! Synthetic block producer used while the network has no real miners.
//!
//! Each tick appends a coinbase block on top of the cursor, stores a pending
//! spend, and gossips both. Everything it writes goes through `Ledger`, so
//! it drives the same persistence and propagation paths as real traffic.

use crate::core::{Block, Ledger, Transaction, COINBASE_TYPE, SPEND_TYPE, UNITS_PER_COIN};
use crate::error::Result;
use crate::network::{GossipChannel, GossipEnvelope};
use crate::runtime::ShutdownSignal;
use crate::utils::current_timestamp;
use log::{debug, error, info};
use std::time::Duration;

const COINBASE_SENDER: &str = "COINBASE";
const PLACEHOLDER_KEY: &str = "badbeef";
const RECEIVER: &str = "NReceiver";
const SENDER: &str = "NSender";
const COINBASE_AMOUNT: u64 = UNITS_PER_COIN;
const SPEND_AMOUNT: u64 = 100 * UNITS_PER_COIN;

/// Persist one synthetic block and one pending spend stamped `timestamp`,
/// returning the `NewBlock` and `NewTransactions` envelopes to gossip.
pub fn synthesize(ledger: &Ledger, timestamp: i64) -> Result<(GossipEnvelope, GossipEnvelope)> {
    // built under the cursor lock so a block arriving by gossip cannot
    // take this height between reading the tip and writing the block
    let block = ledger.append_next(|tip| {
        let height = tip.last_block + 1;
        let mut coinbase = Transaction {
            block_height: height,
            tx_type: COINBASE_TYPE.to_string(),
            timestamp,
            sender: COINBASE_SENDER.to_string(),
            receiver: RECEIVER.to_string(),
            amount: COINBASE_AMOUNT,
            pub_key: PLACEHOLDER_KEY.to_string(),
            verify: PLACEHOLDER_KEY.to_string(),
            ..Transaction::default()
        };
        coinbase.set_hash();
        Block::new(height, tip.last_hash.clone(), timestamp, vec![coinbase])
    })?;
    debug!(
        "Produced block {}, {}, {}",
        block.height, block.hash, block.previous_hash
    );
    let coinbase = block.transactions.clone();

    let mut spend = Transaction {
        block_height: 0,
        tx_type: SPEND_TYPE.to_string(),
        sender: SENDER.to_string(),
        amount: SPEND_AMOUNT,
        ..coinbase[0].clone()
    };
    spend.set_hash();
    ledger.add_pending(&spend)?;
    debug!("Produced pending transaction {}", spend.hash);

    Ok((
        GossipEnvelope::new_block(block, coinbase),
        GossipEnvelope::new_transactions(vec![spend]),
    ))
}

/// One tick: persist, then publish. A publish failure abandons this
/// propagation only; the records are already stored.
pub fn produce(ledger: &Ledger, channel: &GossipChannel, timestamp: i64) -> Result<()> {
    let (new_block, new_transactions) = synthesize(ledger, timestamp)?;
    for envelope in [new_block, new_transactions] {
        if let Err(e) = channel.publish(&envelope) {
            error!("Failed to propagate {}: {e}", envelope.kind());
        }
    }
    Ok(())
}

/// Produce every `interval` until `shutdown` fires. A storage failure stops
/// the generator and is returned to the caller.
pub fn run_generator(
    ledger: &Ledger,
    channel: &GossipChannel,
    interval: Duration,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    info!("Synthetic block generator running every {interval:?}");
    while !shutdown.wait_timeout(interval) {
        produce(ledger, channel, current_timestamp()?)?;
    }
    info!("Synthetic block generator stopped");
    Ok(())
}
