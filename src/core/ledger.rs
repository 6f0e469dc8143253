//! Ledger write paths
//!
//! Every path that adds blocks or transactions goes through `Ledger` so the
//! write order stays the one the integrity check knows how to reconcile.
//! Only blocks that link onto the cursor reach the block store. Blocks that
//! arrive ahead of a gap wait in memory until the gap is filled.

use crate::core::{Block, Status, Transaction, GENESIS_HASH};
use crate::error::{BlockchainError, Result};
use crate::storage::{block_key, transaction_key, StorageManager, STATUS_KEY};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// How far past the cursor a block may be and still be held
pub const MAX_HELD_BLOCKS: u64 = 256;

/// What happened to a block received from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockAcceptance {
    /// Stored, and the cursor moved to the returned status. Held blocks
    /// that linked on behind it are included.
    Extended(Status),
    /// Ahead of the cursor; kept in memory until the blocks before it arrive
    Held,
    /// The same block is already stored or held
    Duplicate,
    /// A different block already occupies this height and was kept
    Conflicting { existing: String },
    /// Not stored: does not link onto the cursor, or too far ahead of it
    Rejected,
}

struct HeldBlock {
    block: Block,
    transactions: Vec<Transaction>,
}

struct Cursor {
    held: BTreeMap<u64, HeldBlock>,
}

pub struct Ledger {
    storage: Arc<StorageManager>,
    cursor: Mutex<Cursor>,
}

impl Ledger {
    pub fn new(storage: Arc<StorageManager>) -> Ledger {
        Ledger {
            storage,
            cursor: Mutex::new(Cursor {
                held: BTreeMap::new(),
            }),
        }
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    fn lock_cursor(&self) -> Result<MutexGuard<'_, Cursor>> {
        self.cursor
            .lock()
            .map_err(|_| BlockchainError::Database("ledger cursor lock poisoned".to_string()))
    }

    pub fn status(&self) -> Result<Status> {
        self.storage.status().get(STATUS_KEY)
    }

    pub fn block(&self, height: u64) -> Result<Block> {
        self.storage.blocks().get(&block_key(height))
    }

    /// Blocks with heights in `[from, to)`
    pub fn blocks_in_range(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        self.storage
            .blocks()
            .get_range(&block_key(from), &block_key(to))
    }

    /// Number of blocks waiting for a gap to be filled
    pub fn held_count(&self) -> Result<usize> {
        Ok(self.lock_cursor()?.held.len())
    }

    /// Store the genesis block and point the cursor at it
    pub fn initialize_genesis(&self) -> Result<Status> {
        let _cursor = self.lock_cursor()?;
        let genesis = Block::genesis();
        self.storage.blocks().put(&block_key(0), &genesis)?;
        let status = Status::new(0, GENESIS_HASH.to_string());
        self.storage.status().put(STATUS_KEY, &status)?;
        info!("Initialized ledger with genesis block {GENESIS_HASH}");
        Ok(status)
    }

    /// Append a locally produced block on top of the cursor
    pub fn append_block(&self, block: &Block) -> Result<Status> {
        let _cursor = self.lock_cursor()?;
        let current = self.status()?;
        if !current.is_extended_by(block) {
            return Err(BlockchainError::Database(format!(
                "block {} ({}) does not extend tip {} ({})",
                block.height, block.previous_hash, current.last_block, current.last_hash
            )));
        }
        self.commit(block, &block.transactions)
    }

    /// Build the next block from the current cursor and append it, all
    /// under the cursor lock so no gossiped block can slip in between.
    pub fn append_next(&self, build: impl FnOnce(&Status) -> Block) -> Result<Block> {
        let _cursor = self.lock_cursor()?;
        let current = self.status()?;
        let block = build(&current);
        if !current.is_extended_by(&block) {
            return Err(BlockchainError::Database(format!(
                "built block {} ({}) does not extend tip {} ({})",
                block.height, block.previous_hash, current.last_block, current.last_hash
            )));
        }
        self.commit(&block, &block.transactions)?;
        Ok(block)
    }

    /// Persist a block received from a peer together with its transactions.
    ///
    /// First seen wins at every height. A block that links onto the cursor
    /// is stored and then any held blocks that now link are stored behind
    /// it. Blocks further ahead are held in memory, never written.
    pub fn accept_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
    ) -> Result<BlockAcceptance> {
        let mut cursor = self.lock_cursor()?;
        let current = self.status()?;

        if block.height <= current.last_block {
            let existing = self.block(block.height)?;
            if existing.hash == block.hash {
                return Ok(BlockAcceptance::Duplicate);
            }
            warn!(
                "Ignoring block {} {}: already have {} at that height",
                block.height, block.hash, existing.hash
            );
            return Ok(BlockAcceptance::Conflicting {
                existing: existing.hash,
            });
        }

        if block.height > current.last_block + 1 {
            return Ok(hold(&mut cursor, &current, block, transactions));
        }

        if !current.is_extended_by(block) {
            warn!(
                "Rejecting block {} {}: previous hash {} is not our tip {}",
                block.height, block.hash, block.previous_hash, current.last_hash
            );
            return Ok(BlockAcceptance::Rejected);
        }

        let mut status = self.commit(block, transactions)?;
        info!("Accepted block {} {}", block.height, block.hash);

        // walk blocks that were waiting on this one
        while let Some(next) = cursor.held.remove(&(status.last_block + 1)) {
            if !status.is_extended_by(&next.block) {
                warn!(
                    "Dropping held block {} {}: it does not link onto {}",
                    next.block.height, next.block.hash, status.last_hash
                );
                break;
            }
            status = self.commit(&next.block, &next.transactions)?;
            info!("Accepted held block {} {}", next.block.height, next.block.hash);
        }
        let tip = status.last_block;
        cursor.held.retain(|height, _| *height > tip);

        Ok(BlockAcceptance::Extended(status))
    }

    /// Write the block, then its transactions under its height, then the
    /// cursor. A crash part way leaves a stale cursor for the next startup
    /// to rescan, never a transaction without its block.
    fn commit(&self, block: &Block, transactions: &[Transaction]) -> Result<Status> {
        self.storage.blocks().put(&block_key(block.height), block)?;
        for tx in transactions {
            let mut confirmed = tx.clone();
            confirmed.block_height = block.height;
            if let Err(e) = self
                .storage
                .transactions()
                .put(&transaction_key(block.height, &confirmed.hash), &confirmed)
            {
                if matches!(e, BlockchainError::StoreClosed) {
                    return Err(e);
                }
                warn!(
                    "Failed to store transaction {} of block {}: {e}",
                    confirmed.hash, block.height
                );
            }
        }

        let status = Status::at(block);
        self.storage.status().put(STATUS_KEY, &status)?;
        debug!("Cursor at block {} {}", block.height, block.hash);
        Ok(status)
    }

    /// Store transactions by state: pending when `block_height` is 0,
    /// confirmed otherwise. Returns how many were written.
    pub fn accept_transactions(&self, transactions: &[Transaction]) -> Result<usize> {
        let mut stored = 0;
        for tx in transactions {
            let result = if tx.is_pending() {
                self.add_pending(tx)
            } else {
                self.put_confirmed(tx)
            };
            match result {
                Ok(()) => stored += 1,
                Err(BlockchainError::StoreClosed) => return Err(BlockchainError::StoreClosed),
                Err(e) => warn!("Failed to store transaction {}: {e}", tx.hash),
            }
        }
        Ok(stored)
    }

    /// Confirmed transactions are only kept for blocks we have stored
    fn put_confirmed(&self, tx: &Transaction) -> Result<()> {
        if !self.storage.blocks().has(&block_key(tx.block_height))? {
            return Err(BlockchainError::NotFound(format!(
                "block {} for transaction {}",
                tx.block_height, tx.hash
            )));
        }
        self.storage
            .transactions()
            .put(&transaction_key(tx.block_height, &tx.hash), tx)
    }

    pub fn add_pending(&self, tx: &Transaction) -> Result<()> {
        self.storage
            .pending_transactions()
            .put(&transaction_key(0, &tx.hash), tx)
    }
}

fn hold(
    cursor: &mut Cursor,
    current: &Status,
    block: &Block,
    transactions: &[Transaction],
) -> BlockAcceptance {
    if block.height > current.last_block + MAX_HELD_BLOCKS {
        warn!(
            "Rejecting block {} {}: too far ahead of our tip {}",
            block.height, block.hash, current.last_block
        );
        return BlockAcceptance::Rejected;
    }
    if let Some(held) = cursor.held.get(&block.height) {
        if held.block.hash == block.hash {
            return BlockAcceptance::Duplicate;
        }
        return BlockAcceptance::Conflicting {
            existing: held.block.hash.clone(),
        };
    }
    debug!(
        "Holding block {} {} until {} arrives",
        block.height,
        block.hash,
        current.last_block + 1
    );
    cursor.held.insert(
        block.height,
        HeldBlock {
            block: block.clone(),
            transactions: transactions.to_vec(),
        },
    );
    BlockAcceptance::Held
}
