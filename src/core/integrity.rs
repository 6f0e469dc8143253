//! Startup ledger validation
//!
//! Runs once before the node does anything else and decides between a fresh
//! genesis, trusting the stored cursor, or a full rescan of the block store.
//! Nothing found to be inconsistent is ever repaired: the first mismatch is
//! returned as a `ChainIntegrity` error and startup stops there.

use crate::core::{Block, Ledger, Status, GENESIS_HASH};
use crate::error::{IntegrityError, Result};
use crate::storage::{block_key, StorageManager, STATUS_KEY};
use log::{info, warn};

/// Which path the startup check took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityOutcome {
    GenesisInitialized(Status),
    CursorTrusted(Status),
    Rescanned(Status),
}

impl IntegrityOutcome {
    pub fn status(&self) -> &Status {
        match self {
            IntegrityOutcome::GenesisInitialized(status)
            | IntegrityOutcome::CursorTrusted(status)
            | IntegrityOutcome::Rescanned(status) => status,
        }
    }
}

/// Read-only view of the stored ledger: the tip the block store verifies to
/// and the cursor as written. Both are `None` on an empty store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReport {
    pub tip: Option<Status>,
    pub cursor: Option<Status>,
}

impl LedgerReport {
    pub fn cursor_is_current(&self) -> bool {
        self.tip.is_some() && self.tip == self.cursor
    }
}

pub struct ChainIntegrity<'a> {
    ledger: &'a Ledger,
}

impl<'a> ChainIntegrity<'a> {
    pub fn new(ledger: &'a Ledger) -> ChainIntegrity<'a> {
        ChainIntegrity { ledger }
    }

    fn storage(&self) -> &StorageManager {
        self.ledger.storage()
    }

    pub fn check(&self) -> Result<IntegrityOutcome> {
        let block_count = self.storage().blocks().count()?;
        let tx_count = self.storage().transactions().count()?;

        let cursor = self.stored_cursor()?;

        match cursor {
            None if block_count == 0 && tx_count == 0 => {
                let status = self.ledger.initialize_genesis()?;
                Ok(IntegrityOutcome::GenesisInitialized(status))
            }
            None => {
                warn!(
                    "Ledger cursor missing with {block_count} blocks and {tx_count} transactions stored, rescanning"
                );
                self.rescan(None)
            }
            Some(status) if block_count == 0 || status.last_block != block_count - 1 => {
                warn!(
                    "Ledger cursor at block {} but {block_count} blocks stored, rescanning",
                    status.last_block
                );
                self.rescan(Some(status))
            }
            Some(status) => {
                info!(
                    "Ledger cursor trusted at block {} {}",
                    status.last_block, status.last_hash
                );
                Ok(IntegrityOutcome::CursorTrusted(status))
            }
        }
    }

    /// Run the same verification as a rescan but never write: no genesis on
    /// an empty store and no cursor repair.
    pub fn inspect(&self) -> Result<LedgerReport> {
        let blocks = self.storage().blocks().list_values()?;
        let tip = verify_chain(&blocks)?;
        self.scan_orphans()?;
        Ok(LedgerReport {
            tip,
            cursor: self.stored_cursor()?,
        })
    }

    fn stored_cursor(&self) -> Result<Option<Status>> {
        match self.storage().status().get(STATUS_KEY) {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Walk every stored block from height 0, then look for orphaned
    /// transactions. The cursor is only rewritten once both passed.
    fn rescan(&self, cursor: Option<Status>) -> Result<IntegrityOutcome> {
        let blocks = self.storage().blocks().list_values()?;
        let tip = verify_chain(&blocks)?;
        self.scan_orphans()?;

        if let Some(status) = &tip {
            self.storage().status().put(STATUS_KEY, status)?;
            info!(
                "Rescan verified {} blocks, cursor set to {} {}",
                blocks.len(),
                status.last_block,
                status.last_hash
            );
        }

        match tip {
            Some(status) => Ok(IntegrityOutcome::Rescanned(status)),
            None => Err(IntegrityError::EmptyLedger {
                cursor: cursor.map(|c| c.last_block).unwrap_or_default(),
            }
            .into()),
        }
    }

    fn scan_orphans(&self) -> Result<()> {
        for tx in self.storage().transactions().list_values()? {
            if !self.storage().blocks().has(&block_key(tx.block_height))? {
                return Err(IntegrityError::OrphanTransaction {
                    hash: tx.hash,
                    block_height: tx.block_height,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Check heights are dense from 0 and every block links to its predecessor.
/// Returns the verified tip, or `None` for an empty slice.
pub fn verify_chain(blocks: &[Block]) -> std::result::Result<Option<Status>, IntegrityError> {
    let mut previous: Option<&Block> = None;

    for (expected, block) in (0u64..).zip(blocks) {
        if block.height != expected {
            return Err(IntegrityError::HeightMismatch {
                expected,
                actual: block.height,
            });
        }

        match previous {
            None => {
                if !block.previous_hash.is_empty() {
                    return Err(IntegrityError::BadGenesis {
                        expected: String::new(),
                        actual: block.previous_hash.clone(),
                    });
                }
                if block.hash != GENESIS_HASH {
                    return Err(IntegrityError::BadGenesis {
                        expected: GENESIS_HASH.to_string(),
                        actual: block.hash.clone(),
                    });
                }
            }
            Some(prev) if block.previous_hash != prev.hash => {
                return Err(IntegrityError::BrokenLink {
                    height: block.height,
                    expected: prev.hash.clone(),
                    actual: block.previous_hash.clone(),
                });
            }
            Some(_) => {}
        }
        previous = Some(block);
    }

    Ok(previous.map(Status::at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlockchainError;
    use crate::storage::transaction_key;
    use crate::testnet::test_utils::{linked_chain, store_chain, temp_ledger};

    fn integrity_error(result: Result<IntegrityOutcome>) -> IntegrityError {
        match result {
            Err(BlockchainError::ChainIntegrity(err)) => err,
            other => panic!("expected an integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_fresh_ledger_gets_genesis() {
        let (_dir, ledger) = temp_ledger();
        let outcome = ChainIntegrity::new(&ledger).check().unwrap();
        assert_eq!(
            outcome,
            IntegrityOutcome::GenesisInitialized(Status::new(0, GENESIS_HASH.to_string()))
        );
        assert_eq!(ledger.storage().blocks().count().unwrap(), 1);
        assert_eq!(ledger.status().unwrap().last_block, 0);

        // a second start trusts what the first one wrote
        let again = ChainIntegrity::new(&ledger).check().unwrap();
        assert!(matches!(again, IntegrityOutcome::CursorTrusted(_)));
    }

    #[test]
    fn test_missing_cursor_is_recovered_by_rescan() {
        let (_dir, ledger) = temp_ledger();
        let chain = linked_chain(6);
        store_chain(&ledger, &chain);

        let outcome = ChainIntegrity::new(&ledger).check().unwrap();
        let expected = Status::at(&chain[5]);
        assert_eq!(outcome, IntegrityOutcome::Rescanned(expected.clone()));
        assert_eq!(ledger.status().unwrap(), expected);
    }

    #[test]
    fn test_stale_cursor_is_rescanned() {
        let (_dir, ledger) = temp_ledger();
        let chain = linked_chain(4);
        store_chain(&ledger, &chain);
        // cursor written before the last block landed
        ledger
            .storage()
            .status()
            .put(STATUS_KEY, &Status::at(&chain[2]))
            .unwrap();

        let outcome = ChainIntegrity::new(&ledger).check().unwrap();
        assert_eq!(outcome, IntegrityOutcome::Rescanned(Status::at(&chain[3])));
    }

    #[test]
    fn test_broken_link_fails_without_touching_cursor() {
        let (_dir, ledger) = temp_ledger();
        let mut chain = linked_chain(5);
        chain[3].previous_hash = "BFORGED".to_string();
        store_chain(&ledger, &chain);

        let err = integrity_error(ChainIntegrity::new(&ledger).check());
        assert_eq!(
            err,
            IntegrityError::BrokenLink {
                height: 3,
                expected: chain[2].hash.clone(),
                actual: "BFORGED".to_string(),
            }
        );
        assert!(ledger.status().unwrap_err().is_not_found());
    }

    #[test]
    fn test_height_gap_fails() {
        let (_dir, ledger) = temp_ledger();
        let chain = linked_chain(5);
        store_chain(&ledger, &chain);
        ledger.storage().blocks().delete(&block_key(2)).unwrap();

        let err = integrity_error(ChainIntegrity::new(&ledger).check());
        assert_eq!(
            err,
            IntegrityError::HeightMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_bad_genesis_fails() {
        let (_dir, ledger) = temp_ledger();
        let mut chain = linked_chain(2);
        chain[0].hash = "BNOTZERO".to_string();
        store_chain(&ledger, &chain);

        let err = integrity_error(ChainIntegrity::new(&ledger).check());
        assert!(matches!(err, IntegrityError::BadGenesis { .. }));
    }

    #[test]
    fn test_orphan_transaction_fails() {
        let (_dir, ledger) = temp_ledger();
        let chain = linked_chain(3);
        store_chain(&ledger, &chain);
        let mut orphan = chain[1].transactions[0].clone();
        orphan.block_height = 9;
        orphan.set_hash();
        ledger
            .storage()
            .transactions()
            .put(&transaction_key(9, &orphan.hash), &orphan)
            .unwrap();

        let err = integrity_error(ChainIntegrity::new(&ledger).check());
        assert_eq!(
            err,
            IntegrityError::OrphanTransaction {
                hash: orphan.hash,
                block_height: 9
            }
        );
    }

    #[test]
    fn test_transactions_without_blocks_are_orphans() {
        let (_dir, ledger) = temp_ledger();
        let chain = linked_chain(2);
        let tx = chain[1].transactions[0].clone();
        ledger
            .storage()
            .transactions()
            .put(&transaction_key(1, &tx.hash), &tx)
            .unwrap();

        let err = integrity_error(ChainIntegrity::new(&ledger).check());
        assert!(matches!(err, IntegrityError::OrphanTransaction { .. }));
    }

    #[test]
    fn test_cursor_without_blocks_is_empty_ledger() {
        let (_dir, ledger) = temp_ledger();
        ledger
            .storage()
            .status()
            .put(STATUS_KEY, &Status::new(7, "BSEVEN".to_string()))
            .unwrap();

        let err = integrity_error(ChainIntegrity::new(&ledger).check());
        assert_eq!(err, IntegrityError::EmptyLedger { cursor: 7 });
    }

    #[test]
    fn test_inspect_leaves_empty_store_empty() {
        let (_dir, ledger) = temp_ledger();
        let report = ChainIntegrity::new(&ledger).inspect().unwrap();
        assert_eq!(
            report,
            LedgerReport {
                tip: None,
                cursor: None
            }
        );
        assert!(!report.cursor_is_current());
        assert_eq!(ledger.storage().blocks().count().unwrap(), 0);
        assert!(ledger.status().unwrap_err().is_not_found());
    }

    #[test]
    fn test_inspect_reports_stale_cursor_without_rewriting_it() {
        let (_dir, ledger) = temp_ledger();
        let chain = linked_chain(4);
        store_chain(&ledger, &chain);
        let stale = Status::at(&chain[1]);
        ledger.storage().status().put(STATUS_KEY, &stale).unwrap();

        let report = ChainIntegrity::new(&ledger).inspect().unwrap();
        assert_eq!(report.tip, Some(Status::at(&chain[3])));
        assert_eq!(report.cursor, Some(stale.clone()));
        assert!(!report.cursor_is_current());
        assert_eq!(ledger.status().unwrap(), stale);
    }

    #[test]
    fn test_inspect_reports_orphans() {
        let (_dir, ledger) = temp_ledger();
        ChainIntegrity::new(&ledger).check().unwrap();
        let tx = linked_chain(2)[1].transactions[0].clone();
        ledger
            .storage()
            .transactions()
            .put(&transaction_key(1, &tx.hash), &tx)
            .unwrap();

        let result = ChainIntegrity::new(&ledger).inspect();
        assert!(matches!(
            result,
            Err(BlockchainError::ChainIntegrity(IntegrityError::OrphanTransaction { .. }))
        ));
    }

    #[test]
    fn test_verify_chain_on_empty_slice() {
        assert_eq!(verify_chain(&[]), Ok(None));
    }
}
