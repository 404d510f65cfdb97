//! Chain and mempool notifications, rescans and reorg handling

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{utxo_tracker::UtxoTracker, Wallet, WalletState};
use crate::{
    data_structures::{
        block::ConfirmedBlock,
        output::{OutputKind, TxOutput},
        transaction::{InputSource, Transaction},
        types::{KeyImage, OutputRef, PrivateKey, TxId},
    },
    errors::{ConsistencyError, WalletResult},
    events::WalletEvent,
    scanning::{
        complete_output, BlockScanResult, CancellationToken, OutputLocation, RescanSummary,
        ScanProgress,
    },
    storage::{
        OutputFilter, OutputStatus, OwnedOutput, TransactionCategory, TransactionState,
        WalletTransactionRecord,
    },
};

/// What applying one transaction changed
#[derive(Debug, Default)]
struct TransactionEffect {
    found: u64,
    spent: u64,
}

impl Wallet {
    /// Record the effects of a newly connected block. The block must directly
    /// follow the last scanned height; after a gap, [`Wallet::sync`] catches up.
    pub async fn on_block_confirmed(&self, block: &ConfirmedBlock) -> WalletResult<BlockScanResult> {
        let mut state = self.state.lock().await;
        state.account()?;
        self.ensure_scan_allowed(&mut state)?;

        let expected = self
            .storage
            .get_scanned_height()
            .await?
            .map_or(0, |height| height + 1);
        if block.height() != expected {
            warn!(expected, got = block.height(), "block does not follow scanned height");
            return Err(ConsistencyError::NonContiguousBlock {
                expected,
                got: block.height(),
            }
            .into());
        }

        let (result, events) = self.process_block(&mut state, block).await?;
        self.storage.set_scanned_height(Some(block.height())).await?;
        state.events.dispatch_all(events).await;
        Ok(result)
    }

    /// Record a transaction admitted to the mempool
    pub async fn on_transaction_accepted(&self, tx: &Transaction) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        state.account()?;
        self.ensure_scan_allowed(&mut state)?;

        let mut events = Vec::new();
        self.apply_mempool_transaction(&mut state, tx, &mut events)
            .await?;
        state.events.dispatch_all(events).await;
        Ok(())
    }

    /// Roll back a block removed from the tip.
    ///
    /// Outputs it created become unconfirmed (coinbase outputs disappear), its
    /// spends return to pending, and every pending send whose ring references an
    /// index the block had assigned is discarded. The invalidated rings are
    /// returned so the caller can rebuild those sends.
    pub async fn on_block_disconnected(
        &self,
        block: &ConfirmedBlock,
    ) -> WalletResult<Vec<ConsistencyError>> {
        let mut state = self.state.lock().await;
        state.account()?;
        let height = block.height();
        let mut events = vec![WalletEvent::BlockDisconnected { height }];

        for tx in &block.block.transactions {
            let txid = tx.txid()?;
            for vout in 0..tx.outputs.len() {
                let outref = OutputRef::new(txid, vout as u32);
                let Some(mut owned) = self.storage.get_output(&outref).await? else {
                    continue;
                };
                if tx.is_coinbase() {
                    self.storage.delete_output(&outref).await?;
                    continue;
                }
                owned.height = None;
                owned.anon_index = None;
                if owned.status == OutputStatus::Unspent {
                    owned.status = OutputStatus::Unconfirmed;
                }
                self.storage.save_output(&owned).await?;
            }

            for mut owned in self.outputs_spent_by(&txid).await? {
                owned.spent_height = None;
                self.storage.save_output(&owned).await?;
            }

            if let Some(mut record) = self.storage.get_transaction(&txid).await? {
                if tx.is_coinbase() {
                    record.state = TransactionState::Discarded;
                } else {
                    record.state = TransactionState::Pending;
                }
                record.height = None;
                self.storage.save_transaction(&record).await?;
            }
        }
        self.storage.set_scanned_height(height.checked_sub(1)).await?;

        let mut invalidated = Vec::new();
        for record in self.storage.get_transactions().await? {
            if record.state != TransactionState::Pending {
                continue;
            }
            let Some(index) = record
                .rings
                .iter()
                .flatten()
                .copied()
                .find(|index| *index >= block.anon_index_start)
            else {
                continue;
            };
            warn!(txid = %record.txid, index, "ring references a withdrawn index");
            invalidated.push(ConsistencyError::RingInvalidated {
                txid: record.txid,
                index,
            });
            events.push(WalletEvent::RingInvalidated {
                txid: record.txid,
                index,
            });
            self.discard_transaction(&record.txid, &mut events).await?;
        }

        info!(height, invalidated = invalidated.len(), "block disconnected");
        state.events.dispatch_all(events).await;
        Ok(invalidated)
    }

    /// A wallet transaction left the mempool without confirming. Returns
    /// whether the wallet knew it as pending.
    pub async fn on_transaction_discarded(&self, txid: &TxId) -> WalletResult<bool> {
        let mut state = self.state.lock().await;
        let mut events = Vec::new();
        let discarded = self.discard_transaction(txid, &mut events).await?;
        state.events.dispatch_all(events).await;
        Ok(discarded)
    }

    /// Forget everything learned from `from_height` onwards and replay the
    /// chain from there. Permanent locks and pending wallet transactions
    /// survive. Checks `cancel` before each block; the last processed height
    /// stays committed so [`Wallet::sync`] resumes from it.
    pub async fn rescan(
        &self,
        from_height: u64,
        cancel: &dyn CancellationToken,
    ) -> WalletResult<RescanSummary> {
        let mut state = self.state.lock().await;
        state.account()?;
        self.ensure_scan_allowed(&mut state)?;
        info!(from_height, "starting rescan");

        // Mempool outputs of pending transactions are not on chain to be found again
        let pending = self.pending_transactions().await?;
        let mempool_outputs: Vec<OwnedOutput> = self
            .storage
            .get_outputs(None)
            .await?
            .into_iter()
            .filter(|o| o.height.is_none() && pending.iter().any(|r| r.txid == o.outref.txid))
            .collect();

        let removed = self.storage.delete_outputs_from_height(from_height).await?;
        for mut owned in self
            .storage
            .get_outputs(Some(OutputFilter::new().with_status(OutputStatus::Spent)))
            .await?
        {
            if owned.spent_height.is_some_and(|h| h < from_height) {
                continue;
            }
            owned.status = OutputStatus::Unspent;
            owned.spent_in = None;
            owned.spent_height = None;
            self.storage.save_output(&owned).await?;
        }
        for owned in &mempool_outputs {
            self.storage.save_output(owned).await?;
        }
        state.tracker =
            UtxoTracker::with_permanent_locks(self.storage.get_permanent_locks().await?);
        self.storage
            .set_scanned_height(from_height.checked_sub(1))
            .await?;
        debug!(
            removed,
            kept = mempool_outputs.len(),
            "cleared outputs for rescan"
        );

        self.scan_blocks(&mut state, from_height, cancel).await
    }

    /// Process blocks after the last scanned height up to the tip
    pub async fn sync(&self, cancel: &dyn CancellationToken) -> WalletResult<RescanSummary> {
        let mut state = self.state.lock().await;
        state.account()?;
        self.ensure_scan_allowed(&mut state)?;
        let start = self
            .storage
            .get_scanned_height()
            .await?
            .map_or(0, |height| height + 1);
        self.scan_blocks(&mut state, start, cancel).await
    }

    async fn scan_blocks(
        &self,
        state: &mut WalletState,
        from_height: u64,
        cancel: &dyn CancellationToken,
    ) -> WalletResult<RescanSummary> {
        let started = Instant::now();
        let target_height = self.ledger.current_tip().await?;
        let mut summary = RescanSummary {
            from_height,
            last_scanned_height: None,
            blocks_scanned: 0,
            outputs_found: 0,
            outputs_spent: 0,
            cancelled: false,
            scan_duration: Duration::ZERO,
        };

        for height in from_height..=target_height {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                info!(height, "rescan cancelled");
                break;
            }
            let block = self.ledger.get_block(height).await?;
            let (result, events) = self.process_block(state, &block).await?;
            self.storage.set_scanned_height(Some(height)).await?;

            summary.blocks_scanned += 1;
            summary.outputs_found += result.outputs_found;
            summary.outputs_spent += result.outputs_spent;
            summary.last_scanned_height = Some(height);

            state.events.dispatch_all(events).await;
            state
                .events
                .dispatch(WalletEvent::RescanProgress(ScanProgress {
                    current_height: height,
                    target_height,
                    outputs_found: summary.outputs_found,
                }))
                .await;
        }

        self.reapply_pending_spends().await?;
        summary.scan_duration = started.elapsed();
        info!(
            blocks = summary.blocks_scanned,
            found = summary.outputs_found,
            spent = summary.outputs_spent,
            cancelled = summary.cancelled,
            "rescan finished"
        );
        state
            .events
            .dispatch(WalletEvent::RescanCompleted(summary.clone()))
            .await;
        Ok(summary)
    }

    async fn process_block(
        &self,
        state: &mut WalletState,
        block: &ConfirmedBlock,
    ) -> WalletResult<(BlockScanResult, Vec<WalletEvent>)> {
        let height = block.height();
        let spend_keys = self.spend_keys(state)?;
        let positioned = block.positioned_outputs()?;
        let mut events = Vec::new();
        let mut result = BlockScanResult {
            height,
            ..BlockScanResult::default()
        };

        for tx in &block.block.transactions {
            let txid = tx.txid()?;
            let outputs: Vec<(OutputLocation, &TxOutput)> = positioned
                .iter()
                .filter(|p| p.outref.txid == txid)
                .map(|p| {
                    (
                        OutputLocation {
                            outref: p.outref,
                            height: Some(p.height),
                            anon_index: p.anon_index,
                        },
                        p.output,
                    )
                })
                .collect();
            let effect = self
                .apply_transaction(
                    state,
                    tx,
                    txid,
                    Some(height),
                    outputs,
                    spend_keys.as_ref(),
                    &mut events,
                )
                .await?;
            result.outputs_found += effect.found;
            result.outputs_spent += effect.spent;
        }

        debug!(
            height,
            found = result.outputs_found,
            spent = result.outputs_spent,
            "processed block"
        );
        events.push(WalletEvent::BlockProcessed {
            height,
            outputs_found: result.outputs_found,
            outputs_spent: result.outputs_spent,
        });
        Ok((result, events))
    }

    pub(super) async fn apply_mempool_transaction(
        &self,
        state: &mut WalletState,
        tx: &Transaction,
        events: &mut Vec<WalletEvent>,
    ) -> WalletResult<()> {
        let txid = tx.txid()?;
        let spend_keys = self.spend_keys(state)?;
        let outputs = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(vout, output)| {
                (
                    OutputLocation {
                        outref: OutputRef::new(txid, vout as u32),
                        height: None,
                        anon_index: None,
                    },
                    output,
                )
            })
            .collect();
        self.apply_transaction(state, tx, txid, None, outputs, spend_keys.as_ref(), events)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_transaction(
        &self,
        state: &mut WalletState,
        tx: &Transaction,
        txid: TxId,
        height: Option<u64>,
        outputs: Vec<(OutputLocation, &TxOutput)>,
        spend_keys: Option<&HashMap<u32, PrivateKey>>,
        events: &mut Vec<WalletEvent>,
    ) -> WalletResult<TransactionEffect> {
        let mut effect = TransactionEffect::default();
        let mut spent_value = 0u64;
        let mut spent_kind = None;
        let mut spent_outputs = Vec::new();

        for input in &tx.inputs {
            let owned = match input.source.prevout() {
                Some(prevout) => self.storage.get_output(prevout).await?,
                None => self.find_by_key_image(&input.key_image).await?,
            };
            let Some(mut owned) = owned else {
                continue;
            };
            spent_value = spent_value.saturating_add(owned.value());
            spent_kind = Some(owned.kind);
            spent_outputs.push(owned.outref);
            if owned.spent_in == Some(txid) && (owned.spent_height == height || height.is_none()) {
                continue;
            }
            owned.status = OutputStatus::Spent;
            owned.spent_in = Some(txid);
            owned.spent_height = height;
            self.storage.save_output(&owned).await?;
            effect.spent += 1;
            events.push(WalletEvent::OutputSpent {
                outref: owned.outref,
                txid,
                height,
            });
        }

        let mut received = 0u64;
        let mut kinds: Vec<OutputKind> = Vec::new();
        for (location, output) in outputs {
            if let Some(mut existing) = self.storage.get_output(&location.outref).await? {
                received = received.saturating_add(existing.value());
                kinds.push(existing.kind);
                // Mempool notifications never downgrade a confirmed output
                if location.height.is_some()
                    && (existing.height != location.height
                        || existing.anon_index != location.anon_index)
                {
                    existing.height = location.height;
                    existing.anon_index = location.anon_index;
                    if existing.status == OutputStatus::Unconfirmed {
                        existing.status = OutputStatus::Unspent;
                    }
                    self.storage.save_output(&existing).await?;
                }
                continue;
            }

            let Some(owned) = state.scanner.scan_output(location, output, spend_keys)? else {
                continue;
            };
            self.storage.save_output(&owned).await?;
            received = received.saturating_add(owned.value());
            kinds.push(owned.kind);
            effect.found += 1;
            events.push(WalletEvent::OutputDetected {
                outref: owned.outref,
                kind: owned.kind,
                amount: owned.amount,
                height: owned.height,
                address_index: owned.address_index,
            });
        }

        self.record_history(
            tx,
            txid,
            height,
            spent_value,
            spent_kind,
            spent_outputs,
            received,
            kinds,
        )
        .await?;
        Ok(effect)
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_history(
        &self,
        tx: &Transaction,
        txid: TxId,
        height: Option<u64>,
        spent_value: u64,
        spent_kind: Option<OutputKind>,
        spent_outputs: Vec<OutputRef>,
        received: u64,
        mut kinds: Vec<OutputKind>,
    ) -> WalletResult<()> {
        let state = if height.is_some() {
            TransactionState::Confirmed
        } else {
            TransactionState::Pending
        };

        if let Some(mut record) = self.storage.get_transaction(&txid).await? {
            if height.is_none() && record.state == TransactionState::Confirmed {
                return Ok(());
            }
            if record.height != height || record.state != state {
                record.height = height;
                record.state = state;
                self.storage.save_transaction(&record).await?;
            }
            return Ok(());
        }
        if spent_kind.is_none() && kinds.is_empty() {
            return Ok(());
        }

        kinds.sort();
        kinds.dedup();
        let record = match spent_kind {
            Some(input_kind) => {
                let paid_to_others = spent_value
                    .saturating_sub(received)
                    .saturating_sub(tx.fee);
                WalletTransactionRecord {
                    txid,
                    category: if paid_to_others == 0 {
                        TransactionCategory::SelfTransfer
                    } else {
                        TransactionCategory::Send
                    },
                    input_kind: Some(input_kind),
                    output_kinds: tx.outputs.iter().map(|o| o.kind()).collect(),
                    amount: paid_to_others,
                    fee: tx.fee,
                    comment: None,
                    height,
                    state,
                    rings: tx
                        .inputs
                        .iter()
                        .filter_map(|input| match &input.source {
                            InputSource::Anonymous { ring } => Some(ring.clone()),
                            _ => None,
                        })
                        .collect(),
                    spent_outputs,
                }
            }
            None => WalletTransactionRecord {
                txid,
                category: TransactionCategory::Receive,
                input_kind: None,
                output_kinds: kinds,
                amount: received,
                fee: 0,
                comment: None,
                height,
                state,
                rings: Vec::new(),
                spent_outputs: Vec::new(),
            },
        };
        self.storage.save_transaction(&record).await
    }

    async fn pending_transactions(&self) -> WalletResult<Vec<WalletTransactionRecord>> {
        Ok(self
            .storage
            .get_transactions()
            .await?
            .into_iter()
            .filter(|r| r.state == TransactionState::Pending)
            .collect())
    }

    /// Mark outputs consumed by pending wallet transactions as spent again.
    /// Replaying blocks finds those outputs as unspent since the spending
    /// transaction is still in the mempool.
    async fn reapply_pending_spends(&self) -> WalletResult<()> {
        for record in self.pending_transactions().await? {
            for outref in &record.spent_outputs {
                let Some(mut owned) = self.storage.get_output(outref).await? else {
                    continue;
                };
                if owned.spent_in == Some(record.txid) {
                    continue;
                }
                if owned.status == OutputStatus::Spent {
                    warn!(outref = %outref, txid = %record.txid, "pending input spent elsewhere");
                    continue;
                }
                owned.status = OutputStatus::Spent;
                owned.spent_in = Some(record.txid);
                owned.spent_height = None;
                self.storage.save_output(&owned).await?;
                debug!(outref = %outref, txid = %record.txid, "restored pending spend");
            }
        }
        Ok(())
    }

    async fn find_by_key_image(&self, key_image: &KeyImage) -> WalletResult<Option<OwnedOutput>> {
        Ok(self
            .storage
            .get_outputs(Some(OutputFilter::new().with_kind(OutputKind::Anonymous)))
            .await?
            .into_iter()
            .find(|o| o.key_image.as_ref() == Some(key_image)))
    }

    async fn outputs_spent_by(&self, txid: &TxId) -> WalletResult<Vec<OwnedOutput>> {
        Ok(self
            .storage
            .get_outputs(Some(OutputFilter::new().with_status(OutputStatus::Spent)))
            .await?
            .into_iter()
            .filter(|o| o.spent_in.as_ref() == Some(txid))
            .collect())
    }

    /// Return the inputs of a pending transaction to the unspent set and drop
    /// the outputs it created
    async fn discard_transaction(
        &self,
        txid: &TxId,
        events: &mut Vec<WalletEvent>,
    ) -> WalletResult<bool> {
        let Some(mut record) = self.storage.get_transaction(txid).await? else {
            return Ok(false);
        };
        if record.state != TransactionState::Pending {
            return Ok(false);
        }

        for mut owned in self.outputs_spent_by(txid).await? {
            owned.status = if owned.height.is_some() {
                OutputStatus::Unspent
            } else {
                OutputStatus::Unconfirmed
            };
            owned.spent_in = None;
            owned.spent_height = None;
            self.storage.save_output(&owned).await?;
        }
        for owned in self.storage.get_outputs(None).await? {
            if &owned.outref.txid == txid {
                self.storage.delete_output(&owned.outref).await?;
            }
        }

        record.state = TransactionState::Discarded;
        record.height = None;
        self.storage.save_transaction(&record).await?;
        info!(txid = %txid, "discarded pending transaction");
        events.push(WalletEvent::TransactionDiscarded { txid: *txid });
        Ok(true)
    }

    /// Recover amounts and key images of outputs found while locked, and pick
    /// up spends that could not be matched without the key images
    pub(super) async fn complete_pending(&self, state: &mut WalletState) -> WalletResult<u64> {
        let Some(spend_keys) = self.spend_keys(state)? else {
            return Ok(0);
        };

        let mut recovered = 0u64;
        let mut events = Vec::new();
        for mut owned in self.storage.get_outputs(None).await? {
            if owned.amount.is_some() && owned.key_image.is_some() {
                continue;
            }
            let Some(spend) = spend_keys.get(&owned.address_index) else {
                continue;
            };
            let had_amount = owned.amount.is_some();
            if !complete_output(&mut owned, spend)? && owned.key_image.is_none() {
                continue;
            }
            if !had_amount && owned.amount.is_some() {
                recovered += 1;
            }

            if owned.status != OutputStatus::Spent {
                if let Some(key_image) = owned.key_image {
                    if let Some(spend) = self.ledger.find_key_image(&key_image).await? {
                        owned.status = OutputStatus::Spent;
                        owned.spent_in = Some(spend.txid);
                        owned.spent_height = Some(spend.height);
                        events.push(WalletEvent::OutputSpent {
                            outref: owned.outref,
                            txid: spend.txid,
                            height: Some(spend.height),
                        });
                    }
                }
            }
            self.storage.save_output(&owned).await?;
        }

        if recovered > 0 {
            info!(recovered, "recovered amounts after unlock");
            events.push(WalletEvent::AmountsRecovered { count: recovered });
        }
        state.events.dispatch_all(events).await;
        Ok(recovered)
    }
}
