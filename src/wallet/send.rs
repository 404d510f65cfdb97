//! Building and broadcasting transfers

use tracing::{info, warn};

use super::{Wallet, WalletState, CHANGE_ADDRESS_INDEX};
use crate::{
    crypto::commitment::checked_sum,
    data_structures::{output::OutputKind, types::OutputRef},
    errors::{ResourceError, StateError, ValidationError, WalletResult},
    events::WalletEvent,
    key_management::{derivation::AccountKeys, stealth_address::one_time_private_key},
    signing::{
        prepare::{build_anon_ring, InputSelector, PreparedRing, UtxoSelection},
        transaction_builder::{split_subtracted_fee, SpendableInput, TransactionBuilder},
        types::{SentTransaction, TransferRequest},
    },
    storage::{
        OutputFilter, OutputStatus, TransactionCategory, TransactionState, WalletTransactionRecord,
    },
};

impl Wallet {
    /// Select inputs, build, sign and broadcast a transfer.
    ///
    /// Selected inputs are reserved for the duration of the call and released
    /// on every exit path. With `test_fee` set the transaction is built and
    /// measured but neither broadcast nor recorded.
    pub async fn send(&self, request: TransferRequest) -> WalletResult<SentTransaction> {
        let mut state = self.state.lock().await;

        if request.recipients.is_empty() {
            return Err(ValidationError::NoOutputs.into());
        }
        let fee_rate = request.fee_rate.unwrap_or(self.config.fee_rate);
        if fee_rate < self.config.min_relay_fee_rate {
            return Err(ResourceError::FeeTooLow {
                rate: fee_rate,
                minimum: self.config.min_relay_fee_rate,
            }
            .into());
        }
        let ring_size = if request.input_kind == OutputKind::Anonymous {
            let size = request.ring_size.unwrap_or(self.config.default_ring_size);
            if size < self.config.min_ring_size || size > self.config.max_ring_size {
                return Err(ResourceError::InvalidRingSize {
                    size,
                    min: self.config.min_ring_size,
                    max: self.config.max_ring_size,
                }
                .into());
            }
            size
        } else {
            1
        };
        let amount = request.total_amount().ok_or(ResourceError::AmountOverflow)?;

        state.account()?;
        let keys = state
            .keystore
            .account_keys(self.config.coin_type, self.config.account)?;

        let selection = self
            .select_inputs(&state, &request, ring_size, fee_rate, amount)
            .await?;
        let reserved: Vec<OutputRef> = selection.utxos.iter().map(|o| o.outref).collect();
        state.tracker.reserve(&reserved);

        let result = self
            .build_and_broadcast(&mut state, &request, &keys, selection, ring_size)
            .await;
        state.tracker.release(&reserved);

        if let Err(e) = &result {
            warn!(
                input_kind = %request.input_kind,
                output_kind = %request.output_kind,
                error = %e,
                "send failed"
            );
        }
        result
    }

    async fn select_inputs(
        &self,
        state: &WalletState,
        request: &TransferRequest,
        ring_size: usize,
        fee_rate: u64,
        amount: u64,
    ) -> WalletResult<UtxoSelection> {
        let max_inputs = if request.input_kind == OutputKind::Anonymous {
            self.config.max_anon_inputs
        } else {
            usize::MAX
        };
        let selector = InputSelector::new(request.input_kind, ring_size, fee_rate)
            .with_recipient_outputs(vec![request.output_kind; request.recipients.len()])
            .with_max_inputs(max_inputs);
        let subtract_fee = request.subtracts_fee();

        if let Some(pins) = &request.inputs {
            let mut pinned = Vec::with_capacity(pins.len());
            for outref in pins {
                let output = self
                    .storage
                    .get_output(outref)
                    .await?
                    .ok_or(StateError::UnknownOutput(*outref))?;
                if output.kind != request.input_kind {
                    return Err(StateError::KindMismatch(*outref).into());
                }
                if output.status == OutputStatus::Spent || output.spent_in.is_some() {
                    return Err(StateError::OutputSpent(*outref).into());
                }
                if state.tracker.is_locked(outref) {
                    return Err(StateError::OutputLocked(*outref).into());
                }
                if output.amount.is_none() {
                    return Err(StateError::AmountUnknown(*outref).into());
                }
                if output.height.is_none() {
                    return Err(ValidationError::MissingPrevout(*outref).into());
                }
                pinned.push(output);
            }
            return selector.select_pinned(pinned, amount, subtract_fee);
        }

        let tip = self.ledger.current_tip().await?;
        let candidates = self
            .storage
            .get_outputs(Some(
                OutputFilter::new()
                    .with_kind(request.input_kind)
                    .with_status(OutputStatus::Unspent),
            ))
            .await?;
        let (held, available): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .filter(|o| o.is_spendable() && o.confirmations(tip) >= self.config.min_confirmations)
            .partition(|o| state.tracker.is_unavailable(&o.outref));
        let locked_value = held.iter().map(|o| o.value()).fold(0u64, u64::saturating_add);

        selector
            .with_locked_value(locked_value)
            .select(available, amount, subtract_fee)
    }

    async fn build_and_broadcast(
        &self,
        state: &mut WalletState,
        request: &TransferRequest,
        keys: &AccountKeys,
        selection: UtxoSelection,
        ring_size: usize,
    ) -> WalletResult<SentTransaction> {
        let fee = selection.fee();
        let recipient_amounts = split_subtracted_fee(&request.recipients, fee)?;
        let paid = checked_sum(recipient_amounts.iter().copied())?;
        let change = selection
            .total_value
            .checked_sub(paid)
            .and_then(|rest| rest.checked_sub(fee))
            .ok_or(ResourceError::InsufficientFunds {
                available: selection.total_value,
                required: paid.saturating_add(fee),
            })?;

        let spent_outputs: Vec<OutputRef> = selection.utxos.iter().map(|o| o.outref).collect();
        let mut builder = TransactionBuilder::new(request.input_kind, request.output_kind).with_fee(fee);
        for output in selection.utxos {
            let ring = if output.kind == OutputKind::Anonymous {
                build_anon_ring(self.ledger.as_ref(), &output, ring_size).await?
            } else {
                PreparedRing::single(&output)
            };
            let spend = keys.address_keys(output.address_index)?.spend;
            let secret = one_time_private_key(&output.tweak_scalar(), &spend);
            builder = builder.add_input(SpendableInput {
                output,
                secret,
                ring,
            });
        }
        for (recipient, amount) in request.recipients.iter().zip(&recipient_amounts) {
            builder = builder.add_output(recipient.address.clone(), *amount);
        }
        if change > 0 {
            let change_address = state
                .address_of(CHANGE_ADDRESS_INDEX)
                .ok_or(StateError::NoAccount)?;
            builder = builder.add_change(change_address, change);
        }

        let built = builder.build()?;
        let size = built.transaction.to_bytes()?.len();
        let mut sent = SentTransaction {
            txid: built.txid,
            fee,
            size,
            rings: built.rings.clone(),
            recipient_amounts: recipient_amounts.clone(),
            change: (change > 0).then_some(change),
            broadcast: false,
        };
        if request.test_fee {
            return Ok(sent);
        }

        let txid = self
            .ledger
            .broadcast_transaction(built.transaction.clone())
            .await?;
        sent.txid = txid;
        sent.broadcast = true;

        let paid_to_others = request
            .recipients
            .iter()
            .zip(&recipient_amounts)
            .filter(|(recipient, _)| state.index_of(&recipient.address).is_none())
            .map(|(_, amount)| *amount)
            .fold(0u64, u64::saturating_add);
        let mut output_kinds = vec![request.output_kind];
        if change > 0 && request.input_kind != request.output_kind {
            output_kinds.push(request.input_kind);
        }
        let record = WalletTransactionRecord {
            txid,
            category: if paid_to_others == 0 {
                TransactionCategory::SelfTransfer
            } else {
                TransactionCategory::Send
            },
            input_kind: Some(request.input_kind),
            output_kinds,
            amount: paid_to_others,
            fee,
            comment: request.comment.clone(),
            height: None,
            state: TransactionState::Pending,
            rings: built.rings,
            spent_outputs,
        };
        self.storage.save_transaction(&record).await?;

        let mut events = Vec::new();
        self.apply_mempool_transaction(state, &built.transaction, &mut events)
            .await?;
        events.push(WalletEvent::TransactionBroadcast {
            txid,
            fee,
            input_kind: request.input_kind,
            output_kind: request.output_kind,
        });
        state.events.dispatch_all(events).await;

        info!(
            txid = %txid,
            fee,
            input_kind = %request.input_kind,
            output_kind = %request.output_kind,
            "sent transaction"
        );
        Ok(sent)
    }
}
