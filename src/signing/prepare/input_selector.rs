use crate::{
    data_structures::output::OutputKind,
    errors::{ResourceError, WalletResult},
    signing::fee::{estimate_fee, TxShape},
    storage::OwnedOutput,
};

#[derive(Debug)]
pub struct UtxoSelection {
    pub utxos: Vec<OwnedOutput>,
    pub requires_change_output: bool,
    pub total_value: u64,
    pub fee_without_change: u64,
    pub fee_with_change: u64,
}

impl UtxoSelection {
    pub fn fee(&self) -> u64 {
        if self.requires_change_output {
            self.fee_with_change
        } else {
            self.fee_without_change
        }
    }
}

/// Picks real inputs of one kind for a transfer
pub struct InputSelector {
    pub input_kind: OutputKind,
    pub ring_size: usize,
    pub fee_rate: u64,
    /// Kinds of the recipient outputs, change excluded
    pub recipient_outputs: Vec<OutputKind>,
    pub max_inputs: usize,
    /// Value held in outputs of the input kind that are locked or reserved
    pub locked_value: u64,
}

impl InputSelector {
    pub fn new(input_kind: OutputKind, ring_size: usize, fee_rate: u64) -> Self {
        Self {
            input_kind,
            ring_size: if input_kind == OutputKind::Anonymous {
                ring_size
            } else {
                1
            },
            fee_rate,
            recipient_outputs: Vec::new(),
            max_inputs: usize::MAX,
            locked_value: 0,
        }
    }

    pub fn with_recipient_outputs(mut self, kinds: Vec<OutputKind>) -> Self {
        self.recipient_outputs = kinds;
        self
    }

    pub fn with_max_inputs(mut self, max_inputs: usize) -> Self {
        self.max_inputs = max_inputs;
        self
    }

    pub fn with_locked_value(mut self, locked_value: u64) -> Self {
        self.locked_value = locked_value;
        self
    }

    /// Fee for `inputs` real inputs, with or without a change output
    pub fn fee_for(&self, inputs: usize, with_change: bool) -> u64 {
        let mut shape = TxShape::new().with_inputs(self.input_kind, self.ring_size, inputs);
        shape.outputs.extend(self.recipient_outputs.iter().copied());
        if with_change {
            shape.outputs.push(self.input_kind);
        }
        estimate_fee(self.fee_rate, &shape)
    }

    /// Amount the inputs must cover. When the fee is taken out of the
    /// recipients' amounts the inputs only need to cover `amount`.
    fn required(&self, amount: u64, fee: u64, subtract_fee: bool) -> Result<u64, ResourceError> {
        if subtract_fee {
            Ok(amount)
        } else {
            amount.checked_add(fee).ok_or(ResourceError::AmountOverflow)
        }
    }

    /// Decide whether `total` pays for `amount` with `count` inputs
    fn settle(
        &self,
        total: u64,
        count: usize,
        amount: u64,
        subtract_fee: bool,
    ) -> Result<Option<(bool, u64, u64)>, ResourceError> {
        let fee_without_change = self.fee_for(count, false);
        let fee_with_change = self.fee_for(count, true);
        let required_without = self.required(amount, fee_without_change, subtract_fee)?;
        let required_with = self.required(amount, fee_with_change, subtract_fee)?;

        if total > required_with {
            return Ok(Some((true, fee_without_change, fee_with_change)));
        }
        if total >= required_without {
            // Leftover too small to pay for its own change output goes to the fee
            let absorbed = if subtract_fee {
                fee_without_change
            } else {
                total - amount
            };
            return Ok(Some((false, absorbed, fee_with_change)));
        }
        Ok(None)
    }

    fn selection(
        utxos: Vec<OwnedOutput>,
        total_value: u64,
        settled: (bool, u64, u64),
    ) -> UtxoSelection {
        let (requires_change_output, fee_without_change, fee_with_change) = settled;
        UtxoSelection {
            utxos,
            requires_change_output,
            total_value,
            fee_without_change,
            fee_with_change,
        }
    }

    fn shortfall(&self, available: u64, amount: u64, subtract_fee: bool) -> ResourceError {
        let required = self
            .required(amount, self.fee_for(1, false), subtract_fee)
            .unwrap_or(u64::MAX);
        if available < required && available.saturating_add(self.locked_value) >= required {
            ResourceError::LockedInputsOnly
        } else {
            ResourceError::InsufficientFunds {
                available,
                required,
            }
        }
    }

    /// Fewest-inputs selection: the smallest single output that covers the
    /// transfer if one exists, otherwise the largest outputs first.
    pub fn select(
        &self,
        mut candidates: Vec<OwnedOutput>,
        amount: u64,
        subtract_fee: bool,
    ) -> WalletResult<UtxoSelection> {
        candidates.retain(|o| o.kind == self.input_kind && o.amount.is_some());
        candidates.sort_by(|a, b| a.value().cmp(&b.value()).then(a.outref.cmp(&b.outref)));

        for candidate in &candidates {
            if let Some(settled) = self.settle(candidate.value(), 1, amount, subtract_fee)? {
                let total = candidate.value();
                return Ok(Self::selection(vec![candidate.clone()], total, settled));
            }
        }

        let available = candidates.iter().map(|o| o.value()).fold(0u64, u64::saturating_add);
        let mut utxos = Vec::new();
        let mut total_value = 0u64;
        for candidate in candidates.into_iter().rev() {
            if utxos.len() >= self.max_inputs {
                break;
            }
            total_value = total_value
                .checked_add(candidate.value())
                .ok_or(ResourceError::AmountOverflow)?;
            utxos.push(candidate);

            if let Some(settled) = self.settle(total_value, utxos.len(), amount, subtract_fee)? {
                return Ok(Self::selection(utxos, total_value, settled));
            }
        }

        Err(self.shortfall(available, amount, subtract_fee).into())
    }

    /// Coin control: spend exactly the pinned outputs
    pub fn select_pinned(
        &self,
        pinned: Vec<OwnedOutput>,
        amount: u64,
        subtract_fee: bool,
    ) -> WalletResult<UtxoSelection> {
        let total_value = pinned
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value()))
            .ok_or(ResourceError::AmountOverflow)?;
        match self.settle(total_value, pinned.len(), amount, subtract_fee)? {
            Some(settled) => Ok(Self::selection(pinned, total_value, settled)),
            None => Err(ResourceError::InsufficientFunds {
                available: total_value,
                required: self.required(
                    amount,
                    self.fee_for(pinned.len(), false),
                    subtract_fee,
                )?,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::types::{Commitment, OutputRef, PublicKey, TxId},
        errors::WalletError,
        storage::OutputStatus,
    };

    fn candidate(n: u8, kind: OutputKind, amount: u64) -> OwnedOutput {
        OwnedOutput {
            outref: OutputRef::new(TxId([n; 32]), 0),
            kind,
            amount: Some(amount),
            blinding: Some([0u8; 32]),
            one_time_key: PublicKey([n; 32]),
            ephemeral_key: PublicKey([0u8; 32]),
            commitment: Commitment([0u8; 32]),
            key_tweak: [0u8; 32],
            encrypted_data: vec![],
            address_index: 1,
            anon_index: None,
            height: Some(1),
            status: OutputStatus::Unspent,
            spent_in: None,
            spent_height: None,
            key_image: None,
        }
    }

    fn selector() -> InputSelector {
        InputSelector::new(OutputKind::Confidential, 1, 1_000)
            .with_recipient_outputs(vec![OutputKind::Confidential])
    }

    #[test]
    fn test_single_smallest_covering_output() {
        let selector = selector();
        let candidates = vec![
            candidate(1, OutputKind::Confidential, 1_000_000),
            candidate(2, OutputKind::Confidential, 50_000),
            candidate(3, OutputKind::Confidential, 10_000_000),
        ];
        let selection = selector.select(candidates, 40_000, false).unwrap();
        assert_eq!(selection.utxos.len(), 1);
        assert_eq!(selection.total_value, 50_000);
        assert!(selection.requires_change_output);
        assert_eq!(selection.fee(), selector.fee_for(1, true));
    }

    #[test]
    fn test_largest_first_accumulation() {
        let selector = selector();
        let candidates = (1..=5)
            .map(|n| candidate(n, OutputKind::Confidential, 10_000 * n as u64))
            .collect();
        let selection = selector.select(candidates, 80_000, false).unwrap();
        let values: Vec<u64> = selection.utxos.iter().map(|o| o.value()).collect();
        assert_eq!(values, vec![50_000, 40_000]);
        assert!(selection.total_value >= 80_000 + selection.fee());
    }

    #[test]
    fn test_other_kinds_ignored() {
        let selector = selector();
        let candidates = vec![candidate(1, OutputKind::Anonymous, 1_000_000)];
        let err = selector.select(candidates, 1_000, false).unwrap_err();
        assert!(matches!(
            err,
            WalletError::Resource(ResourceError::InsufficientFunds { available: 0, .. })
        ));
    }

    #[test]
    fn test_locked_inputs_only() {
        let selector = selector().with_locked_value(5_000_000);
        let err = selector
            .select(vec![candidate(1, OutputKind::Confidential, 100)], 1_000_000, false)
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::Resource(ResourceError::LockedInputsOnly)
        ));
    }

    #[test]
    fn test_subtract_fee_needs_only_amount() {
        let selector = selector();
        let selection = selector
            .select(vec![candidate(1, OutputKind::Confidential, 60_000)], 60_000, true)
            .unwrap();
        assert!(!selection.requires_change_output);
        assert!(selector
            .select(vec![candidate(1, OutputKind::Confidential, 60_000)], 60_000, false)
            .is_err());
    }

    #[test]
    fn test_dust_absorbed_into_fee() {
        let selector = selector();
        let fee = selector.fee_for(1, false);
        let selection = selector
            .select(
                vec![candidate(1, OutputKind::Confidential, 10_000 + fee + 3)],
                10_000,
                false,
            )
            .unwrap();
        assert!(!selection.requires_change_output);
        assert_eq!(selection.fee(), fee + 3);
    }

    #[test]
    fn test_pinned_inputs() {
        let selector = selector();
        let pinned = vec![
            candidate(1, OutputKind::Confidential, 30_000),
            candidate(2, OutputKind::Confidential, 30_000),
        ];
        let selection = selector.select_pinned(pinned.clone(), 10_000, false).unwrap();
        assert_eq!(selection.utxos.len(), 2);
        assert!(selector.select_pinned(pinned, 59_000, false).is_err());
    }
}
