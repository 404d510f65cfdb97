//! Event type definitions emitted by the wallet
//!
//! Events are delivered to listeners after the wallet state they describe has
//! been committed to storage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    data_structures::{
        output::OutputKind,
        types::{OutputRef, TxId},
    },
    scanning::{RescanSummary, ScanProgress},
};

/// Something observable happened to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    /// A new owned output was recorded
    OutputDetected {
        outref: OutputRef,
        kind: OutputKind,
        /// `None` while the wallet is locked
        amount: Option<u64>,
        height: Option<u64>,
        address_index: u32,
    },
    /// An owned output was consumed by a transaction
    OutputSpent {
        outref: OutputRef,
        txid: TxId,
        height: Option<u64>,
    },
    /// A confirmed block finished processing
    BlockProcessed {
        height: u64,
        outputs_found: u64,
        outputs_spent: u64,
    },
    /// A block was removed from the tip by a reorganization
    BlockDisconnected { height: u64 },
    TransactionBroadcast {
        txid: TxId,
        fee: u64,
        input_kind: OutputKind,
        output_kind: OutputKind,
    },
    /// A pending send references an anonymity index that no longer exists
    RingInvalidated { txid: TxId, index: u64 },
    /// A pending wallet transaction left the mempool without confirming
    TransactionDiscarded { txid: TxId },
    /// Amounts of outputs detected while locked were recovered
    AmountsRecovered { count: u64 },
    RescanProgress(ScanProgress),
    RescanCompleted(RescanSummary),
}

impl WalletEvent {
    /// Get the string name of this event type
    pub fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::OutputDetected { .. } => "OutputDetected",
            WalletEvent::OutputSpent { .. } => "OutputSpent",
            WalletEvent::BlockProcessed { .. } => "BlockProcessed",
            WalletEvent::BlockDisconnected { .. } => "BlockDisconnected",
            WalletEvent::TransactionBroadcast { .. } => "TransactionBroadcast",
            WalletEvent::RingInvalidated { .. } => "RingInvalidated",
            WalletEvent::TransactionDiscarded { .. } => "TransactionDiscarded",
            WalletEvent::AmountsRecovered { .. } => "AmountsRecovered",
            WalletEvent::RescanProgress(_) => "RescanProgress",
            WalletEvent::RescanCompleted(_) => "RescanCompleted",
        }
    }

    /// Serialize event to compact JSON
    pub fn to_compact_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for WalletEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletEvent::OutputDetected {
                outref,
                kind,
                amount,
                ..
            } => match amount {
                Some(amount) => write!(f, "detected {kind} output {outref} worth {amount}"),
                None => write!(f, "detected {kind} output {outref}, amount pending unlock"),
            },
            WalletEvent::OutputSpent { outref, txid, .. } => {
                write!(f, "output {outref} spent by {txid}")
            }
            WalletEvent::BlockProcessed {
                height,
                outputs_found,
                outputs_spent,
            } => write!(
                f,
                "block {height}: {outputs_found} found, {outputs_spent} spent"
            ),
            WalletEvent::BlockDisconnected { height } => write!(f, "block {height} disconnected"),
            WalletEvent::TransactionBroadcast { txid, fee, .. } => {
                write!(f, "broadcast {txid} paying fee {fee}")
            }
            WalletEvent::RingInvalidated { txid, index } => {
                write!(f, "ring of {txid} lost index {index}")
            }
            WalletEvent::TransactionDiscarded { txid } => write!(f, "{txid} discarded"),
            WalletEvent::AmountsRecovered { count } => write!(f, "{count} amounts recovered"),
            WalletEvent::RescanProgress(progress) => write!(
                f,
                "rescan at {}/{}",
                progress.current_height, progress.target_height
            ),
            WalletEvent::RescanCompleted(summary) => write!(
                f,
                "rescan finished: {} blocks, {} outputs",
                summary.blocks_scanned, summary.outputs_found
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_is_tagged() {
        let event = WalletEvent::BlockDisconnected { height: 4 };
        let json = event.to_compact_json().unwrap();
        assert_eq!(json, r#"{"type":"block_disconnected","height":4}"#);
        let parsed: WalletEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_locked_detection_display() {
        let event = WalletEvent::OutputDetected {
            outref: OutputRef::new(TxId([0u8; 32]), 1),
            kind: OutputKind::Anonymous,
            amount: None,
            height: Some(3),
            address_index: 1,
        };
        assert!(event.to_string().contains("pending unlock"));
        assert_eq!(event.event_type(), "OutputDetected");
    }
}
