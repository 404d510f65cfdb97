use serde::{Deserialize, Serialize};

use crate::errors::WalletError;

/// Chain state of an owned output. Lock state is tracked separately since it
/// is a wallet-side preference, not a chain fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputStatus {
    /// Seen in the mempool, not yet confirmed
    Unconfirmed = 0,
    Unspent = 1,
    /// Spent by a confirmed or pending wallet transaction
    Spent = 2,
}

impl TryFrom<u32> for OutputStatus {
    type Error = WalletError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutputStatus::Unconfirmed),
            1 => Ok(OutputStatus::Unspent),
            2 => Ok(OutputStatus::Spent),
            other => Err(WalletError::StorageError(format!(
                "Unknown output status {other}"
            ))),
        }
    }
}

impl From<OutputStatus> for u32 {
    fn from(status: OutputStatus) -> Self {
        status as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [
            OutputStatus::Unconfirmed,
            OutputStatus::Unspent,
            OutputStatus::Spent,
        ] {
            assert_eq!(OutputStatus::try_from(u32::from(status)).unwrap(), status);
        }
        assert!(matches!(
            OutputStatus::try_from(7),
            Err(WalletError::StorageError(_))
        ));
    }
}
