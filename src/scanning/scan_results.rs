//! Rescan results and progress reporting

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Structured progress reporting for rescans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Last fully processed block height
    pub current_height: u64,
    /// Tip height when the rescan started
    pub target_height: u64,
    /// Owned outputs found so far
    pub outputs_found: u64,
}

impl ScanProgress {
    pub fn percentage(&self) -> f64 {
        if self.target_height == 0 {
            return 100.0;
        }
        (self.current_height as f64 / self.target_height as f64 * 100.0).min(100.0)
    }
}

/// Outcome of a rescan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescanSummary {
    pub from_height: u64,
    /// Last height committed to storage, `None` if no block was processed
    pub last_scanned_height: Option<u64>,
    pub blocks_scanned: u64,
    pub outputs_found: u64,
    pub outputs_spent: u64,
    pub cancelled: bool,
    /// Scan duration
    pub scan_duration: Duration,
}

/// What processing one block changed in the wallet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockScanResult {
    pub height: u64,
    pub outputs_found: u64,
    pub outputs_spent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = ScanProgress {
            current_height: 5,
            target_height: 20,
            outputs_found: 0,
        };
        assert_eq!(progress.percentage(), 25.0);
        let empty_chain = ScanProgress {
            current_height: 0,
            target_height: 0,
            outputs_found: 0,
        };
        assert_eq!(empty_chain.percentage(), 100.0);
    }
}
