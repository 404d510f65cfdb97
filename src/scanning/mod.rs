//! Ownership detection for wallet outputs
//!
//! This module holds the stealth output scanner used when blocks and mempool
//! transactions arrive, the result types reported by rescans and the
//! cancellation tokens rescans honour between blocks.

pub mod cancellation;
pub mod output_scanner;
pub mod scan_results;

pub use cancellation::{CancellationToken, NeverCancelToken, SharedCancellationToken, StopHandle};
pub use output_scanner::{complete_output, OutputLocation, OutputScanner, ScanKey};
pub use scan_results::{BlockScanResult, RescanSummary, ScanProgress};
