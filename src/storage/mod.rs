//! Storage abstraction layer for wallet state
//!
//! This module provides a trait-based storage system that allows different
//! storage backends to persist accounts, owned outputs, locks and history.
//! An in-memory backend is always available; SQLite support sits behind the
//! `storage` feature.

pub mod memory;
pub mod output_status;
#[cfg(feature = "storage")]
pub mod sqlite;
pub mod storage_trait;
pub mod stored_output;

pub use memory::MemoryStorage;
pub use output_status::*;
#[cfg(feature = "storage")]
pub use sqlite::*;
pub use storage_trait::*;
pub use stored_output::*;
