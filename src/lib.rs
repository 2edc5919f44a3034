//! # TideKV
//!
//! An embedded key-value store with:
//! - An append-only, checksummed log for durability
//! - Crash recovery by full replay on open
//! - All-or-nothing multi-key commits (one batch record per transaction)
//! - Two concurrency-control protocols: strict 2PL and timestamp-ordered MVCC,
//!   both acquiring without waiting
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Db façade                            │
//! │      get / put / increase32 / delete / start_transaction    │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ direct ops                        │ transactions
//!            │                    ┌──────────────▼──────────────┐
//!            │                    │  LockManager  │ MvccManager │
//!            │                    │  (2PL locks)  │ (versions)  │
//!            │                    └──────────────┬──────────────┘
//!            │                                   │ commit = one batch
//! ┌──────────▼───────────────────────────────────▼──────────────┐
//! │                  Storage (LogStorage)                       │
//! │        ┌─────────────────┐        ┌─────────────────┐       │
//! │        │  Log (append)   │  ───▶  │  Index (memory) │       │
//! │        └─────────────────┘        └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod db;
pub mod index;
pub mod log;
pub mod storage;
pub mod txn;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, Protocol, SyncStrategy};
pub use db::Db;
pub use error::{Result, TideError};
pub use storage::{LogStorage, MemoryStorage, SharedStorage, Storage};
pub use txn::{Transaction, TxState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
