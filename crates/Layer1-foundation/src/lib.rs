//! # relay-foundation
//!
//! Foundation layer for Relay:
//! - Error: the shared error type and `Result` alias
//! - Storage: `JsonStore`, pretty-printed JSON files written atomically
//! - Config: `RelayConfig`, global + project settings merged field by field
//!
//! ## Layout
//!
//! ```text
//! <data dir>/                 (default: ./.relay)
//! ├── config.json             RelayConfig
//! ├── ready.json              index: ids in the ready category
//! ├── completed.json          index: ids in the completed category
//! ├── failed.json             index: ids in the failed category
//! ├── ready/<id>.json         ready + inProgress records
//! ├── completed/<id>.json
//! └── failed/<id>.json
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{RelayConfig, DATA_DIR_NAME, RELAY_CONFIG_FILE};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;
