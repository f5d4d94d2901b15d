//! Config - executor settings
//!
//! - `relay.rs` - RelayConfig, global + project merge

mod relay;

pub use relay::{RelayConfig, DATA_DIR_NAME, RELAY_CONFIG_FILE};
