//! Driver configuration.

use serde::{Deserialize, Serialize};

/// Top-level driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Prefix of every database owned by this driver; the database for a
    /// code is `<sys_name><code>`.
    pub sys_name: String,
    /// Reconnect supervisor: attempts before giving up.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Reconnect supervisor: pause between attempts, in milliseconds.
    #[serde(default = "default_reconnect_pause_ms")]
    pub reconnect_pause_ms: u64,
    /// Pin updates/removes/revisions to the revision the row carried when
    /// it was read. Implies undo restore mode.
    #[serde(default)]
    pub update_pk_with_revision: bool,
    /// Disable post-bulk row-count assertions (used during undo restore).
    #[serde(default)]
    pub skip_op_cnt_checking: bool,
}

fn default_reconnect_attempts() -> u32 {
    12
}

fn default_reconnect_pause_ms() -> u64 {
    5_000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sys_name: "_CHAIN_".to_string(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_pause_ms: default_reconnect_pause_ms(),
            update_pk_with_revision: false,
            skip_op_cnt_checking: false,
        }
    }
}

impl DriverConfig {
    pub fn new(sys_name: impl Into<String>) -> Self {
        Self { sys_name: sys_name.into(), ..Self::default() }
    }
}
