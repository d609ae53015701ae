//! Round configuration

use serde::{Deserialize, Serialize};
use tessera_scheduler::{DispatcherConfig, GrouperConfig};

/// Round configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Maximum transactions drained per round
    pub ready_limit: usize,
    /// Grouping
    pub grouper: GrouperConfig,
    /// Dispatch
    pub dispatcher: DispatcherConfig,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            ready_limit: 4096,
            grouper: GrouperConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}
