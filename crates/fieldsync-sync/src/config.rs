//! Pipeline configuration and device scope.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fieldsync_bridge::{INBOUND_DISPATCH_SCRIPT, OUTBOUND_DISPATCH_SCRIPT};
use fieldsync_core::serde_util::option_duration_ms;

/// Configuration for the outbound edit queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Maximum edits per dispatched batch.
    pub batch_size: usize,
    /// Script receiving each batch.
    pub script: String,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            script: OUTBOUND_DISPATCH_SCRIPT.to_string(),
        }
    }
}

/// Configuration for inbound reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    /// Maximum updates per delivered batch.
    pub batch_size: usize,
    /// Script applying each batch to the local store.
    pub script: String,
    /// Force-complete batch groups idle for longer than this.
    #[serde(with = "option_duration_ms")]
    pub group_staleness: Option<Duration>,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            script: INBOUND_DISPATCH_SCRIPT.to_string(),
            group_staleness: None,
        }
    }
}

/// Which device the pipelines work for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceScope {
    pub organization_id: String,
    pub device_id: String,
    /// Routing tags the device subscribes to.
    pub contexts: BTreeSet<String>,
}

impl DeviceScope {
    pub fn new(
        organization_id: impl Into<String>,
        device_id: impl Into<String>,
        contexts: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            device_id: device_id.into(),
            contexts: contexts.into_iter().map(Into::into).collect(),
        }
    }
}
