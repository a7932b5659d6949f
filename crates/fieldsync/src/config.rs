//! Engine configuration.
//!
//! Every struct has a `Default` and deserializes from partial JSON, so a host
//! only spells out what it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fieldsync_bridge::BridgeConfig;
use fieldsync_core::serde_util::duration_ms;
use fieldsync_sync::{DeviceScope, InboundConfig, OutboundConfig};

/// Whether the device takes part in inbound sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Never subscribes to cloud updates.
    #[default]
    Passive,
    Active,
}

/// Identity and routing of this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    pub organization_id: String,
    pub device_id: String,
    pub device_type: String,
    pub mode: DeviceMode,
    /// Routing tags of the updates this device receives.
    pub contexts: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            organization_id: "ORG_demo".to_string(),
            device_id: "DEV_demo".to_string(),
            device_type: "webApp".to_string(),
            mode: DeviceMode::Passive,
            contexts: vec!["defaultContext".to_string()],
        }
    }
}

impl DeviceConfig {
    pub fn is_passive(&self) -> bool {
        self.mode == DeviceMode::Passive
    }

    pub fn scope(&self) -> DeviceScope {
        DeviceScope::new(
            self.organization_id.clone(),
            self.device_id.clone(),
            self.contexts.iter().cloned(),
        )
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub device: DeviceConfig,
    pub bridge: BridgeConfig,
    pub outbound: OutboundConfig,
    pub inbound: InboundConfig,
    /// How often a payload waits for startup to finish.
    pub ready_attempts: u32,
    #[serde(with = "duration_ms")]
    pub ready_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            bridge: BridgeConfig::default(),
            outbound: OutboundConfig::default(),
            inbound: InboundConfig::default(),
            ready_attempts: 5,
            ready_retry_delay: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.device.organization_id, "ORG_demo");
        assert_eq!(config.device.device_id, "DEV_demo");
        assert!(config.device.is_passive());
        assert_eq!(config.device.contexts, vec!["defaultContext"]);
        assert_eq!(config.ready_attempts, 5);
        assert_eq!(config.bridge.probe_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "device": {"deviceId": "DEV_7", "mode": "active", "contexts": ["north", "south"]},
                "outbound": {"batch_size": 4},
                "ready_retry_delay": 250
            }"#,
        )
        .unwrap();

        assert_eq!(config.device.device_id, "DEV_7");
        assert_eq!(config.device.organization_id, "ORG_demo");
        assert_eq!(config.device.mode, DeviceMode::Active);
        assert_eq!(config.outbound.batch_size, 4);
        assert_eq!(config.inbound.batch_size, 25);
        assert_eq!(config.ready_retry_delay, Duration::from_millis(250));

        let scope = config.device.scope();
        assert!(scope.contexts.contains("south"));
        assert_eq!(scope.device_id, "DEV_7");
    }
}
