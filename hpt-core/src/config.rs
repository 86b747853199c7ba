// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Device limits and the endpoints to bring up are validated at load time.
//! Any invalid field results in a HardValidationError.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, HptError, HptResult};
use crate::shm::SLOT_USABLE_SIZE;
use crate::types::{EndpointName, RingCapacity, MAX_ITEMS};

/// Default global block budget, shared by every endpoint of a device.
pub const DEFAULT_MAX_BLOCKS: usize = 64000;

/// Default pump sleep between cycles.
pub const DEFAULT_POLL_INTERVAL_NS: u64 = 30;

/// Default interface MTU.
pub const DEFAULT_MTU: usize = 1350;

/// Smallest MTU an IPv4 interface may carry.
pub const MIN_MTU: usize = 68;

const MAX_POLL_INTERVAL_NS: u64 = 1_000_000_000;

/// Raw device configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawDeviceConfig {
    #[serde(default = "default_max_items")]
    max_items: usize,
    #[serde(default = "default_max_blocks")]
    max_blocks: usize,
    #[serde(default = "default_poll_interval_ns")]
    poll_interval_ns: u64,
    #[serde(default = "default_mtu")]
    mtu: usize,
}

fn default_max_items() -> usize {
    MAX_ITEMS
}

fn default_max_blocks() -> usize {
    DEFAULT_MAX_BLOCKS
}

fn default_poll_interval_ns() -> u64 {
    DEFAULT_POLL_INTERVAL_NS
}

fn default_mtu() -> usize {
    DEFAULT_MTU
}

impl Default for RawDeviceConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_blocks: default_max_blocks(),
            poll_interval_ns: default_poll_interval_ns(),
            mtu: default_mtu(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEndpointConfig {
    name: String,
    capacity: usize,
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    device: RawDeviceConfig,
    #[serde(default)]
    endpoints: Vec<RawEndpointConfig>,
}

/// Validated device configuration.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceConfig {
    /// Upper bound on ring capacity, never above `MAX_ITEMS`.
    pub max_items: usize,
    /// Blocks all endpoints together may hold.
    pub max_blocks: usize,
    /// Pump sleep between cycles.
    pub poll_interval: Duration,
    /// MTU advertised when an interface is registered.
    pub mtu: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS,
            max_blocks: DEFAULT_MAX_BLOCKS,
            poll_interval: Duration::from_nanos(DEFAULT_POLL_INTERVAL_NS),
            mtu: DEFAULT_MTU,
        }
    }
}

/// Validated endpoint to bring up.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointConfig {
    pub name: EndpointName,
    pub capacity: RingCapacity,
}

/// Complete validated configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HptConfig {
    pub device: DeviceConfig,
    pub endpoints: Vec<EndpointConfig>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> HptResult<HptConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(HptError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| HptError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> HptResult<HptConfig> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| HptError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> HptResult<HptConfig> {
        let device = Self::validate_device(raw.device)?;

        let mut endpoints = Vec::with_capacity(raw.endpoints.len());
        let mut seen = HashSet::new();

        for raw_endpoint in raw.endpoints {
            let name = EndpointName::new(raw_endpoint.name)?;
            let capacity = RingCapacity::new(raw_endpoint.capacity, device.max_items)?;

            if !seen.insert(name.clone()) {
                return Err(HardValidationError::DuplicateEndpoint {
                    name: name.to_string(),
                }
                .into());
            }

            endpoints.push(EndpointConfig { name, capacity });
        }

        Ok(HptConfig { device, endpoints })
    }

    fn validate_device(raw: RawDeviceConfig) -> HptResult<DeviceConfig> {
        if raw.max_items == 0 || raw.max_items > MAX_ITEMS {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_items",
                value: raw.max_items.to_string(),
                reason: format!("Must be between 1 and {}", MAX_ITEMS),
            }
            .into());
        }

        if raw.max_blocks == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_blocks",
                value: "0".to_string(),
                reason: "Block budget must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.poll_interval_ns == 0 || raw.poll_interval_ns > MAX_POLL_INTERVAL_NS {
            return Err(HardValidationError::InvalidFieldValue {
                field: "poll_interval_ns",
                value: raw.poll_interval_ns.to_string(),
                reason: format!("Must be between 1 and {}", MAX_POLL_INTERVAL_NS),
            }
            .into());
        }

        // A packet at the MTU must fit one slot.
        if raw.mtu < MIN_MTU || raw.mtu > SLOT_USABLE_SIZE {
            return Err(HardValidationError::InvalidFieldValue {
                field: "mtu",
                value: raw.mtu.to_string(),
                reason: format!("Must be between {} and {}", MIN_MTU, SLOT_USABLE_SIZE),
            }
            .into());
        }

        Ok(DeviceConfig {
            max_items: raw.max_items,
            max_blocks: raw.max_blocks,
            poll_interval: Duration::from_nanos(raw.poll_interval_ns),
            mtu: raw.mtu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
device:
  max_items: 4096
  max_blocks: 1000
  poll_interval_ns: 500
  mtu: 1500

endpoints:
  - name: hpt0
    capacity: 1024
  - name: hpt1
    capacity: 16
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.device.max_items, 4096);
        assert_eq!(config.device.max_blocks, 1000);
        assert_eq!(config.device.poll_interval, Duration::from_nanos(500));
        assert_eq!(config.device.mtu, 1500);
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].name.as_str(), "hpt0");
        assert_eq!(config.endpoints[1].capacity.get(), 16);
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::load_string("endpoints: []").unwrap();
        assert_eq!(config.device.max_items, MAX_ITEMS);
        assert_eq!(config.device.max_blocks, DEFAULT_MAX_BLOCKS);
        assert_eq!(config.device.mtu, DEFAULT_MTU);
        assert_eq!(
            config.device.poll_interval,
            HptConfig::default().device.poll_interval
        );
    }

    #[test]
    fn test_capacity_above_device_limit() {
        let yaml = r#"
device:
  max_items: 8
endpoints:
  - name: hpt0
    capacity: 9
"#;
        let result = ConfigLoader::load_string(yaml);
        assert!(matches!(
            result,
            Err(HptError::HardValidation(
                HardValidationError::InvalidCapacity { capacity: 9, max: 8 }
            ))
        ));
    }

    #[test]
    fn test_invalid_name() {
        let yaml = r#"
endpoints:
  - name: "eth0:1"
    capacity: 4
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(HptError::HardValidation(HardValidationError::InvalidName { .. }))
        ));
    }

    #[test]
    fn test_duplicate_endpoint() {
        let yaml = r#"
endpoints:
  - name: hpt0
    capacity: 4
  - name: hpt0
    capacity: 8
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(HptError::HardValidation(HardValidationError::DuplicateEndpoint { .. }))
        ));
    }

    #[test]
    fn test_mtu_must_fit_a_slot() {
        let yaml = format!("device:\n  mtu: {}\n", SLOT_USABLE_SIZE + 1);
        let result = ConfigLoader::load_string(&yaml);
        assert!(matches!(
            result,
            Err(HptError::HardValidation(HardValidationError::InvalidFieldValue {
                field: "mtu",
                ..
            }))
        ));
    }

    #[test]
    fn test_zero_poll_interval() {
        let result = ConfigLoader::load_string("device:\n  poll_interval_ns: 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            ConfigLoader::load_string("device: [unclosed"),
            Err(HptError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ConfigLoader::load_file("/nonexistent/hpt.yaml"),
            Err(HptError::ConfigNotFound { .. })
        ));
    }
}
