// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Size of the interface name field, including the terminating NUL.
pub const NAME_SIZE: usize = 32;

/// Hard upper bound on slots per ring.
pub const MAX_ITEMS: usize = 65536;

/// Validated interface name.
/// Must fit a NUL-terminated `NAME_SIZE` buffer and be a valid link name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointName(String);

impl EndpointName {
    /// Create a new EndpointName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        let reason = if name.is_empty() {
            Some("Name cannot be empty".to_string())
        } else if name.len() >= NAME_SIZE {
            Some(format!(
                "Name too long: {} bytes (max {})",
                name.len(),
                NAME_SIZE - 1
            ))
        } else if name.contains('\0') {
            Some("Name must not contain NUL bytes".to_string())
        } else if name == "." || name == ".." {
            Some("Name cannot be '.' or '..'".to_string())
        } else if name
            .chars()
            .any(|c| c == '/' || c == ':' || c.is_whitespace())
        {
            Some("Name must not contain '/', ':' or whitespace".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(HardValidationError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EndpointName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EndpointName> for String {
    fn from(name: EndpointName) -> Self {
        name.0
    }
}

/// Validated ring capacity (slots per direction).
/// Must be in range 1..=max, where max never exceeds `MAX_ITEMS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RingCapacity(usize);

impl RingCapacity {
    /// Create a capacity bounded by `max` (clamped to `MAX_ITEMS`).
    pub fn new(capacity: usize, max: usize) -> Result<Self, HardValidationError> {
        let max = max.min(MAX_ITEMS);
        if capacity == 0 || capacity > max {
            return Err(HardValidationError::InvalidCapacity { capacity, max });
        }
        Ok(Self(capacity))
    }

    /// Get the number of slots.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RingCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packet direction, named from the network stack's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Consumer → network stack (drained by the pump).
    Inbound,
    /// Network stack → consumer (drained by the client).
    Outbound,
}

impl Direction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_name_valid() {
        assert!(EndpointName::new("hpt0").is_ok());
        assert!(EndpointName::new("tun-fast_1").is_ok());
        assert!(EndpointName::new("a".repeat(NAME_SIZE - 1)).is_ok());
    }

    #[test]
    fn test_endpoint_name_invalid() {
        assert!(EndpointName::new("").is_err());
        assert!(EndpointName::new("a".repeat(NAME_SIZE)).is_err());
        assert!(EndpointName::new("bad\0name").is_err());
        assert!(EndpointName::new("eth0:1").is_err());
        assert!(EndpointName::new("a/b").is_err());
        assert!(EndpointName::new("has space").is_err());
        assert!(EndpointName::new("..").is_err());
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(RingCapacity::new(1, MAX_ITEMS).is_ok());
        assert!(RingCapacity::new(MAX_ITEMS, MAX_ITEMS).is_ok());
        assert!(RingCapacity::new(0, MAX_ITEMS).is_err());
        assert!(RingCapacity::new(MAX_ITEMS + 1, usize::MAX).is_err());
        assert!(RingCapacity::new(17, 16).is_err());
    }
}
