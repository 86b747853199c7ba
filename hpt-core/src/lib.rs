//! HPT Core Library
//!
//! High-performance point-to-point tunnel over a shared-memory ring
//! transport. Provides the slot format and SPSC ring protocol, the
//! block-backed region manager, endpoint lifecycle, the packet pump, the
//! consumer client, configuration parsing and per-endpoint statistics.

pub mod client;
pub mod config;
pub mod device;
pub mod doorbell;
pub mod endpoint;
pub mod error;
pub mod pump;
pub mod registry;
pub mod shm;
pub mod stack;
pub mod state;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use client::{Hpt, HptReader, HptWriter};
pub use config::{ConfigLoader, DeviceConfig, EndpointConfig, HptConfig};
pub use device::{Device, DeviceHandle};
pub use endpoint::{ConsumerMapping, EndpointInfo};
pub use error::{
    HardValidationError, HptError, HptResult, RegionError, RingError, StackError,
    StateTransitionError,
};
pub use pump::{TxOutcome, TxQueue};
pub use stack::{InboundPacket, InterfaceSpec, LoopbackMode, LoopbackStack, NetStack, Protocol};
pub use state::EndpointState;
pub use stats::{DeviceStats, DropReason, EndpointReport, StatsSnapshot};
pub use types::{Direction, EndpointName, RingCapacity, MAX_ITEMS, NAME_SIZE};
