//! Custom error types for HPT.
//!
//! Explicit enum error types for every layer, converted into `HptError`.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::EndpointState;
use crate::types::{Direction, EndpointName};

/// Top-level error type for the HPT device and client.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum HptError {
    // =========================================================================
    // Validation Errors - Rejected Synchronously, Nothing Created
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Endpoint Lifecycle Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Interface name already in use: {0}")]
    NameInUse(EndpointName),

    #[error("Network stack refused interface {name}: {reason}")]
    Registration { name: EndpointName, reason: String },

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(EndpointName),

    #[error("Endpoint {name} is {state}, not active")]
    EndpointNotActive {
        name: EndpointName,
        state: EndpointState,
    },

    #[error("Handle already owns an endpoint")]
    AlreadyCreated,

    #[error("Endpoint is already mapped by this handle")]
    AlreadyMapped,

    #[error("No endpoint has been created on this handle")]
    NotCreated,

    // =========================================================================
    // Shared Memory Errors
    // =========================================================================
    #[error("Shared region error: {0}")]
    Region(#[from] RegionError),

    #[error("Ring error: {0}")]
    Ring(#[from] RingError),

    #[error("Ring header mismatch for {direction}: expected capacity {expected}, found {found}")]
    HeaderMismatch {
        direction: Direction,
        expected: u64,
        found: u64,
    },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Caller errors rejected before any state is created.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid ring capacity: {capacity} (must be between 1 and {max})")]
    InvalidCapacity { capacity: usize, max: usize },

    #[error("Invalid interface name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Duplicate endpoint name: {name}")]
    DuplicateEndpoint { name: String },
}

/// State transition errors for the endpoint state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for endpoint {endpoint}")]
    InvalidTransition {
        endpoint: EndpointName,
        from: &'static str,
        to: &'static str,
    },
}

/// Region allocation and mapping errors.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Out of memory: {allocated} of {requested} blocks allocated - {reason}")]
    OutOfMemory {
        requested: usize,
        allocated: usize,
        reason: String,
    },

    #[error("Mapping size mismatch: requested {requested} bytes, region is {expected} bytes")]
    SizeMismatch { requested: usize, expected: usize },

    #[error("Failed to map region: {reason}")]
    MapFailed { reason: String },

    #[error("Region has already been released")]
    Released,
}

/// Packet-path errors. These never escape the pump or the tx queue as hard
/// failures; they are counted as drops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("Ring full - no free slot")]
    Full,

    #[error("Ring empty - no slot available")]
    Empty,

    #[error("Payload size exceeds slot capacity: {size} > {max}")]
    OversizedPayload { size: usize, max: usize },

    #[error("Corrupt slot: length {length}")]
    Corrupt { length: u16 },
}

/// Errors reported by a network stack collaborator.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Interface name already registered: {0}")]
    NameInUse(EndpointName),

    #[error("Registration rejected: {reason}")]
    Rejected { reason: String },
}

/// Result type alias using HptError.
pub type HptResult<T> = Result<T, HptError>;
