// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint state machine with typed state transitions.
//!
//! Implements the endpoint lifecycle: Created → Active → Stopping → Destroyed.
//! Invalid transitions result in StateTransitionError.

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::types::EndpointName;

/// Endpoint lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Region allocated, interface not yet live.
    Created,

    /// Pump running, carrier up.
    Active,

    /// Teardown in progress; no new packets are accepted.
    Stopping,

    /// Region released and interface unregistered.
    Destroyed,
}

impl EndpointState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Active => "Active",
            Self::Stopping => "Stopping",
            Self::Destroyed => "Destroyed",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: EndpointState) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Active)
                | (Self::Created, Self::Stopping)
                | (Self::Active, Self::Stopping)
                | (Self::Stopping, Self::Destroyed)
        )
    }
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for an endpoint's lifecycle.
#[derive(Debug)]
pub struct EndpointStateMachine {
    endpoint: EndpointName,
    current_state: EndpointState,
}

impl EndpointStateMachine {
    /// Create a new state machine in `Created`.
    pub fn new(endpoint: EndpointName) -> Self {
        Self {
            endpoint,
            current_state: EndpointState::Created,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> EndpointState {
        self.current_state
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: EndpointState) -> Result<(), StateTransitionError> {
        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                endpoint: self.endpoint.clone(),
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            from = self.current_state.name(),
            to = target.name(),
            "State transition"
        );

        self.current_state = target;

        Ok(())
    }

    /// True while packets may flow.
    pub fn is_active(&self) -> bool {
        self.current_state == EndpointState::Active
    }
}
