//! Version-bit soft-fork deployment state machine.
//!
//! Each [`Deployment`](ember_core::params::Deployment) walks through the
//! threshold states window by window. Transitions are evaluated only at
//! window boundaries, driven by the median-time-past of the boundary block
//! and the number of signaling blocks in the window that just closed. The
//! machine never regresses: `LockedIn`, `Active`, and `Failed` are sticky.

use ember_core::error::{EmberError, StoreError};
use ember_core::params::Deployment;

/// Threshold state of one deployment at one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdState {
    /// Before the deployment's start time.
    Defined,
    /// Signaling period is open.
    Started,
    /// Threshold met; activates at the next boundary.
    LockedIn,
    /// Rules are in force. Terminal.
    Active,
    /// Timed out without locking in. Terminal.
    Failed,
}

impl ThresholdState {
    /// Whether the deployment's rules are in force.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether this state can never change again.
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Active | Self::Failed)
    }

    /// Stable single-byte encoding for the deployment cache.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Defined => 0,
            Self::Started => 1,
            Self::LockedIn => 2,
            Self::Active => 3,
            Self::Failed => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, EmberError> {
        match byte {
            0 => Ok(Self::Defined),
            1 => Ok(Self::Started),
            2 => Ok(Self::LockedIn),
            3 => Ok(Self::Active),
            4 => Ok(Self::Failed),
            other => Err(StoreError::Corrupt(format!(
                "unknown threshold state byte {other}"
            ))
            .into()),
        }
    }
}

/// Advance one deployment by one window.
///
/// `boundary_mtp` is the median-time-past of the last block of the window
/// that just closed; `signal_count` is how many blocks of that window
/// signaled the deployment's bit. Timeout is checked before the
/// threshold, so a window that both times out and meets the threshold
/// fails.
pub fn advance(
    state: ThresholdState,
    deployment: &Deployment,
    boundary_mtp: u64,
    signal_count: u64,
) -> ThresholdState {
    match state {
        ThresholdState::Defined => {
            if boundary_mtp >= deployment.timeout {
                ThresholdState::Failed
            } else if boundary_mtp >= deployment.start_time {
                ThresholdState::Started
            } else {
                ThresholdState::Defined
            }
        }
        ThresholdState::Started => {
            if boundary_mtp >= deployment.timeout {
                ThresholdState::Failed
            } else if signal_count >= deployment.threshold {
                ThresholdState::LockedIn
            } else {
                ThresholdState::Started
            }
        }
        ThresholdState::LockedIn => ThresholdState::Active,
        ThresholdState::Active => ThresholdState::Active,
        ThresholdState::Failed => ThresholdState::Failed,
    }
}
