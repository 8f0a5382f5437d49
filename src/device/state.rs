//! Lifecycle value types: committed state, in-flight activity and operations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::DispatchError;

/// Committed lifecycle state of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// Not running (initial state)
    #[default]
    Stopped,
    /// Running in the foreground
    Running,
    /// Running but hidden
    Hidden,
}

impl AppState {
    /// Name reported in `onApplicationStateChanged`
    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Stopped => "stopped",
            AppState::Running => "running",
            AppState::Hidden => "hidden",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    /// Launch pending
    Starting,
    /// Hide pending
    Hiding,
    /// Stop pending
    Stopping,
}

impl Activity {
    /// State committed when this activity completes
    pub fn target(self) -> AppState {
        match self {
            Activity::Starting => AppState::Running,
            Activity::Hiding => AppState::Hidden,
            Activity::Stopping => AppState::Stopped,
        }
    }

    /// Lowercase name used in logs and dumps
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::Starting => "starting",
            Activity::Hiding => "hiding",
            Activity::Stopping => "stopping",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle command received from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `onApplicationLaunchRequest`
    Launch,
    /// `onApplicationHideRequest`
    Hide,
    /// `onApplicationResumeRequest`
    Resume,
    /// `onApplicationStopRequest`
    Stop,
    /// `onApplicationStateRequest`
    StateRequest,
}

impl Operation {
    /// All operations, in the order events are registered
    pub const ALL: [Operation; 5] = [
        Operation::Launch,
        Operation::Hide,
        Operation::Resume,
        Operation::Stop,
        Operation::StateRequest,
    ];

    /// Event / method name on the wire
    pub fn event_name(self) -> &'static str {
        match self {
            Operation::Launch => "onApplicationLaunchRequest",
            Operation::Hide => "onApplicationHideRequest",
            Operation::Resume => "onApplicationResumeRequest",
            Operation::Stop => "onApplicationStopRequest",
            Operation::StateRequest => "onApplicationStateRequest",
        }
    }

    /// Activity started by this operation, for the timed transitions
    pub fn activity(self) -> Option<Activity> {
        match self {
            Operation::Launch => Some(Activity::Starting),
            Operation::Hide => Some(Activity::Hiding),
            Operation::Stop => Some(Activity::Stopping),
            Operation::Resume | Operation::StateRequest => None,
        }
    }

    /// Whether the transition may start from `state`
    pub fn is_legal_from(self, state: AppState) -> bool {
        match self {
            Operation::Launch => state == AppState::Stopped,
            Operation::Hide => state == AppState::Running,
            Operation::Stop => state != AppState::Stopped,
            Operation::Resume => false,
            Operation::StateRequest => true,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

impl FromStr for Operation {
    type Err = DispatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.event_name() == s)
            .ok_or_else(|| DispatchError::UnknownOperation(s.to_string()))
    }
}
