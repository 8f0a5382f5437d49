//! Device core and public API
//!
//! [`Device`] owns the application registry and turns inbound frames, timer
//! expiries and operator overrides into [`Output`]s for the session to carry
//! out. It never touches the network or the clock itself.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// Submodules
pub mod application;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod state;

use application::{Effect, Ticket};
use error::Result;
use protocol::{Command, Notification};
use registry::{AppKey, IdentityKey, Registry};
use state::AppState;

/// How timed transitions against one application are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueuePolicy {
    /// FIFO: each action starts after the previous one committed
    #[default]
    Serialized,
    /// Newest command wins; earlier timers fire but are discarded as stale
    Supersede,
}

/// Simulated completion latencies in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyProfile {
    /// Launch → running
    pub launch_ms: u64,
    /// Hide → hidden
    pub hide_ms: u64,
    /// Stop → stopped
    pub stop_ms: u64,
    /// Delay before answering a state request
    pub state_report_ms: u64,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            launch_ms: 5000,
            hide_ms: 2000,
            stop_ms: 5000,
            state_report_ms: 250,
        }
    }
}

impl LatencyProfile {
    /// Delay until `activity` completes
    pub fn delay_for(&self, activity: state::Activity) -> Duration {
        let ms = match activity {
            state::Activity::Starting => self.launch_ms,
            state::Activity::Hiding => self.hide_ms,
            state::Activity::Stopping => self.stop_ms,
        };
        Duration::from_millis(ms)
    }

    /// Delay before a state request is answered
    pub fn state_report(&self) -> Duration {
        Duration::from_millis(self.state_report_ms)
    }
}

/// Behaviour of the simulated device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Service namespace used for register calls and notifications
    pub namespace: String,

    /// Subscriber id; inbound events arrive as `<subscriber_id>.<event>`
    pub subscriber_id: String,

    /// Delay transitions and track activities (false: answer instantly)
    pub simulate_latency: bool,

    /// Ordering of timed transitions
    pub queue_policy: QueuePolicy,

    /// Registry key policy
    pub identity: IdentityKey,

    /// Simulated latencies
    pub latency: LatencyProfile,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            namespace: "org.rdk.Xcast.1".to_string(),
            subscriber_id: "xcast-double".to_string(),
            simulate_latency: true,
            queue_policy: QueuePolicy::Serialized,
            identity: IdentityKey::Name,
            latency: LatencyProfile::default(),
        }
    }
}

impl DeviceConfig {
    /// Configuration answering every command synchronously
    pub fn instant() -> Self {
        Self {
            simulate_latency: false,
            ..Self::default()
        }
    }

    /// Load a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the protocol cannot carry
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid {
                key: "namespace",
                detail: "must not be empty".into(),
            });
        }
        if self.subscriber_id.is_empty() || self.subscriber_id.contains('.') {
            return Err(ConfigError::Invalid {
                key: "subscriber_id",
                detail: format!("'{}' must be non-empty and contain no '.'", self.subscriber_id),
            });
        }
        Ok(())
    }
}

/// Timer the session must arm on behalf of an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRequest {
    /// Application the timer belongs to
    pub key: AppKey,
    /// Ticket to pass back to [`Device::fire`]
    pub ticket: Ticket,
    /// How long to wait
    pub delay: Duration,
}

/// Work for the session
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Arm a timer
    Schedule(TimerRequest),
    /// Send a notification to the controller
    Send(Notification),
}

/// The simulated device: registry plus request routing
#[derive(Debug)]
pub struct Device {
    config: DeviceConfig,
    registry: Registry,
}

impl Device {
    /// Create a device with an empty registry
    pub fn new(config: DeviceConfig) -> Self {
        let registry = Registry::new(config.identity);
        Self { config, registry }
    }

    /// Get the current configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Get the application registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Route one inbound text frame.
    ///
    /// Frames that are not addressed to our subscriber yield no output.
    pub fn handle_frame(&mut self, text: &str) -> Result<Vec<Output>> {
        match protocol::route(text, &self.config.subscriber_id)? {
            Some(command) => Ok(self.dispatch(command)),
            None => Ok(Vec::new()),
        }
    }

    /// Apply a parsed command to its application
    pub fn dispatch(&mut self, command: Command) -> Vec<Output> {
        tracing::debug!(
            operation = %command.operation,
            params = %command.params,
            "dispatching"
        );
        let (key, app) = self
            .registry
            .get_or_create(&command.application_name, &command.application_id);
        let effects = app.submit(command.operation, &self.config);
        self.outputs(key, effects)
    }

    /// Deliver an expired timer
    pub fn fire(&mut self, key: &AppKey, ticket: Ticket) -> Vec<Output> {
        let Some(app) = self.registry.get_mut(key) else {
            tracing::warn!(%key, ticket, "timer for unknown application");
            return Vec::new();
        };
        let effects = app.complete(ticket, &self.config);
        self.outputs(key.clone(), effects)
    }

    /// Operator override: set `name`'s state directly
    pub fn force(&mut self, name: &str, state: AppState) -> Vec<Output> {
        let (key, app) = self.registry.get_or_create(name, "");
        let effects = app.force_state(state, &self.config);
        self.outputs(key, effects)
    }

    fn outputs(&self, key: AppKey, effects: Vec<Effect>) -> Vec<Output> {
        effects
            .into_iter()
            .map(|effect| match effect {
                Effect::Schedule { ticket, delay } => Output::Schedule(TimerRequest {
                    key: key.clone(),
                    ticket,
                    delay,
                }),
                Effect::Notify(change) => {
                    Output::Send(Notification::state_changed(&self.config.namespace, change))
                }
            })
            .collect()
    }
}

// Re-export commonly used types
pub use application::{Application, StateChange};
pub use error::{ConfigError, DeviceError, DispatchError};
pub use state::{Activity, Operation};
