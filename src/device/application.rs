//! Per-application lifecycle state machine
//!
//! An [`Application`] owns the committed [`AppState`], the in-flight
//! [`Activity`] and a FIFO of pending timed actions. It performs no IO: every
//! call returns the [`Effect`]s the caller must carry out (arm a timer, send a
//! notification). Timers come back through [`Application::complete`] with the
//! ticket they were armed with; a completion whose ticket is no longer the
//! in-flight one is stale and is dropped without touching state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

use super::state::{Activity, AppState, Operation};
use super::{DeviceConfig, QueuePolicy};

/// Timer identifier, unique per application
pub type Ticket = u64;

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Arm a timer; call [`Application::complete`] with `ticket` once `delay` has elapsed
    Schedule {
        /// Ticket to hand back on expiry
        ticket: Ticket,
        /// Simulated latency
        delay: Duration,
    },
    /// Emit an `onApplicationStateChanged` notification
    Notify(StateChange),
}

/// Payload of one state-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// Per-application notification sequence, starting at 1
    pub sequence: u64,
    /// Application name
    pub application_name: String,
    /// State being reported
    pub state: AppState,
    /// Application instance id as first supplied by the controller
    pub application_id: String,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: Ticket,
    activity: Activity,
}

/// Lifecycle of one remote application
#[derive(Debug)]
pub struct Application {
    name: String,
    identifier: String,
    state: AppState,
    activity: Option<Activity>,
    notification_sequence: u64,
    queue: VecDeque<Operation>,
    in_flight: Option<InFlight>,
    pending_reports: BTreeSet<Ticket>,
    next_ticket: Ticket,
    updated_at: DateTime<Utc>,
}

impl Application {
    /// Create a stopped, idle application
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            state: AppState::Stopped,
            activity: None,
            notification_sequence: 0,
            queue: VecDeque::new(),
            in_flight: None,
            pending_reports: BTreeSet::new(),
            next_ticket: 0,
            updated_at: Utc::now(),
        }
    }

    /// Application name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application id echoed in notifications
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Committed state
    pub fn state(&self) -> AppState {
        self.state
    }

    /// Transition in flight, if any
    pub fn activity(&self) -> Option<Activity> {
        self.activity
    }

    /// Number of notifications emitted so far
    pub fn notification_sequence(&self) -> u64 {
        self.notification_sequence
    }

    /// Actions waiting behind the in-flight one
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Time of the last committed or forced state change
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// State the application will be in once the in-flight transition commits
    pub fn projected_state(&self) -> AppState {
        self.activity.map(Activity::target).unwrap_or(self.state)
    }

    /// Accept a lifecycle command from the controller
    pub fn submit(&mut self, operation: Operation, config: &DeviceConfig) -> Vec<Effect> {
        let mut effects = Vec::new();

        match operation {
            Operation::Resume => {
                info!(app = %self.name, state = %self.state, "resume requested; ignoring");
            }
            Operation::StateRequest => {
                if config.simulate_latency {
                    let ticket = self.issue_ticket();
                    self.pending_reports.insert(ticket);
                    effects.push(Effect::Schedule {
                        ticket,
                        delay: config.latency.state_report(),
                    });
                } else {
                    effects.push(self.notify());
                }
            }
            Operation::Launch | Operation::Hide | Operation::Stop => {
                if !config.simulate_latency {
                    self.apply_instant(operation, &mut effects);
                } else {
                    match config.queue_policy {
                        QueuePolicy::Serialized => {
                            self.queue.push_back(operation);
                            self.pump(config, &mut effects);
                        }
                        QueuePolicy::Supersede => {
                            self.supersede(operation, config, &mut effects);
                        }
                    }
                }
            }
        }

        effects
    }

    /// Handle expiry of the timer armed with `ticket`
    pub fn complete(&mut self, ticket: Ticket, config: &DeviceConfig) -> Vec<Effect> {
        let mut effects = Vec::new();

        if self.pending_reports.remove(&ticket) {
            effects.push(self.notify());
            return effects;
        }

        match self.in_flight {
            Some(flight) if flight.ticket == ticket && self.activity == Some(flight.activity) => {
                self.in_flight = None;
                self.commit(flight.activity.target());
                info!(app = %self.name, state = %self.state, "{} complete", flight.activity);
                effects.push(self.notify());
                self.activity = None;
                self.pump(config, &mut effects);
            }
            _ => {
                debug!(app = %self.name, ticket, "discarding stale completion");
            }
        }

        effects
    }

    /// Set the state directly, bypassing the transition table.
    ///
    /// Any in-flight transition becomes stale. Queued actions keep running
    /// afterwards against the forced state.
    pub fn force_state(&mut self, state: AppState, config: &DeviceConfig) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(flight) = self.in_flight.take() {
            debug!(app = %self.name, "forced state discards in-flight {}", flight.activity);
        }
        self.activity = None;
        self.commit(state);
        info!(app = %self.name, state = %self.state, "state forced");
        effects.push(self.notify());
        self.pump(config, &mut effects);

        effects
    }

    /// Serializable view for dumps
    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            name: self.name.clone(),
            identifier: self.identifier.clone(),
            state: self.state,
            activity: self.activity,
            notification_sequence: self.notification_sequence,
            queued: self.queue.len(),
            updated_at: self.updated_at,
        }
    }

    fn apply_instant(&mut self, operation: Operation, effects: &mut Vec<Effect>) {
        let Some(activity) = operation.activity() else {
            return;
        };
        if !operation.is_legal_from(self.state) {
            self.log_rejected(operation, self.state);
            return;
        }
        self.commit(activity.target());
        info!(app = %self.name, state = %self.state, "{operation} applied");
        effects.push(self.notify());
    }

    // Start queued actions until one is in flight or the queue is empty.
    fn pump(&mut self, config: &DeviceConfig, effects: &mut Vec<Effect>) {
        while self.in_flight.is_none() {
            let Some(operation) = self.queue.pop_front() else {
                break;
            };
            if operation.is_legal_from(self.state) {
                self.start(operation, config, effects);
            } else {
                self.log_rejected(operation, self.state);
            }
        }
    }

    // Stop is checked against the projected state so it can cut a launch
    // short. Launch and Hide must be legal from the committed state, since
    // their completion commits straight over it.
    fn supersede(&mut self, operation: Operation, config: &DeviceConfig, effects: &mut Vec<Effect>) {
        if operation.activity().is_some() && operation.activity() == self.activity {
            self.log_rejected(operation, self.projected_state());
            return;
        }
        let basis = match operation {
            Operation::Stop => self.projected_state(),
            _ => self.state,
        };
        if !operation.is_legal_from(basis) {
            self.log_rejected(operation, basis);
            return;
        }
        if let Some(flight) = self.in_flight {
            debug!(app = %self.name, "{operation} supersedes {}", flight.activity);
        }
        self.start(operation, config, effects);
    }

    fn start(&mut self, operation: Operation, config: &DeviceConfig, effects: &mut Vec<Effect>) {
        let Some(activity) = operation.activity() else {
            return;
        };
        let ticket = self.issue_ticket();
        self.activity = Some(activity);
        self.in_flight = Some(InFlight { ticket, activity });
        info!(app = %self.name, "{activity}");
        effects.push(Effect::Schedule {
            ticket,
            delay: config.latency.delay_for(activity),
        });
    }

    fn commit(&mut self, state: AppState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    fn notify(&mut self) -> Effect {
        self.notification_sequence += 1;
        Effect::Notify(StateChange {
            sequence: self.notification_sequence,
            application_name: self.name.clone(),
            state: self.state,
            application_id: self.identifier.clone(),
        })
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn log_rejected(&self, operation: Operation, state: AppState) {
        info!(
            app = %self.name,
            %state,
            activity = ?self.activity,
            "{operation} not allowed; ignoring"
        );
    }
}

/// Snapshot of an application for the operator console
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    /// Application name
    pub name: String,
    /// Application id
    pub identifier: String,
    /// Committed state
    pub state: AppState,
    /// In-flight transition
    pub activity: Option<Activity>,
    /// Notifications emitted so far
    pub notification_sequence: u64,
    /// Actions waiting in the queue
    pub queued: usize,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}
