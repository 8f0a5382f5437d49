//! Lifecycle tests driven through the device router
//!
//! Timers are not armed on a real clock: the harness collects every requested
//! timer and fires them either in deadline order or in an arbitrary order
//! chosen by the test.

use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;
use xcast_double::device::protocol::Notification;
use xcast_double::device::registry::IdentityKey;
use xcast_double::device::state::{AppState, Operation};
use xcast_double::device::{
    Device, DeviceConfig, DeviceError, DispatchError, Output, QueuePolicy, TimerRequest,
};

struct Harness {
    device: Device,
    now: Duration,
    armed: u64,
    pending: Vec<(Duration, u64, TimerRequest)>,
    sent: Vec<Notification>,
}

impl Harness {
    fn new(config: DeviceConfig) -> Self {
        Self {
            device: Device::new(config),
            now: Duration::ZERO,
            armed: 0,
            pending: Vec::new(),
            sent: Vec::new(),
        }
    }

    fn send(&mut self, operation: Operation, name: &str) {
        self.send_with_id(operation, name, "");
    }

    fn send_with_id(&mut self, operation: Operation, name: &str, id: &str) {
        let frame = frame(&self.device.config().subscriber_id, operation, name, id);
        let outputs = self.device.handle_frame(&frame).expect("valid frame");
        self.absorb(outputs);
    }

    fn absorb_force(&mut self, name: &str, state: AppState) {
        let outputs = self.device.force(name, state);
        self.absorb(outputs);
    }

    fn absorb(&mut self, outputs: Vec<Output>) {
        for output in outputs {
            match output {
                Output::Schedule(timer) => {
                    self.armed += 1;
                    self.pending.push((self.now + timer.delay, self.armed, timer));
                }
                Output::Send(notification) => self.sent.push(notification),
            }
        }
    }

    /// Fire the earliest timer; false when nothing is pending
    fn step(&mut self) -> bool {
        let Some(index) = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, (deadline, armed, _))| (*deadline, *armed))
            .map(|(index, _)| index)
        else {
            return false;
        };
        self.fire_at(index);
        true
    }

    fn run_until_idle(&mut self) {
        while self.step() {}
    }

    /// Fire any pending timer, ignoring deadlines
    fn fire_any(&mut self, pick: usize) {
        if self.pending.is_empty() {
            return;
        }
        let index = pick % self.pending.len();
        self.fire_at(index);
    }

    fn fire_at(&mut self, index: usize) {
        let (deadline, _, timer) = self.pending.remove(index);
        self.now = self.now.max(deadline);
        let outputs = self.device.fire(&timer.key, timer.ticket);
        self.absorb(outputs);
    }

    fn state(&self, name: &str) -> Option<AppState> {
        self.device
            .registry()
            .find_by_name(name)
            .map(|app| app.state())
    }

    fn states_sent(&self, name: &str) -> Vec<AppState> {
        self.sent
            .iter()
            .filter(|n| n.params.application_name == name)
            .map(|n| n.params.state)
            .collect()
    }

    fn ids_sent(&self, name: &str) -> Vec<u64> {
        self.sent
            .iter()
            .filter(|n| n.params.application_name == name)
            .map(|n| n.id)
            .collect()
    }
}

fn frame(subscriber: &str, operation: Operation, name: &str, id: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": format!("{subscriber}.{}", operation.event_name()),
        "params": {"applicationName": name, "applicationId": id}
    })
    .to_string()
}

#[test]
fn test_launch_hide_then_launch_while_hidden() {
    let mut h = Harness::new(DeviceConfig::default());

    h.send(Operation::Launch, "TestApp");
    assert!(h.sent.is_empty(), "launch completes only after its delay");
    h.run_until_idle();
    assert_eq!(h.now, Duration::from_millis(5000));
    assert_eq!(h.state("TestApp"), Some(AppState::Running));
    assert_eq!(h.states_sent("TestApp"), vec![AppState::Running]);

    h.send(Operation::Hide, "TestApp");
    h.run_until_idle();
    assert_eq!(h.now, Duration::from_millis(7000));
    assert_eq!(h.state("TestApp"), Some(AppState::Hidden));
    assert_eq!(
        h.states_sent("TestApp"),
        vec![AppState::Running, AppState::Hidden]
    );

    h.send(Operation::Launch, "TestApp");
    h.run_until_idle();
    assert_eq!(h.state("TestApp"), Some(AppState::Hidden));
    assert_eq!(h.sent.len(), 2, "launch while hidden is a no-op");
}

#[test]
fn test_stop_right_after_launch_serialized() {
    let mut h = Harness::new(DeviceConfig::default());

    h.send(Operation::Launch, "Fast");
    h.send(Operation::Stop, "Fast");
    h.run_until_idle();

    assert_eq!(h.state("Fast"), Some(AppState::Stopped));
    assert_eq!(
        h.states_sent("Fast"),
        vec![AppState::Running, AppState::Stopped]
    );
    assert_eq!(h.ids_sent("Fast"), vec![1, 2]);
    assert_eq!(h.now, Duration::from_millis(10_000));
}

#[test]
fn test_stop_right_after_launch_supersede() {
    let mut h = Harness::new(DeviceConfig {
        queue_policy: QueuePolicy::Supersede,
        ..DeviceConfig::default()
    });

    h.send(Operation::Launch, "Fast");
    h.send(Operation::Stop, "Fast");
    h.run_until_idle();

    assert_eq!(h.state("Fast"), Some(AppState::Stopped));
    assert_eq!(h.states_sent("Fast"), vec![AppState::Stopped]);
    assert_eq!(h.ids_sent("Fast"), vec![1]);
}

#[test]
fn test_hide_while_starting_supersede() {
    let mut h = Harness::new(DeviceConfig {
        queue_policy: QueuePolicy::Supersede,
        ..DeviceConfig::default()
    });

    h.send(Operation::Launch, "Early");
    h.send(Operation::Hide, "Early");
    h.run_until_idle();

    assert_eq!(h.state("Early"), Some(AppState::Running));
    assert_eq!(h.states_sent("Early"), vec![AppState::Running]);
    assert_eq!(h.now, Duration::from_millis(5000));
}

#[test]
fn test_launch_while_stopping_supersede() {
    let mut h = Harness::new(DeviceConfig {
        queue_policy: QueuePolicy::Supersede,
        ..DeviceConfig::default()
    });

    h.send(Operation::Launch, "Flip");
    h.send(Operation::Stop, "Flip");
    h.send(Operation::Launch, "Flip");
    h.run_until_idle();
    assert_eq!(h.state("Flip"), Some(AppState::Running));
    assert_eq!(h.states_sent("Flip"), vec![AppState::Running]);

    h.send(Operation::Stop, "Flip");
    h.send(Operation::Launch, "Flip");
    h.run_until_idle();
    assert_eq!(h.state("Flip"), Some(AppState::Stopped));
    assert_eq!(
        h.states_sent("Flip"),
        vec![AppState::Running, AppState::Stopped]
    );
    assert_eq!(h.ids_sent("Flip"), vec![1, 2]);
}

#[test]
fn test_state_request_for_unknown_application() {
    let mut h = Harness::new(DeviceConfig::default());

    h.send(Operation::StateRequest, "Unknown");
    assert!(h.device.registry().find_by_name("Unknown").is_some());
    h.run_until_idle();

    assert_eq!(h.now, Duration::from_millis(250));
    assert_eq!(h.states_sent("Unknown"), vec![AppState::Stopped]);
    assert_eq!(h.state("Unknown"), Some(AppState::Stopped));
}

#[test]
fn test_illegal_commands_emit_nothing() {
    let mut h = Harness::new(DeviceConfig::default());

    h.send(Operation::Hide, "Idle");
    h.send(Operation::Stop, "Idle");
    h.send(Operation::Resume, "Idle");
    h.run_until_idle();

    assert!(h.sent.is_empty());
    assert_eq!(h.state("Idle"), Some(AppState::Stopped));
}

#[test]
fn test_applications_do_not_interfere() {
    let mut h = Harness::new(DeviceConfig::default());

    h.send(Operation::Launch, "A");
    h.run_until_idle();
    h.send(Operation::StateRequest, "B");
    h.send(Operation::Stop, "A");
    h.run_until_idle();

    assert_eq!(h.state("A"), Some(AppState::Stopped));
    assert_eq!(h.state("B"), Some(AppState::Stopped));
    assert_eq!(h.ids_sent("A"), vec![1, 2]);
    assert_eq!(h.ids_sent("B"), vec![1]);
}

#[test]
fn test_notification_echoes_first_application_id() {
    let mut h = Harness::new(DeviceConfig::default());

    h.send_with_id(Operation::Launch, "YouTube", "");
    h.run_until_idle();
    h.send_with_id(Operation::Stop, "YouTube", "0");
    h.run_until_idle();

    assert_eq!(h.device.registry().len(), 1);
    assert!(h.sent.iter().all(|n| n.params.application_id.is_empty()));
}

#[test]
fn test_name_and_id_identity_splits_entries() {
    let mut h = Harness::new(DeviceConfig {
        identity: IdentityKey::NameAndId,
        ..DeviceConfig::default()
    });

    h.send_with_id(Operation::Launch, "YouTube", "");
    h.run_until_idle();
    // Stop arrives with id "0" and therefore targets a fresh, stopped entry.
    h.send_with_id(Operation::Stop, "YouTube", "0");
    h.run_until_idle();

    assert_eq!(h.device.registry().len(), 2);
    assert_eq!(h.states_sent("YouTube"), vec![AppState::Running]);
}

#[test]
fn test_instant_mode_answers_synchronously() {
    let mut h = Harness::new(DeviceConfig::instant());

    h.send(Operation::Launch, "Quick");
    h.send(Operation::Hide, "Quick");
    h.send(Operation::StateRequest, "Quick");

    assert!(h.pending.is_empty());
    assert_eq!(
        h.states_sent("Quick"),
        vec![AppState::Running, AppState::Hidden, AppState::Hidden]
    );
    assert_eq!(h.ids_sent("Quick"), vec![1, 2, 3]);
}

#[test]
fn test_force_overrides_transition_rules() {
    let mut h = Harness::new(DeviceConfig::default());

    h.absorb_force("Manual", AppState::Hidden);
    assert_eq!(h.state("Manual"), Some(AppState::Hidden));

    // Launch is illegal from the forced state.
    h.send(Operation::Launch, "Manual");
    h.run_until_idle();
    assert_eq!(h.states_sent("Manual"), vec![AppState::Hidden]);

    h.send(Operation::Stop, "Manual");
    h.run_until_idle();
    assert_eq!(h.state("Manual"), Some(AppState::Stopped));
}

#[test]
fn test_bad_frames_are_rejected_without_side_effects() {
    let mut device = Device::new(DeviceConfig::default());

    assert!(matches!(
        device.handle_frame("{oops"),
        Err(DeviceError::Dispatch(DispatchError::Malformed(_)))
    ));
    let unknown = r#"{"jsonrpc":"2.0","method":"xcast-double.onApplicationRebootRequest","params":{"applicationName":"X","applicationId":""}}"#;
    assert!(matches!(
        device.handle_frame(unknown),
        Err(DeviceError::Dispatch(DispatchError::UnknownOperation(_)))
    ));
    let ack = r#"{"jsonrpc":"2.0","id":0,"result":0}"#;
    assert!(device.handle_frame(ack).unwrap().is_empty());

    assert!(device.registry().is_empty());
}

#[derive(Debug, Clone)]
enum Step {
    Send(Operation),
    Fire(usize),
}

// Committed changes must follow the transition table. A stop that cut a
// launch short commits stopped over stopped.
fn follows_table(from: AppState, to: AppState) -> bool {
    matches!(
        (from, to),
        (AppState::Stopped, AppState::Running)
            | (AppState::Running, AppState::Hidden)
            | (AppState::Running | AppState::Hidden, AppState::Stopped)
    ) || from == to
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        prop::sample::select(Operation::ALL.to_vec()).prop_map(Step::Send),
        any::<usize>().prop_map(Step::Fire),
    ]
}

proptest! {
    #[test]
    fn serialized_commands_apply_in_receipt_order(
        steps in prop::collection::vec(step_strategy(), 0..40),
        drain in prop::collection::vec(any::<usize>(), 0..40),
    ) {
        let mut h = Harness::new(DeviceConfig::default());
        let mut expected = AppState::Stopped;
        let mut expected_notifications = 0u64;

        for step in steps {
            match step {
                Step::Send(operation) => {
                    h.send(operation, "Prop");
                    match operation.activity() {
                        Some(activity) if operation.is_legal_from(expected) => {
                            expected = activity.target();
                            expected_notifications += 1;
                        }
                        _ if operation == Operation::StateRequest => expected_notifications += 1,
                        _ => {}
                    }
                }
                Step::Fire(pick) => h.fire_any(pick),
            }
        }

        let mut picks = drain.into_iter();
        while !h.pending.is_empty() {
            h.fire_any(picks.next().unwrap_or(0));
        }

        prop_assert_eq!(h.state("Prop").unwrap_or(AppState::Stopped), expected);
        let ids = h.ids_sent("Prop");
        prop_assert_eq!(ids.len() as u64, expected_notifications);
        prop_assert!(ids.iter().copied().eq(1..=expected_notifications));
        if let Some(app) = h.device.registry().find_by_name("Prop") {
            prop_assert_eq!(app.activity(), None);
            prop_assert_eq!(app.queued(), 0);
        }
    }

    #[test]
    fn superseded_commands_follow_transition_table(
        steps in prop::collection::vec(step_strategy(), 0..40),
        drain in prop::collection::vec(any::<usize>(), 0..40),
    ) {
        let mut h = Harness::new(DeviceConfig {
            queue_policy: QueuePolicy::Supersede,
            ..DeviceConfig::default()
        });
        let mut committed = AppState::Stopped;
        let mut picks = drain.into_iter();

        for step in steps.into_iter().map(Some).chain(std::iter::repeat(None)) {
            match step {
                Some(Step::Send(operation)) => h.send(operation, "Prop"),
                Some(Step::Fire(pick)) => h.fire_any(pick),
                None if h.pending.is_empty() => break,
                None => h.fire_any(picks.next().unwrap_or(0)),
            }
            let now = h.state("Prop").unwrap_or(AppState::Stopped);
            prop_assert!(
                follows_table(committed, now),
                "illegal commit {:?} -> {:?}",
                committed,
                now
            );
            committed = now;
        }

        let ids = h.ids_sent("Prop");
        prop_assert!(ids.iter().copied().eq(1..=ids.len() as u64));
        prop_assert_eq!(h.states_sent("Prop").len(), ids.len());
        if let Some(app) = h.device.registry().find_by_name("Prop") {
            prop_assert_eq!(app.activity(), None);
            prop_assert_eq!(app.queued(), 0);
            prop_assert_eq!(app.projected_state(), committed);
        }
    }
}
