//! JSON-RPC envelopes exchanged with the Xcast service
//!
//! Inbound: events the service forwards to our subscription, with methods of
//! the form `<subscriberId>.<event>`. Outbound: `register` / `unregister`
//! requests and `onApplicationStateChanged` notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::application::StateChange;
use super::error::{DispatchError, DispatchResult};
use super::state::{AppState, Operation};

/// JSON-RPC version tag on every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Method suffix of outbound state notifications
pub const STATE_CHANGED_EVENT: &str = "onApplicationStateChanged";

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// Lifecycle command extracted from an inbound event
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Requested operation
    pub operation: Operation,
    /// `params.applicationName`
    pub application_name: String,
    /// `params.applicationId`, empty when absent
    pub application_id: String,
    /// Raw params as received
    pub params: Value,
}

/// Parse an inbound text frame.
///
/// Returns `Ok(None)` for messages that are not commands for `subscriber_id`
/// (register acknowledgements, foreign events).
pub fn route(text: &str, subscriber_id: &str) -> DispatchResult<Option<Command>> {
    let envelope: InboundEnvelope = serde_json::from_str(text)?;

    let Some(method) = envelope.method else {
        return Ok(None);
    };
    let Some(name) = method
        .strip_prefix(subscriber_id)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return Ok(None);
    };

    let operation: Operation = name.parse()?;

    let application_name = envelope
        .params
        .get("applicationName")
        .and_then(Value::as_str)
        .ok_or(DispatchError::MissingField("applicationName"))?
        .to_string();

    let application_id = match envelope.params.get("applicationId") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        Some(_) => return Err(DispatchError::MissingField("applicationId")),
    };

    Ok(Some(Command {
        operation,
        application_name,
        application_id,
        params: envelope.params,
    }))
}

/// Outbound JSON-RPC request (`register` / `unregister`)
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    jsonrpc: &'static str,
    /// Request id; the service acknowledgements are not correlated
    pub id: u64,
    /// Fully qualified method
    pub method: String,
    /// Parameters
    pub params: Value,
}

impl RpcRequest {
    /// Subscribe `subscriber_id` to `operation`'s event
    pub fn register(namespace: &str, operation: Operation, subscriber_id: &str) -> Self {
        Self::subscription(namespace, "register", operation, subscriber_id)
    }

    /// Cancel the subscription made by [`RpcRequest::register`]
    pub fn unregister(namespace: &str, operation: Operation, subscriber_id: &str) -> Self {
        Self::subscription(namespace, "unregister", operation, subscriber_id)
    }

    /// `<namespace>.<verb>` request for `operation`'s event (`register` / `unregister`)
    pub fn subscription(
        namespace: &str,
        verb: &str,
        operation: Operation,
        subscriber_id: &str,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: 0,
            method: format!("{namespace}.{verb}"),
            params: serde_json::json!({
                "event": operation.event_name(),
                "id": subscriber_id,
            }),
        }
    }
}

/// `onApplicationStateChanged` notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    /// Per-application sequence id
    pub id: u64,
    /// `<namespace>.onApplicationStateChanged`
    pub method: String,
    /// Reported state
    pub params: StateChangedParams,
}

/// Parameters of a state notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedParams {
    /// Application name
    pub application_name: String,
    /// Current state
    pub state: AppState,
    /// Application id
    pub application_id: String,
}

impl Notification {
    /// Encode a state change under `namespace`
    pub fn state_changed(namespace: &str, change: StateChange) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: change.sequence,
            method: format!("{namespace}.{STATE_CHANGED_EVENT}"),
            params: StateChangedParams {
                application_name: change.application_name,
                state: change.state,
                application_id: change.application_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_command() {
        let text = r#"{"jsonrpc":"2.0","method":"bench.onApplicationStateRequest","params":{"applicationName":"YouTube","applicationId":""}}"#;
        let command = route(text, "bench").unwrap().unwrap();
        assert_eq!(command.operation, Operation::StateRequest);
        assert_eq!(command.application_name, "YouTube");
        assert_eq!(command.application_id, "");
        assert_eq!(command.params["applicationName"], "YouTube");
    }

    #[test]
    fn test_route_ignores_foreign_methods() {
        assert!(route(r#"{"jsonrpc":"2.0","id":0,"result":0}"#, "bench").unwrap().is_none());
        assert!(
            route(
                r#"{"jsonrpc":"2.0","method":"other.onApplicationLaunchRequest","params":{}}"#,
                "bench"
            )
            .unwrap()
            .is_none()
        );
        // Prefix must end at a dot.
        assert!(
            route(
                r#"{"jsonrpc":"2.0","method":"benchx.onApplicationLaunchRequest","params":{}}"#,
                "bench"
            )
            .unwrap()
            .is_none()
        );
    }

    #[test]
    fn test_route_errors() {
        assert!(matches!(route("not json", "bench"), Err(DispatchError::Malformed(_))));
        assert!(matches!(
            route(r#"{"method":"bench.onApplicationDanceRequest","params":{"applicationName":"a"}}"#, "bench"),
            Err(DispatchError::UnknownOperation(name)) if name == "onApplicationDanceRequest"
        ));
        assert!(matches!(
            route(r#"{"method":"bench.onApplicationLaunchRequest","params":{}}"#, "bench"),
            Err(DispatchError::MissingField("applicationName"))
        ));
    }

    #[test]
    fn test_register_request_shape() {
        let request = RpcRequest::register("org.rdk.Xcast.1", Operation::Hide, "bench");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "org.rdk.Xcast.1.register",
                "params": {"event": "onApplicationHideRequest", "id": "bench"}
            })
        );
    }

    #[test]
    fn test_notification_shape() {
        let notification = Notification::state_changed(
            "org.rdk.Xcast.1",
            StateChange {
                sequence: 3,
                application_name: "Netflix".into(),
                state: AppState::Running,
                application_id: "0".into(),
            },
        );
        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "org.rdk.Xcast.1.onApplicationStateChanged",
                "params": {"applicationName": "Netflix", "state": "running", "applicationId": "0"}
            })
        );
    }
}
