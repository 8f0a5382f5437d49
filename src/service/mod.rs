//! WebSocket session against the Xcast service.
//!
//! Connects to `ws://<host>:<port>/Service/<callsign>` with the `jsonrpc`
//! subprotocol, registers for the five lifecycle events and then runs a single
//! loop that owns the [`Device`]: inbound frames, expired timers and console
//! lines are handled one at a time, so no application is ever mutated
//! concurrently. On shutdown the subscriptions are cancelled before the socket
//! is closed.

pub mod console;

use anyhow::{Context, Result};
use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::device::application::Ticket;
use crate::device::registry::AppKey;
use crate::device::state::Operation;
use crate::device::protocol::RpcRequest;
use crate::device::{Device, DeviceConfig, Output, TimerRequest};
use console::ConsoleCommand;

/// WebSocket subprotocol requested from the service
pub const SUBPROTOCOL: &str = "jsonrpc";

/// Connection settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Device host name or address
    pub host: String,
    /// Service port
    pub port: u16,
    /// Service callsign in the URL path
    pub callsign: String,
    /// Device behaviour
    pub device: DeviceConfig,
}

impl ServiceConfig {
    /// Settings for `host` with the stock port and callsign
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 9998,
            callsign: "org.rdk.Xcast".to_string(),
            device: DeviceConfig::default(),
        }
    }

    /// WebSocket URL of the service
    pub fn url(&self) -> String {
        format!("ws://{}:{}/Service/{}", self.host, self.port, self.callsign)
    }
}

#[derive(Debug)]
struct TimerFired {
    key: AppKey,
    ticket: Ticket,
}

/// Connect, serve until `shutdown` resolves or the peer hangs up, and return
/// the device so callers can inspect the final registry.
pub async fn run<F>(
    config: ServiceConfig,
    console: Option<mpsc::Receiver<String>>,
    shutdown: F,
) -> Result<Device>
where
    F: Future<Output = ()>,
{
    config.device.validate()?;

    let url = config.url();
    let mut request = url
        .as_str()
        .into_client_request()
        .with_context(|| format!("invalid service url {url}"))?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

    info!(%url, "connecting");
    let (stream, _response) = connect_async(request)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    info!("connected");
    let (mut sink, mut source) = stream.split();

    let mut session = Session::new(config.device);
    session.subscribe(&mut sink, "register").await?;

    let mut console = console;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested; unregistering");
                session.subscribe(&mut sink, "unregister").await?;
                if let Err(err) = sink.close().await {
                    debug!(error = %err, "close failed");
                }
                break;
            }
            maybe_message = source.next() => {
                let Some(message_result) = maybe_message else {
                    info!("connection closed by service");
                    break;
                };
                let message = message_result.context("failed reading websocket message")?;
                match message {
                    WsMessage::Text(text) => session.on_frame(&mut sink, text.as_str()).await?,
                    WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => session.on_frame(&mut sink, text).await?,
                        Err(err) => warn!(error = %err, "dropping non utf-8 frame"),
                    },
                    WsMessage::Close(frame) => {
                        info!(?frame, "service closed the connection");
                        break;
                    }
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                }
            }
            Some(fired) = session.timers_rx.recv() => {
                let outputs = session.device.fire(&fired.key, fired.ticket);
                session.deliver(&mut sink, outputs).await?;
            }
            line = next_console_line(&mut console) => match line {
                Some(line) => session.on_console(&mut sink, &line).await?,
                None => {
                    debug!("console closed");
                    console = None;
                }
            },
        }
    }

    Ok(session.device)
}

async fn next_console_line(console: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match console {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct Session {
    device: Device,
    timers_tx: mpsc::UnboundedSender<TimerFired>,
    timers_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl Session {
    fn new(config: DeviceConfig) -> Self {
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        Self {
            device: Device::new(config),
            timers_tx,
            timers_rx,
        }
    }

    async fn subscribe<S>(&self, sink: &mut S, verb: &str) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let config = self.device.config();
        for operation in Operation::ALL {
            let request =
                RpcRequest::subscription(&config.namespace, verb, operation, &config.subscriber_id);
            send_json(sink, &request)
                .await
                .with_context(|| format!("failed to {verb} {operation}"))?;
            info!("{verb} {operation}");
        }
        Ok(())
    }

    async fn on_frame<S>(&mut self, sink: &mut S, text: &str) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        debug!(frame = text, "recv");
        match self.device.handle_frame(text) {
            Ok(outputs) => self.deliver(sink, outputs).await,
            Err(err) => {
                warn!(error = %err, frame = text, "dropping inbound message");
                Ok(())
            }
        }
    }

    async fn on_console<S>(&mut self, sink: &mut S, line: &str) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        match ConsoleCommand::parse(line) {
            Ok(Some(ConsoleCommand::Force { name, state })) => {
                let outputs = self.device.force(&name, state);
                self.deliver(sink, outputs).await
            }
            Ok(Some(ConsoleCommand::Dump)) => {
                match console::render_dump(self.device.registry()) {
                    Ok(dump) => println!("{dump}"),
                    Err(err) => warn!(error = %err, "console: dump failed"),
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                warn!(line, error = %err, "console: ignoring line");
                Ok(())
            }
        }
    }

    async fn deliver<S>(&mut self, sink: &mut S, outputs: Vec<Output>) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        for output in outputs {
            match output {
                Output::Schedule(timer) => self.arm(timer),
                Output::Send(notification) => {
                    info!(
                        app = %notification.params.application_name,
                        state = %notification.params.state,
                        id = notification.id,
                        "notify"
                    );
                    send_json(sink, &notification)
                        .await
                        .context("failed to send state notification")?;
                }
            }
        }
        Ok(())
    }

    fn arm(&self, timer: TimerRequest) {
        let tx = self.timers_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timer.delay).await;
            let _ = tx.send(TimerFired {
                key: timer.key,
                ticket: timer.ticket,
            });
        });
    }
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
    T: Serialize,
{
    let text = serde_json::to_string(value)?;
    sink.send(WsMessage::Text(text.into())).await?;
    Ok(())
}
