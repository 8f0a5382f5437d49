//! Operator console
//!
//! Line commands read from stdin that force application state directly,
//! bypassing the transition table:
//!
//! ```text
//! launch <name>   force running
//! hide <name>     force hidden
//! stop <name>     force stopped
//! dump            print every application, one JSON object per line
//! ```

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::device::error::Result;
use crate::device::registry::Registry;
use crate::device::state::AppState;

/// Console lines that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    /// First word is not a console command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Force command given without an application name
    #[error("'{0}' requires an application name")]
    MissingName(String),
}

/// Parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Set `name` to `state`
    Force {
        /// Application name
        name: String,
        /// State to set
        state: AppState,
    },
    /// Print the registry
    Dump,
}

impl ConsoleCommand {
    /// Parse one line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, ConsoleError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let state = match verb {
            "dump" => return Ok(Some(ConsoleCommand::Dump)),
            "launch" => AppState::Running,
            "hide" => AppState::Hidden,
            "stop" => AppState::Stopped,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };

        match words.next() {
            Some(name) => Ok(Some(ConsoleCommand::Force {
                name: name.to_string(),
                state,
            })),
            None => Err(ConsoleError::MissingName(verb.to_string())),
        }
    }
}

/// Render the registry as one JSON summary per application
pub fn render_dump(registry: &Registry) -> Result<String> {
    if registry.is_empty() {
        return Ok("no applications".to_string());
    }

    let lines = registry
        .summaries()
        .iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Forward stdin lines to the session until EOF
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "console read failed");
                    break;
                }
            }
        }
    });
    rx
}
