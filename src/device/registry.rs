//! Application registry
//!
//! Maps identity keys to [`Application`]s. Entries are created lazily on first
//! reference and live as long as the registry. The registry is owned by a
//! [`Device`](super::Device), so every session (and every test) gets its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::application::{Application, ApplicationSummary};

/// How an inbound request is mapped to an application entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityKey {
    /// Application name only. Controllers send `applicationId` inconsistently
    /// (empty on launch and state requests, `"0"` on stop and hide).
    #[default]
    Name,
    /// Name plus `applicationId`, with an empty id mapped to `DEFAULT`
    NameAndId,
}

/// Registry key of one application
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppKey(pub String);

impl AppKey {
    /// Build the key for `name` / `id` under `identity`
    pub fn new(identity: IdentityKey, name: &str, id: &str) -> Self {
        match identity {
            IdentityKey::Name => AppKey(name.to_string()),
            IdentityKey::NameAndId => {
                let id = if id.is_empty() { "DEFAULT" } else { id };
                AppKey(format!("{name}/{id}"))
            }
        }
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owned collection of applications
#[derive(Debug, Default)]
pub struct Registry {
    identity: IdentityKey,
    apps: BTreeMap<AppKey, Application>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(identity: IdentityKey) -> Self {
        Self {
            identity,
            apps: BTreeMap::new(),
        }
    }

    /// Look up the application for `name` / `id`, creating it if needed
    pub fn get_or_create(&mut self, name: &str, id: &str) -> (AppKey, &mut Application) {
        let key = AppKey::new(self.identity, name, id);
        let app = self.apps.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(app = name, id, "new application");
            Application::new(name, id)
        });
        (key, app)
    }

    /// Get mutable access to an application by key
    pub fn get_mut(&mut self, key: &AppKey) -> Option<&mut Application> {
        self.apps.get_mut(key)
    }

    /// Find the first application with `name`, whatever its key
    pub fn find_by_name(&self, name: &str) -> Option<&Application> {
        self.apps.values().find(|app| app.name() == name)
    }

    /// Number of applications seen
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether no application has been referenced yet
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Summaries of every application, in key order
    pub fn summaries(&self) -> Vec<ApplicationSummary> {
        self.apps.values().map(Application::summary).collect()
    }
}
