//! Access-token sources.
//!
//! The conversation socket authenticates with the backend access token the
//! platform obtains after the Firebase sign-in exchange. This client only
//! reads that token; it never refreshes it. Stores are consulted on every
//! connect attempt so a token rotated by another process is picked up on the
//! next reconnect.
//!
//! The file-backed store keeps its JSON in the platform config directory:
//!   - Linux: `~/.config/casalink/`
//!   - macOS: `~/Library/Application Support/casalink/`
//!   - Windows: `%APPDATA%\casalink\`

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const SESSION_FILE: &str = "session.json";
pub const TOKEN_ENV_VAR: &str = "CASALINK_TOKEN";

/// Read-only supplier of the current access token.
pub trait TokenStore: Send + Sync + 'static {
    /// The current token, or `None` when signed out.
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenStore for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// Blank tokens count as missing.
pub(crate) fn usable(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenStore for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Token read from an environment variable on each call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl TokenStore for EnvToken {
    fn access_token(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Token persisted as a JSON session file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The session file in the platform config directory, if one exists for
    /// this user.
    pub fn default_location() -> Option<Self> {
        let dir = dirs::config_dir()?.join("casalink");
        Some(Self::new(dir.join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<StoredSession> {
        let json = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                None
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json)
    }

    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.load().map(|s| s.access_token)
    }
}
