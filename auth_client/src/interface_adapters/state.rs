use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::entities::UserIdentity;
use crate::domain::ports::{Clock, CodeExchange, SessionStore};
use crate::interface_adapters::host::LoopbackHost;

// Fixed key the signed-in identity lives under.
pub const SESSION_KEY: &str = "auth_user";

// Application state for the loopback listener routes.
#[derive(Clone)]
pub struct AppState {
    pub host: LoopbackHost,
    pub exchange: Arc<dyn CodeExchange>,
}

// In-memory session store adapter.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    pub entries: Arc<Mutex<HashMap<String, UserIdentity>>>,
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> Result<Option<UserIdentity>, String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(SESSION_KEY).cloned())
    }

    fn save(&self, identity: &UserIdentity) -> Result<(), String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(SESSION_KEY.to_string(), identity.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(SESSION_KEY);
        Ok(())
    }
}

// Durable JSON-file session store. The file holds one object keyed like local
// storage; other keys in it are preserved.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    pub path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_entries(&self) -> Result<Map<String, Value>, String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(format!("read {}: {err}", self.path.display())),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&contents).map_err(|err| format!("parse {}: {err}", self.path.display()))
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), String> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| format!("create {}: {err}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(entries)
            .map_err(|err| format!("serialize session: {err}"))?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Identity data is private to the user.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .map_err(|err| format!("open {}: {err}", self.path.display()))?;
        file.write_all(contents.as_bytes())
            .map_err(|err| format!("write {}: {err}", self.path.display()))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<UserIdentity>, String> {
        let mut entries = self.read_entries()?;
        match entries.remove(SESSION_KEY) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| format!("decode stored identity: {err}")),
            None => Ok(None),
        }
    }

    fn save(&self, identity: &UserIdentity) -> Result<(), String> {
        let mut entries = self.read_entries()?;
        let value = serde_json::to_value(identity)
            .map_err(|err| format!("serialize identity: {err}"))?;
        entries.insert(SESSION_KEY.to_string(), value);
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<(), String> {
        let mut entries = self.read_entries()?;
        if entries.remove(SESSION_KEY).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

// System clock adapter.
#[derive(Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|elapsed| u64::try_from(elapsed.as_millis()).ok())
            .unwrap_or_default()
    }
}
