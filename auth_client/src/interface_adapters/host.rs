use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use url::Url;

use crate::domain::entities::InboundMessage;
use crate::domain::ports::{HostEnvironment, ListenerId, PopupWindow};

// Command that opens the sign-in window. The URL is appended as the last
// argument. Unless `detached`, the process must stay alive for as long as the
// window is open; detached launchers (xdg-open, open) exit right away, so the
// window is never observed closed and only a message or the timeout ends it.
#[derive(Clone, Debug, PartialEq)]
pub struct BrowserCommand {
    pub program: String,
    pub args: Vec<String>,
    pub detached: bool,
}

impl BrowserCommand {
    // Split a command line on whitespace; empty input yields None.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            detached: false,
        })
    }
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<InboundMessage>>,
}

// Native host: windows are browser processes, messages arrive over the
// loopback HTTP listener and are fanned out to registered listeners.
#[derive(Clone)]
pub struct LoopbackHost {
    origin: String,
    browser: BrowserCommand,
    listeners: Arc<Mutex<ListenerTable>>,
}

impl LoopbackHost {
    pub fn new(origin: impl Into<String>, browser: BrowserCommand) -> Self {
        Self {
            origin: origin.into(),
            browser,
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
        }
    }

    // Hand a message to every registered listener; returns how many received it.
    pub fn deliver(&self, message: InboundMessage) -> usize {
        let mut table = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop listeners whose receiving side is gone.
        table
            .senders
            .retain(|_, sender| sender.send(message.clone()).is_ok());
        table.senders.len()
    }

    pub fn listener_count(&self) -> usize {
        let table = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        table.senders.len()
    }
}

#[async_trait]
impl HostEnvironment for LoopbackHost {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    async fn open_popup(&self, url: &Url) -> Result<Box<dyn PopupWindow>, String> {
        let child = Command::new(&self.browser.program)
            .args(&self.browser.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| format!("failed to launch {}: {err}", self.browser.program))?;

        tracing::debug!(program = %self.browser.program, pid = ?child.id(), "sign-in window launched");
        Ok(Box::new(BrowserWindow {
            child: Mutex::new(child),
            detached: self.browser.detached,
            closed: AtomicBool::new(false),
        }))
    }

    fn add_message_listener(&self, sender: mpsc::UnboundedSender<InboundMessage>) -> ListenerId {
        let mut table = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = table.next_id;
        table.next_id += 1;
        table.senders.insert(id, sender);
        ListenerId(id)
    }

    fn remove_message_listener(&self, id: ListenerId) {
        let mut table = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        table.senders.remove(&id.0);
    }
}

// A browser process standing in for the sign-in window.
struct BrowserWindow {
    child: Mutex<Child>,
    detached: bool,
    closed: AtomicBool,
}

impl PopupWindow for BrowserWindow {
    fn is_closed(&self) -> bool {
        if self.detached {
            return self.closed.load(Ordering::SeqCst);
        }
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        // An unqueryable process is treated as gone.
        !matches!(child.try_wait(), Ok(None))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = child.start_kill() {
            tracing::debug!(error = %err, "sign-in window already gone");
        }
    }
}
