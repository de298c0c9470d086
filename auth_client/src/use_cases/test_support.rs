use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use crate::domain::entities::{InboundMessage, UserIdentity};
use crate::domain::ports::{Clock, HostEnvironment, ListenerId, PopupWindow, SessionStore};

pub(crate) const TEST_ORIGIN: &str = "http://127.0.0.1:3900";

// Shared fixed time source for deterministic use-case tests.
pub(crate) struct FixedClock(pub(crate) u64);

impl Clock for FixedClock {
    fn now_epoch_millis(&self) -> u64 {
        self.0
    }
}

pub(crate) fn identity(name: &str, email: &str) -> UserIdentity {
    UserIdentity::from_payload(&json!({ "name": name, "email": email }))
        .expect("expected valid test identity")
}

pub(crate) fn success_message(name: &str, email: &str) -> Value {
    json!({ "type": "AUTH_SUCCESS", "user": { "name": name, "email": email } })
}

#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub load: bool,
    pub save: bool,
    pub clear: bool,
}

#[derive(Clone)]
pub(crate) struct RecordingStore {
    identity: Arc<Mutex<Option<UserIdentity>>>,
    saves: Arc<Mutex<usize>>,
    failures: FailureFlags,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self {
            identity: Arc::new(Mutex::new(None)),
            saves: Arc::new(Mutex::new(0)),
            failures: FailureFlags::default(),
        }
    }

    pub(crate) fn with_failures(mut self, failures: FailureFlags) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn seed(&self, identity: UserIdentity) {
        let mut guard = self.identity.lock().expect("identity mutex poisoned");
        *guard = Some(identity);
    }

    pub(crate) fn stored(&self) -> Option<UserIdentity> {
        self.identity.lock().expect("identity mutex poisoned").clone()
    }

    pub(crate) fn save_count(&self) -> usize {
        *self.saves.lock().expect("saves mutex poisoned")
    }
}

impl SessionStore for RecordingStore {
    fn load(&self) -> Result<Option<UserIdentity>, String> {
        if self.failures.load {
            return Err("load failed".to_string());
        }
        Ok(self.stored())
    }

    fn save(&self, identity: &UserIdentity) -> Result<(), String> {
        if self.failures.save {
            return Err("save failed".to_string());
        }
        *self.saves.lock().expect("saves mutex poisoned") += 1;
        let mut guard = self.identity.lock().expect("identity mutex poisoned");
        *guard = Some(identity.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), String> {
        if self.failures.clear {
            return Err("clear failed".to_string());
        }
        let mut guard = self.identity.lock().expect("identity mutex poisoned");
        *guard = None;
        Ok(())
    }
}

// Host calls in the order they happened; popups are numbered by open order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum HostEvent {
    Opened(usize),
    ListenerAdded(u64),
    ListenerRemoved(u64),
    Closed(usize),
}

#[derive(Default)]
struct FakeHostState {
    next_listener: u64,
    listeners: HashMap<u64, mpsc::UnboundedSender<InboundMessage>>,
    popups: Vec<Arc<AtomicBool>>,
    opened_urls: Vec<Url>,
    events: Vec<HostEvent>,
}

// Simulated browser: popups are flags, messages are pushed by the test.
#[derive(Clone)]
pub(crate) struct FakeHost {
    state: Arc<Mutex<FakeHostState>>,
    fail_open: bool,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeHostState::default())),
            fail_open: false,
        }
    }

    pub(crate) fn blocking_popups() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    // Deliver a message to every registered listener; returns how many got it.
    pub(crate) fn post_message(&self, origin: &str, data: Value) -> usize {
        let guard = self.state.lock().expect("host mutex poisoned");
        guard
            .listeners
            .values()
            .filter(|sender| {
                sender
                    .send(InboundMessage {
                        origin: origin.to_string(),
                        data: data.clone(),
                    })
                    .is_ok()
            })
            .count()
    }

    // The user closes the window by hand.
    pub(crate) fn user_closes_popup(&self, index: usize) {
        let guard = self.state.lock().expect("host mutex poisoned");
        guard.popups[index].store(true, Ordering::SeqCst);
    }

    pub(crate) fn popup_closed(&self, index: usize) -> bool {
        let guard = self.state.lock().expect("host mutex poisoned");
        guard.popups[index].load(Ordering::SeqCst)
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.state.lock().expect("host mutex poisoned").listeners.len()
    }

    pub(crate) fn opened_urls(&self) -> Vec<Url> {
        self.state.lock().expect("host mutex poisoned").opened_urls.clone()
    }

    pub(crate) fn events(&self) -> Vec<HostEvent> {
        self.state.lock().expect("host mutex poisoned").events.clone()
    }
}

struct FakePopup {
    index: usize,
    closed: Arc<AtomicBool>,
    state: Arc<Mutex<FakeHostState>>,
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.state.lock().expect("host mutex poisoned");
        guard.events.push(HostEvent::Closed(self.index));
    }
}

#[async_trait]
impl HostEnvironment for FakeHost {
    fn origin(&self) -> String {
        TEST_ORIGIN.to_string()
    }

    async fn open_popup(&self, url: &Url) -> Result<Box<dyn PopupWindow>, String> {
        if self.fail_open {
            return Err("popup blocked".to_string());
        }

        let mut guard = self.state.lock().expect("host mutex poisoned");
        let closed = Arc::new(AtomicBool::new(false));
        let index = guard.popups.len();
        guard.popups.push(closed.clone());
        guard.opened_urls.push(url.clone());
        guard.events.push(HostEvent::Opened(index));

        Ok(Box::new(FakePopup {
            index,
            closed,
            state: self.state.clone(),
        }))
    }

    fn add_message_listener(&self, sender: mpsc::UnboundedSender<InboundMessage>) -> ListenerId {
        let mut guard = self.state.lock().expect("host mutex poisoned");
        let id = guard.next_listener;
        guard.next_listener += 1;
        guard.listeners.insert(id, sender);
        guard.events.push(HostEvent::ListenerAdded(id));
        ListenerId(id)
    }

    fn remove_message_listener(&self, id: ListenerId) {
        let mut guard = self.state.lock().expect("host mutex poisoned");
        if guard.listeners.remove(&id.0).is_some() {
            guard.events.push(HostEvent::ListenerRemoved(id.0));
        }
    }
}
