use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::domain::entities::{InboundMessage, UserIdentity};

// Port for the durable identity record used by the handshake.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<UserIdentity>, String>;
    fn save(&self, identity: &UserIdentity) -> Result<(), String>;
    fn clear(&self) -> Result<(), String>;
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

// Handle to a window opened by the host.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn close(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

// Port for the environment the handshake runs in: windows plus message delivery.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    // Origin the host identifies as; only messages from here are trusted.
    fn origin(&self) -> String;

    async fn open_popup(&self, url: &Url) -> Result<Box<dyn PopupWindow>, String>;

    // Dropping the sender on removal ends the listener's stream.
    fn add_message_listener(&self, sender: mpsc::UnboundedSender<InboundMessage>) -> ListenerId;
    fn remove_message_listener(&self, id: ListenerId);
}

// Port for redeeming an authorization code for the provider's user object.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<Value, String>;
}
