use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::entities::{AttemptId, AuthAttempt, InboundMessage, UserIdentity};
use crate::domain::errors::AuthError;
use crate::domain::ports::{Clock, HostEnvironment, ListenerId, PopupWindow, SessionStore};
use crate::use_cases::authorize_url::{ProviderSettings, build_authorize_url};
use crate::use_cases::handshake_message::interpret;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

type Outcome = Result<UserIdentity, AuthError>;

#[derive(Clone, Debug)]
pub struct HandshakeSettings {
    pub provider: ProviderSettings,
    pub poll_interval: Duration,
    pub attempt_timeout: Duration,
}

impl HandshakeSettings {
    pub fn new(provider: ProviderSettings) -> Self {
        Self {
            provider,
            poll_interval: DEFAULT_POLL_INTERVAL,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

// Everything owned by the one pending attempt. Settling consumes it.
struct PendingAttempt {
    attempt: AuthAttempt,
    popup: Arc<dyn PopupWindow>,
    listener: ListenerId,
    settle: oneshot::Sender<Outcome>,
    race: Option<JoinHandle<()>>,
}

struct Shared<H, S> {
    host: H,
    store: S,
    pending: Mutex<Option<PendingAttempt>>,
}

// Sign-in coordinator with injected host, session store and clock.
pub struct HandshakeCoordinator<H, S, C> {
    shared: Arc<Shared<H, S>>,
    clock: C,
    settings: HandshakeSettings,
}

impl<H, S, C> HandshakeCoordinator<H, S, C>
where
    H: HostEnvironment + 'static,
    S: SessionStore + 'static,
    C: Clock,
{
    pub fn new(host: H, store: S, clock: C, settings: HandshakeSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                host,
                store,
                pending: Mutex::new(None),
            }),
            clock,
            settings,
        }
    }

    // Open the provider window and wait for the attempt to settle. A pending
    // attempt is cancelled first.
    pub async fn sign_in(&self) -> Result<UserIdentity, AuthError> {
        self.shared.cancel_pending();

        let started = Instant::now();
        let mut attempt = AuthAttempt::new(self.clock.now_epoch_millis());
        let url = build_authorize_url(&self.settings.provider, attempt.started_at);
        debug!(attempt_id = %attempt.id, %url, "opening sign-in window");

        let popup: Arc<dyn PopupWindow> = match self.shared.host.open_popup(&url).await {
            Ok(popup) => Arc::from(popup),
            Err(reason) => {
                warn!(attempt_id = %attempt.id, %reason, "failed to open sign-in window");
                return Err(AuthError::PopupBlocked(reason));
            }
        };

        let id = attempt.id;
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (settle_tx, settle_rx) = oneshot::channel();
        {
            let mut slot = self.shared.lock_pending();
            // Another sign-in may have started while the window was opening.
            if let Some(previous) = slot.take() {
                self.shared.settle(previous, Err(AuthError::Cancelled));
            }

            let listener = self.shared.host.add_message_listener(message_tx);
            attempt.begin();
            *slot = Some(PendingAttempt {
                attempt,
                popup: popup.clone(),
                listener,
                settle: settle_tx,
                race: None,
            });
        }

        let race = tokio::spawn(race_attempt(
            self.shared.clone(),
            id,
            popup,
            message_rx,
            RaceTimers {
                poll_interval: self.settings.poll_interval,
                deadline: started + self.settings.attempt_timeout,
            },
            self.shared.host.origin(),
        ));
        match self.shared.lock_pending().as_mut() {
            Some(pending) if pending.attempt.id == id => pending.race = Some(race),
            // Already settled; nothing left for the race to do.
            _ => race.abort(),
        }

        info!(attempt_id = %id, "sign-in pending");
        settle_rx.await.unwrap_or(Err(AuthError::Cancelled))
    }

    // Remove the stored identity. A pending attempt keeps running.
    pub fn sign_out(&self) -> Result<(), AuthError> {
        self.shared.store.clear().map_err(|err| {
            warn!(error = %err, "failed to clear stored identity");
            AuthError::StorageFailure
        })?;
        info!("signed out");
        Ok(())
    }

    pub fn current_identity(&self) -> Option<UserIdentity> {
        match self.shared.store.load() {
            Ok(identity) => identity,
            Err(err) => {
                warn!(error = %err, "failed to read stored identity");
                None
            }
        }
    }

    // Cancel the pending attempt, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        self.shared.cancel_pending()
    }

    pub fn pending_attempt(&self) -> Option<AuthAttempt> {
        self.shared
            .lock_pending()
            .as_ref()
            .map(|pending| pending.attempt.clone())
    }
}

impl<H, S> Shared<H, S>
where
    H: HostEnvironment,
    S: SessionStore,
{
    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingAttempt>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending(&self) -> bool {
        let previous = self.lock_pending().take();
        match previous {
            Some(pending) => {
                self.settle(pending, Err(AuthError::Cancelled));
                true
            }
            None => false,
        }
    }

    // Single gate for completions: only the attempt still in the slot may settle.
    fn finish(&self, id: AttemptId, outcome: Outcome) {
        let pending = {
            let mut slot = self.lock_pending();
            match slot.as_ref() {
                Some(pending) if pending.attempt.id == id => slot.take(),
                _ => None,
            }
        };

        match pending {
            Some(pending) => self.settle(pending, outcome),
            None => debug!(attempt_id = %id, "ignoring completion for settled attempt"),
        }
    }

    fn settle(&self, mut pending: PendingAttempt, outcome: Outcome) {
        // Disable every other completion source before anything else.
        self.host.remove_message_listener(pending.listener);
        if let Some(race) = pending.race.take() {
            race.abort();
        }
        if !pending.popup.is_closed() {
            pending.popup.close();
        }

        let outcome = outcome.and_then(|identity| {
            self.store.save(&identity).map_err(|err| {
                warn!(error = %err, "failed to persist identity");
                AuthError::StorageFailure
            })?;
            Ok(identity)
        });

        pending.attempt.settle(&outcome);
        match &outcome {
            Ok(identity) => info!(
                attempt_id = %pending.attempt.id,
                email = %identity.email,
                "sign-in succeeded"
            ),
            Err(err) => info!(
                attempt_id = %pending.attempt.id,
                status = ?pending.attempt.status,
                error = %err,
                "sign-in ended"
            ),
        }

        // The caller may have stopped waiting.
        let _ = pending.settle.send(outcome);
    }

    // Window closed without a message: a late message may still have stored the identity.
    fn closed_window_outcome(&self) -> Outcome {
        match self.store.load() {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => Err(AuthError::Cancelled),
            Err(err) => {
                warn!(error = %err, "failed to re-check stored identity");
                Err(AuthError::Cancelled)
            }
        }
    }
}

struct RaceTimers {
    poll_interval: Duration,
    deadline: Instant,
}

// First of message, closed window or deadline wins.
async fn race_attempt<H, S>(
    shared: Arc<Shared<H, S>>,
    id: AttemptId,
    popup: Arc<dyn PopupWindow>,
    mut messages: mpsc::UnboundedReceiver<InboundMessage>,
    timers: RaceTimers,
    origin: String,
) where
    H: HostEnvironment,
    S: SessionStore,
{
    let deadline = time::sleep_until(timers.deadline);
    tokio::pin!(deadline);
    let mut poll = time::interval_at(Instant::now() + timers.poll_interval, timers.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            biased;
            message = messages.recv() => match message {
                Some(message) => match interpret(&message, &origin) {
                    Some(outcome) => break outcome,
                    None => debug!(attempt_id = %id, origin = %message.origin, "ignoring message"),
                },
                // Listener removed: the attempt was settled elsewhere.
                None => return,
            },
            _ = poll.tick() => {
                if popup.is_closed() {
                    break shared.closed_window_outcome();
                }
            }
            _ = &mut deadline => break Err(AuthError::Timeout),
        }
    };

    shared.finish(id, outcome);
}
