//! Client-side owner of one attendance run.
//!
//! The consumer holds the active credential bundle, the per-run event log,
//! the run state and the subscription handle. Every event goes through
//! [`run::transition`](crate::run::transition); the consumer only carries out
//! the returned effects.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::run::{self, Effect, Interruption, RunState, Transition};
use crate::store::{CredentialStore, KeyValueStore};
use crate::subscription::{EventSubscription, Signal, Subscriber};
use crate::types::{CredentialBundle, StatusEvent};

/// Shown when the subscription cannot even be opened.
pub const INITIATE_FAILED_MESSAGE: &str =
    "Failed to initiate attendance marking. Please try again later.";

pub struct Consumer<S: KeyValueStore> {
    subscriber: Arc<dyn Subscriber>,
    store: CredentialStore<S>,
    bundle: Option<CredentialBundle>,
    state: RunState,
    log: Vec<StatusEvent>,
    subscription: Option<Box<dyn EventSubscription>>,
    run_id: Option<Uuid>,
}

impl<S: KeyValueStore> Consumer<S> {
    pub fn new(subscriber: Arc<dyn Subscriber>, store: CredentialStore<S>) -> Self {
        Self {
            subscriber,
            store,
            bundle: None,
            state: RunState::Idle,
            log: Vec::new(),
            subscription: None,
            run_id: None,
        }
    }

    /// Load the stored bundle (if any) as the active one.
    pub fn load_stored(&mut self) -> Result<Option<&CredentialBundle>, ClientError> {
        self.bundle = self.store.load()?;
        Ok(self.bundle.as_ref())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn log(&self) -> &[StatusEvent] {
        &self.log
    }

    pub fn bundle(&self) -> Option<&CredentialBundle> {
        self.bundle.as_ref()
    }

    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Begin a new run with `bundle`. Any subscription still held from an
    /// earlier run is closed before the new one is opened.
    pub fn start_run(&mut self, bundle: CredentialBundle) -> RunState {
        self.close_subscription();

        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.log.clear();
        self.state = RunState::Processing;
        info!(run = %run_id, user = %bundle.account_email, "starting attendance run");

        match self.subscriber.open(&bundle) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
            }
            Err(e) => {
                error!(run = %run_id, "Error initiating attendance marking: {}", e);
                self.log.push(StatusEvent::app_error(INITIATE_FAILED_MESSAGE));
                self.state = RunState::Failed;
            }
        }
        self.bundle = Some(bundle);
        self.state
    }

    /// Handle one raw `data` payload from the subscription.
    pub fn handle_message(&mut self, raw: &str) {
        if self.subscription.is_none() {
            debug!("ignoring message received after the subscription closed");
            return;
        }

        match serde_json::from_str::<StatusEvent>(raw) {
            Ok(event) => self.handle_event(event),
            Err(e) => {
                warn!("Error parsing event data: {} ({})", raw, e);
                self.handle_interruption(Interruption::Malformed(raw.to_string()));
            }
        }
    }

    /// Handle the subscription failing or ending.
    pub fn handle_transport_failure(&mut self, detail: &str) {
        if self.subscription.is_none() {
            return;
        }
        if self.state == RunState::Processing {
            error!("Relay connection error: {}", detail);
        } else {
            debug!("relay connection ended after the run settled: {}", detail);
        }
        self.handle_interruption(Interruption::ConnectionLost);
    }

    /// Wait for the next signal and apply it. Returns whether the
    /// subscription is still open afterwards.
    pub async fn pump(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };

        match subscription.next_signal().await {
            Some(Signal::Message(raw)) => self.handle_message(&raw),
            Some(Signal::Failed(detail)) => self.handle_transport_failure(&detail),
            None => self.handle_transport_failure("subscription closed"),
        }
        self.subscription.is_some()
    }

    /// Pump until the subscription is closed.
    pub async fn drive(&mut self) -> RunState {
        while self.pump().await {}
        self.state
    }

    pub fn close_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    /// Explicitly drop stored and active credentials.
    pub fn forget(&mut self) -> Result<bool, ClientError> {
        self.close_subscription();
        self.bundle = None;
        Ok(self.store.clear()?)
    }

    fn handle_event(&mut self, event: StatusEvent) {
        let Some(transition) = run::transition(self.state, &event) else {
            debug!(status = event.tag().as_str(), state = ?self.state, "ignoring event");
            return;
        };
        debug!(status = event.tag().as_str(), "status event");
        self.log.push(event);
        self.apply(transition);
    }

    fn handle_interruption(&mut self, cause: Interruption) {
        let Some(transition) = run::interrupt(self.state, &cause) else {
            return;
        };
        if transition.next == RunState::Failed {
            self.log.push(cause.as_event());
        }
        self.apply(transition);
    }

    fn apply(&mut self, transition: Transition) {
        let previous = self.state;
        self.state = transition.next;
        if previous != self.state {
            info!(run = ?self.run_id, from = ?previous, to = ?self.state, "run state changed");
        }

        for effect in transition.effects {
            match effect {
                Effect::PersistCurrent => self.persist(),
                Effect::MergeAndPersist(cookies) => {
                    if let Some(bundle) = self.bundle.as_mut() {
                        bundle.merge_cookies(&cookies);
                    }
                    self.persist();
                }
                Effect::ClearCredentials => {
                    warn!("Upstream rejected the stored credentials, clearing them");
                    self.bundle = None;
                    if let Err(e) = self.store.clear() {
                        error!("Failed to clear stored credentials: {}", e);
                    }
                }
                Effect::CloseSubscription => self.close_subscription(),
            }
        }
    }

    fn persist(&self) {
        let Some(bundle) = self.bundle.as_ref() else {
            return;
        };
        match self.store.save(bundle) {
            Ok(()) => debug!(user = %bundle.account_email, "credentials saved"),
            Err(e) => error!("Failed to save credentials: {}", e),
        }
    }
}
