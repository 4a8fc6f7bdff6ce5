//! Run state machine.
//!
//! One attempt at marking attendance moves `Idle -> Processing` when started
//! and ends in `Succeeded` or `Failed`. [`transition`] is the only place that
//! decides what an event does; it returns the next state and the ordered
//! side effects the consumer has to carry out.
//!
//! Credential purging depends on the wording of upstream `app_error`
//! messages ([`LOGIN_FAILURE_PHRASES`]). That coupling is brittle: a distinct
//! machine-readable failure kind in the event would remove the guesswork.

use crate::types::{SessionCookies, StatusEvent};

/// Lower-case fragments of upstream `app_error` messages that mean the stored
/// credentials are wrong. Matching is a case-insensitive substring test.
pub const LOGIN_FAILURE_PHRASES: &[&str] = &[
    "login failed",
    "invalid credentials",
    "invalid email or password",
    "incorrect password",
    "authentication failed",
    "check credentials",
];

pub fn is_login_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    LOGIN_FAILURE_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Processing,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// Side effect requested by a transition, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Persist the active bundle as it is (before any cookie rotation).
    PersistCurrent,
    /// Merge rotated cookies into the active bundle, then persist it.
    MergeAndPersist(SessionCookies),
    /// Delete stored credentials and reset the input form.
    ClearCredentials,
    CloseSubscription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: RunState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: RunState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

/// Apply one upstream event. `None` means the event is ignored and must not
/// be logged.
///
/// After `app_success` the subscription stays open so that the trailing
/// `cookies_update` of the same run can still land; in that window progress
/// events are still logged while a second terminal event is ignored.
pub fn transition(state: RunState, event: &StatusEvent) -> Option<Transition> {
    use RunState::*;

    match (state, event) {
        (Idle | Failed, _) => None,

        (
            Processing | Succeeded,
            StatusEvent::Processing { .. }
            | StatusEvent::Info { .. }
            | StatusEvent::StepSuccess { .. }
            | StatusEvent::StepError { .. },
        ) => Some(Transition::to(state, Vec::new())),

        (Processing, StatusEvent::AppError { message }) => {
            let mut effects = vec![Effect::CloseSubscription];
            if message.as_deref().map(is_login_failure).unwrap_or(false) {
                effects.push(Effect::ClearCredentials);
            }
            Some(Transition::to(Failed, effects))
        }

        (Processing, StatusEvent::AppSuccess { .. }) => {
            Some(Transition::to(Succeeded, vec![Effect::PersistCurrent]))
        }

        (Processing | Succeeded, StatusEvent::CookiesUpdate { cookies, .. }) => Some(Transition::to(
            Succeeded,
            vec![
                Effect::MergeAndPersist(cookies.clone()),
                Effect::CloseSubscription,
            ],
        )),

        (Succeeded, StatusEvent::AppSuccess { .. } | StatusEvent::AppError { .. }) => None,
    }
}

/// A run ending for a reason other than an upstream status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    /// A frame whose payload is not a StatusEvent; carries the raw payload.
    Malformed(String),
    /// The subscription itself failed or ended.
    ConnectionLost,
}

pub const CONNECTION_LOST_MESSAGE: &str =
    "Connection to server streaming service lost. Please try again.";

impl Interruption {
    /// Synthetic `app_error` recorded when the interruption fails the run.
    pub fn as_event(&self) -> StatusEvent {
        match self {
            Interruption::Malformed(raw) => {
                let shown = if raw.trim().is_empty() {
                    "Malformed data received."
                } else {
                    raw.as_str()
                };
                StatusEvent::app_error(format!("Error processing message: {}", shown))
            }
            Interruption::ConnectionLost => StatusEvent::app_error(CONNECTION_LOST_MESSAGE),
        }
    }
}

/// Apply an interruption. Never clears credentials.
///
/// While processing, the run fails. Once the run has already succeeded the
/// subscription is only closed: the upstream hanging up (or sending noise)
/// after `app_success` does not undo a marked attendance.
pub fn interrupt(state: RunState, _cause: &Interruption) -> Option<Transition> {
    match state {
        RunState::Processing => Some(Transition::to(
            RunState::Failed,
            vec![Effect::CloseSubscription],
        )),
        RunState::Succeeded => Some(Transition::to(
            RunState::Succeeded,
            vec![Effect::CloseSubscription],
        )),
        RunState::Idle | RunState::Failed => None,
    }
}
