//! View model derived from the run log.
//!
//! Nothing here holds state of its own: every value is computed from the
//! consumer's log, run state and active bundle.

use crate::run::RunState;
use crate::types::{CredentialBundle, StatusEvent, StatusTag};

/// Number of log entries the history view shows.
pub const HISTORY_LEN: usize = 10;

pub const SUCCESS_TOAST: &str = "Attendance marked successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Info,
    Success,
    Error,
}

impl Tone {
    pub fn of(tag: StatusTag) -> Self {
        match tag {
            StatusTag::Processing => Tone::Neutral,
            StatusTag::Info => Tone::Info,
            StatusTag::StepSuccess | StatusTag::AppSuccess | StatusTag::CookiesUpdate => {
                Tone::Success
            }
            StatusTag::StepError | StatusTag::AppError => Tone::Error,
        }
    }
}

/// Progress bar state for the latest event of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub percent: f64,
    pub complete: bool,
    pub tone: Tone,
    pub headline: String,
    pub latest: Option<StatusTag>,
}

impl ProgressView {
    pub fn from_log(log: &[StatusEvent]) -> Self {
        let Some(latest) = log.last() else {
            return Self {
                percent: 0.0,
                complete: false,
                tone: Tone::Error,
                headline: "Starting process...".to_string(),
                latest: None,
            };
        };

        let base = (log.len() as f64 / 8.0 * 100.0).clamp(10.0, 95.0);
        let tag = latest.tag();
        let (percent, complete, tone) = match tag {
            StatusTag::StepSuccess => (base + 5.0, false, Tone::Success),
            StatusTag::AppSuccess => (95.0, false, Tone::Success),
            StatusTag::AppError => (100.0, true, Tone::Error),
            StatusTag::CookiesUpdate => (100.0, true, Tone::Success),
            StatusTag::Info => (base, false, Tone::Info),
            StatusTag::StepError | StatusTag::Processing => (base, false, Tone::Error),
        };

        let headline = match latest.message() {
            Some(message) if !message.is_empty() => message.to_string(),
            _ if tag == StatusTag::CookiesUpdate => "Cookies updated successfully".to_string(),
            _ => "Processing...".to_string(),
        };

        Self {
            percent,
            complete,
            tone,
            headline,
            latest: Some(tag),
        }
    }

    /// Rounded percentage label.
    pub fn label(&self) -> String {
        if self.complete {
            "100%".to_string()
        } else {
            format!("{}%", self.percent.round() as u32)
        }
    }
}

/// Text of one history line.
pub fn history_text(event: &StatusEvent) -> String {
    match event.message() {
        Some(message) if !message.is_empty() => message.to_string(),
        _ if event.tag() == StatusTag::CookiesUpdate => "Cookies updated.".to_string(),
        _ => "Status event.".to_string(),
    }
}

/// The last [`HISTORY_LEN`] entries of the log.
pub fn recent(log: &[StatusEvent]) -> &[StatusEvent] {
    &log[log.len().saturating_sub(HISTORY_LEN)..]
}

/// Which screen a front-end shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No usable stored credentials: ask for them.
    Form,
    /// Stored credentials present, one action away from a run.
    Ready { account_email: String },
    Progress,
}

pub fn phase(state: RunState, bundle: Option<&CredentialBundle>) -> Phase {
    if state == RunState::Processing {
        return Phase::Progress;
    }
    match bundle {
        Some(bundle) if bundle.is_complete() => Phase::Ready {
            account_email: bundle.account_email.clone(),
        },
        _ => Phase::Form,
    }
}

/// Result banner of a settled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Error(String),
}

pub fn outcome(state: RunState, log: &[StatusEvent]) -> Option<Outcome> {
    match state {
        RunState::Succeeded => Some(Outcome::Success(SUCCESS_TOAST.to_string())),
        RunState::Failed => {
            let message = log
                .iter()
                .rev()
                .find(|event| event.tag() == StatusTag::AppError)
                .and_then(StatusEvent::message)
                .unwrap_or("An error occurred during processing.");
            Some(Outcome::Error(message.to_string()))
        }
        RunState::Idle | RunState::Processing => None,
    }
}
