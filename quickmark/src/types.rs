//! Wire and persistence types shared by the relay and the client.

use serde::{Deserialize, Serialize};

/// Query/body key of the portal session cookie.
pub const SESSION_COOKIE_KEY: &str = "_quikchex_app_session";
/// Query/body key of the portal "remember me" token.
pub const REMEMBER_TOKEN_KEY: &str = "remember_user_token";

/// Identity plus session-continuation data for one user.
///
/// The three required fields travel together: a bundle missing any of them is
/// treated as absent (see [`CredentialBundle::is_complete`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    #[serde(default)]
    pub account_email: String,
    #[serde(default)]
    pub portal_password: String,
    #[serde(default)]
    pub mail_app_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
}

impl CredentialBundle {
    pub fn new(
        account_email: impl Into<String>,
        portal_password: impl Into<String>,
        mail_app_password: impl Into<String>,
    ) -> Self {
        Self {
            account_email: account_email.into(),
            portal_password: portal_password.into(),
            mail_app_password: mail_app_password.into(),
            session_cookie: None,
            remember_token: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.account_email.is_empty()
            && !self.portal_password.is_empty()
            && !self.mail_app_password.is_empty()
    }

    /// Fold rotated continuation tokens into the bundle. Only the tokens the
    /// upstream actually sent replace the stored ones.
    pub fn merge_cookies(&mut self, cookies: &SessionCookies) {
        if let Some(session) = non_empty(cookies.session.as_deref()) {
            self.session_cookie = Some(session.to_string());
        }
        if let Some(remember) = non_empty(cookies.remember_token.as_deref()) {
            self.remember_token = Some(remember.to_string());
        }
    }

    /// Query parameters for the relay endpoint, continuation tokens included
    /// only when present.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("user_email", self.account_email.as_str()),
            ("quickchex_pass", self.portal_password.as_str()),
            ("gmail_app_password", self.mail_app_password.as_str()),
        ];
        if let Some(session) = non_empty(self.session_cookie.as_deref()) {
            pairs.push((SESSION_COOKIE_KEY, session));
        }
        if let Some(remember) = non_empty(self.remember_token.as_deref()) {
            pairs.push((REMEMBER_TOKEN_KEY, remember));
        }
        pairs
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Continuation tokens carried by a `cookies_update` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookies {
    #[serde(rename = "_quikchex_app_session", default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(rename = "remember_user_token", default, skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
}

/// One unit of upstream progress, tagged by its `status` field.
///
/// Only `CookiesUpdate` carries cookies; the enum shape makes any other
/// combination unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Older upstreams emit this as a generic "still working" marker.
    Processing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    StepSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    StepError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    AppSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    AppError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    CookiesUpdate {
        cookies: SessionCookies,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StatusEvent {
    pub fn app_error(message: impl Into<String>) -> Self {
        StatusEvent::AppError {
            message: Some(message.into()),
        }
    }

    pub fn tag(&self) -> StatusTag {
        match self {
            StatusEvent::Processing { .. } => StatusTag::Processing,
            StatusEvent::Info { .. } => StatusTag::Info,
            StatusEvent::StepSuccess { .. } => StatusTag::StepSuccess,
            StatusEvent::StepError { .. } => StatusTag::StepError,
            StatusEvent::AppSuccess { .. } => StatusTag::AppSuccess,
            StatusEvent::AppError { .. } => StatusTag::AppError,
            StatusEvent::CookiesUpdate { .. } => StatusTag::CookiesUpdate,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            StatusEvent::Processing { message }
            | StatusEvent::Info { message }
            | StatusEvent::StepSuccess { message }
            | StatusEvent::StepError { message }
            | StatusEvent::AppSuccess { message }
            | StatusEvent::AppError { message }
            | StatusEvent::CookiesUpdate { message, .. } => message.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusTag {
    Processing,
    Info,
    StepSuccess,
    StepError,
    AppSuccess,
    AppError,
    CookiesUpdate,
}

impl StatusTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTag::Processing => "processing",
            StatusTag::Info => "info",
            StatusTag::StepSuccess => "step_success",
            StatusTag::StepError => "step_error",
            StatusTag::AppSuccess => "app_success",
            StatusTag::AppError => "app_error",
            StatusTag::CookiesUpdate => "cookies_update",
        }
    }
}

/// JSON body POSTed to the upstream automation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamRequest {
    pub user_email: String,
    pub quickchex_pass: String,
    pub gmail_app_password: String,
    #[serde(rename = "_quikchex_app_session", skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    #[serde(rename = "remember_user_token", skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
}
