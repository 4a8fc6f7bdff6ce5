//! Credential input validation.

use crate::error::ClientError;
use crate::types::CredentialBundle;

pub const MISSING_FIELDS_MESSAGE: &str = "Please fill in all credential fields.";
pub const APP_PASSWORD_SPACES_MESSAGE: &str = "Enter the app password without spaces.";

/// Raw form input, as typed.
#[derive(Debug, Clone, Default)]
pub struct CredentialForm {
    pub email: String,
    pub password: String,
    pub app_password: String,
}

impl CredentialForm {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            app_password: app_password.into(),
        }
    }

    /// Turn the input into a fresh bundle (no continuation tokens).
    ///
    /// The email is trimmed; passwords are taken verbatim.
    pub fn validate(&self) -> Result<CredentialBundle, ClientError> {
        let email = self.email.trim();
        if email.is_empty() || self.password.is_empty() || self.app_password.is_empty() {
            return Err(ClientError::Validation(MISSING_FIELDS_MESSAGE.to_string()));
        }
        if self.app_password.chars().any(char::is_whitespace) {
            return Err(ClientError::Validation(
                APP_PASSWORD_SPACES_MESSAGE.to_string(),
            ));
        }
        Ok(CredentialBundle::new(
            email,
            self.password.clone(),
            self.app_password.clone(),
        ))
    }
}
