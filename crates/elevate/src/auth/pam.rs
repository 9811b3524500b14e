//! Authentication through PAM.

use std::io;

use tracing::debug;

use super::shadow::{PasswordSource, TerminalPrompt};
use super::{AuthOutcome, AuthRequest, Authenticator};

/// PAM service name, i.e. `/etc/pam.d/elevate`.
pub const PAM_SERVICE: &str = "elevate";

/// Authenticates through the `elevate` PAM service.
///
/// The password is collected up front and handed to PAM's conversation;
/// modules that ask more than one question are not supported.
pub struct PamAuthenticator {
    service: String,
    source: Box<dyn PasswordSource>,
}

impl PamAuthenticator {
    /// Prompt on the terminal and use the `elevate` service.
    pub fn new() -> Self {
        Self {
            service: PAM_SERVICE.to_string(),
            source: Box::new(TerminalPrompt),
        }
    }

    /// Use a different PAM service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

impl Default for PamAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for PamAuthenticator {
    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let password = match self.source.read_password(&request.prompt()) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => return AuthOutcome::NoTerminal,
            Err(e) => {
                debug!(error = %e, "password prompt failed");
                return AuthOutcome::Failure;
            }
        };

        let mut pam = match pam::Authenticator::with_password(&self.service) {
            Ok(pam) => pam,
            Err(e) => {
                debug!(service = %self.service, error = ?e, "pam start failed");
                return AuthOutcome::Failure;
            }
        };
        pam.get_handler()
            .set_credentials(request.caller(), password.as_str());

        match pam.authenticate() {
            Ok(()) => AuthOutcome::Success,
            Err(e) => {
                debug!(error = ?e, "pam authentication failed");
                AuthOutcome::Failure
            }
        }
    }
}
