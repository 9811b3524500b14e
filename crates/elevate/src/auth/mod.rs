//! Authentication of the caller.
//!
//! An [`Authenticator`] answers one question: is the person at the keyboard
//! really the caller? It knows nothing about rules or targets beyond what
//! it needs for a prompt.
//!
//! Backends:
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | Shadow | [`shadow`] | prompts on the terminal, checks the crypt hash |
//! | PAM | `pam` | needs the `pam` feature and a PAM service file |
//! | Callback | [`CallbackAuthenticator`] | tests and embedding |

use std::sync::Arc;

pub mod shadow;

#[cfg(feature = "pam")]
pub mod pam;

pub use shadow::ShadowAuthenticator;

#[cfg(feature = "pam")]
pub use self::pam::PamAuthenticator;

/// What an authenticator is asked to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    caller: String,
    target: String,
    host: String,
}

impl AuthRequest {
    /// A request to authenticate `caller` before acting as `target`.
    pub fn new(caller: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            target: target.into(),
            host: crate::system::hostname(),
        }
    }

    /// Override the host name shown in prompts.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The account being authenticated.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// The account the command will run as.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Host name for prompts.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The password prompt shown to the caller.
    pub fn prompt(&self) -> String {
        format!("elevate ({}@{}) password", self.caller, self.host)
    }
}

/// Result of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The caller proved who they are.
    Success,
    /// Wrong credentials, unknown or locked account, or a backend error.
    /// Deliberately indistinguishable.
    Failure,
    /// No terminal to prompt on.
    NoTerminal,
}

/// An authentication backend.
pub trait Authenticator: Send + Sync {
    /// Authenticate the caller named in `request`.
    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome;
}

impl<A: Authenticator + ?Sized> Authenticator for Box<A> {
    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        (**self).authenticate(request)
    }
}

/// Authenticator driven by a closure.
#[derive(Clone)]
pub struct CallbackAuthenticator {
    callback: Arc<dyn Fn(&AuthRequest) -> AuthOutcome + Send + Sync>,
}

impl CallbackAuthenticator {
    /// Create an authenticator from a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&AuthRequest) -> AuthOutcome + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Return the same outcome for every request.
    pub fn always(outcome: AuthOutcome) -> Self {
        Self::new(move |_| outcome)
    }
}

impl std::fmt::Debug for CallbackAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackAuthenticator").finish_non_exhaustive()
    }
}

impl Authenticator for CallbackAuthenticator {
    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        (self.callback)(request)
    }
}
