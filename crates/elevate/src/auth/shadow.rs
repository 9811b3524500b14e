//! Password authentication against the local crypt hashes.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use nix::unistd::User;
use tracing::debug;
use zeroize::Zeroizing;

use super::{AuthOutcome, AuthRequest, Authenticator};

/// Default shadow database.
pub const SHADOW_PATH: &str = "/etc/shadow";

/// Where the password comes from.
pub trait PasswordSource: Send + Sync {
    /// Read one password after showing `prompt`.
    ///
    /// Fails with [`io::ErrorKind::NotConnected`] when there is no terminal.
    fn read_password(&self, prompt: &str) -> io::Result<Zeroizing<String>>;
}

/// Hidden-input prompt on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl PasswordSource for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> io::Result<Zeroizing<String>> {
        if !io::stderr().is_terminal() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not a terminal"));
        }
        dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map(Zeroizing::new)
            .map_err(io::Error::other)
    }
}

/// Checks a typed password against the account's crypt hash.
///
/// The hash comes from the passwd entry, or from the shadow database when
/// the passwd entry holds the `x` placeholder. Accounts with an empty or
/// locked hash never authenticate.
pub struct ShadowAuthenticator {
    shadow_path: PathBuf,
    source: Box<dyn PasswordSource>,
}

impl ShadowAuthenticator {
    /// Prompt on the terminal and read `/etc/shadow`.
    pub fn new() -> Self {
        Self::with_source(TerminalPrompt)
    }

    /// Use a different password source.
    pub fn with_source(source: impl PasswordSource + 'static) -> Self {
        Self {
            shadow_path: PathBuf::from(SHADOW_PATH),
            source: Box::new(source),
        }
    }

    /// Read hashes from a different shadow file.
    pub fn with_shadow_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.shadow_path = path.into();
        self
    }

    fn stored_hash(&self, name: &str) -> Option<Zeroizing<String>> {
        let passwd_field = User::from_name(name)
            .ok()
            .flatten()
            .and_then(|u| u.passwd.into_string().ok())
            .unwrap_or_else(|| "x".to_string());

        if passwd_field == "x" {
            self.shadow_hash(name)
        } else {
            Some(Zeroizing::new(passwd_field))
        }
    }

    fn shadow_hash(&self, name: &str) -> Option<Zeroizing<String>> {
        let text = Zeroizing::new(fs::read_to_string(&self.shadow_path).ok()?);
        text.lines().find_map(|line| {
            let mut fields = line.splitn(3, ':');
            (fields.next()? == name).then(|| Zeroizing::new(fields.next().unwrap_or("").to_string()))
        })
    }
}

impl Default for ShadowAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShadowAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowAuthenticator")
            .field("shadow_path", &self.shadow_path)
            .finish_non_exhaustive()
    }
}

/// Hashes that can never verify: empty, or locked with `!` or `*`.
fn is_unusable(hash: &str) -> bool {
    hash.is_empty() || hash.starts_with('!') || hash.starts_with('*')
}

impl Authenticator for ShadowAuthenticator {
    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        // Prompt even for accounts that cannot succeed, so the prompt itself
        // reveals nothing.
        let hash = self.stored_hash(request.caller());

        let password = match self.source.read_password(&request.prompt()) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => return AuthOutcome::NoTerminal,
            Err(e) => {
                debug!(error = %e, "password prompt failed");
                return AuthOutcome::Failure;
            }
        };

        match hash {
            Some(hash) if !is_unusable(&hash) && pwhash::unix::verify(password.as_str(), &hash) => {
                AuthOutcome::Success
            }
            _ => AuthOutcome::Failure,
        }
    }
}
