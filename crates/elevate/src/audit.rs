//! Audit events for every privileged decision.
//!
//! Three things are always recorded:
//!
//! - a request no rule permitted ([`AuditEvent::CommandRejected`])
//! - a caller who failed to authenticate ([`AuditEvent::AuthenticationFailed`])
//! - a command about to run as another user ([`AuditEvent::CommandExecuted`])
//!
//! Sinks are best effort. A sink that cannot deliver logs the failure
//! through `tracing` and the invocation carries on: an unreachable log
//! daemon must not become a way to lock administrators out.
//!
//! # Example
//!
//! ```rust
//! use elevate::audit::{AuditEvent, AuditSink, MemorySink};
//!
//! let sink = MemorySink::new();
//! sink.record(&AuditEvent::CommandRejected {
//!     caller: "alice".into(),
//!     command_line: "reboot".into(),
//! });
//! assert_eq!(sink.events().len(), 1);
//! ```

use std::fmt;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

/// Why authentication did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// The backend rejected the credentials.
    Rejected,
    /// There was no terminal to prompt on.
    NoTerminal,
}

/// A privileged decision worth recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// No rule permitted the request.
    CommandRejected {
        /// Caller's account name.
        caller: String,
        /// The command and its arguments, space separated.
        command_line: String,
    },
    /// The caller did not authenticate.
    AuthenticationFailed {
        /// Caller's account name.
        caller: String,
        /// What went wrong.
        cause: AuthFailure,
    },
    /// The command is about to be executed.
    CommandExecuted {
        /// Caller's account name.
        caller: String,
        /// The command and its arguments, space separated.
        command_line: String,
        /// Target account name.
        target: String,
        /// Working directory at the time of the request.
        cwd: String,
    },
}

/// Syslog severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Something was refused.
    Notice,
    /// Normal operation.
    Info,
}

impl Severity {
    fn code(self) -> u8 {
        match self {
            Self::Notice => 5,
            Self::Info => 6,
        }
    }
}

impl AuditEvent {
    /// Severity this event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Self::CommandExecuted { .. } => Severity::Info,
            _ => Severity::Notice,
        }
    }

    /// Caller's account name.
    pub fn caller(&self) -> &str {
        match self {
            Self::CommandRejected { caller, .. }
            | Self::AuthenticationFailed { caller, .. }
            | Self::CommandExecuted { caller, .. } => caller,
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandRejected {
                caller,
                command_line,
            } => write!(f, "command not permitted for {caller}: {command_line}"),
            Self::AuthenticationFailed {
                caller,
                cause: AuthFailure::Rejected,
            } => write!(f, "failed auth for {caller}"),
            Self::AuthenticationFailed {
                caller,
                cause: AuthFailure::NoTerminal,
            } => write!(f, "tty required for {caller}"),
            Self::CommandExecuted {
                caller,
                command_line,
                target,
                cwd,
            } => write!(f, "{caller} ran command {command_line} as {target} from {cwd}"),
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Record an event. Delivery failures are logged, never returned.
    fn record(&self, event: &AuditEvent);
}

impl<S: AuditSink + ?Sized> AuditSink for Box<S> {
    fn record(&self, event: &AuditEvent) {
        (**self).record(event)
    }
}

/// Default path of the local syslog socket.
pub const SYSLOG_SOCKET: &str = "/dev/log";

/// `LOG_AUTHPRIV`, facility 10.
const AUTHPRIV: u8 = 10;

/// Writes RFC 3164 datagrams to the local syslog socket.
#[derive(Debug, Clone)]
pub struct SyslogSink {
    socket: PathBuf,
    ident: String,
}

impl SyslogSink {
    /// Log to `/dev/log` as `elevate`.
    pub fn new() -> Self {
        Self::with_socket(SYSLOG_SOCKET)
    }

    /// Log to a different socket.
    pub fn with_socket(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            ident: "elevate".to_string(),
        }
    }

    /// Render the datagram for an event.
    pub fn format(&self, event: &AuditEvent) -> String {
        let priority = AUTHPRIV * 8 + event.severity().code();
        let timestamp = chrono::Local::now().format("%b %e %H:%M:%S");
        format!(
            "<{priority}>{timestamp} {}[{}]: {event}",
            self.ident,
            std::process::id()
        )
    }

    fn send(&self, message: &str) -> std::io::Result<()> {
        let socket = UnixDatagram::unbound()?;
        socket.send_to(message.as_bytes(), &self.socket)?;
        Ok(())
    }
}

impl Default for SyslogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for SyslogSink {
    fn record(&self, event: &AuditEvent) {
        let message = self.format(event);
        if let Err(e) = self.send(&message) {
            warn!(socket = %self.socket.display(), error = %e, %event, "syslog unavailable");
        }
    }
}

/// Emits audit events as `tracing` events under the `elevate::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, event: &AuditEvent) {
        let json = serde_json::to_string(event).unwrap_or_default();
        match event.severity() {
            Severity::Info => info!(target: "elevate::audit", caller = event.caller(), event = %json, "{event}"),
            Severity::Notice => warn!(target: "elevate::audit", caller = event.caller(), event = %json, "{event}"),
        }
    }
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event.clone());
        }
    }
}
