//! Session state machine.

/// Runtime state of a session.
///
/// Transitions: `Connecting → LoggedIn ⇄ SentClientRequest`, with
/// `SentClientRequest → SentAttention → LoggedIn` on a cancelled
/// request. `Final` is terminal; a fatal error or an unacknowledged
/// cancel lands there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport established, login not complete.
    Connecting,
    /// Idle and ready for a request.
    LoggedIn,
    /// A request is on the wire; reading its response.
    SentClientRequest,
    /// An Attention signal is on the wire; draining until the ack.
    SentAttention,
    /// Torn down; no further requests are possible.
    Final,
}

impl SessionState {
    /// The state's canonical name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::LoggedIn => "LoggedIn",
            Self::SentClientRequest => "SentClientRequest",
            Self::SentAttention => "SentAttention",
            Self::Final => "Final",
        }
    }

    /// Whether a new request can be issued from this state.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::LoggedIn)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
