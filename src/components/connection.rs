// Connection state owned by the stream connector

use chrono::{DateTime, Utc};

/// Observable state of the push stream.
///
/// Transitions are driven by stream lifecycle events only; application code
/// reads this for optional status display and never mutates it. Transport
/// problems are silent and self-healing, so there is deliberately no error
/// type here, just the last reason as plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub last_error: Option<String>,
    /// Server-acknowledged session from the `connected` handshake, when the
    /// diagnostic payload was parseable.
    pub session: Option<StreamSession>,
}

impl ConnectionState {
    pub(crate) fn mark_connected(&mut self, session: Option<StreamSession>) {
        self.connected = true;
        self.last_error = None;
        self.session = session;
    }

    pub(crate) fn mark_disconnected(&mut self, reason: Option<String>) {
        self.connected = false;
        self.session = None;
        if let Some(reason) = reason {
            self.last_error = Some(reason);
        }
    }
}

/// One acknowledged stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    /// User id echoed back by the server handshake.
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_clears_previous_error() {
        let mut state = ConnectionState::default();
        state.mark_disconnected(Some("Connection lost".to_string()));
        assert!(!state.connected);
        assert_eq!(state.last_error.as_deref(), Some("Connection lost"));

        state.mark_connected(Some(StreamSession {
            user_id: "user-123".to_string(),
            connected_at: Utc::now(),
        }));
        assert!(state.connected);
        assert!(state.last_error.is_none());
        assert_eq!(
            state.session.as_ref().map(|s| s.user_id.as_str()),
            Some("user-123")
        );
    }

    #[test]
    fn plain_teardown_keeps_last_error_untouched() {
        let mut state = ConnectionState::default();
        state.mark_connected(None);
        state.mark_disconnected(None);
        assert!(!state.connected);
        assert!(state.last_error.is_none());
        assert!(state.session.is_none());
    }
}
