//! Session state machine for fleet hosts.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the remote session to one host
///
/// ```text
/// Discovered ──► Connecting ──► Connected ──► Failed ──► Reconnecting
///                    │                          ▲  ▲          │
///                    └──────────────────────────┘  └──────────┤
///                                                             ▼
///                                  (any state) ──► Disconnected ──► Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Known but never connected
    #[default]
    Discovered,
    /// First connection attempt in flight
    Connecting,
    /// Authenticated and verified
    Connected,
    /// Last attempt or command failed
    Failed,
    /// Automatic reconnection attempt in flight
    Reconnecting,
    /// Session released on request
    Disconnected,
}

impl SessionState {
    /// All states, in lifecycle order
    pub const ALL: [Self; 6] = [
        Self::Discovered,
        Self::Connecting,
        Self::Connected,
        Self::Failed,
        Self::Reconnecting,
        Self::Disconnected,
    ];

    /// Returns true if the state machine allows moving from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Discovered | Self::Disconnected, Self::Connecting)
                | (
                    Self::Connecting | Self::Reconnecting,
                    Self::Connected | Self::Failed
                )
                | (Self::Connected, Self::Failed)
                | (Self::Failed, Self::Reconnecting)
                | (
                    Self::Discovered
                        | Self::Connecting
                        | Self::Connected
                        | Self::Failed
                        | Self::Reconnecting,
                    Self::Disconnected
                )
        )
    }

    /// Returns true while a connection attempt is running
    #[must_use]
    pub const fn is_attempting(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Returns the lowercase identifier used in logs and persisted output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_valid() {
        let path = [
            SessionState::Discovered,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Failed,
            SessionState::Reconnecting,
            SessionState::Connected,
            SessionState::Disconnected,
            SessionState::Connecting,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        assert!(!SessionState::Discovered.can_transition_to(SessionState::Connected));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Connected));
        assert!(!SessionState::Connected.can_transition_to(SessionState::Reconnecting));
        assert!(!SessionState::Disconnected.can_transition_to(SessionState::Connected));
        assert!(!SessionState::Connected.can_transition_to(SessionState::Connecting));
    }

    #[test]
    fn test_every_state_can_be_disconnected_except_itself() {
        for state in SessionState::ALL {
            let expected = state != SessionState::Disconnected;
            assert_eq!(state.can_transition_to(SessionState::Disconnected), expected);
        }
    }

    #[test]
    fn test_display_matches_serde() {
        let json = serde_json::to_string(&SessionState::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
        assert_eq!(SessionState::Reconnecting.to_string(), "reconnecting");
    }
}
