use std::collections::HashMap;

/// Online state of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceState {
    pub is_online: bool,
    /// Last time the peer was seen online, milliseconds since epoch.
    pub last_online_ms: u64,
}

/// Per-user presence as reported by the SDK's presence events.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    users: HashMap<String, PresenceState>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one presence event. Returns whether the stored state changed.
    pub fn update(&mut self, user_id: impl Into<String>, is_online: bool, last_online_ms: u64) -> bool {
        let next = PresenceState {
            is_online,
            last_online_ms,
        };
        self.users.insert(user_id.into(), next) != Some(next)
    }

    pub fn get(&self, user_id: &str) -> Option<PresenceState> {
        self.users.get(user_id).copied()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|state| state.is_online)
    }
}
