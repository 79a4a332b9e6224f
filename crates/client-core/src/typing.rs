/// Default gap under which repeated typing notifications are collapsed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Default window the indicator stays visible after the last notification.
pub const DEFAULT_VISIBLE_FOR_MS: u64 = 850;

/// Clock-driven typing indicator.
///
/// Pure state machine: the caller supplies `now_ms`, no timers run inside.
/// Each observed notification re-arms the visibility window; notifications
/// closer together than the debounce gap for the same user are collapsed.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    debounce_ms: u64,
    visible_for_ms: u64,
    username: Option<String>,
    last_observed_ms: u64,
    visible_until_ms: u64,
}

impl TypingIndicator {
    pub fn new(debounce_ms: u64, visible_for_ms: u64) -> Self {
        Self {
            debounce_ms,
            visible_for_ms: visible_for_ms.max(1),
            username: None,
            last_observed_ms: 0,
            visible_until_ms: 0,
        }
    }

    /// Record a typing notification. Returns whether the visible state
    /// changed (new user, or the indicator re-appeared after expiring).
    pub fn observe(&mut self, username: impl Into<String>, now_ms: u64) -> bool {
        let username = username.into();
        let same_user = self.username.as_deref() == Some(username.as_str());
        let within_debounce =
            same_user && now_ms.saturating_sub(self.last_observed_ms) < self.debounce_ms;
        let was_visible = self.is_visible(now_ms);

        self.last_observed_ms = now_ms;
        if within_debounce {
            return false;
        }

        self.username = Some(username);
        self.visible_until_ms = now_ms.saturating_add(self.visible_for_ms);
        !(was_visible && same_user)
    }

    /// The user currently shown as typing, if the window has not expired.
    pub fn active_username(&self, now_ms: u64) -> Option<&str> {
        if self.is_visible(now_ms) {
            self.username.as_deref()
        } else {
            None
        }
    }

    /// Drop the indicator immediately, for example when switching rooms.
    pub fn clear(&mut self) {
        self.username = None;
        self.visible_until_ms = 0;
        self.last_observed_ms = 0;
    }

    fn is_visible(&self, now_ms: u64) -> bool {
        self.username.is_some() && now_ms < self.visible_until_ms
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS, DEFAULT_VISIBLE_FOR_MS)
    }
}
