//! Typing indicators.
//!
//! [`TypingMachine`] tracks whether the local user is typing and reports
//! when a start or stop signal should be sent. [`RemoteTyping`] tracks the
//! other participants, each of whom expires if their signals stop.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::TypingSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Idle,
    Typing { last_keystroke: Instant },
}

/// Signal the caller should publish after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingChange {
    Started,
    Stopped,
}

impl TypingChange {
    pub const fn is_typing(self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Local typing state: `Idle -> Typing` on a keystroke, back to `Idle`
/// after the quiet period or when the message is sent.
#[derive(Debug, Clone)]
pub struct TypingMachine {
    state: TypingState,
    quiet_period: Duration,
}

impl TypingMachine {
    pub const fn new(quiet_period: Duration) -> Self {
        Self {
            state: TypingState::Idle,
            quiet_period,
        }
    }

    pub const fn state(&self) -> TypingState {
        self.state
    }

    pub const fn is_typing(&self) -> bool {
        matches!(self.state, TypingState::Typing { .. })
    }

    /// Only the first keystroke after idling emits `Started`
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingChange> {
        let was_idle = !self.is_typing();
        self.state = TypingState::Typing {
            last_keystroke: now,
        };
        was_idle.then_some(TypingChange::Started)
    }

    /// Stop typing if the quiet period has elapsed by `now`
    pub fn expire(&mut self, now: Instant) -> Option<TypingChange> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.stop(),
            _ => None,
        }
    }

    pub fn message_sent(&mut self) -> Option<TypingChange> {
        self.stop()
    }

    /// When the current typing burst lapses, if typing
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TypingState::Idle => None,
            TypingState::Typing { last_keystroke } => Some(last_keystroke + self.quiet_period),
        }
    }

    fn stop(&mut self) -> Option<TypingChange> {
        let was_typing = self.is_typing();
        self.state = TypingState::Idle;
        was_typing.then_some(TypingChange::Stopped)
    }
}

/// Who else in the conversation is typing
#[derive(Debug, Clone)]
pub struct RemoteTyping {
    expiry: Duration,
    expires_at: HashMap<String, Instant>,
}

impl RemoteTyping {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            expires_at: HashMap::new(),
        }
    }

    /// Record a signal. Returns `true` when the typing set changed.
    pub fn apply(&mut self, signal: &TypingSignal, now: Instant) -> bool {
        if signal.is_typing {
            self.expires_at
                .insert(signal.user_id.clone(), now + self.expiry)
                .is_none()
        } else {
            self.clear(&signal.user_id)
        }
    }

    pub fn clear(&mut self, user_id: &str) -> bool {
        self.expires_at.remove(user_id).is_some()
    }

    /// Drop participants whose signal lapsed. Returns `true` if any did.
    pub fn prune(&mut self, now: Instant) -> bool {
        let before = self.expires_at.len();
        self.expires_at.retain(|_, expires_at| *expires_at > now);
        self.expires_at.len() != before
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.expires_at.values().min().copied()
    }

    /// Sorted ids of participants currently typing
    pub fn typing_users(&self) -> Vec<String> {
        let mut users = self.expires_at.keys().cloned().collect::<Vec<_>>();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const QUIET: Duration = Duration::from_secs(3);

    fn signal(user_id: &str, is_typing: bool) -> TypingSignal {
        TypingSignal {
            conversation_id: "c1".to_string(),
            user_id: user_id.to_string(),
            is_typing,
        }
    }

    #[test]
    fn first_keystroke_starts_and_quiet_period_stops() {
        let start = Instant::now();
        let mut machine = TypingMachine::new(QUIET);

        assert_eq!(machine.keystroke(start), Some(TypingChange::Started));
        assert_eq!(machine.keystroke(start + Duration::from_secs(1)), None);
        assert_eq!(machine.deadline(), Some(start + Duration::from_secs(4)));

        assert_eq!(machine.expire(start + Duration::from_secs(3)), None);
        assert_eq!(
            machine.expire(start + Duration::from_secs(4)),
            Some(TypingChange::Stopped)
        );
        assert_eq!(machine.state(), TypingState::Idle);
    }

    #[test]
    fn sending_stops_typing_once() {
        let mut machine = TypingMachine::new(QUIET);
        assert_eq!(machine.message_sent(), None);
        machine.keystroke(Instant::now());
        assert_eq!(machine.message_sent(), Some(TypingChange::Stopped));
        assert_eq!(machine.message_sent(), None);
        assert_eq!(machine.deadline(), None);
    }

    #[test]
    fn remote_participants_expire() {
        let start = Instant::now();
        let mut remote = RemoteTyping::new(Duration::from_secs(5));

        assert!(remote.apply(&signal("u2", true), start));
        assert!(!remote.apply(&signal("u2", true), start + Duration::from_secs(2)));
        assert!(remote.apply(&signal("u1", true), start + Duration::from_secs(3)));
        assert_eq!(remote.typing_users(), vec!["u1", "u2"]);
        assert_eq!(remote.next_expiry(), Some(start + Duration::from_secs(7)));

        assert!(remote.prune(start + Duration::from_secs(7)));
        assert_eq!(remote.typing_users(), vec!["u1"]);

        assert!(remote.apply(&signal("u1", false), start + Duration::from_secs(8)));
        assert!(remote.typing_users().is_empty());
        assert_eq!(remote.next_expiry(), None);
    }
}
