//! Online/away/offline presence.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::wait_until;
use crate::realtime::{topics, ChangeEvent, RealtimeHub};

pub const PRESENCE_TABLE: &str = "presence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        })
    }
}

/// Row published on the user's topic whenever presence changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSignal {
    pub user_id: String,
    pub status: PresenceState,
    pub last_seen: DateTime<Utc>,
}

/// Foreground keeps the user online; backgrounding makes them away, and
/// staying in the background past `offline_after` makes them offline.
#[derive(Debug, Clone)]
pub struct PresenceMachine {
    state: PresenceState,
    backgrounded_at: Option<Instant>,
    offline_after: Duration,
}

impl PresenceMachine {
    pub const fn new(offline_after: Duration) -> Self {
        Self {
            state: PresenceState::Online,
            backgrounded_at: None,
            offline_after,
        }
    }

    pub const fn state(&self) -> PresenceState {
        self.state
    }

    pub fn foreground(&mut self) -> Option<PresenceState> {
        self.backgrounded_at = None;
        self.set(PresenceState::Online)
    }

    pub fn background(&mut self, now: Instant) -> Option<PresenceState> {
        if self.state != PresenceState::Online {
            return None;
        }
        self.backgrounded_at = Some(now);
        self.set(PresenceState::Away)
    }

    /// Go offline if the user has been away long enough by `now`
    pub fn tick(&mut self, now: Instant) -> Option<PresenceState> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.backgrounded_at = None;
                self.set(PresenceState::Offline)
            }
            _ => None,
        }
    }

    /// Explicit sign-off or lost connection
    pub fn disconnect(&mut self) -> Option<PresenceState> {
        self.backgrounded_at = None;
        self.set(PresenceState::Offline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.backgrounded_at
            .map(|backgrounded_at| backgrounded_at + self.offline_after)
    }

    fn set(&mut self, next: PresenceState) -> Option<PresenceState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

enum PresenceCommand {
    Foreground,
    Background,
}

/// Drives a [`PresenceMachine`] for the signed-in user and publishes every
/// change to `user:<id>`. Dropping the session aborts its timer task.
pub struct PresenceSession {
    commands: mpsc::UnboundedSender<PresenceCommand>,
    state: watch::Receiver<PresenceState>,
    task: JoinHandle<()>,
}

impl PresenceSession {
    pub fn start(hub: RealtimeHub, user_id: impl Into<String>, offline_after: Duration) -> Self {
        let user_id = user_id.into();
        let (commands, mut inbox) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(PresenceState::Online);
        let topic = topics::user(&user_id);

        let task = tokio::spawn(async move {
            let mut machine = PresenceMachine::new(offline_after);
            publish(&hub, &topic, &user_id, PresenceState::Online);
            loop {
                let change = tokio::select! {
                    command = inbox.recv() => match command {
                        Some(PresenceCommand::Foreground) => machine.foreground(),
                        Some(PresenceCommand::Background) => machine.background(Instant::now()),
                        None => break,
                    },
                    () = wait_until(machine.deadline()) => machine.tick(Instant::now()),
                };
                if let Some(next) = change {
                    tracing::debug!(user = %user_id, state = %next, "Presence changed");
                    publish(&hub, &topic, &user_id, next);
                    state_tx.send_replace(next);
                }
            }
        });

        Self {
            commands,
            state,
            task,
        }
    }

    pub fn foreground(&self) {
        let _ = self.commands.send(PresenceCommand::Foreground);
    }

    pub fn background(&self) {
        let _ = self.commands.send(PresenceCommand::Background);
    }

    pub fn state(&self) -> PresenceState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<PresenceState> {
        self.state.clone()
    }
}

impl Drop for PresenceSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn publish(hub: &RealtimeHub, topic: &str, user_id: &str, status: PresenceState) {
    let signal = PresenceSignal {
        user_id: user_id.to_string(),
        status,
        last_seen: Utc::now(),
    };
    match serde_json::to_value(&signal) {
        Ok(row) => {
            hub.publish(topic, ChangeEvent::insert(PRESENCE_TABLE, row));
        }
        Err(error) => tracing::warn!(%error, "Failed to encode presence signal"),
    }
}
