//! Realtime chat: typing indicators, presence, and live message delivery.

mod presence;
mod typing;

use std::future::pending;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub use presence::{PresenceMachine, PresenceSession, PresenceSignal, PresenceState, PRESENCE_TABLE};
pub use typing::{RemoteTyping, TypingChange, TypingMachine, TypingState};

use crate::cache::{keys, QueryClient};
use crate::config::TypingConfig;
use crate::models::{Message, TypingSignal};
use crate::realtime::{topics, ChangeEvent, ChangeKind, RealtimeHub, Subscription};

pub const TYPING_TABLE: &str = "typing_status";
pub const MESSAGES_TABLE: &str = "messages";

/// Resolve at `deadline`, or never when there is none
pub(crate) async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

enum ChatCommand {
    Keystroke,
    MessageSent,
    Close,
}

/// One mounted conversation.
///
/// Owns the realtime subscription for `conversation:<id>`, the local typing
/// machine and the remote typing tracker. New messages arriving on the
/// topic are prepended to the cached message list. Dropping the session
/// aborts its task, which also unsubscribes.
pub struct ChatSession {
    conversation_id: String,
    commands: mpsc::UnboundedSender<ChatCommand>,
    typing: watch::Receiver<Vec<String>>,
    task: Option<JoinHandle<()>>,
}

struct Driver {
    conversation_id: String,
    user_id: String,
    topic: String,
    hub: RealtimeHub,
    client: QueryClient,
    local: TypingMachine,
    remote: RemoteTyping,
    typing_tx: watch::Sender<Vec<String>>,
}

impl ChatSession {
    pub fn open(
        hub: RealtimeHub,
        client: QueryClient,
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        config: TypingConfig,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let topic = topics::conversation(&conversation_id);
        let subscription = hub.subscribe(&topic, [TYPING_TABLE, MESSAGES_TABLE]);
        let (commands, inbox) = mpsc::unbounded_channel();
        let (typing_tx, typing) = watch::channel(Vec::new());

        let driver = Driver {
            conversation_id: conversation_id.clone(),
            user_id: user_id.into(),
            topic,
            hub,
            client,
            local: TypingMachine::new(config.quiet_period()),
            remote: RemoteTyping::new(config.remote_expiry()),
            typing_tx,
        };
        tracing::debug!(conversation = %conversation_id, "Chat session opened");
        let task = tokio::spawn(driver.run(subscription, inbox));

        Self {
            conversation_id,
            commands,
            typing,
            task: Some(task),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The composer changed
    pub fn keystroke(&self) {
        let _ = self.commands.send(ChatCommand::Keystroke);
    }

    /// The composed message was sent; typing stops immediately
    pub fn message_sent(&self) {
        let _ = self.commands.send(ChatCommand::MessageSent);
    }

    /// Other participants currently typing
    pub fn typing_users(&self) -> Vec<String> {
        self.typing.borrow().clone()
    }

    pub fn watch_typing(&self) -> watch::Receiver<Vec<String>> {
        self.typing.clone()
    }

    /// Unmount: send a final stop signal if typing, then unsubscribe
    pub async fn close(mut self) {
        let _ = self.commands.send(ChatCommand::Close);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(%error, "Chat session task ended abnormally");
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Driver {
    async fn run(
        mut self,
        mut subscription: Subscription,
        mut inbox: mpsc::UnboundedReceiver<ChatCommand>,
    ) {
        loop {
            let deadline = match (self.local.deadline(), self.remote.next_expiry()) {
                (Some(local), Some(remote)) => Some(local.min(remote)),
                (local, remote) => local.or(remote),
            };
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(ChatCommand::Keystroke) => {
                        let change = self.local.keystroke(Instant::now());
                        self.signal(change);
                    }
                    Some(ChatCommand::MessageSent) => {
                        let change = self.local.message_sent();
                        self.signal(change);
                    }
                    Some(ChatCommand::Close) | None => {
                        let change = self.local.message_sent();
                        self.signal(change);
                        break;
                    }
                },
                event = subscription.recv() => match event {
                    Some(event) => self.handle(&event),
                    None => break,
                },
                () = wait_until(deadline) => {
                    let now = Instant::now();
                    let change = self.local.expire(now);
                    self.signal(change);
                    if self.remote.prune(now) {
                        self.publish_typing_users();
                    }
                }
            }
        }
        subscription.unsubscribe();
        tracing::debug!(conversation = %self.conversation_id, "Chat session closed");
    }

    fn handle(&mut self, event: &ChangeEvent) {
        match event.table.as_str() {
            TYPING_TABLE => {
                let Some(signal) = event.new_row::<TypingSignal>() else {
                    return;
                };
                if signal.user_id != self.user_id && self.remote.apply(&signal, Instant::now()) {
                    self.publish_typing_users();
                }
            }
            MESSAGES_TABLE if event.kind == ChangeKind::Insert => {
                let Some(message) = event.new_row::<Message>() else {
                    tracing::warn!(conversation = %self.conversation_id, "Ignoring malformed message row");
                    return;
                };
                let sender_id = message.sender_id.clone();
                let key = keys::messages(&self.conversation_id);
                if !self.client.prepend_item(&key, message) {
                    tracing::debug!(%key, "Message list not cached; skipping prepend");
                }
                if self.remote.clear(&sender_id) {
                    self.publish_typing_users();
                }
            }
            _ => {}
        }
    }

    fn signal(&self, change: Option<TypingChange>) {
        let Some(change) = change else {
            return;
        };
        let signal = TypingSignal {
            conversation_id: self.conversation_id.clone(),
            user_id: self.user_id.clone(),
            is_typing: change.is_typing(),
        };
        match serde_json::to_value(&signal) {
            Ok(row) => {
                self.hub
                    .publish(&self.topic, ChangeEvent::insert(TYPING_TABLE, row));
            }
            Err(error) => tracing::warn!(%error, "Failed to encode typing signal"),
        }
    }

    fn publish_typing_users(&self) {
        self.typing_tx.send_replace(self.remote.typing_users());
    }
}
