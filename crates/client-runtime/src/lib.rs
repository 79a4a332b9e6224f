//! Single-writer dispatch loop wiring the chat SDK into the
//! reconciliation core.
//!
//! One task owns the [`RoomIndex`], the per-room [`MessageStore`]s, and the
//! ephemeral typing/presence state. SDK push events and UI commands funnel
//! through a `select!` loop that processes strictly one item at a time, so
//! the stores honor their single-owner contract without any locking. State
//! changes leave as snapshot events on a broadcast channel.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use client_core::{
    ChatEvent, ClientCommand, ClientError, ClientEvent, Message, MessagePayload, MessageStatus,
    MessageStore, PresenceRoster, RetryPolicy, RoomIndex, RoomUpdateOutcome, SendAck,
    TypingIndicator, attachment, attachment::AttachmentSource, merge_unread_counts,
};
use client_sdk::{ChatSdk, SdkError};

/// Bounded attempts for the full room-list reload triggered by an event
/// naming an unknown room.
const MAX_RELOAD_ATTEMPTS: u32 = 3;

/// Event-dispatch owner of the reconciliation core.
pub struct ChatRuntime<S> {
    sdk: S,
    user_id: String,
    rooms: RoomIndex,
    stores: HashMap<u64, MessageStore>,
    open_room_id: Option<u64>,
    typing: TypingIndicator,
    presence: PresenceRoster,
    events: broadcast::Sender<ClientEvent>,
    retry: RetryPolicy,
}

impl<S: ChatSdk> ChatRuntime<S> {
    /// Create a runtime acting as `user_id`, publishing state changes on
    /// `events`.
    pub fn new(sdk: S, user_id: impl Into<String>, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            sdk,
            user_id: user_id.into(),
            rooms: RoomIndex::new(),
            stores: HashMap::new(),
            open_room_id: None,
            typing: TypingIndicator::default(),
            presence: PresenceRoster::new(),
            events,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the reload backoff schedule.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run until cancellation or until both input channels close.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ClientCommand>,
        mut inbound: mpsc::Receiver<ChatEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("client runtime shutting down");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("command channel closed, stopping runtime");
                        break;
                    }
                },
                event = inbound.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("inbound event channel closed, stopping runtime");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        trace!(?command, "handling client command");
        match command {
            ClientCommand::RefreshRooms => self.reload_rooms_with_backoff().await,
            ClientCommand::OpenRoom { room_id } => self.open_room(room_id).await,
            ClientCommand::LoadOlder { room_id } => self.load_older(room_id).await,
            ClientCommand::SendText { room_id, body } => self.send_text(room_id, body).await,
            ClientCommand::SendAttachment { room_id, source } => {
                self.send_attachment(room_id, source).await
            }
            ClientCommand::MarkRead { room_id } => {
                if self.rooms.mark_read(room_id) {
                    self.emit_room_list();
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ChatEvent) {
        trace!(?event, "handling inbound chat event");
        match event {
            ChatEvent::NewMessage(message) => self.handle_new_message(message).await,
            ChatEvent::MessageDelivered { room_id, cutoff_ms } => {
                let changed = match self.stores.get_mut(&room_id) {
                    Some(store) => store.apply_delivery_cutoff(cutoff_ms),
                    None => 0,
                };
                if changed > 0 {
                    self.emit_messages_updated(room_id);
                }
            }
            ChatEvent::MessageRead { room_id, cutoff_ms } => {
                let changed = match self.stores.get_mut(&room_id) {
                    Some(store) => store.apply_read_cutoff(cutoff_ms),
                    None => 0,
                };
                if changed > 0 {
                    self.emit_messages_updated(room_id);
                }
            }
            ChatEvent::Presence {
                user_id,
                is_online,
                last_online_ms,
            } => {
                if self.presence.update(user_id.clone(), is_online, last_online_ms) {
                    self.emit(ClientEvent::PresenceChanged {
                        user_id,
                        is_online,
                        last_online_ms,
                    });
                }
            }
            ChatEvent::Typing { room_id, username } => {
                if self.open_room_id != Some(room_id) {
                    trace!(room_id, "dropping typing event for a room that is not open");
                    return;
                }
                let now_ms = now_ms();
                if self.typing.observe(username, now_ms) {
                    let username = self.typing.active_username(now_ms).map(str::to_owned);
                    self.emit(ClientEvent::TypingChanged { room_id, username });
                }
            }
        }
    }

    async fn handle_new_message(&mut self, message: Message) {
        match self.rooms.apply_inbound(&message) {
            RoomUpdateOutcome::Applied => self.emit_room_list(),
            RoomUpdateOutcome::ReloadRequired => self.reload_rooms_with_backoff().await,
            RoomUpdateOutcome::IgnoredDuplicate => {}
        }

        let room_id = message.room_id;
        if self.open_room_id == Some(room_id)
            && self.typing.active_username(now_ms()).is_some()
        {
            // The awaited message arrived; drop the typing indicator.
            self.typing.clear();
            self.emit(ClientEvent::TypingChanged {
                room_id,
                username: None,
            });
        }

        let changed = match self.stores.get_mut(&room_id) {
            Some(store) => store.apply_inbound(message).unwrap_or_else(|err| {
                warn!(room_id, %err, "inbound message could not be merged");
                false
            }),
            None => false,
        };
        if changed {
            self.emit_messages_updated(room_id);
        }
    }

    async fn refresh_rooms(&mut self) -> Result<(), ClientError> {
        let rooms = self.sdk.load_room_list().await.map_err(ClientError::from)?;
        let room_ids: Vec<u64> = rooms.iter().map(|room| room.id).collect();
        let info = self
            .sdk
            .get_rooms_info(&room_ids)
            .await
            .map_err(ClientError::from)?;
        self.rooms.load_all(merge_unread_counts(rooms, &info));
        self.emit_room_list();
        Ok(())
    }

    async fn reload_rooms_with_backoff(&mut self) {
        for attempt in 0..MAX_RELOAD_ATTEMPTS {
            match self.refresh_rooms().await {
                Ok(()) => return,
                Err(err) => {
                    warn!(attempt, %err, "room list reload failed");
                    if attempt + 1 < MAX_RELOAD_ATTEMPTS {
                        let delay = self.retry.delay_for_attempt(attempt, err.retry_after_ms);
                        tokio::time::sleep(delay).await;
                    } else {
                        self.emit(ClientEvent::LoadFailed {
                            room_id: None,
                            code: err.code,
                        });
                    }
                }
            }
        }
    }

    async fn open_room(&mut self, room_id: u64) {
        match self.sdk.load_comments(room_id, None).await {
            Ok(batch) => {
                let mut store = MessageStore::new(room_id);
                store.initialize(batch.messages, batch.has_more_before);
                let messages = store.ordered_view();
                let has_more_before = store.has_more_before();
                self.stores.insert(room_id, store);
                self.open_room_id = Some(room_id);
                self.typing.clear();
                if self.rooms.mark_read(room_id) {
                    self.emit_room_list();
                }
                self.emit(ClientEvent::RoomOpened {
                    room_id,
                    messages,
                    has_more_before,
                });
            }
            Err(err) => {
                let err = ClientError::from(err);
                warn!(room_id, %err, "room open failed, keeping prior state");
                self.emit(ClientEvent::LoadFailed {
                    room_id: Some(room_id),
                    code: err.code,
                });
            }
        }
    }

    async fn load_older(&mut self, room_id: u64) {
        let Some(store) = self.stores.get(&room_id) else {
            warn!(room_id, "pagination requested for a room that is not open");
            return;
        };
        if !store.has_more_before() {
            debug!(room_id, "no older history to load");
            return;
        }
        let Some(anchor) = store.earliest_server_id() else {
            debug!(room_id, "no server-confirmed anchor for pagination");
            return;
        };

        match self.sdk.load_comments(room_id, Some(anchor)).await {
            Ok(batch) => {
                if let Some(store) = self.stores.get_mut(&room_id) {
                    match store.merge_older_batch(batch.messages, batch.has_more_before) {
                        Ok(_) => self.emit_messages_updated(room_id),
                        Err(err) => warn!(room_id, %err, "older page could not be merged"),
                    }
                }
            }
            Err(err) => {
                let err = ClientError::from(err);
                warn!(room_id, %err, "pagination failed, keeping prior state");
                self.emit(ClientEvent::LoadFailed {
                    room_id: Some(room_id),
                    code: err.code,
                });
            }
        }
    }

    async fn send_text(&mut self, room_id: u64, body: String) {
        let local_id = Uuid::new_v4().to_string();
        let message = Message {
            local_id: Some(local_id.clone()),
            server_id: None,
            room_id,
            sender: self.user_id.clone(),
            timestamp_ms: now_ms(),
            status: MessageStatus::Sending,
            payload: MessagePayload::Text { body },
        };
        let payload = message.payload.clone();

        match self.stores.get_mut(&room_id) {
            Some(store) => {
                if let Err(err) = store.apply_local_send(message) {
                    warn!(room_id, %err, "optimistic insert failed");
                    return;
                }
            }
            None => {
                warn!(room_id, "send requested for a room that is not open");
                return;
            }
        }
        self.emit_messages_updated(room_id);

        let outcome = self.sdk.send_comment(room_id, &local_id, payload).await;
        self.resolve_send(room_id, &local_id, outcome);
    }

    async fn send_attachment(&mut self, room_id: u64, source: AttachmentSource) {
        if let Err(err) = attachment::validate(&source) {
            debug!(room_id, %err, "attachment rejected before send");
            self.emit(ClientEvent::AttachmentRejected {
                room_id,
                reason: err.to_string(),
            });
            return;
        }

        let local_id = Uuid::new_v4().to_string();
        let message =
            attachment::pending_upload_message(room_id, &self.user_id, &local_id, now_ms(), &source);
        match self.stores.get_mut(&room_id) {
            Some(store) => {
                if let Err(err) = store.apply_local_send(message) {
                    warn!(room_id, %err, "optimistic insert failed");
                    return;
                }
            }
            None => {
                warn!(room_id, "attachment send requested for a room that is not open");
                return;
            }
        }
        self.emit_messages_updated(room_id);

        let outcome = match self.sdk.upload_attachment(&source).await {
            Ok(upload) => {
                let payload = attachment::uploaded_payload(&source, &upload.url);
                self.sdk.send_comment(room_id, &local_id, payload).await
            }
            Err(err) => Err(err),
        };
        self.resolve_send(room_id, &local_id, outcome);
    }

    /// Apply the SDK's answer to an optimistic record and acknowledge the
    /// send either way.
    fn resolve_send(&mut self, room_id: u64, local_id: &str, outcome: Result<Message, SdkError>) {
        let Some(store) = self.stores.get_mut(&room_id) else {
            warn!(room_id, "send resolved for a room that is no longer open");
            return;
        };

        let ack = match outcome {
            Ok(record) => {
                let server_id = record.server_id;
                match store.confirm_send(local_id, record) {
                    Ok(()) => SendAck {
                        local_id: local_id.to_owned(),
                        server_id,
                        error_code: None,
                    },
                    Err(err) => {
                        warn!(room_id, %err, "send confirmation could not be applied");
                        return;
                    }
                }
            }
            Err(err) => {
                let err = ClientError::from(err);
                if let Err(store_err) = store.mark_send_failed(local_id) {
                    warn!(room_id, %store_err, "failed send could not be marked");
                }
                SendAck {
                    local_id: local_id.to_owned(),
                    server_id: None,
                    error_code: Some(err.code),
                }
            }
        };

        self.emit(ClientEvent::SendAck(ack));
        self.emit_messages_updated(room_id);
    }

    fn emit_room_list(&self) {
        self.emit(ClientEvent::RoomListUpdated {
            rooms: self.rooms.ordered_view(),
        });
    }

    fn emit_messages_updated(&self, room_id: u64) {
        if let Some(store) = self.stores.get(&room_id) {
            self.emit(ClientEvent::MessagesUpdated {
                room_id,
                messages: store.ordered_view(),
                has_more_before: store.has_more_before(),
            });
        }
    }

    /// Emission is best-effort; nothing listens before the first subscriber
    /// arrives.
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
