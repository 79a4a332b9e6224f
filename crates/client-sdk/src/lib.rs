//! Abstract contract for the external chat SDK, plus an in-memory
//! scripted implementation used by tests and the smoke binary.
//!
//! The real SDK owns transport, retries, and delivery guarantees; this
//! crate only fixes the call surface the reconciliation core observes.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock},
};

use thiserror::Error;

use client_core::{
    AttachmentSource, ClientError, ClientErrorCategory, Message, MessagePayload, MessageStatus,
    RoomInfo, RoomSummary, classify_http_status,
};

/// Failures reported by the chat SDK.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SdkError {
    /// The named room or resource does not exist.
    #[error("resource not found")]
    NotFound,
    /// The SDK cannot reach the chat service.
    #[error("chat service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with a non-success HTTP status.
    #[error("chat service answered with http status {0}")]
    Http(u16),
    /// Any other SDK-internal failure.
    #[error("sdk failure: {0}")]
    Backend(String),
}

impl SdkError {
    /// Stable machine-readable code for acknowledgements.
    pub fn code(&self) -> &'static str {
        match self {
            SdkError::NotFound => "not_found",
            SdkError::Unavailable(_) => "unavailable",
            SdkError::Http(_) => "http_status",
            SdkError::Backend(_) => "sdk_failure",
        }
    }
}

impl From<SdkError> for ClientError {
    fn from(err: SdkError) -> Self {
        let category = match &err {
            SdkError::NotFound => ClientErrorCategory::Config,
            SdkError::Unavailable(_) => ClientErrorCategory::Network,
            SdkError::Http(status) => classify_http_status(*status),
            SdkError::Backend(_) => ClientErrorCategory::Internal,
        };
        ClientError::new(category, err.code(), err.to_string())
    }
}

/// One page of room history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBatch {
    /// Messages ascending by server id.
    pub messages: Vec<Message>,
    /// Whether history remains before the earliest message in the page.
    pub has_more_before: bool,
}

/// Result of a completed attachment upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    /// Public URL of the uploaded file.
    pub url: String,
}

/// Pull surface of the external chat SDK.
///
/// Implementations complete each call with a network round trip; the
/// in-memory double answers from scripted state. Push events reach the
/// runtime on a separate channel and are not part of this trait.
#[allow(async_fn_in_trait)]
pub trait ChatSdk: Send + Sync {
    /// List the rooms the account participates in.
    async fn load_room_list(&self) -> Result<Vec<RoomSummary>, SdkError>;

    /// Bulk-fetch authoritative unread counts for the given rooms.
    async fn get_rooms_info(&self, room_ids: &[u64]) -> Result<HashMap<u64, RoomInfo>, SdkError>;

    /// Load one page of a room's history. With `before` set, the page ends
    /// just before that server id; otherwise it is the newest page.
    async fn load_comments(
        &self,
        room_id: u64,
        before: Option<u64>,
    ) -> Result<CommentBatch, SdkError>;

    /// Persist one message. The confirmed record echoes `local_id` and
    /// carries the assigned server id.
    async fn send_comment(
        &self,
        room_id: u64,
        local_id: &str,
        payload: MessagePayload,
    ) -> Result<Message, SdkError>;

    /// Upload a picked file and return its public URL.
    async fn upload_attachment(
        &self,
        source: &AttachmentSource,
    ) -> Result<AttachmentUpload, SdkError>;
}

const PAGE_SIZE: usize = 20;

#[derive(Debug, Default)]
struct SdkState {
    rooms: Vec<RoomSummary>,
    comments: HashMap<u64, Vec<Message>>,
    unread: HashMap<u64, u64>,
    next_server_id: u64,
    clock_ms: u64,
    pending_failures: VecDeque<SdkError>,
}

/// Scripted in-memory stand-in for the chat SDK.
///
/// Deterministic: server ids and timestamps come from counters, and
/// failures only happen when injected with
/// [`inject_failure`](Self::inject_failure).
#[derive(Clone)]
pub struct InMemoryChatSdk {
    user_id: String,
    state: Arc<RwLock<SdkState>>,
}

impl InMemoryChatSdk {
    /// Create an empty SDK double acting as `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: Arc::new(RwLock::new(SdkState {
                next_server_id: 1,
                clock_ms: 1_000,
                ..SdkState::default()
            })),
        }
    }

    /// Script one room and its history (ascending by server id).
    pub fn seed_room(&self, summary: RoomSummary, messages: Vec<Message>) {
        let mut state = self.state.write().expect("sdk state lock poisoned");
        let max_seeded = messages
            .iter()
            .filter_map(|message| message.server_id)
            .max()
            .unwrap_or(0)
            .max(summary.last_comment_id);
        state.next_server_id = state.next_server_id.max(max_seeded + 1);
        state.comments.insert(summary.id, messages);
        state.rooms.push(summary);
    }

    /// Script the unread count returned by the bulk room-info endpoint.
    pub fn set_unread(&self, room_id: u64, unread_count: u64) {
        let mut state = self.state.write().expect("sdk state lock poisoned");
        state.unread.insert(room_id, unread_count);
    }

    /// Make the next SDK call fail with `err`. Injected failures queue up
    /// and are consumed one per call.
    pub fn inject_failure(&self, err: SdkError) {
        let mut state = self.state.write().expect("sdk state lock poisoned");
        state.pending_failures.push_back(err);
    }

    fn take_injected_failure(&self) -> Result<(), SdkError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| SdkError::Backend("poisoned lock".to_owned()))?;
        match state.pending_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ChatSdk for InMemoryChatSdk {
    async fn load_room_list(&self) -> Result<Vec<RoomSummary>, SdkError> {
        self.take_injected_failure()?;
        let state = self
            .state
            .read()
            .map_err(|_| SdkError::Backend("poisoned lock".to_owned()))?;
        Ok(state.rooms.clone())
    }

    async fn get_rooms_info(&self, room_ids: &[u64]) -> Result<HashMap<u64, RoomInfo>, SdkError> {
        self.take_injected_failure()?;
        let state = self
            .state
            .read()
            .map_err(|_| SdkError::Backend("poisoned lock".to_owned()))?;
        Ok(room_ids
            .iter()
            .filter_map(|room_id| {
                state.unread.get(room_id).map(|count| {
                    (
                        *room_id,
                        RoomInfo {
                            unread_count: *count,
                        },
                    )
                })
            })
            .collect())
    }

    async fn load_comments(
        &self,
        room_id: u64,
        before: Option<u64>,
    ) -> Result<CommentBatch, SdkError> {
        self.take_injected_failure()?;
        let state = self
            .state
            .read()
            .map_err(|_| SdkError::Backend("poisoned lock".to_owned()))?;
        let history = state.comments.get(&room_id).ok_or(SdkError::NotFound)?;

        let eligible: Vec<&Message> = match before {
            Some(anchor) => history
                .iter()
                .filter(|message| message.server_id.is_some_and(|id| id < anchor))
                .collect(),
            None => history.iter().collect(),
        };
        let start = eligible.len().saturating_sub(PAGE_SIZE);
        Ok(CommentBatch {
            messages: eligible[start..].iter().map(|m| (*m).clone()).collect(),
            has_more_before: start > 0,
        })
    }

    async fn send_comment(
        &self,
        room_id: u64,
        local_id: &str,
        payload: MessagePayload,
    ) -> Result<Message, SdkError> {
        self.take_injected_failure()?;
        let mut state = self
            .state
            .write()
            .map_err(|_| SdkError::Backend("poisoned lock".to_owned()))?;
        if !state.rooms.iter().any(|room| room.id == room_id) {
            return Err(SdkError::NotFound);
        }

        let server_id = state.next_server_id;
        state.next_server_id += 1;
        state.clock_ms += 1_000;
        let message = Message {
            local_id: Some(local_id.to_owned()),
            server_id: Some(server_id),
            room_id,
            sender: self.user_id.clone(),
            timestamp_ms: state.clock_ms,
            status: MessageStatus::Sent,
            payload,
        };

        state
            .comments
            .entry(room_id)
            .or_default()
            .push(message.clone());
        if let Some(room) = state.rooms.iter_mut().find(|room| room.id == room_id) {
            room.last_comment_id = server_id;
            room.last_message_preview = message.preview_body().to_owned();
            room.last_activity_at_ms = message.timestamp_ms;
        }
        Ok(message)
    }

    async fn upload_attachment(
        &self,
        source: &AttachmentSource,
    ) -> Result<AttachmentUpload, SdkError> {
        self.take_injected_failure()?;
        Ok(AttachmentUpload {
            url: format!("https://cdn.example.org/uploads/{}", source.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: u64, last_comment_id: u64) -> RoomSummary {
        RoomSummary {
            id,
            name: format!("room-{id}"),
            avatar_url: None,
            unread_count: 0,
            last_message_preview: String::new(),
            last_activity_at_ms: 0,
            last_comment_id,
        }
    }

    fn history_message(room_id: u64, server_id: u64) -> Message {
        Message {
            local_id: None,
            server_id: Some(server_id),
            room_id,
            sender: "bob@example.org".to_owned(),
            timestamp_ms: server_id * 10,
            status: MessageStatus::Sent,
            payload: MessagePayload::Text {
                body: format!("m{server_id}"),
            },
        }
    }

    #[tokio::test]
    async fn pages_history_backwards_with_predecessor_flag() {
        let sdk = InMemoryChatSdk::new("alice@example.org");
        let history: Vec<Message> = (1..=45).map(|id| history_message(7, id)).collect();
        sdk.seed_room(summary(7, 45), history);

        let newest = sdk.load_comments(7, None).await.expect("newest page");
        assert_eq!(newest.messages.len(), PAGE_SIZE);
        assert_eq!(newest.messages[0].server_id, Some(26));
        assert!(newest.has_more_before);

        let older = sdk.load_comments(7, Some(26)).await.expect("older page");
        assert_eq!(older.messages[0].server_id, Some(6));
        assert_eq!(older.messages.last().unwrap().server_id, Some(25));
        assert!(older.has_more_before);

        let oldest = sdk.load_comments(7, Some(6)).await.expect("oldest page");
        assert_eq!(oldest.messages.len(), 5);
        assert!(!oldest.has_more_before);
    }

    #[tokio::test]
    async fn send_echoes_local_id_and_assigns_increasing_server_ids() {
        let sdk = InMemoryChatSdk::new("alice@example.org");
        sdk.seed_room(summary(7, 45), vec![history_message(7, 45)]);

        let first = sdk
            .send_comment(
                7,
                "L1",
                MessagePayload::Text {
                    body: "hi".to_owned(),
                },
            )
            .await
            .expect("send should work");
        assert_eq!(first.local_id.as_deref(), Some("L1"));
        assert_eq!(first.server_id, Some(46));
        assert_eq!(first.status, MessageStatus::Sent);

        let second = sdk
            .send_comment(
                7,
                "L2",
                MessagePayload::Text {
                    body: "again".to_owned(),
                },
            )
            .await
            .expect("send should work");
        assert!(second.server_id > first.server_id);
        assert!(second.timestamp_ms > first.timestamp_ms);
    }

    #[tokio::test]
    async fn unknown_rooms_are_not_found() {
        let sdk = InMemoryChatSdk::new("alice@example.org");
        assert_eq!(
            sdk.load_comments(99, None).await,
            Err(SdkError::NotFound)
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let sdk = InMemoryChatSdk::new("alice@example.org");
        sdk.seed_room(summary(7, 0), Vec::new());
        sdk.inject_failure(SdkError::Unavailable("offline".to_owned()));

        assert_eq!(
            sdk.load_room_list().await,
            Err(SdkError::Unavailable("offline".to_owned()))
        );
        assert!(sdk.load_room_list().await.is_ok());
    }

    #[tokio::test]
    async fn bulk_info_skips_unknown_rooms() {
        let sdk = InMemoryChatSdk::new("alice@example.org");
        sdk.set_unread(7, 3);

        let info = sdk.get_rooms_info(&[7, 9]).await.expect("bulk info");
        assert_eq!(info.get(&7), Some(&RoomInfo { unread_count: 3 }));
        assert!(!info.contains_key(&9));
    }

    #[test]
    fn sdk_errors_map_to_stable_client_errors() {
        let err: ClientError = SdkError::Http(429).into();
        assert_eq!(err.category, ClientErrorCategory::RateLimited);
        assert_eq!(err.code, "http_status");

        let err: ClientError = SdkError::Unavailable("offline".to_owned()).into();
        assert_eq!(err.category, ClientErrorCategory::Network);
    }
}
