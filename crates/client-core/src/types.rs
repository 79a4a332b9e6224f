use serde::{Deserialize, Serialize};

use crate::attachment::AttachmentSource;

/// Delivery status of a single message.
///
/// Statuses only move forward along `Sending → Sent → Delivered → Read`;
/// `Failed` is terminal and reachable from `Sending` or `Sent` only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageStatus {
    /// Created locally, not yet acknowledged by the SDK.
    Sending,
    /// Persisted server-side, server id assigned.
    Sent,
    /// Delivered to the recipient's device.
    Delivered,
    /// Read by the recipient.
    Read,
    /// The SDK rejected the send; the record stays visible for manual retry.
    Failed,
}

impl MessageStatus {
    fn rank(self) -> Option<u8> {
        match self {
            MessageStatus::Sending => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Read => Some(3),
            MessageStatus::Failed => None,
        }
    }

    /// Whether a record in this status may take on `next`.
    ///
    /// Equal statuses are allowed so that replayed events stay no-ops.
    pub fn can_become(self, next: MessageStatus) -> bool {
        match (self.rank(), next.rank()) {
            (None, _) => false,
            (Some(_), None) => matches!(self, MessageStatus::Sending | MessageStatus::Sent),
            (Some(current), Some(next)) => next >= current,
        }
    }

    /// Advance to `next` when the transition is legal. Returns whether the
    /// status actually changed.
    pub fn advance_to(&mut self, next: MessageStatus) -> bool {
        if *self != next && self.can_become(next) {
            *self = next;
            return true;
        }
        false
    }
}

/// Message content variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessagePayload {
    /// Plain text message.
    Text {
        /// Message body.
        body: String,
    },
    /// Optimistic attachment message shown while the upload is in flight.
    PendingUpload {
        /// Placeholder body shown in lists and previews.
        body: String,
        /// Local file URI being uploaded.
        file_uri: String,
    },
    /// Custom typed message carrying an opaque JSON payload, used for
    /// completed attachment sends.
    Custom {
        /// Placeholder body shown in lists and previews.
        body: String,
        /// Payload discriminator, for example `image`.
        kind: String,
        /// Opaque payload content.
        content: serde_json::Value,
    },
}

impl MessagePayload {
    /// Display body shared by every payload variant.
    pub fn body(&self) -> &str {
        match self {
            MessagePayload::Text { body }
            | MessagePayload::PendingUpload { body, .. }
            | MessagePayload::Custom { body, .. } => body,
        }
    }
}

/// One message record as held by the reconciliation core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Client-generated temporary id, assigned at creation and never reused.
    /// Present on every locally-created record; the SDK echoes it back.
    pub local_id: Option<String>,
    /// Server-assigned id, absent until the SDK confirms persistence.
    pub server_id: Option<u64>,
    /// Owning room, immutable after creation.
    pub room_id: u64,
    /// Author identifier.
    pub sender: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Current delivery status.
    pub status: MessageStatus,
    /// Message content.
    pub payload: MessagePayload,
}

impl Message {
    /// Whether the record carries at least one usable identity.
    pub fn has_identity(&self) -> bool {
        self.local_id.is_some() || self.server_id.is_some()
    }

    /// Identity rule: same logical message iff the local ids match, or both
    /// carry a server id and those match.
    pub fn same_message(&self, other: &Message) -> bool {
        if let (Some(a), Some(b)) = (self.local_id.as_deref(), other.local_id.as_deref())
            && a == b
        {
            return true;
        }
        matches!(
            (self.server_id, other.server_id),
            (Some(a), Some(b)) if a == b
        )
    }

    /// Display body used for room previews.
    pub fn preview_body(&self) -> &str {
        self.payload.body()
    }
}

/// Denormalized room metadata for room lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSummary {
    /// Server-side room id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Avatar URL when the server provides one.
    pub avatar_url: Option<String>,
    /// Unread badge count.
    pub unread_count: u64,
    /// Body of the most recent message.
    pub last_message_preview: String,
    /// Last activity time used for ordering, milliseconds since epoch.
    pub last_activity_at_ms: u64,
    /// Server-side id of the newest comment at fetch time.
    pub last_comment_id: u64,
}

/// Per-room detail returned by the bulk room-info endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    /// Authoritative unread count.
    pub unread_count: u64,
}

/// Inbound push event from the chat SDK.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatEvent {
    /// A new message arrived in some room.
    NewMessage(Message),
    /// Messages at or before the cutoff were delivered.
    MessageDelivered {
        /// Target room.
        room_id: u64,
        /// Cutoff time in milliseconds since epoch.
        cutoff_ms: u64,
    },
    /// Messages at or before the cutoff were read.
    MessageRead {
        /// Target room.
        room_id: u64,
        /// Cutoff time in milliseconds since epoch.
        cutoff_ms: u64,
    },
    /// A peer's online presence changed.
    Presence {
        /// Peer user id.
        user_id: String,
        /// Whether the peer is currently online.
        is_online: bool,
        /// Last time the peer was seen online, milliseconds since epoch.
        last_online_ms: u64,
    },
    /// A peer is typing in a room.
    Typing {
        /// Target room.
        room_id: u64,
        /// Typing peer's display name.
        username: String,
    },
}

/// Imperative command accepted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientCommand {
    /// Reload the room list and bulk unread counts.
    RefreshRooms,
    /// Load the newest page of a room and start tracking it.
    OpenRoom {
        /// Target room.
        room_id: u64,
    },
    /// Load one more page of history before the earliest known message.
    LoadOlder {
        /// Target room.
        room_id: u64,
    },
    /// Send a text message.
    SendText {
        /// Target room.
        room_id: u64,
        /// Message body.
        body: String,
    },
    /// Validate, upload, and send an attachment.
    SendAttachment {
        /// Target room.
        room_id: u64,
        /// Picked attachment.
        source: AttachmentSource,
    },
    /// Zero a room's unread badge.
    MarkRead {
        /// Target room.
        room_id: u64,
    },
}

/// Acknowledgement for a send attempt, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendAck {
    /// Local id of the optimistic record.
    pub local_id: String,
    /// Server id on success.
    pub server_id: Option<u64>,
    /// Stable error code on failure.
    pub error_code: Option<String>,
}

/// State change published by the runtime for UI consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientEvent {
    /// Full room list replacement, most recently active first.
    RoomListUpdated {
        /// Latest room summaries.
        rooms: Vec<RoomSummary>,
    },
    /// A room finished loading its newest page.
    RoomOpened {
        /// Target room.
        room_id: u64,
        /// Messages ascending by timestamp.
        messages: Vec<Message>,
        /// Whether older history remains before the earliest message.
        has_more_before: bool,
    },
    /// A tracked room's message view changed.
    MessagesUpdated {
        /// Target room.
        room_id: u64,
        /// Messages ascending by timestamp.
        messages: Vec<Message>,
        /// Whether older history remains before the earliest message.
        has_more_before: bool,
    },
    /// A send attempt resolved.
    SendAck(SendAck),
    /// An attachment was rejected before any message was created.
    AttachmentRejected {
        /// Target room.
        room_id: u64,
        /// Human-readable rejection reason.
        reason: String,
    },
    /// A peer's presence changed.
    PresenceChanged {
        /// Peer user id.
        user_id: String,
        /// Whether the peer is currently online.
        is_online: bool,
        /// Last seen time, milliseconds since epoch.
        last_online_ms: u64,
    },
    /// The typing indicator for the open room changed.
    TypingChanged {
        /// Target room.
        room_id: u64,
        /// Typing peer, or `None` when the indicator cleared.
        username: Option<String>,
    },
    /// An initial load, pagination, or room-list reload failed. Prior state
    /// is left intact.
    LoadFailed {
        /// Affected room, or `None` for the room list.
        room_id: Option<u64>,
        /// Stable error code.
        code: String,
    },
}
