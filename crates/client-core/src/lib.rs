//! Reconciliation core for the roostchat client.
//!
//! Keeps a local view of "messages in a room" and "rooms with unread
//! counts" correct and idempotent under a stream of asynchronous events
//! that can arrive out of order or redundantly. The chat SDK itself is an
//! external collaborator; this crate only defines the state machines it
//! feeds.

/// Attachment validation and optimistic upload messages.
pub mod attachment;
/// Command/event channel primitives.
pub mod channel;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Per-room message reconciliation.
pub mod message_store;
/// Presence roster fed by SDK presence events.
pub mod presence;
/// Backoff policy used by reload loops.
pub mod retry;
/// Room-list ordering and unread-count reconciliation.
pub mod room_index;
/// Debounced typing indicator.
pub mod typing;
/// Protocol types shared across the SDK, runtime, and UI boundaries.
pub mod types;

pub use attachment::{AttachmentError, AttachmentSource};
pub use channel::{ClientChannelError, ClientChannels, EventStream};
pub use error::{ClientError, ClientErrorCategory, classify_http_status};
pub use message_store::{MessageStore, MessageStoreError};
pub use presence::{PresenceRoster, PresenceState};
pub use retry::RetryPolicy;
pub use room_index::{RoomIndex, RoomUpdateOutcome, merge_unread_counts};
pub use typing::TypingIndicator;
pub use types::{
    ChatEvent, ClientCommand, ClientEvent, Message, MessagePayload, MessageStatus, RoomInfo,
    RoomSummary, SendAck,
};
