use thiserror::Error;
use tracing::{debug, trace};

use crate::types::{Message, MessageStatus};

/// Errors that can occur while mutating a room's message store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageStoreError {
    /// A confirm/fail referenced a local id the store does not hold.
    #[error("no message with local id '{0}' in this room")]
    UnknownLocalId(String),
    /// The record carries neither a local nor a server id.
    #[error("message carries neither a local nor a server id")]
    MissingIdentity,
    /// A locally-created record must carry a local id.
    #[error("locally-created message is missing its local id")]
    MissingLocalId,
    /// The record names a different room than the one this store owns.
    #[error("message belongs to room {actual}, store owns room {expected}")]
    RoomMismatch {
        /// Room this store owns.
        expected: u64,
        /// Room named by the record.
        actual: u64,
    },
}

/// Per-room message state: merges optimistic and authoritative records,
/// applies status transitions, and supports backward pagination.
///
/// Every mutation is either an overwrite keyed by stable identity or a
/// monotonic status advance, so applying the same event twice equals
/// applying it once. One logical owner mutates the store at a time; reads
/// hand out snapshots.
#[derive(Debug, Clone)]
pub struct MessageStore {
    room_id: u64,
    records: Vec<Message>,
    has_more_before: bool,
}

impl MessageStore {
    /// Create an empty store for one room.
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            records: Vec::new(),
            has_more_before: false,
        }
    }

    /// Room this store owns.
    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    /// Whether older history remains before the earliest loaded message.
    pub fn has_more_before(&self) -> bool {
        self.has_more_before
    }

    /// Number of records currently held, failed sends included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace all state with a freshly-loaded newest page.
    pub fn initialize(&mut self, initial_batch: Vec<Message>, has_more_before: bool) {
        self.records.clear();
        for message in initial_batch {
            if message.room_id != self.room_id || !message.has_identity() {
                trace!(room_id = self.room_id, "dropping foreign or id-less record from initial batch");
                continue;
            }
            self.merge_record(message, false);
        }
        self.has_more_before = has_more_before;
        debug!(
            room_id = self.room_id,
            record_count = self.records.len(),
            has_more_before,
            "message store initialized"
        );
    }

    /// Insert an optimistic record for a just-submitted message and return
    /// its local id. The record enters in `Sending` status; the caller is
    /// expected to follow up with [`confirm_send`](Self::confirm_send) or
    /// [`mark_send_failed`](Self::mark_send_failed).
    pub fn apply_local_send(&mut self, mut message: Message) -> Result<String, MessageStoreError> {
        let local_id = message
            .local_id
            .clone()
            .ok_or(MessageStoreError::MissingLocalId)?;
        if message.room_id != self.room_id {
            return Err(MessageStoreError::RoomMismatch {
                expected: self.room_id,
                actual: message.room_id,
            });
        }
        message.status = MessageStatus::Sending;
        self.merge_record(message, false);
        Ok(local_id)
    }

    /// Replace the record keyed by `local_id` with the SDK-confirmed record,
    /// retaining `local_id` as the lookup key so later updates by either id
    /// resolve to one record. Status never regresses: a read receipt that
    /// raced ahead of the confirmation wins.
    pub fn confirm_send(
        &mut self,
        local_id: &str,
        server_record: Message,
    ) -> Result<(), MessageStoreError> {
        if server_record.room_id != self.room_id {
            return Err(MessageStoreError::RoomMismatch {
                expected: self.room_id,
                actual: server_record.room_id,
            });
        }
        let index = self
            .position_by_local_id(local_id)
            .ok_or_else(|| MessageStoreError::UnknownLocalId(local_id.to_owned()))?;

        let existing = &self.records[index];
        let mut merged = server_record;
        merged.local_id = Some(local_id.to_owned());
        let mut status = existing.status;
        status.advance_to(merged.status);
        merged.status = status;
        self.records[index] = merged;
        Ok(())
    }

    /// Mark the record keyed by `local_id` as failed. Returns whether the
    /// status changed; a record already past `Sent` is left untouched.
    pub fn mark_send_failed(&mut self, local_id: &str) -> Result<bool, MessageStoreError> {
        let index = self
            .position_by_local_id(local_id)
            .ok_or_else(|| MessageStoreError::UnknownLocalId(local_id.to_owned()))?;
        Ok(self.records[index].status.advance_to(MessageStatus::Failed))
    }

    /// Merge one pushed message by identity: overwrite mutable fields of an
    /// existing record without regressing its status, or insert as new.
    /// Messages for other rooms are dropped. Returns whether state changed.
    pub fn apply_inbound(&mut self, message: Message) -> Result<bool, MessageStoreError> {
        if message.room_id != self.room_id {
            trace!(
                store_room_id = self.room_id,
                message_room_id = message.room_id,
                "ignoring inbound message for another room"
            );
            return Ok(false);
        }
        if !message.has_identity() {
            return Err(MessageStoreError::MissingIdentity);
        }
        Ok(self.merge_record(message, false))
    }

    /// Advance `Sending`/`Sent` records at or before the cutoff to
    /// `Delivered`. Returns the number of records that changed.
    pub fn apply_delivery_cutoff(&mut self, cutoff_ms: u64) -> usize {
        let mut changed = 0;
        for record in &mut self.records {
            if record.timestamp_ms <= cutoff_ms
                && matches!(record.status, MessageStatus::Sending | MessageStatus::Sent)
                && record.status.advance_to(MessageStatus::Delivered)
            {
                changed += 1;
            }
        }
        changed
    }

    /// Advance records at or before the cutoff to `Read`. Failed sends are
    /// terminal and stay failed. Returns the number of records that changed.
    pub fn apply_read_cutoff(&mut self, cutoff_ms: u64) -> usize {
        let mut changed = 0;
        for record in &mut self.records {
            if record.timestamp_ms <= cutoff_ms && record.status.advance_to(MessageStatus::Read) {
                changed += 1;
            }
        }
        changed
    }

    /// Prepend a page of older history, merging by identity. An incoming
    /// record never lowers the status of one the store already holds.
    /// Returns the number of records inserted or changed.
    pub fn merge_older_batch(
        &mut self,
        batch: Vec<Message>,
        has_more_before: bool,
    ) -> Result<usize, MessageStoreError> {
        let mut changed = 0;
        // Insert in reverse so the batch's own oldest-first order survives
        // at the front of the buffer.
        for message in batch.into_iter().rev() {
            if message.room_id != self.room_id {
                trace!(
                    store_room_id = self.room_id,
                    message_room_id = message.room_id,
                    "ignoring paged message for another room"
                );
                continue;
            }
            if !message.has_identity() {
                return Err(MessageStoreError::MissingIdentity);
            }
            if self.merge_record(message, true) {
                changed += 1;
            }
        }
        self.has_more_before = has_more_before;
        Ok(changed)
    }

    /// Snapshot of all records ascending by timestamp. The sort is stable,
    /// so records with equal timestamps keep insertion order and an
    /// optimistic record stays where its confirmation replaced it.
    pub fn ordered_view(&self) -> Vec<Message> {
        let mut view = self.records.clone();
        view.sort_by_key(|record| record.timestamp_ms);
        view
    }

    /// Earliest server-assigned id currently held, used as the pagination
    /// anchor for loading older history.
    pub fn earliest_server_id(&self) -> Option<u64> {
        self.records
            .iter()
            .filter_map(|record| record.server_id.map(|id| (record.timestamp_ms, id)))
            .min()
            .map(|(_, id)| id)
    }

    fn position_by_local_id(&self, local_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.local_id.as_deref() == Some(local_id))
    }

    fn position_of(&self, message: &Message) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.same_message(message))
    }

    /// Merge by identity; insert at the front for paged history, at the back
    /// otherwise. Returns whether state changed.
    fn merge_record(&mut self, message: Message, insert_front: bool) -> bool {
        match self.position_of(&message) {
            Some(index) => {
                let existing = &self.records[index];
                let mut incoming = message;
                if incoming.local_id.is_none() {
                    incoming.local_id = existing.local_id.clone();
                }
                if incoming.server_id.is_none() {
                    incoming.server_id = existing.server_id;
                }
                let mut status = existing.status;
                status.advance_to(incoming.status);
                incoming.status = status;

                let changed = self.records[index] != incoming;
                self.records[index] = incoming;
                changed
            }
            None if insert_front => {
                self.records.insert(0, message);
                true
            }
            None => {
                self.records.push(message);
                true
            }
        }
    }
}
