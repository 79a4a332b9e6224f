use std::collections::{HashMap, HashSet};

use tracing::{debug, trace, warn};

use crate::types::{Message, RoomInfo, RoomSummary};

/// Result of folding one pushed message into the room index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomUpdateOutcome {
    /// The room's unread count, preview, and position were updated.
    Applied,
    /// The message id was at or below the processed high-water mark.
    IgnoredDuplicate,
    /// The message names a room the index does not hold; the caller must
    /// perform a full reload instead of fabricating an entry.
    ReloadRequired,
}

#[derive(Debug, Clone)]
struct RoomEntry {
    summary: RoomSummary,
    processed_ids: HashSet<u64>,
}

/// Room list ordered by recency, reconciling authoritative unread counts
/// from the bulk room-info endpoint with per-push local increments.
///
/// The duplicate guard compares incoming server ids against a single
/// high-water mark across all rooms. The guard is coarse: with an id scheme
/// that interleaves rooms, an increment in one room can suppress a later
/// legitimate increment in another.
#[derive(Debug, Clone, Default)]
pub struct RoomIndex {
    rooms: Vec<RoomEntry>,
    high_water_mark: u64,
}

impl RoomIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest processed message id across all rooms.
    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    /// Whether the index holds the room.
    pub fn contains(&self, room_id: u64) -> bool {
        self.rooms.iter().any(|entry| entry.summary.id == room_id)
    }

    /// Authoritative wholesale replace from a fresh room-list fetch.
    ///
    /// Unread counts in `rooms` are ground truth and override any local
    /// increments. Each room's processed set restarts at its
    /// `last_comment_id` mark; the global high-water mark keeps its old
    /// value when that is higher, so ids processed before the reload stay
    /// rejected.
    pub fn load_all(&mut self, rooms: Vec<RoomSummary>) {
        let fetched_mark = rooms
            .iter()
            .map(|summary| summary.last_comment_id)
            .max()
            .unwrap_or(0);
        self.high_water_mark = self.high_water_mark.max(fetched_mark);
        self.rooms = rooms
            .into_iter()
            .map(|summary| {
                let processed_ids = if summary.last_comment_id > 0 {
                    HashSet::from([summary.last_comment_id])
                } else {
                    HashSet::new()
                };
                RoomEntry {
                    summary,
                    processed_ids,
                }
            })
            .collect();
        debug!(
            room_count = self.rooms.len(),
            high_water_mark = self.high_water_mark,
            "room index replaced"
        );
    }

    /// Fold one pushed message into the index: bump the unread badge, update
    /// the preview and activity time, and move the room to the front.
    pub fn apply_inbound(&mut self, message: &Message) -> RoomUpdateOutcome {
        let Some(message_id) = message.server_id else {
            warn!(room_id = message.room_id, "pushed message has no server id");
            return RoomUpdateOutcome::IgnoredDuplicate;
        };
        if message_id <= self.high_water_mark {
            trace!(
                message_id,
                high_water_mark = self.high_water_mark,
                "ignoring already-processed message id"
            );
            return RoomUpdateOutcome::IgnoredDuplicate;
        }

        let Some(position) = self
            .rooms
            .iter()
            .position(|entry| entry.summary.id == message.room_id)
        else {
            debug!(room_id = message.room_id, "pushed message names an unknown room");
            return RoomUpdateOutcome::ReloadRequired;
        };

        let mut entry = self.rooms.remove(position);
        entry.summary.unread_count += 1;
        entry.summary.last_message_preview = message.preview_body().to_owned();
        entry.summary.last_activity_at_ms = message.timestamp_ms;
        entry.processed_ids.insert(message_id);
        self.rooms.insert(0, entry);
        self.high_water_mark = message_id;
        RoomUpdateOutcome::Applied
    }

    /// Zero a room's unread badge, typically when the user opens it.
    /// Returns whether the count changed.
    pub fn mark_read(&mut self, room_id: u64) -> bool {
        let Some(entry) = self
            .rooms
            .iter_mut()
            .find(|entry| entry.summary.id == room_id)
        else {
            return false;
        };
        let changed = entry.summary.unread_count != 0;
        entry.summary.unread_count = 0;
        changed
    }

    /// Snapshot of the current ordering, most recently active first.
    pub fn ordered_view(&self) -> Vec<RoomSummary> {
        self.rooms.iter().map(|entry| entry.summary.clone()).collect()
    }
}

/// Overlay authoritative unread counts from the bulk room-info endpoint
/// onto freshly-listed rooms. Rooms the endpoint did not report keep their
/// listed count.
pub fn merge_unread_counts(
    rooms: Vec<RoomSummary>,
    info: &HashMap<u64, RoomInfo>,
) -> Vec<RoomSummary> {
    rooms
        .into_iter()
        .map(|mut summary| {
            if let Some(detail) = info.get(&summary.id) {
                summary.unread_count = detail.unread_count;
            }
            summary
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessagePayload, MessageStatus};

    fn room(id: u64, name: &str, last_comment_id: u64) -> RoomSummary {
        RoomSummary {
            id,
            name: name.to_owned(),
            avatar_url: None,
            unread_count: 0,
            last_message_preview: String::new(),
            last_activity_at_ms: 1_000,
            last_comment_id,
        }
    }

    fn pushed(room_id: u64, server_id: u64, body: &str) -> Message {
        Message {
            local_id: None,
            server_id: Some(server_id),
            room_id,
            sender: "bob@example.org".to_owned(),
            timestamp_ms: 2_000,
            status: MessageStatus::Sent,
            payload: MessagePayload::Text {
                body: body.to_owned(),
            },
        }
    }

    #[test]
    fn new_activity_moves_room_to_front_and_increments_once() {
        let mut index = RoomIndex::new();
        index.load_all(vec![room(1, "one", 400), room(2, "two", 500)]);

        assert_eq!(index.apply_inbound(&pushed(2, 501, "hi")), RoomUpdateOutcome::Applied);

        let view = index.ordered_view();
        assert_eq!(view[0].id, 2);
        assert_eq!(view[0].unread_count, 1);
        assert_eq!(view[0].last_message_preview, "hi");
        assert_eq!(view[1].id, 1);
    }

    #[test]
    fn duplicate_message_id_increments_only_once() {
        let mut index = RoomIndex::new();
        index.load_all(vec![room(2, "two", 500)]);

        assert_eq!(index.apply_inbound(&pushed(2, 501, "hi")), RoomUpdateOutcome::Applied);
        assert_eq!(
            index.apply_inbound(&pushed(2, 501, "hi")),
            RoomUpdateOutcome::IgnoredDuplicate
        );
        assert_eq!(index.ordered_view()[0].unread_count, 1);
    }

    #[test]
    fn ids_at_or_below_the_fetch_mark_are_stale() {
        let mut index = RoomIndex::new();
        index.load_all(vec![room(1, "one", 500)]);

        assert_eq!(
            index.apply_inbound(&pushed(1, 500, "replayed")),
            RoomUpdateOutcome::IgnoredDuplicate
        );
        assert_eq!(index.ordered_view()[0].unread_count, 0);
    }

    #[test]
    fn unknown_room_requests_a_full_reload() {
        let mut index = RoomIndex::new();
        index.load_all(vec![room(1, "one", 400)]);

        assert_eq!(
            index.apply_inbound(&pushed(9, 401, "hi")),
            RoomUpdateOutcome::ReloadRequired
        );
        assert!(!index.contains(9));
    }

    #[test]
    fn reload_overrides_local_increments_but_keeps_the_mark() {
        let mut index = RoomIndex::new();
        index.load_all(vec![room(1, "one", 400)]);
        index.apply_inbound(&pushed(1, 450, "hi"));
        assert_eq!(index.ordered_view()[0].unread_count, 1);

        // Bulk endpoint reports the authoritative count; its fetch mark is
        // older than the locally-processed id.
        let mut refreshed = room(1, "one", 420);
        refreshed.unread_count = 3;
        index.load_all(vec![refreshed]);

        let view = index.ordered_view();
        assert_eq!(view[0].unread_count, 3);
        assert_eq!(index.high_water_mark(), 450);
        assert_eq!(
            index.apply_inbound(&pushed(1, 450, "replayed")),
            RoomUpdateOutcome::IgnoredDuplicate
        );
    }

    #[test]
    fn guard_is_global_across_rooms() {
        // Preserved imprecision: the high-water mark is room-agnostic, so a
        // lower id in another room is treated as already processed.
        let mut index = RoomIndex::new();
        index.load_all(vec![room(1, "one", 0), room(2, "two", 0)]);

        assert_eq!(index.apply_inbound(&pushed(1, 600, "a")), RoomUpdateOutcome::Applied);
        assert_eq!(
            index.apply_inbound(&pushed(2, 550, "b")),
            RoomUpdateOutcome::IgnoredDuplicate
        );
        let view = index.ordered_view();
        assert_eq!(view.iter().find(|r| r.id == 2).unwrap().unread_count, 0);
    }

    #[test]
    fn mark_read_zeroes_the_badge() {
        let mut index = RoomIndex::new();
        index.load_all(vec![room(1, "one", 0)]);
        index.apply_inbound(&pushed(1, 10, "a"));
        index.apply_inbound(&pushed(1, 11, "b"));

        assert!(index.mark_read(1));
        assert!(!index.mark_read(1));
        assert_eq!(index.ordered_view()[0].unread_count, 0);
    }

    #[test]
    fn merge_unread_counts_overlays_bulk_details() {
        let rooms = vec![room(1, "one", 0), room(2, "two", 0)];
        let info = HashMap::from([(2, RoomInfo { unread_count: 5 })]);

        let merged = merge_unread_counts(rooms, &info);
        assert_eq!(merged[0].unread_count, 0);
        assert_eq!(merged[1].unread_count, 5);
    }
}
