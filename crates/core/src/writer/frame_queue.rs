use std::collections::VecDeque;
use std::path::PathBuf;

use crate::shared::encoded_data::EncodedData;
use crate::shared::eyes::Eyes;
use crate::writer::queue_item::{ItemKey, Payload, QueueItem, QueueKind};

/// The last unit committed to one reel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReelCursor {
    pub last_frame: Option<i64>,
    pub last_eyes: Eyes,
}

impl Default for ReelCursor {
    fn default() -> Self {
        // `Right` so that the first stereo unit expected is a `Left`.
        Self {
            last_frame: None,
            last_eyes: Eyes::Right,
        }
    }
}

impl ReelCursor {
    pub fn new(last_frame: Option<i64>, last_eyes: Eyes) -> Self {
        Self {
            last_frame,
            last_eyes,
        }
    }

    fn next_frame(&self) -> i64 {
        self.last_frame.map_or(0, |f| f + 1)
    }

    /// Whether `(frame, eyes)` is the next unit this reel expects.
    pub fn accepts(&self, frame: i64, eyes: Eyes) -> bool {
        match eyes {
            Eyes::Both => frame == self.next_frame(),
            Eyes::Left => self.last_eyes == Eyes::Right && frame == self.next_frame(),
            Eyes::Right => self.last_eyes == Eyes::Left && Some(frame) == self.last_frame,
        }
    }

    pub fn advance(&mut self, frame: i64, eyes: Eyes) {
        self.last_frame = Some(frame);
        self.last_eyes = eyes;
    }
}

/// Pending video units, kept sorted by `(reel, frame, eyes)`.
#[derive(Debug, Default)]
pub struct FrameQueue {
    items: VecDeque<QueueItem>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Inserts after any items with an equal key, so arrival order breaks ties.
    pub fn push(&mut self, item: QueueItem) {
        let key = item.key();
        let index = self.items.partition_point(|existing| existing.key() <= key);
        self.items.insert(index, item);
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    /// True if the head is the next unit its reel expects.
    pub fn head_is_committable(&self, cursors: &[ReelCursor]) -> bool {
        self.head().is_some_and(|head| {
            cursors
                .get(head.reel)
                .is_some_and(|cursor| cursor.accepts(head.frame, head.eyes))
        })
    }

    pub fn pop_committable(&mut self, cursors: &[ReelCursor]) -> Option<QueueItem> {
        if self.head_is_committable(cursors) {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// The most recently queued full frame still held in memory.
    ///
    /// Frames near the tail are the furthest from being committed, so they
    /// are the cheapest to evict.
    pub fn spill_candidate(&self) -> Option<(ItemKey, EncodedData)> {
        self.items.iter().rev().find_map(|item| match &item.kind {
            QueueKind::Full(Payload::InMemory(data)) => Some((item.key(), data.clone())),
            _ => None,
        })
    }

    /// Replaces the in-memory payload of the item with `key` by a file
    /// reference. Returns false if no such in-memory item is queued.
    pub fn mark_spilled(&mut self, key: ItemKey, path: PathBuf, len: u64) -> bool {
        match self
            .items
            .iter_mut()
            .find(|item| item.key() == key && item.is_in_memory())
        {
            Some(item) => {
                item.kind = QueueKind::Full(Payload::Spilled { path, len });
                true
            }
            None => false,
        }
    }

    /// Number of full frames held in memory.
    pub fn in_memory(&self) -> usize {
        self.items.iter().filter(|item| item.is_in_memory()).count()
    }

    pub fn drain(&mut self) -> Vec<QueueItem> {
        self.items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn repeat(reel: usize, frame: i64, eyes: Eyes) -> QueueItem {
        QueueItem::new(QueueKind::Repeat, reel, frame, eyes)
    }

    fn full(frame: i64, byte: u8) -> QueueItem {
        QueueItem::new(
            QueueKind::Full(Payload::InMemory(EncodedData::new(vec![byte; 4]))),
            0,
            frame,
            Eyes::Both,
        )
    }

    #[rstest]
    #[case::first_mono(ReelCursor::default(), 0, Eyes::Both, true)]
    #[case::gap_mono(ReelCursor::default(), 1, Eyes::Both, false)]
    #[case::next_mono(ReelCursor::new(Some(4), Eyes::Both), 5, Eyes::Both, true)]
    #[case::stale_mono(ReelCursor::new(Some(4), Eyes::Both), 4, Eyes::Both, false)]
    #[case::first_left(ReelCursor::default(), 0, Eyes::Left, true)]
    #[case::first_right(ReelCursor::default(), 0, Eyes::Right, false)]
    #[case::right_after_left(ReelCursor::new(Some(3), Eyes::Left), 3, Eyes::Right, true)]
    #[case::right_wrong_frame(ReelCursor::new(Some(3), Eyes::Left), 4, Eyes::Right, false)]
    #[case::left_after_left(ReelCursor::new(Some(3), Eyes::Left), 4, Eyes::Left, false)]
    #[case::left_after_right(ReelCursor::new(Some(3), Eyes::Right), 4, Eyes::Left, true)]
    #[case::left_skips(ReelCursor::new(Some(3), Eyes::Right), 5, Eyes::Left, false)]
    fn test_cursor_accepts(
        #[case] cursor: ReelCursor,
        #[case] frame: i64,
        #[case] eyes: Eyes,
        #[case] expected: bool,
    ) {
        assert_eq!(cursor.accepts(frame, eyes), expected);
    }

    #[test]
    fn test_push_keeps_sorted_order() {
        let mut queue = FrameQueue::new();
        queue.push(repeat(1, 0, Eyes::Both));
        queue.push(repeat(0, 2, Eyes::Right));
        queue.push(repeat(0, 2, Eyes::Left));
        queue.push(repeat(0, 0, Eyes::Left));

        let keys: Vec<_> = queue.iter().map(QueueItem::key).collect();
        assert_eq!(
            keys,
            vec![
                (0, 0, Eyes::Left),
                (0, 2, Eyes::Left),
                (0, 2, Eyes::Right),
                (1, 0, Eyes::Both),
            ]
        );
    }

    #[test]
    fn test_pop_committable_in_order() {
        let mut queue = FrameQueue::new();
        let mut cursors = vec![ReelCursor::default()];
        for frame in [2, 0, 3, 1] {
            queue.push(repeat(0, frame, Eyes::Both));
        }

        let mut committed = Vec::new();
        while let Some(item) = queue.pop_committable(&cursors) {
            cursors[0].advance(item.frame, item.eyes);
            committed.push(item.frame);
        }
        assert_eq!(committed, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_gap_blocks_head() {
        let mut queue = FrameQueue::new();
        let cursors = vec![ReelCursor::new(Some(6), Eyes::Both)];
        queue.push(repeat(0, 8, Eyes::Both));
        assert!(!queue.head_is_committable(&cursors));
        assert!(queue.pop_committable(&cursors).is_none());
    }

    #[test]
    fn test_spill_candidate_is_tail_most_in_memory_full() {
        let mut queue = FrameQueue::new();
        queue.push(full(1, 1));
        queue.push(full(3, 3));
        queue.push(repeat(0, 5, Eyes::Both));

        let (key, data) = queue.spill_candidate().unwrap();
        assert_eq!(key, (0, 3, Eyes::Both));
        assert_eq!(data.data(), &[3, 3, 3, 3]);

        assert!(queue.mark_spilled(key, PathBuf::from("/tmp/0_3_both.j2c"), 4));
        assert_eq!(queue.in_memory(), 1);
        assert_eq!(queue.spill_candidate().unwrap().0, (0, 1, Eyes::Both));
    }

    #[test]
    fn test_mark_spilled_missing_item() {
        let mut queue = FrameQueue::new();
        queue.push(repeat(0, 0, Eyes::Both));
        assert!(!queue.mark_spilled((0, 0, Eyes::Both), PathBuf::from("/tmp/x"), 1));
        assert!(queue.spill_candidate().is_none());
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = FrameQueue::new();
        queue.push(full(8, 8));
        queue.push(full(9, 9));
        let leftovers = queue.drain();
        assert_eq!(leftovers.len(), 2);
        assert!(queue.is_empty());
    }
}
