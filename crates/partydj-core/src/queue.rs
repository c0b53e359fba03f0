//! Queue ordering and duplicate detection

use partydj_api::{NowPlaying, QueueItem, SearchHit, SubmitOutcome, SubmitRejection};
use partydj_util::{EpochMillis, ItemId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Play order: highest score first, then earliest added, then id
pub fn play_order(a: &QueueItem, b: &QueueItem) -> Ordering {
    b.vote_score
        .cmp(&a.vote_score)
        .then(a.added_at.cmp(&b.added_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// The item that plays next, if any
pub fn select_next<'a, I>(queue: I) -> Option<&'a QueueItem>
where
    I: IntoIterator<Item = &'a QueueItem>,
{
    queue.into_iter().min_by(|a, b| play_order(a, b))
}

/// Queue items sorted into play order
pub fn sorted_queue<'a, I>(queue: I) -> Vec<QueueItem>
where
    I: IntoIterator<Item = &'a QueueItem>,
{
    let mut items: Vec<QueueItem> = queue.into_iter().cloned().collect();
    items.sort_by(play_order);
    items
}

/// Items currently queued by `submitter`
pub fn queued_by<'a, I>(queue: I, submitter: &str) -> usize
where
    I: IntoIterator<Item = &'a QueueItem>,
{
    queue
        .into_iter()
        .filter(|item| item.added_by == submitter)
        .count()
}

/// Add a video to the queue, or upvote it if it is already queued or
/// playing.
///
/// A new entry starts at score 1. A submitter who already has
/// `max_per_user` entries queued is refused and nothing changes.
pub fn submit_or_upvote(
    queue: &mut BTreeMap<ItemId, QueueItem>,
    now_playing: Option<&mut NowPlaying>,
    hit: &SearchHit,
    submitter: &str,
    max_per_user: u32,
    now: EpochMillis,
) -> SubmitOutcome {
    if hit.video_id.trim().is_empty() {
        return SubmitOutcome::Rejected {
            reason: SubmitRejection::InvalidVideo,
        };
    }

    let item_id = ItemId::youtube(&hit.video_id);

    if let Some(existing) = queue.get_mut(&item_id) {
        existing.vote_score = existing.vote_score.saturating_add(1);
        return SubmitOutcome::Upvoted {
            item_id,
            vote_score: existing.vote_score,
        };
    }

    if let Some(playing) = now_playing
        && playing.item.id == item_id
    {
        playing.item.vote_score = playing.item.vote_score.saturating_add(1);
        return SubmitOutcome::Upvoted {
            item_id,
            vote_score: playing.item.vote_score,
        };
    }

    if queued_by(queue.values(), submitter) >= max_per_user as usize {
        return SubmitOutcome::Rejected {
            reason: SubmitRejection::PerUserLimit {
                limit: max_per_user,
            },
        };
    }

    let item = QueueItem::from_hit(hit, submitter, now);
    queue.insert(item_id.clone(), item);
    SubmitOutcome::Added { item_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, score: i64, added_at: EpochMillis) -> QueueItem {
        QueueItem {
            id: ItemId::youtube(id),
            video_id: id.into(),
            title: id.into(),
            thumbnail: None,
            added_by: "Ana".into(),
            vote_score: score,
            added_at,
        }
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            video_id: id.into(),
            title: format!("Song {}", id),
            thumbnail: None,
            channel: None,
        }
    }

    #[test]
    fn highest_score_plays_next() {
        let queue = [item("A", 2, 100), item("B", 2, 50), item("C", 3, 200)];
        assert_eq!(select_next(&queue).unwrap().video_id, "C");
    }

    #[test]
    fn earlier_submission_breaks_ties() {
        let queue = [item("A", 1, 100), item("B", 1, 50)];
        assert_eq!(select_next(&queue).unwrap().video_id, "B");

        let sorted = sorted_queue(&queue);
        assert_eq!(sorted[0].video_id, "B");
        assert_eq!(sorted[1].video_id, "A");
    }

    #[test]
    fn empty_queue_has_no_next() {
        let queue: [QueueItem; 0] = [];
        assert!(select_next(&queue).is_none());
    }

    #[test]
    fn duplicate_submission_upvotes() {
        let mut queue = BTreeMap::new();
        let first = submit_or_upvote(&mut queue, None, &hit("abc"), "Ana", 3, 10);
        assert_eq!(
            first,
            SubmitOutcome::Added {
                item_id: ItemId::youtube("abc")
            }
        );

        let second = submit_or_upvote(&mut queue, None, &hit("abc"), "Ana", 3, 20);
        assert_eq!(
            second,
            SubmitOutcome::Upvoted {
                item_id: ItemId::youtube("abc"),
                vote_score: 2
            }
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn submitting_the_playing_video_upvotes_it() {
        let mut queue = BTreeMap::new();
        let mut playing = NowPlaying {
            item: item("abc", 1, 0),
            started_at: 5,
        };
        let outcome = submit_or_upvote(&mut queue, Some(&mut playing), &hit("abc"), "Ben", 3, 10);
        assert!(matches!(outcome, SubmitOutcome::Upvoted { vote_score: 2, .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn upvotes_saturate_at_the_maximum_score() {
        let mut queue = BTreeMap::new();
        queue.insert(ItemId::youtube("abc"), item("abc", i64::MAX, 10));
        assert_eq!(
            submit_or_upvote(&mut queue, None, &hit("abc"), "Ben", 3, 20),
            SubmitOutcome::Upvoted {
                item_id: ItemId::youtube("abc"),
                vote_score: i64::MAX
            }
        );
    }

    #[test]
    fn per_user_limit_rejects_without_change() {
        let mut queue = BTreeMap::new();
        for id in ["a", "b", "c"] {
            submit_or_upvote(&mut queue, None, &hit(id), "Ana", 3, 1);
        }
        let before = queue.clone();

        let outcome = submit_or_upvote(&mut queue, None, &hit("d"), "Ana", 3, 2);
        assert_eq!(
            outcome,
            SubmitOutcome::Rejected {
                reason: SubmitRejection::PerUserLimit { limit: 3 }
            }
        );
        assert_eq!(queue, before);

        // Upvoting an existing item is still allowed at the limit
        let outcome = submit_or_upvote(&mut queue, None, &hit("a"), "Ana", 3, 3);
        assert!(matches!(outcome, SubmitOutcome::Upvoted { .. }));

        // Other submitters are unaffected
        let outcome = submit_or_upvote(&mut queue, None, &hit("d"), "Ben", 3, 4);
        assert!(matches!(outcome, SubmitOutcome::Added { .. }));
    }

    #[test]
    fn blank_video_id_is_rejected() {
        let mut queue = BTreeMap::new();
        let outcome = submit_or_upvote(&mut queue, None, &hit("  "), "Ana", 3, 1);
        assert_eq!(
            outcome,
            SubmitOutcome::Rejected {
                reason: SubmitRejection::InvalidVideo
            }
        );
    }
}
