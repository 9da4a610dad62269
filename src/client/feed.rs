//! In-memory notification list kept by a stream consumer

use crate::models::Notification;
use std::collections::VecDeque;

pub const DEFAULT_FEED_CAPACITY: usize = 20;

/// Newest first, at most `capacity` entries, one entry per id.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    items: VecDeque<Notification>,
    capacity: usize,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a live notification. Returns false for an id already present.
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.contains(notification.id) {
            return false;
        }
        self.items.push_front(notification);
        self.items.truncate(self.capacity);
        true
    }

    /// Replace the contents with a fetched history (any order).
    pub fn replace(&mut self, mut notifications: Vec<Notification>) {
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.items.clear();
        for notification in notifications {
            if !self.contains(notification.id) {
                self.items.push_back(notification);
            }
            if self.items.len() == self.capacity {
                break;
            }
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    pub fn mark_read(&mut self, id: i64) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        self.items.iter_mut().for_each(|n| n.is_read = true);
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn notification(id: i64) -> Notification {
        Notification {
            id,
            user_id: 1,
            kind: NotificationKind::System,
            title: format!("#{}", id),
            message: String::new(),
            link: None,
            is_read: false,
            created_at: Utc::now() + Duration::seconds(id),
        }
    }

    fn ids(feed: &NotificationFeed) -> Vec<i64> {
        feed.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_newest_first_and_capped() {
        let mut feed = NotificationFeed::new();
        for id in 1..=25 {
            feed.push(notification(id));
        }
        assert_eq!(feed.len(), DEFAULT_FEED_CAPACITY);
        assert_eq!(ids(&feed).first(), Some(&25));
        assert_eq!(ids(&feed).last(), Some(&6));
    }

    #[test]
    fn test_duplicate_ids_are_dropped() {
        let mut feed = NotificationFeed::new();
        assert!(feed.push(notification(1)));
        assert!(!feed.push(notification(1)));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn test_replace_sorts_and_caps_history() {
        let mut feed = NotificationFeed::with_capacity(3);
        feed.replace(vec![notification(2), notification(5), notification(1), notification(4)]);
        assert_eq!(ids(&feed), vec![5, 4, 2]);
    }

    #[test]
    fn test_read_tracking() {
        let mut feed = NotificationFeed::new();
        feed.push(notification(1));
        feed.push(notification(2));
        assert_eq!(feed.unread_count(), 2);

        assert!(feed.mark_read(1));
        assert!(!feed.mark_read(99));
        assert_eq!(feed.unread_count(), 1);

        feed.mark_all_read();
        assert_eq!(feed.unread_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_feed_never_exceeds_capacity_or_repeats(
            pushes in proptest::collection::vec(0i64..50, 0..100),
            capacity in 1usize..30,
        ) {
            let mut feed = NotificationFeed::with_capacity(capacity);
            for id in &pushes {
                feed.push(notification(*id));
            }

            let seen = ids(&feed);
            prop_assert!(seen.len() <= capacity);
            let mut unique = seen.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), seen.len());
            prop_assert!(seen.iter().all(|id| pushes.contains(id)));
        }
    }
}
