use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{attendance::StudentId, error::TrackerError};

/// Oldest notifications are dropped beyond this many.
pub const FEED_CAPACITY: usize = 50;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Pickup,
    Drop,
    Delay,
    General,
    Alert,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub notification_id: u64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    /// Set when the notification concerns one child; `None` reaches every parent on the bus.
    pub student_id: Option<StudentId>,
}

impl Notification {
    fn visible_to(&self, student_id: Option<&str>) -> bool {
        match (student_id, self.student_id.as_deref()) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(about)) => wanted == about,
        }
    }
}

/// Newest-first feed of one vehicle's notifications.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    items: VecDeque<Notification>,
    next_id: u64,
    capacity: usize,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    pub fn push(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        student_id: Option<StudentId>,
    ) -> Notification {
        let notification = Notification {
            notification_id: self.next_id,
            kind,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            read: false,
            student_id,
        };
        self.next_id += 1;
        tracing::debug!("Notification {}: {}", notification.notification_id, notification.title);

        self.items.push_front(notification.clone());
        self.items.truncate(self.capacity);
        notification
    }

    /// Notifications a parent of `student_id` sees, or all of them for `None`.
    pub fn items(&self, student_id: Option<&str>) -> Vec<Notification> {
        self.items.iter().filter(|n| n.visible_to(student_id)).cloned().collect()
    }

    pub fn unread_count(&self, student_id: Option<&str>) -> usize {
        self.items.iter().filter(|n| !n.read && n.visible_to(student_id)).count()
    }

    pub fn mark_read(&mut self, notification_id: u64) -> Result<Notification, TrackerError> {
        let notification = self
            .items
            .iter_mut()
            .find(|n| n.notification_id == notification_id)
            .ok_or_else(|| TrackerError::NotFound(format!("notification {notification_id}")))?;
        notification.read = true;
        Ok(notification.clone())
    }

    /// Returns how many notifications changed.
    pub fn mark_all_read(&mut self, student_id: Option<&str>) -> usize {
        let mut changed = 0;
        for notification in self.items.iter_mut().filter(|n| !n.read && n.visible_to(student_id)) {
            notification.read = true;
            changed += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> NotificationFeed {
        let mut feed = NotificationFeed::default();
        feed.push(NotificationKind::General, "Trip started", "Bus is on its way", None);
        feed.push(NotificationKind::Pickup, "Aarav boarded", "Picked up at Falnir Road", Some("c1".into()));
        feed.push(NotificationKind::Alert, "Diya absent", "Not at Bejai", Some("c2".into()));
        feed
    }

    #[test]
    fn newest_first_and_filtered_per_child() {
        let feed = feed();
        let titles: Vec<_> = feed.items(None).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, ["Diya absent", "Aarav boarded", "Trip started"]);

        let for_c1: Vec<_> = feed.items(Some("c1")).into_iter().map(|n| n.notification_id).collect();
        assert_eq!(for_c1, [2, 1]);
        assert_eq!(feed.unread_count(Some("c2")), 2);
    }

    #[test]
    fn mark_read_and_mark_all() {
        let mut feed = feed();
        assert!(feed.mark_read(1).unwrap().read);
        assert!(matches!(feed.mark_read(99), Err(TrackerError::NotFound(_))));

        assert_eq!(feed.mark_all_read(Some("c1")), 1);
        assert_eq!(feed.unread_count(None), 1);
        assert_eq!(feed.mark_all_read(None), 1);
        assert_eq!(feed.mark_all_read(None), 0);
    }

    #[test]
    fn oldest_are_dropped_past_capacity() {
        let mut feed = NotificationFeed::new(2);
        for i in 0..4 {
            feed.push(NotificationKind::Delay, format!("Delay {i}"), "Traffic", None);
        }
        let ids: Vec<_> = feed.items(None).into_iter().map(|n| n.notification_id).collect();
        assert_eq!(ids, [4, 3]);
    }

    #[test]
    fn kinds_serialize_lowercase() {
        let json = serde_json::to_value(&feed().items(None)[0]).unwrap();
        assert_eq!(json["kind"], "alert");
        assert_eq!(json["read"], false);
    }
}
