/// Reconciliation store: canonical in-memory notification state
///
/// Owns the visible window, the unread counter and the set of every
/// identifier this instance has seen. Push events and snapshots go through
/// the same union-based novelty check (`absorb`), so an identifier is reported
/// as newly observed at most once no matter which channel delivers it first
/// or how often it is redelivered.
///
/// Every operation is synchronous: callers await I/O first, then apply the
/// result here in one step.
use crate::models::{Notification, NotificationId, NotificationView};
use crate::store::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Undo record for an optimistic local mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationUndo {
    MarkRead {
        id: NotificationId,
        previous: Option<ReadState>,
        decremented: u64,
    },
    MarkAllRead {
        previous: Vec<(NotificationId, ReadState)>,
        decremented: u64,
    },
    Remove {
        removed: Option<Notification>,
        decremented: u64,
    },
}

impl MutationUndo {
    /// The target was not in the visible window, so the counter was left
    /// untouched and only a fresh snapshot can settle it.
    pub fn is_outside_window(&self) -> bool {
        match self {
            MutationUndo::MarkRead { previous, .. } => previous.is_none(),
            MutationUndo::Remove { removed, .. } => removed.is_none(),
            MutationUndo::MarkAllRead { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl ReadState {
    fn of(notification: &Notification) -> Self {
        Self {
            is_read: notification.is_read,
            read_at: notification.read_at,
        }
    }

    fn restore(self, notification: &mut Notification) {
        notification.is_read = self.is_read;
        notification.read_at = self.read_at;
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationStore {
    visible: Vec<Notification>,
    unread_count: u64,
    known: HashSet<NotificationId>,
    limit: usize,
}

impl ReconciliationStore {
    pub fn new(limit: usize) -> Self {
        Self {
            visible: Vec::with_capacity(limit),
            unread_count: 0,
            known: HashSet::new(),
            limit: limit.max(1),
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.visible
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_known(&self, id: &NotificationId) -> bool {
        self.known.contains(id)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    pub fn view(&self, loading: bool) -> NotificationView {
        NotificationView {
            notifications: self.visible.clone(),
            unread_count: self.unread_count,
            loading,
        }
    }

    /// Replace visible state with an authoritative snapshot.
    ///
    /// The known set only ever grows; identifiers missing from `snapshot` are
    /// not forgotten. Returns identifiers seen for the first time, in snapshot
    /// order.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Vec<NotificationId> {
        let mut notifications = snapshot.notifications;
        let newly_observed = self.absorb(notifications.iter().map(|n| &n.id));

        // Stable: equal timestamps keep the collaborator's order
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(self.limit);

        self.visible = notifications;
        self.unread_count = snapshot.unread_count;
        newly_observed
    }

    /// Incorporate a single realtime insert.
    ///
    /// Already-known identifiers are ignored, including ones that fell out of
    /// the visible window. A record that arrives already read is shown but
    /// leaves the unread counter alone. Returns the identifier when it is new.
    pub fn apply_push_event(&mut self, notification: Notification) -> Option<NotificationId> {
        let newly_observed = self.absorb(std::iter::once(&notification.id));
        let id = newly_observed.into_iter().next()?;

        if !notification.is_read {
            self.unread_count += 1;
        }
        self.visible.insert(0, notification);
        self.visible.truncate(self.limit);
        Some(id)
    }

    /// Optimistically mark one notification read.
    pub fn mark_read(&mut self, id: &NotificationId, at: DateTime<Utc>) -> MutationUndo {
        let mut previous = None;
        let mut decremented = 0;

        if let Some(notification) = self.visible.iter_mut().find(|n| &n.id == id) {
            previous = Some(ReadState::of(notification));
            if !notification.is_read {
                notification.mark_read(at);
                decremented = self.decrement(1);
            }
        }

        MutationUndo::MarkRead {
            id: id.clone(),
            previous,
            decremented,
        }
    }

    /// Optimistically mark everything read; the counter drops to zero.
    pub fn mark_all_read(&mut self, at: DateTime<Utc>) -> MutationUndo {
        let mut previous = Vec::new();
        for notification in self.visible.iter_mut().filter(|n| !n.is_read) {
            previous.push((notification.id.clone(), ReadState::of(notification)));
            notification.mark_read(at);
        }
        let decremented = self.decrement(self.unread_count);

        MutationUndo::MarkAllRead {
            previous,
            decremented,
        }
    }

    /// Optimistically drop a notification from the window.
    ///
    /// The identifier stays known so a late redelivery cannot resurrect it.
    pub fn remove(&mut self, id: &NotificationId) -> MutationUndo {
        let removed = self
            .visible
            .iter()
            .position(|n| &n.id == id)
            .map(|index| self.visible.remove(index));

        let decremented = match &removed {
            Some(notification) if !notification.is_read => self.decrement(1),
            _ => 0,
        };

        MutationUndo::Remove {
            removed,
            decremented,
        }
    }

    /// Revert an optimistic mutation whose store call failed.
    ///
    /// Applied as a delta so that pushes merged in the meantime survive.
    pub fn rollback(&mut self, undo: MutationUndo) {
        match undo {
            MutationUndo::MarkRead {
                id,
                previous,
                decremented,
            } => {
                if let (Some(state), Some(notification)) =
                    (previous, self.visible.iter_mut().find(|n| n.id == id))
                {
                    state.restore(notification);
                }
                self.unread_count += decremented;
            }
            MutationUndo::MarkAllRead {
                previous,
                decremented,
            } => {
                for (id, state) in previous {
                    if let Some(notification) = self.visible.iter_mut().find(|n| n.id == id) {
                        state.restore(notification);
                    }
                }
                self.unread_count += decremented;
            }
            MutationUndo::Remove {
                removed,
                decremented,
            } => {
                if let Some(notification) = removed {
                    self.reinsert(notification);
                }
                self.unread_count += decremented;
            }
        }
    }

    /// Union `ids` into the known set, returning the ones not seen before.
    fn absorb<'a>(&mut self, ids: impl Iterator<Item = &'a NotificationId>) -> Vec<NotificationId> {
        ids.filter(|id| self.known.insert((*id).clone()))
            .cloned()
            .collect()
    }

    fn decrement(&mut self, by: u64) -> u64 {
        let applied = by.min(self.unread_count);
        self.unread_count -= applied;
        applied
    }

    // Put a removed notification back at its newest-first position
    fn reinsert(&mut self, notification: Notification) {
        if self.visible.iter().any(|n| n.id == notification.id) {
            return;
        }
        let index = self
            .visible
            .iter()
            .position(|n| n.created_at < notification.created_at)
            .unwrap_or(self.visible.len());
        self.visible.insert(index, notification);
        self.visible.truncate(self.limit);
    }
}
