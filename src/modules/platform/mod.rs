//! Bindings to whatever actually shows notifications.
//!
//! The gateway only talks to [`NotificationPlatform`]; listeners are plain
//! channel senders, so platform callbacks never touch shared state directly.

mod desktop;
mod simulated;

pub use desktop::DesktopPlatform;
pub use simulated::SimulatedPlatform;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

use crate::modules::history::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Delivered,
    Opened,
}

/// What the caller wants shown.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub data: Option<Payload>,
}

/// A notification as reported back by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformNotification {
    pub request_id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<Payload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformEvent {
    pub kind: EventKind,
    pub notification: PlatformNotification,
}

pub type EventSink = mpsc::UnboundedSender<PlatformEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("notification service unavailable: {0}")]
    Unavailable(String),
    #[error("could not obtain push token: {0}")]
    Token(String),
    #[error("could not show notification: {0}")]
    Schedule(String),
}

#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Emulators and headless hosts report `false`.
    fn is_physical_device(&self) -> bool;

    /// Short name shown in the control panel.
    fn label(&self) -> &'static str;

    async fn permission_status(&self) -> Result<PermissionStatus, PlatformError>;

    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError>;

    async fn get_or_create_token(&self, project_id: &str) -> Result<Option<String>, PlatformError>;

    /// Shows `content` right away and returns the platform request identifier.
    async fn schedule_immediate(&self, content: NotificationContent) -> Result<String, PlatformError>;

    fn add_delivered_listener(&self, sink: EventSink) -> ListenerHandle;

    fn add_opened_listener(&self, sink: EventSink) -> ListenerHandle;

    fn remove_listener(&self, handle: ListenerHandle);
}

/// Listener bookkeeping shared by the platform implementations.
#[derive(Debug, Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerHandle, EventKind, EventSink)>>,
}

impl Listeners {
    pub fn add(&self, kind: EventKind, sink: EventSink) -> ListenerHandle {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, kind, sink));
        handle
    }

    pub fn remove(&self, handle: ListenerHandle) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(h, _, _)| *h != handle);
    }

    /// Sends the event to every listener of `kind`, dropping listeners whose receiver is gone.
    pub fn emit(&self, kind: EventKind, notification: &PlatformNotification) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(handle, k, sink)| {
            if *k != kind {
                return true;
            }
            let event = PlatformEvent { kind, notification: notification.clone() };
            let alive = sink.send(event).is_ok();
            if !alive {
                trace!(?handle, "dropping closed listener");
            }
            alive
        });
    }

    #[cfg(test)]
    pub fn count(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: &str) -> PlatformNotification {
        PlatformNotification {
            request_id: id.to_string(),
            title: Some("t".into()),
            body: None,
            data: None,
        }
    }

    #[test]
    fn emit_reaches_only_matching_kind() {
        let listeners = Listeners::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        listeners.add(EventKind::Opened, tx);

        listeners.emit(EventKind::Delivered, &notification("1"));
        assert!(rx.try_recv().is_err());

        listeners.emit(EventKind::Opened, &notification("2"));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Opened);
        assert_eq!(event.notification.request_id, "2");
    }

    #[test]
    fn removed_and_closed_listeners_are_forgotten() {
        let listeners = Listeners::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let kept = listeners.add(EventKind::Delivered, tx.clone());
        listeners.add(EventKind::Delivered, tx);
        assert_eq!(listeners.count(), 2);

        listeners.remove(kept);
        assert_eq!(listeners.count(), 1);

        drop(rx);
        listeners.emit(EventKind::Delivered, &notification("x"));
        assert_eq!(listeners.count(), 0);
    }
}
