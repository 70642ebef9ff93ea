use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::{
    EventKind, EventSink, ListenerHandle, Listeners, NotificationContent, NotificationPlatform,
    PermissionStatus, PlatformError, PlatformNotification,
};

/// In-memory platform. Backs the `emulator` device mode and the tests.
///
/// Every scheduled notification is echoed to delivered listeners, the same way
/// a real device reports its own local notifications.
#[derive(Debug)]
pub struct SimulatedPlatform {
    physical: bool,
    grant_on_request: bool,
    token: Option<String>,
    permission: Mutex<PermissionStatus>,
    fail_delivery: AtomicBool,
    next_request: AtomicU64,
    scheduled: Mutex<Vec<NotificationContent>>,
    listeners: Arc<Listeners>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            physical: true,
            grant_on_request: true,
            token: Some("SimulatedPushToken[local]".to_string()),
            permission: Mutex::new(PermissionStatus::Undetermined),
            fail_delivery: AtomicBool::new(false),
            next_request: AtomicU64::new(1),
            scheduled: Mutex::new(Vec::new()),
            listeners: Arc::new(Listeners::default()),
        }
    }

    /// An emulator: permission and token requests are refused before reaching the platform.
    pub fn emulator() -> Self {
        Self { physical: false, token: None, ..Self::new() }
    }

    pub fn current_permission(&self) -> PermissionStatus {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPlatform for SimulatedPlatform {
    fn is_physical_device(&self) -> bool {
        self.physical
    }

    fn label(&self) -> &'static str {
        if self.physical { "simulated device" } else { "emulator" }
    }

    async fn permission_status(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(self.current_permission())
    }

    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError> {
        let status = if self.grant_on_request {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = status;
        Ok(status)
    }

    async fn get_or_create_token(&self, project_id: &str) -> Result<Option<String>, PlatformError> {
        debug!(project_id, "simulated token request");
        Ok(self.token.clone())
    }

    async fn schedule_immediate(&self, content: NotificationContent) -> Result<String, PlatformError> {
        if self.fail_delivery.load(Ordering::Relaxed) {
            return Err(PlatformError::Schedule("simulated delivery failure".to_string()));
        }
        let request_id = format!("sim-{}", self.next_request.fetch_add(1, Ordering::Relaxed));
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(content.clone());
        self.listeners.emit(
            EventKind::Delivered,
            &PlatformNotification {
                request_id: request_id.clone(),
                title: Some(content.title),
                body: Some(content.body),
                data: content.data,
            },
        );
        Ok(request_id)
    }

    fn add_delivered_listener(&self, sink: EventSink) -> ListenerHandle {
        self.listeners.add(EventKind::Delivered, sink)
    }

    fn add_opened_listener(&self, sink: EventSink) -> ListenerHandle {
        self.listeners.add(EventKind::Opened, sink)
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        self.listeners.remove(handle);
    }
}

/// Knobs for driving the simulation from tests.
#[cfg(test)]
impl SimulatedPlatform {
    pub fn denying_permission(mut self) -> Self {
        self.grant_on_request = false;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn set_delivery_failure(&self, fail: bool) {
        self.fail_delivery.store(fail, Ordering::Relaxed);
    }

    pub fn emit_delivered(&self, notification: PlatformNotification) {
        self.listeners.emit(EventKind::Delivered, &notification);
    }

    pub fn emit_opened(&self, notification: PlatformNotification) {
        self.listeners.emit(EventKind::Opened, &notification);
    }

    pub fn scheduled(&self) -> Vec<NotificationContent> {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.count()
    }
}
