use async_trait::async_trait;
use notify_rust::{Notification, Timeout};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    EventKind, EventSink, ListenerHandle, Listeners, NotificationContent, NotificationPlatform,
    PermissionStatus, PlatformError, PlatformNotification,
};

const APP_NAME: &str = "pushdeck";
#[cfg(all(unix, not(target_os = "macos")))]
const OPEN_ACTION: &str = "default";

/// Desktop notifications through notify-rust.
///
/// Desktops have no push service, so the token is derived from the project id
/// and the host name. It is stable across runs on the same machine.
#[derive(Debug, Default)]
pub struct DesktopPlatform {
    permission: Mutex<Option<PermissionStatus>>,
    listeners: Arc<Listeners>,
}

impl DesktopPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached_permission(&self) -> Option<PermissionStatus> {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_permission(&self, status: PermissionStatus) {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }
}

#[async_trait]
impl NotificationPlatform for DesktopPlatform {
    fn is_physical_device(&self) -> bool {
        true
    }

    fn label(&self) -> &'static str {
        "desktop"
    }

    async fn permission_status(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(self.cached_permission().unwrap_or(PermissionStatus::Undetermined))
    }

    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError> {
        let status = tokio::task::spawn_blocking(probe_notification_server)
            .await
            .map_err(|e| PlatformError::Unavailable(e.to_string()))?;
        self.store_permission(status);
        Ok(status)
    }

    async fn get_or_create_token(&self, project_id: &str) -> Result<Option<String>, PlatformError> {
        let host = hostname::get().map_err(|e| PlatformError::Token(e.to_string()))?;
        let seed = format!("{}:{}", project_id, host.to_string_lossy());
        let token = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        Ok(Some(format!("DesktopPushToken[{}]", token)))
    }

    async fn schedule_immediate(&self, content: NotificationContent) -> Result<String, PlatformError> {
        let request_id = Uuid::new_v4().to_string();
        let notification = PlatformNotification {
            request_id: request_id.clone(),
            title: Some(content.title.clone()),
            body: Some(content.body.clone()),
            data: content.data.clone(),
        };

        let handle = tokio::task::spawn_blocking(move || {
            let mut builder = Notification::new();
            builder
                .summary(&content.title)
                .body(&content.body)
                .appname(APP_NAME)
                .timeout(Timeout::Default);
            #[cfg(all(unix, not(target_os = "macos")))]
            builder.action(OPEN_ACTION, "Open");
            builder.show()
        })
        .await
        .map_err(|e| PlatformError::Schedule(e.to_string()))?
        .map_err(|e| PlatformError::Schedule(e.to_string()))?;

        debug!(%request_id, "desktop notification shown");
        self.listeners.emit(EventKind::Delivered, &notification);

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let listeners = Arc::clone(&self.listeners);
            tokio::task::spawn_blocking(move || {
                handle.wait_for_action(|action| {
                    if action == OPEN_ACTION {
                        listeners.emit(EventKind::Opened, &notification);
                    }
                });
            });
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        drop(handle);

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

#[cfg(all(unix, not(target_os = "macos")))]
fn probe_notification_server() -> PermissionStatus {
    match notify_rust::get_server_information() {
        Ok(server) => {
            info!(name = %server.name, vendor = %server.vendor, "notification server found");
            PermissionStatus::Granted
        }
        Err(e) => {
            warn!("no notification server answered: {}", e);
            PermissionStatus::Denied
        }
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn probe_notification_server() -> PermissionStatus {
    info!("desktop notifications need no permission on this platform");
    PermissionStatus::Granted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_is_stable_per_project() {
        let platform = DesktopPlatform::new();
        let a = platform.get_or_create_token("project-a").await.unwrap().unwrap();
        let again = platform.get_or_create_token("project-a").await.unwrap().unwrap();
        let b = platform.get_or_create_token("project-b").await.unwrap().unwrap();
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert!(a.starts_with("DesktopPushToken["));
    }

    #[tokio::test]
    async fn permission_starts_undetermined() {
        let platform = DesktopPlatform::new();
        assert_eq!(platform.permission_status().await.unwrap(), PermissionStatus::Undetermined);
    }
}
