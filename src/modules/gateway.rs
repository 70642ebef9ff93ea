use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::modules::history::{
    NotificationHistory, NotificationRecord, Payload, now_millis,
};
use crate::modules::platform::{
    EventKind, ListenerHandle, NotificationContent, NotificationPlatform, PermissionStatus,
    PlatformEvent,
};

/// Every gateway failure. The UI turns these into status messages; none of them is fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("push notifications only work on a physical device")]
    NotPhysicalDevice,
    #[error("notifications are disabled, enable them in the system settings")]
    PermissionDenied,
    #[error("push token unavailable: {0}")]
    TokenUnavailable(String),
    #[error("failed to send local notification: {0}")]
    DeliveryFailure(String),
}

/// The consumer task owns the receiving end; it exits once both listeners are removed
/// and whatever they already queued has been recorded.
struct Registration {
    delivered: ListenerHandle,
    opened: ListenerHandle,
}

/// Front door to the notification platform. Owns the listener registration and
/// feeds every delivered, opened or locally sent notification into the history.
pub struct NotificationGateway {
    platform: Arc<dyn NotificationPlatform>,
    history: NotificationHistory,
    project_id: String,
    registration: Mutex<Option<Registration>>,
}

impl NotificationGateway {
    pub fn new(
        platform: Arc<dyn NotificationPlatform>,
        history: NotificationHistory,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            history,
            project_id: project_id.into(),
            registration: Mutex::new(None),
        }
    }

    pub fn platform_label(&self) -> &'static str {
        self.platform.label()
    }

    pub fn is_physical_device(&self) -> bool {
        self.platform.is_physical_device()
    }

    pub async fn request_permission(&self) -> Result<(), GatewayError> {
        if !self.platform.is_physical_device() {
            warn!("permission request refused: not a physical device");
            return Err(GatewayError::NotPhysicalDevice);
        }

        let existing = self.platform.permission_status().await.map_err(|e| {
            error!("failed to read permission status: {}", e);
            GatewayError::PermissionDenied
        })?;

        let status = if existing == PermissionStatus::Granted {
            existing
        } else {
            self.platform.request_permission().await.map_err(|e| {
                error!("permission request failed: {}", e);
                GatewayError::PermissionDenied
            })?
        };

        if status != PermissionStatus::Granted {
            info!(?status, "notification permission not granted");
            return Err(GatewayError::PermissionDenied);
        }
        Ok(())
    }

    pub async fn fetch_push_token(&self) -> Result<String, GatewayError> {
        if !self.platform.is_physical_device() {
            info!("push tokens are only issued to physical devices");
            return Err(GatewayError::NotPhysicalDevice);
        }

        match self.platform.get_or_create_token(&self.project_id).await {
            Ok(Some(token)) => {
                info!(%token, "push token obtained");
                Ok(token)
            }
            Ok(None) => Err(GatewayError::TokenUnavailable("platform issued no token".to_string())),
            Err(e) => {
                error!("failed to fetch push token: {}", e);
                Err(GatewayError::TokenUnavailable(e.to_string()))
            }
        }
    }

    /// Attaches delivered and opened listeners. Calling it again replaces the
    /// previous registration, so each event is recorded once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_event_handlers(&self) {
        let mut registration = self.lock_registration();
        if let Some(previous) = registration.take() {
            debug!("replacing existing event handlers");
            self.detach(previous);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let delivered = self.platform.add_delivered_listener(tx.clone());
        let opened = self.platform.add_opened_listener(tx);
        tokio::spawn(record_events(rx, self.history.clone()));

        *registration = Some(Registration { delivered, opened });
        info!("notification event handlers registered");
    }

    pub fn handlers_registered(&self) -> bool {
        self.lock_registration().is_some()
    }

    pub async fn send_local_notification(
        &self,
        title: &str,
        body: &str,
        data: Option<Payload>,
    ) -> Result<(), GatewayError> {
        let content = NotificationContent {
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
        };

        let request_id = self.platform.schedule_immediate(content).await.map_err(|e| {
            error!("failed to send local notification: {}", e);
            GatewayError::DeliveryFailure(e.to_string())
        })?;

        if self.handlers_registered() {
            // The delivered listener records this one.
            debug!(%request_id, "local notification left to the delivered handler");
        } else {
            let id = now_millis().to_string();
            self.history.insert(NotificationRecord::new(
                id,
                Some(title.to_string()),
                Some(body.to_string()),
                data,
            ));
            debug!(%request_id, "local notification recorded");
        }
        Ok(())
    }

    /// Topics are not supported by the platform; the call is only acknowledged.
    pub async fn subscribe_to_topic(&self, topic: &str) -> Result<(), GatewayError> {
        info!(topic, "subscribed to topic (simulated)");
        Ok(())
    }

    pub async fn unsubscribe_from_topic(&self, topic: &str) -> Result<(), GatewayError> {
        info!(topic, "unsubscribed from topic (simulated)");
        Ok(())
    }

    pub fn teardown(&self) {
        if let Some(registration) = self.lock_registration().take() {
            self.detach(registration);
            info!("notification event handlers removed");
        }
    }

    pub fn history(&self) -> Vec<NotificationRecord> {
        self.history.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&self) {
        self.history.clear();
        info!("notification history cleared");
    }

    fn detach(&self, registration: Registration) {
        self.platform.remove_listener(registration.delivered);
        self.platform.remove_listener(registration.opened);
    }

    fn lock_registration(&self) -> std::sync::MutexGuard<'_, Option<Registration>> {
        self.registration.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NotificationGateway {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn record_events(mut rx: mpsc::UnboundedReceiver<PlatformEvent>, history: NotificationHistory) {
    while let Some(event) = rx.recv().await {
        let n = event.notification;
        match event.kind {
            EventKind::Delivered => info!(id = %n.request_id, "notification received"),
            EventKind::Opened => info!(id = %n.request_id, "notification opened"),
        }
        history.insert(NotificationRecord::new(n.request_id, n.title, n.body, n.data));
    }
    debug!("event channel closed");
}
