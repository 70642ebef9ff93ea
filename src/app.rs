use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, DeviceKind};
use crate::logging::LogError;
use crate::modules::gateway::NotificationGateway;
use crate::modules::history::{NotificationHistory, NotificationRecord, Payload, now_millis};
use crate::modules::platform::{DesktopPlatform, NotificationPlatform, SimulatedPlatform};

pub const TEST_TITLE: &str = "Test notification";
pub const TEST_BODY: &str = "This is a local notification for testing the interface";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuSection {
    ControlPanel,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Normal,
    Input,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelAction {
    RequestPermission,
    FetchToken,
    SendTest,
    Compose,
    Subscribe,
    Unsubscribe,
    ToggleHandlers,
}

pub const PANEL_ACTIONS: [PanelAction; 7] = [
    PanelAction::RequestPermission,
    PanelAction::FetchToken,
    PanelAction::SendTest,
    PanelAction::Compose,
    PanelAction::Subscribe,
    PanelAction::Unsubscribe,
    PanelAction::ToggleHandlers,
];

pub struct App {
    pub current_section: MenuSection,
    pub state: AppState,
    pub selected_index: usize,
    pub input_buffer: String,
    pub input_cursor: usize,
    pub input_prompt: String,
    pub confirm_message: String,
    pub status_message: String,
    pub show_detail: bool,
    pub show_help: bool,
    pub last_refresh: Instant,
    pub pending_initial_setup: bool,

    pub config: Config,
    pub gateway: NotificationGateway,
    pub permission_granted: bool,
    pub token: Option<String>,
    /// Last snapshot read from the gateway; the history screen renders this.
    pub history: Vec<NotificationRecord>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let platform: Arc<dyn NotificationPlatform> = match config.device {
            DeviceKind::Desktop => Arc::new(DesktopPlatform::new()),
            DeviceKind::Emulator => Arc::new(SimulatedPlatform::emulator()),
        };
        let gateway = NotificationGateway::new(platform, NotificationHistory::new(), config.project_id.clone());
        Self::with_gateway(config, gateway)
    }

    pub fn with_gateway(config: Config, gateway: NotificationGateway) -> Self {
        Self {
            current_section: MenuSection::ControlPanel,
            state: AppState::Normal,
            selected_index: 0,
            input_buffer: String::new(),
            input_cursor: 0,
            input_prompt: String::new(),
            confirm_message: String::new(),
            status_message: String::from("Welcome to pushdeck! Press '?' for help"),
            show_detail: false,
            show_help: false,
            last_refresh: Instant::now(),
            pending_initial_setup: true,
            config,
            gateway,
            permission_granted: false,
            token: None,
            history: Vec::new(),
        }
    }

    pub fn action_label(&self, action: PanelAction) -> String {
        match action {
            PanelAction::RequestPermission => "Request permission".to_string(),
            PanelAction::FetchToken => "Fetch push token".to_string(),
            PanelAction::SendTest => "Send test notification".to_string(),
            PanelAction::Compose => "Compose notification".to_string(),
            PanelAction::Subscribe => format!("Subscribe to \"{}\"", self.config.topic),
            PanelAction::Unsubscribe => format!("Unsubscribe from \"{}\"", self.config.topic),
            PanelAction::ToggleHandlers => {
                if self.gateway.handlers_registered() {
                    "Detach event handlers".to_string()
                } else {
                    "Attach event handlers".to_string()
                }
            }
        }
    }

    pub fn next_item(&mut self) {
        let max = self.get_current_list_len();
        if max > 0 {
            self.selected_index = (self.selected_index + 1) % max;
        }
    }

    pub fn previous_item(&mut self) {
        let max = self.get_current_list_len();
        if max > 0 {
            self.selected_index = if self.selected_index == 0 {
                max - 1
            } else {
                self.selected_index - 1
            };
        }
    }

    pub async fn activate_item(&mut self) -> Result<()> {
        match self.current_section {
            MenuSection::ControlPanel => {
                if let Some(action) = PANEL_ACTIONS.get(self.selected_index).copied() {
                    self.run_action(action).await;
                }
            }
            MenuSection::History => self.toggle_detail(),
        }
        Ok(())
    }

    pub async fn run_action(&mut self, action: PanelAction) {
        match action {
            PanelAction::RequestPermission => {
                if self.enable_notifications().await {
                    self.status_message = "Notification permission granted".to_string();
                }
            }
            PanelAction::FetchToken => match self.gateway.fetch_push_token().await.log() {
                Ok(token) => {
                    self.status_message = format!("Push token: {}", token);
                    self.token = Some(token);
                }
                Err(e) => self.status_message = e.to_string(),
            },
            PanelAction::SendTest => {
                let data = json!({ "test": true, "timestamp": now_millis() })
                    .as_object()
                    .cloned();
                self.send_notification(TEST_TITLE, TEST_BODY, data).await;
            }
            PanelAction::Compose => {
                self.state = AppState::Input;
                self.input_buffer.clear();
                self.input_cursor = 0;
                self.input_prompt = "Enter notification (title|body): ".to_string();
            }
            PanelAction::Subscribe => {
                let topic = self.config.topic.clone();
                if self.gateway.subscribe_to_topic(&topic).await.log().is_ok() {
                    self.status_message = format!(
                        "Subscribed to topic \"{}\" (topics are simulated on this platform)",
                        topic
                    );
                }
            }
            PanelAction::Unsubscribe => {
                let topic = self.config.topic.clone();
                if self.gateway.unsubscribe_from_topic(&topic).await.log().is_ok() {
                    self.status_message = format!(
                        "Unsubscribed from topic \"{}\" (topics are simulated on this platform)",
                        topic
                    );
                }
            }
            PanelAction::ToggleHandlers => {
                if self.gateway.handlers_registered() {
                    self.gateway.teardown();
                    self.status_message = "Event handlers detached".to_string();
                } else {
                    self.gateway.register_event_handlers();
                    self.status_message = "Event handlers attached".to_string();
                }
            }
        }
    }

    /// Permission, then token, then listeners. Returns whether permission was granted.
    async fn enable_notifications(&mut self) -> bool {
        match self.gateway.request_permission().await.log() {
            Ok(()) => {
                self.permission_granted = true;
                self.token = self.gateway.fetch_push_token().await.log().ok();
                self.gateway.register_event_handlers();
                true
            }
            Err(e) => {
                self.permission_granted = false;
                self.status_message = e.to_string();
                false
            }
        }
    }

    async fn send_notification(&mut self, title: &str, body: &str, data: Option<Payload>) {
        match self.gateway.send_local_notification(title, body, data).await.log() {
            Ok(()) => self.status_message = format!("Local notification sent: {}", title),
            Err(e) => self.status_message = e.to_string(),
        }
        self.refresh_history();
    }

    pub fn clear_history(&mut self) {
        if self.current_section == MenuSection::History {
            self.state = AppState::Confirm;
            self.confirm_message = "Delete all notifications from history? (y/n)".to_string();
        }
    }

    pub fn refresh(&mut self) {
        self.refresh_history();
        self.status_message = format!("Refreshed history ({} notifications)", self.history.len());
    }

    pub fn refresh_history(&mut self) {
        self.history = self.gateway.history();
        self.last_refresh = Instant::now();
        if self.current_section == MenuSection::History {
            self.selected_index = usize::min(self.selected_index, self.history.len().saturating_sub(1));
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_record(&self) -> Option<&NotificationRecord> {
        if self.current_section == MenuSection::History {
            self.history.get(self.selected_index)
        } else {
            None
        }
    }

    // List navigation helpers
    pub fn page_up(&mut self) {
        if self.get_current_list_len() == 0 {
            return;
        }
        self.selected_index = self.selected_index.saturating_sub(10);
    }

    pub fn page_down(&mut self) {
        let len = self.get_current_list_len();
        if len == 0 {
            return;
        }
        self.selected_index = usize::min(self.selected_index.saturating_add(10), len - 1);
    }

    pub fn go_home(&mut self) {
        self.selected_index = 0;
    }

    pub fn go_end(&mut self) {
        let len = self.get_current_list_len();
        if len > 0 {
            self.selected_index = len - 1;
        }
    }

    pub fn set_section(&mut self, section: MenuSection) {
        if self.current_section != section {
            self.current_section = section;
            self.selected_index = 0;
            if section == MenuSection::History {
                self.refresh_history();
            }
        }
    }

    pub fn next_section(&mut self) {
        let next = match self.current_section {
            MenuSection::ControlPanel => MenuSection::History,
            MenuSection::History => MenuSection::ControlPanel,
        };
        self.set_section(next);
    }

    pub fn previous_section(&mut self) {
        // Two sections: the cycle is symmetric.
        self.next_section();
    }

    pub fn cancel_input(&mut self) {
        self.state = AppState::Normal;
        self.input_buffer.clear();
        self.input_cursor = 0;
    }

    pub async fn submit_input(&mut self) -> Result<()> {
        let input = self.input_buffer.clone();
        self.cancel_input();
        let (title, body) = parse_compose(&input);
        if title.is_empty() {
            self.status_message = "Notification title cannot be empty".to_string();
            return Ok(());
        }
        self.send_notification(&title, &body, None).await;
        Ok(())
    }

    pub async fn confirm_action(&mut self) -> Result<()> {
        if self.current_section == MenuSection::History {
            self.gateway.clear_history();
            self.refresh_history();
            self.selected_index = 0;
            self.status_message = "Notification history cleared".to_string();
        }
        self.cancel_confirm();
        Ok(())
    }

    pub fn cancel_confirm(&mut self) {
        self.state = AppState::Normal;
        self.confirm_message.clear();
    }

    pub fn input_char(&mut self, c: char) {
        let at = self.byte_cursor();
        self.input_buffer.insert(at, c);
        self.input_cursor += 1;
    }

    pub fn input_backspace(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let at = self.byte_cursor();
            self.input_buffer.remove(at);
        }
    }

    pub fn input_move_left(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
        }
    }

    pub fn input_move_right(&mut self) {
        if self.input_cursor < self.input_buffer.chars().count() {
            self.input_cursor += 1;
        }
    }

    fn byte_cursor(&self) -> usize {
        self.input_buffer
            .char_indices()
            .nth(self.input_cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.input_buffer.len())
    }

    pub async fn auto_refresh(&mut self) -> Result<()> {
        if self.pending_initial_setup {
            // Runs after the first frame so the UI shows up before the platform answers.
            self.pending_initial_setup = false;
            if self.enable_notifications().await {
                self.status_message = "Notifications ready".to_string();
            }
            self.refresh_history();
        }

        if self.last_refresh.elapsed() > Duration::from_secs(self.config.refresh_interval_secs) {
            self.refresh_history();
        }
        Ok(())
    }

    pub fn get_current_list_len(&self) -> usize {
        match self.current_section {
            MenuSection::ControlPanel => PANEL_ACTIONS.len(),
            MenuSection::History => self.history.len(),
        }
    }

    pub fn report_error(&mut self, context: &str, err: anyhow::Error) {
        self.status_message = format!("{}: {}", context, err);
        tracing::error!("{}: {:?}", context, err);
    }

    pub fn shutdown(&mut self) {
        self.gateway.teardown();
    }
}

/// Splits `title|body`; a missing body is empty.
fn parse_compose(input: &str) -> (String, String) {
    match input.split_once('|') {
        Some((title, body)) => (title.trim().to_string(), body.trim().to_string()),
        None => (input.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(device: DeviceKind) -> Config {
        Config {
            path: PathBuf::from("config.toml"),
            project_id: "test-project".to_string(),
            device,
            relay_url: "http://localhost/push".to_string(),
            refresh_interval_secs: 5,
            topic: "test-topic".to_string(),
            log_level: "info".to_string(),
        }
    }

    fn app_with(platform: SimulatedPlatform) -> App {
        let gateway = NotificationGateway::new(Arc::new(platform), NotificationHistory::new(), "test-project");
        App::with_gateway(config(DeviceKind::Desktop), gateway)
    }

    fn action_index(action: PanelAction) -> usize {
        PANEL_ACTIONS.iter().position(|a| *a == action).unwrap()
    }

    #[test]
    fn compose_input_parsing() {
        assert_eq!(parse_compose("Hi | there"), ("Hi".to_string(), "there".to_string()));
        assert_eq!(parse_compose("Only title"), ("Only title".to_string(), String::new()));
        assert_eq!(parse_compose("a|b|c"), ("a".to_string(), "b|c".to_string()));
    }

    #[tokio::test]
    async fn startup_enables_notifications_on_device() {
        let mut app = app_with(SimulatedPlatform::new().with_token(Some("tok".into())));
        app.auto_refresh().await.unwrap();
        assert!(!app.pending_initial_setup);
        assert!(app.permission_granted);
        assert_eq!(app.token.as_deref(), Some("tok"));
        assert!(app.gateway.handlers_registered());
    }

    #[tokio::test]
    async fn startup_on_emulator_reports_instead_of_failing() {
        let mut app = App::new(config(DeviceKind::Emulator));
        app.auto_refresh().await.unwrap();
        assert!(!app.permission_granted);
        assert!(app.token.is_none());
        assert!(!app.gateway.handlers_registered());
        assert!(app.status_message.contains("physical device"));
        assert!(app.history.is_empty());
    }

    #[tokio::test]
    async fn test_notification_shows_up_in_history() {
        let mut app = app_with(SimulatedPlatform::new());
        app.selected_index = action_index(PanelAction::SendTest);
        app.activate_item().await.unwrap();

        assert_eq!(app.history.len(), 1);
        assert_eq!(app.history[0].title, TEST_TITLE);
        assert_eq!(app.history[0].data.as_ref().unwrap()["test"], true);
    }

    #[tokio::test]
    async fn compose_sends_entered_title_and_body() {
        let mut app = app_with(SimulatedPlatform::new());
        app.run_action(PanelAction::Compose).await;
        assert_eq!(app.state, AppState::Input);
        for c in "Привет|Как дела?".chars() {
            app.input_char(c);
        }
        app.input_backspace();
        app.input_char('?');
        app.submit_input().await.unwrap();

        assert_eq!(app.state, AppState::Normal);
        assert_eq!(app.history[0].title, "Привет");
        assert_eq!(app.history[0].body, "Как дела?");
    }

    #[tokio::test]
    async fn clearing_history_requires_confirmation() {
        let mut app = app_with(SimulatedPlatform::new());
        app.run_action(PanelAction::SendTest).await;
        app.clear_history();
        assert_eq!(app.state, AppState::Normal);

        app.set_section(MenuSection::History);
        app.clear_history();
        assert_eq!(app.state, AppState::Confirm);
        app.cancel_confirm();
        assert_eq!(app.gateway.history_len(), 1);

        app.clear_history();
        app.confirm_action().await.unwrap();
        assert!(app.history.is_empty());
        assert_eq!(app.gateway.history_len(), 0);
    }

    #[tokio::test]
    async fn toggling_handlers() {
        let mut app = app_with(SimulatedPlatform::new());
        app.run_action(PanelAction::ToggleHandlers).await;
        assert!(app.gateway.handlers_registered());
        assert_eq!(app.action_label(PanelAction::ToggleHandlers), "Detach event handlers");
        app.run_action(PanelAction::ToggleHandlers).await;
        assert!(!app.gateway.handlers_registered());
    }

    #[tokio::test]
    async fn failed_delivery_is_reported() {
        let platform = SimulatedPlatform::new();
        platform.set_delivery_failure(true);
        let mut app = app_with(platform);
        app.run_action(PanelAction::SendTest).await;
        assert!(app.status_message.starts_with("failed to send local notification"));
        assert!(app.history.is_empty());
    }

    #[test]
    fn navigation_wraps_within_section() {
        let mut app = app_with(SimulatedPlatform::new());
        app.previous_item();
        assert_eq!(app.selected_index, PANEL_ACTIONS.len() - 1);
        app.next_item();
        assert_eq!(app.selected_index, 0);

        app.next_section();
        assert_eq!(app.current_section, MenuSection::History);
        app.next_item();
        assert_eq!(app.selected_index, 0);
    }
}
