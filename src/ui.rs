use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppState, MenuSection, PANEL_ACTIONS};
use crate::modules::history::{HISTORY_CAPACITY, now_millis};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(4),
        ])
        .split(f.area());

    draw_title(f, chunks[0], app);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(chunks[1]);

    draw_menu(f, app, main_chunks[0]);

    match app.current_section {
        MenuSection::ControlPanel => draw_control_panel(f, app, main_chunks[1]),
        MenuSection::History => draw_history(f, app, main_chunks[1]),
    }

    draw_status(f, app, chunks[2]);

    if app.state == AppState::Input {
        draw_input_popup(f, app);
    } else if app.state == AppState::Confirm {
        draw_confirm_popup(f, app);
    } else if app.show_help {
        draw_help_popup(f);
    }
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let time_str = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let header = format!(
        "pushdeck | {} | device: {} | project: {}",
        time_str,
        app.gateway.platform_label(),
        app.config.project_id
    );

    let title = Paragraph::new(header)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn draw_menu(f: &mut Frame, app: &App, area: Rect) {
    let menu_items = [
        ("1", "Control Panel", MenuSection::ControlPanel),
        ("2", "History", MenuSection::History),
    ];

    let items: Vec<ListItem> = menu_items
        .iter()
        .map(|(key, name, section)| {
            let style = if *section == app.current_section {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{} {}", key, name)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Menu")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(list, area);
}

fn flag(ok: bool, yes: &str, no: &str) -> Span<'static> {
    if ok {
        Span::styled(format!("✔ {}", yes), Style::default().fg(Color::Green))
    } else {
        Span::styled(format!("✘ {}", no), Style::default().fg(Color::Red))
    }
}

fn draw_control_panel(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(area);

    let status = vec![
        Line::from(vec![
            Span::raw("Device:      "),
            flag(app.gateway.is_physical_device(), "physical", "emulator"),
        ]),
        Line::from(vec![
            Span::raw("Permission:  "),
            flag(app.permission_granted, "granted", "not granted"),
        ]),
        Line::from(vec![
            Span::raw("Push token:  "),
            match &app.token {
                Some(token) => Span::styled(token.clone(), Style::default().fg(Color::Green)),
                None => Span::styled("not available", Style::default().fg(Color::DarkGray)),
            },
        ]),
        Line::from(vec![
            Span::raw("Handlers:    "),
            flag(app.gateway.handlers_registered(), "attached", "detached"),
        ]),
        Line::from(format!(
            "History:     {} / {} notifications",
            app.history.len(),
            HISTORY_CAPACITY
        )),
    ];
    let status_block = Paragraph::new(status)
        .block(Block::default().title("Status").borders(Borders::ALL));
    f.render_widget(status_block, chunks[0]);

    let items: Vec<ListItem> = PANEL_ACTIONS
        .iter()
        .enumerate()
        .map(|(i, action)| {
            let style = if i == app.selected_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("▶ {}", app.action_label(*action))).style(style)
        })
        .collect();

    let actions = List::new(items)
        .block(Block::default().title("Actions (Enter to run)").borders(Borders::ALL));
    f.render_widget(actions, chunks[1]);
}

fn draw_history(f: &mut Frame, app: &App, area: Rect) {
    let chunks = if app.show_detail {
        Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area)
    } else {
        Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(100)])
            .split(area)
    };

    let title = format!("History: {} (t details, d clear, r refresh)", app.history.len());
    if app.history.is_empty() {
        let empty = Paragraph::new("No notifications yet.\nSend a test notification from the control panel.")
            .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(empty, chunks[0]);
        return;
    }

    let now = now_millis();
    let window_height = chunks[0].height.saturating_sub(2) as usize;
    let start = app.selected_index.saturating_sub(window_height / 2);
    let end = usize::min(start + window_height, app.history.len());

    let items: Vec<ListItem> = app.history[start..end]
        .iter()
        .enumerate()
        .map(|(offset, n)| {
            let i = start + offset;
            let style = if i == app.selected_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let body = if n.body.is_empty() { String::new() } else { format!(" - {}", n.body) };
            ListItem::new(format!("🔔 [{}] {}{}", n.age_label(now), n.title, body)).style(style)
        })
        .collect();

    let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(list, chunks[0]);

    if app.show_detail {
        let text = match app.selected_record() {
            Some(n) => {
                let data = match &n.data {
                    Some(data) => serde_json::to_string_pretty(data).unwrap_or_default(),
                    None => "none".to_string(),
                };
                format!(
                    "ID: {}\nTitle: {}\nBody: {}\nTimestamp: {} ({})\nData: {}",
                    n.id,
                    n.title,
                    n.body,
                    n.timestamp,
                    n.age_label(now),
                    data
                )
            }
            None => "Nothing selected".to_string(),
        };
        let detail = Paragraph::new(text)
            .block(Block::default().title("Details (t to toggle)").borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        f.render_widget(detail, chunks[1]);
    }
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let help_text = match app.state {
        AppState::Normal => "q: Quit | Tab/1-2: Section | ↑↓/jk: Navigate | Enter: Run | t: Details | d: Clear | r: Refresh | ?: Help",
        AppState::Input => "Enter: Submit | Esc: Cancel | Type your input",
        AppState::Confirm => "y: Yes | n: No | Esc: Cancel",
    };

    let status = Paragraph::new(vec![
        Line::from(app.status_message.as_str()),
        Line::from(help_text),
    ])
    .block(Block::default().borders(Borders::ALL))
    .wrap(Wrap { trim: true });

    f.render_widget(status, area);
}

fn draw_input_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 20, f.area());
    let input_text = format!("{}{}", app.input_prompt, app.input_buffer);
    let input = Paragraph::new(input_text)
        .block(
            Block::default()
                .title("Input")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(input, area);
}

fn draw_confirm_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(50, 15, f.area());
    let confirm = Paragraph::new(app.confirm_message.as_str())
        .block(
            Block::default()
                .title("Confirm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(confirm, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn draw_help_popup(f: &mut Frame) {
    let area = centered_rect(70, 70, f.area());
    let help = "pushdeck Help\n\nKeys:\n  q / Ctrl-C: Quit\n  Tab / Shift-Tab: Switch section\n  1-2: Jump to section\n  j/k or ↑/↓: Navigate\n  PgUp/PgDn, Home/End: Page/Jump\n  Enter: Run action (Control Panel) / toggle details (History)\n  t: Toggle details (History)\n  d: Clear history (History)\n  r: Refresh history\n  ?: Toggle this help\n\nPush from another machine:\n  pushdeck send <TOKEN> [TITLE] [BODY]";

    let paragraph = Paragraph::new(help)
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DeviceKind};
    use crate::modules::gateway::NotificationGateway;
    use crate::modules::history::NotificationHistory;
    use crate::modules::platform::SimulatedPlatform;
    use ratatui::{backend::TestBackend, Terminal};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn app() -> App {
        let config = Config {
            path: PathBuf::from("config.toml"),
            project_id: "test-project".to_string(),
            device: DeviceKind::Emulator,
            relay_url: "http://localhost/push".to_string(),
            refresh_interval_secs: 5,
            topic: "test-topic".to_string(),
            log_level: "info".to_string(),
        };
        let gateway = NotificationGateway::new(
            Arc::new(SimulatedPlatform::emulator()),
            NotificationHistory::new(),
            "test-project",
        );
        App::with_gateway(config, gateway)
    }

    fn rendered(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content.iter().map(|c| c.symbol()).collect()
    }

    #[tokio::test]
    async fn control_panel_lists_actions() {
        let app = app();
        let screen = rendered(&app);
        assert!(screen.contains("Send test notification"));
        assert!(screen.contains("emulator"));
    }

    #[tokio::test]
    async fn history_shows_empty_state_and_records() {
        let mut app = app();
        app.set_section(MenuSection::History);
        assert!(rendered(&app).contains("No notifications yet"));

        app.gateway.send_local_notification("Ping", "pong", None).await.unwrap();
        app.refresh_history();
        app.toggle_detail();
        let screen = rendered(&app);
        assert!(screen.contains("Ping - pong"));
        assert!(screen.contains("just now"));
        assert!(screen.contains("Details"));
    }
}
