use anyhow::Result;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::process::ExitCode;
use std::time::Duration;

mod app;
mod config;
mod logging;
mod modules;
mod ui;

use app::{App, AppState, MenuSection};
use config::Config;
use logging::LogError;
use modules::relay::{PushMessage, RelayClient};

#[derive(Subcommand)]
enum Command {
    /// Send a push message to a device token through the push relay
    Send {
        /// Push token printed by the control panel
        token: Option<String>,
        title: Option<String>,
        body: Option<String>,
        /// Relay endpoint, defaults to `relay_url` from the config file
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(Parser)]
#[command(version, about = "Push notification playground")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// How long quitting waits on blocking tasks, such as desktop notifications
/// still waiting for a click.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    run_to_completion(run(cli))?
}

/// Drives `future` on a fresh runtime, then shuts the runtime down without
/// waiting longer than [`SHUTDOWN_GRACE`] on blocking tasks that are still parked.
fn run_to_completion<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Some(Command::Send { token, title, body, endpoint }) => {
            let config = Config::load_or_default();
            let _guard = match logging::init(&config.log_level) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    eprintln!("Warning: logging disabled: {:#}", e);
                    None
                }
            };
            let endpoint = endpoint.unwrap_or(config.relay_url);
            Ok(send_command(token, title, body, endpoint).await)
        }
        None => {
            let config = Config::load()?;
            let _guard = logging::init(&config.log_level)?;
            tracing::info!(path = ?config.path, device = ?config.device, "configuration loaded");
            run_tui(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Exits with failure only when no token was given.
async fn send_command(
    token: Option<String>,
    title: Option<String>,
    body: Option<String>,
    endpoint: String,
) -> ExitCode {
    let Some(token) = token else {
        print_send_usage();
        return ExitCode::FAILURE;
    };
    send_push(RelayClient::new(endpoint), PushMessage::test(token, title, body)).await;
    ExitCode::SUCCESS
}

fn print_send_usage() {
    println!("Usage: pushdeck send <PUSH_TOKEN> [TITLE] [BODY]");
    println!();
    println!("Examples:");
    println!("  pushdeck send \"ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]\"");
    println!("  pushdeck send \"ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]\" \"Hello!\" \"How are you?\"");
    println!();
    println!("Copy the push token from the control panel and pass it here.");
}

/// Reports whatever the relay answered. Failures are printed, never turned into an exit code.
async fn send_push(client: RelayClient, message: PushMessage) {
    println!("Sending notification through the push relay...");
    println!("Token: {}", message.to);
    println!("Title: {}", message.title);
    println!("Body: {}", message.body);
    println!();

    match client.send(&message).await.log() {
        Ok(response) => {
            println!("Status: {}", response.status);
            let headers: Vec<String> = response
                .headers
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            println!("Headers: {}", headers.join(", "));
            println!("Response: {}", response.body);
            println!("Notification sent through {}", client.endpoint());
        }
        Err(e) => eprintln!("Error: {:#}", e),
    }
}

async fn run_tui(config: Config) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config);
    let res = run_app(&mut terminal, &mut app).await;
    app.shutdown();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press { continue; }
                match app.state {
                    AppState::Normal => match code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        KeyCode::Char('?') => { app.show_help = !app.show_help; }
                        KeyCode::Char('1') => app.set_section(MenuSection::ControlPanel),
                        KeyCode::Char('2') => app.set_section(MenuSection::History),
                        KeyCode::Up | KeyCode::Char('k') => app.previous_item(),
                        KeyCode::Down | KeyCode::Char('j') => app.next_item(),
                        KeyCode::PageUp => app.page_up(),
                        KeyCode::PageDown => app.page_down(),
                        KeyCode::Home => app.go_home(),
                        KeyCode::End => app.go_end(),
                        KeyCode::Enter => {
                            if let Err(e) = app.activate_item().await { app.report_error("Action failed", e); }
                        }
                        KeyCode::Char('d') => app.clear_history(),
                        KeyCode::Char('r') => app.refresh(),
                        KeyCode::Char('t') => app.toggle_detail(),
                        KeyCode::Tab => app.next_section(),
                        KeyCode::BackTab => app.previous_section(),
                        KeyCode::Esc => { app.show_help = false; }
                        _ => {}
                    },
                    AppState::Input => match code {
                        KeyCode::Enter => {
                            if let Err(e) = app.submit_input().await { app.report_error("Submit failed", e); }
                        }
                        KeyCode::Esc => app.cancel_input(),
                        KeyCode::Backspace => app.input_backspace(),
                        KeyCode::Char(c) => app.input_char(c),
                        KeyCode::Left => app.input_move_left(),
                        KeyCode::Right => app.input_move_right(),
                        _ => {}
                    },
                    AppState::Confirm => match code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => {
                            if let Err(e) = app.confirm_action().await { app.report_error("Confirm failed", e); }
                        }
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                            app.cancel_confirm()
                        }
                        _ => {}
                    },
                }
            }
        }

        if let Err(e) = app.auto_refresh().await { app.report_error("Auto refresh failed", e); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn send_without_token_fails() {
        let code = send_command(None, None, None, "http://127.0.0.1:9".to_string()).await;
        assert_eq!(code, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn unreachable_relay_still_exits_cleanly() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let code = send_command(
            Some("tok".to_string()),
            None,
            None,
            format!("http://{}/push", addr),
        )
        .await;
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn parked_blocking_task_does_not_hold_up_exit() {
        let started = Instant::now();
        let output = run_to_completion(async {
            let _parked = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            tokio::time::sleep(Duration::from_millis(20)).await;
            7
        })
        .unwrap();

        assert_eq!(output, 7);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
