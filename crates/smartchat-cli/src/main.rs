//! smartchat - terminal chat client.
//!
//! This is the entry point for the `smartchat` binary.

mod app;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use smartchat_client::{
    ChatClient, ClientConfig, ConnectionState, FileIdentityStore, IdentityStore,
    MemoryIdentityStore,
};

use app::{App, Screen};

/// Terminal chat client for smartchat rooms.
#[derive(Parser, Debug)]
#[command(name = "smartchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat server URL.
    #[arg(long, env = "SMARTCHAT_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Username to prefill in the join form.
    #[arg(long, env = "SMARTCHAT_USERNAME")]
    username: Option<String>,

    /// Room to prefill in the join form.
    #[arg(long, env = "SMARTCHAT_ROOM")]
    room: Option<String>,

    /// File holding the last used username and room.
    #[arg(long, env = "SMARTCHAT_IDENTITY_FILE")]
    identity_file: Option<PathBuf>,

    /// Seconds to wait for the server to confirm a join (0 waits forever).
    #[arg(long, default_value_t = 15)]
    join_timeout: u64,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Debug log destination.
    #[arg(long, default_value = "smartchat.log")]
    log_file: PathBuf,
}

fn identity_store(path: Option<PathBuf>) -> Box<dyn IdentityStore> {
    let path = path.or_else(|| {
        dirs::config_dir().map(|dir| dir.join("smartchat").join("identity.json"))
    });
    match path {
        Some(path) => Box::new(FileIdentityStore::new(path)),
        None => Box::new(MemoryIdentityStore::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The terminal owns stdout and stderr, so logs go to a file.
    if args.debug {
        let file = File::create(&args.log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter("smartchat=debug,smartchat_client=debug,warn")
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let config = ClientConfig {
        join_timeout_seconds: args.join_timeout,
        ..ClientConfig::with_endpoint(&args.server)
    };
    let client = ChatClient::websocket(config, identity_store(args.identity_file));

    let mut app = App::new(client);
    if let Some(username) = args.username {
        app.username = app::TextInput::new(username);
    }
    if let Some(room) = args.room {
        app.room = app::TextInput::new(room);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Connect up front; the join form retries if this fails.
    app.connect().await;

    let result = run_event_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Main event loop.
///
/// Redraws on every terminal tick and every server event.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.client.ai().is_some_and(|ai| ai.is_busy()) {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        let listening = matches!(
            app.client.connection_state(),
            ConnectionState::Connecting | ConnectionState::Connected
        );
        let join_deadline = app.client.join_deadline();

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt).await;
                    }
                }
            }

            Some(event) = app.client.next_event(), if listening => {
                tracing::debug!(event = event.name(), "Server event");
                app.on_server_event(&event);
            }

            () = sleep_until(join_deadline), if join_deadline.is_some() => {
                app.check_join_timeout();
            }
        }

        app.check_connection();

        if app.should_quit {
            break;
        }
    }

    app.shutdown();

    Ok(())
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle input events.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) => {
            if key.kind != KeyEventKind::Press {
                return;
            }
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                app.should_quit = true;
                return;
            }
            match app.screen {
                Screen::Join => handle_join_keys(app, key).await,
                Screen::Room => handle_room_keys(app, key).await,
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Handle keys on the join form.
async fn handle_join_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            if app.form_errors.is_empty() {
                app.should_quit = true;
            } else {
                app.form_errors.clear();
            }
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            app.field = app.field.toggle();
        }
        KeyCode::Enter => app.submit_join().await,
        KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.focused_field().delete_word();
        }
        KeyCode::Char(c) => app.focused_field().insert(c),
        KeyCode::Backspace => app.focused_field().delete_back(),
        KeyCode::Delete => app.focused_field().delete_forward(),
        KeyCode::Left => app.focused_field().left(),
        KeyCode::Right => app.focused_field().right(),
        KeyCode::Home => app.focused_field().home(),
        KeyCode::End => app.focused_field().end(),
        _ => {}
    }
}

/// Handle keys in a room.
async fn handle_room_keys(app: &mut App, key: KeyEvent) {
    let edited = match key.code {
        KeyCode::Esc => {
            app.clear_error();
            false
        }
        KeyCode::PageUp => {
            app.scroll_chat_up(10);
            false
        }
        KeyCode::PageDown => {
            app.scroll_chat_down(10);
            false
        }
        KeyCode::Enter => {
            app.submit_message().await;
            false
        }
        KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.delete_word();
            true
        }
        KeyCode::Char(c) => {
            app.input.insert(c);
            true
        }
        KeyCode::Backspace => {
            app.input.delete_back();
            true
        }
        KeyCode::Delete => {
            app.input.delete_forward();
            true
        }
        KeyCode::Left => {
            app.input.left();
            false
        }
        KeyCode::Right => {
            app.input.right();
            false
        }
        KeyCode::Home => {
            app.input.home();
            false
        }
        KeyCode::End => {
            app.input.end();
            false
        }
        _ => false,
    };

    if edited {
        app.input_edited();
    }
}
