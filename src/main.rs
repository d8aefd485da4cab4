use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ghbranch::app::{App, InputMode};
use ghbranch::commands::{self, Context};
use ghbranch::config::Config;
use ghbranch::ui;
use ratatui::prelude::*;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ghbranch")]
#[command(about = "Browse, merge and delete branches across your GitHub repositories", long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<String>,

    /// Debug logging; RUST_LOG takes precedence
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with a personal access token or through OAuth
    Login {
        /// Personal access token (prompted for when omitted)
        #[arg(long, conflicts_with = "oauth")]
        token: Option<String>,
        /// Use the OAuth authorization flow in a browser
        #[arg(long)]
        oauth: bool,
    },
    /// Finish an OAuth login with the URL the browser was redirected to
    Callback { url: String },
    /// Forget the saved token and any pending OAuth login
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List every repository with its branches
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Merge a branch into another (owner/repo head base)
    Merge {
        repo: String,
        head: String,
        base: String,
    },
    /// Delete a branch (owner/repo branch)
    Delete { repo: String, branch: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(&PathBuf::from(shellexpand::tilde(path).to_string())),
        None => Config::load(),
    };

    // The TUI owns the terminal, so its logs go to a file
    let log_file = args.command.is_none().then(|| config.log_path());
    init_logging(args.verbose, log_file.as_deref())?;

    let ctx = Context::new(config)?;

    match args.command {
        Some(Command::Login { token, oauth }) => commands::login(&ctx, token, oauth).await,
        Some(Command::Callback { url }) => commands::callback(&ctx, &url).await,
        Some(Command::Logout) => commands::logout(&ctx),
        Some(Command::Whoami) => commands::whoami(&ctx).await,
        Some(Command::List { json }) => commands::list(&ctx, json).await,
        Some(Command::Merge { repo, head, base }) => {
            commands::merge(&ctx, &repo, &head, &base).await
        }
        Some(Command::Delete { repo, branch }) => commands::delete(&ctx, &repo, &branch).await,
        None => run_tui(&ctx).await,
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "ghbranch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run_tui(ctx: &Context) -> Result<()> {
    // Validate before taking over the screen so errors print normally
    let token = ctx.require_token().await?;
    let login = ctx.session.user().map(|u| u.login).unwrap_or_default();
    let mut app = App::new(ctx.client.clone(), token, login, &ctx.config.ui);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

/// Show the loading state before a network round trip blocks the loop
fn draw_loading<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    app.loading = true;
    terminal.draw(|f| ui::draw(f, app))?;
    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    draw_loading(terminal, app)?;
    app.refresh().await;

    loop {
        app.tick();
        terminal.draw(|f| ui::draw(f, app))?;

        // Poll for events with timeout so toasts expire without input
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.input_mode {
                        InputMode::Normal => {
                            if !handle_normal_mode(terminal, app, key.code, key.modifiers).await? {
                                return Ok(());
                            }
                        }
                        InputMode::ConfirmMerge | InputMode::ConfirmDelete => {
                            handle_confirm_mode(terminal, app, key.code).await?;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_normal_mode<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Result<bool> {
    // If popup is open, handle popup navigation
    if app.popup.is_some() {
        match code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => app.close_popup(),
            KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
            KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
            KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => app.scroll_down(),
            KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => app.scroll_up(),
            _ => {}
        }
        return Ok(true);
    }

    match code {
        // Quit
        KeyCode::Char('q') | KeyCode::Esc => return Ok(false),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(false),

        // Navigation
        KeyCode::Char('j') | KeyCode::Down => app.next(),
        KeyCode::Char('k') | KeyCode::Up => app.previous(),
        KeyCode::Enter | KeyCode::Char(' ') => app.activate_selected(),

        // Help
        KeyCode::Char('?') => app.toggle_help(),

        // Refresh
        KeyCode::Char('r') => {
            draw_loading(terminal, app)?;
            app.refresh().await;
        }

        // Branch actions
        KeyCode::Char('m') => app.start_merge_confirm(),
        KeyCode::Char('d') => app.start_delete_confirm(),

        _ => {}
    }

    Ok(true)
}

async fn handle_confirm_mode<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    code: KeyCode,
) -> Result<()> {
    match code {
        KeyCode::Esc => app.close_popup(),
        KeyCode::Enter => {
            let merging = app.input_mode == InputMode::ConfirmMerge;
            draw_loading(terminal, app)?;
            if merging {
                app.merge_selected().await;
            } else {
                app.delete_selected().await;
            }
            app.loading = false;
        }
        KeyCode::Char(c) => app.handle_char(c),
        KeyCode::Backspace => app.handle_backspace(),
        _ => {}
    }
    Ok(())
}
