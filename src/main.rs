mod app;
mod config;
mod error;
mod http;
mod service;
mod status;
mod ui;
mod vpn;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app::App;
use config::AppConfig;
use service::VpnService;
use vpn::rotation::RotationScheduler;

#[derive(Parser, Debug)]
#[command(name = "wg-rotator")]
#[command(version)]
#[command(about = "Rotates a WireGuard tunnel across local profiles on a timer")]
struct Args {
    /// Run headless: scheduler and status endpoint only
    #[arg(short, long)]
    daemon: bool,

    /// Print the current connection status as JSON
    #[arg(short, long)]
    status: bool,

    /// Switch to a specific profile (name or path)
    #[arg(short, long)]
    connect: Option<String>,

    /// Tear down every active tunnel
    #[arg(long)]
    disconnect: bool,

    /// Rotate to the next profile once
    #[arg(short, long)]
    next: bool,

    /// List available profiles
    #[arg(short, long)]
    list: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let one_shot = args.status || args.disconnect || args.next || args.list || args.connect.is_some();
    init_logging(if args.daemon {
        LogTarget::Stdout
    } else if one_shot {
        LogTarget::Stderr
    } else {
        LogTarget::File
    });

    let config = AppConfig::load(args.config.as_deref())?;
    let service = Arc::new(VpnService::from_config(&config)?);

    // Handle CLI-only commands
    if args.status {
        return print_status(&service).await;
    }

    if args.list {
        for profile in service.profiles()? {
            println!("{}", profile.name);
        }
        return Ok(());
    }

    if args.disconnect {
        let report = service.disconnect().await?;
        if !report.stuck().is_empty() {
            anyhow::bail!("Still active after disconnect: {}", report.stuck().join(", "));
        }
        println!("VPN disconnected");
        return Ok(());
    }

    if let Some(profile) = args.connect {
        let outcome = service.switch_to_path(&profile).await?;
        println!("Connected to {} ({})", outcome.profile.name, outcome.interfaces.join(" "));
        return Ok(());
    }

    if args.next {
        match service.rotate().await? {
            Some(outcome) => println!("Connected to {}", outcome.profile.name),
            None => println!("No profiles found in {}", config.config_dir.display()),
        }
        return Ok(());
    }

    spawn_http(service.clone(), config.http_bind.clone());

    let scheduler = config.auto_rotate.then(|| {
        RotationScheduler::new(service.clone(), config.switch_interval(), config.notifications)
    });

    if args.daemon {
        return run_daemon(scheduler).await;
    }

    if let Some(scheduler) = scheduler {
        tokio::spawn(scheduler.run());
    }
    let rotate_every = config.auto_rotate.then(|| config.switch_interval());
    run_tui(service, rotate_every).await
}

/// Where log lines go. One-shot commands keep stdout clean for their output,
/// and the TUI cannot share the terminal with them at all.
enum LogTarget {
    Stdout,
    Stderr,
    File,
}

fn init_logging(target: LogTarget) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wg_rotator=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match target {
        LogTarget::Stdout => registry.with(tracing_subscriber::fmt::layer().with_writer(io::stdout)).init(),
        LogTarget::Stderr => registry.with(tracing_subscriber::fmt::layer().with_writer(io::stderr)).init(),
        LogTarget::File => match open_log_file() {
            Some(file) => registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .init(),
            None => registry.with(tracing_subscriber::fmt::layer().with_writer(io::sink)).init(),
        },
    }
}

fn open_log_file() -> Option<std::fs::File> {
    let dir = dirs::data_local_dir()?.join("wg-rotator");
    std::fs::create_dir_all(&dir).ok()?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("wg-rotator.log"))
        .ok()
}

async fn print_status(service: &VpnService) -> Result<()> {
    let snapshot = service.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn spawn_http(service: Arc<VpnService>, bind: String) {
    tokio::spawn(async move {
        if let Err(e) = http::serve(service, &bind).await {
            tracing::error!("Status server on {} stopped: {:#}", bind, e);
        }
    });
}

async fn run_daemon(scheduler: Option<RotationScheduler>) -> Result<()> {
    tracing::info!("Starting wg-rotator daemon");

    match scheduler {
        Some(scheduler) => {
            tokio::select! {
                _ = scheduler.run() => {}
                result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            }
        }
        None => {
            tracing::info!("Auto-rotation disabled; serving status only");
            tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}

async fn run_tui(service: Arc<VpnService>, rotate_every: Option<std::time::Duration>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(service, rotate_every);

    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => {
                            // Handle key and catch any errors to prevent crashes
                            if let Err(e) = app.handle_key(key).await {
                                app.set_message(format!("Error: {}", e));
                            }
                        }
                    }
                }
            }
        }

        app.tick();
    }
}
