use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use studytime::config::{self, Config};
use studytime::persistence::{FileStore, PersistenceBridge};
use studytime::{ipc, ServiceHandle, SystemClock, TimerService};
use studytime_ipc::Command;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "studytime")]
#[command(about = "Study timer with a persistent countdown and stopwatch", long_about = None)]
struct Cli {
    /// Run only the timer service and IPC server, without the terminal display
    #[arg(long)]
    headless: bool,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    init_logging(&cli, &config)?;

    let store = match &config.storage.dir {
        Some(dir) => FileStore::new(dir),
        None => FileStore::in_data_dir().context("Failed to locate data directory")?,
    };
    info!("Storing timer state in {:?}", store.dir());
    let bridge = PersistenceBridge::with_key(Box::new(store), config.storage.key.clone());
    let (mut service, handle) =
        TimerService::new(Arc::new(SystemClock), bridge, config.timer.driver);
    let restored = service.restore(config.default_state());
    info!(
        "Restored timer from {:?} ({}s away)",
        restored.source, restored.gap_seconds
    );
    let service_task = tokio::spawn(service.run());

    let socket_path = config.ipc.socket_path.clone();
    let server_socket = socket_path.clone();
    let server_handle = handle.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = ipc::serve(&server_socket, server_handle).await {
            warn!("IPC server stopped: {:#}", e);
        }
    });

    let result = if cli.headless {
        info!("Running headless, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")
    } else {
        let tui_handle = handle.clone();
        tokio::task::spawn_blocking(move || run_terminal(config, tui_handle))
            .await
            .context("Terminal display panicked")?
    };

    // The service saves its final snapshot once every handle is gone
    server_task.abort();
    let _ = server_task.await;
    drop(handle);
    service_task.await.context("Timer service panicked")?;
    let _ = fs::remove_file(&socket_path);
    result
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let default_level = if cli.verbose {
        "studytime=debug"
    } else {
        "studytime=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if cli.headless {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return Ok(());
    }

    // The display owns the terminal, so log to a file next to the snapshot
    let dir = match &config.storage.dir {
        Some(dir) => dir.clone(),
        None => config::project_dirs()
            .context("Failed to locate data directory")?
            .data_dir()
            .to_path_buf(),
    };
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join("studytime.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn run_terminal(config: Config, handle: ServiceHandle) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, App::new(config), handle);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    handle: ServiceHandle,
) -> Result<()> {
    let mut events = handle.subscribe();
    app.apply_response(handle.blocking_send(Command::Status)?);

    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        loop {
            match events.try_recv() {
                Ok(event) => {
                    if app.apply(event) {
                        app.notify_completion();
                        ring_bell();
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Display fell {} events behind, refreshing", missed);
                    app.apply_response(handle.blocking_send(Command::Status)?);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => return Ok(()),
            }
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(command) = app.handle_key(key.code) {
                        app.apply_response(handle.blocking_send(command)?);
                    }
                    if app.should_quit {
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn ring_bell() {
    let mut stdout = io::stdout();
    if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
        warn!("Failed to ring terminal bell: {}", e);
    }
}
