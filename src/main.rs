use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voicememo::audio::{FileDevice, MediaDevices, PlatformCapabilities};
use voicememo::controller::{
    AutoConfirmDialog, ConsoleDialog, Dialog, HistoryNavigator, MemoController, RecordController,
    RecordingReport,
};
use voicememo::{create_router, AppState, Config, EventBus, FileMemoStore, MemoStore};

#[derive(Parser)]
#[command(name = "voicememo")]
#[command(about = "Record, keep and browse voice memos")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voicememo")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new memo. Enter stops and saves, Ctrl-C discards.
    Record {
        #[command(flatten)]
        input: InputArgs,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// List stored memos, newest first
    List,
    /// Show one memo with its waveform
    Show { url: String },
    /// Change a memo's title or description
    Edit {
        url: String,
        /// New title; a blank title resets it to the default
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a memo
    Delete {
        url: String,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Write a memo's audio to a file
    Export { url: String, output: PathBuf },
    /// Serve the HTTP API
    Serve {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Audio file to record from instead of the microphone
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Force the buffered capture backend
    #[arg(long)]
    legacy: bool,
}

impl InputArgs {
    fn devices(&self) -> Result<Arc<dyn MediaDevices>> {
        let capabilities = if self.legacy {
            PlatformCapabilities::none()
        } else {
            PlatformCapabilities::full()
        };

        if let Some(path) = &self.input {
            return Ok(Arc::new(
                FileDevice::new(path).with_capabilities(capabilities),
            ));
        }

        microphone(capabilities)
    }
}

#[cfg(feature = "microphone")]
fn microphone(capabilities: PlatformCapabilities) -> Result<Arc<dyn MediaDevices>> {
    Ok(Arc::new(
        voicememo::audio::MicrophoneDevice::new().with_capabilities(capabilities),
    ))
}

#[cfg(not(feature = "microphone"))]
fn microphone(_capabilities: PlatformCapabilities) -> Result<Arc<dyn MediaDevices>> {
    bail!("No input device: pass --input <file> or build with the `microphone` feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    let store_path = cfg.storage.resolved_path()?;
    let store: Arc<dyn MemoStore> = Arc::new(
        FileMemoStore::open(&store_path)
            .await
            .with_context(|| format!("Failed to open memo store at {}", store_path.display()))?,
    );

    match cli.command {
        Command::Record { input, duration } => {
            record(&cfg, input.devices()?, store, duration).await
        }
        Command::List => list(store).await,
        Command::Show { url } => show(store, &url).await,
        Command::Edit {
            url,
            title,
            description,
        } => {
            let memos = memo_controller(store.clone(), Arc::new(ConsoleDialog::new(false)));
            let current = store.get(&url).await?;
            let title = title.unwrap_or(current.title);
            let description = description.or(current.description);
            let memo = memos.save_edit(&url, &title, description).await?;
            println!("Saved {} ({})", memo.url, memo.title);
            Ok(())
        }
        Command::Delete { url, yes } => {
            let memos = memo_controller(store, Arc::new(ConsoleDialog::new(yes)));
            if memos.delete_memo(&url).await? {
                println!("Deleted {}", url);
            }
            Ok(())
        }
        Command::Export { url, output } => {
            let memo = store.get(&url).await?;
            tokio::fs::write(&output, &memo.audio)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} bytes to {}", memo.audio.len(), output.display());
            Ok(())
        }
        Command::Serve { input } => serve(&cfg, input.devices()?, store).await,
    }
}

fn memo_controller(store: Arc<dyn MemoStore>, dialog: Arc<dyn Dialog>) -> MemoController {
    MemoController::new(store, EventBus::new(), Arc::new(HistoryNavigator::new()), dialog)
}

async fn record(
    cfg: &Config,
    devices: Arc<dyn MediaDevices>,
    store: Arc<dyn MemoStore>,
    duration: Option<u64>,
) -> Result<()> {
    let controller = RecordController::new(
        devices,
        store,
        EventBus::new(),
        Arc::new(HistoryNavigator::new()),
        Arc::new(ConsoleDialog::new(false)),
        cfg.recorder.clone(),
    );

    controller.start_recording();
    eprintln!("Recording... press Enter to save, Ctrl-C to discard");

    if let Some(mut level) = controller.level() {
        tokio::spawn(async move {
            while level.changed().await.is_ok() {
                let current = *level.borrow_and_update();
                let lit = (current.normalized * 10.0).round() as usize;
                eprint!("\r[{:<10}]", "#".repeat(lit.min(10)));
                let _ = std::io::stderr().flush();
            }
        });
    }

    let limit = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    tokio::select! {
        _ = stdin.next_line() => controller.stop_recording(),
        _ = limit => controller.stop_recording(),
        _ = tokio::signal::ctrl_c() => controller.cancel(),
    }
    eprintln!();

    match controller.finished().await {
        Some(RecordingReport::Saved(url)) => println!("Saved memo {}", url),
        Some(RecordingReport::Cancelled) => println!("Recording discarded"),
        Some(RecordingReport::Failed(e)) => bail!("Recording failed: {}", e),
        Some(RecordingReport::Unsaved(e)) => bail!("Recording could not be stored: {}", e),
        None => {}
    }

    Ok(())
}

async fn list(store: Arc<dyn MemoStore>) -> Result<()> {
    let memos = memo_controller(store, Arc::new(AutoConfirmDialog)).list().await?;
    if memos.is_empty() {
        println!("No memos yet");
        return Ok(());
    }

    for memo in memos {
        println!("{}  {}  {}", memo.url, format_time(memo.time), memo.title);
    }

    Ok(())
}

async fn show(store: Arc<dyn MemoStore>, url: &str) -> Result<()> {
    let memos = memo_controller(store, Arc::new(AutoConfirmDialog));
    let Some(memo) = memos.open_details(url).await? else {
        bail!("No memo {}", url);
    };

    println!("{}", memo.title);
    println!("  url:      {}", memo.url);
    println!("  recorded: {}", format_time(memo.time));
    println!("  audio:    {} ({} bytes)", memo.audio_mime_type, memo.audio.len());
    if let Some(description) = &memo.description {
        println!("  {}", description);
    }
    println!("  {}", sparkline(&memo.volume_data, 60));

    Ok(())
}

async fn serve(cfg: &Config, devices: Arc<dyn MediaDevices>, store: Arc<dyn MemoStore>) -> Result<()> {
    let bus = EventBus::new();
    let navigator = Arc::new(HistoryNavigator::new());
    let dialog = Arc::new(AutoConfirmDialog);

    let recorder = Arc::new(RecordController::new(
        devices,
        store.clone(),
        bus.clone(),
        navigator.clone(),
        dialog.clone(),
        cfg.recorder.clone(),
    ));
    let memos = Arc::new(MemoController::new(store.clone(), bus, navigator, dialog));

    let app = create_router(AppState::new(recorder, memos, store));

    let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string())
}

/// Render normalized volume data as a one-line waveform
fn sparkline(data: &[f32], width: usize) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    if data.is_empty() || width == 0 {
        return String::new();
    }

    let per_column = data.len().div_ceil(width);
    data.chunks(per_column)
        .map(|chunk| {
            let peak = chunk.iter().copied().fold(0.0f32, f32::max).clamp(0.0, 1.0);
            BARS[(peak * (BARS.len() - 1) as f32).round() as usize]
        })
        .collect()
}
