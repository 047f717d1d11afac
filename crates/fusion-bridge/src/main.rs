mod host_io;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fusion_core::catalog::Catalog;
use fusion_core::frame::{
    encode_frame, HostEnvelope, HostMsg, NdjsonFrameDecoder, DEFAULT_MAX_FRAME_BYTES,
};
use fusion_engine::{spawn_driver, DriverInput, Engine, EngineConfig};
use host_io::FrameHost;
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

const INPUT_CAPACITY: usize = 256;
const READ_CHUNK_BYTES: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Profile {
    Default,
    Conservative,
}

#[derive(Clone, Debug)]
struct Config {
    catalog: Option<PathBuf>,
    session_id: String,
    debug: bool,
    log_dir: Option<PathBuf>,
    profile: Profile,
    engine: EngineConfig,
}

#[derive(Parser, Debug)]
#[command(name = "fusion-bridge")]
struct Args {
    /// Item catalog JSON document.
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "default")]
    profile: Profile,
    /// Override the inventory debounce of the selected profile.
    #[arg(long)]
    debounce_ms: Option<u64>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Directory for the per-session log file; stderr only when unset.
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value = "")]
    session: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = load_config();
    init_logging(&config);
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(event = "bridge_error", error = %format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let catalog_path = config
        .catalog
        .clone()
        .context("no catalog configured (pass --catalog or set FUSION_CATALOG)")?;
    let catalog = Catalog::load(&catalog_path)
        .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;

    info!(
        event = "bridge_start",
        session_id = %config.session_id,
        catalog = %catalog_path.display(),
        item_types = catalog.type_names().count(),
        profile = ?config.profile
    );

    let (out_tx, out_rx) = mpsc::unbounded_channel::<HostEnvelope>();
    let player = Arc::new(AtomicU64::new(0));
    let host = FrameHost::new(out_tx, player.clone());
    let (input_tx, driver) = spawn_driver(Engine::new(catalog, config.engine), host, INPUT_CAPACITY);
    let writer = tokio::spawn(write_frames(out_rx));

    let read_result = tokio::select! {
        result = read_frames(&input_tx, &player) => result,
        _ = tokio::signal::ctrl_c() => {
            info!(event = "bridge_interrupted");
            Ok(())
        }
    };

    // Shutdown runs cleanup, which may still emit a cancel frame.
    let _ = input_tx.send(DriverInput::Shutdown).await;
    drop(input_tx);
    let driver = driver.await.context("driver task failed")?;
    drop(driver);
    writer.await.context("writer task failed")??;
    read_result?;

    info!(event = "bridge_stop", session_id = %config.session_id);
    Ok(())
}

async fn read_frames(input_tx: &mpsc::Sender<DriverInput>, player: &AtomicU64) -> Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut decoder = NdjsonFrameDecoder::<HostEnvelope>::new(DEFAULT_MAX_FRAME_BYTES);
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = stdin.read(&mut buf).await.context("failed to read stdin")?;
        let report = if read == 0 {
            decoder.finish()
        } else {
            decoder.push_chunk(&buf[..read])
        };
        for err in report.errors {
            warn!(event = "frame_decode_failed", error = %err);
        }
        for envelope in report.frames {
            if !dispatch(envelope, input_tx, player).await {
                return Ok(());
            }
        }
        if read == 0 {
            debug!(event = "stdin_closed");
            return Ok(());
        }
    }
}

/// Forward one host frame. Returns false once the bridge should stop reading.
async fn dispatch(
    envelope: HostEnvelope,
    input_tx: &mpsc::Sender<DriverInput>,
    player: &AtomicU64,
) -> bool {
    let input = match envelope.msg {
        HostMsg::Hello(hello) => {
            player.store(hello.game_id, Ordering::Relaxed);
            info!(
                event = "host_hello",
                game_id = hello.game_id,
                name = hello.name.as_deref().unwrap_or("")
            );
            return true;
        }
        HostMsg::Packet(packet) => DriverInput::Packet(packet),
        HostMsg::Command(command) => DriverInput::Command(command.args),
        HostMsg::Shutdown => {
            info!(event = "host_shutdown");
            return false;
        }
        HostMsg::Send(_) | HostMsg::Message(_) | HostMsg::Hook(_) | HostMsg::Unhook(_) => {
            warn!(event = "frame_unexpected", version = envelope.version.0);
            return true;
        }
    };
    input_tx.send(input).await.is_ok()
}

async fn write_frames(mut rx: mpsc::UnboundedReceiver<HostEnvelope>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(envelope) = rx.recv().await {
        match encode_frame(&envelope, DEFAULT_MAX_FRAME_BYTES) {
            Ok(bytes) => {
                stdout
                    .write_all(&bytes)
                    .await
                    .context("failed to write frame")?;
                stdout.flush().await.context("failed to flush stdout")?;
            }
            Err(err) => warn!(event = "frame_encode_failed", error = %err),
        }
    }
    Ok(())
}

fn load_config() -> Config {
    config_from_args(Args::parse())
}

/// Flags win; each unset flag falls back to its `FUSION_*` variable.
fn config_from_args(args: Args) -> Config {
    let session_id = non_empty(args.session)
        .or_else(|| env_nonempty("FUSION_SESSION_ID"))
        .unwrap_or_else(|| format!("pid-{}", std::process::id()));
    let catalog = args
        .catalog
        .or_else(|| env_nonempty("FUSION_CATALOG").map(PathBuf::from));
    let log_dir = non_empty(args.log_dir)
        .or_else(|| env_nonempty("FUSION_LOG_DIR"))
        .map(PathBuf::from);
    let debug = args.debug
        || env_nonempty("FUSION_DEBUG").is_some_and(|value| {
            matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
        });
    Config {
        catalog,
        session_id,
        debug,
        log_dir,
        profile: args.profile,
        engine: engine_config(args.profile, args.debounce_ms),
    }
}

fn engine_config(profile: Profile, debounce_ms: Option<u64>) -> EngineConfig {
    let mut engine = match profile {
        Profile::Default => EngineConfig::default(),
        Profile::Conservative => EngineConfig::conservative(),
    };
    if let Some(ms) = debounce_ms {
        engine.debounce = Duration::from_millis(ms);
    }
    engine
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(non_empty)
}

fn init_logging(config: &Config) {
    let level = std::env::var("FUSION_LOG_LEVEL")
        .unwrap_or_else(|_| (if config.debug { "debug" } else { "info" }).to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let sink = match &config.log_dir {
        Some(dir) => LogSink::session_file(dir, &config.session_id).unwrap_or_else(|err| {
            eprintln!("log_file_error: {err}");
            LogSink::default()
        }),
        None => LogSink::default(),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(sink)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Log output: always stderr, plus the session log file when one is open.
/// stdout carries protocol frames only, so nothing here may touch it.
#[derive(Clone, Default)]
struct LogSink {
    file: Option<Arc<Mutex<File>>>,
}

impl LogSink {
    fn session_file(dir: &Path, session_id: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("fusion-bridge-{session_id}.log"));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(Ok(mut file)) = self.file.as_ref().map(|file| file.lock()) {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(Ok(mut file)) = self.file.as_ref().map(|file| file.lock()) {
            let _ = file.flush();
        }
        Ok(())
    }
}
