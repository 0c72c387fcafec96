use anyhow::{Context, Result};
use clap::Parser;
use clipkeep_core::config::{self, Settings};
use clipkeep_core::{ClipboardHistory, NoPersistence, Persistence, PollOutcome, SqlitePersistence};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

mod protocol;

/// Longest request line accepted, newline included.
const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "clipkeep-clipd", version, about = "clipkeep clipboard daemon")]
struct Cli {
    /// Optional database path (overrides settings)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Settings file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listening port on 127.0.0.1 (0 = auto)
    #[arg(long, default_value_t = 0)]
    port: u16,
    /// Start with clipboard watching switched off
    #[arg(long, default_value_t = false)]
    no_watch: bool,
    /// Clipboard poll interval in milliseconds (overrides settings)
    #[arg(long)]
    poll_ms: Option<u64>,
    /// Exit automatically after N milliseconds (for CI/testing)
    #[arg(long)]
    exit_after_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DaemonInfo {
    port: u16,
    started_at: i64,
    pid: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(p) => config::load_settings_from(p),
        None => config::load_settings(),
    };
    let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path());
    let poll = cli
        .poll_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or_else(|| settings.poll_interval());

    let history = Arc::new(open_history(&settings, &db_path)?);
    if cli.no_watch || !settings.watcher.enabled {
        history.set_watching(false);
    }

    let listener = TcpListener::bind(("127.0.0.1", cli.port))
        .await
        .with_context(|| format!("binding 127.0.0.1:{}", cli.port))?;
    let port = listener.local_addr()?.port();
    write_daemon_info(port)?;
    tracing::info!(port, db = %db_path.display(), poll_ms = poll.as_millis() as u64, "clipd listening");

    tokio::spawn(watch_loop(Arc::clone(&history), poll));

    let exit_after = async {
        match cli.exit_after_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(exit_after);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let h = Arc::clone(&history);
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(h, stream).await {
                            tracing::warn!(%peer, error = %e, "client error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept error"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; shutting down");
                break;
            }
            _ = &mut exit_after => {
                tracing::info!("exit timer elapsed; shutting down");
                break;
            }
        }
    }

    let h = Arc::clone(&history);
    tokio::task::spawn_blocking(move || h.flush()).await?;
    Ok(())
}

/// A database that cannot be opened downgrades to an in-memory history.
fn open_history(settings: &Settings, db_path: &Path) -> Result<ClipboardHistory> {
    let persistence: Arc<dyn Persistence> = match SqlitePersistence::open(db_path) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::warn!(db = %db_path.display(), error = %e, "database unavailable; history will not be saved");
            Arc::new(NoPersistence)
        }
    };
    let history = ClipboardHistory::open(
        persistence,
        clipkeep_core::clipboard::system(),
        settings.retention_policy(),
        settings.io_timeout(),
    )?;
    Ok(history)
}

async fn watch_loop(history: Arc<ClipboardHistory>, poll: Duration) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let h = Arc::clone(&history);
        match tokio::task::spawn_blocking(move || h.tick()).await {
            Ok(PollOutcome::Skipped(reason)) => tracing::debug!(%reason, "poll skipped"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "poll task failed"),
        }
    }
}

async fn serve_client(history: Arc<ClipboardHistory>, stream: TcpStream) -> Result<()> {
    let (reader, writer) = stream.into_split();
    serve_lines(history, reader, writer).await
}

/// Answers one request per line. A line longer than [`MAX_LINE_BYTES`] gets an
/// error reply and ends the connection.
async fn serve_lines<R, W>(history: Arc<ClipboardHistory>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader).take(0);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        reader.set_limit(MAX_LINE_BYTES as u64 + 1);
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if !buf.ends_with(b"\n") && buf.len() > MAX_LINE_BYTES {
            tracing::warn!(bytes = buf.len(), "request line too long; closing connection");
            let reply = protocol::error_line(
                "bad_request",
                format!("request line exceeds {MAX_LINE_BYTES} bytes"),
            );
            send_line(&mut writer, &reply).await?;
            return Ok(());
        }
        let reply = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => {
                let line = line.trim().to_string();
                let h = Arc::clone(&history);
                tokio::task::spawn_blocking(move || protocol::handle_line(&h, &line)).await?
            }
            Err(_) => protocol::error_line("bad_request", "request is not valid UTF-8"),
        };
        send_line(&mut writer, &reply).await?;
    }
    tracing::debug!("client disconnected");
    Ok(())
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

fn write_daemon_info(port: u16) -> Result<()> {
    let info = DaemonInfo {
        port,
        started_at: OffsetDateTime::now_utc().unix_timestamp(),
        pid: std::process::id(),
    };
    let path = config::config_dir().join("clipd.json");
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&info)?)?;
    Ok(())
}
