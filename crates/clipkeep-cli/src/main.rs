use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipkeep_core::config::{self, Settings};
use clipkeep_core::{ClipboardEntry, ClipboardHistory, Content, EntryId, PollOutcome, SqlitePersistence};
use std::path::PathBuf;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipkeep", version, about = "clipkeep clipboard history")]
struct Cli {
    /// Database path (overrides settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Settings file (defaults to <config dir>/clipkeep/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a text entry (reads STDIN if omitted)
    Add { text: Option<String> },
    /// List entries, most recent first
    List {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Case-insensitive substring search
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Put an entry back on the system clipboard
    Copy { id: EntryId },
    /// Remove one entry, or everything when no id is given
    Delete { id: Option<EntryId> },
    /// Capture the current system clipboard once
    Check,
    /// Apply retention now
    Prune,
    /// Print the effective settings
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(p) => config::load_settings_from(p),
        None => config::load_settings(),
    };
    if let Some(db) = &cli.db {
        settings.storage.db_path = Some(db.clone());
    }

    if let Commands::Config = cli.command {
        print!("{}", settings.effective().to_toml());
        return Ok(());
    }

    let history = open_history(&settings)?;
    match cli.command {
        Commands::Add { text } => {
            let text = match text {
                Some(t) => t,
                None => {
                    use std::io::{self, Read};
                    let mut buf = String::new();
                    io::stdin().read_to_string(&mut buf)?;
                    if buf.ends_with('\n') {
                        buf.pop();
                    }
                    buf
                }
            };
            if text.is_empty() {
                anyhow::bail!("nothing to add");
            }
            let (entry, _) = history.add_content(Content::Text(text));
            println!("added {}", entry.id);
        }
        Commands::List { limit, json } => {
            let mut items = history.get_history();
            if let Some(l) = limit {
                items.truncate(l);
            }
            print_entries(&items, json)?;
        }
        Commands::Search { query, json } => {
            print_entries(&history.search_history(&query), json)?;
        }
        Commands::Copy { id } => {
            history.copy_item(id)?;
            println!("copied {id}");
        }
        Commands::Delete { id: Some(id) } => {
            history.remove_item(id)?;
            println!("deleted {id}");
        }
        Commands::Delete { id: None } => {
            let n = history.clear_history();
            println!("cleared {n}");
        }
        Commands::Check => match history.check_clipboard() {
            PollOutcome::Captured { entry, .. } => println!("captured {}", entry.id),
            PollOutcome::Skipped(reason) => anyhow::bail!("clipboard unavailable: {reason}"),
            PollOutcome::Empty => println!("clipboard empty"),
            PollOutcome::Unchanged | PollOutcome::Disabled => println!("unchanged"),
        },
        Commands::Prune => {
            let n = history.prune_now();
            println!("pruned {n}");
        }
        Commands::Config => {}
    }

    history.flush();
    if let Some(err) = history.persistence_error() {
        anyhow::bail!("saving history failed: {err}");
    }
    Ok(())
}

fn open_history(settings: &Settings) -> Result<ClipboardHistory> {
    let db_path = settings.db_path();
    let persistence = SqlitePersistence::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    let history = ClipboardHistory::open(
        Arc::new(persistence),
        clipkeep_core::clipboard::system(),
        settings.retention_policy(),
        settings.io_timeout(),
    )?;
    Ok(history)
}

fn print_entries(items: &[ClipboardEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }
    for e in items {
        println!(
            "{}\t{}\t{}\t{}",
            e.id,
            format_ts(e.timestamp),
            e.content_type,
            e.preview
        );
    }
    Ok(())
}

fn format_ts(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}
