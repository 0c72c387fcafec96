//! SQLite persistence adapter.

use crate::entry::{Candidate, ClipboardEntry, Content, ContentType, EntryId, ImageRgba};
use crate::error::{Error, Result};
use crate::persist::Persistence;
use crate::store::Snapshot;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageFormat};
use include_dir::{include_dir, Dir};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static MIGRATIONS: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");

pub struct SqlitePersistence {
    path: PathBuf,
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub current: i64,
    pub latest: i64,
    pub pending: Vec<String>,
}

/// Per-kind extras stored next to the payload.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alt_text: Option<String>,
}

struct Encoded {
    blob: Vec<u8>,
    mime: Option<String>,
    meta: Option<String>,
}

impl SqlitePersistence {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(&path)?;
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.busy_timeout(std::time::Duration::from_millis(5000));
        run_migrations(&conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn migration_status(&self) -> Result<MigrationStatus> {
        let conn = self.conn();
        let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        let versions = migration_files();
        let latest = versions.last().map(|(v, _, _)| *v).unwrap_or(0);
        let pending = versions
            .into_iter()
            .filter(|(v, _, _)| *v > current)
            .map(|(_, name, _)| name)
            .collect();
        Ok(MigrationStatus {
            current,
            latest,
            pending,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn migration_files() -> Vec<(i64, String, &'static str)> {
    let mut files: Vec<_> = MIGRATIONS
        .files()
        .filter(|f| f.path().extension().map(|e| e == "sql").unwrap_or(false))
        .filter_map(|f| {
            let name = f.path().file_name()?.to_string_lossy().to_string();
            let ver = parse_version_prefix(&f.path().file_stem()?.to_string_lossy())? as i64;
            Some((ver, name, f.contents_utf8()?))
        })
        .collect();
    files.sort_by_key(|(v, _, _)| *v);
    files
}

fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    for (ver, name, sql) in migration_files() {
        if ver <= current {
            continue;
        }
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {ver}"))?;
        tx.commit()?;
        tracing::debug!(migration = %name, "applied migration");
    }
    Ok(())
}

pub(crate) fn parse_version_prefix(name: &str) -> Option<u32> {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse::<u32>().ok()
    }
}

fn encode(content: &Content) -> Result<Encoded> {
    let (blob, mime, meta) = match content {
        Content::Text(s) => (s.as_bytes().to_vec(), None, None),
        Content::Html { html, alt_text } => (
            html.as_bytes().to_vec(),
            None,
            Some(Meta {
                alt_text: alt_text.clone(),
            }),
        ),
        Content::FileList(paths) => (serde_json::to_vec(paths)?, None, None),
        Content::Image(img) => (encode_png(img)?, Some("image/png".to_string()), None),
        Content::Other { mime, bytes } => (bytes.clone(), Some(mime.clone()), None),
    };
    let meta = meta.map(|m| serde_json::to_string(&m)).transpose()?;
    Ok(Encoded { blob, mime, meta })
}

fn decode(
    kind: ContentType,
    blob: Vec<u8>,
    mime: Option<String>,
    meta: Option<String>,
) -> Result<Content> {
    let meta: Meta = match meta {
        Some(m) => serde_json::from_str(&m)?,
        None => Meta::default(),
    };
    let utf8 = |b: Vec<u8>| String::from_utf8(b).map_err(|e| Error::Persistence(e.to_string()));
    Ok(match kind {
        ContentType::Text => Content::Text(utf8(blob)?),
        ContentType::Html => Content::Html {
            html: utf8(blob)?,
            alt_text: meta.alt_text,
        },
        ContentType::FileList => Content::FileList(serde_json::from_slice(&blob)?),
        ContentType::Image => Content::Image(decode_png(&blob)?),
        ContentType::Other => Content::Other {
            mime: mime.unwrap_or_else(|| "application/octet-stream".into()),
            bytes: blob,
        },
    })
}

fn encode_png(img: &ImageRgba) -> Result<Vec<u8>> {
    let expected = img.width as usize * img.height as usize * 4;
    if img.bytes.len() != expected {
        return Err(Error::Persistence(format!(
            "image buffer is {} bytes, expected {expected} for {}x{} rgba",
            img.bytes.len(),
            img.width,
            img.height
        )));
    }
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        &img.bytes,
        img.width,
        img.height,
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}

fn decode_png(bytes: &[u8]) -> Result<ImageRgba> {
    let rgba = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageRgba {
        width,
        height,
        bytes: rgba.into_raw(),
    })
}

impl Persistence for SqlitePersistence {
    fn load(&self) -> Result<Snapshot> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, kind, content, mime, meta, timestamp FROM entries ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, kind, blob, mime, meta, timestamp) = row?;
            let decoded = kind
                .parse::<ContentType>()
                .map_err(Error::Persistence)
                .and_then(|k| decode(k, blob, mime, meta));
            match decoded {
                Ok(content) => entries.push(ClipboardEntry::new(
                    EntryId(id as u64),
                    Candidate::new(content),
                    timestamp,
                )),
                Err(e) => tracing::warn!(id, error = %e, "skipping unreadable history row"),
            }
        }
        let next_id: Option<i64> = conn
            .query_row("SELECT value FROM meta WHERE key = 'next_id'", [], |r| r.get(0))
            .optional()?;
        Ok(Snapshot {
            entries,
            next_id: next_id.unwrap_or(1).max(1) as u64,
            generation: 0,
        })
    }

    /// Writes only what changed: rows for evicted ids are deleted, surviving
    /// rows get their position and timestamp updated, and payloads are encoded
    /// for new ids only. A stored row whose hash differs from the entry with
    /// the same id is replaced rather than updated.
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let existing: HashMap<i64, String> = {
            let mut stmt = tx.prepare("SELECT id, hash FROM entries")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
            let map = rows.collect::<std::result::Result<_, _>>()?;
            map
        };
        let wanted: HashMap<i64, String> = snapshot
            .entries
            .iter()
            .map(|e| (e.id.0 as i64, e.hash.to_hex()))
            .collect();
        // Deletes run before any insert so a replaced payload can reuse its
        // hash under a different id.
        let mut stale = 0usize;
        for (id, hash) in &existing {
            if wanted.get(id) != Some(hash) {
                tx.execute("DELETE FROM entries WHERE id = ?1", params![id])?;
                stale += 1;
            }
        }
        for (pos, e) in snapshot.entries.iter().enumerate() {
            let id = e.id.0 as i64;
            let hash = &wanted[&id];
            if existing.get(&id) == Some(hash) {
                tx.execute(
                    "UPDATE entries SET position = ?1, timestamp = ?2 WHERE id = ?3",
                    params![pos as i64, e.timestamp, id],
                )?;
            } else {
                let enc = encode(&e.content)?;
                tx.execute(
                    "INSERT INTO entries(id, position, kind, content, mime, meta, hash, timestamp) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        pos as i64,
                        e.content_type.as_str(),
                        enc.blob,
                        enc.mime,
                        enc.meta,
                        hash,
                        e.timestamp
                    ],
                )?;
            }
        }
        tracing::trace!(rows = snapshot.entries.len(), stale, "history saved");
        tx.execute(
            "INSERT INTO meta(key, value) VALUES('next_id', ?1) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![snapshot.next_id as i64],
        )?;
        tx.commit()?;
        Ok(())
    }
}
