//! Line-delimited JSON protocol spoken on the daemon socket.

use clipkeep_core::{
    AddKind, ClipboardEntry, ClipboardHistory, Content, EntryId, Error, PollOutcome, RetentionPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Health,
    Check,
    List {
        #[serde(default)]
        limit: Option<usize>,
    },
    Search {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    Copy {
        id: u64,
    },
    Remove {
        id: u64,
    },
    Clear,
    Prune,
    Watch {
        enabled: bool,
    },
    Settings,
    SetRetention {
        max_items: i64,
        expiry_days: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub ok: bool,
    pub data: Option<Value>,
    pub error: Option<ErrorBody>,
}

impl Response {
    fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }
}

impl From<Error> for Response {
    fn from(e: Error) -> Self {
        Response::err(e.kind(), e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: u64,
    pub content: Value,
    pub content_type: String,
    pub timestamp: i64,
    pub preview: String,
    pub hash: String,
}

impl From<&ClipboardEntry> for Item {
    fn from(e: &ClipboardEntry) -> Self {
        Item {
            id: e.id.0,
            content: render_content(&e.content),
            content_type: e.content_type.to_string(),
            timestamp: e.timestamp,
            preview: e.preview.clone(),
            hash: e.hash.to_hex(),
        }
    }
}

/// Payloads are inlined except binary ones, which are summarized.
fn render_content(content: &Content) -> Value {
    match content {
        Content::Text(s) => json!(s),
        Content::Html { html, alt_text } => json!({ "html": html, "alt_text": alt_text }),
        Content::FileList(paths) => json!(paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()),
        Content::Image(img) => json!({
            "width": img.width,
            "height": img.height,
            "bytes": img.bytes.len(),
        }),
        Content::Other { mime, bytes } => json!({ "mime": mime, "bytes": bytes.len() }),
    }
}

fn items<'a>(entries: impl IntoIterator<Item = &'a ClipboardEntry>, limit: Option<usize>) -> Value {
    let items: Vec<Item> = entries
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(Item::from)
        .collect();
    json!(items)
}

fn outcome(o: &PollOutcome) -> Value {
    match o {
        PollOutcome::Captured { entry, kind } => json!({
            "outcome": "captured",
            "kind": match kind {
                AddKind::Inserted => "inserted",
                AddKind::Refreshed => "refreshed",
                AddKind::MovedToFront => "moved_to_front",
            },
            "item": Item::from(entry),
        }),
        PollOutcome::Unchanged => json!({ "outcome": "unchanged" }),
        PollOutcome::Empty => json!({ "outcome": "empty" }),
        PollOutcome::Disabled => json!({ "outcome": "disabled" }),
        PollOutcome::Skipped(reason) => json!({ "outcome": "skipped", "reason": reason }),
    }
}

fn settings(history: &ClipboardHistory) -> Value {
    let policy = history.retention();
    json!({
        "max_items": policy.max_items(),
        "expiry_days": policy.expiry_days(),
        "watching": history.is_watching(),
    })
}

/// Executes one request. May block on clipboard I/O.
pub fn handle(history: &ClipboardHistory, req: Request) -> Response {
    match req {
        Request::Health => Response::ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "now": OffsetDateTime::now_utc().unix_timestamp(),
            "entries": history.len(),
            "watching": history.is_watching(),
            "persistence_error": history.persistence_error(),
        })),
        Request::Check => Response::ok(outcome(&history.check_clipboard())),
        Request::List { limit } => Response::ok(items(&history.get_history(), limit)),
        Request::Search { query, limit } => {
            Response::ok(items(&history.search_history(&query), limit))
        }
        Request::Copy { id } => match history.copy_item(EntryId(id)) {
            Ok(e) => Response::ok(json!(Item::from(&e))),
            Err(e) => e.into(),
        },
        Request::Remove { id } => match history.remove_item(EntryId(id)) {
            Ok(e) => Response::ok(json!({ "removed": e.id.0 })),
            Err(e) => e.into(),
        },
        Request::Clear => Response::ok(json!({ "removed": history.clear_history() })),
        Request::Prune => Response::ok(json!({ "evicted": history.prune_now() })),
        Request::Watch { enabled } => {
            history.set_watching(enabled);
            Response::ok(settings(history))
        }
        Request::Settings => Response::ok(settings(history)),
        Request::SetRetention {
            max_items,
            expiry_days,
        } => match RetentionPolicy::from_raw(max_items, expiry_days) {
            Ok(policy) => {
                history.update_retention(policy);
                Response::ok(settings(history))
            }
            Err(e) => e.into(),
        },
    }
}

/// Parses and executes one protocol line, returning the serialized reply.
pub fn handle_line(history: &ClipboardHistory, line: &str) -> String {
    let resp = match serde_json::from_str::<Request>(line) {
        Ok(req) => handle(history, req),
        Err(e) => Response::err("bad_request", format!("bad request: {e}")),
    };
    encode(&resp)
}

/// A ready-to-send error reply for input that never reached a handler.
pub fn error_line(kind: &str, message: impl Into<String>) -> String {
    encode(&Response::err(kind, message))
}

fn encode(resp: &Response) -> String {
    serde_json::to_string(resp).unwrap_or_else(|e| {
        format!(r#"{{"ok":false,"data":null,"error":{{"kind":"bad_request","message":"{e}"}}}}"#)
    })
}
