//! Durable external session backend, backed by DuckDB.
//!
//! Generalizes `squall::memory::global::GlobalWriter`'s actor shape: a
//! background `std::thread::spawn` worker owns the (non-`Send`-friendly,
//! synchronous) `duckdb::Connection`; the async-facing `ExternalBackend`
//! talks to it over an `mpsc` channel with `oneshot` replies. Sessions are
//! stored as JSON blobs keyed by id, with a `version` column so an older
//! document shape can be migrated on read (spec §6).

use std::path::Path;
use std::sync::mpsc;

use duckdb::params;

use crate::domain::session::{Session, SESSION_SCHEMA_VERSION};
use crate::error::SessionError;

const DDL_SESSIONS: &str = "\
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    ended BOOLEAN NOT NULL DEFAULT FALSE,
    document TEXT NOT NULL
);";

enum Command {
    Put {
        session: Box<Session>,
        reply: tokio::sync::oneshot::Sender<Result<(), String>>,
    },
    Get {
        id: String,
        reply: tokio::sync::oneshot::Sender<Result<Session, String>>,
    },
    End {
        id: String,
        reply: tokio::sync::oneshot::Sender<Result<(), String>>,
    },
    Delete {
        id: String,
        reply: tokio::sync::oneshot::Sender<Result<(), String>>,
    },
    Shutdown,
}

pub struct ExternalBackend {
    tx: mpsc::SyncSender<Command>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl ExternalBackend {
    pub fn open(db_path: &Path) -> Result<Self, SessionError> {
        let conn = duckdb::Connection::open(db_path)
            .map_err(|e| SessionError::Backend(format!("failed to open session db: {e}")))?;
        conn.execute_batch(DDL_SESSIONS)
            .map_err(|e| SessionError::Backend(format!("failed to initialize schema: {e}")))?;

        let (tx, rx) = mpsc::sync_channel::<Command>(64);
        let worker = std::thread::spawn(move || run_worker(conn, rx));

        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    pub async fn put(&self, session: &Session) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Command::Put {
                session: Box::new(session.clone()),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Backend("session db worker unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Backend("session db worker dropped reply".to_string()))?
            .map_err(SessionError::Backend)
    }

    pub async fn get(&self, id: &str) -> Result<Session, SessionError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Command::Get {
                id: id.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Backend("session db worker unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Backend("session db worker dropped reply".to_string()))?
            .map_err(SessionError::Backend)
    }

    pub async fn end(&self, id: &str) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Command::End {
                id: id.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Backend("session db worker unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Backend("session db worker dropped reply".to_string()))?
            .map_err(SessionError::Backend)
    }

    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Command::Delete {
                id: id.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Backend("session db worker unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Backend("session db worker dropped reply".to_string()))?
            .map_err(SessionError::Backend)
    }
}

impl Drop for ExternalBackend {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(conn: duckdb::Connection, rx: mpsc::Receiver<Command>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Put { session, reply } => {
                let _ = reply.send(put_session(&conn, &session));
            }
            Command::Get { id, reply } => {
                let _ = reply.send(get_session(&conn, &id));
            }
            Command::End { id, reply } => {
                let _ = reply.send(set_ended(&conn, &id));
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(delete_session(&conn, &id));
            }
            Command::Shutdown => break,
        }
    }
}

fn put_session(conn: &duckdb::Connection, session: &Session) -> Result<(), String> {
    let document = serde_json::to_string(session).map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO sessions (id, version, ended, document) VALUES (?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET version = excluded.version, ended = excluded.ended, document = excluded.document",
        params![
            session.id,
            session.version as i32,
            matches!(session.status, crate::domain::session::SessionStatus::Ended),
            document
        ],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

fn get_session(conn: &duckdb::Connection, id: &str) -> Result<Session, String> {
    let document: String = conn
        .query_row("SELECT document FROM sessions WHERE id = ?", params![id], |row| {
            row.get(0)
        })
        .map_err(|e| e.to_string())?;
    migrate_and_parse(&document)
}

fn set_ended(conn: &duckdb::Connection, id: &str) -> Result<(), String> {
    conn.execute("UPDATE sessions SET ended = TRUE WHERE id = ?", params![id])
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn delete_session(conn: &duckdb::Connection, id: &str) -> Result<(), String> {
    conn.execute("DELETE FROM sessions WHERE id = ?", params![id])
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Parses a stored document, migrating forward if it predates
/// `SESSION_SCHEMA_VERSION` (spec §6: "migrated on read if an older version
/// is encountered"). There is only one version so far; this is the seam
/// a future migration slots into.
fn migrate_and_parse(document: &str) -> Result<Session, String> {
    let mut value: serde_json::Value = serde_json::from_str(document).map_err(|e| e.to_string())?;
    let stored_version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
    if stored_version < SESSION_SCHEMA_VERSION as u64
        && let Some(obj) = value.as_object_mut()
    {
        obj.insert(
            "version".to_string(),
            serde_json::Value::from(SESSION_SCHEMA_VERSION),
        );
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}
