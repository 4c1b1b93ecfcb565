//! Opening connections for sessions.
//!
//! Every connection returned here has foreign keys enforced, a busy timeout
//! and the latest schema applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use crate::config::DatabaseSettings;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

enum Location<'a> {
    File(&'a Path),
    Memory,
}

impl Location<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        match self {
            Self::File(path) => Connection::open(path),
            Self::Memory => Connection::open_in_memory(),
        }
    }
}

/// Opens (creating if needed) the database file at `path`.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_at(Location::File(path.as_ref()), DEFAULT_BUSY_TIMEOUT)
}

/// Opens a private in-memory database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_at(Location::Memory, DEFAULT_BUSY_TIMEOUT)
}

/// Opens the database described by `settings`; no `path` means in-memory.
pub fn open_db_with(settings: &DatabaseSettings) -> DbResult<Connection> {
    let location = match settings.path.as_deref() {
        Some(path) => Location::File(path),
        None => Location::Memory,
    };
    open_at(location, Duration::from_millis(settings.busy_timeout_ms))
}

fn open_at(location: Location<'_>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = location.label();

    let result = location
        .connect()
        .map_err(DbError::from)
        .and_then(|mut conn| -> DbResult<Connection> {
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.busy_timeout(busy_timeout)?;
            apply_migrations(&mut conn)?;
            Ok(conn)
        });

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={} duration_ms={}",
            mode,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} duration_ms={} error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}
