// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;
use tracing::debug;

use wagate_core::WagateError;

use crate::migrations;

/// Handle to the SQLite database, shared across query modules.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if necessary) the database at `path`, applies
    /// PRAGMAs, and runs pending migrations.
    pub async fn open(path: &str) -> Result<Database, WagateError> {
        let conn = Connection::open(path).await.map_err(map_tr_err)?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            migrations::run_migrations(conn)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Database { conn })
    }

    /// Returns the shared connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoints the WAL before the handle is dropped.
    pub async fn close(&self) -> Result<(), WagateError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Maps a tokio-rusqlite error into the workspace error type.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> WagateError {
    WagateError::Storage {
        source: Box::new(e),
    }
}

/// Wraps a migration failure for transport across the closure boundary.
#[derive(Debug)]
pub struct MigrationError(pub String);

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "migration failed: {}", self.0)
    }
}

impl std::error::Error for MigrationError {}
