// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations: lifecycle status, credential blobs, QR strings,
//! reconnect accounting, and restart recovery.

use rusqlite::{params, OptionalExtension, Row};

use wagate_core::{RestorableSession, SessionRecord, SessionStatus, WagateError};

use crate::database::{map_tr_err, Database};
use crate::queries::now_iso;

const SESSION_COLUMNS: &str = "session_id, org_id, phone_number, status, auth_state, last_qr,
     last_seen_at, error_message, reconnect_attempts, created_at";

fn row_to_session(row: &Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
    let status_str: String = row.get(3)?;
    let status: SessionStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SessionRecord {
        session_id: row.get(0)?,
        org_id: row.get(1)?,
        phone_number: row.get(2)?,
        status,
        auth_state: row.get(4)?,
        last_qr: row.get(5)?,
        last_seen_at: row.get(6)?,
        error_message: row.get(7)?,
        reconnect_attempts: row.get::<_, i64>(8)? as u32,
        created_at: row.get(9)?,
    })
}

/// Inserts a session row with initial status `connecting`.
///
/// A duplicate id surfaces as a validation error so the API edge can
/// report it without exposing storage internals.
pub async fn create_session(
    db: &Database,
    session_id: &str,
    org_id: &str,
) -> Result<SessionRecord, WagateError> {
    let session_id = session_id.to_string();
    let org_id = org_id.to_string();
    let now = now_iso();
    let record = SessionRecord {
        session_id: session_id.clone(),
        org_id: org_id.clone(),
        phone_number: None,
        status: SessionStatus::Connecting,
        auth_state: None,
        last_qr: None,
        last_seen_at: now.clone(),
        error_message: None,
        reconnect_attempts: 0,
        created_at: now.clone(),
    };
    let inserted = db
        .connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO whatsapp_sessions
                     (session_id, org_id, status, last_seen_at, created_at)
                 VALUES (?1, ?2, 'connecting', ?3, ?3)",
                params![session_id, org_id, now],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;
    if !inserted {
        return Err(WagateError::Validation(format!(
            "session id already exists: {}",
            record.session_id
        )));
    }
    Ok(record)
}

/// Gets a session by id.
pub async fn get_session(
    db: &Database,
    session_id: &str,
) -> Result<Option<SessionRecord>, WagateError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM whatsapp_sessions WHERE session_id = ?1"
            ))?;
            let result = stmt
                .query_row(params![session_id], row_to_session)
                .optional()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)
}

/// Lists an organization's sessions, newest first.
pub async fn list_sessions(
    db: &Database,
    org_id: &str,
) -> Result<Vec<SessionRecord>, WagateError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM whatsapp_sessions
                 WHERE org_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![org_id], row_to_session)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Loads the credential blob, if any.
pub async fn load_auth_state(
    db: &Database,
    session_id: &str,
) -> Result<Option<String>, WagateError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn
                .query_row(
                    "SELECT auth_state FROM whatsapp_sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            Ok(result.flatten())
        })
        .await
        .map_err(map_tr_err)
}

/// Idempotent full overwrite of the credential blob.
///
/// A single UPDATE is atomic with respect to concurrent readers on the
/// serialized connection.
pub async fn save_auth_state(
    db: &Database,
    session_id: &str,
    blob: &str,
) -> Result<(), WagateError> {
    let session_id = session_id.to_string();
    let blob = blob.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE whatsapp_sessions SET auth_state = ?1 WHERE session_id = ?2",
                params![blob, session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Drops the credential blob (logout / destroy path).
pub async fn delete_auth_state(db: &Database, session_id: &str) -> Result<(), WagateError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE whatsapp_sessions SET auth_state = NULL WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Updates status and `last_seen_at`; a `None` phone number leaves the
/// stored number unchanged.
pub async fn update_session_status(
    db: &Database,
    session_id: &str,
    status: SessionStatus,
    phone_number: Option<&str>,
    error_message: Option<&str>,
) -> Result<(), WagateError> {
    let session_id = session_id.to_string();
    let status = status.to_string();
    let phone_number = phone_number.map(|s| s.to_string());
    let error_message = error_message.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE whatsapp_sessions
                 SET status = ?1,
                     phone_number = COALESCE(?2, phone_number),
                     error_message = ?3,
                     last_seen_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE session_id = ?4",
                params![status, phone_number, error_message, session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persists the most recent pairing QR string.
pub async fn save_qr_code(db: &Database, session_id: &str, qr: &str) -> Result<(), WagateError> {
    let session_id = session_id.to_string();
    let qr = qr.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE whatsapp_sessions SET last_qr = ?1 WHERE session_id = ?2",
                params![qr, session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions worth restoring at process start: status in
/// {connected, connecting} with a non-null credential blob.
pub async fn list_restorable_sessions(
    db: &Database,
) -> Result<Vec<RestorableSession>, WagateError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, org_id, auth_state, phone_number
                 FROM whatsapp_sessions
                 WHERE status IN ('connected', 'connecting') AND auth_state IS NOT NULL
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RestorableSession {
                    session_id: row.get(0)?,
                    org_id: row.get(1)?,
                    auth_state: row.get(2)?,
                    phone_number: row.get(3)?,
                })
            })?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Flips `connecting` rows with no credential blob to `disconnected`.
///
/// Run once at process start, before restoration: a crash mid-pairing
/// leaves such rows behind, and without credentials they are invisible
/// to `list_restorable_sessions`.
pub async fn mark_stale_connecting_sessions(db: &Database) -> Result<u64, WagateError> {
    db.connection()
        .call(|conn| {
            let swept = conn.execute(
                "UPDATE whatsapp_sessions
                 SET status = 'disconnected',
                     last_seen_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'connecting' AND auth_state IS NULL",
                [],
            )?;
            Ok(swept as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Bumps the reconnect counter and returns the new value.
pub async fn increment_reconnect_attempts(
    db: &Database,
    session_id: &str,
) -> Result<u32, WagateError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE whatsapp_sessions
                 SET reconnect_attempts = reconnect_attempts + 1
                 WHERE session_id = ?1",
                params![session_id],
            )?;
            let attempts: i64 = conn.query_row(
                "SELECT reconnect_attempts FROM whatsapp_sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(attempts as u32)
        })
        .await
        .map_err(map_tr_err)
}

/// Zeroes the reconnect counter (successful connect).
pub async fn reset_reconnect_attempts(
    db: &Database,
    session_id: &str,
) -> Result<(), WagateError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE whatsapp_sessions SET reconnect_attempts = 0 WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Non-error sessions currently owned by the org.
pub async fn count_active_sessions(db: &Database, org_id: &str) -> Result<u64, WagateError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM whatsapp_sessions
                 WHERE org_id = ?1 AND status != 'error'",
                params![org_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::organizations;
    use tempfile::tempdir;
    use wagate_core::{OrganizationInput, SubscriptionTier};

    async fn setup() -> (Database, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let org = organizations::create_organization(
            &db,
            OrganizationInput {
                name: "Acme".into(),
                owner_id: "user-1".into(),
                tier: SubscriptionTier::Free,
                max_accounts: 3,
                max_messages_per_month: 1000,
                webhook_url: None,
                crm_api_key: None,
                crm_location_id: None,
            },
        )
        .await
        .unwrap();
        (db, org.id, dir)
    }

    #[tokio::test]
    async fn create_starts_connecting_with_zero_attempts() {
        let (db, org_id, _dir) = setup().await;
        let session = create_session(&db, "s1", &org_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Connecting);
        assert_eq!(session.reconnect_attempts, 0);
        assert!(session.phone_number.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let (db, org_id, _dir) = setup().await;
        create_session(&db, "s1", &org_id).await.unwrap();
        let result = create_session(&db, "s1", &org_id).await;
        assert!(matches!(result, Err(WagateError::Validation(_))));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn auth_state_round_trips_byte_equal() {
        let (db, org_id, _dir) = setup().await;
        create_session(&db, "s1", &org_id).await.unwrap();

        let blob = r#"{"creds":{"noiseKey":{"__wag_bytes__":"AQIDBA=="}}}"#;
        save_auth_state(&db, "s1", blob).await.unwrap();
        let loaded = load_auth_state(&db, "s1").await.unwrap().unwrap();
        assert_eq!(loaded, blob);

        // Overwrite is idempotent.
        save_auth_state(&db, "s1", blob).await.unwrap();
        assert_eq!(load_auth_state(&db, "s1").await.unwrap().unwrap(), blob);

        delete_auth_state(&db, "s1").await.unwrap();
        assert!(load_auth_state(&db, "s1").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn null_phone_argument_preserves_stored_number() {
        let (db, org_id, _dir) = setup().await;
        create_session(&db, "s1", &org_id).await.unwrap();

        update_session_status(&db, "s1", SessionStatus::Connected, Some("5551234567"), None)
            .await
            .unwrap();
        update_session_status(&db, "s1", SessionStatus::Disconnected, None, None)
            .await
            .unwrap();

        let session = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert_eq!(session.phone_number.as_deref(), Some("5551234567"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn restorable_sessions_need_status_and_auth() {
        let (db, org_id, _dir) = setup().await;
        create_session(&db, "restorable", &org_id).await.unwrap();
        save_auth_state(&db, "restorable", "{}").await.unwrap();
        update_session_status(&db, "restorable", SessionStatus::Connected, Some("555"), None)
            .await
            .unwrap();

        // Connecting but no auth blob: not restorable.
        create_session(&db, "no-auth", &org_id).await.unwrap();

        // Has auth but disconnected: not restorable.
        create_session(&db, "disconnected", &org_id).await.unwrap();
        save_auth_state(&db, "disconnected", "{}").await.unwrap();
        update_session_status(&db, "disconnected", SessionStatus::Disconnected, None, None)
            .await
            .unwrap();

        let restorable = list_restorable_sessions(&db).await.unwrap();
        assert_eq!(restorable.len(), 1);
        assert_eq!(restorable[0].session_id, "restorable");
        assert_eq!(restorable[0].phone_number.as_deref(), Some("555"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_sweep_only_touches_credential_less_connecting_rows() {
        let (db, org_id, _dir) = setup().await;

        // Crashed mid-pairing: connecting, no credentials.
        create_session(&db, "stale", &org_id).await.unwrap();

        // Connecting with credentials: restorable, must be left alone.
        create_session(&db, "resumable", &org_id).await.unwrap();
        save_auth_state(&db, "resumable", "{}").await.unwrap();

        // Connected with credentials: untouched.
        create_session(&db, "live", &org_id).await.unwrap();
        save_auth_state(&db, "live", "{}").await.unwrap();
        update_session_status(&db, "live", SessionStatus::Connected, Some("555"), None)
            .await
            .unwrap();

        let swept = mark_stale_connecting_sessions(&db).await.unwrap();
        assert_eq!(swept, 1);

        let stale = get_session(&db, "stale").await.unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Disconnected);
        let resumable = get_session(&db, "resumable").await.unwrap().unwrap();
        assert_eq!(resumable.status, SessionStatus::Connecting);
        let live = get_session(&db, "live").await.unwrap().unwrap();
        assert_eq!(live.status, SessionStatus::Connected);

        // A second sweep finds nothing.
        assert_eq!(mark_stale_connecting_sessions(&db).await.unwrap(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_counter_increments_and_resets() {
        let (db, org_id, _dir) = setup().await;
        create_session(&db, "s1", &org_id).await.unwrap();

        assert_eq!(increment_reconnect_attempts(&db, "s1").await.unwrap(), 1);
        assert_eq!(increment_reconnect_attempts(&db, "s1").await.unwrap(), 2);
        reset_reconnect_attempts(&db, "s1").await.unwrap();
        let session = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(session.reconnect_attempts, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn active_count_excludes_error_sessions() {
        let (db, org_id, _dir) = setup().await;
        create_session(&db, "ok-1", &org_id).await.unwrap();
        create_session(&db, "ok-2", &org_id).await.unwrap();
        create_session(&db, "bad", &org_id).await.unwrap();
        update_session_status(&db, "bad", SessionStatus::Error, None, Some("max retries"))
            .await
            .unwrap();

        assert_eq!(count_active_sessions(&db, &org_id).await.unwrap(), 2);
        db.close().await.unwrap();
    }
}
