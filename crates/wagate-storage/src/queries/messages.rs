// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence: insert with duplicate detection, CRM sync marks,
//! status transitions, and the pending-sync backlog query.

use rusqlite::{params, Row};
use uuid::Uuid;

use wagate_core::{MessageDirection, MessageInput, MessageRecord, MessageStatus, WagateError};

use crate::database::{map_tr_err, Database};

const MESSAGE_COLUMNS: &str = "id, session_id, org_id, message_id, direction, from_number,
     to_number, message_type, content, status, is_group_message, group_jid,
     synced_to_crm, crm_message_id, timestamp";

fn row_to_message(row: &Row<'_>) -> Result<MessageRecord, rusqlite::Error> {
    let direction_str: String = row.get(4)?;
    let direction: MessageDirection = direction_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_str: String = row.get(9)?;
    let status: MessageStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        org_id: row.get(2)?,
        message_id: row.get(3)?,
        direction,
        from_number: row.get(5)?,
        to_number: row.get(6)?,
        message_type: row.get(7)?,
        content: row.get(8)?,
        status,
        is_group_message: row.get::<_, i64>(10)? != 0,
        group_jid: row.get(11)?,
        synced_to_crm: row.get::<_, i64>(12)? != 0,
        crm_message_id: row.get(13)?,
        timestamp: row.get(14)?,
    })
}

/// Inserts a message; fails cleanly on duplicate `(message_id, session_id)`.
pub async fn save_message(
    db: &Database,
    input: MessageInput,
) -> Result<MessageRecord, WagateError> {
    let record = MessageRecord {
        id: Uuid::new_v4().to_string(),
        session_id: input.session_id,
        org_id: input.org_id,
        message_id: input.message_id,
        direction: input.direction,
        from_number: input.from_number,
        to_number: input.to_number,
        message_type: input.message_type,
        content: input.content,
        status: input.status,
        is_group_message: input.is_group_message,
        group_jid: input.group_jid,
        synced_to_crm: false,
        crm_message_id: None,
        timestamp: input.timestamp,
    };
    let row = record.clone();
    let inserted = db
        .connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO messages (id, session_id, org_id, message_id, direction,
                     from_number, to_number, message_type, content, status,
                     is_group_message, group_jid, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    row.id,
                    row.session_id,
                    row.org_id,
                    row.message_id,
                    row.direction.to_string(),
                    row.from_number,
                    row.to_number,
                    row.message_type,
                    row.content,
                    row.status.to_string(),
                    row.is_group_message as i64,
                    row.group_jid,
                    row.timestamp,
                ],
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
            "duplicate message {} for session {}",
            record.message_id, record.session_id
        )));
    }
    Ok(record)
}

/// Marks a message as delivered to the CRM.
pub async fn mark_message_synced(
    db: &Database,
    message_id: &str,
    crm_message_id: Option<&str>,
) -> Result<(), WagateError> {
    let message_id = message_id.to_string();
    let crm_message_id = crm_message_id.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET synced_to_crm = 1, crm_message_id = ?1 WHERE id = ?2",
                params![crm_message_id, message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Updates the delivery status of a message row.
pub async fn update_message_status(
    db: &Database,
    id: &str,
    status: MessageStatus,
) -> Result<(), WagateError> {
    let id = id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET status = ?1 WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Inbound, unsynced, non-failed messages for the org, oldest first.
pub async fn list_pending_crm_sync(
    db: &Database,
    org_id: &str,
    limit: u32,
) -> Result<Vec<MessageRecord>, WagateError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE org_id = ?1 AND direction = 'inbound'
                   AND synced_to_crm = 0 AND status != 'failed'
                 ORDER BY timestamp ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![org_id, limit as i64], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Loads a message by its internal row id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<MessageRecord>, WagateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            use rusqlite::OptionalExtension;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_message).optional()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{organizations, sessions};
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
        sessions::create_session(&db, "s1", &org.id).await.unwrap();
        (db, org.id, dir)
    }

    fn make_input(org_id: &str, message_id: &str, ts: &str) -> MessageInput {
        MessageInput {
            session_id: "s1".into(),
            org_id: org_id.into(),
            message_id: message_id.into(),
            direction: MessageDirection::Inbound,
            from_number: "5551234567@s.whatsapp.net".into(),
            to_number: "5559999999@s.whatsapp.net".into(),
            message_type: "text".into(),
            content: r#"{"text":"hi"}"#.into(),
            status: MessageStatus::Delivered,
            is_group_message: false,
            group_jid: None,
            timestamp: ts.into(),
        }
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let (db, org_id, _dir) = setup().await;
        let saved = save_message(&db, make_input(&org_id, "m1", "2026-08-01T10:00:00.000Z"))
            .await
            .unwrap();
        assert!(!saved.synced_to_crm);

        let loaded = get_message(&db, &saved.id).await.unwrap().unwrap();
        assert_eq!(loaded.message_id, "m1");
        assert_eq!(loaded.direction, MessageDirection::Inbound);
        assert_eq!(loaded.content, r#"{"text":"hi"}"#);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_message_id_per_session_is_rejected() {
        let (db, org_id, _dir) = setup().await;
        save_message(&db, make_input(&org_id, "m1", "2026-08-01T10:00:00.000Z"))
            .await
            .unwrap();
        let result = save_message(&db, make_input(&org_id, "m1", "2026-08-01T10:00:01.000Z")).await;
        assert!(matches!(result, Err(WagateError::Validation(_))));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_synced_sets_flag_and_crm_id() {
        let (db, org_id, _dir) = setup().await;
        let saved = save_message(&db, make_input(&org_id, "m1", "2026-08-01T10:00:00.000Z"))
            .await
            .unwrap();

        mark_message_synced(&db, &saved.id, Some("crm-77")).await.unwrap();
        let loaded = get_message(&db, &saved.id).await.unwrap().unwrap();
        assert!(loaded.synced_to_crm);
        assert_eq!(loaded.crm_message_id.as_deref(), Some("crm-77"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_sync_excludes_synced_failed_and_outbound() {
        let (db, org_id, _dir) = setup().await;

        let oldest = save_message(&db, make_input(&org_id, "m1", "2026-08-01T09:00:00.000Z"))
            .await
            .unwrap();
        let newest = save_message(&db, make_input(&org_id, "m2", "2026-08-01T11:00:00.000Z"))
            .await
            .unwrap();

        let synced = save_message(&db, make_input(&org_id, "m3", "2026-08-01T10:00:00.000Z"))
            .await
            .unwrap();
        mark_message_synced(&db, &synced.id, None).await.unwrap();

        let failed = save_message(&db, make_input(&org_id, "m4", "2026-08-01T10:30:00.000Z"))
            .await
            .unwrap();
        update_message_status(&db, &failed.id, MessageStatus::Failed)
            .await
            .unwrap();

        let mut outbound = make_input(&org_id, "m5", "2026-08-01T10:45:00.000Z");
        outbound.direction = MessageDirection::Outbound;
        save_message(&db, outbound).await.unwrap();

        let pending = list_pending_crm_sync(&db, &org_id, 100).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![oldest.id.as_str(), newest.id.as_str()]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_sync_honors_limit() {
        let (db, org_id, _dir) = setup().await;
        for i in 0..5 {
            save_message(
                &db,
                make_input(&org_id, &format!("m{i}"), &format!("2026-08-01T10:0{i}:00.000Z")),
            )
            .await
            .unwrap();
        }
        let pending = list_pending_crm_sync(&db, &org_id, 3).await.unwrap();
        assert_eq!(pending.len(), 3);
        db.close().await.unwrap();
    }
}
