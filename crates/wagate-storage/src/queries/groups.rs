// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-scoped WhatsApp group records.

use rusqlite::params;

use wagate_core::{GroupInput, GroupRecord, WagateError};

use crate::database::{map_tr_err, Database};

/// Upserts a group record keyed on `(session_id, group_jid)`.
pub async fn upsert_group(db: &Database, input: GroupInput) -> Result<(), WagateError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO whatsapp_groups
                     (session_id, group_jid, name, description, participant_count, is_admin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(session_id, group_jid) DO UPDATE SET
                     name = excluded.name,
                     description = excluded.description,
                     participant_count = excluded.participant_count,
                     is_admin = excluded.is_admin",
                params![
                    input.session_id,
                    input.group_jid,
                    input.name,
                    input.description,
                    input.participant_count as i64,
                    input.is_admin as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Lists groups known for a session, by name.
pub async fn list_groups(db: &Database, session_id: &str) -> Result<Vec<GroupRecord>, WagateError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, group_jid, name, description, participant_count, is_admin
                 FROM whatsapp_groups WHERE session_id = ?1 ORDER BY name ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok(GroupRecord {
                    session_id: row.get(0)?,
                    group_jid: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    participant_count: row.get::<_, i64>(4)? as u32,
                    is_admin: row.get::<_, i64>(5)? != 0,
                })
            })?;
            let mut groups = Vec::new();
            for row in rows {
                groups.push(row?);
            }
            Ok(groups)
        })
        .await
        .map_err(map_tr_err)
}
