// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only webhook delivery audit log.

use rusqlite::{params, Row};

use wagate_core::{WagateError, WebhookLogInput, WebhookLogRecord, WebhookStatus};

use crate::database::{map_tr_err, Database};

fn row_to_log(row: &Row<'_>) -> Result<WebhookLogRecord, rusqlite::Error> {
    let status_str: String = row.get(8)?;
    let status: WebhookStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(WebhookLogRecord {
        id: row.get(0)?,
        org_id: row.get(1)?,
        message_id: row.get(2)?,
        url: row.get(3)?,
        payload: row.get(4)?,
        http_status: row.get::<_, Option<i64>>(5)?.map(|s| s as u16),
        response_body: row.get(6)?,
        retry_count: row.get::<_, i64>(7)? as u32,
        status,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Appends a delivery-attempt row; returns its id.
pub async fn log_webhook(db: &Database, input: WebhookLogInput) -> Result<i64, WagateError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO webhook_logs (org_id, message_id, url, payload, http_status,
                     response_body, retry_count, status, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    input.org_id,
                    input.message_id,
                    input.url,
                    input.payload,
                    input.http_status.map(|s| s as i64),
                    input.response_body,
                    input.retry_count as i64,
                    input.status.to_string(),
                    input.error_message,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All delivery attempts for a message (by internal row id), oldest first.
pub async fn list_webhook_logs(
    db: &Database,
    message_id: &str,
) -> Result<Vec<WebhookLogRecord>, WagateError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, message_id, url, payload, http_status, response_body,
                        retry_count, status, error_message, created_at
                 FROM webhook_logs WHERE message_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![message_id], row_to_log)?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_input(status: WebhookStatus, retry: u32) -> WebhookLogInput {
        WebhookLogInput {
            org_id: "org-1".into(),
            message_id: "msg-row-1".into(),
            url: "https://hook.test/in".into(),
            payload: r#"{"type":"whatsapp_message"}"#.into(),
            http_status: Some(500),
            response_body: Some("upstream error".into()),
            retry_count: retry,
            status,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn log_rows_append_in_order() {
        let (db, _dir) = setup_db().await;

        log_webhook(&db, make_input(WebhookStatus::Failed, 0)).await.unwrap();
        log_webhook(&db, make_input(WebhookStatus::Retrying, 1)).await.unwrap();
        log_webhook(&db, make_input(WebhookStatus::Success, 2)).await.unwrap();

        let logs = list_webhook_logs(&db, "msg-row-1").await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].retry_count, 0);
        assert_eq!(logs[0].status, WebhookStatus::Failed);
        assert_eq!(logs[2].status, WebhookStatus::Success);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_message_has_no_logs() {
        let (db, _dir) = setup_db().await;
        let logs = list_webhook_logs(&db, "nope").await.unwrap();
        assert!(logs.is_empty());
        db.close().await.unwrap();
    }
}
