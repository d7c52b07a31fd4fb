// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monthly usage counters, keyed `(org_id, period_start)`.
//!
//! All increments are single-statement upserts so concurrent writers
//! cannot lose updates.

use rusqlite::params;

use wagate_core::traits::store::current_period_start;
use wagate_core::{UsageKind, UsageRecord, WagateError};

use crate::database::{map_tr_err, Database};

/// Atomically bumps one monthly counter for the org.
pub async fn increment_usage(
    db: &Database,
    org_id: &str,
    kind: UsageKind,
) -> Result<(), WagateError> {
    let org_id = org_id.to_string();
    let period = current_period_start();
    let column = match kind {
        UsageKind::MessageSent => "messages_sent",
        UsageKind::MessageReceived => "messages_received",
        UsageKind::ApiCall => "api_calls",
    };
    let sql = format!(
        "INSERT INTO usage_records (org_id, period_start, {column})
         VALUES (?1, ?2, 1)
         ON CONFLICT(org_id, period_start) DO UPDATE SET {column} = {column} + 1"
    );
    db.connection()
        .call(move |conn| {
            conn.execute(&sql, params![org_id, period])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrites the month's active-session gauge.
pub async fn record_active_sessions(
    db: &Database,
    org_id: &str,
    count: u64,
) -> Result<(), WagateError> {
    let org_id = org_id.to_string();
    let period = current_period_start();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO usage_records (org_id, period_start, active_sessions)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(org_id, period_start) DO UPDATE SET
                     active_sessions = excluded.active_sessions",
                params![org_id, period, count as i64],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Current calendar month's counters; zeroed record when absent.
pub async fn month_usage(db: &Database, org_id: &str) -> Result<UsageRecord, WagateError> {
    let org_id = org_id.to_string();
    let period = current_period_start();
    db.connection()
        .call(move |conn| {
            use rusqlite::OptionalExtension;
            let result = conn
                .query_row(
                    "SELECT messages_sent, messages_received, active_sessions, api_calls
                     FROM usage_records WHERE org_id = ?1 AND period_start = ?2",
                    params![org_id, period],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;
            let (sent, received, active, api) = result.unwrap_or((0, 0, 0, 0));
            Ok(UsageRecord {
                org_id: org_id.clone(),
                period_start: period.clone(),
                messages_sent: sent as u64,
                messages_received: received as u64,
                active_sessions: active as u64,
                api_calls: api as u64,
            })
        })
        .await
        .map_err(map_tr_err)
}
