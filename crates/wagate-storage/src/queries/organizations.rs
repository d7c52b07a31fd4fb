// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Organization CRUD and bearer-token resolution.

use rusqlite::{params, Row};
use uuid::Uuid;

use wagate_core::{Organization, OrganizationInput, SubscriptionTier, WagateError};

use crate::database::{map_tr_err, Database};
use crate::queries::now_iso;

fn row_to_org(row: &Row<'_>) -> Result<Organization, rusqlite::Error> {
    let tier_str: String = row.get(3)?;
    let tier: SubscriptionTier = tier_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        tier,
        max_accounts: row.get::<_, i64>(4)? as u64,
        max_messages_per_month: row.get::<_, i64>(5)? as u64,
        webhook_url: row.get(6)?,
        crm_api_key: row.get(7)?,
        crm_location_id: row.get(8)?,
        api_token: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const ORG_COLUMNS: &str = "id, name, owner_id, tier, max_accounts, max_messages_per_month,
     webhook_url, crm_api_key, crm_location_id, api_token, created_at";

/// Creates an organization with a freshly minted id and API token.
pub async fn create_organization(
    db: &Database,
    input: OrganizationInput,
) -> Result<Organization, WagateError> {
    let org = Organization {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        owner_id: input.owner_id,
        tier: input.tier,
        max_accounts: input.max_accounts,
        max_messages_per_month: input.max_messages_per_month,
        webhook_url: input.webhook_url,
        crm_api_key: input.crm_api_key,
        crm_location_id: input.crm_location_id,
        api_token: Uuid::new_v4().simple().to_string(),
        created_at: now_iso(),
    };
    let inserted = org.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO organizations (id, name, owner_id, tier, max_accounts,
                     max_messages_per_month, webhook_url, crm_api_key, crm_location_id,
                     api_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    org.id,
                    org.name,
                    org.owner_id,
                    org.tier.to_string(),
                    org.max_accounts as i64,
                    org.max_messages_per_month as i64,
                    org.webhook_url,
                    org.crm_api_key,
                    org.crm_location_id,
                    org.api_token,
                    org.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(inserted)
}

/// Looks an organization up by id.
pub async fn get_organization(
    db: &Database,
    org_id: &str,
) -> Result<Option<Organization>, WagateError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![org_id], row_to_org);
            match result {
                Ok(org) => Ok(Some(org)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Resolves an organization from an edge bearer token.
pub async fn get_organization_by_token(
    db: &Database,
    api_token: &str,
) -> Result<Option<Organization>, WagateError> {
    let api_token = api_token.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORG_COLUMNS} FROM organizations WHERE api_token = ?1"
            ))?;
            let result = stmt.query_row(params![api_token], row_to_org);
            match result {
                Ok(org) => Ok(Some(org)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Organizations with a configured webhook URL, for the CRM backfill job.
pub async fn list_organizations_with_webhooks(
    db: &Database,
) -> Result<Vec<Organization>, WagateError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORG_COLUMNS} FROM organizations WHERE webhook_url IS NOT NULL"
            ))?;
            let rows = stmt.query_map([], row_to_org)?;
            let mut orgs = Vec::new();
            for row in rows {
                orgs.push(row?);
            }
            Ok(orgs)
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

    fn make_input() -> OrganizationInput {
        OrganizationInput {
            name: "Acme".to_string(),
            owner_id: "user-1".to_string(),
            tier: SubscriptionTier::Pro,
            max_accounts: 5,
            max_messages_per_month: 10_000,
            webhook_url: Some("https://hook.test/in".to_string()),
            crm_api_key: None,
            crm_location_id: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let (db, _dir) = setup_db().await;
        let org = create_organization(&db, make_input()).await.unwrap();

        let loaded = get_organization(&db, &org.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Acme");
        assert_eq!(loaded.tier, SubscriptionTier::Pro);
        assert_eq!(loaded.max_accounts, 5);
        assert_eq!(loaded.webhook_url.as_deref(), Some("https://hook.test/in"));
        assert_eq!(loaded.api_token, org.api_token);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn token_lookup_finds_the_org() {
        let (db, _dir) = setup_db().await;
        let org = create_organization(&db, make_input()).await.unwrap();

        let by_token = get_organization_by_token(&db, &org.api_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_token.id, org.id);

        let missing = get_organization_by_token(&db, "no-such-token")
            .await
            .unwrap();
        assert!(missing.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn webhook_org_listing_skips_unconfigured() {
        let (db, _dir) = setup_db().await;
        create_organization(&db, make_input()).await.unwrap();
        let mut no_hook = make_input();
        no_hook.webhook_url = None;
        create_organization(&db, no_hook).await.unwrap();

        let orgs = list_organizations_with_webhooks(&db).await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert!(orgs[0].webhook_url.is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn tokens_are_unique_per_org() {
        let (db, _dir) = setup_db().await;
        let a = create_organization(&db, make_input()).await.unwrap();
        let b = create_organization(&db, make_input()).await.unwrap();
        assert_ne!(a.api_token, b.api_token);
        db.close().await.unwrap();
    }
}
