//! Client record and edit history queries.
//!
//! Every query that touches `clients` is scoped by the caller's user id, so
//! a user can only ever see or change their own rows.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ClientRecord, ClientStatus, NewEdit};

const CLIENT_COLUMNS: &str = "id, owner_id, name, slug, config, repo_owner, repo_name, repo_branch, \
     status, edit_count, last_edit_at, last_commit_sha, created_at, updated_at";

pub async fn get_client(db: &PgPool, owner_id: Uuid, client_id: Uuid) -> Result<Option<ClientRecord>, sqlx::Error> {
    sqlx::query_as::<_, ClientRecord>(&format!(
        "SELECT {} FROM clients WHERE id = $1 AND owner_id = $2",
        CLIENT_COLUMNS
    ))
    .bind(client_id)
    .bind(owner_id)
    .fetch_optional(db)
    .await
}

/// Shallow-merge `patch` into the client's config. Returns `false` when the
/// client does not exist for this owner.
pub async fn merge_client_config(
    db: &PgPool,
    owner_id: Uuid,
    client_id: Uuid,
    patch: &Value,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE clients SET config = config || $3::jsonb, updated_at = now() \
         WHERE id = $1 AND owner_id = $2",
    )
    .bind(client_id)
    .bind(owner_id)
    .bind(patch)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_client_status(
    db: &PgPool,
    owner_id: Uuid,
    client_id: Uuid,
    status: ClientStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE clients SET status = $3, updated_at = now() WHERE id = $1 AND owner_id = $2",
    )
    .bind(client_id)
    .bind(owner_id)
    .bind(status)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn record_commit(
    db: &PgPool,
    owner_id: Uuid,
    client_id: Uuid,
    commit_sha: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE clients SET last_commit_sha = $3, updated_at = now() WHERE id = $1 AND owner_id = $2",
    )
    .bind(client_id)
    .bind(owner_id)
    .bind(commit_sha)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Append to the edit history and bump the client's edit counters.
/// Failures are logged, never returned: a lost history row must not fail an
/// edit that already landed in the repository.
pub async fn record_edit(db: &PgPool, owner_id: Uuid, edit: &NewEdit) {
    let insert = sqlx::query(
        "INSERT INTO edit_history (client_id, user_id, file_path, instruction, explanation, commit_sha) \
         SELECT id, $2, $3, $4, $5, $6 FROM clients WHERE id = $1 AND owner_id = $7",
    )
    .bind(edit.client_id)
    .bind(edit.user_id)
    .bind(&edit.file_path)
    .bind(&edit.instruction)
    .bind(&edit.explanation)
    .bind(&edit.commit_sha)
    .bind(owner_id)
    .execute(db)
    .await;
    if let Err(e) = insert {
        tracing::warn!(client_id = %edit.client_id, "edit history insert failed: {}", e);
        return;
    }

    let bump = sqlx::query(
        "UPDATE clients SET edit_count = edit_count + 1, last_edit_at = now(), \
         last_commit_sha = COALESCE($3, last_commit_sha), updated_at = now() \
         WHERE id = $1 AND owner_id = $2",
    )
    .bind(edit.client_id)
    .bind(owner_id)
    .bind(&edit.commit_sha)
    .execute(db)
    .await;
    if let Err(e) = bump {
        tracing::warn!(client_id = %edit.client_id, "edit counter update failed: {}", e);
    }
}
