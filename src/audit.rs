use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

pub async fn log_audit(
    pool: &PgPool,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(action)
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record an action without failing the request that triggered it.
pub async fn record(pool: &PgPool, user_id: Uuid, action: &str, metadata: Value) {
    if let Err(err) = log_audit(pool, Some(user_id), action, Some("products"), Some(metadata)).await {
        tracing::warn!(error = %err, action = %action, "audit log failed");
    }
}
