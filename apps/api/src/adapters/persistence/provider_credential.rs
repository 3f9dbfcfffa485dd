use async_trait::async_trait;
use sqlx::{Row, types::Json};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::provider_credentials::ProviderCredentialRepoTrait,
    domain::entities::{
        payment_provider::PaymentProvider,
        provider_credential::{ProviderCredential, SecretFields},
    },
};

fn row_to_credential(row: sqlx::postgres::PgRow) -> ProviderCredential {
    let id: Uuid = row.get("id");
    let secret_fields: serde_json::Value = row.get("secret_fields");
    ProviderCredential {
        id,
        tenant_id: row.get("tenant_id"),
        provider: row.get("provider"),
        secret_fields: parse_json_with_fallback(
            &secret_fields,
            "secret_fields",
            "provider_credential",
            &id.to_string(),
        ),
        is_active: row.get("is_active"),
        is_sandbox: row.get("is_sandbox"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str =
    "id, tenant_id, provider, secret_fields, is_active, is_sandbox, created_at, updated_at";

#[async_trait]
impl ProviderCredentialRepoTrait for PostgresPersistence {
    async fn get(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderCredential>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM provider_credentials WHERE tenant_id = $1 AND provider = $2",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .bind(provider)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_credential))
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<ProviderCredential>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM provider_credentials WHERE tenant_id = $1 ORDER BY provider",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_credential).collect())
    }

    async fn list_all(&self) -> AppResult<Vec<ProviderCredential>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM provider_credentials ORDER BY tenant_id, provider",
            SELECT_COLS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_credential).collect())
    }

    async fn upsert(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
        secret_fields: &SecretFields,
        is_active: bool,
        is_sandbox: bool,
    ) -> AppResult<ProviderCredential> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO provider_credentials (id, tenant_id, provider, secret_fields, is_active, is_sandbox)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, provider) DO UPDATE SET
                secret_fields = EXCLUDED.secret_fields,
                is_active = EXCLUDED.is_active,
                is_sandbox = EXCLUDED.is_sandbox,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(provider)
        .bind(Json(secret_fields))
        .bind(is_active)
        .bind(is_sandbox)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row_to_credential(row))
    }

    async fn compare_and_set_fields(
        &self,
        id: Uuid,
        expected: &SecretFields,
        new_fields: &SecretFields,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE provider_credentials
            SET secret_fields = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND secret_fields = $2
            "#,
        )
        .bind(id)
        .bind(Json(expected))
        .bind(Json(new_fields))
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM provider_credentials WHERE id = $1)")
                .bind(id)
                .fetch_one(self.pool())
                .await
                .map_err(AppError::from)?;
        if exists {
            Ok(false)
        } else {
            Err(AppError::NotFound)
        }
    }
}
