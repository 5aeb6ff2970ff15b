use crate::error::PersistenceError;
use crate::models::{
    AttemptStatus, BotConfiguration, PurchaseAttempt, PurchaseSettings, PurchaseStats,
};
use crate::persistence::PersistenceGateway;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Default user ID for single-user mode
pub const DEFAULT_USER_ID: Uuid = Uuid::from_u128(1);

/// Postgres-backed settings store and purchase history
pub struct PostgresGateway {
    pool: PgPool,
    user_id: Uuid,
}

impl PostgresGateway {
    /// Connect to Postgres and run migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    /// * `max_connections` - Pool size
    /// * `user_id` - Optional user ID (defaults to single-user mode)
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        user_id: Option<Uuid>,
    ) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self {
            pool,
            user_id: user_id.unwrap_or(DEFAULT_USER_ID),
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Remove this user's settings and history
    #[cfg(test)]
    pub async fn clear_user_data(&self) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM purchase_attempts WHERE user_id = $1")
            .bind(self.user_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM bot_settings WHERE user_id = $1")
            .bind(self.user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn get_active_configuration(&self) -> Result<Option<BotConfiguration>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT purchase_amount, purchase_interval_minutes, credentials_ref,
                   is_bot_active, updated_at
            FROM bot_settings
            WHERE user_id = $1
            "#,
        )
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let purchase_amount: Option<Decimal> = row.try_get("purchase_amount")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(Some(BotConfiguration {
            purchase_amount: purchase_amount
                .map(|v| to_f64("purchase_amount", v))
                .transpose()?,
            purchase_interval_minutes: row.try_get("purchase_interval_minutes")?,
            credentials_ref: row.try_get("credentials_ref")?,
            is_active: row.try_get("is_bot_active")?,
            updated_at: Some(updated_at),
        }))
    }

    async fn set_active_flag(&self, active: bool) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            "UPDATE bot_settings SET is_bot_active = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(self.user_id)
        .bind(active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!("No bot settings row for user {}, active flag not stored", self.user_id);
        }

        Ok(())
    }

    async fn append_purchase_attempt(&self, attempt: &PurchaseAttempt) -> Result<(), PersistenceError> {
        attempt
            .check_consistency()
            .map_err(PersistenceError::InvalidRecord)?;

        sqlx::query(
            r#"
            INSERT INTO purchase_attempts (
                id, user_id, attempted_at, requested_amount, filled_quantity,
                fill_price, order_id, status, failure_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(attempt.id)
        .bind(self.user_id)
        .bind(attempt.timestamp)
        .bind(to_decimal("requested_amount", attempt.requested_amount)?)
        .bind(to_decimal("filled_quantity", attempt.filled_quantity)?)
        .bind(to_decimal("fill_price", attempt.fill_price)?)
        .bind(&attempt.order_id)
        .bind(attempt.status.as_str())
        .bind(&attempt.failure_reason)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved {} purchase attempt {} to Postgres",
            attempt.status.as_str(),
            attempt.id
        );

        Ok(())
    }

    async fn list_attempts(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PurchaseAttempt>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, attempted_at, requested_amount, filled_quantity, fill_price,
                   order_id, status, failure_reason
            FROM purchase_attempts
            WHERE user_id = $1
            ORDER BY attempted_at DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(self.user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(attempt_from_row).collect()
    }

    async fn save_purchase_settings(&self, settings: &PurchaseSettings) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO bot_settings (user_id, purchase_amount, purchase_interval_minutes)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                purchase_amount = EXCLUDED.purchase_amount,
                purchase_interval_minutes = EXCLUDED.purchase_interval_minutes,
                updated_at = NOW()
            "#,
        )
        .bind(self.user_id)
        .bind(to_decimal("purchase_amount", settings.amount)?)
        .bind(settings.interval_minutes)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Saved purchase settings: {} every {} minutes",
            settings.amount,
            settings.interval_minutes
        );

        Ok(())
    }

    async fn save_credentials_ref(&self, credentials_ref: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO bot_settings (user_id, credentials_ref)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                credentials_ref = EXCLUDED.credentials_ref,
                updated_at = NOW()
            "#,
        )
        .bind(self.user_id)
        .bind(credentials_ref)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purchase_statistics(&self) -> Result<PurchaseStats, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_attempts,
                COUNT(*) FILTER (WHERE status = 'success') AS successful,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COALESCE(SUM(requested_amount) FILTER (WHERE status = 'success'), 0) AS total_spent,
                COALESCE(SUM(filled_quantity) FILTER (WHERE status = 'success'), 0) AS total_quantity,
                COALESCE(AVG(fill_price) FILTER (WHERE status = 'success'), 0) AS avg_price
            FROM purchase_attempts
            WHERE user_id = $1
            "#,
        )
        .bind(self.user_id)
        .fetch_one(&self.pool)
        .await?;

        let total_attempts = count(&row, "total_attempts")?;
        let successful = count(&row, "successful")?;

        Ok(PurchaseStats {
            total_attempts,
            successful,
            failed: count(&row, "failed")?,
            total_spent: to_f64("total_spent", row.try_get("total_spent")?)?,
            total_quantity: to_f64("total_quantity", row.try_get("total_quantity")?)?,
            avg_price: to_f64("avg_price", row.try_get("avg_price")?)?,
            success_rate: PurchaseStats::rate(successful, total_attempts),
        })
    }
}

fn attempt_from_row(row: &PgRow) -> Result<PurchaseAttempt, PersistenceError> {
    let status_str: String = row.try_get("status")?;
    let status = AttemptStatus::parse(&status_str)
        .ok_or_else(|| PersistenceError::Corrupt(format!("invalid attempt status {:?}", status_str)))?;

    Ok(PurchaseAttempt {
        id: row.try_get("id")?,
        timestamp: row.try_get("attempted_at")?,
        requested_amount: to_f64("requested_amount", row.try_get("requested_amount")?)?,
        status,
        filled_quantity: to_f64("filled_quantity", row.try_get("filled_quantity")?)?,
        fill_price: to_f64("fill_price", row.try_get("fill_price")?)?,
        order_id: row.try_get("order_id")?,
        failure_reason: row.try_get("failure_reason")?,
    })
}

fn count(row: &PgRow, column: &str) -> Result<u64, PersistenceError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| PersistenceError::Corrupt(format!("negative {}", column)))
}

fn to_decimal(field: &str, value: f64) -> Result<Decimal, PersistenceError> {
    Decimal::from_f64(value)
        .ok_or_else(|| PersistenceError::InvalidRecord(format!("{} is not representable: {}", field, value)))
}

fn to_f64(field: &str, value: Decimal) -> Result<f64, PersistenceError> {
    value
        .to_f64()
        .ok_or_else(|| PersistenceError::Corrupt(format!("{} out of range: {}", field, value)))
}
