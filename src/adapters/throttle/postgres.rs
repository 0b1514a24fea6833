//! PostgreSQL implementation of ThrottleRepository.
//!
//! Backed by the `shadow_throttles` table (see `migrations/`). The penalty
//! origin is flattened into `origin_kind`, `auto_rule` and `created_by`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, ModeratorId, ThrottleId, Timestamp, UserId,
};
use crate::domain::throttle::{AutoRule, PenaltyOrigin, Severity, ThrottleReason, ThrottleRecord};
use crate::ports::ThrottleRepository;

pub struct PostgresThrottleRepository {
    pool: PgPool,
}

impl PostgresThrottleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    pub async fn migrate(pool: &PgPool) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ThrottleRow {
    id: Uuid,
    user_id: String,
    reason: String,
    severity: i16,
    visibility_multiplier: f64,
    started_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    origin_kind: String,
    auto_rule: Option<String>,
    created_by: Option<String>,
    notes: Option<String>,
}

fn corrupt_row(field: &str, detail: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} in shadow_throttles row: {}", field, detail),
    )
    .with_detail("field", field)
}

impl TryFrom<ThrottleRow> for ThrottleRecord {
    type Error = DomainError;

    fn try_from(row: ThrottleRow) -> Result<Self, Self::Error> {
        let severity = u8::try_from(row.severity)
            .map_err(|e| corrupt_row("severity", e))
            .and_then(|level| Severity::new(level).map_err(|e| corrupt_row("severity", e)))?;

        let origin = match (row.origin_kind.as_str(), row.auto_rule, row.created_by) {
            ("automatic", Some(rule), None) => PenaltyOrigin::Automatic {
                rule: rule.parse::<AutoRule>().map_err(|e| corrupt_row("auto_rule", e))?,
            },
            ("manual", None, Some(moderator)) => PenaltyOrigin::Manual {
                moderator_id: ModeratorId::new(moderator)
                    .map_err(|e| corrupt_row("created_by", e))?,
            },
            (kind, _, _) => return Err(corrupt_row("origin", kind)),
        };

        Ok(ThrottleRecord {
            id: ThrottleId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt_row("user_id", e))?,
            reason: row
                .reason
                .parse::<ThrottleReason>()
                .map_err(|e| corrupt_row("reason", e))?,
            severity,
            visibility_multiplier: row.visibility_multiplier,
            started_at: Timestamp::from_datetime(row.started_at),
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            origin,
            notes: row.notes,
        })
    }
}

fn origin_columns(origin: &PenaltyOrigin) -> (&'static str, Option<&'static str>, Option<&str>) {
    match origin {
        PenaltyOrigin::Automatic { rule } => ("automatic", Some(rule.as_str()), None),
        PenaltyOrigin::Manual { moderator_id } => ("manual", None, Some(moderator_id.as_str())),
    }
}

fn rows_to_records(rows: Vec<ThrottleRow>) -> Result<Vec<ThrottleRecord>, DomainError> {
    rows.into_iter().map(ThrottleRecord::try_from).collect()
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, reason, severity, visibility_multiplier, started_at,
           expires_at, origin_kind, auto_rule, created_by, notes
    FROM shadow_throttles
"#;

#[async_trait]
impl ThrottleRepository for PostgresThrottleRepository {
    async fn insert(&self, record: &ThrottleRecord) -> Result<(), DomainError> {
        let (origin_kind, auto_rule, created_by) = origin_columns(&record.origin);

        sqlx::query(
            r#"
            INSERT INTO shadow_throttles (
                id, user_id, reason, severity, visibility_multiplier, started_at,
                expires_at, origin_kind, auto_rule, created_by, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.user_id.as_str())
        .bind(record.reason.as_str())
        .bind(record.severity.level() as i16)
        .bind(record.visibility_multiplier)
        .bind(record.started_at.as_datetime())
        .bind(record.expires_at.as_ref().map(|t| *t.as_datetime()))
        .bind(origin_kind)
        .bind(auto_rule)
        .bind(created_by)
        .bind(record.notes.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert throttle: {}", e)))?;

        Ok(())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<ThrottleRecord>, DomainError> {
        let sql = format!("{} WHERE user_id = $1 ORDER BY started_at DESC", SELECT_COLUMNS);
        let rows: Vec<ThrottleRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load throttles: {}", e)))?;

        rows_to_records(rows)
    }

    async fn find_active(&self, now: Timestamp) -> Result<Vec<ThrottleRecord>, DomainError> {
        let sql = format!(
            "{} WHERE started_at <= $1 AND (expires_at IS NULL OR expires_at > $1) \
             ORDER BY started_at DESC",
            SELECT_COLUMNS
        );
        let rows: Vec<ThrottleRow> = sqlx::query_as(&sql)
            .bind(now.as_datetime())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DomainError::database(format!("Failed to load active throttles: {}", e))
            })?;

        rows_to_records(rows)
    }

    async fn delete_active_for_user(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM shadow_throttles
            WHERE user_id = $1
              AND started_at <= $2
              AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(user_id.as_str())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to remove throttles: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, id: ThrottleId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM shadow_throttles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to remove throttle: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM shadow_throttles WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to prune throttles: {}", e)))?;

        Ok(result.rows_affected())
    }
}
