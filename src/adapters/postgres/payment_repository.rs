//! PostgreSQL implementation of PaymentRepository.
//!
//! Both writes are single conditional `UPDATE`s; zero affected rows means
//! another writer got there first and is reported as `WriteOutcome::Stale`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, MemberId, PaymentId, RelatedEntityId, Timestamp,
};
use crate::domain::payment::{Currency, Payment, PaymentStatus};
use crate::ports::{PaymentRepository, WriteOutcome};

const INVOICE_UNIQUE_CONSTRAINT: &str = "payments_invoice_id_key";

const SELECT_COLUMNS: &str = r#"
    SELECT id, invoice_id, member_id, related_entity_id, payment_type, amount, currency,
           status, payment_method, gateway_transaction_id, card_mask, approval_code,
           error_code, error_message, refunded_amount, status_reason,
           created_at, updated_at, completed_at, expires_at, version
    FROM payments
"#;

/// PostgreSQL implementation of the PaymentRepository port.
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    invoice_id: String,
    member_id: Uuid,
    related_entity_id: Uuid,
    payment_type: String,
    amount: i64,
    currency: String,
    status: String,
    payment_method: String,
    gateway_transaction_id: Option<String>,
    card_mask: Option<String>,
    approval_code: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    refunded_amount: Option<i64>,
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            invoice_id: row.invoice_id,
            member_id: MemberId::from_uuid(row.member_id),
            related_entity_id: RelatedEntityId::from_uuid(row.related_entity_id),
            payment_type: row.payment_type.parse().map_err(DomainError::database)?,
            amount: row.amount,
            currency: Currency::parse(&row.currency)
                .map_err(|e| DomainError::database(format!("Invalid currency: {}", e)))?,
            status: row.status.parse().map_err(DomainError::database)?,
            payment_method: row.payment_method.parse().map_err(DomainError::database)?,
            gateway_transaction_id: row.gateway_transaction_id,
            card_mask: row.card_mask,
            approval_code: row.approval_code,
            error_code: row.error_code,
            error_message: row.error_message,
            refunded_amount: row.refunded_amount,
            status_reason: row.status_reason,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
            expires_at: Timestamp::from_datetime(row.expires_at),
            version: row.version,
        })
    }
}

fn rows_to_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, DomainError> {
    rows.into_iter().map(Payment::try_from).collect()
}

fn query_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}

fn written(rows_affected: u64) -> WriteOutcome {
    if rows_affected == 0 {
        WriteOutcome::Stale
    } else {
        WriteOutcome::Written
    }
}

/// Limits arrive as `usize`; Postgres wants a signed bigint.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, invoice_id, member_id, related_entity_id, payment_type, amount, currency,
                status, payment_method, gateway_transaction_id, card_mask, approval_code,
                error_code, error_message, refunded_amount, status_reason,
                created_at, updated_at, completed_at, expires_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                      $17, $18, $19, $20, $21)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(&payment.invoice_id)
        .bind(payment.member_id.as_uuid())
        .bind(payment.related_entity_id.as_uuid())
        .bind(payment.payment_type.as_str())
        .bind(payment.amount)
        .bind(payment.currency.as_str())
        .bind(payment.status.as_str())
        .bind(payment.payment_method.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.card_mask)
        .bind(&payment.approval_code)
        .bind(&payment.error_code)
        .bind(&payment.error_message)
        .bind(payment.refunded_amount)
        .bind(&payment.status_reason)
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .bind(payment.completed_at.as_ref().map(Timestamp::as_datetime))
        .bind(payment.expires_at.as_datetime())
        .bind(payment.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(INVOICE_UNIQUE_CONSTRAINT) {
                    return DomainError::validation(
                        "invoice_id",
                        format!("Invoice {} already has a payment", payment.invoice_id),
                    );
                }
            }
            query_error("Failed to insert payment", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("Failed to fetch payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{} WHERE invoice_id = $1", SELECT_COLUMNS))
                .bind(invoice_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| query_error("Failed to fetch payment by invoice", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn update(&self, payment: &Payment) -> Result<WriteOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $3,
                gateway_transaction_id = $4,
                card_mask = $5,
                approval_code = $6,
                error_code = $7,
                error_message = $8,
                refunded_amount = $9,
                status_reason = $10,
                updated_at = $11,
                completed_at = $12,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.version)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.card_mask)
        .bind(&payment.approval_code)
        .bind(&payment.error_code)
        .bind(&payment.error_message)
        .bind(payment.refunded_amount)
        .bind(&payment.status_reason)
        .bind(payment.updated_at.as_datetime())
        .bind(payment.completed_at.as_ref().map(Timestamp::as_datetime))
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to update payment", e))?;

        Ok(written(result.rows_affected()))
    }

    async fn update_status(
        &self,
        id: &PaymentId,
        expected: PaymentStatus,
        target: PaymentStatus,
        updated_at: Timestamp,
    ) -> Result<WriteOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $3,
                updated_at = $4,
                version = version + 1
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(target.as_str())
        .bind(updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to update payment status", e))?;

        Ok(written(result.rows_affected()))
    }

    async fn list_by_member_id(&self, member_id: &MemberId) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "{} WHERE member_id = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(member_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list member payments", e))?;

        rows_to_payments(rows)
    }

    async fn list_by_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "{} WHERE status = $1 ORDER BY created_at ASC LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list payments by status", e))?;

        rows_to_payments(rows)
    }

    async fn list_expired(&self, now: Timestamp, limit: usize) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "{} WHERE status IN ('pending', 'processing') AND expires_at < $1 \
             ORDER BY (status = 'processing') ASC, expires_at ASC LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list expired payments", e))?;

        rows_to_payments(rows)
    }

    async fn list_pending_by_member_id(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "{} WHERE member_id = $1 AND status IN ('pending', 'processing') \
             ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(member_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list pending payments", e))?;

        rows_to_payments(rows)
    }
}
