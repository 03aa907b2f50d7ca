//! PostgreSQL implementation of SavedCardRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, MemberId, SavedCardId, Timestamp};
use crate::domain::payment::SavedCard;
use crate::ports::SavedCardRepository;

const TOKEN_UNIQUE_CONSTRAINT: &str = "saved_cards_token_key";

/// PostgreSQL implementation of the SavedCardRepository port.
pub struct PostgresSavedCardRepository {
    pool: PgPool,
}

impl PostgresSavedCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SavedCardRow {
    id: Uuid,
    member_id: Uuid,
    token: String,
    masked_number: String,
    expiry_month: i16,
    expiry_year: i32,
    issuer: Option<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<SavedCardRow> for SavedCard {
    type Error = DomainError;

    fn try_from(row: SavedCardRow) -> Result<Self, Self::Error> {
        Ok(SavedCard {
            id: SavedCardId::from_uuid(row.id),
            member_id: MemberId::from_uuid(row.member_id),
            token: row.token,
            masked_number: row.masked_number,
            expiry_month: u8::try_from(row.expiry_month)
                .map_err(|_| DomainError::database(format!("Invalid expiry month: {}", row.expiry_month)))?,
            expiry_year: u16::try_from(row.expiry_year)
                .map_err(|_| DomainError::database(format!("Invalid expiry year: {}", row.expiry_year)))?,
            issuer: row.issuer,
            is_default: row.is_default,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn query_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}

#[async_trait]
impl SavedCardRepository for PostgresSavedCardRepository {
    async fn save(&self, card: &SavedCard) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO saved_cards (
                id, member_id, token, masked_number, expiry_month, expiry_year,
                issuer, is_default, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                masked_number = EXCLUDED.masked_number,
                expiry_month = EXCLUDED.expiry_month,
                expiry_year = EXCLUDED.expiry_year,
                issuer = EXCLUDED.issuer,
                is_default = EXCLUDED.is_default
            "#,
        )
        .bind(card.id.as_uuid())
        .bind(card.member_id.as_uuid())
        .bind(&card.token)
        .bind(&card.masked_number)
        .bind(i16::from(card.expiry_month))
        .bind(i32::from(card.expiry_year))
        .bind(&card.issuer)
        .bind(card.is_default)
        .bind(card.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(TOKEN_UNIQUE_CONSTRAINT) {
                    return DomainError::validation("token", "Card token is already saved");
                }
            }
            query_error("Failed to save card", e)
        })?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SavedCard>, DomainError> {
        let row: Option<SavedCardRow> = sqlx::query_as(
            r#"
            SELECT id, member_id, token, masked_number, expiry_month, expiry_year,
                   issuer, is_default, created_at
            FROM saved_cards
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to fetch saved card", e))?;

        row.map(SavedCard::try_from).transpose()
    }

    async fn list_by_member_id(&self, member_id: &MemberId) -> Result<Vec<SavedCard>, DomainError> {
        let rows: Vec<SavedCardRow> = sqlx::query_as(
            r#"
            SELECT id, member_id, token, masked_number, expiry_month, expiry_year,
                   issuer, is_default, created_at
            FROM saved_cards
            WHERE member_id = $1
            ORDER BY is_default DESC, created_at ASC
            "#,
        )
        .bind(member_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list saved cards", e))?;

        rows.into_iter().map(SavedCard::try_from).collect()
    }

    async fn set_default(
        &self,
        member_id: &MemberId,
        card_id: &SavedCardId,
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("Failed to begin transaction", e))?;

        let owned = sqlx::query("SELECT 1 FROM saved_cards WHERE id = $1 AND member_id = $2 FOR UPDATE")
            .bind(card_id.as_uuid())
            .bind(member_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to lock saved card", e))?;
        if owned.is_none() {
            return Err(DomainError::validation(
                "card_id",
                "Card does not belong to the member",
            ));
        }

        // Cleared first: the one-default index is checked row by row.
        sqlx::query("UPDATE saved_cards SET is_default = FALSE WHERE member_id = $1 AND is_default")
            .bind(member_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to clear default card", e))?;
        sqlx::query("UPDATE saved_cards SET is_default = TRUE WHERE id = $1")
            .bind(card_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to set default card", e))?;

        tx.commit()
            .await
            .map_err(|e| query_error("Failed to commit default card", e))?;
        Ok(())
    }
}
