//! Saved card repository port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, MemberId, SavedCardId};
use crate::domain::payment::SavedCard;

/// Repository port for saved card tokens.
#[async_trait]
pub trait SavedCardRepository: Send + Sync {
    /// Insert or replace a saved card.
    async fn save(&self, card: &SavedCard) -> Result<(), DomainError>;

    /// Find a card by its gateway token.
    async fn find_by_token(&self, token: &str) -> Result<Option<SavedCard>, DomainError>;

    /// All cards of a member, default first.
    async fn list_by_member_id(&self, member_id: &MemberId) -> Result<Vec<SavedCard>, DomainError>;

    /// Make `card_id` the member's only default card.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the card does not belong to the member
    /// - `DatabaseError` on persistence failure
    async fn set_default(&self, member_id: &MemberId, card_id: &SavedCardId)
        -> Result<(), DomainError>;
}
