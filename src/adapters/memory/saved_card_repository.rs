//! In-memory saved card repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, MemberId, SavedCardId};
use crate::domain::payment::SavedCard;
use crate::ports::SavedCardRepository;

#[derive(Default, Clone)]
pub struct InMemorySavedCardRepository {
    cards: Arc<RwLock<HashMap<SavedCardId, SavedCard>>>,
}

impl InMemorySavedCardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SavedCardRepository for InMemorySavedCardRepository {
    async fn save(&self, card: &SavedCard) -> Result<(), DomainError> {
        let mut cards = self.cards.write().await;
        if cards
            .values()
            .any(|c| c.token == card.token && c.id != card.id)
        {
            return Err(DomainError::validation(
                "token",
                "Card token is already saved",
            ));
        }
        cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SavedCard>, DomainError> {
        Ok(self
            .cards
            .read()
            .await
            .values()
            .find(|c| c.token == token)
            .cloned())
    }

    async fn list_by_member_id(&self, member_id: &MemberId) -> Result<Vec<SavedCard>, DomainError> {
        let mut cards: Vec<SavedCard> = self
            .cards
            .read()
            .await
            .values()
            .filter(|c| &c.member_id == member_id)
            .cloned()
            .collect();
        cards.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(cards)
    }

    async fn set_default(
        &self,
        member_id: &MemberId,
        card_id: &SavedCardId,
    ) -> Result<(), DomainError> {
        let mut cards = self.cards.write().await;
        match cards.get(card_id) {
            Some(card) if card.is_owned_by(member_id) => {}
            _ => {
                return Err(DomainError::validation(
                    "card_id",
                    "Card does not belong to the member",
                ))
            }
        }
        for card in cards.values_mut().filter(|c| &c.member_id == member_id) {
            card.is_default = &card.id == card_id;
        }
        Ok(())
    }
}
