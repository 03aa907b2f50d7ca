//! Saved card entity.
//!
//! A gateway-issued token for a previously authorized card. Raw card
//! data never reaches this service.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{MemberId, SavedCardId, Timestamp};

/// Reusable card token owned by a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCard {
    pub id: SavedCardId,
    pub member_id: MemberId,
    /// Gateway token used for server-side charges.
    pub token: String,
    /// Display mask such as `440043******1234`.
    pub masked_number: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub issuer: Option<String>,
    pub is_default: bool,
    pub created_at: Timestamp,
}

impl SavedCard {
    pub fn new(
        member_id: MemberId,
        token: impl Into<String>,
        masked_number: impl Into<String>,
        expiry_month: u8,
        expiry_year: u16,
    ) -> Self {
        Self {
            id: SavedCardId::new(),
            member_id,
            token: token.into(),
            masked_number: masked_number.into(),
            expiry_month,
            expiry_year,
            issuer: None,
            is_default: false,
            created_at: Timestamp::now(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn is_owned_by(&self, member_id: &MemberId) -> bool {
        &self.member_id == member_id
    }

    /// Returns true once the card's expiry month has passed.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        use chrono::Datelike;
        let dt = now.as_datetime();
        let (year, month) = (dt.year(), dt.month());
        (self.expiry_year as i32, self.expiry_month as u32) < (year, month)
    }
}
