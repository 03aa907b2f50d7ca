//! Payment method and payment purpose enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the member pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card entered on the gateway's hosted page.
    Card,
    /// Previously tokenized card charged server-side.
    SavedCard,
    /// Wallet payment through the hosted page.
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::SavedCard => "saved_card",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "saved_card" => Ok(PaymentMethod::SavedCard),
            "wallet" => Ok(PaymentMethod::Wallet),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// What the payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Subscription,
    Reservation,
    Fine,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Subscription => "subscription",
            PaymentType::Reservation => "reservation",
            PaymentType::Fine => "fine",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(PaymentType::Subscription),
            "reservation" => Ok(PaymentType::Reservation),
            "fine" => Ok(PaymentType::Fine),
            other => Err(format!("unknown payment type: {}", other)),
        }
    }
}
