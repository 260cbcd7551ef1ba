//! # Acting Identity
//!
//! The already-authenticated identity on whose behalf a transition runs.
//! Authentication happens upstream; this crate only carries the result.

use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Role of the acting identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// The purchasing party.
    Buyer,
    /// The selling party.
    Seller,
    /// A dealership brokering the trade.
    Dealer,
    /// Platform operator.
    Admin,
    /// Automated jobs acting without a human.
    System,
}

impl ActorRole {
    /// All roles, in declaration order.
    pub const ALL: [ActorRole; 5] = [
        Self::Buyer,
        Self::Seller,
        Self::Dealer,
        Self::Admin,
        Self::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Dealer => "dealer",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    /// Buyer or seller.
    pub fn is_party(&self) -> bool {
        matches!(self, Self::Buyer | Self::Seller)
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An acting identity: a role plus, for humans, the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The user behind the action. `None` for the system and for operators
    /// acting without a user id.
    pub user_id: Option<UserId>,
    /// The role the user is acting in.
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: UserId, role: ActorRole) -> Self {
        Self {
            user_id: Some(user_id),
            role,
        }
    }

    /// The automated system actor.
    pub fn system() -> Self {
        Self {
            user_id: None,
            role: ActorRole::System,
        }
    }

    pub fn buyer(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Buyer)
    }

    pub fn seller(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Seller)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Admin)
    }

    pub fn dealer(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Dealer)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user_id {
            Some(id) => write!(f, "{}({})", self.role, id),
            None => write!(f, "{}", self.role),
        }
    }
}
