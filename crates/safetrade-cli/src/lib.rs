//! # safetrade-cli: Offline Tooling for SafeTrade
//!
//! Inspects the lifecycle rules without a running server.
//!
//! ## Subcommands
//!
//! - `safetrade transitions`: print transition tables.
//! - `safetrade check`: run the transition validator for one edge.
//! - `safetrade invoice derive`: VAT and total for a net amount.
//! - `safetrade fees`: fee and payout breakdown for a purchase price.
//!
//! ```bash
//! safetrade check --entity transaction --from pending --to payment_verified --role admin
//! safetrade invoice derive --amount 1000.00 --vat 19
//! ```

pub mod check;
pub mod fees;
pub mod invoice;
pub mod transitions;

use clap::ValueEnum;

/// Exit code for a refused transition.
pub const EXIT_REJECTED: u8 = 2;

/// The four state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Entity {
    Transaction,
    Dispute,
    Invoice,
    Review,
}

impl Entity {
    pub const ALL: [Entity; 4] = [
        Self::Transaction,
        Self::Dispute,
        Self::Invoice,
        Self::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Dispute => "dispute",
            Self::Invoice => "invoice",
            Self::Review => "review",
        }
    }
}
