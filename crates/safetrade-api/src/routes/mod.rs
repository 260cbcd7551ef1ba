//! # Route Modules
//!
//! One router per lifecycle entity. Handlers parse and authenticate, then
//! delegate to [`safetrade_lifecycle::SafeTradeService`]; no lifecycle rule
//! lives here.

pub mod disputes;
pub mod invoices;
pub mod reviews;
pub mod transactions;
